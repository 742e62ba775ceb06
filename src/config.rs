//! Immutable engine configuration: theme registry, difficulty bands and
//! selection tuning.
//!
//! Loaded from TOML (path in `CHESS_LESSONS_CONFIG`); every field has a default
//! so a partial file only overrides what it names.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::LessonError;
use crate::types::{DifficultyBand, RatingInterval};

pub const CONFIG_PATH_ENV: &str = "CHESS_LESSONS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub themes: BTreeMap<String, ThemeInfo>,
    pub bands: BandTable,
    pub selection: SelectionTuning,
    pub weights: ScoreWeights,
    pub cache: CacheConfig,
    pub narrative: NarrativeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            themes: default_themes(),
            bands: BandTable::default(),
            selection: SelectionTuning::default(),
            weights: ScoreWeights::default(),
            cache: CacheConfig::default(),
            narrative: NarrativeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), themes = config.themes.len(), "Loaded engine config");
        Ok(config)
    }

    /// Defaults unless `CHESS_LESSONS_CONFIG` names a file
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_path(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), LessonError> {
        for band in DifficultyBand::ALL {
            let interval = self.bands.interval(band);
            if interval.is_empty() {
                return Err(LessonError::Validation(format!(
                    "band {} has empty rating interval {}",
                    band, interval
                )));
            }
        }
        let s = &self.selection;
        if s.pool_multiplier == 0 || s.pool_floor == 0 || s.pool_ceiling == 0 {
            return Err(LessonError::Validation("pool sizes must be positive".into()));
        }
        if s.pool_floor > s.pool_ceiling {
            return Err(LessonError::Validation(
                "pool_floor must not exceed pool_ceiling".into(),
            ));
        }
        if !(s.diversity_ceiling > 0.0 && s.diversity_ceiling <= 1.0) {
            return Err(LessonError::Validation(
                "diversity_ceiling must be in (0, 1]".into(),
            ));
        }
        if s.max_desired_count == 0 {
            return Err(LessonError::Validation("max_desired_count must be positive".into()));
        }
        if self.cache.capacity == 0 {
            return Err(LessonError::Validation("cache capacity must be positive".into()));
        }
        for (name, theme) in &self.themes {
            if theme.sub_themes.iter().any(|s| s == name) {
                return Err(LessonError::Validation(format!(
                    "theme '{}' lists itself as a sub-theme",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn theme(&self, name: &str) -> Option<&ThemeInfo> {
        self.themes.get(name)
    }

    pub fn is_known_theme(&self, name: &str) -> bool {
        self.themes.contains_key(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeInfo {
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    /// Narrower tags that also count as membership; makes this a category
    #[serde(default)]
    pub sub_themes: Vec<String>,
}

impl ThemeInfo {
    fn new(display_name: &str, description: &str, key_concepts: &[&str], sub_themes: &[&str]) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: description.to_string(),
            key_concepts: key_concepts.iter().map(|s| s.to_string()).collect(),
            sub_themes: sub_themes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_category(&self) -> bool {
        !self.sub_themes.is_empty()
    }
}

fn default_themes() -> BTreeMap<String, ThemeInfo> {
    let mut themes = BTreeMap::new();
    themes.insert("fork".into(), ThemeInfo::new(
        "Fork Tactics",
        "Master the art of attacking two pieces simultaneously",
        &["double_attack", "piece_coordination", "material_gain"],
        &[],
    ));
    themes.insert("pin".into(), ThemeInfo::new(
        "Pin Tactics",
        "Learn to immobilize opponent pieces effectively",
        &["absolute_pin", "relative_pin", "pin_breaking"],
        &[],
    ));
    themes.insert("skewer".into(), ThemeInfo::new(
        "Skewer Tactics",
        "Force valuable pieces to move and capture what's behind",
        &["x_ray_attack", "piece_alignment", "forcing_moves"],
        &[],
    ));
    themes.insert("discoveredAttack".into(), ThemeInfo::new(
        "Discovered Attack",
        "Unleash hidden power by moving blocking pieces",
        &["discovery", "double_threat", "piece_coordination"],
        &[],
    ));
    themes.insert("deflection".into(), ThemeInfo::new(
        "Deflection Tactics",
        "Remove key defending pieces",
        &["overloaded_pieces", "defensive_duties", "tactical_shots"],
        &[],
    ));
    themes.insert("attraction".into(), ThemeInfo::new(
        "Attraction Tactics",
        "Lure pieces to vulnerable squares",
        &["piece_misdirection", "decoy_sacrifice"],
        &[],
    ));
    themes.insert("sacrifice".into(), ThemeInfo::new(
        "Tactical Sacrifices",
        "Invest material for decisive advantage",
        &["material_investment", "compensation", "calculation"],
        &[],
    ));
    themes.insert("mateIn1".into(), ThemeInfo::new(
        "Mate in One",
        "Find immediate checkmate opportunities",
        &["pattern_recognition", "tactical_vision", "quick_calculation"],
        &[],
    ));
    themes.insert("mateIn2".into(), ThemeInfo::new(
        "Mate in Two",
        "Execute two-move checkmate sequences",
        &["calculation", "forcing_moves", "mating_nets"],
        &[],
    ));
    themes.insert("mate".into(), ThemeInfo::new(
        "Checkmate Patterns",
        "Deliver decisive checkmate attacks",
        &["mating_patterns", "king_safety", "forcing_sequences"],
        &["mateIn1", "mateIn2", "mateIn3", "backRankMate", "smotheredMate"],
    ));
    themes.insert("tactics".into(), ThemeInfo::new(
        "Core Tactics",
        "Recognise the basic tactical motifs that win material",
        &["double_attack", "pins_and_skewers", "forcing_moves"],
        &["fork", "pin", "skewer", "discoveredAttack", "deflection", "attraction", "sacrifice"],
    ));
    themes
}

/// Difficulty band to rating interval table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BandTable {
    pub beginner: RatingInterval,
    pub intermediate: RatingInterval,
    pub advanced: RatingInterval,
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            beginner: RatingInterval::new(600, 1200),
            intermediate: RatingInterval::new(1200, 1800),
            advanced: RatingInterval::new(1800, 2400),
        }
    }
}

impl BandTable {
    pub fn interval(&self, band: DifficultyBand) -> RatingInterval {
        match band {
            DifficultyBand::Beginner => self.beginner,
            DifficultyBand::Intermediate => self.intermediate,
            DifficultyBand::Advanced => self.advanced,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionTuning {
    pub pool_multiplier: usize,
    pub pool_floor: usize,
    pub pool_ceiling: usize,
    pub widen_step: u32,
    pub max_widenings: u32,
    /// Max fraction of the result drawn from one sub-theme of a category
    pub diversity_ceiling: f64,
    pub max_desired_count: usize,
}

impl Default for SelectionTuning {
    fn default() -> Self {
        Self {
            pool_multiplier: 6,
            pool_floor: 50,
            pool_ceiling: 1000,
            widen_step: 100,
            max_widenings: 3,
            diversity_ceiling: 0.6,
            max_desired_count: 50,
        }
    }
}

impl SelectionTuning {
    pub fn pool_size(&self, desired_count: usize) -> usize {
        desired_count
            .saturating_mul(self.pool_multiplier)
            .max(self.pool_floor)
            .min(self.pool_ceiling)
    }

    /// Per-sub-theme cap for a result of `desired_count` examples
    pub fn per_sub_theme_cap(&self, desired_count: usize) -> usize {
        ((self.diversity_ceiling * desired_count as f64 + 1e-9).floor() as usize).max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub popularity: f64,
    pub plays: f64,
    pub centering: f64,
    pub brevity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            popularity: 0.35,
            plays: 0.20,
            centering: 0.30,
            brevity: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            capacity: 256,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub timeout_ms: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

impl NarrativeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
