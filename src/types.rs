//! Core type definitions for puzzle selection and lesson assembly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::LessonError;

/// Immutable puzzle row from the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleRecord {
    pub id: String,
    pub fen: String,              // full FEN of the starting position
    pub solution: Vec<String>,    // moves as stored in the corpus (UCI)
    pub rating: Option<u32>,      // None = unrated
    pub themes: BTreeSet<String>,
    pub popularity: i32,          // community vote signal, -100..=100 on Lichess
    pub plays: u32,
    pub game_url: Option<String>,
}

impl PuzzleRecord {
    /// Key used for transposition dedup: placement, side to move, castling and
    /// en passant. Halfmove and fullmove counters are ignored.
    pub fn position_key(&self) -> String {
        self.fen
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn side_to_move(&self) -> Side {
        match self.fen.split_whitespace().nth(1) {
            Some("b") => Side::Black,
            _ => Side::White,
        }
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.contains(theme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("White"),
            Side::Black => f.write_str("Black"),
        }
    }
}

/// Named difficulty band; ordered beginner < intermediate < advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyBand {
    pub const ALL: [DifficultyBand; 3] = [
        DifficultyBand::Beginner,
        DifficultyBand::Intermediate,
        DifficultyBand::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyBand::Beginner => "beginner",
            DifficultyBand::Intermediate => "intermediate",
            DifficultyBand::Advanced => "advanced",
        }
    }

    /// Prefix used when titling a lesson
    pub fn title_prefix(&self) -> &'static str {
        match self {
            DifficultyBand::Beginner => "Introduction to",
            DifficultyBand::Intermediate => "Mastering",
            DifficultyBand::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for DifficultyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyBand {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(DifficultyBand::Beginner),
            "intermediate" => Ok(DifficultyBand::Intermediate),
            "advanced" => Ok(DifficultyBand::Advanced),
            other => Err(LessonError::Validation(format!(
                "unknown difficulty band '{}' (expected beginner, intermediate or advanced)",
                other
            ))),
        }
    }
}

/// Inclusive rating interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatingInterval {
    pub low: u32,
    pub high: u32,
}

impl RatingInterval {
    pub fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn contains(&self, rating: u32) -> bool {
        rating >= self.low && rating <= self.high
    }

    pub fn midpoint(&self) -> f64 {
        (self.low as f64 + self.high as f64) / 2.0
    }

    pub fn half_width(&self) -> f64 {
        (self.high as f64 - self.low as f64) / 2.0
    }

    /// Move both bounds outward by `step`; the low bound saturates at 0
    pub fn widened(&self, step: u32) -> Self {
        Self {
            low: self.low.saturating_sub(step),
            high: self.high.saturating_add(step),
        }
    }
}

impl fmt::Display for RatingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Ordering applied to the final example set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExampleOrder {
    /// Best score first
    #[default]
    Ranked,
    /// Easiest first (rating ascending)
    Progressive,
}

/// Validated request handed to the selector
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub theme: String,
    pub difficulty: DifficultyBand,
    pub desired_count: usize,
    pub rating_override: Option<RatingInterval>,
    pub excluded_themes: BTreeSet<String>,
    pub min_popularity: Option<i32>,
    pub order: ExampleOrder,
}

impl SelectionRequest {
    pub fn new(theme: impl Into<String>, difficulty: DifficultyBand, desired_count: usize) -> Self {
        Self {
            theme: theme.into(),
            difficulty,
            desired_count,
            rating_override: None,
            excluded_themes: BTreeSet::new(),
            min_popularity: None,
            order: ExampleOrder::Ranked,
        }
    }
}

/// How a record matched the requested theme
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "sub_theme", rename_all = "snake_case")]
pub enum ThemeMatch {
    /// Carries the requested tag itself
    Exact,
    /// Matched through one of the requested category's sub-themes
    SubTheme(String),
}

/// Candidate with its computed quality score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredExample {
    pub record: PuzzleRecord,
    pub score: f64,
    pub theme_match: ThemeMatch,
    /// Sub-theme bucket used for the diversity ceiling
    pub sub_theme: String,
}

/// Ordered, duplicate-free selection result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleSet {
    pub examples: Vec<ScoredExample>,
    pub interval: RatingInterval,
    pub stats: SelectionStats,
}

impl ExampleSet {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.examples.iter().map(|e| e.record.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub candidates_fetched: usize,
    pub rejected_duplicate_id: usize,
    pub rejected_transposition: usize,
    pub rejected_diversity: usize,
    pub widenings: u32,
    pub pool_growths: u32,
    pub attempts: u32,
}

/// Public view of a selected puzzle (no internal scores)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleExample {
    pub id: String,
    pub fen: String,
    pub solution: Vec<String>,
    pub rating: Option<u32>,
    pub themes: Vec<String>,
    pub popularity: i32,
    pub plays: u32,
    pub side_to_move: Side,
    pub game_url: Option<String>,
}

impl From<&ScoredExample> for PuzzleExample {
    fn from(scored: &ScoredExample) -> Self {
        let record = &scored.record;
        Self {
            id: record.id.clone(),
            fen: record.fen.clone(),
            solution: record.solution.clone(),
            rating: record.rating,
            themes: record.themes.iter().cloned().collect(),
            popularity: record.popularity,
            plays: record.plays,
            side_to_move: record.side_to_move(),
            game_url: record.game_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Example,
    Solution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonStep {
    pub order: usize,
    pub kind: StepKind,
    pub title: String,
    pub content: String,
    pub puzzle_id: String,
    pub fen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Generated,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonMetadata {
    pub generated_at: DateTime<Utc>,
    pub requested_count: usize,
    pub example_count: usize,
    pub avg_rating: Option<f64>,
    pub min_rating: Option<u32>,
    pub max_rating: Option<u32>,
    pub themes_covered: Vec<String>,
    pub rating_interval: RatingInterval,
    pub widenings: u32,
    pub narrative_source: NarrativeSource,
    pub from_cache: bool,
    pub estimated_duration_minutes: usize,
    pub selection_time_ms: u64,
}

/// Assembled lesson; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub theme: String,
    pub difficulty: DifficultyBand,
    pub title: String,
    pub introduction: String,
    pub summary: String,
    pub examples: Vec<PuzzleExample>,
    pub steps: Vec<LessonStep>,
    pub metadata: LessonMetadata,
}

/// Caller-supplied knobs for `generate_lesson`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LessonOptions {
    pub rating_low: Option<u32>,
    pub rating_high: Option<u32>,
    pub excluded_themes: BTreeSet<String>,
    pub min_popularity: Option<i32>,
    pub cache_enabled: bool,
    pub progressive: bool,
    pub allow_partial: bool,
}

impl Default for LessonOptions {
    fn default() -> Self {
        Self {
            rating_low: None,
            rating_high: None,
            excluded_themes: BTreeSet::new(),
            min_popularity: None,
            cache_enabled: true,
            progressive: false,
            allow_partial: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fen: &str) -> PuzzleRecord {
        PuzzleRecord {
            id: "p1".to_string(),
            fen: fen.to_string(),
            solution: vec!["e2e4".to_string()],
            rating: Some(1500),
            themes: BTreeSet::new(),
            popularity: 90,
            plays: 1000,
            game_url: None,
        }
    }

    #[test]
    fn test_position_key_ignores_move_counters() {
        let a = record("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
        let b = record("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 17");
        assert_eq!(a.position_key(), b.position_key());

        let c = record("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 2 3");
        assert_ne!(a.position_key(), c.position_key());
    }

    #[test]
    fn test_side_to_move() {
        assert_eq!(record("8/8/8/8/8/8/8/K6k b - - 0 1").side_to_move(), Side::Black);
        assert_eq!(record("8/8/8/8/8/8/8/K6k w - - 0 1").side_to_move(), Side::White);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("Advanced".parse::<DifficultyBand>().unwrap(), DifficultyBand::Advanced);
        assert!(matches!(
            "grandmaster".parse::<DifficultyBand>(),
            Err(LessonError::Validation(_))
        ));
        assert!(DifficultyBand::Beginner < DifficultyBand::Intermediate);
        assert!(DifficultyBand::Intermediate < DifficultyBand::Advanced);
    }

    #[test]
    fn test_interval_widening_saturates() {
        let interval = RatingInterval::new(50, 400);
        let wide = interval.widened(100);
        assert_eq!(wide, RatingInterval::new(0, 500));
        assert!(wide.contains(0));
        assert!(!RatingInterval::new(10, 5).contains(7));
        assert!(RatingInterval::new(10, 5).is_empty());
    }
}
