//! Example selection: rank candidates, then greedily accept under dedup and
//! sub-theme diversity constraints, widening the rating band when the corpus
//! runs dry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, ScoreWeights, ThemeInfo};
use crate::error::LessonError;
use crate::scoring::score;
use crate::store::{CandidateQuery, PuzzleStore};
use crate::types::*;

pub struct ExampleSelector {
    store: Arc<dyn PuzzleStore>,
    config: Arc<EngineConfig>,
}

impl ExampleSelector {
    pub fn new(store: Arc<dyn PuzzleStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rating interval for a request: explicit override, else the band table
    pub fn resolve_interval(&self, request: &SelectionRequest) -> Result<RatingInterval, LessonError> {
        let interval = request
            .rating_override
            .unwrap_or_else(|| self.config.bands.interval(request.difficulty));
        if interval.is_empty() {
            return Err(LessonError::Validation(format!(
                "rating interval {} is empty",
                interval
            )));
        }
        Ok(interval)
    }

    /// Select up to `desired_count` examples. Fails with `InsufficientExamples`
    /// (carrying the partial set) when widening is exhausted.
    pub async fn select(&self, request: &SelectionRequest) -> Result<ExampleSet, LessonError> {
        let start = Instant::now();
        let theme_info = self
            .config
            .theme(&request.theme)
            .ok_or_else(|| LessonError::ThemeNotFound(request.theme.clone()))?;
        if request.desired_count == 0 {
            return Err(LessonError::Validation("desired count must be positive".into()));
        }

        let band = self.resolve_interval(request)?;
        let tuning = &self.config.selection;
        let desired = request.desired_count;

        info!(
            theme = %request.theme,
            difficulty = %request.difficulty,
            desired,
            band = %band,
            "Selecting examples"
        );

        let mut interval = band;
        let mut pool_size = tuning.pool_size(desired);
        let mut stats = SelectionStats::default();

        loop {
            stats.attempts += 1;
            let query = CandidateQuery {
                theme: request.theme.clone(),
                interval,
                min_popularity: request.min_popularity,
                excluded_themes: request.excluded_themes.clone(),
                pool_size,
            };
            let records = self.store.fetch_candidates(&query).await?;
            let saturated = records.len() >= pool_size;
            stats.candidates_fetched = records.len();

            let ranked = rank_candidates(records, &request.theme, theme_info, band, &self.config.weights);
            let cap = diversity_cap(&ranked, theme_info, tuning.per_sub_theme_cap(desired));

            let can_grow = saturated && pool_size < tuning.pool_ceiling;
            let can_widen = !saturated && stats.widenings < tuning.max_widenings;

            let outcome = select_greedy(ranked, desired, cap);
            stats.rejected_duplicate_id = outcome.rejected_duplicate_id;
            stats.rejected_transposition = outcome.rejected_transposition;
            stats.rejected_diversity = outcome.rejected_diversity;

            if outcome.accepted.len() >= desired {
                let set = finish(outcome.accepted, interval, stats, request.order);
                info!(
                    theme = %request.theme,
                    selected = set.len(),
                    interval = %set.interval,
                    widenings = set.stats.widenings,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Selection complete"
                );
                return Ok(set);
            }

            if can_grow {
                pool_size = (pool_size * 2).min(tuning.pool_ceiling);
                stats.pool_growths += 1;
                debug!(pool_size, accepted = outcome.accepted.len(), "Pool saturated, growing");
                continue;
            }

            if can_widen {
                interval = interval.widened(tuning.widen_step);
                stats.widenings += 1;
                debug!(
                    interval = %interval,
                    accepted = outcome.accepted.len(),
                    widenings = stats.widenings,
                    "Pool exhausted, widening rating interval"
                );
                continue;
            }

            let found = outcome.accepted.len();
            warn!(
                theme = %request.theme,
                found,
                requested = desired,
                interval = %interval,
                "Insufficient examples after widening"
            );
            let partial = finish(outcome.accepted, interval, stats, request.order);
            return Err(LessonError::InsufficientExamples {
                found,
                requested: desired,
                partial: Box::new(partial),
            });
        }
    }
}

/// Score every record and sort by score descending, id ascending on ties
pub fn rank_candidates(
    records: Vec<PuzzleRecord>,
    theme: &str,
    theme_info: &ThemeInfo,
    band: RatingInterval,
    weights: &ScoreWeights,
) -> Vec<ScoredExample> {
    let mut ranked: Vec<ScoredExample> = records
        .into_iter()
        .map(|record| {
            let (theme_match, sub_theme) = classify_theme(&record, theme, theme_info);
            ScoredExample {
                score: score(&record, band, weights),
                record,
                theme_match,
                sub_theme,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    ranked
}

/// Theme match strength and diversity bucket. Buckets are the first registered
/// sub-theme the record carries, or the requested theme itself.
fn classify_theme(record: &PuzzleRecord, theme: &str, theme_info: &ThemeInfo) -> (ThemeMatch, String) {
    let sub = theme_info.sub_themes.iter().find(|s| record.has_theme(s));
    let theme_match = if record.has_theme(theme) {
        ThemeMatch::Exact
    } else {
        match sub {
            Some(s) => ThemeMatch::SubTheme(s.clone()),
            None => ThemeMatch::Exact,
        }
    };
    let bucket = sub.cloned().unwrap_or_else(|| theme.to_string());
    (theme_match, bucket)
}

/// Per-bucket cap, only for categories whose pool spans several sub-themes
fn diversity_cap(ranked: &[ScoredExample], theme_info: &ThemeInfo, cap: usize) -> Option<usize> {
    if !theme_info.is_category() {
        return None;
    }
    let buckets: HashSet<&str> = ranked.iter().map(|c| c.sub_theme.as_str()).collect();
    if buckets.len() > 1 {
        Some(cap)
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct GreedyOutcome {
    pub accepted: Vec<ScoredExample>,
    pub rejected_duplicate_id: usize,
    pub rejected_transposition: usize,
    pub rejected_diversity: usize,
}

/// Walk `ranked` in order, accepting a candidate unless its id or position is
/// already taken or its sub-theme bucket is at `cap`. The cap is never relaxed,
/// so a short result means the pool lacks enough distinct sub-themes.
pub fn select_greedy(ranked: Vec<ScoredExample>, desired: usize, cap: Option<usize>) -> GreedyOutcome {
    let mut outcome = GreedyOutcome::default();
    let mut ids: HashSet<String> = HashSet::new();
    let mut positions: HashSet<String> = HashSet::new();
    let mut per_bucket: HashMap<String, usize> = HashMap::new();

    for cand in ranked {
        if outcome.accepted.len() >= desired {
            break;
        }
        if ids.contains(&cand.record.id) {
            outcome.rejected_duplicate_id += 1;
            continue;
        }
        let position = cand.record.position_key();
        if positions.contains(&position) {
            outcome.rejected_transposition += 1;
            continue;
        }
        if let Some(cap) = cap {
            if per_bucket.get(&cand.sub_theme).copied().unwrap_or(0) >= cap {
                outcome.rejected_diversity += 1;
                continue;
            }
        }

        ids.insert(cand.record.id.clone());
        positions.insert(position);
        *per_bucket.entry(cand.sub_theme.clone()).or_insert(0) += 1;
        outcome.accepted.push(cand);
    }

    outcome
}

fn finish(
    mut accepted: Vec<ScoredExample>,
    interval: RatingInterval,
    stats: SelectionStats,
    order: ExampleOrder,
) -> ExampleSet {
    match order {
        ExampleOrder::Ranked => accepted.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        }),
        ExampleOrder::Progressive => accepted.sort_by(|a, b| {
            a.record
                .rating
                .cmp(&b.record.rating)
                .then_with(|| a.record.id.cmp(&b.record.id))
        }),
    }
    ExampleSet {
        examples: accepted,
        interval,
        stats,
    }
}
