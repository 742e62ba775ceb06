//! Lesson Builder: validate, select (through the cache), narrate, assemble

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStats, SelectionCache};
use crate::config::EngineConfig;
use crate::error::LessonError;
use crate::narrative::{template_narrative, Narrative, NarrativeGenerator, NarrativeRequest};
use crate::selection::ExampleSelector;
use crate::store::PuzzleStore;
use crate::types::*;

/// Minutes of study budgeted per example
const MINUTES_PER_EXAMPLE: usize = 5;

/// Main lesson builder (thread-safe via Arc)
pub struct LessonBuilder {
    config: Arc<EngineConfig>,
    selector: ExampleSelector,
    cache: Option<SelectionCache>,
    narrator: Box<dyn NarrativeGenerator>,
}

pub type SharedLessonBuilder = Arc<LessonBuilder>;

impl LessonBuilder {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn PuzzleStore>,
        narrator: Box<dyn NarrativeGenerator>,
    ) -> SharedLessonBuilder {
        let cache = config
            .cache
            .enabled
            .then(|| SelectionCache::from_config(&config.cache));
        info!(
            store = store.name(),
            narrator = narrator.name(),
            cache = cache.is_some(),
            themes = config.themes.len(),
            "Lesson builder initialized"
        );
        Arc::new(Self {
            selector: ExampleSelector::new(store, config.clone()),
            config,
            cache,
            narrator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// None when caching is disabled in configuration
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(SelectionCache::stats)
    }

    /// Validate caller input into a selection request. Runs before any store access.
    pub fn build_request(
        &self,
        theme: &str,
        difficulty: DifficultyBand,
        desired_count: usize,
        options: &LessonOptions,
    ) -> Result<SelectionRequest, LessonError> {
        if !self.config.is_known_theme(theme) {
            return Err(LessonError::Validation(format!("unknown theme '{}'", theme)));
        }
        let max = self.config.selection.max_desired_count;
        if desired_count == 0 || desired_count > max {
            return Err(LessonError::Validation(format!(
                "desired count must be between 1 and {}, got {}",
                max, desired_count
            )));
        }
        if options.excluded_themes.contains(theme) {
            return Err(LessonError::Validation(format!(
                "theme '{}' cannot also be excluded",
                theme
            )));
        }

        let rating_override = match (options.rating_low, options.rating_high) {
            (None, None) => None,
            (low, high) => {
                let band = self.config.bands.interval(difficulty);
                let interval = RatingInterval::new(low.unwrap_or(band.low), high.unwrap_or(band.high));
                if interval.is_empty() {
                    return Err(LessonError::Validation(format!(
                        "rating_low must not exceed rating_high ({})",
                        interval
                    )));
                }
                Some(interval)
            }
        };

        Ok(SelectionRequest {
            theme: theme.to_string(),
            difficulty,
            desired_count,
            rating_override,
            excluded_themes: options.excluded_themes.clone(),
            min_popularity: options.min_popularity,
            order: if options.progressive {
                ExampleOrder::Progressive
            } else {
                ExampleOrder::Ranked
            },
        })
    }

    /// Run the selector, consulting the cache first when allowed.
    /// Returns the set and whether it came from the cache.
    pub async fn select_examples(
        &self,
        request: &SelectionRequest,
        use_cache: bool,
    ) -> Result<(ExampleSet, bool), LessonError> {
        let cache = self.cache.as_ref().filter(|_| use_cache);
        let Some(cache) = cache else {
            return Ok((self.selector.select(request).await?, false));
        };

        let key = CacheKey::new(request, self.selector.resolve_interval(request)?);
        if let Some(set) = cache.get(&key) {
            debug!(theme = %request.theme, difficulty = %request.difficulty, "Selection cache hit");
            return Ok((set, true));
        }

        let set = self.selector.select(request).await?;
        cache.put(key, set.clone());
        Ok((set, false))
    }

    /// Main entry point: build one lesson end to end
    pub async fn generate_lesson(
        &self,
        theme: &str,
        difficulty: DifficultyBand,
        desired_count: usize,
        options: LessonOptions,
    ) -> Result<Lesson, LessonError> {
        let start = Instant::now();

        // Step 1: Validate
        let request = self.build_request(theme, difficulty, desired_count, &options)?;
        let theme_info = self
            .config
            .theme(theme)
            .ok_or_else(|| LessonError::ThemeNotFound(theme.to_string()))?;

        info!(
            theme,
            difficulty = %difficulty,
            desired_count,
            cache = options.cache_enabled,
            "Generating lesson"
        );

        // Step 2: Select examples
        let (set, from_cache) = match self.select_examples(&request, options.cache_enabled).await {
            Ok(found) => found,
            Err(LessonError::InsufficientExamples { found, requested, partial })
                if options.allow_partial && !partial.is_empty() =>
            {
                warn!(theme, found, requested, "Accepting partial example set");
                (*partial, false)
            }
            Err(e) => return Err(e),
        };
        let selection_time_ms = start.elapsed().as_millis() as u64;
        let examples: Vec<PuzzleExample> = set.examples.iter().map(PuzzleExample::from).collect();

        // Step 3: Narrative (best effort)
        let narrative_request = NarrativeRequest::new(theme, theme_info, difficulty, &examples);
        let (narrative, narrative_source) = self.narrate(&narrative_request).await;

        // Step 4: Assemble
        let metadata = build_metadata(&examples, &set, desired_count, narrative_source, from_cache, selection_time_ms);
        let lesson = Lesson {
            id: Uuid::new_v4().to_string(),
            theme: theme.to_string(),
            difficulty,
            title: format!("{} {}", difficulty.title_prefix(), theme_info.display_name),
            introduction: narrative.introduction,
            summary: narrative.summary,
            steps: build_steps(&examples),
            examples,
            metadata,
        };

        info!(
            lesson_id = %lesson.id,
            examples = lesson.examples.len(),
            interval = %lesson.metadata.rating_interval,
            narrative = ?lesson.metadata.narrative_source,
            from_cache,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Lesson generated"
        );

        Ok(lesson)
    }

    /// Call the narrator under the configured timeout; any failure falls back to templates
    async fn narrate(&self, request: &NarrativeRequest) -> (Narrative, NarrativeSource) {
        let timeout = self.config.narrative.timeout();
        let failure = match tokio::time::timeout(timeout, self.narrator.generate(request)).await {
            Ok(Ok(narrative))
                if !narrative.introduction.trim().is_empty() && !narrative.summary.trim().is_empty() =>
            {
                return (narrative, NarrativeSource::Generated);
            }
            Ok(Ok(_)) => LessonError::NarrativeGeneration("empty narrative returned".into()),
            Ok(Err(e)) => LessonError::NarrativeGeneration(format!("{:#}", e)),
            Err(_) => LessonError::NarrativeGeneration(format!("timed out after {:?}", timeout)),
        };

        warn!(
            narrator = self.narrator.name(),
            theme = %request.theme,
            error = %failure,
            "Falling back to template narrative"
        );
        (template_narrative(request), NarrativeSource::Template)
    }
}

/// Two steps per example: the position, then its solution
pub fn build_steps(examples: &[PuzzleExample]) -> Vec<LessonStep> {
    let mut steps = Vec::with_capacity(examples.len() * 2);
    for (i, example) in examples.iter().enumerate() {
        let n = i + 1;
        let rating = example
            .rating
            .map_or_else(|| "unrated".to_string(), |r| r.to_string());
        steps.push(LessonStep {
            order: steps.len() + 1,
            kind: StepKind::Example,
            title: format!("Example {}: Find the best move for {}", n, example.side_to_move),
            content: format!(
                "{} to move. Analyze the position and find the best continuation. Rating: {}",
                example.side_to_move, rating
            ),
            puzzle_id: example.id.clone(),
            fen: example.fen.clone(),
        });
        steps.push(LessonStep {
            order: steps.len() + 1,
            kind: StepKind::Solution,
            title: format!("Solution {}", n),
            content: format!("Solution: {}", example.solution.join(" ")),
            puzzle_id: example.id.clone(),
            fen: example.fen.clone(),
        });
    }
    steps
}

fn build_metadata(
    examples: &[PuzzleExample],
    set: &ExampleSet,
    requested_count: usize,
    narrative_source: NarrativeSource,
    from_cache: bool,
    selection_time_ms: u64,
) -> LessonMetadata {
    let ratings: Vec<u32> = examples.iter().filter_map(|e| e.rating).collect();
    let avg_rating = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().map(|&r| r as f64).sum::<f64>() / ratings.len() as f64)
    };
    let themes_covered: BTreeSet<String> = examples.iter().flat_map(|e| e.themes.iter().cloned()).collect();

    LessonMetadata {
        generated_at: Utc::now(),
        requested_count,
        example_count: examples.len(),
        avg_rating,
        min_rating: ratings.iter().copied().min(),
        max_rating: ratings.iter().copied().max(),
        themes_covered: themes_covered.into_iter().collect(),
        rating_interval: set.interval,
        widenings: set.stats.widenings,
        narrative_source,
        from_cache,
        estimated_duration_minutes: examples.len() * MINUTES_PER_EXAMPLE,
        selection_time_ms,
    }
}
