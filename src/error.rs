//! Error taxonomy for selection and lesson assembly

use crate::types::ExampleSet;

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    /// Bad theme, band, count or filter. Caller's fault, never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown theme '{0}'")]
    ThemeNotFound(String),

    #[error("puzzle store unavailable: {0}")]
    StoreUnavailable(String),

    /// Even maximal widening could not satisfy the request. `partial` is the
    /// best set found so the caller may accept a shorter lesson.
    #[error("insufficient examples: {found} found, {requested} requested")]
    InsufficientExamples {
        found: usize,
        requested: usize,
        partial: Box<ExampleSet>,
    },

    /// Recovered locally by the builder; never surfaced as a lesson failure.
    #[error("narrative generation failed: {0}")]
    NarrativeGeneration(String),
}

impl LessonError {
    /// Short machine-readable code, used by the HTTP surface
    pub fn code(&self) -> &'static str {
        match self {
            LessonError::Validation(_) => "validation_error",
            LessonError::ThemeNotFound(_) => "theme_not_found",
            LessonError::StoreUnavailable(_) => "store_unavailable",
            LessonError::InsufficientExamples { .. } => "insufficient_examples",
            LessonError::NarrativeGeneration(_) => "narrative_generation_error",
        }
    }
}
