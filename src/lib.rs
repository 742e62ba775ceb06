//! chess-lessons - Puzzle example selection and lesson assembly
//!
//! Picks a diverse, quality-ranked, duplicate-free set of puzzles for a
//! tactical theme and difficulty band, then wraps them in a lesson:
//! - Indexed in-memory puzzle store (Lichess CSV)
//! - Deterministic scoring + greedy selection with rating widening
//! - TTL/LRU selection cache
//! - Best-effort narrative with template fallback
//! - JSON / Markdown / PGN export, HTTP surface

pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod scoring;
pub mod selection;
pub mod cache;
pub mod narrative;
pub mod http_narrative; // OpenAI-compatible narrative generator
pub mod lesson_builder;
pub mod export;
pub mod server;
pub mod telemetry;

pub use types::*;
pub use error::LessonError;
pub use config::{EngineConfig, ThemeInfo};
pub use store::{CandidateQuery, MemoryPuzzleStore, PuzzleStore};
pub use selection::ExampleSelector;
pub use cache::{CacheKey, CacheStats, SelectionCache};
pub use narrative::{MockNarrativeGen, Narrative, NarrativeGenerator, NarrativeRequest, TemplateNarrativeGen};
pub use http_narrative::HttpNarrativeGen;
pub use lesson_builder::{LessonBuilder, SharedLessonBuilder};
pub use export::{export, ExportFormat};
