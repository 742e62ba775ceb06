//! Chess lessons HTTP server binary

use anyhow::Context;
use chess_lessons::{
    server, telemetry, EngineConfig, HttpNarrativeGen, LessonBuilder, MemoryPuzzleStore,
    NarrativeGenerator, TemplateNarrativeGen,
};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 8090;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Chess lessons server");

    let config = EngineConfig::from_env().context("Failed to load engine config")?;

    let csv_path = std::env::var("PUZZLE_CSV_PATH")
        .context("PUZZLE_CSV_PATH must point at a Lichess puzzle CSV export")?;
    let store = MemoryPuzzleStore::from_lichess_csv(&csv_path, &config.themes)?;
    info!(path = %csv_path, puzzles = store.len(), "Puzzle store ready");

    let narrator: Box<dyn NarrativeGenerator> = match HttpNarrativeGen::from_env(config.narrative.timeout()) {
        Some(generator) => {
            info!("Narrative: chat completions API");
            Box::new(generator?)
        }
        None => {
            warn!("OPENAI_API_KEY not set, lessons will use template narrative");
            Box::new(TemplateNarrativeGen)
        }
    };

    let port = match std::env::var("PORT") {
        Ok(p) => p.parse::<u16>().with_context(|| format!("Invalid PORT '{}'", p))?,
        Err(_) => DEFAULT_PORT,
    };

    let builder = LessonBuilder::new(Arc::new(config), Arc::new(store), narrator);
    server::run_server(builder, port).await?;

    Ok(())
}
