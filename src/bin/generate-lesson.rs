//! Generate one lesson from the command line and print it to stdout
//!
//! Usage: generate-lesson <theme> <difficulty> <count> [--format json|markdown|pgn]
//!        [--min-popularity N] [--exclude t1,t2] [--rating LO-HI]
//!        [--progressive] [--allow-partial] [--no-cache]

use anyhow::{bail, Context, Result};
use chess_lessons::{
    export, telemetry, DifficultyBand, EngineConfig, ExportFormat, HttpNarrativeGen, LessonBuilder,
    LessonOptions, MemoryPuzzleStore, NarrativeGenerator, TemplateNarrativeGen,
};
use std::sync::Arc;

const USAGE: &str = "usage: generate-lesson <theme> <difficulty> <count> [--format json|markdown|pgn] \
[--min-popularity N] [--exclude t1,t2] [--rating LO-HI] [--progressive] [--allow-partial] [--no-cache]";

struct Args {
    theme: String,
    difficulty: DifficultyBand,
    count: usize,
    format: ExportFormat,
    options: LessonOptions,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let mut format = ExportFormat::Json;
    let mut options = LessonOptions::default();

    while let Some(arg) = raw.next() {
        let mut value = |flag: &str| raw.next().with_context(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--format" => format = value("--format")?.parse()?,
            "--min-popularity" => {
                options.min_popularity = Some(value("--min-popularity")?.parse().context("--min-popularity")?)
            }
            "--exclude" => {
                options.excluded_themes = value("--exclude")?
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "--rating" => {
                let range = value("--rating")?;
                let (lo, hi) = range.split_once('-').context("--rating expects LO-HI")?;
                options.rating_low = Some(lo.trim().parse().context("--rating low bound")?);
                options.rating_high = Some(hi.trim().parse().context("--rating high bound")?);
            }
            "--progressive" => options.progressive = true,
            "--allow-partial" => options.allow_partial = true,
            "--no-cache" => options.cache_enabled = false,
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let [theme, difficulty, count] = <[String; 3]>::try_from(positional)
        .map_err(|_| anyhow::anyhow!(USAGE))?;

    Ok(Args {
        theme,
        difficulty: difficulty.parse()?,
        count: count.parse().with_context(|| format!("invalid count '{}'", count))?,
        format,
        options,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = parse_args(std::env::args().skip(1))?;
    let config = EngineConfig::from_env().context("Failed to load engine config")?;

    let csv_path = std::env::var("PUZZLE_CSV_PATH")
        .context("PUZZLE_CSV_PATH must point at a Lichess puzzle CSV export")?;
    let store = MemoryPuzzleStore::from_lichess_csv(&csv_path, &config.themes)?;

    let narrator: Box<dyn NarrativeGenerator> = match HttpNarrativeGen::from_env(config.narrative.timeout()) {
        Some(generator) => Box::new(generator?),
        None => Box::new(TemplateNarrativeGen),
    };

    let builder = LessonBuilder::new(Arc::new(config), Arc::new(store), narrator);
    let lesson = builder
        .generate_lesson(&args.theme, args.difficulty, args.count, args.options)
        .await?;

    println!("{}", export(&lesson, args.format)?);
    Ok(())
}
