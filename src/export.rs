//! Lesson exporters: JSON, Markdown and PGN

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::LessonError;
use crate::types::Lesson;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
    Pgn,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Pgn => "application/x-chess-pgn",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "pgn" => Ok(ExportFormat::Pgn),
            other => Err(LessonError::Validation(format!(
                "unsupported export format '{}' (expected json, markdown or pgn)",
                other
            ))),
        }
    }
}

pub fn export(lesson: &Lesson, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(lesson).context("Failed to serialize lesson"),
        ExportFormat::Markdown => Ok(to_markdown(lesson)),
        ExportFormat::Pgn => Ok(to_pgn(lesson)),
    }
}

pub fn to_markdown(lesson: &Lesson) -> String {
    let meta = &lesson.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", lesson.title);
    let _ = writeln!(out, "**Theme:** {}  ", lesson.theme);
    let _ = writeln!(out, "**Difficulty:** {}  ", lesson.difficulty);
    let _ = writeln!(out, "**Examples:** {}  ", meta.example_count);
    if let Some(avg) = meta.avg_rating {
        let _ = writeln!(out, "**Average rating:** {:.0}  ", avg);
    }
    let _ = writeln!(out, "**Estimated time:** {} minutes\n", meta.estimated_duration_minutes);

    let _ = writeln!(out, "## Introduction\n\n{}\n", lesson.introduction);

    for (i, example) in lesson.examples.iter().enumerate() {
        let _ = writeln!(out, "## Example {}\n", i + 1);
        let _ = writeln!(out, "- **Puzzle:** {}", example.id);
        let _ = writeln!(out, "- **To move:** {}", example.side_to_move);
        match example.rating {
            Some(r) => {
                let _ = writeln!(out, "- **Rating:** {}", r);
            }
            None => {
                let _ = writeln!(out, "- **Rating:** unrated");
            }
        }
        let _ = writeln!(out, "- **Themes:** {}", example.themes.join(", "));
        if let Some(url) = &example.game_url {
            let _ = writeln!(out, "- **Game:** {}", url);
        }
        let _ = writeln!(out, "\n**Position (FEN):** `{}`\n", example.fen);
        let _ = writeln!(
            out,
            "<details>\n<summary>Solution</summary>\n\n`{}`\n\n</details>\n",
            example.solution.join(" ")
        );
    }

    let _ = writeln!(out, "## Summary\n\n{}", lesson.summary);
    out
}

/// One game per example. Moves are carried in a comment in corpus notation.
pub fn to_pgn(lesson: &Lesson) -> String {
    let date = lesson.metadata.generated_at.format("%Y.%m.%d");
    let mut games = Vec::with_capacity(lesson.examples.len());

    for (i, example) in lesson.examples.iter().enumerate() {
        let mut game = String::new();
        let _ = writeln!(game, "[Event \"{}\"]", escape(&lesson.title));
        let _ = writeln!(game, "[Site \"{}\"]", escape(example.game_url.as_deref().unwrap_or("?")));
        let _ = writeln!(game, "[Date \"{}\"]", date);
        let _ = writeln!(game, "[Round \"{}\"]", i + 1);
        let _ = writeln!(game, "[White \"?\"]");
        let _ = writeln!(game, "[Black \"?\"]");
        let _ = writeln!(game, "[Result \"*\"]");
        let _ = writeln!(game, "[SetUp \"1\"]");
        let _ = writeln!(game, "[FEN \"{}\"]", example.fen);
        let _ = writeln!(game, "[PuzzleId \"{}\"]", escape(&example.id));
        if let Some(r) = example.rating {
            let _ = writeln!(game, "[PuzzleRating \"{}\"]", r);
        }
        let _ = writeln!(game, "[PuzzleThemes \"{}\"]", escape(&example.themes.join(" ")));
        let _ = writeln!(game);
        let _ = writeln!(
            game,
            "{{ {} to move. Solution (UCI): {} }} *",
            example.side_to_move,
            example.solution.join(" ").replace('}', "")
        );
        games.push(game);
    }

    games.join("\n")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::{TimeZone, Utc};

    fn lesson() -> Lesson {
        let example = PuzzleExample {
            id: "00sHx".to_string(),
            fen: "q3k1nr/1pp1nQpp/3p4/1P2p3/4P3/B1PP1b2/B5PP/5K2 b k - 0 17".to_string(),
            solution: vec!["e8d7".to_string(), "a2e6".to_string(), "d7d8".to_string(), "f7f8".to_string()],
            rating: Some(1760),
            themes: vec!["mate".to_string(), "mateIn2".to_string()],
            popularity: 95,
            plays: 7000,
            side_to_move: Side::Black,
            game_url: Some("https://lichess.org/yyznGmXs/black#34".to_string()),
        };
        Lesson {
            id: "lesson-1".to_string(),
            theme: "mate".to_string(),
            difficulty: DifficultyBand::Intermediate,
            title: "Mastering \"Checkmate\" Patterns".to_string(),
            introduction: "Welcome.".to_string(),
            summary: "Well done.".to_string(),
            steps: vec![],
            examples: vec![example],
            metadata: LessonMetadata {
                generated_at: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
                requested_count: 1,
                example_count: 1,
                avg_rating: Some(1760.0),
                min_rating: Some(1760),
                max_rating: Some(1760),
                themes_covered: vec!["mate".to_string(), "mateIn2".to_string()],
                rating_interval: RatingInterval::new(1200, 1800),
                widenings: 0,
                narrative_source: NarrativeSource::Template,
                from_cache: false,
                estimated_duration_minutes: 5,
                selection_time_ms: 3,
            },
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("pgn".parse::<ExportFormat>().unwrap(), ExportFormat::Pgn);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_json_export_parses_back() {
        let json = export(&lesson(), ExportFormat::Json).unwrap();
        let parsed: Lesson = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lesson());
    }

    #[test]
    fn test_markdown_sections() {
        let md = to_markdown(&lesson());
        assert!(md.starts_with("# Mastering \"Checkmate\" Patterns"));
        assert!(md.contains("## Introduction\n\nWelcome."));
        assert!(md.contains("## Example 1"));
        assert!(md.contains("`e8d7 a2e6 d7d8 f7f8`"));
        assert!(md.contains("- **Game:** https://lichess.org/yyznGmXs/black#34"));
        assert!(md.trim_end().ends_with("Well done."));
    }

    #[test]
    fn test_pgn_headers() {
        let pgn = to_pgn(&lesson());
        assert!(pgn.contains("[Event \"Mastering \\\"Checkmate\\\" Patterns\"]"));
        assert!(pgn.contains("[Date \"2024.03.09\"]"));
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains("[FEN \"q3k1nr/1pp1nQpp/3p4/1P2p3/4P3/B1PP1b2/B5PP/5K2 b k - 0 17\"]"));
        assert!(pgn.contains("{ Black to move. Solution (UCI): e8d7 a2e6 d7d8 f7f8 } *"));
    }
}
