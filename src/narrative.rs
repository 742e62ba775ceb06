//! Narrative generation seam: introduction and summary prose for a lesson.
//!
//! Generators are best-effort. The lesson builder wraps every call in a timeout
//! and falls back to `template_narrative` on any failure.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::ThemeInfo;
use crate::types::{DifficultyBand, PuzzleExample};

/// Everything a generator gets to see about the lesson
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeRequest {
    pub theme: String,
    pub display_name: String,
    pub description: String,
    pub key_concepts: Vec<String>,
    pub difficulty: DifficultyBand,
    pub examples: Vec<ExampleBrief>,
}

/// Compact per-example description
#[derive(Debug, Clone, Serialize)]
pub struct ExampleBrief {
    pub id: String,
    pub rating: Option<u32>,
    pub side_to_move: String,
    pub themes: Vec<String>,
    pub solution_length: usize,
}

impl NarrativeRequest {
    pub fn new(theme: &str, info: &ThemeInfo, difficulty: DifficultyBand, examples: &[PuzzleExample]) -> Self {
        Self {
            theme: theme.to_string(),
            display_name: info.display_name.clone(),
            description: info.description.clone(),
            key_concepts: info.key_concepts.clone(),
            difficulty,
            examples: examples
                .iter()
                .map(|e| ExampleBrief {
                    id: e.id.clone(),
                    rating: e.rating,
                    side_to_move: e.side_to_move.to_string(),
                    themes: e.themes.clone(),
                    solution_length: e.solution.len(),
                })
                .collect(),
        }
    }

    pub fn average_rating(&self) -> Option<f64> {
        let ratings: Vec<f64> = self.examples.iter().filter_map(|e| e.rating).map(f64::from).collect();
        if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        }
    }

    /// One line per example, for prompts
    pub fn describe_examples(&self) -> String {
        self.examples
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "{}. {} to move, rating {}, {} moves, themes: {}",
                    i + 1,
                    e.side_to_move,
                    e.rating.map_or_else(|| "unrated".to_string(), |r| r.to_string()),
                    e.solution_length,
                    e.themes.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub introduction: String,
    pub summary: String,
}

/// Pluggable text generator
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &NarrativeRequest) -> Result<Narrative>;
}

/// Static prose used when generation fails or times out
pub fn template_narrative(request: &NarrativeRequest) -> Narrative {
    let avg = request
        .average_rating()
        .map_or_else(|| "unrated".to_string(), |r| format!("{:.0}", r));
    let concepts = request
        .key_concepts
        .iter()
        .map(|c| format!("- {}", humanize(c)))
        .collect::<Vec<_>>()
        .join("\n");

    let introduction = format!(
        "Welcome to {name}!\n\n{desc}\n\nIn this {level} lesson you'll work through {count} \
         selected puzzles with an average rating of {avg}. Each one demonstrates a {theme} \
         pattern worth recognising in your own games.\n\nKey concepts:\n{concepts}\n\n\
         Take your time with each position before checking the solution.",
        name = request.display_name,
        desc = request.description,
        level = request.difficulty,
        count = request.examples.len(),
        avg = avg,
        theme = humanize(&request.theme),
        concepts = concepts,
    );

    let summary = format!(
        "Lesson summary: {name}\n\nYou've completed {count} {theme} puzzles. Key takeaways:\n\
         - Look for {theme} opportunities when pieces are aligned or overloaded\n\
         - Calculate forcing sequences carefully\n\
         - Revisit these positions to reinforce the pattern",
        name = request.display_name,
        count = request.examples.len(),
        theme = humanize(&request.theme),
    );

    Narrative { introduction, summary }
}

/// `discoveredAttack` -> `discovered attack`, `double_attack` -> `double attack`
fn humanize(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len() + 4);
    for ch in tag.chars() {
        if ch == '_' {
            out.push(' ');
        } else if ch.is_ascii_uppercase() {
            out.push(' ');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(Narrative),
    Fail(String),
    Stall(Duration),
}

/// Mock narrative generator for testing
pub struct MockNarrativeGen {
    behavior: MockBehavior,
}

impl MockNarrativeGen {
    pub fn replying(introduction: &str, summary: &str) -> Self {
        Self {
            behavior: MockBehavior::Reply(Narrative {
                introduction: introduction.to_string(),
                summary: summary.to_string(),
            }),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            behavior: MockBehavior::Fail(message.to_string()),
        }
    }

    /// Sleeps for `delay` before replying, for timeout tests
    pub fn stalling(delay: Duration) -> Self {
        Self {
            behavior: MockBehavior::Stall(delay),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for MockNarrativeGen {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<Narrative> {
        match &self.behavior {
            MockBehavior::Reply(narrative) => Ok(narrative.clone()),
            MockBehavior::Fail(message) => anyhow::bail!("{}", message),
            MockBehavior::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Narrative {
                    introduction: format!("Late introduction to {}", request.display_name),
                    summary: "Late summary".to_string(),
                })
            }
        }
    }
}

/// Generator that always uses the templates; for running without a text service
pub struct TemplateNarrativeGen;

#[async_trait]
impl NarrativeGenerator for TemplateNarrativeGen {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<Narrative> {
        Ok(template_narrative(request))
    }
}
