//! Narrative generator backed by an OpenAI-compatible chat completions API

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::narrative::{Narrative, NarrativeGenerator, NarrativeRequest};
use crate::types::DifficultyBand;

const MIN_CONTENT_CHARS: usize = 20;

/// Replies containing any of these are treated as failures
const REJECTED_PHRASES: &[&str] = &[
    "i cannot",
    "i'm sorry",
    "as an ai",
    "i don't have access",
    "content generation failed",
    "failed to generate",
];

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct HttpNarrativeGen {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpNarrativeGen {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    /// Configure from OPENAI_API_KEY / OPENAI_BASE_URL / OPENAI_MODEL.
    /// Returns None when no API key is set.
    pub fn from_env(timeout: Duration) -> Option<Result<Self>> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Some(Self::new(base_url, api_key, model, timeout))
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.7,
            max_tokens: 800,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, concat!("chess-lessons/", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .context("Failed to call narrative service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            anyhow::bail!("Narrative service error ({}): {}", status, message);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse narrative service response")?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        debug!(
            model = %self.model,
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Narrative completion received"
        );

        validate_content(&text)?;
        Ok(text)
    }
}

const SYSTEM_PROMPT: &str = "You are an expert chess coach writing lesson material. \
Write plain prose, no markdown headings, and never invent moves or positions.";

fn word_target(difficulty: DifficultyBand) -> &'static str {
    match difficulty {
        DifficultyBand::Beginner => "150-200",
        DifficultyBand::Intermediate => "200-250",
        DifficultyBand::Advanced => "250-300",
    }
}

pub fn introduction_prompt(request: &NarrativeRequest) -> String {
    format!(
        "Write a {level}-level introduction to {name}.\n\n\
         Theme: {name}\nDescription: {desc}\nKey concepts: {concepts}\n\
         The lesson contains these puzzles:\n{examples}\n\n\
         Explain what the motif is, how to spot it and what the student will practise. \
         Use around {words} words.",
        level = request.difficulty,
        name = request.display_name,
        desc = request.description,
        concepts = request.key_concepts.join(", "),
        examples = request.describe_examples(),
        words = word_target(request.difficulty),
    )
}

pub fn summary_prompt(request: &NarrativeRequest) -> String {
    format!(
        "Write a short summary for a {level}-level lesson on {name} that covered {count} puzzles:\n\
         {examples}\n\n\
         List the key takeaways and how to keep practising. Use around 100-150 words.",
        level = request.difficulty,
        name = request.display_name,
        count = request.examples.len(),
        examples = request.describe_examples(),
    )
}

/// Reject empty, truncated or refusal-style replies
pub fn validate_content(text: &str) -> Result<()> {
    if text.chars().count() < MIN_CONTENT_CHARS {
        anyhow::bail!("Narrative reply too short ({} chars)", text.chars().count());
    }
    let lower = text.to_lowercase();
    if let Some(phrase) = REJECTED_PHRASES.iter().find(|p| lower.contains(*p)) {
        anyhow::bail!("Narrative reply rejected (contains '{}')", phrase);
    }
    Ok(())
}

#[async_trait]
impl NarrativeGenerator for HttpNarrativeGen {
    fn name(&self) -> &'static str {
        "http_chat"
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<Narrative> {
        let (introduction, summary) = futures::future::try_join(
            self.complete(SYSTEM_PROMPT, introduction_prompt(request)),
            self.complete(SYSTEM_PROMPT, summary_prompt(request)),
        )
        .await?;

        info!(theme = %request.theme, model = %self.model, "Generated lesson narrative");

        Ok(Narrative { introduction, summary })
    }
}
