//! OpenAI-compatible chat completions backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    generation::{Generated, GenerationRequest, Generator},
};

const SYSTEM_PROMPT: &str = "You are an Excel formula expert. Reply with exactly one Excel \
formula that starts with '=' and nothing else: no explanation, no markdown.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Generates formulas through an OpenAI-compatible `/chat/completions` API
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    /// Deadline for one model call, body included
    timeout: Duration,
}

impl OpenAiGenerator {
    /// Create a generator; returns `None` when no API key is configured
    pub fn new(client: reqwest::Client, config: &Config) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self {
            client,
            base_url: config.openai_api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.openai_model.clone(),
            timeout: Duration::from_secs(config.generation_timeout_seconds),
        })
    }

    fn headers(&self) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| AppError::ServiceUnavailable(format!("Invalid OPENAI_API_KEY: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

/// Build the user prompt from the query and optional workbook context
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!("Write an Excel formula for: {}", request.query.trim());

    if let Some(details) = &request.sheet_details {
        prompt.push_str(&format!("\n\nWorkbook sheets and columns:\n{}", details));
    }
    if let Some(sheet) = &request.current_sheet {
        prompt.push_str(&format!("\n\nActive sheet:\n{}", sheet));
    }

    prompt
}

/// Strip markdown fences and surrounding noise from a model reply
pub fn clean_formula(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    let text = text.trim_matches('`').trim();

    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with('='))
        .unwrap_or(text)
        .to_string()
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Generated> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request),
                },
            ],
            temperature: 0.2,
            max_tokens: 200,
        };

        debug!(url = %url, "Requesting formula from model");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::GenerationFailed(format!(
                        "model request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    AppError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Model request failed");
            return Err(AppError::GenerationFailed(format!(
                "model API error {}: {}",
                status, text
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AppError::GenerationFailed(format!("failed to parse model response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::GenerationFailed("model returned no content".to_string()))?;

        let formula = clean_formula(&content);
        if formula.is_empty() {
            return Err(AppError::GenerationFailed(
                "model returned an empty formula".to_string(),
            ));
        }

        Ok(Generated::new(self.name(), formula))
    }
}
