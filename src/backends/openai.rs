//! Hosted backend for OpenAI-compatible chat completion APIs.
//!
//! Works against api.openai.com as well as self-hosted gateways that speak
//! the same protocol (vLLM, LiteLLM, llama.cpp server).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, probe};
use super::response::parse_analysis;
use super::template::render;
use super::traits::{AnalysisBackend, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_BUDGET};
use crate::types::{AnalysisResult, Prompt};
use crate::{MuninnError, Result};

/// Default OpenAI endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Default hosted model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const DEFAULT_OPENAI_RPM: u32 = 60;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend talking to an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiBackend {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    token_budget: usize,
    requests_per_minute: u32,
    request_timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_OPENAI_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            requests_per_minute: DEFAULT_OPENAI_RPM,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat<'a>,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AnalysisBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn token_budget(&self) -> usize {
        self.token_budget
    }

    fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn is_available(&self) -> bool {
        if self.api_key.trim().is_empty() {
            return false;
        }
        probe(
            self.http
                .get(format!("{}/v1/models", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(PROBE_TIMEOUT),
        )
        .await
    }

    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult> {
        let instruction = render(prompts);
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&ChatRequest {
                model: &self.model,
                temperature: 0.0,
                response_format: ResponseFormat {
                    kind: "json_object",
                },
                messages: [ChatMessage {
                    role: "user",
                    content: &instruction,
                }],
            })
            .send()
            .await?;

        let body: ChatResponse = check_status(response, &self.model)
            .await?
            .json()
            .await
            .map_err(|e| MuninnError::InvalidResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MuninnError::InvalidResponse("response had no choices".into()))?;

        parse_analysis(&content, prompts.len())
    }
}
