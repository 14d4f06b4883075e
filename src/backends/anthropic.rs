//! Hosted backend via the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, probe};
use super::response::parse_analysis;
use super::template::render;
use super::traits::{AnalysisBackend, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_BUDGET};
use crate::types::{AnalysisResult, Prompt};
use crate::{MuninnError, Result};

/// Default Anthropic endpoint.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Default hosted model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4_096;
const DEFAULT_ANTHROPIC_RPM: u32 = 50;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend talking to the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicBackend {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    token_budget: usize,
    requests_per_minute: u32,
    request_timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_ANTHROPIC_URL)
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
            requests_per_minute: DEFAULT_ANTHROPIC_RPM,
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

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl AnalysisBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
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
            self.authed(self.http.get(format!("{}/v1/models", self.base_url)))
                .timeout(PROBE_TIMEOUT),
        )
        .await
    }

    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult> {
        let instruction = render(prompts);
        let response = self
            .authed(self.http.post(format!("{}/v1/messages", self.base_url)))
            .timeout(self.request_timeout)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens: MAX_OUTPUT_TOKENS,
                temperature: 0.0,
                messages: [Message {
                    role: "user",
                    content: &instruction,
                }],
            })
            .send()
            .await?;

        let body: MessagesResponse = check_status(response, &self.model)
            .await?
            .json()
            .await
            .map_err(|e| MuninnError::InvalidResponse(e.to_string()))?;

        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(MuninnError::InvalidResponse(
                "response contained no text blocks".into(),
            ));
        }

        parse_analysis(&text, prompts.len())
    }
}
