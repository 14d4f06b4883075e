//! Local-model backend via the Ollama HTTP API.
//!
//! - availability: `GET /api/tags` answers
//! - analyze: `POST /api/generate` with `format: "json"`, non-streaming

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, probe};
use super::response::parse_analysis;
use super::template::render;
use super::traits::{AnalysisBackend, DEFAULT_REQUEST_TIMEOUT};
use crate::types::{AnalysisResult, Prompt};
use crate::{MuninnError, Result};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default local model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

/// Local models have small context windows.
const DEFAULT_OLLAMA_TOKEN_BUDGET: usize = 4_000;

/// Probe bound for a local server.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Backend talking to a local Ollama server.
#[derive(Clone)]
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    model: String,
    token_budget: usize,
    requests_per_minute: u32,
    request_timeout: Duration,
}

impl OllamaBackend {
    /// Backend for `model` on the default local endpoint.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(model, DEFAULT_OLLAMA_URL)
    }

    /// Backend with a custom endpoint (remote Ollama host, wiremock in tests).
    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            token_budget: DEFAULT_OLLAMA_TOKEN_BUDGET,
            requests_per_minute: 0,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the per-batch token budget.
    pub fn token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    /// Pace requests (`0` = unpaced, the default for a local server).
    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Override the per-call timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
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
        probe(
            self.http
                .get(format!("{}/api/tags", self.base_url))
                .timeout(PROBE_TIMEOUT),
        )
        .await
    }

    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult> {
        let instruction = render(prompts);
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.request_timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: &instruction,
                stream: false,
                format: "json",
                options: GenerateOptions { temperature: 0.0 },
            })
            .send()
            .await?;

        let body: GenerateResponse = check_status(response, &self.model)
            .await?
            .json()
            .await
            .map_err(|e| MuninnError::InvalidResponse(e.to_string()))?;

        parse_analysis(&body.response, prompts.len())
    }
}
