use std::time::Duration;

use anyhow::Context as _;

use crate::completion::{CompletionClient, ParseRequest};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("PAGESIFT_OLLAMA_URL").unwrap_or(defaults.base_url);
        let model = std::env::var("PAGESIFT_OLLAMA_MODEL").unwrap_or(defaults.model);
        Self {
            base_url,
            model,
            ..defaults
        }
    }
}

pub fn generate_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/api/generate")
}

/// Non-streaming `/api/generate` client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            endpoint: generate_endpoint(&config.base_url),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl CompletionClient for OllamaClient {
    async fn invoke(&self, request: &ParseRequest<'_>) -> anyhow::Result<String> {
        let prompt = request.render_prompt();
        generate_text(&self.client, &self.endpoint, &self.model, &prompt).await
    }
}

pub async fn generate_text(
    client: &reqwest::Client,
    endpoint: &str,
    model: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    let body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
    });

    let response = client
        .post(endpoint)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().await.context("read Ollama response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("Ollama API error ({status}): {message}");
    }

    let value: serde_json::Value = serde_json::from_str(&raw).context("parse Ollama response")?;
    extract_response_text(&value).context("extract response text")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.as_str()?.to_owned();
    Some(message)
}

fn extract_response_text(value: &serde_json::Value) -> anyhow::Result<String> {
    if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
        anyhow::bail!("Ollama reported an error: {message}");
    }

    // An empty `response` is a legitimate "nothing found" answer.
    value
        .get("response")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("missing `response` string in Ollama reply"))
}
