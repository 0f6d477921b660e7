use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::backend::{AgentBackend, BackendError};
use super::prompt::Prompt;
use crate::bridge_config::AgentSection;
use crate::errors::AgentError;
use crate::util::excerpt;

/// Placeholder shipped in example `.env` files.
const PLACEHOLDER_KEY: &str = "your_api_key_here";

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Generative-language API backend (`models/{model}:generateContent`).
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpBackend {
    /// The API key is read from the variable named by `api_key_env`; a
    /// missing key is a configuration error raised before any attempt.
    pub fn from_section(section: &AgentSection) -> Result<Self, AgentError> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_KEY)
            .ok_or_else(|| {
                AgentError::Misconfigured(format!(
                    "{} is not set; add it to .env or the environment",
                    section.api_key_env
                ))
            })?;

        Ok(Self::new(&section.endpoint, &section.model, api_key))
    }

    pub fn new(endpoint: &str, model: &str, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!(
                "{}/models/{}:generateContent",
                endpoint.trim_end_matches('/'),
                model
            ),
            api_key,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn request_body(prompt: &Prompt) -> serde_json::Value {
    json!({
        "system_instruction": { "parts": [{ "text": prompt.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt.body }] }],
    })
}

/// Map a non-success status to a backend error.
fn status_error(status: StatusCode, body: &str) -> BackendError {
    let detail = format!("HTTP {}: {}", status.as_u16(), excerpt(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BackendError::Transient(detail)
    } else {
        BackendError::Rejected(detail)
    }
}

fn extract_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl AgentBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("unreadable response: {}", e)))?;

        extract_text(parsed).ok_or_else(|| BackendError::Transient("empty response".into()))
    }
}
