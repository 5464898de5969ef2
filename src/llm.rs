//! Text-completion backends used by the ranker.

use std::time::Duration;

use clap::ValueEnum;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::InferenceError;

/// A service that turns one prompt into free text.
pub trait InferenceBackend {
    fn name(&self) -> &'static str;

    /// False when the backend needs an API key and none was configured.
    fn has_credential(&self) -> bool;

    /// Cheap reachability check done once before any ranking attempt.
    async fn probe(&self) -> Result<(), InferenceError>;

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Gemini,
    Ollama,
}

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiBackend {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

impl GeminiBackend {
    pub fn new(model: String, api_key: Option<String>) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .user_agent(concat!("arxiv_digest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            http,
            endpoint: GEMINI_ENDPOINT.to_string(),
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }
}

impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn probe(&self) -> Result<(), InferenceError> {
        Ok(())
    }

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(InferenceError::Status {
                backend: "Gemini",
                status,
                body,
            });
        }

        let data: GenerateContentResponse = response.json().await?;
        let text = data.first_text();
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyResponse("Gemini"));
        }
        debug!("Gemini returned {} chars", text.len());
        Ok(text)
    }
}

pub struct OllamaBackend {
    client: Ollama,
    model: String,
}

impl OllamaBackend {
    pub fn new(host: &str, port: u16, model: String) -> Self {
        Self {
            client: Ollama::new(host.trim_end_matches('/').to_string(), port),
            model,
        }
    }
}

impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn has_credential(&self) -> bool {
        true
    }

    async fn probe(&self) -> Result<(), InferenceError> {
        self.client
            .list_local_models()
            .await
            .map(|models| debug!("Ollama reachable, {} local models", models.len()))
            .map_err(|e| InferenceError::Ollama(e.to_string()))
    }

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| InferenceError::Ollama(e.to_string()))?;
        if response.response.trim().is_empty() {
            return Err(InferenceError::EmptyResponse("Ollama"));
        }
        Ok(response.response)
    }
}

/// Backend picked on the command line.
pub enum Backend {
    Gemini(GeminiBackend),
    Ollama(OllamaBackend),
}

impl InferenceBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Gemini(b) => b.name(),
            Backend::Ollama(b) => b.name(),
        }
    }

    fn has_credential(&self) -> bool {
        match self {
            Backend::Gemini(b) => b.has_credential(),
            Backend::Ollama(b) => b.has_credential(),
        }
    }

    async fn probe(&self) -> Result<(), InferenceError> {
        match self {
            Backend::Gemini(b) => b.probe().await,
            Backend::Ollama(b) => b.probe().await,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        match self {
            Backend::Gemini(b) => b.complete(prompt).await,
            Backend::Ollama(b) => b.complete(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_without_key_has_no_credential() {
        let backend = GeminiBackend::new("gemini-2.5-flash".into(), None).unwrap();
        assert!(!backend.has_credential());
        let backend = GeminiBackend::new("gemini-2.5-flash".into(), Some("  ".into())).unwrap();
        assert!(!backend.has_credential());
        let backend = Backend::Gemini(GeminiBackend::new("m".into(), Some("k".into())).unwrap());
        assert!(backend.has_credential());
        assert_eq!(backend.name(), "Gemini");
    }

    #[test]
    fn gemini_response_text_is_concatenated() {
        let data: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "[{\"id\":"}, {"text": "\"A\"}]"}]}}]
        }))
        .unwrap();
        assert_eq!(data.first_text(), "[{\"id\":\"A\"}]");

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.first_text(), "");
    }

    #[test]
    fn ollama_needs_no_key() {
        let backend = Backend::Ollama(OllamaBackend::new("http://localhost/", 11434, "llama3.2:latest".into()));
        assert!(backend.has_credential());
        assert_eq!(backend.name(), "Ollama");
    }
}
