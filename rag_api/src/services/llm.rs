//! Ollama client for answer generation.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use helpdesk_config::OllamaConfig;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM unavailable: {0}")]
    Unavailable(String),

    #[error("LLM returned status {0}")]
    Status(u16),
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            probe_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    /// Generate a completion. Non-streaming; the hard timeout is configured
    /// on the client.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.7,
                "top_p": 0.9,
                "top_k": 40,
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Ollama request timed out");
                    LlmError::Timeout
                } else {
                    error!("Error querying Ollama: {}", e);
                    LlmError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Ollama returned status {}", status);
            return Err(LlmError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        Ok(body.response)
    }

    /// Availability probe with a short timeout.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.probe_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
