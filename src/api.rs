use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry ceiling for the non-streaming chat path.
pub const MAX_RETRIES: u32 = 3;
/// Base delay between retries; actual delay is base * attempt number.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Serialize)]
struct ChatRequest {
    message: String,
    model: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub timestamp: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ollama_status: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    success: bool,
    #[serde(default)]
    models: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Extract the server's error detail from a JSON error body, if present.
fn detail_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Probe the health endpoint. The body is parsed even on non-2xx
    /// responses so the server's own status string can be shown.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let health: HealthResponse = response.json().await?;
        Ok(health)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: ModelsResponse = response.json().await?;
        if !models_response.success {
            return Err(anyhow!("Model listing reported failure"));
        }

        Ok(models_response.models)
    }

    /// Single-shot chat request, one attempt.
    pub async fn chat(&self, model: &str, message: &str) -> Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url);

        let request = ChatRequest {
            message: message.to_string(),
            model: model.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                detail_from_body(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(anyhow!(detail));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response)
    }

    /// Non-streaming fallback: retry up to MAX_RETRIES with linearly
    /// increasing backoff. The last error is surfaced after exhaustion.
    pub async fn chat_with_retry(&self, model: &str, message: &str) -> Result<ChatResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.chat(model, message).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(RETRY_DELAY * attempt).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Chat request failed")))
    }

    /// Open the streaming chat endpoint. Returns the raw response whose
    /// body is a stream of `data: {json}` lines.
    pub async fn open_chat_stream(&self, model: &str, message: &str) -> Result<reqwest::Response> {
        let url = format!("{}/chat/stream", self.base_url);

        let request = ChatRequest {
            message: message.to_string(),
            model: model.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP {}", response.status().as_u16()));
        }

        Ok(response)
    }
}

/// True when the error chain bottoms out in a TCP connect failure,
/// i.e. the host is unreachable rather than the API being unhealthy.
pub fn is_connect_error(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|e| e.is_connect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_from_body_present() {
        let body = r#"{"detail": "Failed to generate response: model not found"}"#;
        assert_eq!(
            detail_from_body(body),
            Some("Failed to generate response: model not found".to_string())
        );
    }

    #[test]
    fn test_detail_from_body_missing() {
        assert_eq!(detail_from_body(r#"{"other": 1}"#), None);
        assert_eq!(detail_from_body("not json"), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8001/api/v1/");
        assert_eq!(client.base_url, "http://localhost:8001/api/v1");
    }
}
