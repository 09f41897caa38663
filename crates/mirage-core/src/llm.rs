//! Completion-API client.
//!
//! Turns a raw request dump into a prompt, issues one chat-completion call,
//! and hands back the model's reply text. The client deliberately does not
//! check that the reply parses as an HTTP response - that trust-boundary
//! decision belongs to the request handler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// Default completion endpoint.
pub const COMPLETIONS_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Fixed system message sent with every completion call.
pub const SYSTEM_PROMPT: &str = "Be precise and concise.";

/// Upper bound on one completion call; without it a slow upstream pins
/// handler tasks indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from response synthesis.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The completion returned an empty choice list.
    #[error("no completion choices returned")]
    NoCompletion,

    /// Network failure or non-success HTTP status from the API.
    #[error("completion transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The completion body was not valid JSON.
    #[error("failed to decode completion: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for synthesis operations.
pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

/// Anything that can synthesize a response blob from a raw request dump.
///
/// The request handler depends on this trait so tests can substitute
/// scripted generators for the real API.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, raw_request: &str) -> Result<String>;
}

/// Substitutes the raw request dump into the template's single `%s` slot.
pub fn render_prompt(template: &str, raw_request: &str) -> String {
    template.replacen("%s", raw_request, 1)
}

/// Client for a chat-completion endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    prompt_template: String,
}

impl LlmClient {
    /// Creates a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: COMPLETIONS_URL.to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            prompt_template: config.prompt_template.clone(),
        })
    }

    /// Overrides the completion endpoint (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ResponseGenerator for LlmClient {
    async fn generate(&self, raw_request: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: render_prompt(&self.prompt_template, raw_request),
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let completion: ChatResponse = serde_json::from_str(&body)?;
        let first = completion
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoCompletion)?;

        Ok(first.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::routing::post;
    use axum::{Json, Router};

    fn test_config(template: &str) -> Config {
        Config {
            ports: Vec::new(),
            tls: HashMap::new(),
            model: "pplx-7b-chat".to_string(),
            api_key: "test-key".to_string(),
            prompt_template: template.to_string(),
            cache_duration_hours: 1,
            cache_key: Default::default(),
        }
    }

    async fn serve_completion(response: serde_json::Value) -> SocketAddr {
        let response = Arc::new(response);
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let response = response.clone();
                async move { Json((*response).clone()) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn render_prompt_single_slot() {
        assert_eq!(
            render_prompt("Respond to: %s", "GET / HTTP/1.1"),
            "Respond to: GET / HTTP/1.1"
        );
        // Only the first slot is substituted; validation guarantees one.
        assert_eq!(render_prompt("%s and %s", "x"), "x and %s");
    }

    #[test]
    fn decodes_completion_with_choices() {
        let raw = r#"{"id":"1","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":" hi "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content, " hi ");
    }

    #[test]
    fn decodes_completion_without_choices_as_empty() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }

    #[tokio::test]
    async fn generate_returns_trimmed_first_choice() {
        let addr = serve_completion(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  {\"body\":\"ok\"}  "}}]
        }))
        .await;

        let client = LlmClient::new(&test_config("req: %s"))
            .unwrap()
            .with_endpoint(format!("http://{addr}/chat/completions"));

        let out = client.generate("GET / HTTP/1.1").await.unwrap();
        assert_eq!(out, "{\"body\":\"ok\"}");
    }

    #[tokio::test]
    async fn generate_fails_on_empty_choices() {
        let addr = serve_completion(serde_json::json!({ "choices": [] })).await;

        let client = LlmClient::new(&test_config("req: %s"))
            .unwrap()
            .with_endpoint(format!("http://{addr}/chat/completions"));

        assert!(matches!(
            client.generate("GET / HTTP/1.1").await,
            Err(LlmError::NoCompletion)
        ));
    }

    #[tokio::test]
    async fn generate_maps_http_errors_to_transport() {
        let app = Router::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = LlmClient::new(&test_config("req: %s"))
            .unwrap()
            .with_endpoint(format!("http://{addr}/chat/completions"));

        assert!(matches!(
            client.generate("GET / HTTP/1.1").await,
            Err(LlmError::Transport(_))
        ));
    }
}
