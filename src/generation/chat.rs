//! OpenAI-compatible chat-completions client.
//!
//! Sends `POST {api_base}/chat/completions` with a system and a user
//! message and returns the first choice's content. Works with Groq, OpenAI
//! and other servers speaking the same protocol.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

use super::GenerationService;

/// Longest error body echoed into a `RagError::Generation` message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
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

impl ChatCompletionsClient {
    /// Creates a client from generation settings.
    ///
    /// # Errors
    ///
    /// Returns `RagError::Config` if the HTTP client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Full URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationService for ChatCompletionsClient {
    async fn generate(&self, system_instruction: &str, user_message: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RagError::generation(format!("request to {} timed out", self.endpoint))
            } else {
                RagError::generation(format!("request to {} failed: {e}", self.endpoint))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| text.is_char_boundary(i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(RagError::generation(format!(
                "{} returned {status}: {text}",
                self.endpoint
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::generation(format!("invalid response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::generation("response contained no choices"))?;

        debug!(model = %self.model, chars = content.len(), "Generation completed");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::Router;

    fn config(api_base: &str) -> GenerationConfig {
        GenerationConfig {
            model: "test-model".to_string(),
            api_base: api_base.to_string(),
            api_key: Some("sk-test".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ChatCompletionsClient::new(&config("http://localhost:9/v1/")).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
        assert_eq!(client.model_name(), "test-model");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_fields() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(parsed.choices.is_empty());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#)
                .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_generation_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let client = ChatCompletionsClient::new(&config("http://127.0.0.1:9/v1")).unwrap();
        let err = client.generate("sys", "user").await.unwrap_err();
        assert!(err.is_generation());
    }

    /// Serves one canned chat-completions reply; returns its API base.
    async fn stub_backend(
        status: StatusCode,
        content_type: &'static str,
        body: &'static str,
    ) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { (status, [(header::CONTENT_TYPE, content_type)], body) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/v1")
    }

    async fn generate_against(
        status: StatusCode,
        content_type: &'static str,
        body: &'static str,
    ) -> Result<String> {
        let api_base = stub_backend(status, content_type, body).await;
        let client = ChatCompletionsClient::new(&config(&api_base)).unwrap();
        client.generate("sys", "user").await
    }

    #[tokio::test]
    async fn test_first_choice_content_is_returned() {
        let answer = generate_against(
            StatusCode::OK,
            "application/json",
            r#"{"choices": [{"message": {"role": "assistant", "content": "I study CS."}}]}"#,
        )
        .await
        .unwrap();
        assert_eq!(answer, "I study CS.");
    }

    #[tokio::test]
    async fn test_server_error_is_generation_error() {
        let err = generate_against(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "upstream down")
            .await
            .unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("500"), "{err}");
        assert!(err.to_string().contains("upstream down"), "{err}");
    }

    #[tokio::test]
    async fn test_empty_choices_is_generation_error() {
        let err = generate_against(StatusCode::OK, "application/json", r#"{"choices": []}"#)
            .await
            .unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("no choices"), "{err}");
    }

    #[tokio::test]
    async fn test_non_json_body_is_generation_error() {
        let err = generate_against(StatusCode::OK, "application/json", "not json")
            .await
            .unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("invalid response body"), "{err}");
    }
}
