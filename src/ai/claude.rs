use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};

use super::AiBackend;

pub const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

const SYSTEM_PROMPT: &str = "You summarize and translate short social media posts. \
Answer with a single JSON object and nothing else.";

/// Claude Messages API backend.
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: CLAUDE_API_URL.to_string(),
        })
    }

    /// Point the client at another Messages-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl AiBackend for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, AiError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: 1024,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            system: Some(SYSTEM_PROMPT),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
            return Err(classify_status(status, message));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(AiError::Malformed("response had no text content".to_string()));
        }
        Ok(text)
    }
}

fn classify_status(status: StatusCode, message: String) -> AiError {
    // 529 is Anthropic's "overloaded"
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AiError::Retryable(message)
    } else {
        AiError::Permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ClaudeClient {
        ClaudeClient::new("sk-test", DEFAULT_MODEL)
            .unwrap()
            .with_endpoint(format!("{}/v1/messages", server.uri()))
    }

    #[tokio::test]
    async fn joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "{\"summary\":"},
                    {"type": "text", "text": "\"ok\"}"}
                ]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).await.complete("hi").await.unwrap();
        assert_eq!(text, "{\"summary\":\n\"ok\"}");
    }

    #[tokio::test]
    async fn classifies_failures() {
        for (status, retryable) in [(429, true), (529, true), (500, true), (401, false), (400, false)] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = client_for(&server).await.complete("hi").await.unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "status {status}: {err}");
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete("hi").await.unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
    }
}
