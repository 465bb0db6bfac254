use serde::Serialize;
use reqwest::Client;
use tracing::debug;

use crate::config::{Config, DEFAULT_COMPLETION_BASE_URL, DEFAULT_COMPRESSION_PROMPT, DEFAULT_MODEL};
use crate::error::{Result, AppError};

pub const DEFAULT_INSTRUCTION: &str = "summarize briefly";

#[derive(Serialize, Debug, PartialEq)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

/// Rewrites text with a hosted chat-completion model according to a free-form
/// instruction. One request per call, the completion is returned untouched.
#[derive(Clone)]
pub struct TextCompressor {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    system_prompt: String,
}

impl TextCompressor {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            system_prompt: DEFAULT_COMPRESSION_PROMPT.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.openrouter_api_key.clone())
            .with_model(config.openrouter_model.clone())
            .with_base_url(config.openrouter_base_url.clone())
            .with_system_prompt(config.compression_prompt.clone())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn build_request(&self, content: &str, instruction: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".into(),
                    content: self.system_prompt.clone(),
                },
                Message {
                    role: "user".into(),
                    content: format!("Instruction: {}\n\nContent:\n{}", instruction, content),
                },
            ],
        }
    }

    pub async fn transform(&self, content: &str, instruction: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("OPENROUTER_API_KEY environment variable not set".to_string()))?;

        debug!(model = %self.model, content_len = content.len(), "requesting completion");
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&self.build_request(content, instruction))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Completion API returned {}: {}",
                status, body
            )));
        }

        let json: serde_json::Value = res.json().await?;
        extract_reply(&json)
    }
}

fn extract_reply(json: &serde_json::Value) -> Result<String> {
    let reply = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AppError::Upstream("Invalid response format from LLM".to_string()))?
        .to_string();

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_credential_is_configuration_error() {
        let err = TextCompressor::new(None)
            .transform("some text", DEFAULT_INSTRUCTION)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn request_embeds_instruction_and_content() {
        let compressor = TextCompressor::new(Some("key".into()))
            .with_model("test/model")
            .with_system_prompt("Be brief.");
        let request = compressor.build_request("Line one\nLine two", "just urls");

        assert_eq!(request.model, "test/model");
        assert_eq!(request.messages[0], Message { role: "system".into(), content: "Be brief.".into() });
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.messages[1].content, "Instruction: just urls\n\nContent:\nLine one\nLine two");
    }

    #[test]
    fn reply_is_returned_verbatim() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  - a\n- b  \n"}}]});
        assert_eq!(extract_reply(&body).unwrap(), "  - a\n- b  \n");
    }

    #[test]
    fn malformed_reply_is_upstream_error() {
        let err = extract_reply(&json!({"error": {"message": "rate limited"}})).unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    mod over_http {
        use super::*;
        use std::sync::{Arc, Mutex};

        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::post;
        use axum::{Json, Router};
        use serde_json::Value;

        use crate::testing::serve_stub;

        #[tokio::test]
        async fn sends_bearer_request_and_returns_reply() {
            let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::default();
            let captured = seen.clone();
            let router = Router::new().route(
                "/chat/completions",
                post(move |headers: HeaderMap, Json(payload): Json<Value>| {
                    let captured = captured.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        *captured.lock().unwrap() = Some((auth, payload));
                        Json(json!({"choices": [{"message": {"content": "- short\n"}}]}))
                    }
                }),
            );
            let base_url = serve_stub(router).await.unwrap();
            let compressor = TextCompressor::new(Some("test-key".into()))
                .with_model("test/model")
                .with_base_url(format!("{}/", base_url));

            let reply = compressor.transform("long text", "just urls").await.unwrap();

            assert_eq!(reply, "- short\n");
            let (auth, payload) = seen.lock().unwrap().clone().unwrap();
            assert_eq!(auth.as_deref(), Some("Bearer test-key"));
            assert_eq!(payload["model"], "test/model");
            assert_eq!(payload["messages"][1]["content"], "Instruction: just urls\n\nContent:\nlong text");
        }

        #[tokio::test]
        async fn error_status_keeps_status_and_text_body() {
            let router = Router::new().route(
                "/chat/completions",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "<html>maintenance</html>") }),
            );
            let base_url = serve_stub(router).await.unwrap();
            let compressor = TextCompressor::new(Some("test-key".into())).with_base_url(base_url);

            let err = compressor.transform("long text", DEFAULT_INSTRUCTION).await.unwrap_err();

            match err {
                AppError::Upstream(message) => {
                    assert!(message.contains("503"), "{message}");
                    assert!(message.contains("<html>maintenance</html>"), "{message}");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}

