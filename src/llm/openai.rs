//! OpenAI-compatible chat completions generator
//!
//! Covers local inference servers (vLLM) and hosted endpoints that speak the
//! `/chat/completions` dialect.

use super::{GenerateOptions, TextGenerator};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OpenAiCompatibleGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model_name: String,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        api_key: String,
        base_url: String,
        model_name: String,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let request = build_request(&self.model_name, prompt, options);

        debug!(model = %self.model_name, prompt_len = prompt.len(), "Calling chat completions");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.model_name, "Chat completions request failed: {}", e);
                OrchestrationError::LlmError(format!("LLM request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(model = %self.model_name, %status, "Chat completions returned an error");
            return Err(OrchestrationError::LlmError(format!(
                "LLM endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            OrchestrationError::LlmError(format!("LLM response parse error: {}", e))
        })?;

        extract_content(parsed)
    }
}

fn build_request<'a>(model: &'a str, prompt: &'a str, options: &'a GenerateOptions) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = options.system_prompt.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });

    ChatRequest {
        model,
        messages,
        temperature: options.temperature,
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| OrchestrationError::LlmError("LLM returned no choices".to_string()))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(base_url: &str) -> OpenAiCompatibleGenerator {
        OpenAiCompatibleGenerator::new(
            "token".into(),
            base_url.into(),
            "qwen".into(),
            Duration::from_secs(60),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        assert_eq!(
            generator("http://localhost:8000/v1/").endpoint(),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_includes_system_message_first() {
        let options = GenerateOptions::with_system("ledger analyst");
        let request = build_request("qwen", "hello", &options);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["model"], "qwen");
    }

    #[test]
    fn test_extract_content() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  PASS \n"}}]
        }))
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), "PASS");

        let empty: ChatResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(extract_content(empty).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_failure() {
        let generator = OpenAiCompatibleGenerator::new(
            "token".into(),
            "http://127.0.0.1:9".into(),
            "qwen".into(),
            Duration::from_secs(2),
            Duration::from_millis(500),
        )
        .unwrap();

        let err = generator
            .generate("hi", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::UpstreamFailure);
    }
}
