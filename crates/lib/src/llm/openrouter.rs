//! OpenRouter client (OpenAI-compatible /chat/completions, bearer auth).
//!
//! Any OpenAI-compatible server works when `base_url` points at it; the path
//! `/chat/completions` is appended to the configured base.

use crate::llm::{ChatMessage, CompletionParams, LlmBackend, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct OpenRouterClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenRouterClient {
    /// POST /chat/completions — non-streaming chat.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &CompletionParams,
    ) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: &params.model,
            messages: &messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        first_choice_content(data).ok_or(LlmError::EmptyAnswer)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// `choices[0].message.content`, treating an empty string as absent.
fn first_choice_content(data: OpenAiChatResponse) -> Option<String> {
    data.choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> OpenAiChatResponse {
        serde_json::from_str(json).expect("parse")
    }

    #[test]
    fn extracts_first_choice() {
        let data = parse(
            r#"{"id":"gen-1","choices":[
                {"index":0,"message":{"role":"assistant","content":"สวัสดีครับ"}},
                {"index":1,"message":{"role":"assistant","content":"second"}}
            ]}"#,
        );
        assert_eq!(first_choice_content(data).as_deref(), Some("สวัสดีครับ"));
    }

    #[test]
    fn missing_or_empty_content_is_none() {
        assert_eq!(first_choice_content(parse(r#"{"choices":[]}"#)), None);
        assert_eq!(
            first_choice_content(parse(r#"{"error":{"message":"rate limited"}}"#)),
            None
        );
        assert_eq!(
            first_choice_content(parse(r#"{"choices":[{"message":{"content":""}}]}"#)),
            None
        );
        assert_eq!(
            first_choice_content(parse(r#"{"choices":[{"message":{"content":null}}]}"#)),
            None
        );
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("q")];
        let body = serde_json::to_value(OpenAiChatRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 800,
        })
        .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "q" }
                ],
                "temperature": 0.5,
                "max_tokens": 800
            })
        );
    }
}
