//! Groq 생성기 (OpenAI 호환 chat completions)
//!
//! source: https://console.groq.com/docs/api-reference#chat-create

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::error::{RagError, Result};
use crate::retry::{with_retry, CallError, RetryPolicy};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Groq 생성기
#[derive(Debug)]
pub struct GroqGenerator {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GroqGenerator {
    pub fn new(api_key: String, model: &str, temperature: f32, retry: RetryPolicy) -> Result<Self> {
        if model.is_empty() {
            return Err(RagError::Generation("generation model id is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| RagError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            temperature,
            client,
            retry,
        })
    }

    /// `GROQ_API_KEY` 환경변수에서 키를 읽어 생성
    pub fn from_env(model: &str, temperature: f32, retry: RetryPolicy) -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RagError::Generation(
                    "Groq API key is required. Set GROQ_API_KEY environment variable.".to_string(),
                )
            })?;

        Self::new(api_key, model, temperature, retry)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 응답 본문에서 첫 번째 답변 추출
fn parse_chat_response(body: &str) -> anyhow::Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| anyhow::anyhow!("Failed to parse chat response: {}", e))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        anyhow::bail!("Groq returned an empty answer");
    }

    Ok(text)
}

#[async_trait]
impl TextGenerator for GroqGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: max_output_tokens,
        };
        let request = &request;

        with_retry(&self.retry, "groq generation", move || async move {
            let response = self
                .client
                .post(GROQ_CHAT_URL)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| CallError::Transient(anyhow::anyhow!("Failed to send request: {}", e)))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| CallError::Transient(anyhow::anyhow!("Failed to read body: {}", e)))?;

            if !status.is_success() {
                return Err(CallError::from_status(status, &body));
            }

            parse_chat_response(&body).map_err(CallError::Permanent)
        })
        .await
        .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
