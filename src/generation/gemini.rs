//! Gemini 생성기 (`generateContent`)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::embedding::get_api_key;
use crate::error::{RagError, Result};
use crate::retry::{with_retry, CallError, RetryPolicy};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini 생성기
#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: &str, temperature: f32, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| RagError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            endpoint: format!("{}/{}:generateContent", GEMINI_API_BASE, model),
            temperature,
            client,
            retry,
        })
    }

    /// 환경변수 API 키로 생성 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
    pub fn from_env(model: &str, temperature: f32, retry: RetryPolicy) -> Result<Self> {
        let api_key = get_api_key().map_err(|e| RagError::Generation(e.to_string()))?;
        Self::new(api_key, model, temperature, retry)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// 첫 번째 후보의 텍스트 파트를 이어붙임
fn parse_generate_response(body: &str) -> anyhow::Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| anyhow::anyhow!("Failed to parse Gemini response: {}", e))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("Gemini returned an empty answer");
    }

    Ok(text.to_string())
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens,
            },
        };
        let request = &request;

        with_retry(&self.retry, "gemini generation", move || async move {
            let response = self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
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

            parse_generate_response(&body).map_err(CallError::Permanent)
        })
        .await
        .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
