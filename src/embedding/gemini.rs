//! Gemini API 임베딩
//!
//! `batchEmbedContents`로 최대 100개씩 묶어 호출합니다.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_output, ensure_non_empty, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::retry::{with_retry, CallError, RetryPolicy};

/// 배치 임베딩 엔드포인트 (출력 차원 축소 지원)
const GEMINI_BATCH_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";

const GEMINI_MODEL_NAME: &str = "models/gemini-embedding-001";

pub const DEFAULT_DIMENSION: usize = 768;

/// 요청 하나에 담을 수 있는 최대 텍스트 수
const MAX_BATCH: usize = 100;

/// `gemini-embedding-001` 어댑터
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model_id: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl GeminiEmbedding {
    /// 출력 차원은 768, 1536, 3072만 허용
    pub fn with_dimension(api_key: String, dimension: usize, retry: RetryPolicy) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::Embedding(format!(
                "unsupported gemini embedding dimension {} (expected 768, 1536 or 3072)",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| RagError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        let model_id = if dimension == DEFAULT_DIMENSION {
            "gemini-embedding-001".to_string()
        } else {
            format!("gemini-embedding-001:{}", dimension)
        };

        Ok(Self {
            api_key,
            client,
            model_id,
            dimension,
            retry,
        })
    }

    /// `gemini-embedding-001` 또는 `gemini-embedding-001:<dim>` 파싱
    ///
    /// API 키는 환경변수에서 읽습니다.
    pub fn from_model_id(model_id: &str, retry: RetryPolicy) -> Result<Self> {
        let dimension = match model_id.split_once(':') {
            Some((_, dim)) => dim.parse::<usize>().map_err(|_| {
                RagError::Embedding(format!("invalid embedding model id: {}", model_id))
            })?,
            None => DEFAULT_DIMENSION,
        };

        let api_key = get_api_key().map_err(|e| RagError::Embedding(e.to_string()))?;
        Self::with_dimension(api_key, dimension, retry)
    }

    /// 한 묶음 호출 (재시도 포함)
    async fn embed_chunk(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: GEMINI_MODEL_NAME.to_string(),
                    content: EmbedContent {
                        parts: vec![EmbedPart { text: text.clone() }],
                    },
                    task_type: "RETRIEVAL_DOCUMENT".to_string(),
                    output_dimensionality: Some(self.dimension),
                })
                .collect(),
        };

        let request = &request;
        with_retry(&self.retry, "gemini embedding", move || async move {
            // API 키는 URL이 아닌 헤더로 전송
            let response = self
                .client
                .post(GEMINI_BATCH_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    CallError::Transient(anyhow::anyhow!("Failed to send embedding request: {}", e))
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| CallError::Transient(anyhow::anyhow!("Failed to read body: {}", e)))?;

            if !status.is_success() {
                if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                    return Err(CallError::from_status(
                        status,
                        &format!("{} {}", error.error.status, error.error.message),
                    ));
                }
                return Err(CallError::from_status(status, &body));
            }

            let parsed: BatchEmbedResponse = serde_json::from_str(&body)
                .context("Failed to parse embedding response")
                .map_err(CallError::Permanent)?;

            Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
        })
        .await
    }
}

/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// 실패 응답의 `error` 객체
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub(crate) error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ensure_non_empty(texts)?;

        let mut results = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(MAX_BATCH)
            );
            let vectors = self
                .embed_chunk(chunk)
                .await
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
            check_output(&vectors, chunk.len(), self.dimension)?;
            results.extend(vectors);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> anyhow::Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "gemini embedding needs GEMINI_API_KEY or GOOGLE_AI_API_KEY in the environment"
    )
}

// ============================================================================
// Tests
// ============================================================================
