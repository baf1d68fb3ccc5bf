//! Ollama 임베딩
//!
//! 로컬 Ollama의 `POST /api/embed`를 호출합니다.
//! URL은 `OLLAMA_URL` (기본 `http://localhost:11434`).

use std::time::Duration;

use async_trait::async_trait;

use super::{check_output, ensure_non_empty, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::retry::{with_retry, CallError, RetryPolicy};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama 임베딩 구현체
#[derive(Debug)]
pub struct OllamaEmbedding {
    model: String,
    model_id: String,
    url: String,
    client: reqwest::Client,
    dimension: usize,
    retry: RetryPolicy,
}

impl OllamaEmbedding {
    /// 연결 후 프로브 호출로 차원 확인
    pub async fn connect(model: &str, retry: RetryPolicy) -> Result<Self> {
        if model.is_empty() {
            return Err(RagError::Embedding(
                "ollama model name required (ollama:<model>)".to_string(),
            ));
        }

        let url = std::env::var("OLLAMA_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| RagError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        let mut embedder = Self {
            model: model.to_string(),
            model_id: format!("ollama:{}", model),
            url,
            client,
            dimension: 0,
            retry,
        };

        let probe = embedder
            .request(&["dimension probe".to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Ollama returned no embedding".to_string()))?;
        if probe.is_empty() {
            return Err(RagError::Embedding("Ollama returned empty embedding".to_string()));
        }
        embedder.dimension = probe.len();

        Ok(embedder)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let body = &body;
        let endpoint = format!("{}/api/embed", self.url);
        let endpoint = endpoint.as_str();

        with_retry(&self.retry, "ollama embedding", move || async move {
            let response = self
                .client
                .post(endpoint)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    CallError::Transient(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ))
                })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(CallError::from_status(status, &text));
            }

            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| CallError::Permanent(anyhow::anyhow!("Invalid Ollama body: {}", e)))?;
            parse_ollama_response(&json).map_err(CallError::Permanent)
        })
        .await
        .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: non-numeric value"))
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ensure_non_empty(texts)?;

        let vectors = self.request(texts).await?;
        check_output(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 0.0]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.25], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_parse_ollama_response_missing_field() {
        let json = serde_json::json!({"embedding": [0.5]});
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_parse_ollama_response_non_numeric() {
        let json = serde_json::json!({"embeddings": [["x"]]});
        assert!(parse_ollama_response(&json).is_err());
    }
}
