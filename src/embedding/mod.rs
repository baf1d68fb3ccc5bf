//! 임베딩 모듈 - 텍스트를 고정 차원 벡터로 변환
//!
//! 모델 ID로 구현체를 고릅니다.
//!
//! | 모델 ID | 구현체 |
//! |---------|--------|
//! | `local-hash[-<dim>]` | [`HashEmbedding`] (오프라인, 결정적) |
//! | `gemini-embedding-001[:<dim>]` | [`GeminiEmbedding`] |
//! | `ollama:<model>` | [`OllamaEmbedding`] |
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder("local-hash-384", &RetryPolicy::default()).await?;
//! let vectors = embedder.embed_batch(&["Hello, world!".to_string()]).await?;
//! ```

mod gemini;
mod hashed;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

pub use gemini::{get_api_key, GeminiEmbedding};
pub use hashed::HashEmbedding;
pub use ollama::OllamaEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델 ID와 입력에 대해 항상 같은 벡터를 돌려줘야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지, 입력당 벡터 하나)
    ///
    /// 빈 배치는 `Embedding` 에러입니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("backend returned no vector".to_string()))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 ID
    fn model_id(&self) -> &str;
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// 빈 배치 거부
pub(crate) fn ensure_non_empty(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(RagError::Embedding("empty input batch".to_string()));
    }
    Ok(())
}

/// 백엔드 출력 검증 (개수, 차원)
pub(crate) fn check_output(vectors: &[Vec<f32>], expected: usize, dimension: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "backend returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RagError::Embedding(format!(
            "dimension mismatch: expected {}, got {}",
            dimension,
            bad.len()
        )));
    }

    Ok(())
}

// ============================================================================
// Factory Function
// ============================================================================

/// 모델 ID로 임베딩 프로바이더 생성
///
/// Ollama는 차원을 알기 위해 생성 시 한 번 호출합니다.
pub async fn create_embedder(
    model_id: &str,
    retry: &RetryPolicy,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let model_id = model_id.trim();

    if model_id.starts_with("local-hash") {
        let embedder = HashEmbedding::from_model_id(model_id)?;
        tracing::info!("Using local hash embedding (dimension: {})", embedder.dimension());
        return Ok(Arc::new(embedder));
    }

    if let Some(model) = model_id.strip_prefix("ollama:") {
        let embedder = OllamaEmbedding::connect(model, retry.clone()).await?;
        tracing::info!(
            "Using Ollama embedding {} (dimension: {})",
            model,
            embedder.dimension()
        );
        return Ok(Arc::new(embedder));
    }

    if model_id.starts_with("gemini-embedding") {
        let embedder = GeminiEmbedding::from_model_id(model_id, retry.clone())?;
        tracing::info!(
            "Using Gemini API embedding (dimension: {})",
            embedder.dimension()
        );
        return Ok(Arc::new(embedder));
    }

    Err(RagError::Embedding(format!(
        "unknown embedding model: {}",
        model_id
    )))
}

// ============================================================================
// Tests
// ============================================================================
