//! 로컬 해시 임베딩
//!
//! 단어 가방(bag of words)을 feature hashing으로 고정 차원에 투영합니다.
//! 네트워크 없이 동작하고, SHA-256 기반이라 프로세스/플랫폼이 달라도
//! 같은 입력은 같은 벡터가 됩니다 (영속 인덱스 재사용 가능).

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{check_output, ensure_non_empty, EmbeddingProvider};
use crate::error::{RagError, Result};

/// 기본 차원
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// 의미 없는 고빈도 영어 단어 (유사도에서 제외)
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with",
];

/// 해시 임베딩 구현체
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    model_id: String,
    dimension: usize,
}

impl HashEmbedding {
    /// 차원을 지정하여 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Embedding("dimension must be > 0".to_string()));
        }

        Ok(Self {
            model_id: format!("local-hash-{}", dimension),
            dimension,
        })
    }

    /// `local-hash` 또는 `local-hash-<dim>` 파싱
    pub fn from_model_id(model_id: &str) -> Result<Self> {
        match model_id.strip_prefix("local-hash") {
            Some("") => Self::new(DEFAULT_HASH_DIMENSION),
            Some(rest) => {
                let dim = rest
                    .strip_prefix('-')
                    .and_then(|d| d.parse::<usize>().ok())
                    .ok_or_else(|| {
                        RagError::Embedding(format!("invalid local-hash model id: {}", model_id))
                    })?;
                Self::new(dim)
            }
            None => Err(RagError::Embedding(format!(
                "not a local-hash model id: {}",
                model_id
            ))),
        }
    }

    /// 텍스트 하나를 벡터로
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        // L2 정규화
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

/// 소문자 영숫자 토큰 (불용어 제외)
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ensure_non_empty(texts)?;

        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vectorize(t)).collect();
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

// ============================================================================
// Tests
// ============================================================================
