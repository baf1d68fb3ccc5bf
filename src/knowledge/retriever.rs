//! Retriever - 질문 임베딩 + 인덱스 검색 + 점수 임계값
//!
//! 빈 결과는 에러가 아니라 "컨텍스트 없음" 신호입니다.
//! 임계값을 넘는 청크가 없으면 그대로 빈 결과를 돌려줍니다 (완화 없음).

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::vector::{SearchHit, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 미리보기 최대 문자 수
const PREVIEW_CHARS: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// 검색된 청크 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub entry_id: String,
    pub source: String,
    pub index: usize,
    pub page: Option<usize>,
    pub text: String,
    pub score: f32,
}

impl RetrievedChunk {
    fn from_hit(hit: &SearchHit) -> Self {
        let chunk = &hit.entry.chunk;
        Self {
            entry_id: hit.entry.id.clone(),
            source: chunk.source.clone(),
            index: chunk.index,
            page: chunk.page,
            text: chunk.text.clone(),
            score: hit.score,
        }
    }

    /// 앞 200자 미리보기
    pub fn preview(&self) -> String {
        if self.text.chars().count() > PREVIEW_CHARS {
            let head: String = self.text.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            self.text.clone()
        }
    }
}

/// 질의 하나의 검색 결과 (점수 내림차순)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// 최고 점수
    pub fn top_score(&self) -> Option<f32> {
        self.chunks.first().map(|c| c.score)
    }

    /// 등장 순서대로 중복 제거한 소스 목록
    pub fn sources(&self) -> Vec<String> {
        dedup_sources(self.chunks.iter())
    }
}

/// 소스 중복 제거 (첫 등장 순서 유지)
pub(crate) fn dedup_sources<'a>(chunks: impl Iterator<Item = &'a RetrievedChunk>) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .filter(|c| seen.insert(c.source.as_str()))
        .map(|c| c.source.clone())
        .collect()
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// 질문에 대한 상위 `top_k` 청크 중 `min_score` 이상만 반환
    ///
    /// 임베딩/인덱스 실패는 `Retrieval` 에러로 감쌉니다.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<RetrievalResult> {
        tracing::debug!(
            "Retrieving for {:?} (top_k: {}, min_score: {})",
            question,
            top_k,
            min_score
        );

        let query = self
            .embedder
            .embed(question)
            .await
            .map_err(RagError::into_retrieval)?;

        let hits = self
            .index
            .search(&query, top_k)
            .map_err(RagError::into_retrieval)?;
        let candidates = hits.len();

        let chunks: Vec<RetrievedChunk> = hits
            .iter()
            .filter(|hit| hit.score >= min_score)
            .map(RetrievedChunk::from_hit)
            .collect();

        if chunks.is_empty() && candidates > 0 {
            tracing::info!(
                "No chunk passed min_score {} ({} candidates)",
                min_score,
                candidates
            );
        } else {
            tracing::debug!("Retrieved {} of {} candidates", chunks.len(), candidates);
        }

        Ok(RetrievalResult { chunks })
    }
}

// ============================================================================
// Tests
// ============================================================================
