//! Vector Index - 인메모리 벡터 저장 및 코사인 유사도 검색
//!
//! 전수 비교(brute force) 검색입니다. 동점은 먼저 삽입된 엔트리가 앞섭니다.
//! 내부 `RwLock`으로 검색은 동시에, upsert/reset은 단독으로 실행됩니다.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::chunker::Chunk;
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// upsert 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertMode {
    /// 전체 교체 (재빌드)
    #[default]
    Replace,
    /// 기존 엔트리 뒤에 추가
    Append,
}

/// 임베딩이 붙은 청크
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// 인덱스에 저장된 엔트리 (생성 후 불변)
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    /// 안정적인 엔트리 ID (`source#index`)
    pub id: String,
    /// 삽입 순번 (동점 처리 기준)
    pub sequence: u64,
    pub chunk: Chunk,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// 검색 결과 한 건
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: Arc<IndexEntry>,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// VectorIndex
// ============================================================================

#[derive(Debug, Default)]
struct IndexInner {
    entries: Vec<Arc<IndexEntry>>,
    next_sequence: u64,
}

/// 인메모리 벡터 인덱스
///
/// 차원은 인덱스 수명 동안 고정입니다.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    inner: RwLock<IndexInner>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Index("dimension must be > 0".to_string()));
        }

        Ok(Self {
            dimension,
            inner: RwLock::new(IndexInner::default()),
        })
    }

    /// 영속 저장소에서 읽은 엔트리로 복원 (순번 순서 유지)
    pub fn restore(dimension: usize, mut entries: Vec<IndexEntry>) -> Result<Self> {
        let index = Self::new(dimension)?;
        entries.sort_by_key(|e| e.sequence);

        let mut seen = HashSet::new();
        for entry in &entries {
            index.check_vector(&entry.vector)?;
            if !seen.insert(entry.id.as_str()) {
                return Err(RagError::Index(format!("duplicate entry id: {}", entry.id)));
            }
        }

        {
            let mut inner = index.write()?;
            inner.next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(0);
            inner.entries = entries.into_iter().map(Arc::new).collect();
        }

        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 엔트리 저장 (모드에 따라 교체 또는 추가)
    ///
    /// 차원이 맞지 않거나 ID가 겹치면 인덱스는 변경되지 않습니다.
    /// 저장 후 엔트리 수를 반환합니다.
    pub fn upsert(&self, chunks: Vec<EmbeddedChunk>, mode: UpsertMode) -> Result<usize> {
        for embedded in &chunks {
            self.check_vector(&embedded.vector)?;
        }

        let mut inner = self.write()?;

        let mut seen: HashSet<String> = match mode {
            UpsertMode::Replace => HashSet::new(),
            UpsertMode::Append => inner.entries.iter().map(|e| e.id.clone()).collect(),
        };
        for embedded in &chunks {
            let id = embedded.chunk.entry_id();
            if !seen.insert(id.clone()) {
                return Err(RagError::Index(format!("duplicate entry id: {}", id)));
            }
        }

        if mode == UpsertMode::Replace {
            inner.entries.clear();
            inner.next_sequence = 0;
        }

        for embedded in chunks {
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.entries.push(Arc::new(IndexEntry {
                id: embedded.chunk.entry_id(),
                sequence,
                chunk: embedded.chunk,
                vector: embedded.vector,
            }));
        }

        tracing::debug!("Index upsert ({:?}): {} entries", mode, inner.entries.len());
        Ok(inner.entries.len())
    }

    /// 유사도 내림차순 상위 `top_k` 검색
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(RagError::Index("top_k must be >= 1".to_string()));
        }
        if query.len() != self.dimension {
            return Err(RagError::Index(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Index("query vector contains non-finite values".to_string()));
        }

        let inner = self.read()?;

        let mut hits: Vec<SearchHit> = inner
            .entries
            .iter()
            .map(|entry| SearchHit {
                score: cosine_similarity(query, &entry.vector),
                entry: Arc::clone(entry),
            })
            .collect();

        // 안정 정렬이므로 동점은 삽입 순서 유지
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        Ok(hits)
    }

    /// 저장된 엔트리 수
    pub fn count(&self) -> usize {
        self.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    /// 고유 소스(문서) 수
    pub fn source_count(&self) -> usize {
        self.read()
            .map(|inner| {
                inner
                    .entries
                    .iter()
                    .map(|e| e.chunk.source.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    /// 엔트리 스냅샷 (삽입 순서)
    pub fn entries(&self) -> Result<Vec<Arc<IndexEntry>>> {
        Ok(self.read()?.entries.clone())
    }

    /// 전체 삭제 (인덱스는 계속 사용 가능)
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.entries.clear();
        inner.next_sequence = 0;
        Ok(())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Index(format!(
                "dimension mismatch: index is {}, vector is {}",
                self.dimension,
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Index("vector contains non-finite values".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexInner>> {
        self.inner
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexInner>> {
        self.inner
            .write()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
