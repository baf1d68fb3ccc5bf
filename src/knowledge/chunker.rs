//! Text Chunking Module
//!
//! 문서 디렉토리를 읽어 겹치는 슬라이딩 윈도우 청크로 분할합니다.
//!
//! - 윈도우 크기와 오버랩은 문자(char) 단위
//! - 같은 문서의 인접 청크 N, N+1은 정확히 `chunk_overlap` 문자를 공유
//! - 청크 인덱스는 문서별 0부터 연속
//! - 빈 문서는 청크 0개 (에러 아님)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collector::{CollectorConfig, FileCollector, FileType};
use crate::error::{RagError, Result};
use crate::extractor::{ContentExtractor, Document};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 청크당 최대 문자 수
    pub chunk_size: usize,
    /// 인접 청크가 공유하는 문자 수
    pub chunk_overlap: usize,
    /// 읽을 파일 확장자
    pub supported_extensions: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            supported_extensions: vec!["txt".to_string(), "md".to_string(), "pdf".to_string()],
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위가 되는 문서 구간
///
/// 식별자는 (소스, 인덱스) 쌍입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 원본 문서 식별자
    pub source: String,
    /// 문서 내 순번 (0-based)
    pub index: usize,
    pub text: String,
    /// 청크가 시작하는 페이지 (PDF만)
    pub page: Option<usize>,
    /// 원본 문서 기준 문자 오프셋 [start, end)
    pub char_start: usize,
    pub char_end: usize,
    pub format: FileType,
}

impl Chunk {
    /// 안정적인 엔트리 ID (`source#index`)
    pub fn entry_id(&self) -> String {
        format!("{}#{}", self.source, self.index)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 문서를 청크로 분할
    fn split(&self, doc: &Document) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

/// 고정 크기 슬라이딩 윈도우 청커
pub struct SlidingWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SlidingWindowChunker {
    /// 설정으로 생성
    ///
    /// `chunk_overlap >= chunk_size`면 윈도우가 전진하지 않으므로 에러입니다.
    pub fn new(config: &ChunkConfig) -> Result<Self> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(RagError::InvalidRequest(format!(
                "invalid chunk window: size={}, overlap={}",
                config.chunk_size, config.chunk_overlap
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }
}

impl Chunker for SlidingWindowChunker {
    fn split(&self, doc: &Document) -> Vec<Chunk> {
        if doc.content.trim().is_empty() {
            return vec![];
        }

        // 문자 인덱스 → 바이트 오프셋 (UTF-8 경계 보장)
        let offsets: Vec<usize> = doc.content.char_indices().map(|(b, _)| b).collect();
        let total = offsets.len();
        let byte_at = |char_idx: usize| offsets.get(char_idx).copied().unwrap_or(doc.content.len());

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::with_capacity(total / step + 1);
        let mut start = 0usize;

        loop {
            let end = (start + self.chunk_size).min(total);

            chunks.push(Chunk {
                source: doc.source.clone(),
                index: chunks.len(),
                text: doc.content[byte_at(start)..byte_at(end)].to_string(),
                page: doc.page_at(start),
                char_start: start,
                char_end: end,
                format: doc.format,
            });

            if end >= total {
                break;
            }
            start += step;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "SlidingWindowChunker"
    }
}

// ============================================================================
// ChunkStore
// ============================================================================

/// 문서 로드 + 청킹
pub struct ChunkStore {
    collector: FileCollector,
    extractor: ContentExtractor,
    chunker: Box<dyn Chunker>,
}

impl ChunkStore {
    pub fn new(config: &ChunkConfig) -> Result<Self> {
        Ok(Self {
            collector: FileCollector::new(CollectorConfig::with_extensions(
                &config.supported_extensions,
            )),
            extractor: ContentExtractor::new(),
            chunker: Box::new(SlidingWindowChunker::new(config)?),
        })
    }

    /// 디렉토리의 모든 문서를 읽어 청크로 분할
    pub async fn load(&self, directory: &Path) -> Result<Vec<Chunk>> {
        let documents = self.load_documents(directory).await?;
        Ok(self.split_all(&documents))
    }

    /// 디렉토리의 지원 문서 로드
    ///
    /// 완전히 빈 디렉토리는 빈 목록입니다. 파일은 있는데 지원 형식이 하나도
    /// 없거나 모두 읽기에 실패하면 `Ingestion` 에러입니다.
    pub async fn load_documents(&self, directory: &Path) -> Result<Vec<Document>> {
        let files = self.collector.collect_directory(directory)?;

        if files.is_empty() {
            if is_effectively_empty(directory)? {
                tracing::info!("Document directory {:?} is empty", directory);
                return Ok(vec![]);
            }
            return Err(RagError::Ingestion(format!(
                "no supported files in {:?}",
                directory
            )));
        }

        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            match self.extractor.extract(file).await {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!("Skipping {}: {:#}", file.source, e),
            }
        }

        if documents.is_empty() {
            return Err(RagError::Ingestion(format!(
                "none of the {} supported files in {:?} could be read",
                files.len(),
                directory
            )));
        }

        tracing::info!("Loaded {} documents from {:?}", documents.len(), directory);
        Ok(documents)
    }

    /// 문서 목록을 청크로 분할 (문서 순서 유지)
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunker.split(doc))
            .collect();

        tracing::info!(
            "Split {} documents into {} chunks ({})",
            documents.len(),
            chunks.len(),
            self.chunker.name()
        );
        chunks
    }
}

/// 숨김 항목을 제외하고 아무것도 없는 디렉토리인지
fn is_effectively_empty(directory: &Path) -> Result<bool> {
    let entries = std::fs::read_dir(directory).map_err(|e| {
        RagError::Ingestion(format!("cannot read directory {:?}: {}", directory, e))
    })?;

    Ok(!entries
        .filter_map(|e| e.ok())
        .any(|e| !e.file_name().to_string_lossy().starts_with('.')))
}

// ============================================================================
// Tests
// ============================================================================
