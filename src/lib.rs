//! grounded-rag - 로컬 문서 기반 질의응답 (RAG)
//!
//! 고정된 문서 디렉토리의 내용만으로 질문에 답하고,
//! 관련 내용이 없으면 답변을 거절합니다.
//!
//! 흐름: 수집 → 추출 → 청킹 → 임베딩 → 인덱싱 (빌드 시),
//! 질문 임베딩 → 검색 → 임계값 → 근거 제한 생성 (질의 시)

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod retry;

// Re-exports
pub use config::{get_data_dir, RagConfig};
pub use embedding::{create_embedder, EmbeddingProvider, HashEmbedding};
pub use error::{RagError, Result};
pub use generation::{create_generator, TextGenerator};
pub use knowledge::{
    Answer, ChunkConfig, RetrievalResult, RetrievedChunk, UpsertMode, VectorIndex,
    FALLBACK_ANSWER,
};
pub use pipeline::{
    ConversationTurn, DefaultProviderFactory, Pipeline, PipelineState, PipelineStatus,
    ProviderFactory,
};
