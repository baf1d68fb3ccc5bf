//! Knowledge 모듈 - 청킹, 벡터 인덱스, 검색, 답변 작성
//!
//! - Chunker: 슬라이딩 윈도우 문자 청킹
//! - Vector: 인메모리 코사인 유사도 인덱스
//! - Store: SQLite 인덱스 영속화
//! - Retriever: 질문 임베딩 + 검색 + 임계값
//! - Composer: 근거 제한 프롬프트 + 생성

mod chunker;
mod composer;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use chunker::{Chunk, ChunkConfig, ChunkStore, Chunker, SlidingWindowChunker};
pub use composer::{build_prompt, Answer, AnswerComposer, FALLBACK_ANSWER};
pub use retriever::{RetrievalResult, RetrievedChunk, Retriever};
pub use store::{blob_to_vec, vec_to_blob, IndexMeta, IndexStore};
pub use vector::{cosine_similarity, EmbeddedChunk, IndexEntry, SearchHit, UpsertMode, VectorIndex};
