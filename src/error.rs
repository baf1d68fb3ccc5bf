//! 에러 타입
//!
//! 파이프라인 전 단계에서 공통으로 쓰는 에러 분류입니다.
//! - 인제스트/임베딩/인덱싱 실패는 초기화 시 `Failed` 상태로 전이
//! - 질의 중 임베딩/인덱스 실패는 `Retrieval`로 감싸서 전파
//! - 빈 검색 결과는 에러가 아님 (고정 응답의 트리거)

use thiserror::Error;

use crate::pipeline::PipelineState;

/// 파이프라인 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서 디렉토리를 읽을 수 없거나 지원 파일이 없음
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// 임베딩 백엔드 불가 또는 차원 불일치
    #[error("embedding error: {0}")]
    Embedding(String),

    /// 영속 상태 손상 또는 기존 엔트리와 차원 불일치
    #[error("index error: {0}")]
    Index(String),

    /// 질의 시점의 임베딩/인덱스 실패
    #[error("retrieval error: {0}")]
    Retrieval(#[source] Box<RagError>),

    /// 생성 백엔드 불가 또는 잘못된 응답
    #[error("generation error: {0}")]
    Generation(String),

    /// `Ready` 상태가 아닐 때의 질의
    #[error("pipeline not ready (state: {0})")]
    PipelineNotReady(PipelineState),

    /// 잘못된 요청 파라미터 또는 설정
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    /// 질의 시점 에러를 `Retrieval`로 감싸기 (이미 감싸져 있으면 그대로)
    pub fn into_retrieval(self) -> Self {
        match self {
            RagError::Retrieval(_) => self,
            other => RagError::Retrieval(Box::new(other)),
        }
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        RagError::Index(e.to_string())
    }
}
