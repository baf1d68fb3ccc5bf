//! 파이프라인 상태, 상태 조회 결과, 대화 기록 타입

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::knowledge::{Answer, RetrievalResult};

/// 파이프라인 수명 주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Initializing => "initializing",
            PipelineState::Ready => "ready",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `status()` 결과 (시점 스냅샷)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    /// 인덱스 엔트리 수
    pub chunk_count: usize,
    /// 인덱스에 들어간 문서 수
    pub document_count: usize,
    pub embedding_model: Option<String>,
    pub generation_model: Option<String>,
    /// `Failed` 상태의 원인
    pub failure: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    /// 영속 인덱스를 재사용했는지 (재임베딩 생략)
    pub reused_index: bool,
}

/// 질문 하나와 그 답변 (생성 후 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// 단조 증가 순번 (1부터)
    pub sequence: u64,
    pub question: String,
    pub answer: Answer,
    /// 답변 근거가 된 검색 결과
    pub retrieval: RetrievalResult,
    pub created_at: DateTime<Utc>,
}
