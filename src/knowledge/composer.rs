//! Answer Composer - 검색 컨텍스트로 근거 있는 답변 생성
//!
//! 빈 검색 결과는 생성 백엔드를 호출하지 않고 고정 응답으로 끝냅니다.
//! 생성 실패는 `Generation` 에러로 그대로 전파합니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::retriever::{dedup_sources, RetrievalResult, RetrievedChunk};
use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// 컨텍스트가 없을 때의 고정 응답
pub const FALLBACK_ANSWER: &str = "No context about this question.";

/// 근거 제한 지시문
const SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant.
You must answer only using the information in the Context section.
If the context contains information that can reasonably answer the question (even if wording is slightly different), use it to answer.
If the context does not contain any information that can help answer the question,
reply exactly with: \"No context about this question.\".
Keep answers short and focused (1-3 sentences). Do not add introductions or closing remarks.
Never guess, speculate, or use outside knowledge beyond the provided context.";

// ============================================================================
// Answer
// ============================================================================

/// 최종 답변
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// 답변 근거 소스 (중복 제거)
    pub sources: Vec<String>,
    /// 최고 검색 점수 기반 신뢰도 [0, 1]
    pub confidence: f32,
    /// 프롬프트에 들어간 청크 수
    pub document_count: usize,
}

impl Answer {
    /// 고정 "컨텍스트 없음" 응답
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
            confidence: 0.0,
            document_count: 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.text == FALLBACK_ANSWER
    }
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 답변 작성기
pub struct AnswerComposer {
    generator: Arc<dyn TextGenerator>,
    max_output_tokens: u32,
    max_context_chars: usize,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            max_output_tokens: config.max_output_tokens,
            max_context_chars: config.max_context_chars,
        }
    }

    /// 검색 결과로 답변 작성
    pub async fn compose(&self, question: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        if retrieval.is_empty() {
            tracing::info!("Empty retrieval, returning fallback answer without generation");
            return Ok(Answer::fallback());
        }

        let context = self.select_context(retrieval);
        let prompt = build_prompt(question, &context);

        tracing::debug!(
            "Generating with {} chunks ({} prompt chars)",
            context.len(),
            prompt.chars().count()
        );

        let text = self
            .generator
            .generate(&prompt, self.max_output_tokens)
            .await?;
        let text = text.trim();

        if text.is_empty() {
            return Err(RagError::Generation("empty answer".to_string()));
        }

        // 모델이 스스로 "컨텍스트 없음"이라고 답하면 근거 없이 고정 응답으로 정규화
        if is_fallback_text(text) {
            tracing::info!("Model declined to answer from the retrieved context");
            return Ok(Answer::fallback());
        }

        let confidence = retrieval.top_score().unwrap_or(0.0).clamp(0.0, 1.0);

        Ok(Answer {
            text: text.to_string(),
            sources: dedup_sources(context.iter().copied()),
            confidence,
            document_count: context.len(),
        })
    }

    /// 순위대로 컨텍스트 예산 안에 드는 청크 선택 (첫 청크는 항상 포함)
    fn select_context<'a>(&self, retrieval: &'a RetrievalResult) -> Vec<&'a RetrievedChunk> {
        let mut selected = Vec::new();
        let mut used = 0usize;

        for chunk in &retrieval.chunks {
            let len = chunk.text.chars().count();
            if !selected.is_empty() && used + len > self.max_context_chars {
                break;
            }
            used += len;
            selected.push(chunk);
        }

        selected
    }
}

/// 프롬프트 구성: 지시문, 소스 태그가 붙은 컨텍스트, 질문
pub fn build_prompt(question: &str, context: &[&RetrievedChunk]) -> String {
    let context = context
        .iter()
        .map(|chunk| match chunk.page {
            Some(page) => format!("[Source: {}, page {}]\n{}", chunk.source, page, chunk.text),
            None => format!("[Source: {}]\n{}", chunk.source, chunk.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        SYSTEM_PROMPT, context, question
    )
}

/// 고정 응답과 같은지 (따옴표, 공백, 대소문자 무시)
fn is_fallback_text(text: &str) -> bool {
    let normalize = |s: &str| {
        s.trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c.is_whitespace())
            .to_lowercase()
    };
    normalize(text) == normalize(FALLBACK_ANSWER)
}

// ============================================================================
// Tests
// ============================================================================
