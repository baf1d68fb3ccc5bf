//! 답변 생성 모듈 - 텍스트 생성 백엔드 어댑터
//!
//! 모델 ID로 구현체를 고릅니다.
//! - `gemini-*` → [`GeminiGenerator`] (`generateContent`)
//! - `groq:<model>` 또는 그 외 → [`GroqGenerator`] (OpenAI 호환 chat completions)
//!
//! 모든 호출은 [`crate::retry::with_retry`]로 타임아웃과 제한된 재시도를 거칩니다.

mod gemini;
mod groq;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;

pub use gemini::GeminiGenerator;
pub use groq::GroqGenerator;

/// 텍스트 생성 트레이트
///
/// `(prompt, max_output_tokens) → text`
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 프롬프트로 텍스트 생성
    ///
    /// 백엔드 불가, 잘못된 응답, 빈 응답은 `Generation` 에러입니다.
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String>;

    /// 모델 ID
    fn model_id(&self) -> &str;
}

/// 모델 ID로 생성기 생성
pub fn create_generator(
    model_id: &str,
    config: &GenerationConfig,
    retry: &RetryPolicy,
) -> Result<Arc<dyn TextGenerator>> {
    let model_id = model_id.trim();

    if model_id.starts_with("gemini-") {
        let generator = GeminiGenerator::from_env(model_id, config.temperature, retry.clone())?;
        tracing::info!("Using Gemini generation model {}", model_id);
        return Ok(Arc::new(generator));
    }

    let model = model_id.strip_prefix("groq:").unwrap_or(model_id);
    let generator = GroqGenerator::from_env(model, config.temperature, retry.clone())?;
    tracing::info!("Using Groq generation model {}", model);
    Ok(Arc::new(generator))
}
