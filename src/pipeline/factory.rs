//! 모델 ID → 프로바이더 생성
//!
//! 테스트에서는 이 트레이트를 구현해 가짜 임베딩/생성기를 주입합니다.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::Result;
use crate::generation::{create_generator, TextGenerator};
use crate::retry::RetryPolicy;

/// 프로바이더 팩토리 트레이트
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn embedder(&self, model_id: &str) -> Result<Arc<dyn EmbeddingProvider>>;

    async fn generator(&self, model_id: &str) -> Result<Arc<dyn TextGenerator>>;
}

/// 설정 기반 HTTP/로컬 어댑터 팩토리
#[derive(Debug, Clone)]
pub struct DefaultProviderFactory {
    generation: GenerationConfig,
    retry: RetryPolicy,
}

impl DefaultProviderFactory {
    pub fn new(generation: GenerationConfig, retry: RetryPolicy) -> Self {
        Self { generation, retry }
    }
}

#[async_trait]
impl ProviderFactory for DefaultProviderFactory {
    async fn embedder(&self, model_id: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        create_embedder(model_id, &self.retry).await
    }

    async fn generator(&self, model_id: &str) -> Result<Arc<dyn TextGenerator>> {
        create_generator(model_id, &self.generation, &self.retry)
    }
}
