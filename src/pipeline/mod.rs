//! Pipeline 모듈 - RAG 수명 주기 관리
//!
//! 상태 전이:
//! - `Uninitialized` → `Initializing` (initialize)
//! - `Initializing` → `Ready` (인덱스 게시) / `Failed` (원인 보관)
//! - `Ready` / `Failed` → `Initializing` (재초기화, 전체 재빌드)
//! - 모든 상태 → `Uninitialized` (reset: 인덱스, 영속 저장소, 대화 기록 삭제)
//!
//! 질의는 `Ready`에서만 받습니다. 재빌드는 새 인덱스를 따로 만든 뒤
//! 쓰기 락 아래에서 포인터만 교체하므로 질의가 중간 상태를 보지 않습니다.

mod factory;
mod state;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::knowledge::{
    Answer, AnswerComposer, Chunk, ChunkStore, EmbeddedChunk, IndexEntry, IndexMeta, IndexStore,
    Retriever, UpsertMode, VectorIndex,
};

pub use factory::{DefaultProviderFactory, ProviderFactory};
pub use state::{ConversationTurn, PipelineState, PipelineStatus};

/// 임베딩 호출 한 번에 보낼 청크 수
const EMBED_BATCH_SIZE: usize = 64;

// ============================================================================
// Internal State
// ============================================================================

/// 게시된 인덱스와 그에 묶인 검색기/작성기
struct Active {
    embedding_model: String,
    /// 임베딩 구현체가 보고한 모델 ID (영속 메타와 비교용)
    embedder_id: String,
    generation_model: String,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    composer: AnswerComposer,
    indexed_at: DateTime<Utc>,
    reused: bool,
}

struct Lifecycle {
    state: PipelineState,
    failure: Option<String>,
    active: Option<Arc<Active>>,
}

struct History {
    turns: Vec<ConversationTurn>,
    next_sequence: u64,
    /// clear/reset마다 증가 (진행 중이던 질의의 기록 방지)
    epoch: u64,
}

// ============================================================================
// Pipeline
// ============================================================================

/// RAG 파이프라인
///
/// 프로세스당 하나를 만들어 `Arc`로 공유합니다.
pub struct Pipeline {
    config: RagConfig,
    factory: Arc<dyn ProviderFactory>,
    lifecycle: RwLock<Lifecycle>,
    /// initialize/rebuild/reset 직렬화
    init_lock: tokio::sync::Mutex<()>,
    history: Mutex<History>,
}

impl Pipeline {
    /// 기본 어댑터 팩토리로 생성
    pub fn new(config: RagConfig) -> Result<Self> {
        let factory = DefaultProviderFactory::new(config.generation.clone(), config.retry.clone());
        Self::with_factory(config, Arc::new(factory))
    }

    /// 프로바이더 팩토리를 지정하여 생성
    pub fn with_factory(config: RagConfig, factory: Arc<dyn ProviderFactory>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            factory,
            lifecycle: RwLock::new(Lifecycle {
                state: PipelineState::Uninitialized,
                failure: None,
                active: None,
            }),
            init_lock: tokio::sync::Mutex::new(()),
            history: Mutex::new(History {
                turns: Vec::new(),
                next_sequence: 1,
                epoch: 0,
            }),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// 초기화 (이미 같은 모델로 `Ready`면 아무것도 하지 않음)
    pub async fn initialize(
        &self,
        embedding_model: &str,
        generation_model: &str,
    ) -> Result<PipelineStatus> {
        let _guard = self.init_lock.lock().await;

        let already_ready = {
            let lifecycle = self.lifecycle_read();
            lifecycle.state == PipelineState::Ready
                && lifecycle.active.as_ref().map_or(false, |active| {
                    active.embedding_model == embedding_model
                        && active.generation_model == generation_model
                })
        };
        if already_ready {
            tracing::debug!("Pipeline already ready with the same models");
            return Ok(self.status());
        }

        self.build(embedding_model, generation_model, false).await
    }

    /// 설정의 모델 ID로 초기화
    pub async fn initialize_default(&self) -> Result<PipelineStatus> {
        let embedding_model = self.config.embedding_model.clone();
        let generation_model = self.config.generation_model.clone();
        self.initialize(&embedding_model, &generation_model).await
    }

    /// 현재 모델 ID로 강제 재빌드 (미초기화면 설정의 모델 사용)
    ///
    /// 영속 인덱스가 일치해도 재사용하지 않고 전부 다시 임베딩합니다.
    pub async fn rebuild(&self) -> Result<PipelineStatus> {
        let _guard = self.init_lock.lock().await;

        let (embedding_model, generation_model) = {
            let lifecycle = self.lifecycle_read();
            match &lifecycle.active {
                Some(active) => (
                    active.embedding_model.clone(),
                    active.generation_model.clone(),
                ),
                None => (
                    self.config.embedding_model.clone(),
                    self.config.generation_model.clone(),
                ),
            }
        };

        self.build(&embedding_model, &generation_model, true).await
    }

    /// `Uninitialized`로 되돌리고 인덱스, 영속 저장소, 대화 기록 삭제
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        {
            let mut lifecycle = self.lifecycle_write();
            lifecycle.state = PipelineState::Uninitialized;
            lifecycle.failure = None;
            if let Some(active) = lifecycle.active.take() {
                active.index.reset()?;
            }
        }

        {
            let mut history = self.history_lock();
            history.turns.clear();
            history.epoch += 1;
        }

        if let Some(store) = self.open_store()? {
            store.clear()?;
        }

        tracing::info!("Pipeline reset");
        Ok(())
    }

    /// 재빌드 수행 후 결과에 따라 `Ready` 또는 `Failed`로 전이
    async fn build(
        &self,
        embedding_model: &str,
        generation_model: &str,
        force: bool,
    ) -> Result<PipelineStatus> {
        {
            let mut lifecycle = self.lifecycle_write();
            tracing::info!(
                "Pipeline {} -> initializing (embedding: {}, generation: {})",
                lifecycle.state,
                embedding_model,
                generation_model
            );
            lifecycle.state = PipelineState::Initializing;
            lifecycle.failure = None;
        }

        match self
            .build_active(embedding_model, generation_model, force)
            .await
        {
            Ok(active) => {
                let mut lifecycle = self.lifecycle_write();
                tracing::info!(
                    "Pipeline ready: {} chunks from {} documents",
                    active.index.count(),
                    active.index.source_count()
                );
                lifecycle.active = Some(Arc::new(active));
                lifecycle.state = PipelineState::Ready;
                drop(lifecycle);
                Ok(self.status())
            }
            Err(e) => {
                let mut lifecycle = self.lifecycle_write();
                tracing::error!("Pipeline initialization failed: {}", e);
                lifecycle.active = None;
                lifecycle.state = PipelineState::Failed;
                lifecycle.failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// 인제스트 → 임베딩 → 인덱싱 → 영속화
    async fn build_active(
        &self,
        embedding_model: &str,
        generation_model: &str,
        force: bool,
    ) -> Result<Active> {
        let embedder = self.factory.embedder(embedding_model).await?;
        let generator = self.factory.generator(generation_model).await?;

        let chunk_store = ChunkStore::new(&self.config.chunking)?;
        let chunks = chunk_store.load(&self.config.documents_dir).await?;

        let dimension = embedder.dimension();
        let model_id = embedder.model_id().to_string();
        let meta = IndexMeta {
            embedding_model: model_id.clone(),
            dimension,
            fingerprint: corpus_fingerprint(&chunks),
            updated_at: Utc::now(),
        };
        let store = self.open_store()?;

        let (index, reused) = match self.config.index.mode {
            UpsertMode::Replace => {
                self.build_replace(embedder.as_ref(), chunks, &meta, store.as_ref(), force)
                    .await?
            }
            UpsertMode::Append => (
                self.build_append(embedder.as_ref(), chunks, &meta, store.as_ref())
                    .await?,
                false,
            ),
        };

        let index = Arc::new(index);
        Ok(Active {
            embedding_model: embedding_model.to_string(),
            embedder_id: model_id,
            generation_model: generation_model.to_string(),
            retriever: Retriever::new(embedder, Arc::clone(&index)),
            composer: AnswerComposer::new(generator, &self.config.generation),
            index,
            indexed_at: meta.updated_at,
            reused,
        })
    }

    /// 전체 교체 빌드 (같은 모델/차원/코퍼스의 영속 인덱스가 있으면 재사용, `force`면 생략)
    async fn build_replace(
        &self,
        embedder: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
        meta: &IndexMeta,
        store: Option<&IndexStore>,
        force: bool,
    ) -> Result<(VectorIndex, bool)> {
        if let Some(store) = store.filter(|_| !force) {
            if let Some(saved) = store.meta()? {
                if saved.matches(&meta.embedding_model, meta.dimension, &meta.fingerprint) {
                    let entries = store.load_entries(meta.dimension)?;
                    if entries.len() == chunks.len() {
                        tracing::info!(
                            "Reusing persisted index ({} entries) from {:?}",
                            entries.len(),
                            store.db_path()
                        );
                        return Ok((VectorIndex::restore(meta.dimension, entries)?, true));
                    }
                    tracing::warn!("Persisted index is incomplete, rebuilding");
                }
            }
        }

        let embedded = embed_chunks(embedder, chunks).await?;
        let index = VectorIndex::new(meta.dimension)?;
        index.upsert(embedded, UpsertMode::Replace)?;

        if let Some(store) = store {
            store.replace_all(meta, &index.entries()?)?;
        }

        Ok((index, false))
    }

    /// 추가 빌드: 기존 엔트리는 그대로 두고 새 청크만 임베딩
    async fn build_append(
        &self,
        embedder: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
        meta: &IndexMeta,
        store: Option<&IndexStore>,
    ) -> Result<VectorIndex> {
        let existing = self.existing_entries(meta, store)?;
        let index = VectorIndex::restore(meta.dimension, existing)?;

        let known: HashSet<String> = index.entries()?.iter().map(|e| e.id.clone()).collect();
        let fresh: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !known.contains(&c.entry_id()))
            .collect();

        tracing::info!(
            "Appending {} new chunks to {} existing entries",
            fresh.len(),
            known.len()
        );

        let embedded = embed_chunks(embedder, fresh).await?;
        index.upsert(embedded, UpsertMode::Append)?;

        if let Some(store) = store {
            let added: Vec<Arc<IndexEntry>> = index
                .entries()?
                .into_iter()
                .filter(|e| !known.contains(&e.id))
                .collect();
            store.append(meta, &added)?;
        }

        Ok(index)
    }

    /// 추가 모드의 기존 엔트리 (영속 저장소 우선, 없으면 현재 게시된 인덱스)
    ///
    /// 기존 엔트리의 모델이나 차원이 다르면 `Index` 에러입니다.
    fn existing_entries(
        &self,
        meta: &IndexMeta,
        store: Option<&IndexStore>,
    ) -> Result<Vec<IndexEntry>> {
        let check = |model: &str, dimension: usize| -> Result<()> {
            if dimension != meta.dimension || model != meta.embedding_model {
                return Err(RagError::Index(format!(
                    "existing entries were built with {} ({} dims), cannot append {} ({} dims)",
                    model, dimension, meta.embedding_model, meta.dimension
                )));
            }
            Ok(())
        };

        if let Some(store) = store {
            return match store.meta()? {
                Some(saved) => {
                    check(&saved.embedding_model, saved.dimension)?;
                    store.load_entries(saved.dimension)
                }
                None => Ok(Vec::new()),
            };
        }

        let lifecycle = self.lifecycle_read();
        match &lifecycle.active {
            Some(active) if active.index.count() > 0 => {
                check(&active.embedder_id, active.index.dimension())?;
                Ok(active
                    .index
                    .entries()?
                    .iter()
                    .map(|e| (**e).clone())
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn open_store(&self) -> Result<Option<IndexStore>> {
        self.config
            .index
            .store_path
            .as_deref()
            .map(IndexStore::open)
            .transpose()
    }

    // ------------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------------

    /// 질문에 답변 (`Ready`에서만)
    pub async fn query(&self, question: &str, top_k: usize, min_score: f32) -> Result<Answer> {
        // reset이 스냅샷과 기록 사이에 끼어들면 기록하지 않도록 epoch를 먼저 읽음
        let epoch = self.history_lock().epoch;
        let active = self.ready_snapshot()?;
        validate_query(question, top_k, min_score)?;

        let question = question.trim();

        let retrieval = active.retriever.retrieve(question, top_k, min_score).await?;
        let answer = active.composer.compose(question, &retrieval).await?;

        tracing::info!(
            "Answered with {} chunks (confidence: {:.3})",
            answer.document_count,
            answer.confidence
        );

        let mut history = self.history_lock();
        if history.epoch == epoch {
            let sequence = history.next_sequence;
            history.next_sequence += 1;
            history.turns.push(ConversationTurn {
                sequence,
                question: question.to_string(),
                answer: answer.clone(),
                retrieval,
                created_at: Utc::now(),
            });
        }

        Ok(answer)
    }

    /// 설정의 기본 `top_k`/`min_score`로 질의
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.query(
            question,
            self.config.retrieval.top_k,
            self.config.retrieval.min_score,
        )
        .await
    }

    fn ready_snapshot(&self) -> Result<Arc<Active>> {
        let lifecycle = self.lifecycle_read();
        match (lifecycle.state, &lifecycle.active) {
            (PipelineState::Ready, Some(active)) => Ok(Arc::clone(active)),
            (state, _) => Err(RagError::PipelineNotReady(state)),
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// 현재 상태 스냅샷
    pub fn status(&self) -> PipelineStatus {
        let lifecycle = self.lifecycle_read();
        let active = lifecycle.active.as_ref();

        PipelineStatus {
            state: lifecycle.state,
            chunk_count: active.map(|a| a.index.count()).unwrap_or(0),
            document_count: active.map(|a| a.index.source_count()).unwrap_or(0),
            embedding_model: active.map(|a| a.embedding_model.clone()),
            generation_model: active.map(|a| a.generation_model.clone()),
            failure: lifecycle.failure.clone(),
            indexed_at: active.map(|a| a.indexed_at),
            reused_index: active.map(|a| a.reused).unwrap_or(false),
        }
    }

    /// 대화 기록 스냅샷 (오래된 순)
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history_lock().turns.clone()
    }

    /// 대화 기록만 삭제 (인덱스는 유지)
    pub fn clear_history(&self) {
        let mut history = self.history_lock();
        history.turns.clear();
        history.epoch += 1;
    }

    // ------------------------------------------------------------------------
    // Lock helpers (패닉으로 오염된 락도 계속 사용)
    // ------------------------------------------------------------------------

    fn lifecycle_read(&self) -> std::sync::RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lifecycle_write(&self) -> std::sync::RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(|e| e.into_inner())
    }

    fn history_lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 질의 파라미터 검증
fn validate_query(question: &str, top_k: usize, min_score: f32) -> Result<()> {
    if question.trim().is_empty() {
        return Err(RagError::InvalidRequest("question must not be empty".to_string()));
    }
    if top_k == 0 {
        return Err(RagError::InvalidRequest("top_k must be at least 1".to_string()));
    }
    if !(0.0..=1.0).contains(&min_score) {
        return Err(RagError::InvalidRequest(format!(
            "min_score must be within [0, 1], got {}",
            min_score
        )));
    }
    Ok(())
}

/// 청크를 배치로 임베딩
async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
) -> Result<Vec<EmbeddedChunk>> {
    let mut embedded = Vec::with_capacity(chunks.len());
    let total_batches = chunks.len().div_ceil(EMBED_BATCH_SIZE);

    for (i, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        tracing::debug!("Embedding batch {}/{}", i + 1, total_batches);
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        embedded.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
        );
    }

    Ok(embedded)
}

/// 청크 ID와 텍스트로 만든 SHA-256 코퍼스 지문
fn corpus_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.entry_id().as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================
