//! 파이프라인 통합 테스트
//!
//! 공개 `Pipeline` API를 주입된 프로바이더 팩토리로 구동합니다.
//! 임베딩은 결정적인 로컬 해시, 생성은 질문의 내용어가 모두 들어 있는
//! 컨텍스트 문장을 그대로 돌려주는 추출형 생성기입니다.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grounded_rag::embedding::{EmbeddingProvider, HashEmbedding};
use grounded_rag::knowledge::{ChunkConfig, ChunkStore};
use grounded_rag::{
    Pipeline, PipelineState, ProviderFactory, RagConfig, RagError, Result, TextGenerator,
    UpsertMode, FALLBACK_ANSWER,
};
use tempfile::{tempdir, TempDir};
use tokio::sync::Semaphore;

const EMBEDDING_MODEL: &str = "local-hash-128";
const GENERATION_MODEL: &str = "extractive";

// ============================================================================
// Test Providers
// ============================================================================

/// 배치 호출 수를 세고, 게이트가 있으면 열릴 때까지 대기하는 임베더
struct CountingEmbedder {
    inner: HashEmbedding,
    calls: Arc<AtomicUsize>,
    /// 게이트 대기 전에 증가 (진행 중인 호출 관찰용)
    entered: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;
        }
        if texts.iter().any(|t| t.contains("explode")) {
            return Err(RagError::Embedding("backend unavailable".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// 질문의 내용어를 모두 포함한 첫 컨텍스트 문장으로 답하고, 없으면 고정 응답
struct ExtractiveGenerator {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

const QUESTION_WORDS: &[&str] = &["what", "which", "where", "does"];

fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 4 && !QUESTION_WORDS.contains(&w.as_str()))
        .collect()
}

#[async_trait]
impl TextGenerator for ExtractiveGenerator {
    async fn generate(&self, prompt: &str, _max_output_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::Generation("generator unreachable".to_string()));
        }

        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion: ").next())
            .unwrap_or_default();
        let question = prompt
            .rsplit("Question: ")
            .next()
            .and_then(|rest| rest.split("\n\nAnswer:").next())
            .unwrap_or_default();

        let words = content_words(question);
        let answer = context
            .split(|c: char| c == '.' || c == '\n')
            .map(str::trim)
            .find(|sentence| {
                let lower = sentence.to_lowercase();
                !sentence.starts_with("[Source:") && words.iter().all(|w| lower.contains(w.as_str()))
            })
            .map(|s| format!("{}.", s))
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());

        Ok(answer)
    }

    fn model_id(&self) -> &str {
        GENERATION_MODEL
    }
}

#[derive(Default)]
struct TestFactory {
    embed_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
    embed_entered: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
    fail_generation: bool,
}

#[async_trait]
impl ProviderFactory for TestFactory {
    async fn embedder(&self, model_id: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(CountingEmbedder {
            inner: HashEmbedding::from_model_id(model_id)?,
            calls: Arc::clone(&self.embed_calls),
            entered: Arc::clone(&self.embed_entered),
            gate: self.gate.clone(),
        }))
    }

    async fn generator(&self, _model_id: &str) -> Result<Arc<dyn TextGenerator>> {
        Ok(Arc::new(ExtractiveGenerator {
            calls: Arc::clone(&self.generate_calls),
            fail: self.fail_generation,
        }))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("geography.txt"),
        "Notes on places.\nThe capital of Francia is Paris.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("fruit.md"),
        "# Fruit\n\nBananas grow on tropical plants. They are rich in potassium.",
    )
    .unwrap();
}

fn config_for(docs: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.documents_dir = docs.to_path_buf();
    config.embedding_model = EMBEDDING_MODEL.to_string();
    config.generation_model = GENERATION_MODEL.to_string();
    config.index.store_path = None;
    config
}

fn corpus() -> TempDir {
    let dir = tempdir().unwrap();
    write_corpus(dir.path());
    dir
}

fn pipeline_with(config: RagConfig, factory: TestFactory) -> (Pipeline, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let embed_calls = Arc::clone(&factory.embed_calls);
    let generate_calls = Arc::clone(&factory.generate_calls);
    let pipeline = Pipeline::with_factory(config, Arc::new(factory)).unwrap();
    (pipeline, embed_calls, generate_calls)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_grounded_answer_and_fallback() {
    let docs = corpus();
    let (pipeline, _, generate_calls) = pipeline_with(config_for(docs.path()), TestFactory::default());

    let status = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert_eq!(status.document_count, 2);

    let answer = pipeline
        .query("What is the capital of Francia?", 5, 0.0)
        .await
        .unwrap();
    assert!(answer.text.contains("Paris"), "got: {}", answer.text);
    assert!(answer.sources.contains(&"geography.txt".to_string()));
    assert!(answer.confidence > 0.0 && answer.confidence <= 1.0);

    let answer = pipeline
        .query("What is the capital of Mars?", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence, 0.0);

    assert!(generate_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(pipeline.history().len(), 2);
}

#[tokio::test]
async fn test_threshold_fallback_never_calls_generator() {
    let docs = corpus();
    let (pipeline, _, generate_calls) = pipeline_with(config_for(docs.path()), TestFactory::default());
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    let answer = pipeline
        .query("Completely unrelated volcano question", 5, 0.99)
        .await
        .unwrap();

    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence, 0.0);
    assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_directory_is_ready_with_zero_chunks() {
    let docs = tempdir().unwrap();
    let (pipeline, embed_calls, generate_calls) =
        pipeline_with(config_for(docs.path()), TestFactory::default());

    let status = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert_eq!(status.chunk_count, 0);
    assert_eq!(embed_calls.load(Ordering::SeqCst), 0);

    let answer = pipeline.query("Anything at all?", 3, 0.0).await.unwrap();
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_before_initialize_is_rejected() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());

    let err = pipeline.query("What is the capital of Francia?", 5, 0.0).await.unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady(PipelineState::Uninitialized)));
}

#[tokio::test]
async fn test_query_while_initializing_fails_fast() {
    let docs = corpus();
    let gate = Arc::new(Semaphore::new(0));
    let factory = TestFactory {
        gate: Some(Arc::clone(&gate)),
        ..Default::default()
    };
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), factory);
    let pipeline = Arc::new(pipeline);

    let init = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await })
    };

    // 빌드가 임베더 안에서 멈출 때까지 대기
    let mut observed = false;
    for _ in 0..200 {
        if pipeline.status().state == PipelineState::Initializing {
            observed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(observed, "pipeline never entered initializing");

    let err = tokio::time::timeout(
        Duration::from_secs(1),
        pipeline.query("What is the capital of Francia?", 5, 0.0),
    )
    .await
    .expect("query must not block during initialization")
    .unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady(PipelineState::Initializing)));

    gate.add_permits(1);
    let status = init.await.unwrap().unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert!(pipeline.query("What is the capital of Francia?", 5, 0.0).await.is_ok());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let docs = corpus();
    let (pipeline, embed_calls, _) = pipeline_with(config_for(docs.path()), TestFactory::default());

    let first = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    let calls_after_first = embed_calls.load(Ordering::SeqCst);
    let before = pipeline.query("capital of Francia", 10, 0.0).await.unwrap();

    let second = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert_eq!(first.chunk_count, second.chunk_count);
    assert_eq!(first.indexed_at, second.indexed_at);

    // 두 initialize 사이에는 질의 임베딩 한 번뿐
    assert_eq!(embed_calls.load(Ordering::SeqCst), calls_after_first + 1);

    let after = pipeline.query("capital of Francia", 10, 0.0).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rebuild_and_model_change_trigger_full_build() {
    let docs = corpus();
    let (pipeline, embed_calls, _) = pipeline_with(config_for(docs.path()), TestFactory::default());

    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    let after_init = embed_calls.load(Ordering::SeqCst);

    pipeline.rebuild().await.unwrap();
    assert!(embed_calls.load(Ordering::SeqCst) > after_init);

    let status = pipeline.initialize("local-hash-64", GENERATION_MODEL).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert_eq!(status.embedding_model.as_deref(), Some("local-hash-64"));
}

#[tokio::test]
async fn test_rebuild_ignores_matching_persisted_index() {
    let docs = corpus();
    let store_dir = tempdir().unwrap();
    let mut config = config_for(docs.path());
    config.index.store_path = Some(store_dir.path().join("index.db"));

    let (first, _, _) = pipeline_with(config.clone(), TestFactory::default());
    first.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    drop(first);

    // 미초기화 상태의 강제 재빌드도 저장소를 재사용하지 않음
    let (second, embed_calls, _) = pipeline_with(config.clone(), TestFactory::default());
    let status = second.rebuild().await.unwrap();
    assert!(!status.reused_index);
    let after_cold = embed_calls.load(Ordering::SeqCst);
    assert!(after_cold > 0);

    // Ready 상태에서 다시 재빌드해도 전부 임베딩
    let status = second.rebuild().await.unwrap();
    assert!(!status.reused_index);
    assert!(embed_calls.load(Ordering::SeqCst) > after_cold);
    assert_eq!(status.document_count, 2);

    // 재빌드가 저장한 인덱스는 일반 initialize에서 재사용됨
    drop(second);
    let (third, third_embeds, _) = pipeline_with(config, TestFactory::default());
    let status = third.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert!(status.reused_index);
    assert_eq!(third_embeds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_embedding_failure_during_initialize() {
    let docs = corpus();
    std::fs::write(docs.path().join("broken.txt"), "this chunk will explode the backend").unwrap();
    let (pipeline, _, generate_calls) = pipeline_with(config_for(docs.path()), TestFactory::default());

    let err = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)), "unexpected error: {err:?}");

    let status = pipeline.status();
    assert_eq!(status.state, PipelineState::Failed);
    assert_eq!(status.chunk_count, 0);
    assert!(status.failure.as_deref().unwrap_or_default().contains("backend unavailable"));

    let err = pipeline.query("What is the capital of Francia?", 5, 0.0).await.unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady(PipelineState::Failed)));
    assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ingestion_failure_then_recovery() {
    let root = tempdir().unwrap();
    let docs = root.path().join("missing");
    let (pipeline, _, _) = pipeline_with(config_for(&docs), TestFactory::default());

    let err = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion(_)));

    let status = pipeline.status();
    assert_eq!(status.state, PipelineState::Failed);
    assert!(status.failure.is_some());

    let err = pipeline.query("anything", 5, 0.0).await.unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady(PipelineState::Failed)));

    std::fs::create_dir_all(&docs).unwrap();
    write_corpus(&docs);
    let status = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert!(status.failure.is_none());
}

#[tokio::test]
async fn test_unsupported_files_only_is_ingestion_error() {
    let docs = tempdir().unwrap();
    std::fs::write(docs.path().join("photo.png"), [0u8, 1, 2]).unwrap();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());

    let err = pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion(_)));
    assert_eq!(pipeline.status().state, PipelineState::Failed);
}

#[tokio::test]
async fn test_reset_clears_index_and_history() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    pipeline.query("What is the capital of Francia?", 5, 0.0).await.unwrap();
    assert_eq!(pipeline.history().len(), 1);

    pipeline.reset().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.state, PipelineState::Uninitialized);
    assert_eq!(status.chunk_count, 0);
    assert!(pipeline.history().is_empty());

    let err = pipeline.query("What is the capital of Francia?", 5, 0.0).await.unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady(PipelineState::Uninitialized)));
}

#[tokio::test]
async fn test_reset_during_query_records_no_turn() {
    let docs = corpus();
    let gate = Arc::new(Semaphore::new(1));
    let entered = Arc::new(AtomicUsize::new(0));
    let factory = TestFactory {
        gate: Some(Arc::clone(&gate)),
        embed_entered: Arc::clone(&entered),
        ..Default::default()
    };
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), factory);
    let pipeline = Arc::new(pipeline);
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    let before_query = entered.load(Ordering::SeqCst);

    // 게이트를 잡아 질의를 질문 임베딩 단계에서 멈춤
    let held = Arc::clone(&gate).acquire_owned().await.unwrap();
    let query = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.query("What is the capital of Francia?", 5, 0.0).await })
    };

    let mut in_flight = false;
    for _ in 0..200 {
        if entered.load(Ordering::SeqCst) > before_query {
            in_flight = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(in_flight, "query never reached the embedder");

    pipeline.reset().await.unwrap();
    drop(held);

    assert!(query.await.unwrap().is_ok());
    assert!(pipeline.history().is_empty());
    assert_eq!(pipeline.status().state, PipelineState::Uninitialized);
}

#[tokio::test]
async fn test_clear_history_keeps_index() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    pipeline.query("capital of Francia", 5, 0.0).await.unwrap();

    let chunks = pipeline.status().chunk_count;
    pipeline.clear_history();

    assert!(pipeline.history().is_empty());
    assert_eq!(pipeline.status().chunk_count, chunks);
    assert_eq!(pipeline.status().state, PipelineState::Ready);

    // 기록 삭제 후에도 순번은 계속 증가
    pipeline.query("capital of Francia", 5, 0.0).await.unwrap();
    assert_eq!(pipeline.history()[0].sequence, 2);
}

#[tokio::test]
async fn test_generation_error_propagates() {
    let docs = corpus();
    let factory = TestFactory {
        fail_generation: true,
        ..Default::default()
    };
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), factory);
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    let err = pipeline
        .query("What is the capital of Francia?", 5, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert!(pipeline.history().is_empty());
}

#[tokio::test]
async fn test_query_embedding_failure_is_retrieval_error() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    let err = pipeline.query("please explode", 5, 0.0).await.unwrap_err();
    match err {
        RagError::Retrieval(inner) => assert!(matches!(*inner, RagError::Embedding(_))),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_query_parameters() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    assert!(matches!(
        pipeline.query("   ", 5, 0.0).await,
        Err(RagError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline.query("capital", 0, 0.0).await,
        Err(RagError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline.query("capital", 5, 1.5).await,
        Err(RagError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_persisted_index_is_reused_across_restarts() {
    let docs = corpus();
    let store_dir = tempdir().unwrap();
    let mut config = config_for(docs.path());
    config.index.store_path = Some(store_dir.path().join("index.db"));

    let (first, first_embeds, _) = pipeline_with(config.clone(), TestFactory::default());
    let status = first.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert!(!status.reused_index);
    assert!(first_embeds.load(Ordering::SeqCst) > 0);
    let expected = first.query("capital of Francia", 10, 0.0).await.unwrap();
    drop(first);

    let (second, second_embeds, _) = pipeline_with(config.clone(), TestFactory::default());
    let status = second.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert!(status.reused_index);
    assert_eq!(second_embeds.load(Ordering::SeqCst), 0);
    assert_eq!(second.query("capital of Francia", 10, 0.0).await.unwrap(), expected);

    // 코퍼스가 바뀌면 영속 인덱스는 무효
    std::fs::write(docs.path().join("extra.txt"), "Rivers flow into the sea.").unwrap();
    let (third, third_embeds, _) = pipeline_with(config, TestFactory::default());
    let status = third.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    assert!(!status.reused_index);
    assert!(third_embeds.load(Ordering::SeqCst) > 0);
    assert_eq!(status.document_count, 3);
}

#[tokio::test]
async fn test_append_mode_embeds_only_new_chunks() {
    let docs = corpus();
    let store_dir = tempdir().unwrap();
    let mut config = config_for(docs.path());
    config.index.mode = UpsertMode::Append;
    config.index.store_path = Some(store_dir.path().join("index.db"));

    let (first, _, _) = pipeline_with(config.clone(), TestFactory::default());
    let initial = first.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();
    drop(first);

    std::fs::write(docs.path().join("extra.txt"), "Rivers flow into the sea.").unwrap();
    let (second, second_embeds, _) = pipeline_with(config.clone(), TestFactory::default());
    let status = second.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    assert_eq!(status.chunk_count, initial.chunk_count + 1);
    assert_eq!(second_embeds.load(Ordering::SeqCst), 1);

    // 차원이 다른 추가는 거부
    let (third, _, _) = pipeline_with(config, TestFactory::default());
    let err = third.initialize("local-hash-64", GENERATION_MODEL).await.unwrap_err();
    assert!(matches!(err, RagError::Index(_)));
    assert_eq!(third.status().state, PipelineState::Failed);
}

#[tokio::test]
async fn test_concurrent_queries() {
    let docs = corpus();
    let (pipeline, _, _) = pipeline_with(config_for(docs.path()), TestFactory::default());
    let pipeline = Arc::new(pipeline);
    pipeline.initialize(EMBEDDING_MODEL, GENERATION_MODEL).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let question = if i % 2 == 0 {
                    "What is the capital of Francia?"
                } else {
                    "What is the capital of Mars?"
                };
                pipeline.query(question, 5, 0.0).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let history = pipeline.history();
    let mut sequences: Vec<u64> = history.iter().map(|t| t.sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_ingestion_is_deterministic() {
    let docs = tempdir().unwrap();
    std::fs::write(docs.path().join("long.txt"), "lorem ipsum dolor ".repeat(200)).unwrap();
    write_corpus(docs.path());

    let config = ChunkConfig {
        chunk_size: 300,
        chunk_overlap: 45,
        ..Default::default()
    };
    let store = ChunkStore::new(&config).unwrap();

    let first = store.load(docs.path()).await.unwrap();
    let second = store.load(docs.path()).await.unwrap();
    assert_eq!(first, second);

    // 같은 소스의 인접 청크는 설정한 오버랩만큼 정확히 공유
    let long: Vec<_> = first.iter().filter(|c| c.source == "long.txt").collect();
    assert!(long.len() > 2);
    for pair in long.windows(2) {
        assert_eq!(pair[0].char_end - pair[1].char_start, 45);
        assert_eq!(pair[1].index, pair[0].index + 1);
    }
}
