//! 설정 모듈
//!
//! 우선순위 (낮음 → 높음): 기본값 → JSON 설정 파일 → 환경변수 → CLI 플래그
//!
//! API 키는 설정 파일에 두지 않고 환경변수에서만 읽습니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, UpsertMode};
use crate::retry::RetryPolicy;

/// 기본 임베딩 모델 (오프라인 결정적 해시 임베딩, 384차원)
pub const DEFAULT_EMBEDDING_MODEL: &str = "local-hash-384";

/// 기본 생성 모델 (Groq)
pub const DEFAULT_GENERATION_MODEL: &str = "llama-3.1-8b-instant";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.grounded-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grounded-rag")
}

// ============================================================================
// Config Sections
// ============================================================================

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 기본 검색 결과 수
    pub top_k: usize,
    /// 기본 최소 유사도 (거의 0: "컨텍스트 없음" 판단은 빈 결과에 맡김)
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
        }
    }
}

/// 답변 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 최대 출력 토큰 (1~3문장 수준)
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// 프롬프트에 넣을 컨텍스트 최대 문자 수
    pub max_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 256,
            temperature: 0.1,
            max_context_chars: 3000,
        }
    }
}

/// 벡터 인덱스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// upsert 동작 (전체 교체 / 추가)
    pub mode: UpsertMode,
    /// SQLite 영속화 경로 (`None`이면 메모리 전용)
    pub store_path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mode: UpsertMode::Replace,
            store_path: Some(get_data_dir().join("index.db")),
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// 전체 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// 문서 디렉토리
    pub documents_dir: PathBuf,
    pub embedding_model: String,
    pub generation_model: String,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
    pub index: IndexConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("./data"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            chunking: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            retry: RetryPolicy::default(),
            index: IndexConfig::default(),
        }
    }
}

impl RagConfig {
    /// 설정 로드: 기본값 → JSON 파일(있으면) → 환경변수
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// JSON 파일에서 로드 (누락된 필드는 기본값)
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            RagError::InvalidRequest(format!("failed to read config {:?}: {}", path, e))
        })?;

        let config: RagConfig = serde_json::from_str(&data).map_err(|e| {
            RagError::InvalidRequest(format!("invalid config {:?}: {}", path, e))
        })?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    ///
    /// `lookup`으로 변수를 조회하므로 테스트에서 프로세스 환경을 건드리지 않아도 됩니다.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DATA_DIR") {
            self.documents_dir = PathBuf::from(dir);
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        // GROQ_LLM_MODEL은 이전 이름 (호환)
        if let Some(model) = get("GENERATION_MODEL").or_else(|| get("GROQ_LLM_MODEL")) {
            self.generation_model = model;
        }
        if let Some(path) = get("RAG_STORE_PATH") {
            self.index.store_path = Some(PathBuf::from(path));
        }

        if let Some(v) = parse_var(&get, "CHUNK_SIZE")? {
            self.chunking.chunk_size = v;
        }
        if let Some(v) = parse_var(&get, "CHUNK_OVERLAP")? {
            self.chunking.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&get, "MAX_TOKENS")? {
            self.generation.max_output_tokens = v;
        }
        if let Some(v) = parse_var(&get, "TOP_K")? {
            self.retrieval.top_k = v;
        }
        if let Some(v) = parse_var(&get, "MIN_SCORE")? {
            self.retrieval.min_score = v;
        }

        Ok(())
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RagError::InvalidRequest(msg));

        if self.chunking.chunk_size == 0 {
            return invalid("chunk_size must be greater than 0".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.chunking.supported_extensions.is_empty() {
            return invalid("supported_extensions must not be empty".to_string());
        }
        if self.retrieval.top_k == 0 {
            return invalid("top_k must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return invalid(format!(
                "min_score must be within [0, 1], got {}",
                self.retrieval.min_score
            ));
        }
        if self.generation.max_output_tokens == 0 {
            return invalid("max_output_tokens must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.timeout_secs == 0 {
            return invalid("retry.timeout_secs must be at least 1".to_string());
        }
        if self.embedding_model.trim().is_empty() || self.generation_model.trim().is_empty() {
            return invalid("model ids must not be empty".to_string());
        }

        Ok(())
    }
}

/// 숫자 환경변수 파싱 (잘못된 값은 에러)
fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::InvalidRequest(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RagConfig::default();
        config
            .apply_env_from(lookup(&[
                ("CHUNK_SIZE", "600"),
                ("CHUNK_OVERLAP", "60"),
                ("GROQ_LLM_MODEL", "llama-3.3-70b-versatile"),
                ("MIN_SCORE", "0.25"),
                ("DATA_DIR", "/tmp/docs"),
            ]))
            .unwrap();

        assert_eq!(config.chunking.chunk_size, 600);
        assert_eq!(config.chunking.chunk_overlap, 60);
        assert_eq!(config.generation_model, "llama-3.3-70b-versatile");
        assert!((config.retrieval.min_score - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.documents_dir, PathBuf::from("/tmp/docs"));
    }

    #[test]
    fn test_generation_model_takes_precedence() {
        let mut config = RagConfig::default();
        config
            .apply_env_from(lookup(&[
                ("GENERATION_MODEL", "gemini-2.0-flash"),
                ("GROQ_LLM_MODEL", "llama-3.1-8b-instant"),
            ]))
            .unwrap();
        assert_eq!(config.generation_model, "gemini-2.0-flash");
    }

    #[test]
    fn test_env_invalid_number() {
        let mut config = RagConfig::default();
        let result = config.apply_env_from(lookup(&[("CHUNK_SIZE", "big")]));
        assert!(matches!(result, Err(RagError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_overlap_too_large() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_min_score_range() {
        let mut config = RagConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_retry_budget() {
        let mut config = RagConfig::default();
        config.retry.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(RagError::InvalidRequest(_))));

        let mut config = RagConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "documents_dir": "./corpus", "chunking": { "chunk_size": 800 }, "index": { "store_path": null } }"#,
        )
        .unwrap();

        let config = RagConfig::from_file(&path).unwrap();
        assert_eq!(config.documents_dir, PathBuf::from("./corpus"));
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert!(config.index.store_path.is_none());
        assert_eq!(config.generation_model, DEFAULT_GENERATION_MODEL);
    }
}
