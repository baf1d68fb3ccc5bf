//! 파일 수집 모듈
//!
//! 문서 디렉토리를 재귀적으로 훑어 지원 확장자의 파일만 모읍니다.
//! .gitignore 패턴을 존중하고, 재인제스트 결과가 같도록 경로 순으로 정렬합니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// File Types
// ============================================================================

/// 문서 형식 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// 텍스트 파일 (txt, md 등)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    ///
    /// `supported`에 없는 확장자는 `None`입니다. `pdf`만 PDF로 취급하고
    /// 나머지 지원 확장자는 모두 텍스트로 읽습니다.
    pub fn from_extension(ext: &str, supported: &[String]) -> Option<Self> {
        if !supported.iter().any(|s| s.eq_ignore_ascii_case(ext)) {
            return None;
        }

        if ext.eq_ignore_ascii_case("pdf") {
            Some(FileType::Pdf)
        } else {
            Some(FileType::Text)
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path, supported: &[String]) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::from_extension(ext, supported))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Text => "text",
            FileType::Pdf => "pdf",
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 문서 디렉토리 기준 상대 경로 (소스 식별자)
    pub source: String,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 수집할 확장자 (대소문자 무시)
    pub extensions: Vec<String>,
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["txt".to_string(), "md".to_string(), "pdf".to_string()],
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl CollectorConfig {
    /// 확장자 목록으로 생성 (나머지는 기본값)
    pub fn with_extensions(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.to_vec(),
            ..Default::default()
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 폴더 재귀 수집
    ///
    /// 디렉토리를 읽을 수 없으면 `Ingestion` 에러입니다.
    /// 지원 파일이 하나도 없는 경우는 빈 목록을 돌려주고, 판단은 호출자가 합니다.
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| RagError::Ingestion(format!("cannot resolve current dir: {}", e)))?
                .join(path)
        };

        if !abs_path.is_dir() {
            return Err(RagError::Ingestion(format!(
                "document directory not found or not a directory: {:?}",
                abs_path
            )));
        }

        // 권한 문제 등은 walker가 조용히 넘기므로 먼저 확인
        std::fs::read_dir(&abs_path).map_err(|e| {
            RagError::Ingestion(format!("cannot read directory {:?}: {}", abs_path, e))
        })?;

        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .require_git(false)
            .build();

        let mut files = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let file_path = entry.path();
            let file_type = match FileType::from_path(file_path, &self.config.extensions) {
                Some(ft) => ft,
                None => continue,
            };

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::warn!("Failed to read metadata for {:?}: {}", file_path, e);
                    continue;
                }
            };

            if self.config.max_file_size > 0 && size > self.config.max_file_size {
                tracing::debug!("Skipping large file: {:?} ({} bytes)", file_path, size);
                continue;
            }

            files.push(CollectedFile {
                path: file_path.to_path_buf(),
                source: source_id(&abs_path, file_path),
                file_type,
                size,
            });
        }

        files.sort_by(|a, b| a.source.cmp(&b.source));

        tracing::info!("Collected {} files from {:?}", files.len(), abs_path);
        Ok(files)
    }
}

/// 문서 디렉토리 기준 상대 경로를 `/` 구분자로
fn source_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Tests
// ============================================================================
