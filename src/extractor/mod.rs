//! 콘텐츠 추출 모듈
//!
//! 수집된 파일을 `Document`로 읽어들입니다.
//! - 텍스트 파일: UTF-8로 읽기 (잘못된 바이트는 대체 문자)
//! - PDF 파일: pdf-extract로 페이지별 추출 후 하나의 본문으로 이어붙임
//!
//! 확장자가 .pdf인데 PDF로 파싱되지 않으면 일반 텍스트로 다시 읽습니다.

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::collector::{CollectedFile, FileType};

/// PDF 페이지를 이어붙일 때 쓰는 구분자
const PAGE_SEPARATOR: &str = "\n\n";

// ============================================================================
// Document
// ============================================================================

/// 로드된 문서 (인제스트 한 번 동안만 존재)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// 소스 식별자 (문서 디렉토리 기준 상대 경로)
    pub source: String,
    /// 본문
    pub content: String,
    pub format: FileType,
    /// 각 페이지가 시작하는 문자 오프셋 (PDF만, 1페이지부터 순서대로)
    pub page_starts: Vec<usize>,
}

impl Document {
    /// 텍스트 문서 생성
    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            format: FileType::Text,
            page_starts: Vec::new(),
        }
    }

    /// 페이지 목록으로 PDF 문서 생성
    pub fn from_pages(source: impl Into<String>, pages: Vec<(usize, String)>) -> Self {
        let mut content = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut offset = 0usize;

        for (i, (_, text)) in pages.iter().enumerate() {
            if i > 0 {
                content.push_str(PAGE_SEPARATOR);
                offset += PAGE_SEPARATOR.chars().count();
            }
            page_starts.push(offset);
            content.push_str(text);
            offset += text.chars().count();
        }

        Self {
            source: source.into(),
            content,
            format: FileType::Pdf,
            page_starts,
        }
    }

    /// 문자 오프셋이 속한 페이지 번호 (1부터, 텍스트 문서는 `None`)
    pub fn page_at(&self, char_offset: usize) -> Option<usize> {
        if self.page_starts.is_empty() {
            return None;
        }

        let idx = self.page_starts.partition_point(|&start| start <= char_offset);
        Some(idx.max(1))
    }
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Default, Clone)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 문서 추출
    pub async fn extract(&self, file: &CollectedFile) -> Result<Document> {
        match file.file_type {
            FileType::Text => {
                let content = read_text(&file.path).await?;
                Ok(Document::text(&file.source, content))
            }
            FileType::Pdf => self.extract_pdf(file).await,
        }
    }

    /// PDF 파일에서 추출 (실패 시 텍스트 폴백)
    async fn extract_pdf(&self, file: &CollectedFile) -> Result<Document> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = file.path.clone();
        // pdf-extract는 손상된 입력에서 패닉할 수 있어 JoinError도 폴백 대상
        let parsed = match tokio::task::spawn_blocking(move || pdf::read_pages(&path)).await
        {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("PDF extraction task failed: {}", e)),
        };

        match parsed {
            Ok(pages) => {
                tracing::debug!("Extracted {} pages from {}", pages.len(), file.source);
                Ok(Document::from_pages(&file.source, pages))
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} as PDF ({:#}), falling back to plain text",
                    file.source,
                    e
                );
                let content = read_text(&file.path).await?;
                Ok(Document {
                    format: FileType::Pdf,
                    ..Document::text(&file.source, content)
                })
            }
        }
    }
}

/// 텍스트 파일 읽기 (줄바꿈 정규화)
async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;

    Ok(String::from_utf8_lossy(&bytes).replace("\r\n", "\n"))
}

// ============================================================================
// Tests
// ============================================================================
