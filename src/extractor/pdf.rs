//! PDF 페이지 읽기
//!
//! `pdf-extract`가 돌려주는 전체 텍스트를 폼피드 기준으로 나눠
//! 1부터 시작하는 페이지 번호를 붙입니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 페이지 구분 문자
const FORM_FEED: char = '\x0c';

/// PDF를 (페이지 번호, 텍스트) 목록으로 읽기
///
/// 텍스트 레이어가 없는 PDF(스캔본 등)는 빈 목록입니다.
pub fn read_pages(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {:?}", path))?;
    let raw = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("not a parseable PDF: {:?}", path))?;

    let pages = split_pages(&raw.replace("\r\n", "\n"));
    if pages.is_empty() {
        tracing::warn!("{:?} has no text layer, indexing nothing", path);
    }

    Ok((1..).zip(pages).collect())
}

/// 폼피드로 페이지 분리
///
/// 중간의 빈 페이지는 번호 유지를 위해 남기고 끝의 빈 페이지만 버립니다.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(FORM_FEED).map(|p| p.trim().to_string()).collect();

    while matches!(pages.last(), Some(p) if p.is_empty()) {
        pages.pop();
    }
    pages
}
