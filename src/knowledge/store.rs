//! Index Store - rusqlite 기반 인덱스 영속화
//!
//! 인덱스 엔트리(벡터 + 청크 메타데이터)와 빌드 메타 정보를 저장합니다.
//! 재시작 시 같은 모델/차원/코퍼스면 재임베딩 없이 다시 읽어옵니다.
//! 저장 위치: ~/.grounded-rag/index.db
//!
//! 벡터는 little-endian f32 BLOB으로 저장합니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use super::chunker::Chunk;
use super::vector::IndexEntry;
use crate::collector::FileType;
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 빌드 메타 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dimension: usize,
    /// 청크 ID/텍스트 기준 SHA-256 코퍼스 지문
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

impl IndexMeta {
    /// 같은 모델, 차원, 코퍼스로 만든 인덱스인지
    pub fn matches(&self, embedding_model: &str, dimension: usize, fingerprint: &str) -> bool {
        self.embedding_model == embedding_model
            && self.dimension == dimension
            && self.fingerprint == fingerprint
    }
}

// ============================================================================
// IndexStore
// ============================================================================

/// SQLite 인덱스 저장소
pub struct IndexStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl IndexStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RagError::Index(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        tracing::debug!("Opened index store at {:?}", store.db_path);
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                page INTEGER,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                format TEXT NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_seq ON entries(seq);
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;

        Ok(())
    }

    /// 빌드 메타 정보 (저장된 인덱스가 없으면 `None`)
    pub fn meta(&self) -> Result<Option<IndexMeta>> {
        let conn = self.lock()?;

        let get = |key: &str| -> Result<Option<String>> {
            Ok(conn
                .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        };

        let (Some(model), Some(dimension), Some(fingerprint), Some(updated_at)) = (
            get("embedding_model")?,
            get("dimension")?,
            get("fingerprint")?,
            get("updated_at")?,
        ) else {
            return Ok(None);
        };

        let dimension = dimension
            .parse::<usize>()
            .map_err(|_| RagError::Index(format!("corrupt meta dimension: {}", dimension)))?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|_| RagError::Index(format!("corrupt meta timestamp: {}", updated_at)))?
            .with_timezone(&Utc);

        Ok(Some(IndexMeta {
            embedding_model: model,
            dimension,
            fingerprint,
            updated_at,
        }))
    }

    /// 저장된 엔트리 수
    pub fn entry_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// 전체 엔트리 읽기 (삽입 순번 순)
    ///
    /// BLOB 길이가 차원과 맞지 않으면 `Index` 에러입니다.
    pub fn load_entries(&self, dimension: usize) -> Result<Vec<IndexEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, seq, source, chunk_index, page, char_start, char_end, format, text, vector
             FROM entries ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                seq: row.get(1)?,
                source: row.get(2)?,
                chunk_index: row.get(3)?,
                page: row.get(4)?,
                char_start: row.get(5)?,
                char_end: row.get(6)?,
                format: row.get(7)?,
                text: row.get(8)?,
                vector: row.get(9)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry(dimension)?);
        }

        Ok(entries)
    }

    /// 전체 교체 (하나의 트랜잭션)
    pub fn replace_all(&self, meta: &IndexMeta, entries: &[Arc<IndexEntry>]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM meta", [])?;
        insert_entries(&tx, entries)?;
        write_meta(&tx, meta)?;

        tx.commit()?;
        tracing::debug!("Persisted {} index entries", entries.len());
        Ok(())
    }

    /// 엔트리 추가 + 메타 갱신 (하나의 트랜잭션)
    pub fn append(&self, meta: &IndexMeta, entries: &[Arc<IndexEntry>]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        insert_entries(&tx, entries)?;
        tx.execute("DELETE FROM meta", [])?;
        write_meta(&tx, meta)?;

        tx.commit()?;
        tracing::debug!("Appended {} index entries", entries.len());
        Ok(())
    }

    /// 전체 삭제
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM meta", [])?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::Index(format!("Lock error: {}", e)))
    }
}

fn insert_entries(conn: &Connection, entries: &[Arc<IndexEntry>]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO entries (id, seq, source, chunk_index, page, char_start, char_end, format, text, vector)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;

    for entry in entries {
        let chunk = &entry.chunk;
        stmt.execute(params![
            entry.id,
            entry.sequence as i64,
            chunk.source,
            chunk.index as i64,
            chunk.page.map(|p| p as i64),
            chunk.char_start as i64,
            chunk.char_end as i64,
            chunk.format.as_str(),
            chunk.text,
            vec_to_blob(&entry.vector),
        ])?;
    }

    Ok(())
}

fn write_meta(conn: &Connection, meta: &IndexMeta) -> Result<()> {
    let mut stmt = conn.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
    stmt.execute(params!["embedding_model", meta.embedding_model])?;
    stmt.execute(params!["dimension", meta.dimension.to_string()])?;
    stmt.execute(params!["fingerprint", meta.fingerprint])?;
    stmt.execute(params!["updated_at", meta.updated_at.to_rfc3339()])?;
    Ok(())
}

/// DB 행 (변환 전)
struct StoredRow {
    id: String,
    seq: i64,
    source: String,
    chunk_index: i64,
    page: Option<i64>,
    char_start: i64,
    char_end: i64,
    format: String,
    text: String,
    vector: Vec<u8>,
}

impl StoredRow {
    fn into_entry(self, dimension: usize) -> Result<IndexEntry> {
        if self.vector.len() != dimension * 4 {
            return Err(RagError::Index(format!(
                "corrupt vector for {}: {} bytes, expected {}",
                self.id,
                self.vector.len(),
                dimension * 4
            )));
        }

        let format = match self.format.as_str() {
            "text" => FileType::Text,
            "pdf" => FileType::Pdf,
            other => {
                return Err(RagError::Index(format!(
                    "corrupt format tag for {}: {}",
                    self.id, other
                )))
            }
        };

        let non_negative = |value: i64, field: &str| -> Result<usize> {
            usize::try_from(value)
                .map_err(|_| RagError::Index(format!("corrupt {} for {}: {}", field, self.id, value)))
        };

        let chunk = Chunk {
            source: self.source.clone(),
            index: non_negative(self.chunk_index, "chunk_index")?,
            text: self.text.clone(),
            page: self.page.map(|p| non_negative(p, "page")).transpose()?,
            char_start: non_negative(self.char_start, "char_start")?,
            char_end: non_negative(self.char_end, "char_end")?,
            format,
        };

        if chunk.entry_id() != self.id {
            return Err(RagError::Index(format!(
                "entry id {} does not match chunk identity {}",
                self.id,
                chunk.entry_id()
            )));
        }

        Ok(IndexEntry {
            sequence: non_negative(self.seq, "seq")? as u64,
            vector: blob_to_vec(&self.vector),
            id: self.id,
            chunk,
        })
    }
}

// ============================================================================
// BLOB Encoding
// ============================================================================

/// f32 벡터를 little-endian BLOB으로
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// BLOB을 f32 벡터로 (4바이트 단위, 남는 바이트는 무시)
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
