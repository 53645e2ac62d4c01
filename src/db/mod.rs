//! Index storage using SQLite and sqlite-vec
use rusqlite::{Connection, OpenFlags};
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedder::EmbedderError;

pub mod chunks;
pub mod models;
pub mod search;
pub mod store;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id TEXT NOT NULL UNIQUE,
    file_path TEXT NOT NULL,
    language TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    next_chunk_id TEXT,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path, ordinal);
"#;

/// Errors from building, loading or reading an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no index at {0}")]
    Missing(PathBuf),

    #[error("index is corrupted: {0}")]
    Corrupted(String),

    #[error("index was built with model {found}, embedder is {expected}")]
    ModelMismatch { expected: String, found: String },

    #[error("vector dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),
}

impl IndexError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection holding one repository's chunk table and its
/// `vec0` vector table, which share rowids.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Create a fresh database at `path` with a vector table of `dimensions`.
    pub fn create<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self, IndexError> {
        let path = path.as_ref();
        info!("Creating index database: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an existing database. Never creates one.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        debug!("Opening index database: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        let has_vectors: bool = conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE name = 'vec_chunks'",
            [],
            |row| row.get(0),
        )?;
        if !has_vectors {
            return Err(IndexError::Corrupted("vector table is missing".to_string()));
        }

        Ok(Self { conn, dimensions })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self, IndexError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self, IndexError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        Ok(Self { conn, dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                found: vector.len(),
            });
        }
        Ok(())
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory(8).expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('chunks', 'vec_chunks');",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(tables, 2);
        assert_eq!(db.dimensions(), 8);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Db::open(dir.path().join("index.db"), 8);
        assert!(matches!(result, Err(IndexError::Missing(_))));
        assert!(!dir.path().join("index.db").exists());
    }

    #[test]
    fn test_open_without_vector_table_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(SCHEMA_SQL)
            .unwrap();

        let result = Db::open(&path, 8);
        assert!(matches!(result, Err(IndexError::Corrupted(_))));
    }

    #[test]
    fn test_check_dimensions() {
        let db = Db::open_in_memory(4).unwrap();
        assert!(db.check_dimensions(&[0.0; 4]).is_ok());
        assert!(matches!(
            db.check_dimensions(&[0.0; 3]),
            Err(IndexError::DimensionMismatch {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        // 2.0f32 in hex: 0x40000000 -> little endian: 00 00 00 40
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        // -3.5f32 in hex: 0xc0600000 -> little endian: 00 00 60 c0
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
