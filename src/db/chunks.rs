//! Chunk rows and their vectors: insert, lookup, and consistency checks.

use super::{Db, IndexError, models::*, serialize_vector};
use rusqlite::{OptionalExtension, Row, params};

pub(crate) const CHUNK_COLUMNS: &str =
    "c.chunk_id, c.file_path, c.language, c.ordinal, c.next_chunk_id, c.start_line, c.end_line, c.content";

/// Map the leading [`CHUNK_COLUMNS`] of a row to a [`Chunk`].
pub(crate) fn map_chunk_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: ChunkId::from(row.get::<_, String>(0)?),
        file_path: row.get(1)?,
        language: row.get(2)?,
        ordinal: row.get::<_, i64>(3)? as usize,
        next_id: row.get::<_, Option<String>>(4)?.map(ChunkId::from),
        start_line: row.get::<_, i64>(5)? as usize,
        end_line: row.get::<_, i64>(6)? as usize,
        text: row.get(7)?,
    })
}

impl Db {
    /// Inserts chunks and their embeddings in one transaction.
    /// Each vector row shares its rowid with the chunk row.
    pub fn insert_chunks(
        &mut self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Corrupted(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        for embedding in embeddings {
            self.check_dimensions(embedding)?;
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert_chunk = tx.prepare(
                r#"
                INSERT INTO chunks
                    (chunk_id, file_path, language, ordinal, next_chunk_id, start_line, end_line, content)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            let mut insert_vector =
                tx.prepare("INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)")?;

            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                insert_chunk.execute(params![
                    chunk.id.as_str(),
                    chunk.file_path,
                    chunk.language,
                    chunk.ordinal as i64,
                    chunk.next_id.as_ref().map(ChunkId::as_str),
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.text,
                ])?;
                let rowid = tx.last_insert_rowid();
                insert_vector.execute(params![rowid, serialize_vector(embedding)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Exact lookup by chunk id.
    pub fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>, IndexError> {
        let chunk = self
            .conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.chunk_id = ?"),
                params![id.as_str()],
                map_chunk_row,
            )
            .optional()?;
        Ok(chunk)
    }

    pub fn chunk_count(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn vector_count(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM vec_chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Verifies that the chunk table and the vector table belong together
    /// and hold `expected` rows each.
    pub fn check_consistency(&self, expected: usize) -> Result<(), IndexError> {
        let chunks = self.chunk_count()?;
        let vectors = self.vector_count()?;
        if chunks != vectors {
            return Err(IndexError::Corrupted(format!(
                "{chunks} chunks but {vectors} vectors"
            )));
        }
        if chunks != expected {
            return Err(IndexError::Corrupted(format!(
                "manifest records {expected} chunks, found {chunks}"
            )));
        }

        let without_vector: i64 = self.conn.query_row(
            "SELECT count(*) FROM chunks c WHERE c.id NOT IN (SELECT rowid FROM vec_chunks)",
            [],
            |row| row.get(0),
        )?;
        if without_vector > 0 {
            return Err(IndexError::Corrupted(format!(
                "{without_vector} chunks have no vector"
            )));
        }

        let dangling: i64 = self.conn.query_row(
            r#"
            SELECT count(*) FROM chunks c
            WHERE c.next_chunk_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM chunks n WHERE n.chunk_id = c.next_chunk_id)
            "#,
            [],
            |row| row.get(0),
        )?;
        if dangling > 0 {
            return Err(IndexError::Corrupted(format!(
                "{dangling} chunks link to a missing successor"
            )));
        }

        Ok(())
    }
}
