use super::chunks::{CHUNK_COLUMNS, map_chunk_row};
use super::{Db, IndexError, models::ScoredChunk, serialize_vector};
use rusqlite::params;

impl Db {
    /// Exact nearest-neighbour search by cosine distance.
    ///
    /// Results are ordered by descending similarity (`1 - distance`), ties
    /// by ascending chunk id. Returns fewer than `k` hits when the index is
    /// smaller.
    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.check_dimensions(query_vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // A zero vector has no cosine distance; rank it last.
        let query = format!(
            r#"
            SELECT
                {CHUNK_COLUMNS},
                COALESCE(vec_distance_cosine(v.embedding, ?), 2.0) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC, c.chunk_id ASC
            LIMIT ?
            "#
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), k as i64],
            |row| {
                let chunk = map_chunk_row(row)?;
                let distance: f64 = row.get(8)?;
                Ok(ScoredChunk {
                    chunk,
                    score: 1.0 - distance,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
