//! Query path: embed the question, rank chunks, widen short hits.
pub mod augment;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::db::IndexError;
use crate::db::models::Chunk;
use crate::db::store::Index;
use crate::embedder::{Embedder, EmbedderError};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// A ranked chunk. `score` is cosine similarity, higher is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Pure vector-similarity retrieval over one index.
pub struct QueryEngine {
    index: Arc<Index>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl QueryEngine {
    /// `embedder` must be the one the index was built with.
    pub fn new(index: Arc<Index>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Top-`top_k` chunks for `text`, most similar first.
    pub fn query(&self, text: &str) -> Result<Vec<RetrievedChunk>, QueryError> {
        self.query_k(text, self.top_k)
    }

    pub fn query_k(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let vector = self.embedder.embed(text)?;
        let hits = self.index.nearest(&vector, k)?;
        debug!("Query matched {} of {} requested chunks", hits.len(), k);

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect())
    }
}
