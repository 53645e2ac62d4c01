//! Facade over the whole pipeline: acquire, index once, then answer
//! queries against the same repository.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::IndexError;
use crate::db::store::{Index, IndexKey, IndexStore};
use crate::embedder::Embedder;
use crate::indexer::chunker::ChunkerError;
use crate::indexer::core::{BuildReport, Indexer};
use crate::progress::BuildProgress;
use crate::query::augment::Augmenter;
use crate::query::{QueryEngine, QueryError, RetrievedChunk};
use crate::repo::{AcquisitionError, Fetcher, LocalRepo, RepoAcquirer, read_repo_readme};

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// One retrieved passage, ready for display or for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalHit {
    pub text: String,
    pub source_file_path: String,
}

pub struct Retriever<F: Fetcher> {
    config: Config,
    embedder: Arc<dyn Embedder>,
    acquirer: RepoAcquirer<F>,
    store: IndexStore,
    indexer: Indexer,
}

impl<F: Fetcher> Retriever<F> {
    /// `embedder` serves both the build and the query path.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        fetcher: F,
    ) -> Result<Self, RetrieverError> {
        let data_dir = config.data_path();
        Ok(Self {
            acquirer: RepoAcquirer::new(&data_dir, fetcher),
            store: IndexStore::new(&data_dir),
            indexer: Indexer::new(&config)?,
            embedder,
            config,
        })
    }

    /// Acquires `locator` and returns a queryable repository, building its
    /// index on first use and loading it afterwards.
    pub fn build_index(
        &self,
        locator: &str,
        progress: &dyn BuildProgress,
    ) -> Result<IndexedRepo, RetrieverError> {
        let (name, _) = self.acquirer.local_root(locator)?;
        let key = IndexKey::new(name, self.embedder.model_id());

        let lock = self.store.build_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let repo = self.acquirer.acquire(locator)?;

        let (index, report) = if self.store.exists(&key) {
            info!("Loading existing index for {}", repo.name);
            (self.store.load(&key, self.embedder.as_ref())?, None)
        } else {
            info!("Building index for {}", repo.name);
            let set = self.indexer.collect_chunks(&repo.root, progress);
            if set.chunks.is_empty() {
                warn!("No indexable source files in {}", repo.root.display());
            }
            let index = self.store.build(
                &key,
                &set.chunks,
                self.embedder.as_ref(),
                self.config.model.batch_size,
                progress,
            )?;
            info!(
                "Indexed {} chunks from {} files",
                set.report.chunks, set.report.files_indexed
            );
            (index, Some(set.report))
        };

        let index = Arc::new(index);
        Ok(IndexedRepo {
            engine: QueryEngine::new(
                Arc::clone(&index),
                Arc::clone(&self.embedder),
                self.config.search_top_k,
            ),
            augmenter: Augmenter::new(Arc::clone(&index), self.config.augment_min_chars),
            index,
            repo,
            report,
        })
    }
}

/// A repository with an open index. Safe to query from many threads.
pub struct IndexedRepo {
    repo: LocalRepo,
    index: Arc<Index>,
    engine: QueryEngine,
    augmenter: Augmenter,
    report: Option<BuildReport>,
}

impl IndexedRepo {
    pub fn local_root(&self) -> &Path {
        &self.repo.root
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Build summary; `None` when the index was loaded from disk.
    pub fn report(&self) -> Option<&BuildReport> {
        self.report.as_ref()
    }

    /// Ranked chunks, before augmentation.
    pub fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>, QueryError> {
        self.engine.query(query)
    }

    /// Top `search_top_k` passages for `query`, short ones widened.
    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievalHit>, QueryError> {
        self.retrieve_k(query, self.engine.top_k())
    }

    pub fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>, QueryError> {
        let hits = self.engine.query_k(query, k)?;
        Ok(self
            .augmenter
            .augment(hits)
            .into_iter()
            .map(|hit| RetrievalHit {
                text: hit.chunk.text,
                source_file_path: hit.chunk.file_path,
            })
            .collect())
    }

    pub fn readme(&self) -> Option<String> {
        read_repo_readme(&self.repo.root)
    }
}
