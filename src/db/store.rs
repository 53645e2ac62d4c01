//! On-disk index lifecycle: build once, load many times.
//!
//! Layout under the data directory:
//!
//! ```text
//! {repo}_{model}/index.db        chunk table + vector table
//! {repo}_{model}/manifest.json   completion marker, written last
//! ```
//!
//! Builds happen in `{repo}_{model}.partial/` and are renamed into place
//! once the manifest is written, so an interrupted build leaves no index.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{Chunk, ChunkId, ScoredChunk};
use super::{Db, IndexError};
use crate::embedder::Embedder;
use crate::progress::{BuildEvent, BuildProgress};

pub const DB_FILE: &str = "index.db";
pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

static BUILD_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Identifies one index: a repository embedded with one model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub repo_name: String,
    pub model_id: String,
}

impl IndexKey {
    pub fn new(repo_name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            model_id: model_id.into(),
        }
    }

    /// `{repo}_{model-short-name}`
    pub fn dir_name(&self) -> String {
        let short = self
            .model_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.model_id);
        let short: String = short
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", self.repo_name, short)
    }
}

/// Completion record of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub repo: String,
    pub model: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
    pub crate_version: String,
}

/// An opened index. Shared read-only behind `Arc`; queries serialize on
/// the connection mutex.
pub struct Index {
    db: Mutex<Db>,
    manifest: IndexManifest,
}

impl Index {
    fn db(&self) -> MutexGuard<'_, Db> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>, IndexError> {
        self.db().get_chunk(id)
    }

    pub fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.db().nearest(vector, k)
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.manifest.chunk_count
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.chunk_count == 0
    }
}

/// Builds and loads indexes under a data directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    data_dir: PathBuf,
}

impl IndexStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn index_dir(&self, key: &IndexKey) -> PathBuf {
        self.data_dir.join(key.dir_name())
    }

    fn partial_dir(&self, key: &IndexKey) -> PathBuf {
        self.data_dir.join(format!("{}.partial", key.dir_name()))
    }

    /// True only for a completed build.
    pub fn exists(&self, key: &IndexKey) -> bool {
        let dir = self.index_dir(key);
        dir.is_dir() && dir.join(MANIFEST_FILE).is_file()
    }

    /// Process-wide lock for building `key`. Hold it across
    /// `exists`-check, build and load.
    pub fn build_lock(&self, key: &IndexKey) -> Arc<Mutex<()>> {
        let mut locks = BUILD_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(self.index_dir(key)).or_default().clone()
    }

    /// Embeds `chunks` in batches of `batch_size`, persists them with their
    /// vectors and returns the opened index.
    pub fn build(
        &self,
        key: &IndexKey,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        batch_size: usize,
        progress: &dyn BuildProgress,
    ) -> Result<Index, IndexError> {
        let partial = self.partial_dir(key);
        if partial.exists() {
            warn!("Removing stale partial build at {}", partial.display());
            fs::remove_dir_all(&partial).map_err(|e| IndexError::io(&partial, e))?;
        }
        fs::create_dir_all(&partial).map_err(|e| IndexError::io(&partial, e))?;

        if let Err(e) = self.write_partial(key, &partial, chunks, embedder, batch_size, progress) {
            let _ = fs::remove_dir_all(&partial);
            return Err(e);
        }

        let dir = self.index_dir(key);
        if dir.exists() {
            // Left over from an older or broken build.
            fs::remove_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
        }
        fs::rename(&partial, &dir).map_err(|e| IndexError::io(&dir, e))?;
        info!("Index written to {}", dir.display());

        self.load(key, embedder)
    }

    fn write_partial(
        &self,
        key: &IndexKey,
        partial: &Path,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        batch_size: usize,
        progress: &dyn BuildProgress,
    ) -> Result<(), IndexError> {
        let dimensions = embedder.dimensions();
        let total = chunks.len();
        let mut embeddings = Vec::with_capacity(total);

        progress.report(BuildEvent::Embedding { done: 0, total });
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Corrupted(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
            progress.report(BuildEvent::Embedding {
                done: embeddings.len(),
                total,
            });
        }

        progress.report(BuildEvent::Persisting);
        let mut db = Db::create(partial.join(DB_FILE), dimensions)?;
        db.insert_chunks(chunks, &embeddings)?;
        drop(db);

        let mut files: Vec<&str> = chunks.iter().map(|c| c.file_path.as_str()).collect();
        files.dedup();

        let manifest = IndexManifest {
            version: MANIFEST_VERSION,
            repo: key.repo_name.clone(),
            model: key.model_id.clone(),
            dimensions,
            chunk_count: total,
            file_count: files.len(),
            created_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let manifest_path = partial.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest).map_err(|source| {
            IndexError::Manifest {
                path: manifest_path.clone(),
                source,
            }
        })?;
        fs::write(&manifest_path, json).map_err(|e| IndexError::io(&manifest_path, e))?;

        Ok(())
    }

    /// Opens a completed index without re-embedding anything.
    pub fn load(&self, key: &IndexKey, embedder: &dyn Embedder) -> Result<Index, IndexError> {
        let dir = self.index_dir(key);
        if !self.exists(key) {
            return Err(IndexError::Missing(dir));
        }

        let manifest = read_manifest(&dir.join(MANIFEST_FILE))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(IndexError::Corrupted(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        if manifest.model != embedder.model_id() {
            return Err(IndexError::ModelMismatch {
                expected: embedder.model_id().to_string(),
                found: manifest.model,
            });
        }
        if manifest.dimensions != embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: embedder.dimensions(),
                found: manifest.dimensions,
            });
        }

        let db = Db::open(dir.join(DB_FILE), manifest.dimensions)?;
        db.check_consistency(manifest.chunk_count)?;
        debug!(
            "Loaded index {} ({} chunks)",
            dir.display(),
            manifest.chunk_count
        );

        Ok(Index {
            db: Mutex::new(db),
            manifest,
        })
    }
}

fn read_manifest(path: &Path) -> Result<IndexManifest, IndexError> {
    let content = fs::read_to_string(path).map_err(|e| IndexError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| IndexError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}
