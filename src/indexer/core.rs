//! Repository walk and parallel chunk extraction.
//!
//! Files that cannot be read or chunked are recorded in the [`BuildReport`]
//! and skipped; they never abort a build.

use std::path::{Component, Path};
use std::sync::atomic::{AtomicUsize, Ordering};

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::chunker::{Chunker, ChunkerError};
use super::filter::FileFilter;
use super::{Candidate, FileProcessingError, SourceFile};
use crate::config::Config;
use crate::db::models::Chunk;
use crate::progress::{BuildEvent, BuildProgress};

/// Outcome of chunk extraction over one repository.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Eligible files found by the walk.
    pub files_seen: usize,
    /// Files read and chunked without error.
    pub files_indexed: usize,
    pub chunks: usize,
    pub failures: Vec<FileProcessingError>,
}

impl BuildReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Chunks plus the report describing how they were produced.
#[derive(Debug, Default)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
    pub report: BuildReport,
}

pub struct Indexer {
    filter: FileFilter,
    chunker: Chunker,
    respect_gitignore: bool,
}

impl Indexer {
    pub fn new(config: &Config) -> Result<Self, ChunkerError> {
        Ok(Self {
            filter: FileFilter::new(&config.filter),
            chunker: Chunker::new(&config.chunking)?,
            respect_gitignore: config.filter.respect_gitignore,
        })
    }

    /// Eligible files under `root`, sorted by relative path.
    pub fn discover(&self, root: &Path) -> Vec<Candidate> {
        let prune = self.filter.clone();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .parents(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(entry.depth() > 0
                    && is_dir
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| prune.is_excluded_dir(name)))
            })
            .build();

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let Some(language) = self.filter.classify(relative) else {
                continue;
            };
            let Some(relative_str) = to_slash_path(relative) else {
                debug!("Skipping non UTF-8 path {}", relative.display());
                continue;
            };
            candidates.push(Candidate {
                absolute: entry.path().to_path_buf(),
                relative: relative_str,
                language,
            });
        }

        candidates.sort_by(|a, b| a.relative.cmp(&b.relative));
        candidates
    }

    /// Walks, filters and chunks a repository. Per-file failures are logged
    /// and recorded in the report; they never abort the run.
    pub fn collect_chunks(&self, root: &Path, progress: &dyn BuildProgress) -> ChunkSet {
        progress.report(BuildEvent::Scanning);
        let candidates = self.discover(root);
        let total = candidates.len();
        info!("Found {} eligible files in {}", total, root.display());

        let done = AtomicUsize::new(0);
        let results: Vec<Result<Vec<Chunk>, FileProcessingError>> = candidates
            .par_iter()
            .map(|candidate| {
                let result =
                    SourceFile::read(&candidate.absolute, &candidate.relative, candidate.language)
                        .and_then(|file| self.chunker.split(&file));
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.report(BuildEvent::Chunking { done: n, total });
                result
            })
            .collect();

        let mut set = ChunkSet::default();
        set.report.files_seen = total;
        for result in results {
            match result {
                Ok(chunks) => {
                    set.report.files_indexed += 1;
                    set.chunks.extend(chunks);
                }
                Err(e) => {
                    warn!("Skipping file: {}", e);
                    set.report.failures.push(e);
                }
            }
        }
        set.report.chunks = set.chunks.len();

        info!(
            "Total number of chunks: {} from {} files ({} failed)",
            set.report.chunks,
            set.report.files_indexed,
            set.report.failed()
        );
        set
    }
}

fn to_slash_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            parts.push(segment.to_str()?);
        }
    }
    Some(parts.join("/"))
}
