//! Build-path front half: file discovery, filtering, and chunking.
pub mod chunker;
pub mod core;
pub mod filter;
pub mod languages;

use std::path::{Path, PathBuf};

use thiserror::Error;

use languages::Language;

/// A single file failed to turn into chunks. The build logs it, counts it,
/// and moves on.
#[derive(Error, Debug)]
pub enum FileProcessingError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("failed to chunk {path}: {reason}")]
    Chunk { path: String, reason: String },
}

impl FileProcessingError {
    pub fn path(&self) -> &str {
        match self {
            Self::Read { path, .. } | Self::NotUtf8 { path } | Self::Chunk { path, .. } => path,
        }
    }
}

/// An eligible file, read once during chunk extraction.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub language: Language,
    pub content: String,
}

impl SourceFile {
    pub fn read(
        absolute: &Path,
        relative: &str,
        language: Language,
    ) -> Result<Self, FileProcessingError> {
        let bytes = std::fs::read(absolute).map_err(|source| FileProcessingError::Read {
            path: relative.to_string(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|_| FileProcessingError::NotUtf8 {
            path: relative.to_string(),
        })?;
        Ok(Self {
            path: relative.to_string(),
            language,
            content,
        })
    }
}

/// A file the walker found eligible, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub absolute: PathBuf,
    pub relative: String,
    pub language: Language,
}
