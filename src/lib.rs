//! # coderag: semantic retrieval over a code repository
//!
//! Clones a repository once, splits its source files into overlapping,
//! definition-aware chunks, embeds them with a local ONNX model and keeps
//! them in a per-repository SQLite + sqlite-vec index. Queries return the
//! most similar chunks, with short hits widened by the chunk that follows.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with defaults and validation
//! - **[`repo`]**: repository acquisition (git clone, idempotent) and README access
//! - **[`indexer`]**: file filtering, language detection, Tree-sitter aware chunking
//! - **[`embedder`]**: text embedding via ONNX Runtime, plus a deterministic mock
//! - **[`db`]**: chunk and vector tables, build-once/load-many index store
//! - **[`query`]**: similarity search and successor augmentation
//! - **[`retriever`]**: end-to-end facade used by the CLI
//! - **[`progress`]**: build progress events

pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod progress;
pub mod query;
pub mod repo;
pub mod retriever;
