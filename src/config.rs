/// Configuration module for coderag.
///
/// Handles loading, validating, and providing default configuration values.
/// Every knob of the build and query paths lives here so that the same
/// values reach the chunker, the embedder, and the index store.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file name, used when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "coderag.json";

// ── Default value functions ──────────────────────────────────────────

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_models_dir() -> String {
    "./models".to_string()
}

fn default_search_top_k() -> usize {
    3
}

fn default_augment_min_chars() -> usize {
    150
}

fn default_chunk_lines() -> usize {
    40
}

fn default_chunk_lines_overlap() -> usize {
    15
}

fn default_max_chars() -> usize {
    1500
}

fn default_true() -> bool {
    true
}

fn default_exclude_dirs() -> Vec<String> {
    [
        "__pycache__",
        ".venv",
        ".git",
        ".idea",
        "venv",
        "env",
        "node_modules",
        "dist",
        "build",
        "target",
        ".vscode",
        ".github",
        ".gitlab",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_files() -> Vec<String> {
    [
        "requirements.txt",
        "package.json",
        "package-lock.json",
        "yarn.lock",
        "__init__.py",
        "Dockerfile",
        ".flake8",
        ".gitignore",
        ".pre-commit-config.yaml",
        "pyproject.toml",
        "setup.cfg",
        "setup.py",
        "tox.ini",
        "Jenkinsfile",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_model_name() -> String {
    "krlvi/sentence-msmarco-bert-base-dot-v5-nlpl-code_search_net".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_max_length() -> usize {
    512
}

fn default_onnx_file() -> String {
    "onnx/model.onnx".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_intra_threads() -> usize {
    4
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root for clones and persisted indexes.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Root for downloaded model files.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Results shorter than this (in chars) get their successor appended.
    #[serde(default = "default_augment_min_chars")]
    pub augment_min_chars: usize,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub acquire: AcquireConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    #[serde(default = "default_chunk_lines_overlap")]
    pub chunk_lines_overlap: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    #[serde(default = "default_exclude_files")]
    pub exclude_files: Vec<String>,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AcquireConfig {
    /// Clone with `--depth 1`.
    #[serde(default)]
    pub shallow: bool,
}

/// How token states are reduced to one vector.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Mean,
    Cls,
}

/// Embedding model settings. Injected into the embedder and recorded in
/// every index manifest; build and query must agree on all of it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// HuggingFace repository id, e.g. `org/model`.
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Token limit per input; longer inputs are truncated.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default)]
    pub pooling: Pooling,

    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Path of the ONNX export inside the model repository.
    #[serde(default = "default_onnx_file")]
    pub onnx_file: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            search_top_k: default_search_top_k(),
            augment_min_chars: default_augment_min_chars(),
            chunking: ChunkingConfig::default(),
            filter: FilterConfig::default(),
            acquire: AcquireConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            chunk_lines_overlap: default_chunk_lines_overlap(),
            max_chars: default_max_chars(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            exclude_files: default_exclude_files(),
            respect_gitignore: default_true(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            max_length: default_max_length(),
            pooling: Pooling::default(),
            normalize: default_true(),
            onnx_file: default_onnx_file(),
            batch_size: default_batch_size(),
            intra_threads: default_intra_threads(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_FILE`].
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the binary's cwd.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_FILE
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_FILE {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.chunking.max_chars > 0,
            "chunking.max_chars must be positive"
        );
        anyhow::ensure!(
            self.chunking.chunk_lines > 0,
            "chunking.chunk_lines must be positive"
        );
        anyhow::ensure!(
            self.chunking.chunk_lines_overlap < self.chunking.chunk_lines,
            "chunking.chunk_lines_overlap must be smaller than chunking.chunk_lines"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.batch_size > 0,
            "model.batch_size must be positive"
        );
        anyhow::ensure!(!self.model.name.is_empty(), "model.name must be set");
        Ok(())
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Directory holding the files of the configured model.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.models_dir).join(self.model.short_name())
    }
}

impl ModelConfig {
    /// Last segment of the model id, used in index directory names.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
