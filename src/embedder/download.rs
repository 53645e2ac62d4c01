/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of the configured model if they are
/// not already present locally. Files land under their local names
/// (`model.onnx`, `tokenizer.json`) regardless of their path in the repo.
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::ModelConfig;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co";

/// Local file names required by the embedder.
const LOCAL_FILES: &[&str] = &["model.onnx", "tokenizer.json"];

/// `(local name, URL)` pairs for the configured model.
fn model_files(model: &ModelConfig) -> Vec<(&'static str, String)> {
    vec![
        (
            "model.onnx",
            format!("{HF_BASE}/{}/resolve/main/{}", model.name, model.onnx_file),
        ),
        (
            "tokenizer.json",
            format!("{HF_BASE}/{}/resolve/main/tokenizer.json", model.name),
        ),
    ]
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    LOCAL_FILES.iter().all(|name| model_dir.join(name).exists())
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if it doesn't exist.
/// Skips individual files that are already present.
pub fn download_model_files(model_dir: &Path, model: &ModelConfig) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    info!("Downloading {} from HuggingFace (one-time)", model.name);

    for (filename, url) in model_files(model) {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        info!("Downloading {filename}...");
        download_file(&dest, &url)
            .with_context(|| format!("failed to download {filename}"))
            .map_err(|e| {
                if e.downcast_ref::<NotFound>().is_some() {
                    e.context(manual_install_hint(filename, model, model_dir))
                } else {
                    e
                }
            })?;
    }

    info!("Model download complete");
    Ok(())
}

/// The hub has no file at the requested path.
#[derive(Debug, thiserror::Error)]
#[error("not found: {0}")]
struct NotFound(String);

/// Instructions for a model repository that publishes no ONNX export.
fn manual_install_hint(filename: &str, model: &ModelConfig, model_dir: &Path) -> String {
    if filename == "model.onnx" {
        format!(
            "{} has no ONNX export at `{}`. Export one with \
             `optimum-cli export onnx --model {} <dir>` and copy model.onnx and \
             tokenizer.json into {}, or set model.onnx_file to an existing export",
            model.name,
            model.onnx_file,
            model.name,
            model_dir.display()
        )
    } else {
        format!(
            "{} has no {filename}. Copy it into {} by hand",
            model.name,
            model_dir.display()
        )
    }
}

/// Download a single file with a progress bar.
///
/// Writes to a `.part` file first so an interrupted download is retried
/// on the next start instead of being mistaken for a complete one.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(NotFound(url.to_string()).into());
    }
    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                .expect("valid template")
                .progress_chars("█▓░"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let part = dest.with_extension("part");
    let mut file = fs::File::create(&part)
        .with_context(|| format!("failed to create file: {}", part.display()))?;

    let bytes = resp.bytes().context("failed to read response body")?;
    file.write_all(&bytes).context("failed to write file")?;
    file.sync_all().context("failed to flush file")?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();

    fs::rename(&part, dest)
        .with_context(|| format!("failed to move download into place: {}", dest.display()))?;

    Ok(())
}
