/// Model file auto-download from HuggingFace.
///
/// Downloads the required ONNX model and tokenizer files if they don't
/// already exist locally.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Base URL for HuggingFace model repositories.
const HF_BASE: &str = "https://huggingface.co";

/// Files required for the embedder, with their paths inside the model repo.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Return the default local directory for a HuggingFace model id,
/// e.g. `models/nomic-embed-text-v1` for `nomic-ai/nomic-embed-text-v1`.
#[must_use]
pub fn default_model_dir(model_name: &str) -> PathBuf {
    let short = model_name.rsplit('/').next().unwrap_or(model_name);
    PathBuf::from("models").join(short)
}

/// Build the download URL of `path` inside the model repository.
#[must_use]
pub fn file_url(model_name: &str, path: &str) -> String {
    format!("{HF_BASE}/{model_name}/resolve/main/{path}")
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if it doesn't exist.
/// Skips individual files that are already present.
pub fn download_model_files(model_name: &str, model_dir: &Path) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    info!("Downloading {model_name} from HuggingFace (one-time download)");

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        let url = file_url(model_name, url_path);
        info!("Downloading {filename}...");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Download a single file with a progress bar.
///
/// The body is written to a `.part` file first so an interrupted download is
/// never mistaken for a complete one.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

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

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let bytes = resp.bytes().context("failed to read response body")?;
    file.write_all(&bytes).context("failed to write file")?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download into place: {}", dest.display()))?;

    Ok(())
}
