//! Persisted model artifact
//!
//! The active model is kept in a single JSON file. Writes go to a temp file
//! that is synced and renamed over the target, so readers never see a
//! truncated artifact.

use super::trainer::AnomalyModel;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Descriptor of a model file on disk
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub version: String,
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: usize,
}

/// Serialize `model` to `path` atomically
pub fn save_model(model: &AnomalyModel, path: &Path) -> Result<ModelArtifact> {
    let bytes = serde_json::to_vec(model).context("Failed to serialize model")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create model directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp model file {:?}", temp_path))?;
    file.write_all(&bytes).context("Failed to write model")?;
    file.sync_all().context("Failed to sync model file")?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    let artifact = ModelArtifact {
        version: model.version.clone(),
        path: path.to_path_buf(),
        checksum: compute_checksum(&bytes),
        size_bytes: bytes.len(),
    };

    info!(
        version = %artifact.version,
        path = %artifact.path.display(),
        size = artifact.size_bytes,
        checksum = %artifact.checksum,
        "Model artifact written"
    );

    Ok(artifact)
}

/// Load a model previously written by [`save_model`]
pub fn load_model(path: &Path) -> Result<AnomalyModel> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read model file {:?}", path))?;
    let model: AnomalyModel = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse model file {:?}", path))?;

    if !model.is_compatible() {
        anyhow::bail!(
            "Model {} uses feature layout {:?} (schema {}), incompatible with this build",
            model.version,
            model.feature_names,
            model.schema
        );
    }

    info!(
        version = %model.version,
        path = %path.display(),
        checksum = %compute_checksum(&bytes),
        "Loaded model artifact"
    );

    Ok(model)
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
