#[cfg(test)]
#[path = "../tests/unit/manifest_test.rs"]
mod manifest_test;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Read, path::Path};

/// File name looked up next to the SafeTensors input.
pub const MANIFEST_FILE: &str = "layers.json";

/// Selects and orders the tensors written to the model file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    /// Tensor names, in the order the layers run.
    pub layers: Vec<String>,
    /// Store each weight as its transpose so that `[out, in]` projection matrices
    /// map an `in`-wide activation to `out` values.
    #[serde(default)]
    pub transpose: bool,
}

/// Loads `layers.json` from the model directory (or from the directory containing
/// a single model file). Returns `None` when there is no manifest.
pub fn load_manifest(model_path: &Path) -> Result<Option<LayerManifest>> {
    let dir = if model_path.is_dir() { model_path } else { model_path.parent().unwrap_or(Path::new(".")) };
    let manifest_path = dir.join(MANIFEST_FILE);

    if !manifest_path.exists() {
        return Ok(None);
    }

    let mut contents = String::new();
    File::open(&manifest_path)
        .with_context(|| format!("Failed to open {}", manifest_path.display()))?
        .read_to_string(&mut contents)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

    let manifest = parse_manifest(&contents).with_context(|| format!("Invalid {}", manifest_path.display()))?;

    info!("Using layer manifest with {} layers (transpose: {})", manifest.layers.len(), manifest.transpose);
    Ok(Some(manifest))
}

pub fn parse_manifest(contents: &str) -> Result<LayerManifest> {
    let manifest: LayerManifest = serde_json::from_str(contents).context("Failed to parse layer manifest JSON")?;

    if manifest.layers.is_empty() {
        anyhow::bail!("Layer manifest lists no layers");
    }

    if let Some(name) = manifest.layers.iter().find(|name| name.trim().is_empty()) {
        anyhow::bail!("Layer manifest contains an empty tensor name: {name:?}");
    }

    Ok(manifest)
}
