//! # tinylm-export
//!
//! Produces layer-stack model files for `tinylm-inference`, either from SafeTensors
//! checkpoints or from synthetic weights.
//!
//! The file layout is little-endian: a `u32` layer count, then per layer a `u32` width,
//! a `u32` height and `width * height` `f32` weights.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tinylm_export::{Init, SyntheticModel, export_model, synthesize_model};
//!
//! # fn main() -> anyhow::Result<()> {
//! // Export the rank-2 tensors of a checkpoint directory
//! export_model("path/to/checkpoint", "model.bin")?;
//!
//! // Or generate a small model from scratch
//! let model = SyntheticModel::chain(8, &[16, 256], Init::Uniform { seed: 42, scale: 0.5 });
//! synthesize_model("synthetic.bin", &model)?;
//! # Ok(())
//! # }
//! ```

pub mod manifest;
pub mod model_exporter;
pub mod synthetic;
pub mod tensor_reader;
mod utils;

pub use manifest::{LayerManifest, MANIFEST_FILE, load_manifest};
pub use model_exporter::{Layer, LayerFileExporter};
pub use synthetic::{Init, SyntheticModel};
pub use tensor_reader::{LoadedTensor, TensorInfo};

use anyhow::Result;
use log::info;
use std::path::Path;
use tensor_reader::TensorReader;

/// Exports SafeTensors weights at `model_path` (a file or a directory) into a model file.
///
/// Returns the number of layers written.
pub fn export_model(model_path: &str, output_path: &str) -> Result<usize> {
    info!("🚀 Starting model export...");

    let count = LayerFileExporter::new().export_binary_model(Path::new(model_path), Path::new(output_path))?;

    info!("✅ Export finished: {count} layers");
    Ok(count)
}

/// Writes a synthetic model file. Returns the number of layers written.
pub fn synthesize_model(output_path: &str, model: &SyntheticModel) -> Result<usize> {
    synthetic::synthesize_model(Path::new(output_path), model)
}

/// Lists the tensors stored at `model_path`, sorted by name.
pub fn list_tensors(model_path: &str) -> Result<Vec<TensorInfo>> {
    TensorReader::new(Path::new(model_path))?.list_tensors()
}
