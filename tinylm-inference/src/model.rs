//! Reader for the layer-stack model file.
//!
//! Layout, all little-endian:
//!
//! ```text
//! u32                  layer count
//! repeated per layer:
//!   u32                width  (rows)
//!   u32                height (cols)
//!   f32[width*height]  weights, row-major
//! ```

use crate::tensor::Tensor;
use crate::utils::MemoryMapper;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs::File;
use std::path::Path;

/// Reads every layer of the model file at `path`, in file order.
pub fn read_weights(path: &Path) -> Result<Vec<Tensor>> {
    let file = File::open(path).with_context(|| format!("Failed to open model file: {}", path.display()))?;
    let mut mapper = MemoryMapper::new(file)?;

    let layer_count = mapper.read_u32().context("Failed to read layer count")?;
    debug!("Model file declares {layer_count} layers");

    let weights = (0..layer_count)
        .map(|idx| read_layer(&mut mapper).with_context(|| format!("Failed to read layer {idx}")))
        .collect::<Result<Vec<_>>>()?;

    if mapper.remaining() > 0 {
        warn!("Ignoring {} trailing bytes after the last layer", mapper.remaining());
    }

    Ok(weights)
}

fn read_layer(mapper: &mut MemoryMapper) -> Result<Tensor> {
    let width = mapper.read_u32().context("Failed to read width")? as usize;
    let height = mapper.read_u32().context("Failed to read height")? as usize;

    let count = width.checked_mul(height).with_context(|| format!("Layer shape [{width}, {height}] is too large"))?;
    let data = mapper.read_f32_vec(count).context("Failed to read weights")?;

    debug!("Read layer with shape [{width}, {height}]");

    Ok(Tensor::new(data, vec![width, height])?)
}
