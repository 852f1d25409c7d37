#[cfg(test)]
#[path = "../tests/unit/synthetic_test.rs"]
mod synthetic_test;

use anyhow::Result;
use log::info;
use rayon::prelude::*;
use std::path::Path;

use crate::model_exporter::{Layer, LayerFileExporter};

/// How synthetic weights are filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// Ones where row index equals column index, zeros elsewhere.
    Identity,
    /// Values drawn uniformly from `[-scale, scale)` with a seeded xorshift generator.
    Uniform { seed: u64, scale: f32 },
}

/// A layer stack generated in memory, used for tests and demos without real checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticModel {
    /// `(rows, cols)` per layer, in the order they run.
    pub shapes: Vec<(u32, u32)>,
    pub init: Init,
}

impl SyntheticModel {
    pub fn new(shapes: Vec<(u32, u32)>, init: Init) -> Self {
        Self { shapes, init }
    }

    /// Builds a chain where each layer consumes the previous layer's output.
    ///
    /// `input_width` is the first layer's column count and `widths` are the output
    /// sizes of successive layers.
    pub fn chain(input_width: u32, widths: &[u32], init: Init) -> Self {
        let shapes = widths
            .iter()
            .scan(input_width, |cols, &rows| {
                let shape = (rows, *cols);
                *cols = rows;
                Some(shape)
            })
            .collect();

        Self { shapes, init }
    }

    pub fn layers(&self) -> Result<Vec<Layer>> {
        if self.shapes.is_empty() {
            anyhow::bail!("Synthetic model needs at least one layer");
        }

        self.shapes
            .par_iter()
            .enumerate()
            .map(|(idx, &(rows, cols))| {
                let (rows, cols) = (rows as usize, cols as usize);
                let data = match self.init {
                    Init::Identity => identity(rows, cols),
                    Init::Uniform { seed, scale } => uniform(rows * cols, layer_seed(seed, idx), scale),
                };
                Layer::new(&format!("synthetic.{idx}"), &[rows, cols], data)
            })
            .collect()
    }
}

/// Writes a synthetic model file and returns the number of layers written.
pub fn synthesize_model(output_path: &Path, model: &SyntheticModel) -> Result<usize> {
    let layers = model.layers()?;
    info!("🧪 Generating {} synthetic layers ({:?})", layers.len(), model.init);

    LayerFileExporter::new().write_model_file(output_path, &layers)?;
    Ok(layers.len())
}

/// Stored the way the forward pass reads layer data, as a `cols × rows` matrix,
/// so input `c` feeds output `c` for every `c < min(rows, cols)`.
fn identity(rows: usize, cols: usize) -> Vec<f32> {
    let mut data = vec![0.0f32; rows * cols];
    (0..rows.min(cols)).for_each(|c| data[c * rows + c] = 1.0);
    data
}

fn uniform(count: usize, seed: u64, scale: f32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..count)
        .map(|_| {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let bits = (state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40) as u32;
            let unit = bits as f32 / (1u32 << 24) as f32;
            (unit * 2.0 - 1.0) * scale
        })
        .collect()
}

fn layer_seed(seed: u64, idx: usize) -> u64 {
    seed.wrapping_add((idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}
