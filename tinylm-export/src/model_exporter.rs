#[cfg(test)]
#[path = "../tests/unit/model_exporter_test.rs"]
mod model_exporter_test;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use log::{info, warn};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::manifest::load_manifest;
use crate::tensor_reader::TensorReader;
use crate::utils::ProgressTracker;

/// One weight matrix ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f32>,
}

impl Layer {
    /// Builds a layer from a rank-2 tensor.
    pub fn new(name: &str, shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let &[rows, cols] = shape else {
            anyhow::bail!("Tensor {name} has rank {}, expected 2", shape.len());
        };

        if rows == 0 || cols == 0 {
            anyhow::bail!("Tensor {name} has an empty dimension: {shape:?}");
        }

        if rows * cols != data.len() {
            anyhow::bail!("Tensor {name} has {} values for shape {shape:?}", data.len());
        }

        let rows = u32::try_from(rows).with_context(|| format!("Tensor {name}: {rows} rows do not fit in u32"))?;
        let cols = u32::try_from(cols).with_context(|| format!("Tensor {name}: {cols} cols do not fit in u32"))?;

        Ok(Self { name: name.to_string(), rows, cols, data })
    }

    /// Reorders the data to `cols × rows` while keeping the `[rows, cols]` header.
    pub fn transposed(self) -> Self {
        let (rows, cols) = (self.rows as usize, self.cols as usize);
        let mut data = vec![0.0f32; self.data.len()];

        data.par_chunks_mut(rows).enumerate().for_each(|(col, out_row)| {
            out_row.iter_mut().enumerate().for_each(|(row, out_val)| *out_val = self.data[row * cols + col]);
        });

        Self { data, ..self }
    }
}

/// Writes layer-stack model files.
#[derive(Debug, Default)]
pub struct LayerFileExporter;

impl LayerFileExporter {
    pub fn new() -> Self {
        Self
    }

    /// Writes the layer count followed by each layer's header and weights.
    pub fn write_layers<W: Write>(&self, writer: &mut W, layers: &[Layer]) -> Result<()> {
        self.write_count(writer, layers.len())?;
        layers.iter().try_for_each(|layer| self.write_layer(writer, layer))
    }

    pub fn write_model_file(&self, output_path: &Path, layers: &[Layer]) -> Result<()> {
        let file =
            File::create(output_path).with_context(|| format!("Failed to create {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);

        self.write_layers(&mut writer, layers)?;

        writer.flush()?;
        info!("💾 Written model to {}", output_path.display());
        Ok(())
    }

    /// Exports rank-2 tensors from SafeTensors data at `model_path`.
    ///
    /// Layers come from `layers.json` when present, otherwise every rank-2 F32/BF16
    /// tensor is exported in name order. Returns the number of layers written.
    pub fn export_binary_model(&self, model_path: &Path, output_path: &Path) -> Result<usize> {
        let tensor_reader = TensorReader::new(model_path)?;
        let manifest = load_manifest(model_path)?;

        let (names, transpose) = match manifest {
            Some(manifest) => (manifest.layers, manifest.transpose),
            None => {
                let names = tensor_reader
                    .list_tensors()?
                    .into_iter()
                    .filter(|info| info.shape.len() == 2 && matches!(info.dtype.as_str(), "F32" | "BF16"))
                    .map(|info| info.name)
                    .collect::<Vec<_>>();
                (names, false)
            }
        };

        if names.is_empty() {
            anyhow::bail!("No rank-2 F32/BF16 tensors found in {}", model_path.display());
        }

        let file =
            File::create(output_path).with_context(|| format!("Failed to create {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_count(&mut writer, names.len())?;

        let progress = ProgressTracker::new(names.len(), "Exporting");

        for (i, name) in names.iter().enumerate() {
            progress.set_current(i + 1, Some(name));

            let tensor = tensor_reader.load_tensor(name)?.with_context(|| format!("Missing weight tensor: {name}"))?;
            let layer = Layer::new(name, &tensor.shape, tensor.data)?;
            let layer = if transpose { layer.transposed() } else { layer };

            self.write_layer(&mut writer, &layer)?;
        }

        writer.flush()?;
        check_chain(&tensor_reader, &names, transpose);
        info!("💾 Written {} layers to {}", names.len(), output_path.display());

        Ok(names.len())
    }

    fn write_count<W: Write>(&self, writer: &mut W, count: usize) -> Result<()> {
        let count = u32::try_from(count).context("Layer count does not fit in u32")?;
        writer.write_u32::<LittleEndian>(count)?;
        Ok(())
    }

    fn write_layer<W: Write>(&self, writer: &mut W, layer: &Layer) -> Result<()> {
        writer.write_u32::<LittleEndian>(layer.rows)?;
        writer.write_u32::<LittleEndian>(layer.cols)?;
        layer.data.iter().try_for_each(|&value| writer.write_f32::<LittleEndian>(value))?;
        Ok(())
    }
}

/// Warns when a layer's input width does not match the previous layer's output.
fn check_chain(tensor_reader: &TensorReader, names: &[String], transpose: bool) {
    let Ok(infos) = tensor_reader.list_tensors() else {
        return;
    };

    let shapes = names
        .iter()
        .filter_map(|name| infos.iter().find(|info| &info.name == name).map(|info| info.shape.clone()))
        .collect::<Vec<_>>();

    for (idx, pair) in shapes.windows(2).enumerate() {
        let (produced, expected) = (pair[0][0], pair[1][1]);
        if produced != expected {
            warn!(
                "Layer {} expects width {expected} but layer {idx} produces {produced} values (transpose: {transpose})",
                idx + 1
            );
        }
    }
}
