use anyhow::{Context, Result};
use log::info;
use memmap2::Mmap;
use safetensors::SafeTensors;
use std::{
    fs::File,
    mem,
    path::{Path, PathBuf},
};

/// Tensor loaded from a SafeTensors file and converted to f32.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Summary of a tensor as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// Reads tensors from one SafeTensors file or every `*.safetensors` file in a directory.
#[derive(Debug)]
pub(crate) struct TensorReader {
    files: Vec<(PathBuf, Mmap)>,
}

impl TensorReader {
    pub fn new(model_path: &Path) -> Result<Self> {
        let paths = if model_path.is_dir() {
            let mut paths = std::fs::read_dir(model_path)
                .with_context(|| format!("Failed to read directory: {}", model_path.display()))?
                .filter_map(|entry| {
                    let path = entry.ok()?.path();
                    matches!(path.extension(), Some(ext) if ext == "safetensors").then_some(path)
                })
                .collect::<Vec<_>>();
            paths.sort();
            paths
        } else {
            vec![model_path.to_path_buf()]
        };

        if paths.is_empty() {
            anyhow::bail!("No SafeTensors files found in {}", model_path.display());
        }

        info!("Found {} safetensor files", paths.len());

        let files = paths
            .into_iter()
            .map(|path| {
                let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
                // SAFETY: the mapping is read-only; the source file must not be modified during export.
                let mmap = unsafe { Mmap::map(&file) }
                    .with_context(|| format!("Failed to memory map {}", path.display()))?;
                Ok((path, mmap))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { files })
    }

    /// Lists every tensor in every file, sorted by name.
    pub fn list_tensors(&self) -> Result<Vec<TensorInfo>> {
        let mut infos = Vec::new();

        for (path, mmap) in &self.files {
            let safetensors = SafeTensors::deserialize(mmap)
                .with_context(|| format!("Failed to deserialize {}", path.display()))?;

            for (name, view) in safetensors.tensors() {
                infos.push(TensorInfo { name, shape: view.shape().to_vec(), dtype: format!("{:?}", view.dtype()) });
            }
        }

        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    /// Loads a tensor by name, converting BF16/F32 to F32.
    pub fn load_tensor(&self, tensor_name: &str) -> Result<Option<LoadedTensor>> {
        for (path, mmap) in &self.files {
            let safetensors = SafeTensors::deserialize(mmap)
                .with_context(|| format!("Failed to deserialize {}", path.display()))?;

            if let Ok(view) = safetensors.tensor(tensor_name) {
                let data = convert_to_f32(&view, tensor_name)?;
                return Ok(Some(LoadedTensor { shape: view.shape().to_vec(), data }));
            }
        }

        Ok(None)
    }
}

fn convert_to_f32(view: &safetensors::tensor::TensorView, tensor_name: &str) -> Result<Vec<f32>> {
    let bytes = view.data();
    let elements = view.shape().iter().product::<usize>();

    let (element_size, convert) = match view.dtype() {
        safetensors::Dtype::F32 => (mem::size_of::<f32>(), f32_from_le as fn(&[u8]) -> f32),
        safetensors::Dtype::BF16 => (2, bf16_from_le as fn(&[u8]) -> f32),
        dtype => anyhow::bail!("Unsupported tensor dtype {:?} for {}", dtype, tensor_name),
    };

    if bytes.len() != elements * element_size {
        anyhow::bail!(
            "Tensor {} size mismatch. Expected {} bytes, got {}",
            tensor_name,
            elements * element_size,
            bytes.len()
        );
    }

    Ok(bytes.chunks_exact(element_size).map(convert).collect())
}

fn f32_from_le(chunk: &[u8]) -> f32 {
    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// BF16 is the upper half of an F32.
fn bf16_from_le(chunk: &[u8]) -> f32 {
    f32::from_bits(u32::from(u16::from_le_bytes([chunk[0], chunk[1]])) << 16)
}
