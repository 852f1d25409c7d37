use crate::backend::Backend;
use crate::device::DeviceMemory;
use crate::error::KernelError;
use crate::kernels::{HostKernels, Kernels, argmax};
use crate::model::read_weights;
use crate::tensor::Tensor;
use crate::tokenizer::{detokenize, tokenize};
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::fmt;
use std::path::Path;

/// Scale applied to byte tokens when they are fed to the first layer.
const TOKEN_SCALE: f32 = 255.0;

/// Runs a stack of weight matrices over byte tokens.
///
/// Each layer is a `[rows, cols]` matrix; the forward pass multiplies the current
/// activation (width `cols`) by the layer's data read as a `cols × rows` matrix,
/// normalizes the `rows` outputs with softmax and feeds them to the next layer.
/// Generation picks the arg-max of the final distribution as the next byte.
///
/// An engine handles one call at a time; `&mut self` on loading and the
/// [`EngineWorker`](crate::worker::EngineWorker) queue enforce this.
pub struct InferenceEngine {
    backend: Backend,
    device: DeviceMemory,
    kernels: Box<dyn Kernels>,
    weights: Vec<Tensor>,
}

impl InferenceEngine {
    /// Creates an engine bound to the process-wide device.
    pub fn new(backend: Backend) -> Self {
        Self::with_device(backend, DeviceMemory::shared())
    }

    /// Creates an engine bound to `device`.
    pub fn with_device(backend: Backend, device: DeviceMemory) -> Self {
        let kernels = backend.kernels(&device);
        let engine = Self { backend, device, kernels, weights: Vec::new() };

        info!("Inference engine initialized");
        info!("Device info: {}", engine.device_info());

        engine
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Switches kernels. Weights already loaded keep their current placement.
    pub fn set_backend(&mut self, backend: Backend) {
        self.kernels = backend.kernels(&self.device);
        self.backend = backend;
        debug!("Backend set to {backend} ({} kernels)", self.kernels.name());
    }

    pub fn device(&self) -> &DeviceMemory {
        &self.device
    }

    pub fn weights(&self) -> &[Tensor] {
        &self.weights
    }

    pub fn layer_count(&self) -> usize {
        self.weights.len()
    }

    /// Input width expected by the first layer, if a model is loaded.
    pub fn input_width(&self) -> Option<usize> {
        self.weights.first().map(Tensor::cols)
    }

    /// Loads the model at `path`, logging and swallowing any failure.
    ///
    /// Returns `false` when loading fails; the engine then holds no weights.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_load_model(path) {
            Ok(_) => true,
            Err(err) => {
                error!("Model loading error: {err:#}");
                false
            }
        }
    }

    /// Replaces the weight set with the layers stored at `path`.
    ///
    /// On a mirroring backend every layer is also uploaded to the device. Nothing
    /// is kept if any step fails.
    pub fn try_load_model(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        self.weights.clear();

        let mut weights = read_weights(path)?;

        if self.backend.mirrors_weights() {
            for (idx, weight) in weights.iter_mut().enumerate() {
                weight.upload(&self.device).with_context(|| format!("Failed to mirror layer {idx} to device"))?;
            }
        }

        self.weights = weights;
        info!("Model loaded: {} layers", self.weights.len());

        Ok(self.weights.len())
    }

    /// Runs `input` (`[1, width]`) through every layer and returns the final
    /// distribution with shape `[rows, 1]`.
    ///
    /// Softmax follows every layer, not only the last one, and always runs on the host.
    pub fn forward_pass(&self, input: &Tensor) -> Result<Tensor> {
        if self.weights.is_empty() {
            anyhow::bail!("No model loaded");
        }
        if input.rows() != 1 {
            return Err(KernelError::DimensionMismatch { op: "forward_pass rows", expected: 1, got: input.rows() }.into());
        }

        let mut activation = input.data().to_vec();

        for (idx, weight) in self.weights.iter().enumerate() {
            let (n, k) = (weight.rows(), weight.cols());

            if activation.len() != k {
                return Err(KernelError::DimensionMismatch { op: "forward_pass width", expected: k, got: activation.len() })
                    .with_context(|| format!("Layer {idx} with shape {:?}", weight.shape()));
            }

            let mut intermediate = vec![0.0f32; n];
            self.kernels
                .matmul(&activation, weight, &mut intermediate, 1, n, k)
                .with_context(|| format!("Matmul failed at layer {idx}"))?;
            // Normalization stays on the host for every backend.
            HostKernels
                .softmax(&mut intermediate)
                .with_context(|| format!("Softmax failed at layer {idx}"))?;

            activation = intermediate;
        }

        let rows = activation.len();
        Ok(Tensor::new(activation, vec![rows, 1])?)
    }

    /// One token per UTF-8 byte of `text`.
    pub fn tokenize(&self, text: &str) -> Vec<u32> {
        tokenize(text)
    }

    pub fn detokenize(&self, tokens: &[u32]) -> String {
        detokenize(tokens)
    }

    /// Generates exactly `max_tokens` bytes after `prompt` and returns the prompt
    /// followed by one `char` per generated byte (Latin-1), so the result always
    /// holds `prompt.chars().count() + max_tokens` characters.
    ///
    /// `temperature` is accepted for interface compatibility; selection is always greedy.
    pub fn generate(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let mut text = String::with_capacity(prompt.len() + 2 * max_tokens);
        text.push_str(prompt);
        self.generate_with(prompt, max_tokens, temperature, |byte| text.push(char::from(byte)))?;
        Ok(text)
    }

    /// Like [`generate`](Self::generate) but returns the raw bytes.
    pub fn generate_bytes(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<Vec<u8>> {
        self.generate_with(prompt, max_tokens, temperature, |_| {})
    }

    /// Generation loop; `on_token` receives each byte as soon as it is chosen.
    pub fn generate_with<F>(&self, prompt: &str, max_tokens: usize, temperature: f32, mut on_token: F) -> Result<Vec<u8>>
    where
        F: FnMut(u8),
    {
        let width = self.input_width().context("No model loaded; call load_model first")?;
        debug!("Generating {max_tokens} tokens at temperature {temperature} (greedy selection)");

        let mut tokens = tokenize(prompt);
        let mut output = prompt.as_bytes().to_vec();
        output.reserve(max_tokens);

        for step in 0..max_tokens {
            let input = Tensor::row(context_window(&tokens, width))?;
            let distribution =
                self.forward_pass(&input).with_context(|| format!("Forward pass failed at step {step}"))?;

            let next_token = argmax(distribution.data()) as u32;
            tokens.push(next_token);

            // Ids above 255 keep their low byte only.
            let byte = next_token as u8;
            output.push(byte);
            on_token(byte);
        }

        Ok(output)
    }

    /// Human-readable description of the backend and its device.
    pub fn device_info(&self) -> String {
        match self.backend {
            Backend::Cpu => format!("CPU (host kernels - {} thread(s))", rayon::current_num_threads()),
            Backend::GpuCuda => format!("GPU_CUDA ({})", self.device.describe()),
            Backend::GpuMetal => "GPU_METAL (host kernels - no Metal device linked)".to_string(),
        }
    }
}

/// Builds the first-layer input from the most recent `width` tokens, scaled to
/// `[0, 1]` and left-padded with zeros when the context is shorter.
fn context_window(tokens: &[u32], width: usize) -> Vec<f32> {
    let recent = &tokens[tokens.len().saturating_sub(width)..];
    let mut input = vec![0.0f32; width - recent.len()];
    input.extend(recent.iter().map(|&token| token as f32 / TOKEN_SCALE));
    input
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        let mirrored = self.weights.iter().filter(|weight| weight.is_on_device()).count();
        if mirrored > 0 {
            debug!("Releasing {mirrored} device-resident weights");
        }
    }
}

impl fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shapes = self.weights.iter().map(Tensor::shape).collect::<Vec<_>>();
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend)
            .field("kernels", &self.kernels.name())
            .field("layers", &shapes)
            .field("device", &self.device)
            .finish()
    }
}

#[cfg(test)]
#[path = "../tests/unit/engine_test.rs"]
mod engine_test;
