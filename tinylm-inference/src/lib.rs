//! Minimal on-device inference runtime.
//!
//! Loads a stack of weight matrices, chains matmul and softmax over them and
//! generates text one byte at a time with greedy selection.

mod backend;
mod device;
mod engine;
mod error;
mod generation;
mod kernels;
mod model;
mod tensor;
mod tokenizer;
mod utils;
mod worker;

pub use backend::Backend;
pub use device::{DeviceBuffer, DeviceKind, DeviceMemory, DeviceStats};
pub use engine::InferenceEngine;
pub use error::{DeviceError, KernelError};
pub use kernels::{DeviceKernels, HostKernels, Kernels, argmax, matmul, softmax};
pub use model::read_weights;
pub use tensor::Tensor;
pub use tokenizer::{BYTE_VOCAB_SIZE, detokenize, detokenize_bytes, tokenize};
pub use worker::EngineWorker;

use anyhow::Result;
use log::debug;

/// Default number of generated bytes per request.
pub const DEFAULT_MAX_TOKENS: usize = 80;
/// Default sampling temperature (accepted, not used for selection).
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub model_path: String,
    pub backend: Backend,
    pub max_tokens: usize,
    pub temperature: f32,
    pub mode: String,
    pub prompt: Option<String>,
    pub device_capacity: Option<usize>,
}

impl InferenceConfig {
    pub fn builder() -> InferenceConfigBuilder {
        InferenceConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct InferenceConfigBuilder {
    model_path: Option<String>,
    backend: Option<Backend>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    mode: Option<String>,
    prompt: Option<String>,
    device_capacity: Option<usize>,
}

impl InferenceConfigBuilder {
    pub fn model_path(mut self, path: Option<&String>) -> Self {
        self.model_path = path.cloned();
        self
    }
    pub fn backend(mut self, backend: Option<Backend>) -> Self {
        self.backend = backend;
        self
    }
    pub fn max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
    pub fn mode(mut self, mode: Option<&String>) -> Self {
        self.mode = mode.cloned();
        self
    }
    pub fn prompt(mut self, prompt: Option<&String>) -> Self {
        self.prompt = prompt.cloned();
        self
    }
    pub fn device_capacity(mut self, bytes: Option<usize>) -> Self {
        self.device_capacity = bytes;
        self
    }
    pub fn build(self) -> Result<InferenceConfig, String> {
        Ok(InferenceConfig {
            model_path: self.model_path.ok_or("model_path is required")?,
            backend: self.backend.unwrap_or_default(),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            mode: self.mode.unwrap_or_else(|| "generate".to_string()),
            prompt: self.prompt,
            device_capacity: self.device_capacity,
        })
    }
}

impl InferenceConfig {
    /// Device the engine should run against: a capped arena when a capacity is
    /// configured, otherwise the process-wide one.
    pub fn device(&self) -> DeviceMemory {
        self.device_capacity.map_or_else(DeviceMemory::shared, DeviceMemory::with_capacity)
    }
}

/// Runs inference.
pub fn run_inference(inference_config: InferenceConfig) -> Result<()> {
    debug!("{inference_config:#?}");

    let mut engine = InferenceEngine::with_device(inference_config.backend, inference_config.device());
    engine.try_load_model(&inference_config.model_path)?;

    debug!("{engine:#?}");

    let prompt = inference_config.prompt.as_deref();
    let (max_tokens, temperature) = (inference_config.max_tokens, inference_config.temperature);

    match inference_config.mode.as_str() {
        "generate" => generation::generate(&engine, prompt, max_tokens, temperature),
        "chat" => {
            let worker = EngineWorker::spawn(engine)?;
            generation::chat(&worker, prompt, max_tokens, temperature)
        }
        _ => anyhow::bail!("Unknown mode: {inference_config:?}"),
    }
}
