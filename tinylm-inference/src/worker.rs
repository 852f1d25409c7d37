//! Runs an engine on its own thread so callers with an event loop never block on
//! inference.
//!
//! Requests are queued on a channel and served one at a time in submission order;
//! results come back either on a reply channel or through a callback executed on
//! the worker thread (the caller is responsible for marshaling it onto its own loop).

use crate::backend::Backend;
use crate::engine::InferenceEngine;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

type GenerateCallback = Box<dyn FnOnce(Result<String>) + Send>;

enum Request {
    Generate { prompt: String, max_tokens: usize, temperature: f32, on_done: GenerateCallback },
    Load { path: PathBuf, reply: Sender<bool> },
    SetBackend(Backend),
    DeviceInfo { reply: Sender<String> },
}

/// Handle to an engine running on a dedicated thread.
pub struct EngineWorker {
    sender: Option<Sender<Request>>,
    handle: Option<JoinHandle<InferenceEngine>>,
}

impl EngineWorker {
    /// Moves `engine` onto a new worker thread.
    pub fn spawn(engine: InferenceEngine) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("tinylm-engine".to_string())
            .spawn(move || serve(engine, receiver))
            .context("Failed to spawn engine worker thread")?;

        Ok(Self { sender: Some(sender), handle: Some(handle) })
    }

    /// Queues a generation; `on_done` runs on the worker thread with the result.
    pub fn generate_with_callback<F>(&self, prompt: &str, max_tokens: usize, temperature: f32, on_done: F) -> Result<()>
    where
        F: FnOnce(Result<String>) + Send + 'static,
    {
        self.send(Request::Generate {
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
            on_done: Box::new(on_done),
        })
    }

    /// Queues a generation and returns the channel its result will arrive on.
    pub fn submit_generate(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<Receiver<Result<String>>> {
        let (reply, receiver) = mpsc::channel();
        self.generate_with_callback(prompt, max_tokens, temperature, move |result| {
            if reply.send(result).is_err() {
                debug!("Generation result dropped: receiver is gone");
            }
        })?;
        Ok(receiver)
    }

    /// Queues a model load; the receiver yields the same value as [`InferenceEngine::load_model`].
    pub fn submit_load(&self, path: impl Into<PathBuf>) -> Result<Receiver<bool>> {
        let (reply, receiver) = mpsc::channel();
        self.send(Request::Load { path: path.into(), reply })?;
        Ok(receiver)
    }

    pub fn set_backend(&self, backend: Backend) -> Result<()> {
        self.send(Request::SetBackend(backend))
    }

    /// Blocks until the worker has answered with its device description.
    pub fn device_info(&self) -> Result<String> {
        let (reply, receiver) = mpsc::channel();
        self.send(Request::DeviceInfo { reply })?;
        receiver.recv().context("Engine worker stopped before replying")
    }

    /// Drains the queue, stops the thread and hands the engine back.
    pub fn shutdown(mut self) -> Result<InferenceEngine> {
        self.sender.take();
        let handle = self.handle.take().context("Engine worker already stopped")?;
        handle.join().map_err(|_| anyhow::anyhow!("Engine worker thread panicked"))
    }

    fn send(&self, request: Request) -> Result<()> {
        self.sender
            .as_ref()
            .context("Engine worker already stopped")?
            .send(request)
            .map_err(|_| anyhow::anyhow!("Engine worker has stopped"))
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Engine worker thread panicked");
            }
        }
    }
}

fn serve(mut engine: InferenceEngine, receiver: Receiver<Request>) -> InferenceEngine {
    for request in receiver {
        match request {
            Request::Generate { prompt, max_tokens, temperature, on_done } => {
                on_done(engine.generate(&prompt, max_tokens, temperature));
            }
            Request::Load { path, reply } => {
                let loaded = engine.load_model(&path);
                if reply.send(loaded).is_err() {
                    debug!("Load result dropped: receiver is gone");
                }
            }
            Request::SetBackend(backend) => engine.set_backend(backend),
            Request::DeviceInfo { reply } => {
                if reply.send(engine.device_info()).is_err() {
                    debug!("Device info dropped: receiver is gone");
                }
            }
        }
    }

    debug!("Engine worker queue closed");
    engine
}

#[cfg(test)]
#[path = "../tests/unit/worker_test.rs"]
mod worker_test;
