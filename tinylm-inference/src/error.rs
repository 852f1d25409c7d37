//! Typed failure kinds for the device layer and the numeric kernels.
//!
//! Higher level code (model loading, generation) works with `anyhow::Result`;
//! these types can be recovered from it with `downcast_ref`.

use thiserror::Error;

/// Failures of the accelerator memory arena.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no accelerator device is available")]
    Unavailable,

    #[error("device out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("device handle {0} is not owned by this device")]
    InvalidHandle(u64),

    #[error("copy of {bytes} bytes exceeds buffer capacity of {capacity} bytes")]
    CopyOutOfBounds { bytes: usize, capacity: usize },
}

/// Contract violations detected by the matrix kernels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("softmax requires at least one element")]
    EmptySoftmax,

    #[error("dimension mismatch in {op}: expected {expected}, got {got}")]
    DimensionMismatch { op: &'static str, expected: usize, got: usize },

    #[error("{name} buffer too small: need {needed} elements, have {actual}")]
    BufferTooSmall { name: &'static str, needed: usize, actual: usize },

    #[error("invalid tensor shape {shape:?} for {len} elements")]
    InvalidShape { shape: Vec<usize>, len: usize },
}
