//! Matrix multiply and softmax kernels.
//!
//! The [`Kernels`] trait is the seam between the engine and the execution target:
//! [`HostKernels`] computes on the CPU, [`DeviceKernels`] computes against weights
//! mirrored into [`DeviceMemory`](crate::device::DeviceMemory).

use crate::tensor::Tensor;
use anyhow::Result;
use std::fmt;

mod device;
mod host;

pub use device::DeviceKernels;
pub use host::{argmax, matmul, softmax};

/// Numeric routines used by the forward pass.
pub trait Kernels: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Computes `c[M×N] = a[M×K] · b[K×N]` where `b` is the flat data of a weight tensor.
    fn matmul(&self, a: &[f32], b: &Tensor, c: &mut [f32], m: usize, n: usize, k: usize) -> Result<()>;

    /// In-place softmax; `data` must not be empty.
    fn softmax(&self, data: &mut [f32]) -> Result<()>;
}

/// Kernels executed on the host with rayon.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostKernels;

impl Kernels for HostKernels {
    fn name(&self) -> &'static str {
        "host"
    }

    fn matmul(&self, a: &[f32], b: &Tensor, c: &mut [f32], m: usize, n: usize, k: usize) -> Result<()> {
        Ok(host::matmul(a, b.data(), c, m, n, k)?)
    }

    fn softmax(&self, data: &mut [f32]) -> Result<()> {
        Ok(host::softmax(data)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernels_test.rs"]
mod kernels_test;
