use crate::device::DeviceMemory;
use crate::error::KernelError;
use crate::kernels::{Kernels, host};
use crate::tensor::Tensor;
use anyhow::{Context, Result};
use log::trace;

/// Accelerator kernels running against device-resident weights.
///
/// Operands without a device mirror are computed by the host kernels.
#[derive(Debug, Clone)]
pub struct DeviceKernels {
    memory: DeviceMemory,
}

impl DeviceKernels {
    pub fn new(memory: DeviceMemory) -> Self {
        Self { memory }
    }
}

impl Kernels for DeviceKernels {
    fn name(&self) -> &'static str {
        "device"
    }

    fn matmul(&self, a: &[f32], b: &Tensor, c: &mut [f32], m: usize, n: usize, k: usize) -> Result<()> {
        host::check_operands(a.len(), b.total_elements(), c.len(), m, n, k)?;

        let Some(b_buf) = b.device_buffer() else {
            trace!("Weight {:?} has no device mirror, using host matmul", b.shape());
            return Ok(host::matmul(a, b.data(), c, m, n, k)?);
        };

        let a_buf = self.memory.upload(&a[..m * k]).context("Failed to upload matmul input")?;
        let c_buf = self.memory.allocate(m * n * size_of::<f32>()).context("Failed to allocate matmul output")?;

        self.memory
            .launch(|launch| {
                let a = launch.read(&a_buf, m * k)?;
                let b = launch.read(b_buf, k * n)?;
                let mut out = vec![0.0f32; m * n];
                gemm_accumulate(&a, &b, &mut out, n, k);
                launch.write(&c_buf, &out)
            })
            .context("Device matmul failed")?;

        self.memory.copy_from_device(&mut c[..m * n], &c_buf).context("Failed to download matmul output")?;

        Ok(())
    }

    /// Accelerator variant of softmax. The engine normalizes layer outputs with
    /// [`HostKernels`](super::HostKernels), so this is only reached by direct callers.
    fn softmax(&self, data: &mut [f32]) -> Result<()> {
        if data.is_empty() {
            return Err(KernelError::EmptySoftmax.into());
        }

        let buf = self.memory.upload(data).context("Failed to upload softmax input")?;
        let len = data.len();

        self.memory
            .launch(|launch| {
                let mut values = launch.read(&buf, len)?;
                let max_val = values.iter().fold(f32::NEG_INFINITY, |acc, &val| acc.max(val));
                values.iter_mut().for_each(|val| *val = (*val - max_val).exp());
                let sum = values.iter().sum::<f32>();
                values.iter_mut().for_each(|val| *val /= sum);
                launch.write(&buf, &values)
            })
            .context("Device softmax failed")?;

        self.memory.copy_from_device(data, &buf).context("Failed to download softmax output")?;

        Ok(())
    }
}

/// Row-by-row rank-1 updates: `out[i, :] += a[i, p] * b[p, :]` for each `p`.
fn gemm_accumulate(a: &[f32], b: &[f32], out: &mut [f32], n: usize, k: usize) {
    if n == 0 {
        return;
    }
    for (a_row, out_row) in a.chunks(k.max(1)).zip(out.chunks_mut(n)) {
        for (p, &a_val) in a_row.iter().enumerate().take(k) {
            let b_row = &b[p * n..(p + 1) * n];
            out_row.iter_mut().zip(b_row).for_each(|(out_val, &b_val)| *out_val += a_val * b_val);
        }
    }
}
