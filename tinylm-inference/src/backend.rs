use crate::device::DeviceMemory;
use crate::kernels::{DeviceKernels, HostKernels, Kernels};
use std::fmt;
use std::str::FromStr;

/// Execution target selected for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Cpu,
    GpuCuda,
    GpuMetal,
}

impl Backend {
    /// Whether loaded weights are mirrored into device memory.
    pub fn mirrors_weights(self) -> bool {
        matches!(self, Backend::GpuCuda)
    }

    /// Builds the kernel set this backend dispatches to.
    ///
    /// Only CUDA has a device matmul; Metal runs on the host kernels.
    pub fn kernels(self, memory: &DeviceMemory) -> Box<dyn Kernels> {
        match self {
            Backend::GpuCuda => Box::new(DeviceKernels::new(memory.clone())),
            Backend::Cpu | Backend::GpuMetal => Box::new(HostKernels),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Cpu => "CPU",
            Backend::GpuCuda => "GPU_CUDA",
            Backend::GpuMetal => "GPU_METAL",
        };
        f.write_str(name)
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "cuda" | "gpu_cuda" => Ok(Backend::GpuCuda),
            "metal" | "gpu_metal" => Ok(Backend::GpuMetal),
            _ => anyhow::bail!("Unknown backend: {value} (expected cpu|cuda|metal)"),
        }
    }
}
