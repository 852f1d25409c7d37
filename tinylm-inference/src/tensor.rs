use crate::device::{DeviceBuffer, DeviceMemory};
use crate::error::{DeviceError, KernelError};

/// Dense row-major f32 tensor with an optional device-resident mirror.
///
/// The host `data` stays authoritative: the mirror is uploaded once and never
/// mutated in place, so both copies hold the same values for the tensor's lifetime.
#[derive(Debug)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    device: Option<DeviceBuffer>,
}

impl Tensor {
    /// Creates a tensor, checking that every dimension is positive and that
    /// the shape covers exactly `data.len()` elements.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, KernelError> {
        let elements = shape.iter().product::<usize>();
        if shape.is_empty() || shape.contains(&0) || elements != data.len() {
            return Err(KernelError::InvalidShape { shape, len: data.len() });
        }
        Ok(Self { data, shape, device: None })
    }

    /// Creates a zero-filled tensor.
    pub fn zeros(shape: Vec<usize>) -> Result<Self, KernelError> {
        let elements = shape.iter().product::<usize>();
        Self::new(vec![0.0; elements], shape)
    }

    /// Creates a `[1, len]` row vector.
    pub fn row(data: Vec<f32>) -> Result<Self, KernelError> {
        let len = data.len();
        Self::new(data, vec![1, len])
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn total_elements(&self) -> usize {
        self.data.len()
    }

    /// First dimension.
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Product of all dimensions after the first one.
    pub fn cols(&self) -> usize {
        self.shape[1..].iter().product()
    }

    pub fn is_on_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_buffer(&self) -> Option<&DeviceBuffer> {
        self.device.as_ref()
    }

    /// Mirrors the host data into `memory`. A previous mirror is released first.
    pub fn upload(&mut self, memory: &DeviceMemory) -> Result<(), DeviceError> {
        self.device = None;
        self.device = Some(memory.upload(&self.data)?);
        Ok(())
    }

    /// Drops the device mirror, if any.
    pub fn release_device(&mut self) {
        self.device = None;
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}
