use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use std::fs::File;
use std::mem;

/// Sequential little-endian reader over a memory-mapped file.
#[derive(Debug)]
pub(crate) struct MemoryMapper {
    mmap: Mmap,
    offset: usize,
}

impl MemoryMapper {
    pub fn new(file: File) -> Result<Self> {
        // SAFETY: the mapping is read-only and the model file is not expected to
        // change while it is being loaded.
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file).context("Failed to create memory mapping")? };
        Ok(Self { mmap, offset: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.mmap.len() - self.offset
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.get_bytes(mem::size_of::<u32>())?;
        Ok(LittleEndian::read_u32(bytes))
    }

    /// Copies `count` floats out of the mapping.
    pub fn read_f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let bytes_needed = count
            .checked_mul(mem::size_of::<f32>())
            .with_context(|| format!("Float count {count} overflows the address space"))?;
        let bytes = self.get_bytes(bytes_needed)?;

        let mut values = vec![0.0f32; count];
        LittleEndian::read_f32_into(bytes, &mut values);
        Ok(values)
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<&[u8]> {
        if count > self.remaining() {
            anyhow::bail!("Insufficient data: need {} bytes, have {} remaining", count, self.remaining());
        }

        let result = &self.mmap[self.offset..self.offset + count];
        self.offset += count;
        Ok(result)
    }
}
