//! Accelerator memory management.
//!
//! [`DeviceMemory`] is a cloneable handle to a mutex-guarded arena of device
//! buffers. Every allocation is returned as an owning [`DeviceBuffer`] which
//! releases its storage exactly once when dropped. The arena itself lives as long
//! as any handle or buffer refers to it; the process-wide instance returned by
//! [`DeviceMemory::shared`] is never torn down.
//!
//! No accelerator driver is linked into this crate, so the `Emulated` kind keeps
//! device buffers in host memory behind the same interface. Code above this
//! module never dereferences device storage directly; it only goes through
//! the copy and launch entry points.

use crate::error::DeviceError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Buffers are backed by host memory standing in for an accelerator.
    Emulated,
    /// No accelerator support; every allocation fails.
    Unavailable,
}

/// Snapshot of arena usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub allocations: usize,
    pub bytes_in_use: usize,
    pub peak_bytes: usize,
}

#[derive(Debug)]
struct DeviceArena {
    kind: DeviceKind,
    capacity: Option<usize>,
    buffers: HashMap<u64, Vec<u8>>,
    next_handle: u64,
    stats: DeviceStats,
}

impl DeviceArena {
    fn new(kind: DeviceKind, capacity: Option<usize>) -> Self {
        Self { kind, capacity, buffers: HashMap::new(), next_handle: 1, stats: DeviceStats::default() }
    }

    fn release(&mut self, handle: u64) {
        if let Some(storage) = self.buffers.remove(&handle) {
            self.stats.allocations -= 1;
            self.stats.bytes_in_use -= storage.len();
            trace!("Released device buffer #{handle} ({} bytes)", storage.len());
        }
    }

    fn storage(&self, buffer: &DeviceBuffer) -> Result<&Vec<u8>, DeviceError> {
        self.buffers.get(&buffer.handle).ok_or(DeviceError::InvalidHandle(buffer.handle))
    }

    fn storage_mut(&mut self, buffer: &DeviceBuffer) -> Result<&mut Vec<u8>, DeviceError> {
        self.buffers.get_mut(&buffer.handle).ok_or(DeviceError::InvalidHandle(buffer.handle))
    }
}

/// Handle to an accelerator memory arena.
#[derive(Clone)]
pub struct DeviceMemory {
    arena: Arc<Mutex<DeviceArena>>,
}

impl DeviceMemory {
    /// Creates an emulated device without a memory cap.
    pub fn emulated() -> Self {
        Self::from_arena(DeviceArena::new(DeviceKind::Emulated, None))
    }

    /// Creates an emulated device which refuses to hold more than `bytes` at once.
    pub fn with_capacity(bytes: usize) -> Self {
        Self::from_arena(DeviceArena::new(DeviceKind::Emulated, Some(bytes)))
    }

    /// Creates a device on which every allocation fails.
    pub fn unavailable() -> Self {
        Self::from_arena(DeviceArena::new(DeviceKind::Unavailable, None))
    }

    /// Returns the process-wide device, initializing it on first use.
    pub fn shared() -> Self {
        static SHARED: OnceLock<DeviceMemory> = OnceLock::new();
        SHARED.get_or_init(DeviceMemory::emulated).clone()
    }

    fn from_arena(arena: DeviceArena) -> Self {
        Self { arena: Arc::new(Mutex::new(arena)) }
    }

    pub fn kind(&self) -> DeviceKind {
        self.arena.lock().kind
    }

    pub fn device_count(&self) -> usize {
        match self.kind() {
            DeviceKind::Emulated => 1,
            DeviceKind::Unavailable => 0,
        }
    }

    pub fn stats(&self) -> DeviceStats {
        self.arena.lock().stats
    }

    /// Allocates `bytes` of zeroed device memory.
    pub fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, DeviceError> {
        let mut arena = self.arena.lock();

        if arena.kind == DeviceKind::Unavailable {
            return Err(DeviceError::Unavailable);
        }

        if let Some(capacity) = arena.capacity {
            let available = capacity.saturating_sub(arena.stats.bytes_in_use);
            if bytes > available {
                return Err(DeviceError::OutOfMemory { requested: bytes, available });
            }
        }

        let handle = arena.next_handle;
        arena.next_handle += 1;
        arena.buffers.insert(handle, vec![0u8; bytes]);
        arena.stats.allocations += 1;
        arena.stats.bytes_in_use += bytes;
        arena.stats.peak_bytes = arena.stats.peak_bytes.max(arena.stats.bytes_in_use);
        trace!("Allocated device buffer #{handle} ({bytes} bytes)");

        Ok(DeviceBuffer { handle, bytes, arena: Arc::clone(&self.arena) })
    }

    /// Releases `buffer` now instead of at the end of its scope.
    pub fn deallocate(&self, buffer: DeviceBuffer) -> Result<(), DeviceError> {
        self.check_owner(&buffer)?;
        drop(buffer);
        Ok(())
    }

    /// Copies `src` into the start of `dst`. Blocks until the copy is done.
    pub fn copy_to_device(&self, dst: &DeviceBuffer, src: &[f32]) -> Result<(), DeviceError> {
        self.check_owner(dst)?;
        let bytes = mem::size_of_val(src);
        if bytes > dst.bytes {
            return Err(DeviceError::CopyOutOfBounds { bytes, capacity: dst.bytes });
        }

        let mut arena = self.arena.lock();
        let storage = arena.storage_mut(dst)?;
        LittleEndian::write_f32_into(src, &mut storage[..bytes]);
        Ok(())
    }

    /// Fills `dst` from the start of `src`. Blocks until the copy is done.
    pub fn copy_from_device(&self, dst: &mut [f32], src: &DeviceBuffer) -> Result<(), DeviceError> {
        self.check_owner(src)?;
        let bytes = mem::size_of_val(dst);
        if bytes > src.bytes {
            return Err(DeviceError::CopyOutOfBounds { bytes, capacity: src.bytes });
        }

        let arena = self.arena.lock();
        let storage = arena.storage(src)?;
        LittleEndian::read_f32_into(&storage[..bytes], dst);
        Ok(())
    }

    /// Allocates a buffer sized for `values` and uploads them.
    pub fn upload(&self, values: &[f32]) -> Result<DeviceBuffer, DeviceError> {
        let buffer = self.allocate(mem::size_of_val(values))?;
        self.copy_to_device(&buffer, values)?;
        debug!("Uploaded {} floats to device buffer #{}", values.len(), buffer.handle);
        Ok(buffer)
    }

    /// Runs `kernel` with exclusive access to the arena.
    ///
    /// All device buffers touched by a launch must be created before the call and
    /// dropped after it returns, since releasing a buffer needs the same lock.
    pub(crate) fn launch<R>(
        &self,
        kernel: impl FnOnce(&mut KernelLaunch<'_>) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let mut arena = self.arena.lock();
        kernel(&mut KernelLaunch { arena: &mut *arena, owner: &self.arena })
    }

    fn check_owner(&self, buffer: &DeviceBuffer) -> Result<(), DeviceError> {
        if Arc::ptr_eq(&self.arena, &buffer.arena) { Ok(()) } else { Err(DeviceError::InvalidHandle(buffer.handle)) }
    }

    /// Human-readable description of the device.
    pub fn describe(&self) -> String {
        let arena = self.arena.lock();
        match arena.kind {
            DeviceKind::Emulated => {
                let capacity = arena.capacity.map_or_else(|| "unbounded".to_string(), |c| format!("{c} bytes"));
                format!(
                    "emulated accelerator - 1 device(s), {} buffer(s), {} bytes in use, capacity {capacity}",
                    arena.stats.allocations, arena.stats.bytes_in_use
                )
            }
            DeviceKind::Unavailable => "no accelerator - 0 device(s)".to_string(),
        }
    }
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.lock();
        f.debug_struct("DeviceMemory")
            .field("kind", &arena.kind)
            .field("capacity", &arena.capacity)
            .field("stats", &arena.stats)
            .finish()
    }
}

/// Exclusive view of the arena while a device kernel runs.
pub(crate) struct KernelLaunch<'a> {
    arena: &'a mut DeviceArena,
    owner: &'a Arc<Mutex<DeviceArena>>,
}

impl KernelLaunch<'_> {
    /// Reads `count` floats from the start of `buffer`.
    pub fn read(&self, buffer: &DeviceBuffer, count: usize) -> Result<Vec<f32>, DeviceError> {
        self.check_owner(buffer)?;
        let bytes = count * mem::size_of::<f32>();
        if bytes > buffer.bytes {
            return Err(DeviceError::CopyOutOfBounds { bytes, capacity: buffer.bytes });
        }

        let storage = self.arena.storage(buffer)?;
        let mut values = vec![0.0f32; count];
        LittleEndian::read_f32_into(&storage[..bytes], &mut values);
        Ok(values)
    }

    /// Writes `values` to the start of `buffer`.
    pub fn write(&mut self, buffer: &DeviceBuffer, values: &[f32]) -> Result<(), DeviceError> {
        self.check_owner(buffer)?;
        let bytes = mem::size_of_val(values);
        if bytes > buffer.bytes {
            return Err(DeviceError::CopyOutOfBounds { bytes, capacity: buffer.bytes });
        }

        let storage = self.arena.storage_mut(buffer)?;
        LittleEndian::write_f32_into(values, &mut storage[..bytes]);
        Ok(())
    }

    fn check_owner(&self, buffer: &DeviceBuffer) -> Result<(), DeviceError> {
        if Arc::ptr_eq(self.owner, &buffer.arena) { Ok(()) } else { Err(DeviceError::InvalidHandle(buffer.handle)) }
    }
}

/// Owning handle to a device allocation.
pub struct DeviceBuffer {
    handle: u64,
    bytes: usize,
    arena: Arc<Mutex<DeviceArena>>,
}

impl DeviceBuffer {
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Capacity in bytes.
    pub fn len_bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.arena.lock().release(self.handle);
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer").field("handle", &self.handle).field("bytes", &self.bytes).finish()
    }
}

#[cfg(test)]
#[path = "../tests/unit/device_test.rs"]
mod device_test;
