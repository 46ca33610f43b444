//! Vulkan buffer backend.
//!
//! Storage is host-visible (`CpuToGpu`) so writes, read-back and growth
//! copies go through the persistent mapping and never need a transfer
//! submission. Released storage is retired through the deferred deletion
//! queue so frames still in flight keep reading valid memory.

use std::sync::Arc;

use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::backend::{BufferBackend, BufferHandle, BufferUsage};
use crate::deferred::DeferredDeletionQueue;
use crate::error::Result;
use crate::memory::{GpuAllocator, GpuBuffer};

/// Buffer backend over a shared [`GpuAllocator`].
pub struct DeviceBackend {
    allocator: Arc<Mutex<GpuAllocator>>,
    deletions: Arc<Mutex<DeferredDeletionQueue>>,
    frame_number: u64,
}

impl DeviceBackend {
    pub(crate) fn new(
        allocator: Arc<Mutex<GpuAllocator>>,
        deletions: Arc<Mutex<DeferredDeletionQueue>>,
    ) -> Self {
        Self {
            allocator,
            deletions,
            frame_number: 0,
        }
    }

    /// Start frame `frame_number`: storage retired long enough ago is freed.
    /// Returns the number of buffers freed.
    pub fn begin_frame(&mut self, frame_number: u64) -> Result<usize> {
        self.frame_number = frame_number;
        let mut allocator = self.allocator.lock();
        self.deletions.lock().process(&mut allocator, frame_number)
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Retired buffers not yet freed.
    pub fn pending_deletions(&self) -> usize {
        self.deletions.lock().pending_count()
    }
}

impl BufferBackend for DeviceBackend {
    type Storage = GpuBuffer;

    fn create_storage(&mut self, size: u64, usage: BufferUsage, name: &str) -> Result<GpuBuffer> {
        let mut allocator = self.allocator.lock();
        let mut buffer =
            allocator.create_buffer(size, usage.to_vk(), MemoryLocation::CpuToGpu, name)?;
        if let Err(e) = buffer.fill_zero() {
            allocator.free_buffer(&mut buffer)?;
            return Err(e);
        }
        Ok(buffer)
    }

    fn handle(&self, storage: &GpuBuffer) -> BufferHandle {
        BufferHandle {
            raw: storage.buffer,
            device_address: storage.device_address,
            size: storage.size,
        }
    }

    fn write(&mut self, storage: &mut GpuBuffer, offset: u64, data: &[u8]) -> Result<()> {
        storage.write_bytes(offset, data)
    }

    fn read(&self, storage: &GpuBuffer, offset: u64, out: &mut [u8]) -> Result<()> {
        storage.read_bytes(offset, out)
    }

    fn copy(&mut self, src: &GpuBuffer, dst: &mut GpuBuffer, size: u64) -> Result<()> {
        dst.copy_from(src, size)
    }

    fn release(&mut self, storage: GpuBuffer) -> Result<()> {
        self.deletions.lock().queue(storage, self.frame_number);
        Ok(())
    }
}
