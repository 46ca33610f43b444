//! Raw buffer storage backends.
//!
//! [`GrowableBuffer`](crate::GrowableBuffer) never talks to Vulkan directly.
//! It asks a [`BufferBackend`] for zeroed storage, writes and reads bytes at
//! offsets, copies live ranges into larger storage when it grows, and hands
//! storage back once it is no longer referenced.

use ash::vk::{self, Handle};
use bitflags::bitflags;

use crate::error::{GpuError, Result};

bitflags! {
    /// What a buffer is bound as when drawing.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const STORAGE = 1 << 2;
        const INDIRECT = 1 << 3;
    }
}

impl BufferUsage {
    /// Vulkan usage flags. Every buffer can be a copy source and destination
    /// so growth can preserve contents, and exposes a device address.
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        if self.contains(Self::VERTEX) {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if self.contains(Self::INDEX) {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if self.contains(Self::STORAGE) {
            flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if self.contains(Self::INDIRECT) {
            flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
        }
        flags
    }
}

/// Opaque handle the render layer binds as a vertex, index, storage, or
/// indirect source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    /// Vulkan buffer.
    pub raw: vk::Buffer,
    /// Device address for buffer references in shaders.
    pub device_address: vk::DeviceAddress,
    /// Size of the storage in bytes.
    pub size: u64,
}

/// Source of raw GPU storage.
pub trait BufferBackend {
    /// One allocation.
    type Storage;

    /// Create zero-filled storage of `size` bytes.
    fn create_storage(
        &mut self,
        size: u64,
        usage: BufferUsage,
        name: &str,
    ) -> Result<Self::Storage>;

    /// Handle for binding.
    fn handle(&self, storage: &Self::Storage) -> BufferHandle;

    /// Write `data` at byte `offset`.
    fn write(&mut self, storage: &mut Self::Storage, offset: u64, data: &[u8]) -> Result<()>;

    /// Read `out.len()` bytes starting at `offset`.
    fn read(&self, storage: &Self::Storage, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Copy the first `size` bytes of `src` into `dst`.
    fn copy(&mut self, src: &Self::Storage, dst: &mut Self::Storage, size: u64) -> Result<()>;

    /// Give storage back. Backends with frames in flight may defer the free.
    fn release(&mut self, storage: Self::Storage) -> Result<()>;
}

/// Storage owned by [`HostBackend`].
#[derive(Debug)]
pub struct HostStorage {
    id: u64,
    usage: BufferUsage,
    bytes: Vec<u8>,
}

impl HostStorage {
    /// Raw contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

/// In-memory backend used for headless runs and tests.
#[derive(Debug, Default)]
pub struct HostBackend {
    next_id: u64,
    live_bytes: u64,
    created: u64,
    released: u64,
}

impl HostBackend {
    /// Create a new host backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held by unreleased storage.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Number of storages created so far.
    pub fn created_count(&self) -> u64 {
        self.created
    }

    /// Number of storages released so far.
    pub fn released_count(&self) -> u64 {
        self.released
    }

    fn check_bounds(storage: &HostStorage, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::try_from(offset)
            .map_err(|_| GpuError::InvalidState("Offset overflow".to_string()))?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= storage.bytes.len())
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "Access {start}+{len} outside storage of {} bytes",
                    storage.bytes.len()
                ))
            })?;
        Ok(start..end)
    }
}

impl BufferBackend for HostBackend {
    type Storage = HostStorage;

    fn create_storage(&mut self, size: u64, usage: BufferUsage, _name: &str) -> Result<HostStorage> {
        let len = usize::try_from(size)
            .map_err(|_| GpuError::AllocationFailed(format!("{size} bytes")))?;
        self.next_id += 1;
        self.created += 1;
        self.live_bytes += size;
        Ok(HostStorage {
            id: self.next_id,
            usage,
            bytes: vec![0; len],
        })
    }

    fn handle(&self, storage: &HostStorage) -> BufferHandle {
        BufferHandle {
            raw: vk::Buffer::from_raw(storage.id),
            device_address: storage.id << 32,
            size: storage.bytes.len() as u64,
        }
    }

    fn write(&mut self, storage: &mut HostStorage, offset: u64, data: &[u8]) -> Result<()> {
        let range = Self::check_bounds(storage, offset, data.len())?;
        storage.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, storage: &HostStorage, offset: u64, out: &mut [u8]) -> Result<()> {
        let range = Self::check_bounds(storage, offset, out.len())?;
        out.copy_from_slice(&storage.bytes[range]);
        Ok(())
    }

    fn copy(&mut self, src: &HostStorage, dst: &mut HostStorage, size: u64) -> Result<()> {
        let src_range = Self::check_bounds(src, 0, size as usize)?;
        let dst_range = Self::check_bounds(dst, 0, size as usize)?;
        dst.bytes[dst_range].copy_from_slice(&src.bytes[src_range]);
        Ok(())
    }

    fn release(&mut self, storage: HostStorage) -> Result<()> {
        self.released += 1;
        self.live_bytes -= storage.bytes.len() as u64;
        Ok(())
    }
}
