//! Per-instance payloads addressed by base instance.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::backend::{BufferBackend, BufferHandle, BufferUsage};
use crate::error::Result;
use crate::growable::GrowableBuffer;
use crate::report::BufferUsageReport;

/// Default per-instance record: a world matrix plus four user words
/// (material override, heightmap slot, picking id, ...).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub world: [[f32; 4]; 4],
    pub aux: [u32; 4],
}

impl InstanceData {
    pub fn from_world(world: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            aux: [0; 4],
        }
    }

    #[must_use]
    pub fn with_aux(mut self, aux: [u32; 4]) -> Self {
        self.aux = aux;
        self
    }

    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }
}

impl Default for InstanceData {
    fn default() -> Self {
        Self::from_world(Mat4::IDENTITY)
    }
}

/// Storage buffer of instance records. Each drawn primitive owns one
/// contiguous block whose first slot is its base instance.
pub struct InstanceDataStore<I: Pod, B: BufferBackend> {
    buffer: GrowableBuffer<I, B>,
}

impl<I: Pod, B: BufferBackend> InstanceDataStore<I, B> {
    pub fn new(name: impl Into<String>, initial_capacity: u32) -> Self {
        Self {
            buffer: GrowableBuffer::new(name, BufferUsage::STORAGE, initial_capacity),
        }
    }

    #[must_use]
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.buffer = self.buffer.with_growth_factor(factor);
        self
    }

    /// Allocate a block for `instances` and return its base instance.
    pub fn add_range(&mut self, backend: &mut B, instances: &[I]) -> Result<u32> {
        self.buffer.add_range(backend, instances)
    }

    /// Rewrite a block in place.
    pub fn update(&mut self, backend: &mut B, base: u32, instances: &[I]) -> Result<()> {
        self.buffer.update(backend, base, instances)
    }

    /// Free a block.
    pub fn remove_range(&mut self, base: u32, len: u32) -> Result<()> {
        self.buffer.remove_range(base, len)
    }

    pub fn read(&self, backend: &B, base: u32, len: u32) -> Result<Vec<I>> {
        self.buffer.read_range(backend, base, len)
    }

    pub fn len(&self) -> u32 {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.buffer.capacity()
    }

    pub fn handle(&self, backend: &B) -> Option<BufferHandle> {
        self.buffer.handle(backend)
    }

    pub fn usage_report(&self) -> BufferUsageReport {
        self.buffer.usage_report()
    }

    pub fn destroy(&mut self, backend: &mut B) -> Result<()> {
        self.buffer.destroy(backend)
    }
}
