//! GPU buffer layer for the Scenic asset viewer.
//!
//! This crate provides:
//! - The [`BufferBackend`] seam with a Vulkan backend (gpu-allocator, host-visible
//!   memory) and an in-memory host backend for headless runs and tests
//! - [`GrowableBuffer`], a typed resizable GPU array with free-list slot reuse
//! - [`IndirectCommandBuffer`], single- or double-buffered indexed indirect draw records
//! - [`InstanceDataStore`], per-instance payloads addressed by base instance
//! - Deferred deletion of retired storage and a headless device context

pub mod backend;
pub mod command;
pub mod context;
pub mod deferred;
pub mod device;
pub mod error;
pub mod growable;
pub mod instances;
pub mod memory;
pub mod report;

pub use backend::{BufferBackend, BufferHandle, BufferUsage, HostBackend, HostStorage};
pub use command::{DrawCommand, IndirectCommandBuffer};
pub use context::{GpuContext, GpuContextBuilder};
pub use deferred::DeferredDeletionQueue;
pub use device::DeviceBackend;
pub use error::{GpuError, Result};
pub use growable::{FreeRange, GrowableBuffer, GrowthMode, SlotAllocator};
pub use instances::{InstanceData, InstanceDataStore};
pub use memory::{GpuAllocator, GpuBuffer};
pub use report::BufferUsageReport;
