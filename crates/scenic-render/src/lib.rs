//! Indirect draw batches and the per-frame system pipeline for the Scenic
//! asset viewer.
//!
//! This crate provides:
//! - [`IndirectResources`], a batch of vertex, index, command, and instance
//!   buffers drawn with one multi-draw call
//! - The [`DrawRecorder`] seam with a Vulkan recorder and a capturing recorder
//! - The [`System`] trait, a factory registry, and a priority-ordered manager
//!   with budgeted adoption
//! - Built-in transform, camera, culling, primitive, and debug bounds systems
//! - [`World`], which keeps system registration in step with scene edits
//! - Background texture streaming through the main-thread dispatcher

pub mod error;
pub mod manager;
pub mod recorder;
pub mod registry;
pub mod resources;
pub mod system;
pub mod systems;
pub mod texture;
pub mod world;

pub use error::{RenderError, Result};
pub use manager::SystemManager;
pub use recorder::{
    BindScope, BindTarget, DrawRecorder, RecordedCommand, RecordingRecorder, VulkanRecorder,
};
pub use registry::{SystemFactory, SystemRegistry};
pub use resources::{GeometryRange, IndirectResources};
pub use system::{priority, CameraView, FrameState, System};
pub use systems::{
    CameraSystem, CullingSystem, DebugBoundsSystem, PrimitiveSystem, TransformSystem,
};
pub use texture::{
    DecodedTexture, SharedTextureTable, TextureId, TextureState, TextureStreamer, TextureTable,
};
pub use world::World;
