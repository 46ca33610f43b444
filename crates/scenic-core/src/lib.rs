//! Core types, math, and frame-loop plumbing for the Scenic asset viewer.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Error types
//! - Bounds and frustum math used for culling
//! - Half-open instance ranges used for visibility
//! - The main-thread dispatcher and background worker used for off-thread decoding
//! - Render configuration and logging setup

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod math;
pub mod range;
pub mod worker;

pub use config::{CommandBuffering, RenderConfig};
pub use dispatcher::{DispatchSender, MainThreadDispatcher};
pub use error::{Error, Result};
pub use math::{Aabb, Frustum};
pub use range::InstanceRange;
pub use worker::BackgroundWorker;

/// Engine-wide constants
pub mod constants {
    /// Maximum number of LOD slots a primitive can carry
    pub const MAX_LOD_COUNT: usize = 8;
    /// Smallest geometric growth factor allowed for GPU buffers
    pub const MIN_GROWTH_FACTOR: f32 = 1.5;
    /// Storage binding slot the per-instance buffer is bound to
    pub const INSTANCE_STORAGE_SLOT: u32 = 0;
}
