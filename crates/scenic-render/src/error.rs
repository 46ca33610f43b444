//! Render error types.

use scenic_gpu::GpuError;
use scenic_scene::{ActorId, SceneError, SystemKind};
use thiserror::Error;

/// Errors raised by batches, systems, and the world.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Core(#[from] scenic_core::Error),

    /// Geometry or sections that cannot be placed in a batch.
    #[error("Invalid geometry for `{batch}`: {reason}")]
    InvalidGeometry { batch: String, reason: String },

    /// An actor reached a system without the component it handles.
    #[error("Actor {actor} has no GPU placement in `{batch}`")]
    NotGenerated { actor: ActorId, batch: String },

    /// No factory is registered for a system kind.
    #[error("No factory registered for system {0:?}")]
    UnknownSystem(SystemKind),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
