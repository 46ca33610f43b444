//! Scene error types.

use thiserror::Error;

use crate::actor::ActorId;
use crate::component::ComponentKind;

/// Scene graph errors. All of them signal a caller bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Unknown actor {0}")]
    UnknownActor(ActorId),

    /// Every actor keeps exactly one transform.
    #[error("Actor {0} must keep its transform component")]
    TransformRequired(ActorId),

    #[error("Actor {actor} already has a {kind:?} component")]
    DuplicateComponent { actor: ActorId, kind: ComponentKind },

    #[error("Actor {actor} has no {kind:?} component")]
    MissingComponent { actor: ActorId, kind: ComponentKind },

    #[error("Attaching {child} under {parent} would create a cycle")]
    CycleDetected { child: ActorId, parent: ActorId },

    #[error("LOD {0} out of range")]
    InvalidLod(usize),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SceneError>;
