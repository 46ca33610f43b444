//! Scene graph for the Scenic asset viewer.
//!
//! Actors form a hierarchy stored in a `hecs` arena. Each actor owns a
//! transform plus optional instanced transforms, a drawable primitive, and a
//! camera. Mutations mark actors dirty; [`Scene::update_world_matrices`]
//! propagates world matrices from the roots and hands instance data off to
//! the render systems through [`DirtyFlags::INSTANCES`].

pub mod actor;
pub mod camera;
pub mod component;
pub mod error;
pub mod primitive;
pub mod scene;
pub mod transform;

pub use actor::{Actor, ActorId, DirtyFlags};
pub use camera::CameraComponent;
pub use component::{Component, ComponentKind, SystemKind};
pub use error::{Result, SceneError};
pub use primitive::{
    IndirectDrawMetadata, MeshVertex, PrimitiveComponent, PrimitiveGeometry, PrimitiveLod,
    PrimitiveSection, SectionDrawData,
};
pub use scene::{Membership, Scene};
pub use transform::{InstancedTransformComponent, TransformComponent};
