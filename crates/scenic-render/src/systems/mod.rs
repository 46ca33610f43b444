//! Built-in systems.

mod camera;
mod culling;
mod debug;
mod primitive;
mod transform;

pub use camera::CameraSystem;
pub use culling::CullingSystem;
pub use debug::DebugBoundsSystem;
pub use primitive::PrimitiveSystem;
pub use transform::TransformSystem;
