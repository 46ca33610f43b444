//! Actor components and the systems that handle them.

use crate::camera::CameraComponent;
use crate::primitive::PrimitiveComponent;
use crate::transform::{InstancedTransformComponent, TransformComponent};

/// Kind of per-frame system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemKind {
    Transform,
    Camera,
    Culling,
    Primitive,
    DebugBounds,
}

/// Component discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    InstancedTransform,
    Primitive,
    Camera,
}

impl ComponentKind {
    /// Systems that adopt components of this kind. The first component of a
    /// kind added to the scene instantiates any of these not yet running.
    pub const fn systems(self) -> &'static [SystemKind] {
        match self {
            Self::Transform | Self::InstancedTransform => &[SystemKind::Transform],
            Self::Primitive => &[
                SystemKind::Culling,
                SystemKind::Primitive,
                SystemKind::DebugBounds,
            ],
            Self::Camera => &[SystemKind::Camera],
        }
    }
}

/// A component owned by an actor.
#[derive(Debug, Clone)]
pub enum Component {
    Transform(TransformComponent),
    InstancedTransform(InstancedTransformComponent),
    Primitive(PrimitiveComponent),
    Camera(CameraComponent),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Transform(_) => ComponentKind::Transform,
            Self::InstancedTransform(_) => ComponentKind::InstancedTransform,
            Self::Primitive(_) => ComponentKind::Primitive,
            Self::Camera(_) => ComponentKind::Camera,
        }
    }

    pub fn as_transform(&self) -> Option<&TransformComponent> {
        match self {
            Self::Transform(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_instanced(&self) -> Option<&InstancedTransformComponent> {
        match self {
            Self::InstancedTransform(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveComponent> {
        match self {
            Self::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_primitive_mut(&mut self) -> Option<&mut PrimitiveComponent> {
        match self {
            Self::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_camera(&self) -> Option<&CameraComponent> {
        match self {
            Self::Camera(c) => Some(c),
            _ => None,
        }
    }
}

impl From<TransformComponent> for Component {
    fn from(c: TransformComponent) -> Self {
        Self::Transform(c)
    }
}

impl From<InstancedTransformComponent> for Component {
    fn from(c: InstancedTransformComponent) -> Self {
        Self::InstancedTransform(c)
    }
}

impl From<PrimitiveComponent> for Component {
    fn from(c: PrimitiveComponent) -> Self {
        Self::Primitive(c)
    }
}

impl From<CameraComponent> for Component {
    fn from(c: CameraComponent) -> Self {
        Self::Camera(c)
    }
}
