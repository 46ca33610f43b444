//! Actors: named nodes of the scene graph that own components.

use std::fmt;

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use scenic_core::InstanceRange;
use uuid::Uuid;

use crate::camera::CameraComponent;
use crate::component::{Component, ComponentKind};
use crate::error::{Result, SceneError};
use crate::primitive::PrimitiveComponent;
use crate::transform::{InstancedTransformComponent, TransformComponent};

/// Handle of an actor in the scene arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorId(pub(crate) hecs::Entity);

impl ActorId {
    /// Underlying arena entity.
    pub fn entity(self) -> hecs::Entity {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.id())
    }
}

bitflags! {
    /// Cached state of an actor that is stale.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u8 {
        /// World matrices need recomputing.
        const TRANSFORM = 1 << 0;
        /// GPU instance data and instance counts need rewriting.
        const INSTANCES = 1 << 1;
    }
}

/// A node of the scene graph.
///
/// Every actor has exactly one transform; other components are held in
/// insertion order, at most one per kind.
#[derive(Debug, Clone)]
pub struct Actor {
    pub(crate) id: ActorId,
    guid: Uuid,
    name: String,
    dirty: DirtyFlags,
    visible_instances: InstanceRange,
    hidden: bool,
    pub(crate) parent: Option<ActorId>,
    pub(crate) children: Vec<ActorId>,
    pub(crate) in_scene: bool,
    transform: TransformComponent,
    components: Vec<Component>,
}

impl Actor {
    pub(crate) fn new(name: String, transform: TransformComponent) -> Self {
        Self {
            id: ActorId(hecs::Entity::DANGLING),
            guid: Uuid::new_v4(),
            name,
            dirty: DirtyFlags::all(),
            visible_instances: InstanceRange::full(1),
            hidden: false,
            parent: None,
            children: Vec::new(),
            in_scene: false,
            transform,
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn parent(&self) -> Option<ActorId> {
        self.parent
    }

    pub fn children(&self) -> &[ActorId] {
        &self.children
    }

    /// Whether the actor is connected to the scene root.
    pub fn is_in_scene(&self) -> bool {
        self.in_scene
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    pub fn clear_dirty(&mut self, flags: DirtyFlags) {
        self.dirty -= flags;
    }

    /// Instances currently drawn, within `[0, instance_count)`.
    pub fn visible_instances(&self) -> InstanceRange {
        self.visible_instances
    }

    /// Change the drawn instances; marks instance data dirty on change.
    pub fn set_visible_instances(&mut self, range: InstanceRange) {
        if range != self.visible_instances {
            self.visible_instances = range;
            self.dirty |= DirtyFlags::INSTANCES;
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hide every instance regardless of the visible range culling writes.
    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden != self.hidden {
            self.hidden = hidden;
            self.dirty |= DirtyFlags::INSTANCES;
        }
    }

    /// Instances the draw commands cover: the visible range unless hidden.
    pub fn drawn_instances(&self) -> InstanceRange {
        if self.hidden {
            InstanceRange::EMPTY
        } else {
            self.visible_instances
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.drawn_instances().is_empty()
    }

    pub fn transform(&self) -> &TransformComponent {
        &self.transform
    }

    pub(crate) fn transform_mut(&mut self) -> &mut TransformComponent {
        &mut self.transform
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.dirty |= DirtyFlags::all();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.dirty |= DirtyFlags::all();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.dirty |= DirtyFlags::all();
    }

    /// World matrix as of the last propagation.
    pub fn world_matrix(&self) -> Mat4 {
        self.transform.world_matrix()
    }

    /// The actor itself plus one per extra instanced transform.
    pub fn instance_count(&self) -> u32 {
        1 + self.instanced().map_or(0, |i| i.len() as u32)
    }

    /// World matrix of every instance, the actor's own first.
    pub fn instance_world_matrices(&self) -> Vec<Mat4> {
        let mut worlds = vec![self.world_matrix()];
        if let Some(instanced) = self.instanced() {
            worlds.extend_from_slice(instanced.world_matrices());
        }
        worlds
    }

    /// Replace the extra instance transforms.
    pub fn set_instance_locals(&mut self, locals: Vec<Mat4>) -> Result<()> {
        let id = self.id;
        let instanced = self
            .components
            .iter_mut()
            .find_map(|c| match c {
                Component::InstancedTransform(i) => Some(i),
                _ => None,
            })
            .ok_or(SceneError::MissingComponent {
                actor: id,
                kind: ComponentKind::InstancedTransform,
            })?;
        *instanced.locals_mut() = locals;
        self.instances_changed();
        Ok(())
    }

    /// Kinds of every component, the transform first.
    pub fn component_kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        std::iter::once(ComponentKind::Transform).chain(self.components.iter().map(Component::kind))
    }

    pub fn has_component(&self, kind: ComponentKind) -> bool {
        kind == ComponentKind::Transform || self.component(kind).is_some()
    }

    /// Non-transform component of `kind`.
    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind() == kind)
    }

    pub fn instanced(&self) -> Option<&InstancedTransformComponent> {
        self.components.iter().find_map(Component::as_instanced)
    }

    pub(crate) fn instanced_mut(&mut self) -> Option<&mut InstancedTransformComponent> {
        self.components.iter_mut().find_map(|c| match c {
            Component::InstancedTransform(i) => Some(i),
            _ => None,
        })
    }

    pub fn primitive(&self) -> Option<&PrimitiveComponent> {
        self.components.iter().find_map(Component::as_primitive)
    }

    pub fn primitive_mut(&mut self) -> Option<&mut PrimitiveComponent> {
        self.components.iter_mut().find_map(Component::as_primitive_mut)
    }

    pub fn camera(&self) -> Option<&CameraComponent> {
        self.components.iter().find_map(Component::as_camera)
    }

    pub fn camera_mut(&mut self) -> Option<&mut CameraComponent> {
        self.components.iter_mut().find_map(|c| match c {
            Component::Camera(camera) => Some(camera),
            _ => None,
        })
    }

    pub(crate) fn add_component(&mut self, component: Component) -> Result<ComponentKind> {
        let kind = component.kind();
        if self.has_component(kind) {
            return Err(SceneError::DuplicateComponent {
                actor: self.id,
                kind,
            });
        }
        self.components.push(component);
        if kind == ComponentKind::InstancedTransform {
            self.instances_changed();
        }
        Ok(kind)
    }

    pub(crate) fn remove_component(&mut self, kind: ComponentKind) -> Result<Component> {
        if kind == ComponentKind::Transform {
            return Err(SceneError::TransformRequired(self.id));
        }
        let position = self
            .components
            .iter()
            .position(|c| c.kind() == kind)
            .ok_or(SceneError::MissingComponent {
                actor: self.id,
                kind,
            })?;
        let removed = self.components.remove(position);
        if kind == ComponentKind::InstancedTransform {
            self.instances_changed();
        }
        Ok(removed)
    }

    fn instances_changed(&mut self) {
        self.visible_instances = InstanceRange::full(self.instance_count());
        self.dirty |= DirtyFlags::all();
    }
}
