//! The actor arena and hierarchy.
//!
//! Actors live in a `hecs` world; parent and child links are plain
//! [`ActorId`] handles, so the only owner of an actor is the arena. An actor
//! is either connected to the scene (a root, or below one) or standalone.
//! Hierarchy edits report which actors entered or left the scene so the
//! caller can register or release their components.

use glam::Mat4;
use uuid::Uuid;

use crate::actor::{Actor, ActorId, DirtyFlags};
use crate::component::{Component, ComponentKind};
use crate::error::{Result, SceneError};
use crate::transform::TransformComponent;

/// Actors whose scene membership changed in one hierarchy edit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Newly connected, parents before children.
    pub entered: Vec<ActorId>,
    /// Newly disconnected, parents before children.
    pub left: Vec<ActorId>,
}

/// Scene graph.
#[derive(Default)]
pub struct Scene {
    world: hecs::World,
    roots: Vec<ActorId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a standalone actor.
    pub fn spawn(&mut self, name: impl Into<String>, transform: TransformComponent) -> ActorId {
        let entity = self.world.spawn((Actor::new(name.into(), transform),));
        let id = ActorId(entity);
        if let Ok(actor) = self.world.query_one_mut::<&mut Actor>(entity) {
            actor.id = id;
        }
        tracing::trace!(actor = %id, "actor spawned");
        id
    }

    /// Number of actors, standalone ones included.
    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.world.contains(id.0)
    }

    pub fn actor(&self, id: ActorId) -> Result<hecs::Ref<'_, Actor>> {
        self.world
            .get::<&Actor>(id.0)
            .map_err(|_| SceneError::UnknownActor(id))
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Result<&mut Actor> {
        self.world
            .query_one_mut::<&mut Actor>(id.0)
            .map_err(|_| SceneError::UnknownActor(id))
    }

    pub fn roots(&self) -> &[ActorId] {
        &self.roots
    }

    pub fn find_by_guid(&self, guid: Uuid) -> Option<ActorId> {
        self.world
            .query::<&Actor>()
            .iter()
            .find(|(_, actor)| actor.guid() == guid)
            .map(|(entity, _)| ActorId(entity))
    }

    /// `id` and all its descendants, parents before children.
    pub fn subtree(&self, id: ActorId) -> Result<Vec<ActorId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let actor = self.actor(next)?;
            out.push(next);
            stack.extend(actor.children.iter().rev());
        }
        Ok(out)
    }

    /// Every connected actor, parents before children.
    pub fn connected(&self) -> Vec<ActorId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            if let Ok(subtree) = self.subtree(root) {
                out.extend(subtree);
            }
        }
        out
    }

    /// Move `child` under `parent`, or to the scene root when `parent` is
    /// `None`. The child's subtree is marked dirty.
    pub fn attach(&mut self, child: ActorId, parent: Option<ActorId>) -> Result<Membership> {
        let was_in_scene = self.actor(child)?.in_scene;
        let now_in_scene = match parent {
            Some(parent) => {
                let parent_in_scene = self.actor(parent)?.in_scene;
                if self.subtree(child)?.contains(&parent) {
                    return Err(SceneError::CycleDetected { child, parent });
                }
                parent_in_scene
            }
            None => true,
        };

        self.unlink(child)?;
        match parent {
            Some(parent) => self.actor_mut(parent)?.children.push(child),
            None => self.roots.push(child),
        }
        let actor = self.actor_mut(child)?;
        actor.parent = parent;
        actor.mark_dirty(DirtyFlags::all());

        self.membership_change(child, was_in_scene, now_in_scene)
    }

    /// Make `child` standalone. Returns the actors that left the scene.
    pub fn detach(&mut self, child: ActorId) -> Result<Vec<ActorId>> {
        let was_in_scene = self.actor(child)?.in_scene;
        self.unlink(child)?;
        self.actor_mut(child)?.mark_dirty(DirtyFlags::all());
        Ok(self.membership_change(child, was_in_scene, false)?.left)
    }

    /// Remove `id` and its subtree from the arena, returning the actors.
    pub fn despawn(&mut self, id: ActorId) -> Result<Vec<Actor>> {
        self.detach(id)?;
        let subtree = self.subtree(id)?;
        let mut removed = Vec::with_capacity(subtree.len());
        for actor_id in subtree {
            let actor = self
                .world
                .remove_one::<Actor>(actor_id.0)
                .map_err(|_| SceneError::UnknownActor(actor_id))?;
            let _ = self.world.despawn(actor_id.0);
            removed.push(actor);
        }
        Ok(removed)
    }

    pub fn add_component(&mut self, id: ActorId, component: Component) -> Result<ComponentKind> {
        self.actor_mut(id)?.add_component(component)
    }

    /// Remove a component. The transform can never be removed.
    pub fn remove_component(&mut self, id: ActorId, kind: ComponentKind) -> Result<Component> {
        self.actor_mut(id)?.remove_component(kind)
    }

    /// Recompute world matrices of every connected actor whose transform, or
    /// an ancestor's, is dirty. Recomputed actors get their instance data
    /// marked dirty; the transform flag is cleared only once the whole pass is
    /// done. Returns the number of actors recomputed.
    pub fn update_world_matrices(&mut self) -> usize {
        let mut stack: Vec<(ActorId, Mat4, bool)> = self
            .roots
            .iter()
            .rev()
            .map(|&root| (root, Mat4::IDENTITY, false))
            .collect();
        let mut recomputed = Vec::new();

        while let Some((id, parent_world, parent_changed)) = stack.pop() {
            let Ok(actor) = self.world.query_one_mut::<&mut Actor>(id.0) else {
                continue;
            };

            let changed = parent_changed || actor.dirty().contains(DirtyFlags::TRANSFORM);
            let world = if changed {
                let world = actor.transform_mut().update_world_matrix(parent_world);
                if let Some(instanced) = actor.instanced_mut() {
                    instanced.update_world_matrices(parent_world);
                }
                actor.mark_dirty(DirtyFlags::INSTANCES);
                recomputed.push(id);
                world
            } else {
                actor.world_matrix()
            };

            stack.extend(actor.children.iter().rev().map(|&child| (child, world, changed)));
        }

        for &id in &recomputed {
            if let Ok(actor) = self.world.query_one_mut::<&mut Actor>(id.0) {
                actor.clear_dirty(DirtyFlags::TRANSFORM);
            }
        }
        recomputed.len()
    }

    fn unlink(&mut self, child: ActorId) -> Result<()> {
        let parent = self.actor(child)?.parent;
        match parent {
            Some(parent) => self.actor_mut(parent)?.children.retain(|&c| c != child),
            None => self.roots.retain(|&r| r != child),
        }
        self.actor_mut(child)?.parent = None;
        Ok(())
    }

    fn membership_change(
        &mut self,
        root: ActorId,
        was_in_scene: bool,
        now_in_scene: bool,
    ) -> Result<Membership> {
        let mut change = Membership::default();
        if was_in_scene == now_in_scene {
            return Ok(change);
        }

        let subtree = self.subtree(root)?;
        for &id in &subtree {
            self.actor_mut(id)?.in_scene = now_in_scene;
        }
        if now_in_scene {
            change.entered = subtree;
        } else {
            change.left = subtree;
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::InstancedTransformComponent;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn at(x: f32) -> TransformComponent {
        TransformComponent::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn attach_reports_entered_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", at(0.0));
        let child = scene.spawn("child", at(1.0));
        let grandchild = scene.spawn("grandchild", at(2.0));

        // Standalone hierarchy: nothing enters yet.
        assert!(scene.attach(grandchild, Some(child)).unwrap().entered.is_empty());
        assert!(scene.attach(child, Some(root)).unwrap().entered.is_empty());

        let change = scene.attach(root, None).unwrap();
        assert_eq!(change.entered, vec![root, child, grandchild]);
        assert!(scene.actor(grandchild).unwrap().is_in_scene());
        assert_eq!(scene.roots(), &[root]);
    }

    #[test]
    fn reparent_within_scene_keeps_membership() {
        let mut scene = Scene::new();
        let a = scene.spawn("a", at(0.0));
        let b = scene.spawn("b", at(0.0));
        let c = scene.spawn("c", at(0.0));
        scene.attach(a, None).unwrap();
        scene.attach(b, None).unwrap();
        scene.attach(c, Some(a)).unwrap();

        let change = scene.attach(c, Some(b)).unwrap();
        assert_eq!(change, Membership::default());
        assert!(scene.actor(a).unwrap().children().is_empty());
        assert_eq!(scene.actor(b).unwrap().children(), &[c]);
        assert_eq!(scene.actor(c).unwrap().parent(), Some(b));
    }

    #[test]
    fn detach_reports_left_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", at(0.0));
        let child = scene.spawn("child", at(0.0));
        scene.attach(root, None).unwrap();
        scene.attach(child, Some(root)).unwrap();

        let left = scene.detach(root).unwrap();
        assert_eq!(left, vec![root, child]);
        assert!(scene.roots().is_empty());
        assert!(!scene.actor(child).unwrap().is_in_scene());
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut scene = Scene::new();
        let a = scene.spawn("a", at(0.0));
        let b = scene.spawn("b", at(0.0));
        scene.attach(b, Some(a)).unwrap();

        assert_eq!(
            scene.attach(a, Some(b)).unwrap_err(),
            SceneError::CycleDetected { child: a, parent: b }
        );
        assert_eq!(
            scene.attach(a, Some(a)).unwrap_err(),
            SceneError::CycleDetected { child: a, parent: a }
        );
    }

    #[test]
    fn despawn_removes_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", at(0.0));
        let child = scene.spawn("child", at(0.0));
        scene.attach(root, None).unwrap();
        scene.attach(child, Some(root)).unwrap();

        let removed = scene.despawn(root).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[1].name(), "child");
        assert!(!scene.contains(child));
        assert!(scene.is_empty());
        assert_eq!(scene.actor(child).unwrap_err(), SceneError::UnknownActor(child));
    }

    #[test]
    fn transform_cannot_be_removed() {
        let mut scene = Scene::new();
        let actor = scene.spawn("actor", at(0.0));
        assert_eq!(
            scene
                .remove_component(actor, ComponentKind::Transform)
                .unwrap_err(),
            SceneError::TransformRequired(actor)
        );
        assert!(matches!(
            scene.add_component(actor, TransformComponent::default().into()),
            Err(SceneError::DuplicateComponent { .. })
        ));
    }

    #[test]
    fn dirty_propagates_through_subtree() {
        let mut scene = Scene::new();
        let parent = scene.spawn("parent", at(1.0));
        let child = scene.spawn("child", at(2.0));
        let other = scene.spawn("other", at(5.0));
        scene.attach(parent, None).unwrap();
        scene.attach(other, None).unwrap();
        scene.attach(child, Some(parent)).unwrap();
        assert_eq!(scene.update_world_matrices(), 3);

        for id in [parent, child, other] {
            let actor = scene.actor_mut(id).unwrap();
            assert!(!actor.dirty().contains(DirtyFlags::TRANSFORM));
            actor.clear_dirty(DirtyFlags::INSTANCES);
            assert!(!actor.is_dirty());
        }

        scene.actor_mut(parent).unwrap().set_position(Vec3::new(10.0, 0.0, 0.0));
        assert!(scene.actor(parent).unwrap().dirty().contains(DirtyFlags::TRANSFORM));
        assert!(!scene.actor(child).unwrap().is_dirty());

        assert_eq!(scene.update_world_matrices(), 2);
        let child_actor = scene.actor(child).unwrap();
        assert_relative_eq!(child_actor.world_matrix().w_axis.x, 12.0);
        assert_eq!(child_actor.dirty(), DirtyFlags::INSTANCES);
        drop(child_actor);
        assert!(!scene.actor(other).unwrap().is_dirty());
    }

    #[test]
    fn instanced_transforms_follow_parent() {
        let mut scene = Scene::new();
        let parent = scene.spawn("parent", at(0.0));
        let actor = scene.spawn("instanced", at(1.0));
        scene.attach(parent, None).unwrap();
        scene.attach(actor, Some(parent)).unwrap();
        scene
            .add_component(
                actor,
                InstancedTransformComponent::new(vec![Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0))])
                    .into(),
            )
            .unwrap();
        assert_eq!(scene.actor(actor).unwrap().instance_count(), 2);

        scene.actor_mut(parent).unwrap().set_position(Vec3::new(0.0, 4.0, 0.0));
        scene.update_world_matrices();

        let worlds = scene.actor(actor).unwrap().instance_world_matrices();
        assert_eq!(worlds.len(), 2);
        assert_relative_eq!(worlds[0].w_axis.x, 1.0);
        assert_relative_eq!(worlds[1].w_axis.x, 3.0);
        assert_relative_eq!(worlds[1].w_axis.y, 4.0);
    }

    #[test]
    fn find_by_guid_locates_actor() {
        let mut scene = Scene::new();
        let id = scene.spawn("target", at(0.0));
        let guid = scene.actor(id).unwrap().guid();
        assert_eq!(scene.find_by_guid(guid), Some(id));
    }
}
