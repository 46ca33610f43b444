//! System lifetime and adoption scheduling.
//!
//! Systems are created lazily: the first component whose kind maps to a
//! system instantiates it from the registry. Each system keeps its own
//! queue of actors waiting to be adopted; at most `adoption_budget` of them
//! are adopted per tick so a large scene load is spread over several
//! frames.

use std::collections::VecDeque;

use hashbrown::HashSet;
use scenic_core::RenderConfig;
use scenic_gpu::{BufferBackend, BufferUsageReport};
use scenic_scene::{ActorId, ComponentKind, Scene, SystemKind};

use crate::error::{RenderError, Result};
use crate::recorder::DrawRecorder;
use crate::registry::SystemRegistry;
use crate::system::{FrameState, System};

struct SystemSlot<B: BufferBackend + 'static> {
    system: Box<dyn System<B>>,
    loaded: bool,
    queue: VecDeque<ActorId>,
    queued: HashSet<ActorId>,
    adopted: HashSet<ActorId>,
}

impl<B: BufferBackend + 'static> SystemSlot<B> {
    fn enqueue(&mut self, actor: ActorId) {
        if !self.adopted.contains(&actor) && self.queued.insert(actor) {
            self.queue.push_back(actor);
        }
    }

    fn release(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()> {
        if self.queued.remove(&actor) {
            self.queue.retain(|&queued| queued != actor);
        }
        if self.adopted.remove(&actor) {
            self.system.release(scene, actor, backend)?;
        }
        Ok(())
    }

    fn adopt_queued(&mut self, scene: &mut Scene, backend: &mut B, budget: usize) -> Result<usize> {
        let mut adopted = 0;
        while budget == 0 || adopted < budget {
            let Some(actor) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&actor);
            if !scene.actor(actor).is_ok_and(|a| a.is_in_scene()) {
                continue;
            }
            self.system.adopt(scene, actor, backend)?;
            self.adopted.insert(actor);
            adopted += 1;
        }
        Ok(adopted)
    }
}

/// Owns the running systems, ordered by priority.
pub struct SystemManager<B: BufferBackend + 'static> {
    registry: SystemRegistry<B>,
    config: RenderConfig,
    slots: Vec<SystemSlot<B>>,
}

impl<B: BufferBackend + 'static> SystemManager<B> {
    pub fn new(registry: SystemRegistry<B>, config: RenderConfig) -> Self {
        Self {
            registry,
            config,
            slots: Vec::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Kinds of the running systems in execution order.
    pub fn system_kinds(&self) -> Vec<SystemKind> {
        self.slots.iter().map(|slot| slot.system.kind()).collect()
    }

    pub fn is_running(&self, kind: SystemKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Actors waiting to be adopted by `kind`.
    pub fn pending(&self, kind: SystemKind) -> usize {
        self.slot(kind).map_or(0, |slot| slot.queue.len())
    }

    /// Actors adopted by `kind`.
    pub fn adopted(&self, kind: SystemKind) -> usize {
        self.slot(kind).map_or(0, |slot| slot.adopted.len())
    }

    pub fn system(&self, kind: SystemKind) -> Option<&dyn System<B>> {
        self.slot(kind).map(|slot| slot.system.as_ref())
    }

    /// Queue every component of a connected actor.
    pub fn register_actor(&mut self, scene: &Scene, actor: ActorId) -> Result<()> {
        let kinds: Vec<ComponentKind> = scene.actor(actor)?.component_kinds().collect();
        for kind in kinds {
            self.register_component(actor, kind)?;
        }
        Ok(())
    }

    /// Queue `actor` with every system handling `kind`, instantiating
    /// systems that are not running yet.
    pub fn register_component(&mut self, actor: ActorId, kind: ComponentKind) -> Result<()> {
        for &system in kind.systems() {
            let index = self.ensure(system)?;
            self.slots[index].enqueue(actor);
        }
        Ok(())
    }

    /// Release `actor` from the systems that only `kind` tied it to. Must
    /// run while the component is still attached.
    pub fn deregister_component(
        &mut self,
        scene: &mut Scene,
        actor: ActorId,
        kind: ComponentKind,
        backend: &mut B,
    ) -> Result<()> {
        let still_needed: Vec<SystemKind> = scene
            .actor(actor)?
            .component_kinds()
            .filter(|&k| k != kind)
            .flat_map(|k| k.systems().iter().copied())
            .collect();

        for &system in kind.systems() {
            if still_needed.contains(&system) {
                continue;
            }
            if let Some(slot) = self.slots.iter_mut().find(|s| s.system.kind() == system) {
                slot.release(scene, actor, backend)?;
            }
        }
        Ok(())
    }

    /// Release `actor` from every system.
    pub fn deregister_actor(
        &mut self,
        scene: &mut Scene,
        actor: ActorId,
        backend: &mut B,
    ) -> Result<()> {
        for slot in &mut self.slots {
            slot.release(scene, actor, backend)?;
        }
        Ok(())
    }

    /// Run every system in priority order: load once, adopt queued actors
    /// within the budget, then update.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn tick(&mut self, scene: &mut Scene, frame: &mut FrameState, backend: &mut B) -> Result<()> {
        let budget = self.config.adoption_budget;
        for slot in &mut self.slots {
            if !slot.loaded {
                slot.system.load(backend)?;
                slot.loaded = true;
                tracing::debug!(system = ?slot.system.kind(), "system loaded");
            }

            let adopted = slot.adopt_queued(scene, backend, budget)?;
            if adopted > 0 {
                tracing::trace!(
                    system = ?slot.system.kind(),
                    adopted,
                    remaining = slot.queue.len(),
                    "components adopted"
                );
            }

            slot.system.update(scene, frame, backend)?;
        }
        Ok(())
    }

    /// Record draws of every renderable system in priority order.
    pub fn render(
        &self,
        scene: &Scene,
        frame: &FrameState,
        backend: &B,
        recorder: &mut dyn DrawRecorder,
    ) -> Result<()> {
        for slot in &self.slots {
            if slot.loaded && slot.system.is_renderable(frame) {
                slot.system.render(scene, frame, backend, recorder)?;
            }
        }
        Ok(())
    }

    pub fn memory_report(&self) -> Vec<BufferUsageReport> {
        self.slots
            .iter()
            .flat_map(|slot| slot.system.memory_report())
            .collect()
    }

    /// Destroy every system's GPU resources and stop all systems.
    pub fn shutdown(&mut self, backend: &mut B) -> Result<()> {
        for mut slot in self.slots.drain(..) {
            slot.system.destroy(backend)?;
        }
        Ok(())
    }

    fn slot(&self, kind: SystemKind) -> Option<&SystemSlot<B>> {
        self.slots.iter().find(|slot| slot.system.kind() == kind)
    }

    fn ensure(&mut self, kind: SystemKind) -> Result<usize> {
        if let Some(index) = self.slots.iter().position(|s| s.system.kind() == kind) {
            return Ok(index);
        }

        let system = self
            .registry
            .create(kind, &self.config)
            .ok_or(RenderError::UnknownSystem(kind))?;
        let priority = system.priority();
        let index = self
            .slots
            .partition_point(|slot| slot.system.priority() <= priority);
        self.slots.insert(
            index,
            SystemSlot {
                system,
                loaded: false,
                queue: VecDeque::new(),
                queued: HashSet::new(),
                adopted: HashSet::new(),
            },
        );
        tracing::info!(system = ?kind, priority, "system instantiated");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenic_gpu::HostBackend;
    use scenic_scene::TransformComponent;

    fn manager(registry: SystemRegistry<HostBackend>) -> SystemManager<HostBackend> {
        SystemManager::new(registry, RenderConfig::default())
    }

    #[test]
    fn systems_are_created_on_first_use_in_priority_order() {
        let mut systems = manager(SystemRegistry::with_defaults());
        assert!(systems.system_kinds().is_empty());

        let mut scene = Scene::new();
        let actor = scene.spawn("a", TransformComponent::default());
        systems
            .register_component(actor, ComponentKind::Camera)
            .unwrap();
        assert_eq!(systems.system_kinds(), vec![SystemKind::Camera]);

        systems
            .register_component(actor, ComponentKind::Primitive)
            .unwrap();
        systems
            .register_component(actor, ComponentKind::Transform)
            .unwrap();
        assert_eq!(
            systems.system_kinds(),
            vec![
                SystemKind::Transform,
                SystemKind::Camera,
                SystemKind::Culling,
                SystemKind::Primitive,
                SystemKind::DebugBounds,
            ]
        );
    }

    #[test]
    fn missing_factory_is_an_error() {
        let mut systems = manager(SystemRegistry::empty());
        let mut scene = Scene::new();
        let actor = scene.spawn("a", TransformComponent::default());
        let err = systems
            .register_component(actor, ComponentKind::Camera)
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownSystem(SystemKind::Camera)));
    }

    #[test]
    fn duplicate_registration_queues_once() {
        let mut systems = manager(SystemRegistry::with_defaults());
        let mut scene = Scene::new();
        let actor = scene.spawn("a", TransformComponent::default());
        systems
            .register_component(actor, ComponentKind::Transform)
            .unwrap();
        systems
            .register_component(actor, ComponentKind::InstancedTransform)
            .unwrap();
        assert_eq!(systems.pending(SystemKind::Transform), 1);
    }

    #[test]
    fn release_before_adoption_dequeues() {
        let mut backend = HostBackend::new();
        let mut systems = manager(SystemRegistry::with_defaults());
        let mut scene = Scene::new();
        let actor = scene.spawn("a", TransformComponent::default());
        scene.attach(actor, None).unwrap();

        systems.register_actor(&scene, actor).unwrap();
        assert_eq!(systems.pending(SystemKind::Transform), 1);
        systems
            .deregister_actor(&mut scene, actor, &mut backend)
            .unwrap();
        assert_eq!(systems.pending(SystemKind::Transform), 0);

        let mut frame = FrameState::default();
        systems.tick(&mut scene, &mut frame, &mut backend).unwrap();
        assert_eq!(systems.adopted(SystemKind::Transform), 0);
    }
}
