//! The scene plus the systems that render it.
//!
//! Hierarchy and component edits go through [`World`] so system
//! registration follows them directly: actors entering the scene have their
//! components queued for adoption, actors leaving it are released before
//! anything is torn down.

use scenic_core::RenderConfig;
use scenic_gpu::{BufferBackend, BufferUsageReport};
use scenic_scene::{Actor, ActorId, Component, ComponentKind, Scene, SceneError, TransformComponent};

use crate::error::Result;
use crate::manager::SystemManager;
use crate::recorder::DrawRecorder;
use crate::registry::SystemRegistry;
use crate::system::FrameState;
use crate::texture::TextureStreamer;

/// Scene graph, system pipeline, and per-frame state.
pub struct World<B: BufferBackend + 'static> {
    scene: Scene,
    systems: SystemManager<B>,
    frame: FrameState,
    textures: Option<TextureStreamer>,
}

impl<B: BufferBackend + 'static> World<B> {
    /// World with the built-in systems.
    pub fn new(config: RenderConfig) -> Result<Self> {
        Self::with_registry(config, SystemRegistry::with_defaults())
    }

    pub fn with_registry(config: RenderConfig, registry: SystemRegistry<B>) -> Result<Self> {
        config.validate()?;
        let frame = FrameState {
            debug_overlay: config.debug_overlay,
            ..FrameState::default()
        };
        Ok(Self {
            scene: Scene::new(),
            systems: SystemManager::new(registry, config),
            frame,
            textures: None,
        })
    }

    /// Stream textures through `streamer`, pumped once per tick.
    #[must_use]
    pub fn with_textures(mut self, streamer: TextureStreamer) -> Self {
        self.textures = Some(streamer);
        self
    }

    /// Stream textures through a streamer built from the world's config.
    pub fn with_texture_streaming(self) -> Result<Self> {
        let streamer = TextureStreamer::from_config(self.systems.config())?;
        Ok(self.with_textures(streamer))
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn systems(&self) -> &SystemManager<B> {
        &self.systems
    }

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn textures(&self) -> Option<&TextureStreamer> {
        self.textures.as_ref()
    }

    pub fn textures_mut(&mut self) -> Option<&mut TextureStreamer> {
        self.textures.as_mut()
    }

    pub fn set_debug_overlay(&mut self, enabled: bool) {
        self.frame.debug_overlay = enabled;
    }

    /// Mutable access to an actor's transform, name, and visibility.
    /// Components are added and removed through the world.
    pub fn actor_mut(&mut self, id: ActorId) -> Result<&mut Actor> {
        Ok(self.scene.actor_mut(id)?)
    }

    /// Create a standalone actor.
    pub fn spawn_actor(&mut self, name: impl Into<String>, transform: TransformComponent) -> ActorId {
        self.scene.spawn(name, transform)
    }

    /// Move `child` under `parent`, or to the root when `parent` is `None`.
    pub fn attach(&mut self, child: ActorId, parent: Option<ActorId>, backend: &mut B) -> Result<()> {
        let membership = self.scene.attach(child, parent)?;
        for &id in &membership.left {
            self.systems.deregister_actor(&mut self.scene, id, backend)?;
        }
        for &id in &membership.entered {
            self.systems.register_actor(&self.scene, id)?;
        }
        Ok(())
    }

    /// Disconnect `child` and its subtree from the scene.
    pub fn detach(&mut self, child: ActorId, backend: &mut B) -> Result<()> {
        // Release while still connected so systems see the live components.
        for id in self.scene.subtree(child)? {
            if self.scene.actor(id)?.is_in_scene() {
                self.systems.deregister_actor(&mut self.scene, id, backend)?;
            }
        }
        self.scene.detach(child)?;
        Ok(())
    }

    /// Remove an actor and its subtree for good.
    pub fn destroy(&mut self, id: ActorId, backend: &mut B) -> Result<Vec<Actor>> {
        self.detach(id, backend)?;
        let removed = self.scene.despawn(id)?;
        tracing::debug!(actor = %id, count = removed.len(), "actors destroyed");
        Ok(removed)
    }

    pub fn add_component(&mut self, id: ActorId, component: Component) -> Result<()> {
        let kind = self.scene.add_component(id, component)?;
        if self.scene.actor(id)?.is_in_scene() {
            self.systems.register_component(id, kind)?;
        }
        Ok(())
    }

    /// Remove a component, releasing it from its systems first. The
    /// transform cannot be removed.
    pub fn remove_component(
        &mut self,
        id: ActorId,
        kind: ComponentKind,
        backend: &mut B,
    ) -> Result<Component> {
        let in_scene = {
            let actor = self.scene.actor(id)?;
            if kind == ComponentKind::Transform {
                return Err(SceneError::TransformRequired(id).into());
            }
            if !actor.has_component(kind) {
                return Err(SceneError::MissingComponent { actor: id, kind }.into());
            }
            actor.is_in_scene()
        };
        if in_scene {
            self.systems
                .deregister_component(&mut self.scene, id, kind, backend)?;
        }
        Ok(self.scene.remove_component(id, kind)?)
    }

    /// Run one update phase.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn tick(&mut self, backend: &mut B) -> Result<()> {
        self.frame.frame_number += 1;
        if let Some(textures) = &self.textures {
            textures.pump();
        }
        self.systems.tick(&mut self.scene, &mut self.frame, backend)
    }

    /// Run the render phase.
    pub fn render(&self, backend: &B, recorder: &mut dyn DrawRecorder) -> Result<()> {
        self.systems
            .render(&self.scene, &self.frame, backend, recorder)
    }

    pub fn memory_report(&self) -> Vec<BufferUsageReport> {
        self.systems.memory_report()
    }

    /// Free every GPU resource held by the systems.
    pub fn shutdown(&mut self, backend: &mut B) -> Result<()> {
        if let Some(textures) = &mut self.textures {
            textures.shutdown();
        }
        self.systems.shutdown(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::recorder::RecordingRecorder;
    use approx::assert_relative_eq;
    use glam::{Mat4, Vec3};
    use scenic_core::InstanceRange;
    use scenic_gpu::HostBackend;
    use scenic_scene::{
        CameraComponent, DirtyFlags, InstancedTransformComponent, PrimitiveComponent,
        PrimitiveGeometry, SystemKind,
    };
    use std::sync::Arc;

    fn config() -> RenderConfig {
        RenderConfig::default().with_initial_capacities(256, 1024, 16, 16)
    }

    fn cube() -> Component {
        let (cube, sections) = PrimitiveGeometry::cube(0.5);
        PrimitiveComponent::new(Arc::new(cube), sections).into()
    }

    fn spawn_cube(world: &mut World<HostBackend>, backend: &mut HostBackend, x: f32) -> ActorId {
        let id = world.spawn_actor("cube", TransformComponent::from_position(Vec3::X * x));
        world.add_component(id, cube()).unwrap();
        world.attach(id, None, backend).unwrap();
        id
    }

    fn primitive_draws(world: &World<HostBackend>, backend: &HostBackend) -> u32 {
        let mut recorder = RecordingRecorder::new();
        world.render(backend, &mut recorder).unwrap();
        recorder.total_draw_count()
    }

    #[test]
    fn adoption_is_spread_over_ticks() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config().with_adoption_budget(2)).unwrap();
        for i in 0..5 {
            spawn_cube(&mut world, &mut backend, i as f32);
        }
        assert_eq!(world.systems().pending(SystemKind::Primitive), 5);

        world.tick(&mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 2);
        world.tick(&mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 4);
        world.tick(&mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 5);
        assert_eq!(world.systems().pending(SystemKind::Primitive), 0);
    }

    #[test]
    fn standalone_actors_are_not_adopted() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = world.spawn_actor("loose", TransformComponent::default());
        world.add_component(id, cube()).unwrap();
        world.tick(&mut backend).unwrap();

        assert!(world.systems().system_kinds().is_empty());
        assert!(!world
            .scene()
            .actor(id)
            .unwrap()
            .primitive()
            .unwrap()
            .is_generated());
    }

    #[test]
    fn tick_generates_and_renders_sections() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let a = spawn_cube(&mut world, &mut backend, 0.0);
        let _b = spawn_cube(&mut world, &mut backend, 3.0);
        world.tick(&mut backend).unwrap();

        let actor = world.scene().actor(a).unwrap();
        let draw = actor.primitive().unwrap().draw().unwrap().clone();
        assert_eq!(draw.instance_count, 1);
        assert!(!actor.dirty().contains(DirtyFlags::INSTANCES));
        drop(actor);

        let sections = PrimitiveGeometry::cube(0.5).1.len() as u32;
        assert_eq!(primitive_draws(&world, &backend), 2 * sections);
    }

    #[test]
    fn culling_restores_visibility_without_camera() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();
        let created = backend.created_count();

        // Culling owns visibility; without a camera it restores the full range.
        world.actor_mut(id).unwrap().set_visible_instances(InstanceRange::EMPTY);
        assert!(!world.actor_mut(id).unwrap().is_visible());
        world.tick(&mut backend).unwrap();

        let actor = world.scene().actor(id).unwrap();
        assert_eq!(actor.visible_instances(), InstanceRange::full(1));
        assert_eq!(backend.created_count(), created);
    }

    #[test]
    fn hidden_actor_stays_hidden_through_culling() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();

        world.actor_mut(id).unwrap().set_hidden(true);
        world.tick(&mut backend).unwrap();
        world.tick(&mut backend).unwrap();
        {
            let actor = world.scene().actor(id).unwrap();
            assert_eq!(actor.visible_instances(), InstanceRange::full(1));
            assert_eq!(actor.drawn_instances(), InstanceRange::EMPTY);
            assert!(!actor.is_visible());
            assert!(!actor.dirty().contains(DirtyFlags::INSTANCES));
        }

        world.actor_mut(id).unwrap().set_hidden(false);
        world.tick(&mut backend).unwrap();
        assert!(world.scene().actor(id).unwrap().is_visible());
    }

    #[test]
    fn tick_pumps_textures_within_configured_budget() {
        use crate::texture::DecodedTexture;

        let config = RenderConfig::from_toml_str("dispatcher_budget = 2").unwrap();
        let mut backend = HostBackend::new();
        let mut world = World::<HostBackend>::new(config)
            .unwrap()
            .with_texture_streaming()
            .unwrap();
        let streamer = world.textures_mut().unwrap();
        for i in 0..5 {
            streamer
                .request(format!("t{i}"), || {
                    Ok(DecodedTexture {
                        width: 1,
                        height: 1,
                        pixels: vec![0; 4],
                    })
                })
                .unwrap();
        }
        streamer.shutdown();

        let ready = |world: &World<HostBackend>| world.textures().unwrap().table().lock().ready_count();
        world.tick(&mut backend).unwrap();
        assert_eq!(ready(&world), 2);
        world.tick(&mut backend).unwrap();
        assert_eq!(ready(&world), 4);
        world.tick(&mut backend).unwrap();
        assert_eq!(ready(&world), 5);
    }

    #[test]
    fn camera_culls_instances_outside_the_frustum() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();

        let camera = world.spawn_actor(
            "camera",
            TransformComponent::from_position(Vec3::new(0.0, 0.0, 10.0)),
        );
        world
            .add_component(camera, CameraComponent::default().into())
            .unwrap();
        world.attach(camera, None, &mut backend).unwrap();

        let far = spawn_cube(&mut world, &mut backend, 0.0);
        world
            .actor_mut(far)
            .unwrap()
            .set_position(Vec3::new(0.0, 0.0, 40.0));
        let near = spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();

        let view = world.frame().camera.expect("active camera");
        assert_relative_eq!(view.position.z, 10.0);
        assert!(!world.scene().actor(far).unwrap().is_visible());
        assert!(world.scene().actor(near).unwrap().is_visible());
    }

    #[test]
    fn instanced_transform_grows_the_instance_block() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();

        let locals = vec![Mat4::from_translation(Vec3::Y), Mat4::from_translation(Vec3::Z)];
        world
            .add_component(id, InstancedTransformComponent::new(locals).into())
            .unwrap();
        world.tick(&mut backend).unwrap();

        let actor = world.scene().actor(id).unwrap();
        assert_eq!(actor.instance_count(), 3);
        assert_eq!(actor.primitive().unwrap().draw().unwrap().instance_count, 3);
    }

    #[test]
    fn debug_overlay_gates_rendering() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();
        let without = primitive_draws(&world, &backend);

        world.set_debug_overlay(true);
        world.tick(&mut backend).unwrap();
        assert_eq!(primitive_draws(&world, &backend), without + 1);
    }

    #[test]
    fn transform_cannot_be_removed() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = spawn_cube(&mut world, &mut backend, 0.0);
        let err = world
            .remove_component(id, ComponentKind::Transform, &mut backend)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Scene(SceneError::TransformRequired(_))
        ));
    }

    #[test]
    fn removing_primitive_releases_its_draws() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let id = spawn_cube(&mut world, &mut backend, 0.0);
        let _other = spawn_cube(&mut world, &mut backend, 2.0);
        world.tick(&mut backend).unwrap();

        let removed = world
            .remove_component(id, ComponentKind::Primitive, &mut backend)
            .unwrap();
        assert!(matches!(removed, Component::Primitive(ref p) if !p.is_generated()));
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 1);
        assert_eq!(world.systems().adopted(SystemKind::Transform), 2);
    }

    #[test]
    fn detach_and_destroy_release_subtrees() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let parent = spawn_cube(&mut world, &mut backend, 0.0);
        let child = world.spawn_actor("child", TransformComponent::default());
        world.add_component(child, cube()).unwrap();
        world.attach(child, Some(parent), &mut backend).unwrap();
        world.tick(&mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 2);

        world.detach(parent, &mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 0);

        world.attach(parent, None, &mut backend).unwrap();
        world.tick(&mut backend).unwrap();
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 2);

        let removed = world.destroy(parent, &mut backend).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 0);
        assert!(world.scene().is_empty());
    }

    #[test]
    fn reparenting_inside_the_scene_keeps_adoption() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        let a = spawn_cube(&mut world, &mut backend, 0.0);
        let b = spawn_cube(&mut world, &mut backend, 1.0);
        world.tick(&mut backend).unwrap();

        world.attach(b, Some(a), &mut backend).unwrap();
        assert_eq!(world.systems().pending(SystemKind::Primitive), 0);
        assert_eq!(world.systems().adopted(SystemKind::Primitive), 2);
    }

    #[test]
    fn memory_report_covers_every_batch() {
        let mut backend = HostBackend::new();
        let mut world = World::new(config()).unwrap();
        spawn_cube(&mut world, &mut backend, 0.0);
        world.tick(&mut backend).unwrap();

        let report = world.memory_report();
        assert_eq!(report.len(), 8);
        assert!(report.iter().any(|r| r.name == "primitives.vertices" && r.used_bytes > 0));

        world.shutdown(&mut backend).unwrap();
        assert_eq!(backend.live_bytes(), 0);
    }
}
