//! Mesh drawing through one indirect batch.

use std::sync::Arc;

use scenic_core::RenderConfig;
use scenic_gpu::{BufferBackend, BufferUsageReport, InstanceData};
use scenic_scene::{
    Actor, ActorId, ComponentKind, DirtyFlags, MeshVertex, Scene, SceneError, SystemKind,
};

use crate::error::Result;
use crate::recorder::DrawRecorder;
use crate::resources::IndirectResources;
use crate::system::{priority, FrameState, System};

type Batch<B> = IndirectResources<MeshVertex, InstanceData, B>;

/// Places every adopted primitive in a shared batch and keeps its instance
/// data and visibility current.
pub struct PrimitiveSystem<B: BufferBackend> {
    batch: Batch<B>,
    actors: Vec<ActorId>,
}

impl<B: BufferBackend> PrimitiveSystem<B> {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            batch: IndirectResources::new("primitives", config),
            actors: Vec::new(),
        }
    }

    pub fn batch(&self) -> &Batch<B> {
        &self.batch
    }
}

fn instance_data(actor: &Actor, aux: [u32; 4]) -> Vec<InstanceData> {
    actor
        .instance_world_matrices()
        .into_iter()
        .map(|world| InstanceData::from_world(world).with_aux(aux))
        .collect()
}

/// Upload the active LOD of `actor`'s primitive.
fn generate<B: BufferBackend>(batch: &mut Batch<B>, backend: &mut B, actor: &mut Actor) -> Result<()> {
    let id = actor.id();
    let primitive = actor.primitive().ok_or(SceneError::MissingComponent {
        actor: id,
        kind: ComponentKind::Primitive,
    })?;
    let lod = primitive
        .active()
        .ok_or(SceneError::InvalidLod(primitive.active_lod()))?;
    let geometry = Arc::clone(&lod.geometry);
    let sections = lod.sections.clone();
    let instances = instance_data(actor, primitive.instance_aux());

    let draw = batch.add(
        backend,
        geometry.vertices(),
        geometry.indices(),
        &sections,
        &instances,
    )?;
    if let Some(primitive) = actor.primitive_mut() {
        primitive.set_draw(draw);
    }
    // Visibility is applied by the next refresh.
    actor.mark_dirty(DirtyFlags::INSTANCES);
    tracing::debug!(actor = %id, name = actor.name(), "primitive generated");
    Ok(())
}

impl<B: BufferBackend> System<B> for PrimitiveSystem<B> {
    fn kind(&self) -> SystemKind {
        SystemKind::Primitive
    }

    fn priority(&self) -> i32 {
        priority::PRIMITIVE
    }

    fn adopt(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()> {
        let entry = scene.actor_mut(actor)?;
        if !entry.primitive().is_some_and(|p| p.is_generated()) {
            generate(&mut self.batch, backend, entry)?;
        }
        self.actors.push(actor);
        Ok(())
    }

    fn release(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()> {
        self.actors.retain(|&a| a != actor);
        let draw = scene
            .actor_mut(actor)?
            .primitive_mut()
            .and_then(|primitive| primitive.take_draw());
        if let Some(draw) = draw {
            self.batch.remove(backend, &draw)?;
        }
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn update(&mut self, scene: &mut Scene, _frame: &mut FrameState, backend: &mut B) -> Result<()> {
        for &id in &self.actors {
            let actor = scene.actor_mut(id)?;
            let Some(generated) = actor.primitive().map(|p| p.is_generated()) else {
                continue;
            };
            if !generated {
                generate(&mut self.batch, backend, actor)?;
            }
            if actor.dirty().contains(DirtyFlags::INSTANCES) {
                let aux = actor.primitive().map_or([0; 4], |p| p.instance_aux());
                let instances = instance_data(actor, aux);
                self.batch.update(backend, actor, &instances)?;
            }
        }
        self.batch.end_frame(backend)
    }

    fn render(
        &self,
        _scene: &Scene,
        _frame: &FrameState,
        backend: &B,
        recorder: &mut dyn DrawRecorder,
    ) -> Result<()> {
        self.batch.render(backend, recorder)
    }

    fn is_renderable(&self, _frame: &FrameState) -> bool {
        true
    }

    fn tracked(&self) -> usize {
        self.actors.len()
    }

    fn memory_report(&self) -> Vec<BufferUsageReport> {
        self.batch.memory_report()
    }

    fn destroy(&mut self, backend: &mut B) -> Result<()> {
        self.batch.destroy(backend)
    }
}
