//! Per-instance frustum culling.

use scenic_core::{Frustum, InstanceRange};
use scenic_gpu::BufferBackend;
use scenic_scene::{Actor, ActorId, Scene, SystemKind};

use crate::error::Result;
use crate::system::{priority, FrameState, System};

/// Narrows each primitive actor's visible instances to the tightest range
/// covering every instance whose world bounds touch the camera frustum.
#[derive(Debug, Default)]
pub struct CullingSystem {
    actors: Vec<ActorId>,
}

impl CullingSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Visible range of `actor` against `frustum`; the full range when there is
/// nothing to test.
pub(crate) fn visible_range(actor: &Actor, frustum: Option<&Frustum>) -> InstanceRange {
    let full = InstanceRange::full(actor.instance_count());
    let (Some(frustum), Some(primitive)) = (frustum, actor.primitive()) else {
        return full;
    };
    let bounds = primitive.bounds();
    if bounds.is_empty() {
        return full;
    }

    let mut visible: Option<(u32, u32)> = None;
    for (i, world) in actor.instance_world_matrices().into_iter().enumerate() {
        if frustum.test_aabb(&bounds.transform(world)) {
            let i = i as u32;
            visible = Some(visible.map_or((i, i), |(first, _)| (first, i)));
        }
    }
    visible.map_or(InstanceRange::EMPTY, |(first, last)| {
        InstanceRange::new(first, last + 1)
    })
}

impl<B: BufferBackend> System<B> for CullingSystem {
    fn kind(&self) -> SystemKind {
        SystemKind::Culling
    }

    fn priority(&self) -> i32 {
        priority::CULLING
    }

    fn adopt(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.actors.push(actor);
        Ok(())
    }

    fn release(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.actors.retain(|&a| a != actor);
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn update(&mut self, scene: &mut Scene, frame: &mut FrameState, _backend: &mut B) -> Result<()> {
        let frustum = frame.camera.as_ref().map(|view| view.frustum);
        for &id in &self.actors {
            let actor = scene.actor_mut(id)?;
            let range = visible_range(actor, frustum.as_ref());
            actor.set_visible_instances(range);
        }
        Ok(())
    }

    fn tracked(&self) -> usize {
        self.actors.len()
    }
}
