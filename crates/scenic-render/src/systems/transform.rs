//! World matrix propagation.

use hashbrown::HashSet;
use scenic_gpu::BufferBackend;
use scenic_scene::{ActorId, Scene, SystemKind};

use crate::error::Result;
use crate::system::{priority, FrameState, System};

/// Recomputes world matrices of dirty subtrees once per tick.
#[derive(Debug, Default)]
pub struct TransformSystem {
    actors: HashSet<ActorId>,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: BufferBackend> System<B> for TransformSystem {
    fn kind(&self) -> SystemKind {
        SystemKind::Transform
    }

    fn priority(&self) -> i32 {
        priority::TRANSFORM
    }

    fn adopt(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.actors.insert(actor);
        Ok(())
    }

    fn release(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.actors.remove(&actor);
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn update(&mut self, scene: &mut Scene, _frame: &mut FrameState, _backend: &mut B) -> Result<()> {
        let recomputed = scene.update_world_matrices();
        if recomputed > 0 {
            tracing::trace!(recomputed, "world matrices updated");
        }
        Ok(())
    }

    fn tracked(&self) -> usize {
        self.actors.len()
    }
}
