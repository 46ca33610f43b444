//! Active camera selection.

use glam::Vec3;
use scenic_gpu::BufferBackend;
use scenic_scene::{ActorId, Scene, SystemKind};

use crate::error::Result;
use crate::system::{priority, CameraView, FrameState, System};

/// Publishes the view of the first active camera, in adoption order.
#[derive(Debug, Default)]
pub struct CameraSystem {
    cameras: Vec<ActorId>,
}

impl CameraSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: BufferBackend> System<B> for CameraSystem {
    fn kind(&self) -> SystemKind {
        SystemKind::Camera
    }

    fn priority(&self) -> i32 {
        priority::CAMERA
    }

    fn adopt(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.cameras.push(actor);
        Ok(())
    }

    fn release(&mut self, _scene: &mut Scene, actor: ActorId, _backend: &mut B) -> Result<()> {
        self.cameras.retain(|&camera| camera != actor);
        Ok(())
    }

    fn update(&mut self, scene: &mut Scene, frame: &mut FrameState, _backend: &mut B) -> Result<()> {
        frame.camera = None;
        for &id in &self.cameras {
            let actor = scene.actor(id)?;
            let Some(camera) = actor.camera().filter(|camera| camera.active) else {
                continue;
            };
            let world = actor.world_matrix();
            frame.camera = Some(CameraView {
                actor: id,
                position: world.transform_point3(Vec3::ZERO),
                view: camera.view_matrix(world),
                projection: camera.projection_matrix(),
                frustum: camera.frustum(world),
            });
            break;
        }
        Ok(())
    }

    fn tracked(&self) -> usize {
        self.cameras.len()
    }
}
