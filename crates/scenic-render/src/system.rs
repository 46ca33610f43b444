//! Per-frame systems.
//!
//! A system handles one concern for every actor holding the components it
//! cares about. Systems run in ascending priority each tick: queued actors
//! are adopted first, then [`System::update`] runs, and later
//! [`System::render`] records draws if the system is renderable.

use glam::{Mat4, Vec3};
use scenic_core::Frustum;
use scenic_gpu::{BufferBackend, BufferUsageReport};
use scenic_scene::{ActorId, Scene, SystemKind};

use crate::error::Result;
use crate::recorder::DrawRecorder;

/// Default priorities; lower runs first.
pub mod priority {
    pub const TRANSFORM: i32 = 0;
    pub const CAMERA: i32 = 100;
    pub const CULLING: i32 = 200;
    pub const PRIMITIVE: i32 = 300;
    pub const DEBUG_BOUNDS: i32 = 1000;
}

/// View of the camera driving culling this frame.
#[derive(Debug, Clone, Copy)]
pub struct CameraView {
    pub actor: ActorId,
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub frustum: Frustum,
}

impl CameraView {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// State shared by the systems of one tick.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    pub frame_number: u64,
    /// Set by the camera system; `None` disables culling.
    pub camera: Option<CameraView>,
    pub debug_overlay: bool,
}

/// One stage of the frame pipeline.
pub trait System<B: BufferBackend> {
    fn kind(&self) -> SystemKind;

    fn priority(&self) -> i32;

    /// One-time setup before the first adoption.
    fn load(&mut self, _backend: &mut B) -> Result<()> {
        Ok(())
    }

    /// Start tracking `actor`.
    fn adopt(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()>;

    /// Stop tracking `actor` and free anything held for it. The actor and
    /// its components are still present in `scene`.
    fn release(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()>;

    fn update(&mut self, scene: &mut Scene, frame: &mut FrameState, backend: &mut B)
        -> Result<()>;

    fn render(
        &self,
        _scene: &Scene,
        _frame: &FrameState,
        _backend: &B,
        _recorder: &mut dyn DrawRecorder,
    ) -> Result<()> {
        Ok(())
    }

    fn is_renderable(&self, _frame: &FrameState) -> bool {
        false
    }

    /// Actors currently adopted.
    fn tracked(&self) -> usize;

    fn memory_report(&self) -> Vec<BufferUsageReport> {
        Vec::new()
    }

    /// Free every GPU resource held by the system.
    fn destroy(&mut self, _backend: &mut B) -> Result<()> {
        Ok(())
    }
}
