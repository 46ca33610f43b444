//! Bounding box overlay.

use glam::{Mat4, Vec3};
use scenic_core::RenderConfig;
use scenic_gpu::{BufferBackend, BufferUsageReport, InstanceData};
use scenic_scene::{
    Actor, ActorId, IndirectDrawMetadata, MeshVertex, PrimitiveSection, Scene, SystemKind,
};

use crate::error::Result;
use crate::recorder::DrawRecorder;
use crate::resources::{GeometryRange, IndirectResources};
use crate::system::{priority, FrameState, System};

/// Corners of the unit cube `[-0.5, 0.5]^3`, bit `i` of the index selecting
/// the max side of axis `i`.
fn wire_cube() -> (Vec<MeshVertex>, Vec<u32>) {
    let vertices = (0..8u32)
        .map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            );
            MeshVertex::new(corner, corner.normalize(), [0.0, 0.0])
        })
        .collect();

    // Line list: every pair of corners differing in exactly one axis.
    let mut indices = Vec::with_capacity(24);
    for a in 0..8u32 {
        for axis in [1u32, 2, 4] {
            if a & axis == 0 {
                indices.extend([a, a | axis]);
            }
        }
    }
    (vertices, indices)
}

/// One unit-cube transform per instance, fitted to the instance's world bounds.
fn bounds_instances(actor: &Actor) -> Vec<InstanceData> {
    let bounds = actor.primitive().map(|p| p.bounds()).unwrap_or_default();
    actor
        .instance_world_matrices()
        .into_iter()
        .map(|world| {
            let world_bounds = bounds.transform(world);
            let fitted = if world_bounds.is_empty() {
                Mat4::ZERO
            } else {
                world_bounds.unit_cube_matrix()
            };
            InstanceData::from_world(fitted)
        })
        .collect()
}

/// Draws the world bounds of every primitive actor while the debug overlay
/// is enabled. Keeps its own batch so the overlay never shares draw ids with
/// the scene.
pub struct DebugBoundsSystem<B: BufferBackend> {
    batch: IndirectResources<MeshVertex, InstanceData, B>,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    section: [PrimitiveSection; 1],
    cube: Option<GeometryRange>,
    boxes: Vec<(ActorId, IndirectDrawMetadata)>,
}

impl<B: BufferBackend> DebugBoundsSystem<B> {
    pub fn new(config: &RenderConfig) -> Self {
        let (vertices, indices) = wire_cube();
        let section = [PrimitiveSection::new(0, 0, indices.len() as u32)];
        Self {
            batch: IndirectResources::new("debug-bounds", config),
            vertices,
            indices,
            section,
            cube: None,
            boxes: Vec::new(),
        }
    }

    pub fn batch(&self) -> &IndirectResources<MeshVertex, InstanceData, B> {
        &self.batch
    }

    /// The wire cube every box draws, uploaded on first use.
    fn cube(&mut self, backend: &mut B) -> Result<GeometryRange> {
        if let Some(cube) = self.cube {
            return Ok(cube);
        }
        let cube = self
            .batch
            .upload_geometry(backend, &self.vertices, &self.indices)?;
        self.cube = Some(cube);
        Ok(cube)
    }
}

impl<B: BufferBackend> System<B> for DebugBoundsSystem<B> {
    fn kind(&self) -> SystemKind {
        SystemKind::DebugBounds
    }

    fn priority(&self) -> i32 {
        priority::DEBUG_BOUNDS
    }

    fn adopt(&mut self, scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()> {
        let instances = {
            let entry = scene.actor(actor)?;
            bounds_instances(&entry)
        };
        let cube = self.cube(backend)?;
        let draw = self
            .batch
            .add_instances(backend, &cube, &self.section, &instances)?;
        self.boxes.push((actor, draw));
        Ok(())
    }

    fn release(&mut self, _scene: &mut Scene, actor: ActorId, backend: &mut B) -> Result<()> {
        if let Some(position) = self.boxes.iter().position(|(id, _)| *id == actor) {
            let (_, draw) = self.boxes.swap_remove(position);
            self.batch.remove(backend, &draw)?;
        }
        Ok(())
    }

    fn update(&mut self, scene: &mut Scene, frame: &mut FrameState, backend: &mut B) -> Result<()> {
        if !frame.debug_overlay {
            return Ok(());
        }
        for (id, draw) in &mut self.boxes {
            let (instances, visible) = {
                let actor = scene.actor(*id)?;
                (bounds_instances(&actor), actor.drawn_instances())
            };
            self.batch.refresh(backend, draw, visible, &instances)?;
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

    fn is_renderable(&self, frame: &FrameState) -> bool {
        frame.debug_overlay
    }

    fn tracked(&self) -> usize {
        self.boxes.len()
    }

    fn memory_report(&self) -> Vec<BufferUsageReport> {
        self.batch.memory_report()
    }

    fn destroy(&mut self, backend: &mut B) -> Result<()> {
        self.boxes.clear();
        self.cube = None;
        self.batch.destroy(backend)
    }
}
