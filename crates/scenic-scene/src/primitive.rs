//! Drawable primitives.
//!
//! Geometry arrives from the import layer as vertex and index arrays plus
//! material sections. A primitive keeps up to [`MAX_LOD_COUNT`] geometry
//! slots; the active one is uploaded when GPU resources are generated.

use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use scenic_core::constants::MAX_LOD_COUNT;
use scenic_core::Aabb;

use crate::error::{Result, SceneError};

/// Vertex layout shared by every primitive batch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }
}

/// Immutable vertex and index data of one LOD.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveGeometry {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    bounds: Aabb,
}

impl PrimitiveGeometry {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from_array(v.position)));
        Self {
            vertices,
            indices,
            bounds,
        }
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Local-space bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Axis-aligned cube with `half_extent`, one section covering all indices.
    pub fn cube(half_extent: f32) -> (Self, Vec<PrimitiveSection>) {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in FACES {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (n + u * su + v * sv) * half_extent;
                vertices.push(MeshVertex::new(position, n, [su.max(0.0), sv.max(0.0)]));
            }
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let section = PrimitiveSection::new(0, 0, indices.len() as u32);
        (Self::new(vertices, indices), vec![section])
    }
}

/// Textures and blend state a section is drawn with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionDrawData {
    /// Texture slots in the viewer's texture table.
    pub textures: Vec<u32>,
    pub translucent: bool,
}

/// Index sub-range drawn with one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveSection {
    pub material_index: u32,
    /// Offset into the LOD's index array.
    pub first_index: u32,
    pub index_count: u32,
    pub draw_data: Option<SectionDrawData>,
}

impl PrimitiveSection {
    pub fn new(material_index: u32, first_index: u32, index_count: u32) -> Self {
        Self {
            material_index,
            first_index,
            index_count,
            draw_data: None,
        }
    }

    #[must_use]
    pub fn with_draw_data(mut self, draw_data: SectionDrawData) -> Self {
        self.draw_data = Some(draw_data);
        self
    }
}

/// Where a primitive lives inside an indirect batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectDrawMetadata {
    /// One draw id per material section.
    pub draws: Range<u32>,
    /// First slot of the primitive's instance block.
    pub base_instance: u32,
    /// Size of the instance block.
    pub instance_count: u32,
    pub first_index: u32,
    /// Indices owned by the primitive; zero when it draws geometry shared
    /// across the batch.
    pub index_count: u32,
    pub base_vertex: i32,
    /// Vertices owned by the primitive, zero for shared geometry.
    pub vertex_count: u32,
}

impl IndirectDrawMetadata {
    pub fn draw_ids(&self) -> impl Iterator<Item = u32> {
        self.draws.clone()
    }

    pub fn draw_count(&self) -> u32 {
        self.draws.end - self.draws.start
    }
}

/// One LOD slot.
#[derive(Debug, Clone)]
pub struct PrimitiveLod {
    pub geometry: Arc<PrimitiveGeometry>,
    pub sections: Vec<PrimitiveSection>,
}

/// Drawable geometry attached to an actor.
#[derive(Debug, Clone)]
pub struct PrimitiveComponent {
    lods: [Option<PrimitiveLod>; MAX_LOD_COUNT],
    active_lod: usize,
    draw: Option<IndirectDrawMetadata>,
    instance_aux: [u32; 4],
}

impl PrimitiveComponent {
    /// Primitive with `geometry` in LOD 0.
    pub fn new(geometry: Arc<PrimitiveGeometry>, sections: Vec<PrimitiveSection>) -> Self {
        let mut lods: [Option<PrimitiveLod>; MAX_LOD_COUNT] = std::array::from_fn(|_| None);
        lods[0] = Some(PrimitiveLod { geometry, sections });
        Self {
            lods,
            active_lod: 0,
            draw: None,
            instance_aux: [0; 4],
        }
    }

    /// Fill another LOD slot.
    pub fn with_lod(
        mut self,
        level: usize,
        geometry: Arc<PrimitiveGeometry>,
        sections: Vec<PrimitiveSection>,
    ) -> Result<Self> {
        let slot = self.lods.get_mut(level).ok_or(SceneError::InvalidLod(level))?;
        *slot = Some(PrimitiveLod { geometry, sections });
        Ok(self)
    }

    /// Per-instance words written next to every world matrix.
    #[must_use]
    pub fn with_instance_aux(mut self, aux: [u32; 4]) -> Self {
        self.instance_aux = aux;
        self
    }

    /// Choose the LOD uploaded on the next generation.
    pub fn select_lod(&mut self, level: usize) -> Result<()> {
        match self.lods.get(level) {
            Some(Some(_)) => {
                self.active_lod = level;
                Ok(())
            }
            _ => Err(SceneError::InvalidLod(level)),
        }
    }

    pub fn active_lod(&self) -> usize {
        self.active_lod
    }

    pub fn lod(&self, level: usize) -> Option<&PrimitiveLod> {
        self.lods.get(level).and_then(Option::as_ref)
    }

    /// Number of filled LOD slots.
    pub fn lod_count(&self) -> usize {
        self.lods.iter().flatten().count()
    }

    pub fn active(&self) -> Option<&PrimitiveLod> {
        self.lod(self.active_lod)
    }

    /// Local bounds of the active LOD.
    pub fn bounds(&self) -> Aabb {
        self.active()
            .map_or(Aabb::EMPTY, |lod| lod.geometry.bounds())
    }

    pub fn instance_aux(&self) -> [u32; 4] {
        self.instance_aux
    }

    /// Whether GPU resources exist for this primitive.
    pub fn is_generated(&self) -> bool {
        self.draw.is_some()
    }

    pub fn draw(&self) -> Option<&IndirectDrawMetadata> {
        self.draw.as_ref()
    }

    pub fn draw_mut(&mut self) -> Option<&mut IndirectDrawMetadata> {
        self.draw.as_mut()
    }

    pub fn set_draw(&mut self, draw: IndirectDrawMetadata) {
        self.draw = Some(draw);
    }

    /// Forget the GPU placement, returning it for release.
    pub fn take_draw(&mut self) -> Option<IndirectDrawMetadata> {
        self.draw.take()
    }
}
