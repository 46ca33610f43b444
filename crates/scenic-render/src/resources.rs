//! Indirect draw batches.
//!
//! An [`IndirectResources`] owns the vertex, index, draw-command, and
//! instance buffers of one batch. Primitives are appended with
//! [`add`](IndirectResources::add), which emits one draw command per
//! material section; visibility and instance data changes are pushed with
//! [`refresh`](IndirectResources::refresh); the whole batch is issued as a
//! single multi-draw.
//!
//! Draw-command and instance slots are recycled through free lists.
//! Vertex and index ranges are not: they stay allocated until the batch is
//! destroyed and are reported through [`leaked_bytes`](IndirectResources::leaked_bytes).

use bytemuck::Pod;
use scenic_core::constants::INSTANCE_STORAGE_SLOT;
use scenic_core::{InstanceRange, RenderConfig};
use scenic_gpu::{
    BufferBackend, BufferUsage, BufferUsageReport, DrawCommand, GpuError, GrowableBuffer,
    IndirectCommandBuffer, InstanceDataStore,
};
use scenic_scene::{Actor, DirtyFlags, IndirectDrawMetadata, PrimitiveSection};

use crate::error::{RenderError, Result};
use crate::recorder::{BindScope, BindTarget, DrawRecorder};

/// Vertex and index ranges appended to a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryRange {
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub vertex_count: u32,
}

/// Vertex, index, command, and instance buffers of one batch.
pub struct IndirectResources<V: Pod, I: Pod, B: BufferBackend> {
    name: String,
    vertices: GrowableBuffer<V, B>,
    indices: GrowableBuffer<u32, B>,
    commands: IndirectCommandBuffer<B>,
    instances: InstanceDataStore<I, B>,
    primitives: usize,
    leaked_bytes: u64,
}

impl<V: Pod, I: Pod, B: BufferBackend> IndirectResources<V, I, B> {
    /// Create an empty batch sized and buffered from `config`. Nothing is
    /// allocated until the first primitive is added.
    pub fn new(name: impl Into<String>, config: &RenderConfig) -> Self {
        let name = name.into();
        let factor = config.growth_factor;
        Self {
            vertices: GrowableBuffer::new(
                format!("{name}.vertices"),
                BufferUsage::VERTEX,
                config.initial_vertex_capacity,
            )
            .with_growth_factor(factor),
            indices: GrowableBuffer::new(
                format!("{name}.indices"),
                BufferUsage::INDEX,
                config.initial_index_capacity,
            )
            .with_growth_factor(factor),
            commands: IndirectCommandBuffer::new(
                format!("{name}.commands"),
                config.initial_command_capacity,
                config.command_buffering,
            )
            .with_growth_factor(factor),
            instances: InstanceDataStore::new(
                format!("{name}.instances"),
                config.initial_instance_capacity,
            )
            .with_growth_factor(factor),
            name,
            primitives: 0,
            leaked_bytes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primitives currently placed in the batch.
    pub fn primitive_count(&self) -> usize {
        self.primitives
    }

    /// Draw records the next render issues.
    pub fn draw_count(&self) -> u32 {
        self.commands.draw_count()
    }

    pub fn commands(&self) -> &IndirectCommandBuffer<B> {
        &self.commands
    }

    pub fn instances(&self) -> &InstanceDataStore<I, B> {
        &self.instances
    }

    pub fn vertices(&self) -> &GrowableBuffer<V, B> {
        &self.vertices
    }

    pub fn indices(&self) -> &GrowableBuffer<u32, B> {
        &self.indices
    }

    /// Vertex and index bytes held by removed primitives.
    pub fn leaked_bytes(&self) -> u64 {
        self.leaked_bytes
    }

    /// Place a primitive in the batch.
    ///
    /// Appends the geometry, allocates an instance block for `instances`,
    /// and writes one draw command per section drawing every instance.
    /// Section index ranges are relative to `indices`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn add(
        &mut self,
        backend: &mut B,
        vertices: &[V],
        indices: &[u32],
        sections: &[PrimitiveSection],
        instances: &[I],
    ) -> Result<IndirectDrawMetadata> {
        self.validate(sections, instances, indices.len() as u32)?;
        let geometry = self.upload_geometry(backend, vertices, indices)?;
        let mut metadata = self.add_instances(backend, &geometry, sections, instances)?;
        metadata.index_count = geometry.index_count;
        metadata.vertex_count = geometry.vertex_count;
        Ok(metadata)
    }

    /// Append geometry that several primitives draw from.
    ///
    /// The ranges stay allocated until the batch is destroyed; primitives
    /// placed on them with [`add_instances`](Self::add_instances) own no
    /// geometry and retain nothing on removal.
    pub fn upload_geometry(
        &mut self,
        backend: &mut B,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<GeometryRange> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(self.invalid("primitive has no geometry"));
        }
        let first_index = self.indices.add_range(backend, indices)?;
        let first_vertex = self.vertices.add_range(backend, vertices)?;
        let base_vertex = i32::try_from(first_vertex)
            .map_err(|_| self.invalid("vertex offset does not fit a base vertex"))?;
        Ok(GeometryRange {
            first_index,
            index_count: indices.len() as u32,
            base_vertex,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Place a primitive drawing `geometry` already held by the batch.
    pub fn add_instances(
        &mut self,
        backend: &mut B,
        geometry: &GeometryRange,
        sections: &[PrimitiveSection],
        instances: &[I],
    ) -> Result<IndirectDrawMetadata> {
        self.validate(sections, instances, geometry.index_count)?;
        let base_instance = self.instances.add_range(backend, instances)?;
        let instance_count = instances.len() as u32;

        let commands: Vec<DrawCommand> = sections
            .iter()
            .map(|section| DrawCommand {
                index_count: section.index_count,
                instance_count,
                first_index: geometry.first_index + section.first_index,
                base_vertex: geometry.base_vertex,
                base_instance,
            })
            .collect();
        let first_draw = self.commands.add_range(backend, &commands)?;

        self.primitives += 1;
        tracing::debug!(
            batch = %self.name,
            draws = commands.len(),
            instances = instance_count,
            first_draw,
            base_instance,
            "primitive added"
        );

        Ok(IndirectDrawMetadata {
            draws: first_draw..first_draw + commands.len() as u32,
            base_instance,
            instance_count,
            first_index: geometry.first_index,
            index_count: 0,
            base_vertex: geometry.base_vertex,
            vertex_count: 0,
        })
    }

    /// Push instance data and visibility for a primitive.
    ///
    /// Writes `instances` into the primitive's block, reallocating the block
    /// when its size changed, then points every draw command of the
    /// primitive at the `visible` part of the block. An empty `visible`
    /// range hides the primitive.
    pub fn refresh(
        &mut self,
        backend: &mut B,
        metadata: &mut IndirectDrawMetadata,
        visible: InstanceRange,
        instances: &[I],
    ) -> Result<()> {
        if instances.is_empty() {
            return Err(self.invalid("primitive has no instances"));
        }
        let count = instances.len() as u32;

        if count == metadata.instance_count {
            self.instances
                .update(backend, metadata.base_instance, instances)?;
        } else {
            self.instances
                .remove_range(metadata.base_instance, metadata.instance_count)?;
            metadata.base_instance = self.instances.add_range(backend, instances)?;
            metadata.instance_count = count;
            tracing::trace!(
                batch = %self.name,
                base_instance = metadata.base_instance,
                count,
                "instance block reallocated"
            );
        }

        let visible = visible.clamp(count);
        for id in metadata.draw_ids() {
            self.commands
                .update_instance_count(backend, id, visible.len())?;
            self.commands
                .update_base_instance(backend, id, metadata.base_instance + visible.start())?;
        }
        Ok(())
    }

    /// Refresh an actor's primitive if its instance data is dirty, then
    /// clear [`DirtyFlags::INSTANCES`]. Returns whether anything was written.
    pub fn update(&mut self, backend: &mut B, actor: &mut Actor, instances: &[I]) -> Result<bool> {
        if !actor.dirty().contains(DirtyFlags::INSTANCES) {
            return Ok(false);
        }
        let visible = actor.drawn_instances();
        let id = actor.id();
        let metadata = actor
            .primitive_mut()
            .and_then(|primitive| primitive.draw_mut())
            .ok_or_else(|| RenderError::NotGenerated {
                actor: id,
                batch: self.name.clone(),
            })?;
        self.refresh(backend, metadata, visible, instances)?;
        actor.clear_dirty(DirtyFlags::INSTANCES);
        Ok(true)
    }

    /// Take a primitive out of the batch.
    ///
    /// Its draw commands are zeroed before their ids are released, so a
    /// draw that still covers them renders nothing.
    pub fn remove(&mut self, backend: &mut B, metadata: &IndirectDrawMetadata) -> Result<()> {
        self.commands.remove_range(backend, metadata.draws.clone())?;
        self.instances
            .remove_range(metadata.base_instance, metadata.instance_count)?;

        let bytes = u64::from(metadata.vertex_count) * GrowableBuffer::<V, B>::STRIDE
            + u64::from(metadata.index_count) * GrowableBuffer::<u32, B>::STRIDE;
        self.leaked_bytes += bytes;
        self.primitives = self.primitives.saturating_sub(1);
        if bytes > 0 {
            tracing::debug!(
                batch = %self.name,
                draws = metadata.draw_count(),
                retained_bytes = bytes,
                total_retained = self.leaked_bytes,
                "primitive removed, geometry kept until batch teardown"
            );
        }
        Ok(())
    }

    /// Publish this frame's command writes.
    pub fn end_frame(&mut self, backend: &mut B) -> Result<()> {
        Ok(self.commands.swap(backend)?)
    }

    /// Draw the whole batch.
    pub fn render<R: DrawRecorder + ?Sized>(&self, backend: &B, recorder: &mut R) -> Result<()> {
        self.render_batch(backend, 0, self.draw_count(), recorder)
    }

    /// Draw `count` commands starting at draw id `offset`, binding the
    /// batch buffers for the duration of the call only.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn render_batch<R: DrawRecorder + ?Sized>(
        &self,
        backend: &B,
        offset: u32,
        count: u32,
        recorder: &mut R,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = u64::from(offset) + u64::from(count);
        let limit = self.draw_count();
        if end > u64::from(limit) {
            return Err(GpuError::OutOfRange {
                buffer: format!("{}.commands", self.name),
                index: u64::from(offset),
                end,
                limit: u64::from(limit),
            }
            .into());
        }

        let (Some(commands), Some(instances), Some(vertices), Some(indices)) = (
            self.commands.read_handle(backend),
            self.instances.handle(backend),
            self.vertices.handle(backend),
            self.indices.handle(backend),
        ) else {
            return Ok(());
        };

        let mut scope = BindScope::new(recorder);
        scope.bind(BindTarget::Indirect, commands);
        scope.bind(BindTarget::Storage(INSTANCE_STORAGE_SLOT), instances);
        scope.bind(BindTarget::Vertex, vertices);
        scope.bind(BindTarget::Index, indices);
        scope.draw_indexed_indirect(
            commands,
            u64::from(offset) * u64::from(DrawCommand::STRIDE),
            count,
            DrawCommand::STRIDE,
        );
        Ok(())
    }

    /// Space used versus allocated for each buffer of the batch.
    pub fn memory_report(&self) -> Vec<BufferUsageReport> {
        vec![
            self.vertices.usage_report(),
            self.indices.usage_report(),
            self.commands.usage_report(),
            self.instances.usage_report(),
        ]
    }

    /// Release every buffer of the batch.
    pub fn destroy(&mut self, backend: &mut B) -> Result<()> {
        self.vertices.destroy(backend)?;
        self.indices.destroy(backend)?;
        self.commands.destroy(backend)?;
        self.instances.destroy(backend)?;
        self.primitives = 0;
        self.leaked_bytes = 0;
        Ok(())
    }

    fn validate(&self, sections: &[PrimitiveSection], instances: &[I], index_count: u32) -> Result<()> {
        if sections.is_empty() {
            return Err(self.invalid("primitive has no sections"));
        }
        if instances.is_empty() {
            return Err(self.invalid("primitive has no instances"));
        }
        if index_count == 0 {
            return Err(self.invalid("primitive has no geometry"));
        }
        for section in sections {
            let end = u64::from(section.first_index) + u64::from(section.index_count);
            if section.index_count == 0 || end > u64::from(index_count) {
                return Err(self.invalid(format!(
                    "section {}..{end} outside {index_count} indices",
                    section.first_index
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> RenderError {
        RenderError::InvalidGeometry {
            batch: self.name.clone(),
            reason: reason.into(),
        }
    }
}
