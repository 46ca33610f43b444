//! Draw recording seam.
//!
//! Batches never talk to a command buffer directly. They record through a
//! [`DrawRecorder`], binding their buffers inside a [`BindScope`] that puts
//! the previous bindings back when it ends, so batches rendered one after
//! another never observe each other's state.

use ash::vk;
use hashbrown::HashMap;
use scenic_gpu::BufferHandle;

/// Binding point a batch buffer is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindTarget {
    Vertex,
    Index,
    /// Shader storage slot.
    Storage(u32),
    /// Indirect command source.
    Indirect,
}

/// Destination for binding and draw calls.
pub trait DrawRecorder {
    /// Buffer currently bound to `target`.
    fn bound(&self, target: BindTarget) -> Option<BufferHandle>;

    /// Bind `buffer` to `target`, or clear the binding with `None`.
    fn bind(&mut self, target: BindTarget, buffer: Option<BufferHandle>);

    /// Issue `draw_count` indexed indirect draws read from `buffer`.
    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
}

/// Save-bind-restore scope over a recorder.
pub struct BindScope<'a, R: DrawRecorder + ?Sized> {
    recorder: &'a mut R,
    saved: Vec<(BindTarget, Option<BufferHandle>)>,
}

impl<'a, R: DrawRecorder + ?Sized> BindScope<'a, R> {
    pub fn new(recorder: &'a mut R) -> Self {
        Self {
            recorder,
            saved: Vec::with_capacity(4),
        }
    }

    /// Bind `buffer`, remembering what was bound before.
    pub fn bind(&mut self, target: BindTarget, buffer: BufferHandle) {
        let previous = self.recorder.bound(target);
        self.saved.push((target, previous));
        self.recorder.bind(target, Some(buffer));
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.recorder
            .draw_indexed_indirect(buffer, offset, draw_count, stride);
    }
}

impl<R: DrawRecorder + ?Sized> Drop for BindScope<'_, R> {
    fn drop(&mut self) {
        while let Some((target, previous)) = self.saved.pop() {
            self.recorder.bind(target, previous);
        }
    }
}

/// Recorder writing into a Vulkan command buffer.
///
/// Storage slots are exposed to shaders as buffer device addresses in push
/// constants, eight bytes per slot.
pub struct VulkanRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    stages: vk::ShaderStageFlags,
    bound: HashMap<BindTarget, BufferHandle>,
}

impl<'a> VulkanRecorder<'a> {
    /// Wrap a command buffer in the recording state with a graphics
    /// pipeline using `layout` already bound.
    pub fn new(
        device: &'a ash::Device,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            device,
            cmd,
            layout,
            stages,
            bound: HashMap::new(),
        }
    }
}

impl DrawRecorder for VulkanRecorder<'_> {
    fn bound(&self, target: BindTarget) -> Option<BufferHandle> {
        self.bound.get(&target).copied()
    }

    fn bind(&mut self, target: BindTarget, buffer: Option<BufferHandle>) {
        let Some(buffer) = buffer else {
            // Vulkan has no unbind; the stale binding is simply never used.
            self.bound.remove(&target);
            return;
        };
        self.bound.insert(target, buffer);

        // SAFETY: the command buffer is recording and `buffer` outlives it
        // through deferred deletion.
        unsafe {
            match target {
                BindTarget::Vertex => {
                    self.device
                        .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer.raw], &[0]);
                }
                BindTarget::Index => {
                    self.device
                        .cmd_bind_index_buffer(self.cmd, buffer.raw, 0, vk::IndexType::UINT32);
                }
                BindTarget::Storage(slot) => {
                    self.device.cmd_push_constants(
                        self.cmd,
                        self.layout,
                        self.stages,
                        slot * 8,
                        bytemuck::bytes_of(&buffer.device_address),
                    );
                }
                BindTarget::Indirect => {}
            }
        }
    }

    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        // SAFETY: see `bind`.
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(self.cmd, buffer.raw, offset, draw_count, stride);
        }
    }
}

/// One call captured by [`RecordingRecorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    Bind {
        target: BindTarget,
        buffer: Option<BufferHandle>,
    },
    DrawIndexedIndirect {
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

/// Recorder that captures calls for headless runs and inspection.
#[derive(Debug, Default)]
pub struct RecordingRecorder {
    bound: HashMap<BindTarget, BufferHandle>,
    commands: Vec<RecordedCommand>,
}

impl RecordingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Draw calls only.
    pub fn draws(&self) -> impl Iterator<Item = &RecordedCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::DrawIndexedIndirect { .. }))
    }

    /// Total draws issued across all indirect calls.
    pub fn total_draw_count(&self) -> u32 {
        self.commands
            .iter()
            .map(|c| match c {
                RecordedCommand::DrawIndexedIndirect { draw_count, .. } => *draw_count,
                RecordedCommand::Bind { .. } => 0,
            })
            .sum()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl DrawRecorder for RecordingRecorder {
    fn bound(&self, target: BindTarget) -> Option<BufferHandle> {
        self.bound.get(&target).copied()
    }

    fn bind(&mut self, target: BindTarget, buffer: Option<BufferHandle>) {
        match buffer {
            Some(handle) => self.bound.insert(target, handle),
            None => self.bound.remove(&target),
        };
        self.commands.push(RecordedCommand::Bind { target, buffer });
    }

    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn handle(raw: u64) -> BufferHandle {
        BufferHandle {
            raw: vk::Buffer::from_raw(raw),
            device_address: raw * 0x1000,
            size: 64,
        }
    }

    #[test]
    fn scope_restores_previous_bindings() {
        let mut recorder = RecordingRecorder::new();
        recorder.bind(BindTarget::Vertex, Some(handle(1)));

        {
            let mut scope = BindScope::new(&mut recorder);
            scope.bind(BindTarget::Vertex, handle(2));
            scope.bind(BindTarget::Storage(0), handle(3));
            scope.draw_indexed_indirect(handle(4), 0, 2, 20);
        }

        assert_eq!(recorder.bound(BindTarget::Vertex), Some(handle(1)));
        assert_eq!(recorder.bound(BindTarget::Storage(0)), None);
        assert_eq!(recorder.total_draw_count(), 2);
    }

    #[test]
    fn restore_runs_in_reverse_order() {
        let mut recorder = RecordingRecorder::new();
        {
            let mut scope = BindScope::new(&mut recorder);
            scope.bind(BindTarget::Index, handle(1));
            scope.bind(BindTarget::Index, handle(2));
        }
        let tail: Vec<_> = recorder.commands()[2..].to_vec();
        assert_eq!(
            tail,
            vec![
                RecordedCommand::Bind {
                    target: BindTarget::Index,
                    buffer: Some(handle(1)),
                },
                RecordedCommand::Bind {
                    target: BindTarget::Index,
                    buffer: None,
                },
            ]
        );
        assert_eq!(recorder.bound(BindTarget::Index), None);
    }
}
