//! Indexed indirect draw records.
//!
//! Each material section of a drawn primitive owns one [`DrawCommand`] slot.
//! Visibility is toggled by rewriting the instance count in place; a removed
//! slot has its instance count and base instance zeroed before the slot goes
//! back on the free list, so a stale record never issues vertices.
//!
//! With [`CommandBuffering::Double`] two GPU buffers are kept. Writes land in
//! the write side, the ids touched are remembered, and [`swap`] publishes the
//! write side for rendering and replays those ids into the other buffer.
//!
//! [`swap`]: IndirectCommandBuffer::swap

use std::mem::offset_of;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use hashbrown::HashSet;
use scenic_core::CommandBuffering;

use crate::backend::{BufferBackend, BufferHandle, BufferUsage};
use crate::error::{GpuError, Result};
use crate::growable::{FreeRange, GrowableBuffer, SlotAllocator};
use crate::report::BufferUsageReport;

/// One `VkDrawIndexedIndirectCommand`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

impl DrawCommand {
    /// Size of one record in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
}

/// Slot-managed draw records, optionally double-buffered.
pub struct IndirectCommandBuffer<B: BufferBackend> {
    name: String,
    buffering: CommandBuffering,
    slots: SlotAllocator,
    sides: Vec<GrowableBuffer<DrawCommand, B>>,
    shadow: Vec<DrawCommand>,
    write_side: usize,
    stale: HashSet<u32>,
    published: u32,
}

impl<B: BufferBackend> IndirectCommandBuffer<B> {
    pub fn new(name: impl Into<String>, initial_capacity: u32, buffering: CommandBuffering) -> Self {
        let name = name.into();
        let sides = match buffering {
            CommandBuffering::Single => vec![GrowableBuffer::new(
                name.clone(),
                BufferUsage::INDIRECT,
                initial_capacity,
            )],
            CommandBuffering::Double => (0..2)
                .map(|side| {
                    GrowableBuffer::new(
                        format!("{name}[{side}]"),
                        BufferUsage::INDIRECT,
                        initial_capacity,
                    )
                })
                .collect(),
        };

        Self {
            name,
            buffering,
            slots: SlotAllocator::new(),
            sides,
            shadow: Vec::new(),
            write_side: 0,
            stale: HashSet::new(),
            published: 0,
        }
    }

    #[must_use]
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.sides = self
            .sides
            .into_iter()
            .map(|side| side.with_growth_factor(factor))
            .collect();
        self
    }

    pub fn buffering(&self) -> CommandBuffering {
        self.buffering
    }

    /// One past the highest used draw id.
    pub fn len(&self) -> u32 {
        self.slots.count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.count() == 0
    }

    pub fn free_ranges(&self) -> &[FreeRange] {
        self.slots.free_ranges()
    }

    /// Number of records the read side covers.
    pub fn draw_count(&self) -> u32 {
        match self.buffering {
            CommandBuffering::Single => self.slots.count(),
            CommandBuffering::Double => self.published,
        }
    }

    /// Last written value of a record.
    pub fn command(&self, id: u32) -> Option<DrawCommand> {
        self.shadow.get(id as usize).copied()
    }

    /// Handle of the buffer drawn from.
    pub fn read_handle(&self, backend: &B) -> Option<BufferHandle> {
        self.sides[self.read_side()].handle(backend)
    }

    /// Read a record back from the buffer drawn from.
    pub fn read_back(&self, backend: &B, id: u32) -> Result<DrawCommand> {
        self.sides[self.read_side()].read(backend, id)
    }

    /// Store one record and return its draw id.
    pub fn add(&mut self, backend: &mut B, command: DrawCommand) -> Result<u32> {
        self.add_range(backend, &[command])
    }

    /// Store a contiguous run of records and return the first draw id.
    pub fn add_range(&mut self, backend: &mut B, commands: &[DrawCommand]) -> Result<u32> {
        let len = u32::try_from(commands.len())
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| GpuError::InvalidArgument {
                buffer: self.name.clone(),
                reason: format!("cannot add {} draw commands", commands.len()),
            })?;

        let first = self.slots.next_index(len);
        self.store(backend, first, commands)?;
        Ok(first)
    }

    /// Overwrite the record at `id`, extending the buffer if needed.
    pub fn insert(&mut self, backend: &mut B, id: u32, command: DrawCommand) -> Result<()> {
        self.store(backend, id, &[command])
    }

    pub fn update_instance_count(&mut self, backend: &mut B, id: u32, count: u32) -> Result<()> {
        self.live_mut(id)?.instance_count = count;
        self.write_field(backend, id, offset_of!(DrawCommand, instance_count), count)
    }

    pub fn update_index_count(&mut self, backend: &mut B, id: u32, count: u32) -> Result<()> {
        self.live_mut(id)?.index_count = count;
        self.write_field(backend, id, offset_of!(DrawCommand, index_count), count)
    }

    pub fn update_first_index(&mut self, backend: &mut B, id: u32, first: u32) -> Result<()> {
        self.live_mut(id)?.first_index = first;
        self.write_field(backend, id, offset_of!(DrawCommand, first_index), first)
    }

    pub fn update_base_vertex(&mut self, backend: &mut B, id: u32, base: i32) -> Result<()> {
        self.live_mut(id)?.base_vertex = base;
        self.write_field(backend, id, offset_of!(DrawCommand, base_vertex), base)
    }

    pub fn update_base_instance(&mut self, backend: &mut B, id: u32, base: u32) -> Result<()> {
        self.live_mut(id)?.base_instance = base;
        self.write_field(backend, id, offset_of!(DrawCommand, base_instance), base)
    }

    /// Zero the instance count and base instance of every record in `ids`,
    /// then free the slots.
    pub fn remove_range(&mut self, backend: &mut B, ids: Range<u32>) -> Result<()> {
        if ids.is_empty() || ids.end > self.slots.count() {
            return Err(GpuError::OutOfRange {
                buffer: self.name.clone(),
                index: ids.start.into(),
                end: ids.end.into(),
                limit: self.slots.count().into(),
            });
        }

        for command in &mut self.shadow[ids.start as usize..ids.end as usize] {
            command.instance_count = 0;
            command.base_instance = 0;
        }
        let zeroed = self.shadow[ids.start as usize..ids.end as usize].to_vec();
        self.sides[self.write_side].insert_range(backend, ids.start, &zeroed)?;
        self.mark_stale(ids.clone());

        self.slots.release(ids.start, ids.end - ids.start);
        Ok(())
    }

    pub fn remove(&mut self, backend: &mut B, id: u32) -> Result<()> {
        self.remove_range(backend, id..id.saturating_add(1))
    }

    /// Publish the write side for rendering. No-op when single-buffered.
    pub fn swap(&mut self, backend: &mut B) -> Result<()> {
        if self.buffering == CommandBuffering::Single {
            return Ok(());
        }

        self.published = self.slots.count();
        self.write_side = self.read_side();

        let mut stale: Vec<u32> = self.stale.drain().collect();
        stale.sort_unstable();
        let side = &mut self.sides[self.write_side];
        for id in stale {
            side.insert(backend, id, &self.shadow[id as usize])?;
        }
        Ok(())
    }

    /// Combined space report of every side.
    pub fn usage_report(&self) -> BufferUsageReport {
        let live = self.slots.count().saturating_sub(self.slots.free_slots());
        let used_per_side = u64::from(live) * u64::from(DrawCommand::STRIDE);
        BufferUsageReport {
            name: self.name.clone(),
            used_bytes: used_per_side * self.sides.len() as u64,
            allocated_bytes: self
                .sides
                .iter()
                .map(|side| side.usage_report().allocated_bytes)
                .sum(),
        }
    }

    pub fn destroy(&mut self, backend: &mut B) -> Result<()> {
        for side in &mut self.sides {
            side.destroy(backend)?;
        }
        self.slots.reset();
        self.shadow.clear();
        self.stale.clear();
        self.published = 0;
        Ok(())
    }

    fn read_side(&self) -> usize {
        match self.buffering {
            CommandBuffering::Single => 0,
            CommandBuffering::Double => 1 - self.write_side,
        }
    }

    fn store(&mut self, backend: &mut B, first: u32, commands: &[DrawCommand]) -> Result<()> {
        let end = first + commands.len() as u32;
        self.sides[self.write_side].insert_range(backend, first, commands)?;

        if self.shadow.len() < end as usize {
            self.shadow.resize(end as usize, DrawCommand::default());
        }
        self.shadow[first as usize..end as usize].copy_from_slice(commands);
        self.slots.mark_used(end);
        self.mark_stale(first..end);
        Ok(())
    }

    fn live_mut(&mut self, id: u32) -> Result<&mut DrawCommand> {
        let count = self.slots.count();
        if id >= count {
            return Err(GpuError::OutOfRange {
                buffer: self.name.clone(),
                index: id.into(),
                end: u64::from(id) + 1,
                limit: count.into(),
            });
        }
        Ok(&mut self.shadow[id as usize])
    }

    fn write_field<F: Pod>(
        &mut self,
        backend: &mut B,
        id: u32,
        offset: usize,
        value: F,
    ) -> Result<()> {
        let side = &mut self.sides[self.write_side];
        if id < side.len() {
            side.write_field(backend, id, offset, &value)?;
        } else {
            side.insert(backend, id, &self.shadow[id as usize])?;
        }
        self.mark_stale(id..id + 1);
        Ok(())
    }

    fn mark_stale(&mut self, ids: Range<u32>) {
        if self.buffering == CommandBuffering::Double {
            self.stale.extend(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;

    fn command(index_count: u32, instance_count: u32, base_instance: u32) -> DrawCommand {
        DrawCommand {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            base_instance,
        }
    }

    #[test]
    fn record_matches_vulkan_layout() {
        assert_eq!(DrawCommand::STRIDE, 20);
        assert_eq!(offset_of!(DrawCommand, instance_count), 4);
        assert_eq!(offset_of!(DrawCommand, base_instance), 16);
    }

    #[test]
    fn partial_updates_touch_one_field() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Single);
        let id = commands.add(&mut backend, command(36, 1, 7)).unwrap();

        commands.update_instance_count(&mut backend, id, 0).unwrap();
        let stored = commands.read_back(&backend, id).unwrap();
        assert_eq!(stored, command(36, 0, 7));

        commands.update_base_vertex(&mut backend, id, -4).unwrap();
        commands.update_first_index(&mut backend, id, 12).unwrap();
        let stored = commands.read_back(&backend, id).unwrap();
        assert_eq!(stored.base_vertex, -4);
        assert_eq!(stored.first_index, 12);
        assert_eq!(stored.index_count, 36);
        assert_eq!(commands.command(id), Some(stored));
    }

    #[test]
    fn update_unknown_id_fails() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Single);
        commands.add(&mut backend, command(3, 1, 0)).unwrap();
        assert!(matches!(
            commands.update_instance_count(&mut backend, 5, 1),
            Err(GpuError::OutOfRange { .. })
        ));
    }

    #[test]
    fn removal_zeroes_before_reuse() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Single);
        let first = commands
            .add_range(&mut backend, &[command(6, 3, 5), command(9, 3, 5)])
            .unwrap();
        let kept = commands.add(&mut backend, command(12, 2, 8)).unwrap();

        commands.remove_range(&mut backend, first..first + 2).unwrap();
        for id in first..first + 2 {
            let stored = commands.read_back(&backend, id).unwrap();
            assert_eq!(stored.instance_count, 0);
            assert_eq!(stored.base_instance, 0);
            assert_eq!(stored.index_count, if id == first { 6 } else { 9 });
        }
        assert_eq!(commands.free_ranges(), &[FreeRange { index: first, len: 2 }]);

        let reused = commands.add(&mut backend, command(15, 1, 0)).unwrap();
        assert_eq!(reused, first);
        assert_eq!(commands.read_back(&backend, kept).unwrap(), command(12, 2, 8));
    }

    #[test]
    fn single_buffering_swap_is_noop() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Single);
        commands.add(&mut backend, command(3, 1, 0)).unwrap();
        let before = commands.read_handle(&backend);
        commands.swap(&mut backend).unwrap();
        assert_eq!(commands.read_handle(&backend), before);
        assert_eq!(commands.draw_count(), 1);
    }

    #[test]
    fn double_buffering_publishes_on_swap() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Double);
        let id = commands.add(&mut backend, command(3, 2, 0)).unwrap();

        assert_eq!(commands.draw_count(), 0);
        assert!(commands.read_handle(&backend).is_none());

        commands.swap(&mut backend).unwrap();
        assert_eq!(commands.draw_count(), 1);
        assert_eq!(commands.read_back(&backend, id).unwrap(), command(3, 2, 0));

        commands.update_instance_count(&mut backend, id, 0).unwrap();
        assert_eq!(commands.read_back(&backend, id).unwrap().instance_count, 2);

        commands.swap(&mut backend).unwrap();
        assert_eq!(commands.read_back(&backend, id).unwrap().instance_count, 0);

        // Both sides carry the latest record after the replay.
        commands.swap(&mut backend).unwrap();
        assert_eq!(commands.read_back(&backend, id).unwrap().instance_count, 0);
    }

    #[test]
    fn usage_report_counts_both_sides() {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 4, CommandBuffering::Double);
        commands.add(&mut backend, command(3, 1, 0)).unwrap();
        commands.swap(&mut backend).unwrap();

        let report = commands.usage_report();
        assert_eq!(report.used_bytes, 2 * 20);
        assert_eq!(report.allocated_bytes, 2 * 4 * 20);
    }
}
