//! Typed, resizable GPU arrays with free-list slot reuse.
//!
//! A [`GrowableBuffer`] is created empty and becomes resident on the first
//! `allocate` or write. Slots handed out by `add`/`add_range` stay at the
//! same index for the lifetime of the storage: growth copies the live byte
//! range into the larger allocation, and removal only records the vacated
//! range in a LIFO free list for later requests.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use scenic_core::constants::MIN_GROWTH_FACTOR;

use crate::backend::{BufferBackend, BufferHandle, BufferUsage};
use crate::error::{GpuError, Result};
use crate::report::BufferUsageReport;

/// A vacated run of slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeRange {
    pub index: u32,
    pub len: u32,
}

/// Slot bookkeeping shared by every growable buffer.
///
/// `count` is one past the highest slot ever written. Freed runs sit on a
/// stack; a request only looks at the top entry.
#[derive(Clone, Debug, Default)]
pub struct SlotAllocator {
    count: u32,
    free: Vec<FreeRange>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One past the highest used slot.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn free_ranges(&self) -> &[FreeRange] {
        &self.free
    }

    /// Total slots sitting on the free list.
    pub fn free_slots(&self) -> u32 {
        self.free.iter().map(|r| r.len).sum()
    }

    /// First index of a contiguous run of `len` slots.
    ///
    /// Pops the top free range: an exact fit is reused whole, a larger range
    /// gives up its prefix and the remainder goes back on the stack, and a
    /// smaller one is pushed back untouched so the run starts at `count`.
    /// The caller must [`mark_used`](Self::mark_used) the run once written.
    pub fn next_index(&mut self, len: u32) -> u32 {
        if let Some(top) = self.free.pop() {
            if top.len == len {
                return top.index;
            }
            if top.len > len {
                self.free.push(FreeRange {
                    index: top.index + len,
                    len: top.len - len,
                });
                return top.index;
            }
            self.free.push(top);
        }
        self.count
    }

    /// Extend the logical count to cover slots below `end`.
    pub fn mark_used(&mut self, end: u32) {
        self.count = self.count.max(end);
    }

    /// Push a vacated run onto the free list.
    pub fn release(&mut self, index: u32, len: u32) {
        if len > 0 {
            self.free.push(FreeRange { index, len });
        }
    }

    /// Forget every slot.
    pub fn reset(&mut self) {
        self.count = 0;
        self.free.clear();
    }
}

/// How `resize` treats existing contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthMode {
    /// Copy the live range into the new storage; indices stay valid.
    Preserve,
    /// Drop the old contents and reset the slot bookkeeping.
    Discard,
}

/// Resizable typed array living in backend storage.
pub struct GrowableBuffer<T: Pod, B: BufferBackend> {
    name: String,
    usage: BufferUsage,
    storage: Option<B::Storage>,
    capacity: u32,
    initial_capacity: u32,
    growth_factor: f32,
    slots: SlotAllocator,
    _marker: PhantomData<T>,
}

impl<T: Pod, B: BufferBackend> GrowableBuffer<T, B> {
    /// Element size in bytes.
    pub const STRIDE: u64 = size_of::<T>() as u64;

    /// Create an empty, non-resident buffer. `initial_capacity` sizes the
    /// first implicit allocation.
    pub fn new(name: impl Into<String>, usage: BufferUsage, initial_capacity: u32) -> Self {
        Self {
            name: name.into(),
            usage,
            storage: None,
            capacity: 0,
            initial_capacity,
            growth_factor: MIN_GROWTH_FACTOR,
            slots: SlotAllocator::new(),
            _marker: PhantomData,
        }
    }

    /// Use a larger growth factor. Values below the minimum are raised to it.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor.max(MIN_GROWTH_FACTOR);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Whether backing storage exists.
    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Logical count: one past the highest used slot.
    pub fn len(&self) -> u32 {
        self.slots.count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.count() == 0
    }

    /// Allocated slot count, `0` before the buffer is resident.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_ranges(&self) -> &[FreeRange] {
        self.slots.free_ranges()
    }

    /// Handle for binding, `None` before the buffer is resident.
    pub fn handle(&self, backend: &B) -> Option<BufferHandle> {
        self.storage.as_ref().map(|s| backend.handle(s))
    }

    /// Reserve zeroed storage for `capacity` elements.
    pub fn allocate(&mut self, backend: &mut B, capacity: u32) -> Result<()> {
        if self.storage.is_some() {
            return Err(GpuError::AlreadyInitialized(self.name.clone()));
        }
        if capacity == 0 {
            return Err(self.invalid("capacity must be positive"));
        }

        let storage = backend.create_storage(Self::bytes_for(capacity), self.usage, &self.name)?;
        self.storage = Some(storage);
        self.capacity = capacity;
        self.slots.reset();

        tracing::debug!(
            buffer = %self.name,
            capacity,
            bytes = Self::bytes_for(capacity),
            "buffer allocated"
        );
        Ok(())
    }

    /// Append one element and return its slot.
    pub fn add(&mut self, backend: &mut B, item: &T) -> Result<u32> {
        self.add_range(backend, std::slice::from_ref(item))
    }

    /// Write `items` into one contiguous run and return its first slot.
    pub fn add_range(&mut self, backend: &mut B, items: &[T]) -> Result<u32> {
        let len = self.checked_len(items.len())?;
        if self.storage.is_none() {
            self.allocate(backend, self.initial_capacity.max(len))?;
        }

        let index = self.slots.next_index(len);
        let end = self.checked_end(index, len)?;
        if end > self.capacity {
            self.grow(backend, end)?;
        }

        self.write_slots(backend, index, items)?;
        self.slots.mark_used(end);
        Ok(index)
    }

    /// Write one element at a caller-chosen slot, growing to fit.
    pub fn insert(&mut self, backend: &mut B, index: u32, item: &T) -> Result<()> {
        self.insert_range(backend, index, std::slice::from_ref(item))
    }

    /// Write `items` starting at a caller-chosen slot, growing to fit.
    pub fn insert_range(&mut self, backend: &mut B, index: u32, items: &[T]) -> Result<()> {
        let len = self.checked_len(items.len())?;
        let end = self.checked_end(index, len)?;
        if self.storage.is_none() {
            self.allocate(backend, self.initial_capacity.max(end))?;
        } else if end > self.capacity {
            self.grow(backend, end)?;
        }

        self.write_slots(backend, index, items)?;
        self.slots.mark_used(end);
        Ok(())
    }

    /// Overwrite live slots. Never grows.
    pub fn update(&mut self, backend: &mut B, index: u32, items: &[T]) -> Result<()> {
        let len = self.checked_len(items.len())?;
        let end = self.checked_end(index, len)?;
        if self.storage.is_none() {
            return Err(GpuError::NotResident(self.name.clone()));
        }
        if end > self.slots.count() {
            return Err(self.out_of_range(index, end, self.slots.count()));
        }
        self.write_slots(backend, index, items)
    }

    /// Release one slot for reuse.
    pub fn remove(&mut self, index: u32) -> Result<()> {
        self.remove_range(index, 1)
    }

    /// Release a run of slots for reuse. Contents are left in place.
    pub fn remove_range(&mut self, index: u32, len: u32) -> Result<()> {
        if len == 0 {
            return Err(self.invalid("length must be positive"));
        }
        let end = self.checked_end(index, len)?;
        if end > self.capacity {
            return Err(self.out_of_range(index, end, self.capacity));
        }
        self.slots.release(index, len);
        Ok(())
    }

    /// Read one element back from storage.
    pub fn read(&self, backend: &B, index: u32) -> Result<T> {
        let mut items = self.read_range(backend, index, 1)?;
        items
            .pop()
            .ok_or_else(|| GpuError::InvalidState(format!("empty read of `{}`", self.name)))
    }

    /// Read `len` elements starting at `index`.
    pub fn read_range(&self, backend: &B, index: u32, len: u32) -> Result<Vec<T>> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| GpuError::NotResident(self.name.clone()))?;
        let end = self.checked_end(index, len)?;
        if end > self.capacity {
            return Err(self.out_of_range(index, end, self.capacity));
        }

        let mut items = vec![T::zeroed(); len as usize];
        backend.read(
            storage,
            Self::bytes_for(index),
            bytemuck::cast_slice_mut(&mut items),
        )?;
        Ok(items)
    }

    /// Grow to at least `capacity` slots. Never shrinks; a non-resident
    /// buffer is simply allocated.
    pub fn resize(&mut self, backend: &mut B, capacity: u32, mode: GrowthMode) -> Result<()> {
        if capacity == 0 {
            return Err(self.invalid("capacity must be positive"));
        }
        let Some(old) = self.storage.take() else {
            return self.allocate(backend, capacity);
        };
        if capacity <= self.capacity {
            self.storage = Some(old);
            return Ok(());
        }

        let mut new = match backend.create_storage(Self::bytes_for(capacity), self.usage, &self.name)
        {
            Ok(storage) => storage,
            Err(e) => {
                self.storage = Some(old);
                return Err(e);
            }
        };

        match mode {
            GrowthMode::Preserve => {
                let live_bytes = Self::bytes_for(self.slots.count());
                if let Err(e) = backend.copy(&old, &mut new, live_bytes) {
                    self.storage = Some(old);
                    backend.release(new)?;
                    return Err(e);
                }
            }
            GrowthMode::Discard => self.slots.reset(),
        }

        self.storage = Some(new);
        self.capacity = capacity;
        backend.release(old)
    }

    /// Partial in-place write of one field of a live element.
    pub(crate) fn write_field<F: Pod>(
        &mut self,
        backend: &mut B,
        index: u32,
        field_offset: usize,
        value: &F,
    ) -> Result<()> {
        debug_assert!(field_offset + size_of::<F>() <= size_of::<T>());
        if index >= self.slots.count() {
            return Err(self.out_of_range(index, index.saturating_add(1), self.slots.count()));
        }
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| GpuError::NotResident(self.name.clone()))?;
        let offset = Self::bytes_for(index) + field_offset as u64;
        backend.write(storage, offset, bytemuck::bytes_of(value))
    }

    /// Live versus allocated bytes.
    pub fn usage_report(&self) -> BufferUsageReport {
        let live = self.slots.count().saturating_sub(self.slots.free_slots());
        BufferUsageReport {
            name: self.name.clone(),
            used_bytes: Self::bytes_for(live),
            allocated_bytes: Self::bytes_for(self.capacity),
        }
    }

    /// Release the storage and return to the non-resident state.
    pub fn destroy(&mut self, backend: &mut B) -> Result<()> {
        self.capacity = 0;
        self.slots.reset();
        match self.storage.take() {
            Some(storage) => backend.release(storage),
            None => Ok(()),
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn grow(&mut self, backend: &mut B, required: u32) -> Result<()> {
        let scaled = (f64::from(self.capacity) * f64::from(self.growth_factor)).ceil();
        let scaled = scaled.min(f64::from(u32::MAX)) as u32;
        let new_capacity = scaled.max(required);

        let mode = if self.slots.count() == 0 {
            GrowthMode::Discard
        } else {
            tracing::warn!(
                buffer = %self.name,
                old_capacity = self.capacity,
                new_capacity,
                live = self.slots.count(),
                "buffer reallocation (potential frame spike)"
            );
            GrowthMode::Preserve
        };
        self.resize(backend, new_capacity, mode)
    }

    fn write_slots(&mut self, backend: &mut B, index: u32, items: &[T]) -> Result<()> {
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| GpuError::NotResident(self.name.clone()))?;
        backend.write(storage, Self::bytes_for(index), bytemuck::cast_slice(items))
    }

    fn checked_len(&self, len: usize) -> Result<u32> {
        match u32::try_from(len) {
            Ok(0) => Err(self.invalid("length must be positive")),
            Ok(len) => Ok(len),
            Err(_) => Err(self.invalid("length exceeds u32 slot range")),
        }
    }

    fn checked_end(&self, index: u32, len: u32) -> Result<u32> {
        index
            .checked_add(len)
            .ok_or_else(|| self.invalid("slot range exceeds u32"))
    }

    fn bytes_for(slots: u32) -> u64 {
        u64::from(slots) * Self::STRIDE
    }

    fn invalid(&self, reason: &str) -> GpuError {
        GpuError::InvalidArgument {
            buffer: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn out_of_range(&self, index: u32, end: u32, limit: u32) -> GpuError {
        GpuError::OutOfRange {
            buffer: self.name.clone(),
            index: index.into(),
            end: end.into(),
            limit: limit.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;

    type Buffer = GrowableBuffer<u32, HostBackend>;

    fn buffer(initial: u32) -> Buffer {
        Buffer::new("test", BufferUsage::STORAGE, initial)
    }

    #[test]
    fn allocate_twice_fails() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.allocate(&mut backend, 4).unwrap();
        assert!(matches!(
            buf.allocate(&mut backend, 8),
            Err(GpuError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn allocate_zero_fails() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        assert!(matches!(
            buf.allocate(&mut backend, 0),
            Err(GpuError::InvalidArgument { .. })
        ));
        assert!(!buf.is_allocated());
    }

    #[test]
    fn first_add_allocates_to_fit() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(2);
        let index = buf.add_range(&mut backend, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(index, 0);
        assert_eq!(buf.capacity(), 5);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn growth_from_four_to_six_preserves_contents() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.allocate(&mut backend, 4).unwrap();
        for value in 0..4 {
            assert_eq!(buf.add(&mut backend, &(value * 10)).unwrap(), value);
        }
        assert_eq!(buf.capacity(), 4);

        let fifth = buf.add(&mut backend, &40).unwrap();
        assert_eq!(fifth, 4);
        assert_eq!(buf.capacity(), 6);
        assert_eq!(
            buf.read_range(&backend, 0, 5).unwrap(),
            vec![0, 10, 20, 30, 40]
        );
        assert_eq!(backend.live_bytes(), 6 * 4);
    }

    #[test]
    fn capacity_is_monotonic() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(1);
        let mut last = 0;
        for round in 0..40u32 {
            match round % 3 {
                0 => {
                    buf.add(&mut backend, &round).unwrap();
                }
                1 => {
                    buf.add_range(&mut backend, &[round; 3]).unwrap();
                }
                _ => {
                    let requested = buf.capacity() / 2;
                    buf.resize(&mut backend, requested.max(1), GrowthMode::Preserve)
                        .unwrap();
                }
            }
            assert!(buf.capacity() >= last);
            assert!(buf.capacity() >= buf.len());
            last = buf.capacity();
        }
    }

    #[test]
    fn update_is_observed_by_read() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(2);
        let a = buf.add(&mut backend, &1).unwrap();
        let b = buf.add(&mut backend, &2).unwrap();
        buf.add_range(&mut backend, &[9; 8]).unwrap();

        buf.update(&mut backend, a, &[11]).unwrap();
        assert_eq!(buf.read(&backend, a).unwrap(), 11);
        assert_eq!(buf.read(&backend, b).unwrap(), 2);
    }

    #[test]
    fn update_past_count_fails() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(8);
        buf.add_range(&mut backend, &[1, 2]).unwrap();
        assert!(matches!(
            buf.update(&mut backend, 1, &[5, 6]),
            Err(GpuError::OutOfRange { limit: 2, .. })
        ));
    }

    #[test]
    fn update_before_allocation_fails() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(8);
        assert!(matches!(
            buf.update(&mut backend, 0, &[1]),
            Err(GpuError::NotResident(_))
        ));
    }

    #[test]
    fn exact_fit_reuses_removed_range() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(16);
        buf.add_range(&mut backend, &[1, 1]).unwrap();
        let removed = buf.add_range(&mut backend, &[2, 2, 2]).unwrap();
        buf.add_range(&mut backend, &[3]).unwrap();

        buf.remove_range(removed, 3).unwrap();
        let reused = buf.add_range(&mut backend, &[4, 4, 4]).unwrap();
        assert_eq!(reused, removed);
        assert!(buf.free_ranges().is_empty());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn shorter_request_splits_free_range() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(16);
        let first = buf.add_range(&mut backend, &[1; 5]).unwrap();
        buf.add(&mut backend, &2).unwrap();

        buf.remove_range(first, 5).unwrap();
        let reused = buf.add_range(&mut backend, &[7, 7]).unwrap();
        assert_eq!(reused, first);
        assert_eq!(buf.free_ranges(), &[FreeRange { index: 2, len: 3 }]);
    }

    #[test]
    fn longer_request_appends_at_end() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(16);
        let first = buf.add_range(&mut backend, &[1, 1]).unwrap();
        buf.add(&mut backend, &2).unwrap();

        buf.remove_range(first, 2).unwrap();
        let index = buf.add_range(&mut backend, &[3, 3, 3]).unwrap();
        assert_eq!(index, 3);
        assert_eq!(buf.free_ranges(), &[FreeRange { index: 0, len: 2 }]);
    }

    #[test]
    fn remove_past_capacity_fails() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.allocate(&mut backend, 4).unwrap();
        assert!(matches!(
            buf.remove_range(3, 2),
            Err(GpuError::OutOfRange { limit: 4, .. })
        ));
    }

    #[test]
    fn insert_grows_to_fit() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.add_range(&mut backend, &[1, 2, 3]).unwrap();
        buf.insert(&mut backend, 9, &99).unwrap();

        assert_eq!(buf.capacity(), 10);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.read_range(&backend, 0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(buf.read(&backend, 9).unwrap(), 99);
    }

    #[test]
    fn discard_resize_resets_slots() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.add_range(&mut backend, &[5, 6, 7]).unwrap();
        buf.remove(1).unwrap();

        buf.resize(&mut backend, 8, GrowthMode::Discard).unwrap();
        assert_eq!(buf.len(), 0);
        assert!(buf.free_ranges().is_empty());
        assert_eq!(buf.read_range(&backend, 0, 3).unwrap(), vec![0, 0, 0]);
        assert_eq!(backend.live_bytes(), 8 * 4);
    }

    #[test]
    fn resize_never_shrinks() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.allocate(&mut backend, 8).unwrap();
        buf.resize(&mut backend, 2, GrowthMode::Preserve).unwrap();
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn usage_report_counts_free_slots() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(10);
        buf.add_range(&mut backend, &[1; 4]).unwrap();
        buf.remove_range(0, 2).unwrap();

        let report = buf.usage_report();
        assert_eq!(report.used_bytes, 2 * 4);
        assert_eq!(report.allocated_bytes, 10 * 4);
    }

    #[test]
    fn destroy_releases_storage() {
        let mut backend = HostBackend::new();
        let mut buf = buffer(4);
        buf.add(&mut backend, &1).unwrap();
        buf.destroy(&mut backend).unwrap();

        assert!(!buf.is_allocated());
        assert!(buf.handle(&backend).is_none());
        assert_eq!(backend.live_bytes(), 0);
    }
}
