//! Deferred release of retired buffer storage.
//!
//! A grown or destroyed buffer may still be read by a frame the GPU has not
//! finished. Retired storage waits here, tagged with the frame it was retired
//! in, until every frame that could reference it has completed.

use crate::error::Result;
use crate::memory::{GpuAllocator, GpuBuffer};
use std::collections::VecDeque;

struct Retired {
    buffer: GpuBuffer,
    frame: u64,
}

/// FIFO of retired buffers keyed by frame number.
pub struct DeferredDeletionQueue {
    pending: VecDeque<Retired>,
    frames_in_flight: usize,
}

impl DeferredDeletionQueue {
    /// Buffers are held for `frames_in_flight` frames before being freed.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight,
        }
    }

    /// Retire a buffer in frame `frame_number`.
    pub fn queue(&mut self, buffer: GpuBuffer, frame_number: u64) {
        self.pending.push_back(Retired {
            buffer,
            frame: frame_number,
        });
    }

    /// Free everything retired more than `frames_in_flight` frames ago.
    /// Returns the number of buffers freed.
    pub fn process(&mut self, allocator: &mut GpuAllocator, current_frame: u64) -> Result<usize> {
        let cutoff = current_frame.saturating_sub(self.frames_in_flight as u64);

        let mut freed = 0;
        while let Some(front) = self.pending.front() {
            if front.frame >= cutoff {
                break;
            }
            if let Some(mut retired) = self.pending.pop_front() {
                allocator.free_buffer(&mut retired.buffer)?;
                freed += 1;
            }
        }
        Ok(freed)
    }

    /// Free everything. Call after `device_wait_idle`.
    pub fn flush(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        while let Some(mut retired) = self.pending.pop_front() {
            allocator.free_buffer(&mut retired.buffer)?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Bytes still held by retired buffers.
    pub fn pending_bytes(&self) -> u64 {
        self.pending.iter().map(|r| r.buffer.size).sum()
    }

    pub fn set_frames_in_flight(&mut self, frames_in_flight: usize) {
        self.frames_in_flight = frames_in_flight;
    }
}
