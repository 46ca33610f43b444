//! Main-thread dispatcher.
//!
//! GPU objects may only be created on the thread that owns the device
//! context. Work finished on a background thread posts a completion closure
//! here; the frame loop drains the queue once per frame, executing at most
//! a bounded number of closures per call.

use std::panic::{self, AssertUnwindSafe};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{Error, Result};

type Job<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()> + Send>;

/// Thread-safe queue of closures executed on the main thread.
///
/// `C` is the main-thread state the closures receive when they run.
pub struct MainThreadDispatcher<C> {
    tx: Sender<Job<C>>,
    rx: Receiver<Job<C>>,
    per_drain_limit: usize,
}

/// Cloneable producer handle that can be moved to other threads.
pub struct DispatchSender<C> {
    tx: Sender<Job<C>>,
}

impl<C> Clone for DispatchSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> DispatchSender<C> {
    /// Queue a closure for execution on the main thread.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| Error::ChannelClosed("main-thread dispatcher"))
    }
}

/// Outcome of one [`MainThreadDispatcher::drain`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Closures that ran to completion.
    pub completed: usize,
    /// Closures that returned an error or panicked.
    pub failed: usize,
    /// Closures still queued after this drain.
    pub remaining: usize,
}

impl<C> MainThreadDispatcher<C> {
    /// Create a dispatcher executing at most `per_drain_limit` closures per
    /// drain. A limit of zero means unbounded.
    pub fn new(per_drain_limit: usize) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            per_drain_limit,
        }
    }

    /// Get a producer handle.
    pub fn sender(&self) -> DispatchSender<C> {
        DispatchSender {
            tx: self.tx.clone(),
        }
    }

    /// Queue a closure from the main thread itself.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        // The dispatcher owns a receiver, so the channel cannot be disconnected here.
        let _ = self.tx.send(Box::new(job));
    }

    /// Number of queued closures.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Execute queued closures against `ctx`.
    ///
    /// Errors and panics are logged and counted; they never stop the drain.
    pub fn drain(&self, ctx: &mut C) -> DrainStats {
        let limit = if self.per_drain_limit == 0 {
            usize::MAX
        } else {
            self.per_drain_limit
        };

        let mut stats = DrainStats::default();
        while stats.completed + stats.failed < limit {
            let Ok(job) = self.rx.try_recv() else {
                break;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| job(&mut *ctx))) {
                Ok(Ok(())) => stats.completed += 1,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "dispatched callback failed");
                    stats.failed += 1;
                }
                Err(_) => {
                    tracing::error!("dispatched callback panicked");
                    stats.failed += 1;
                }
            }
        }

        stats.remaining = self.rx.len();
        stats
    }
}

impl<C> Default for MainThreadDispatcher<C> {
    fn default() -> Self {
        Self::new(32)
    }
}
