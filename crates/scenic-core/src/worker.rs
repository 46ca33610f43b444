//! Background worker thread for CPU-bound jobs such as texture decoding.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender, TrySendError};

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() + Send>;

/// Work request sent to the worker thread.
enum WorkerRequest {
    /// Run a task.
    Run(Task),
    /// Signal the worker thread to shut down.
    Shutdown,
}

/// Handle to a single background worker thread.
///
/// Jobs run in submission order. Results are expected to travel back to the
/// main thread through a [`DispatchSender`](crate::DispatchSender).
pub struct BackgroundWorker {
    name: String,
    request_tx: Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawn a worker with a bounded request queue.
    pub fn spawn(name: impl Into<String>, queue_capacity: usize) -> Result<Self> {
        let name = name.into();
        let (request_tx, request_rx) = channel::bounded::<WorkerRequest>(queue_capacity.max(1));

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Block waiting for work until shutdown or disconnect
                while let Ok(WorkerRequest::Run(task)) = request_rx.recv() {
                    task();
                }
            })
            .map_err(|e| Error::Worker(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            request_tx,
            thread: Some(thread),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job, blocking while the queue is full.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.request_tx
            .send(WorkerRequest::Run(Box::new(job)))
            .map_err(|_| Error::ChannelClosed("background worker"))
    }

    /// Queue a job without blocking. Returns `Ok(false)` if the queue is full.
    pub fn try_submit<F>(&self, job: F) -> Result<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.request_tx.try_send(WorkerRequest::Run(Box::new(job))) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(Error::ChannelClosed("background worker")),
        }
    }

    /// Shut the worker down after the jobs already queued have run.
    pub fn shutdown(&mut self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainThreadDispatcher;

    #[test]
    fn results_come_back_through_dispatcher() {
        let dispatcher = MainThreadDispatcher::<Vec<u64>>::new(0);
        let mut worker = BackgroundWorker::spawn("test-worker", 4).unwrap();

        for i in 0..3u64 {
            let sender = dispatcher.sender();
            worker
                .submit(move || {
                    let squared = i * i;
                    let _ = sender.post(move |out: &mut Vec<u64>| {
                        out.push(squared);
                        Ok(())
                    });
                })
                .unwrap();
        }
        worker.shutdown();

        let mut out = Vec::new();
        dispatcher.drain(&mut out);
        assert_eq!(out, vec![0, 1, 4]);
    }
}
