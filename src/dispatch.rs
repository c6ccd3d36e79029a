//! Fixed-size worker pool fed through a bounded queue.
//!
//! The queue holds at most one item per worker, so a producer that outruns
//! the workers blocks in [`WorkerPool::submit`]. Shutdown is cooperative:
//! one [`Message::Shutdown`] per worker is queued behind the remaining work
//! and the workers are joined.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::IngestError;

pub enum Message<T> {
    Work(T),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub workers: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct WorkerPool<T> {
    sender: Sender<Message<T>>,
    handles: Vec<JoinHandle<PoolReport>>,
}

pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

impl<T> WorkerPool<T>
where
    T: fmt::Debug + Send + 'static,
{
    pub fn spawn<F>(size: usize, handler: F) -> Result<Self, IngestError>
    where
        F: Fn(T) -> Result<(), IngestError> + Send + Sync + 'static,
    {
        if size == 0 {
            return Err(IngestError::WorkerPool(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        let (sender, receiver) = bounded(size);
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(format!("conformer-worker-{index}"))
                .spawn(move || worker_loop(index, receiver, handler.as_ref()))
                .map_err(|err| IngestError::WorkerPool(err.to_string()))?;
            handles.push(handle);
        }
        Ok(Self { sender, handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queues `item`, blocking while the queue is full.
    pub fn submit(&self, item: T) -> Result<(), IngestError> {
        self.sender
            .send(Message::Work(item))
            .map_err(|_| IngestError::WorkerPool("all workers have exited".to_string()))
    }

    /// Drains the queue and joins every worker.
    pub fn shutdown(self) -> Result<PoolReport, IngestError> {
        for _ in 0..self.handles.len() {
            self.sender
                .send(Message::Shutdown)
                .map_err(|_| IngestError::WorkerPool("all workers have exited".to_string()))?;
        }
        let mut report = PoolReport {
            workers: self.handles.len(),
            ..PoolReport::default()
        };
        for handle in self.handles {
            let worker = handle
                .join()
                .map_err(|_| IngestError::WorkerPool("worker thread panicked".to_string()))?;
            report.completed += worker.completed;
            report.failed += worker.failed;
        }
        Ok(report)
    }
}

fn worker_loop<T, F>(index: usize, receiver: Receiver<Message<T>>, handler: &F) -> PoolReport
where
    T: fmt::Debug,
    F: Fn(T) -> Result<(), IngestError>,
{
    let mut report = PoolReport {
        workers: 1,
        ..PoolReport::default()
    };
    while let Ok(message) = receiver.recv() {
        let item = match message {
            Message::Work(item) => item,
            Message::Shutdown => break,
        };
        let description = format!("{item:?}");
        match panic::catch_unwind(AssertUnwindSafe(|| handler(item))) {
            Ok(Ok(())) => report.completed += 1,
            Ok(Err(err)) => {
                warn!(worker = index, job = %description, error = %err, "work item failed");
                report.failed += 1;
            }
            Err(_) => {
                error!(worker = index, job = %description, "work item panicked");
                report.failed += 1;
            }
        }
    }
    debug!(
        worker = index,
        completed = report.completed,
        failed = report.failed,
        "worker exiting"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn failures_do_not_stop_worker() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pool = WorkerPool::spawn(1, move |item: usize| {
            counter.fetch_add(1, Ordering::SeqCst);
            match item {
                1 => Err(IngestError::Toolkit("boom".to_string())),
                2 => panic!("worker panic"),
                _ => Ok(()),
            }
        })
        .unwrap();
        for item in 0..5 {
            pool.submit(item).unwrap();
        }
        let report = pool.shutdown().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 2);
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(WorkerPool::<usize>::spawn(0, |_| Ok(())).is_err());
    }
}
