//! A work queue with two task affinities.
//!
//! *Any* tasks run in parallel on a fixed number of workers. *Serial* tasks run
//! one at a time on the loop that called [`WorkQueue::run`], which makes that
//! loop the only place shared accumulators are mutated. Tasks of either kind
//! may post more tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::JobError;

/// A unit of work. It receives the queue so it can post follow-up tasks.
pub type Task = Box<dyn FnOnce(&WorkQueue) + Send + 'static>;

#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

struct Inner {
    num_workers: usize,
    any_tx: UnboundedSender<Task>,
    any_rx: Arc<tokio::sync::Mutex<UnboundedReceiver<Task>>>,
    serial_tx: UnboundedSender<Task>,
    serial_rx: tokio::sync::Mutex<UnboundedReceiver<Task>>,
    stop: Mutex<StopState>,
}

struct StopState {
    token: CancellationToken,
    error: Option<JobError>,
}

impl WorkQueue {
    pub fn new(num_workers: usize) -> Self {
        let (any_tx, any_rx) = mpsc::unbounded_channel();
        let (serial_tx, serial_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                num_workers: num_workers.max(1),
                any_tx,
                any_rx: Arc::new(tokio::sync::Mutex::new(any_rx)),
                serial_tx,
                serial_rx: tokio::sync::Mutex::new(serial_rx),
                stop: Mutex::new(StopState {
                    token: CancellationToken::new(),
                    error: None,
                }),
            }),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.inner.num_workers
    }

    /// Post a task that may run on any worker, in parallel with others.
    pub fn post_any_task(&self, task: impl FnOnce(&WorkQueue) + Send + 'static) {
        // The receiving half lives as long as `inner`, so sending cannot fail.
        let _ = self.inner.any_tx.send(Box::new(task));
    }

    /// Post a task that runs on the serial loop, never concurrently with
    /// another serial task. Tasks posted from one producer run in order.
    pub fn post_serial_task(&self, task: impl FnOnce(&WorkQueue) + Send + 'static) {
        let _ = self.inner.serial_tx.send(Box::new(task));
    }

    /// Ask the queue to drain and halt.
    ///
    /// The first error passed to `stop` is kept and returned by [`run`]. Later
    /// calls only add an error if none was recorded yet.
    ///
    /// [`run`]: WorkQueue::run
    pub fn stop(&self, error: Option<JobError>) {
        let mut stop = self.inner.stop.lock();
        if stop.error.is_none() {
            stop.error = error;
        }
        stop.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.lock().token.is_cancelled()
    }

    /// Run until [`stop`](WorkQueue::stop) is called.
    ///
    /// After the stop request, tasks already picked up by a worker finish,
    /// serial tasks they posted are executed, and everything still queued is
    /// dropped.
    pub async fn run(&self) -> Result<(), JobError> {
        let token = self.inner.stop.lock().token.clone();

        let mut workers = JoinSet::new();
        for id in 0..self.inner.num_workers {
            let queue = self.clone();
            let token = token.clone();
            workers.spawn(async move { queue.worker_loop(id, token).await });
        }

        let mut serial_rx = self.inner.serial_rx.lock().await;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                task = serial_rx.recv() => match task {
                    Some(task) => task(self),
                    None => break,
                },
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("worker loop exited abnormally: {}", e);
            }
        }

        // Workers are gone, so no new serial tasks can appear except those
        // posted by the serial tasks themselves.
        while let Ok(task) = serial_rx.try_recv() {
            task(self);
        }
        drop(serial_rx);

        let dropped = self.discard_any_tasks().await;
        if dropped > 0 {
            debug!(dropped, "discarded tasks left in the queue after stop");
        }

        match &self.inner.stop.lock().error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Restore an empty, runnable queue.
    pub async fn reset(&self) {
        self.discard_any_tasks().await;
        {
            let mut serial_rx = self.inner.serial_rx.lock().await;
            while serial_rx.try_recv().is_ok() {}
        }

        let mut stop = self.inner.stop.lock();
        stop.token = CancellationToken::new();
        stop.error = None;
    }

    async fn discard_any_tasks(&self) -> usize {
        let mut any_rx = self.inner.any_rx.lock().await;
        let mut dropped = 0;
        while any_rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    async fn worker_loop(self, id: usize, token: CancellationToken) {
        loop {
            let task = {
                let mut any_rx = self.inner.any_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    task = any_rx.recv() => task,
                }
            };
            let Some(task) = task else { break };

            let queue = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || task(&queue)).await {
                error!(worker = id, "task panicked: {}", e);
                self.stop(Some(JobError::TaskPanicked(e.to_string())));
            }
        }
        debug!(worker = id, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn serial_tasks_never_overlap() {
        let queue = WorkQueue::new(8);
        let active = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let total = 64;

        for _ in 0..total {
            let active = active.clone();
            let done = done.clone();
            queue.post_any_task(move |queue| {
                queue.post_serial_task(move |queue| {
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(std::time::Duration::from_micros(50));
                    active.fetch_sub(1, Ordering::SeqCst);
                    if done.fetch_add(1, Ordering::SeqCst) + 1 == total {
                        queue.stop(None);
                    }
                });
            });
        }

        queue.run().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), total);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_error_is_returned_from_run() {
        let queue = WorkQueue::new(2);
        queue.post_any_task(|queue| {
            queue.stop(Some(JobError::Store("disk full".into())));
        });

        let err = queue.run().await.unwrap_err();
        assert_eq!(err, JobError::Store("disk full".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_stop_error_wins() {
        let queue = WorkQueue::new(1);
        queue.post_serial_task(|queue| {
            queue.stop(Some(JobError::TaskPanicked("first".into())));
            queue.stop(Some(JobError::TaskPanicked("second".into())));
        });

        let err = queue.run().await.unwrap_err();
        assert_eq!(err, JobError::TaskPanicked("first".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_posted_last_runs_after_earlier_tasks_are_picked_up() {
        let queue = WorkQueue::new(4);
        let sum = Arc::new(Mutex::new(0));

        for i in 1..=100 {
            let sum = sum.clone();
            queue.post_any_task(move |queue| {
                queue.post_serial_task(move |_| *sum.lock() += i);
            });
        }
        queue.post_any_task(|queue| queue.stop(None));

        queue.run().await.unwrap();
        assert_eq!(*sum.lock(), 5050);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_task_stops_the_queue() {
        let queue = WorkQueue::new(2);
        queue.post_any_task(|_| panic!("boom"));

        let err = queue.run().await.unwrap_err();
        assert!(matches!(err, JobError::TaskPanicked(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_makes_the_queue_reusable() {
        let queue = WorkQueue::new(2);
        queue.post_any_task(|queue| queue.stop(Some(JobError::Store("x".into()))));
        assert!(queue.run().await.is_err());
        assert!(queue.is_stopped());

        queue.reset().await;
        assert!(!queue.is_stopped());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        queue.post_any_task(move |queue| {
            counter.fetch_add(1, Ordering::SeqCst);
            queue.stop(None);
        });
        queue.run().await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serial_tasks_queued_before_stop_still_run() {
        let queue = WorkQueue::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        queue.post_serial_task(|queue| queue.stop(None));
        for _ in 0..10 {
            let ran = ran.clone();
            queue.post_serial_task(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.run().await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn any_tasks_left_after_stop_are_dropped() {
        let queue = WorkQueue::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        queue.post_any_task(|queue| queue.stop(None));
        for _ in 0..10 {
            let ran = ran.clone();
            queue.post_any_task(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.run().await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
