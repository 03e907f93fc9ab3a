//! Bounded worker pool.
//!
//! A fixed number of long-lived worker tasks pull jobs from one shared FIFO
//! queue. Each worker runs one job to completion before taking the next, so
//! at most `size` jobs run at once and the rest wait in the queue.
//!
//! ```text
//!   submit() ──► [ job | job | job ]  (unbounded FIFO)
//!                      │
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//!      worker 0    worker 1 ... worker N-1
//! ```
//!
//! Shutdown stops the queue, wakes idle workers, and waits up to a grace
//! period for busy workers to finish before aborting them. Jobs still queued
//! at shutdown are dropped without running.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A fixed-size pool of workers processing jobs of type `T`.
pub struct WorkerPool<T> {
    sender: Option<mpsc::UnboundedSender<T>>,
    shutdown: watch::Sender<bool>,
    workers: JoinSet<()>,
    busy: Arc<AtomicUsize>,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `size` workers that each run `serve` on one job at a time.
    pub fn start<F, Fut>(size: usize, serve: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let serve = Arc::new(serve);
        let busy = Arc::new(AtomicUsize::new(0));

        let mut workers = JoinSet::new();
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let serve = Arc::clone(&serve);
            let busy = Arc::clone(&busy);
            let mut shutdown_rx = shutdown_rx.clone();

            workers.spawn(async move {
                debug!(worker = id, "Worker started");
                loop {
                    let job = tokio::select! {
                        biased;
                        _ = async {
                            let _ = shutdown_rx.wait_for(|stop| *stop).await;
                        } => None,
                        job = async { receiver.lock().await.recv().await } => job,
                    };

                    let Some(job) = job else { break };

                    let _busy = BusyGuard::enter(&busy);
                    serve(job).await;
                }
                debug!(worker = id, "Worker stopped");
            });
        }

        Self {
            sender: Some(sender),
            shutdown,
            workers,
            busy,
            size,
        }
    }

    /// Queues a job. Returns the job back if the pool is shutting down.
    pub fn submit(&self, job: T) -> Result<(), T> {
        match &self.sender {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently running a job.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    /// Stops the pool.
    ///
    /// Returns true if every in-flight job finished within `grace`; false if
    /// stragglers had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.sender.take();
        let _ = self.shutdown.send(true);

        let in_flight = self.busy();
        if in_flight > 0 {
            info!(sessions = in_flight, grace_secs = grace.as_secs(), "Waiting for in-flight sessions");
        }

        let drained = tokio::time::timeout(grace, Self::join_all(&mut self.workers))
            .await
            .is_ok();

        if !drained {
            warn!(
                sessions = self.busy(),
                "Grace period elapsed, aborting remaining sessions"
            );
            self.workers.abort_all();
            Self::join_all(&mut self.workers).await;
        }

        drained
    }

    async fn join_all(workers: &mut JoinSet<()>) {
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Worker panicked");
                }
            }
        }
    }
}

/// Counts one running job for as long as it is alive.
///
/// Dropped on completion, on panic, and when the worker is aborted.
struct BusyGuard(Arc<AtomicUsize>);

impl BusyGuard {
    fn enter(busy: &Arc<AtomicUsize>) -> Self {
        busy.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(busy))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_runs_submitted_jobs() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(2, move |n: u32| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send(n * 10);
            }
        });

        for n in 1..=4 {
            pool.submit(n).unwrap();
        }

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(done_rx.recv().await.unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, vec![10, 20, 30, 40]);

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pool = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            WorkerPool::start(2, move |_: ()| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
        };

        for _ in 0..6 {
            pool.submit(()).unwrap();
        }
        sleep(Duration::from_millis(200)).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_after_grace() {
        let (started_tx, started_rx) = oneshot::channel();
        let started_tx = Arc::new(std::sync::Mutex::new(Some(started_tx)));

        let pool = WorkerPool::start(1, move |_: ()| {
            let started_tx = Arc::clone(&started_tx);
            async move {
                let tx = started_tx.lock().unwrap().take();
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                sleep(Duration::from_secs(60)).await;
            }
        });

        pool.submit(()).unwrap();
        started_rx.await.unwrap();
        assert_eq!(pool.busy(), 1);

        let busy = Arc::clone(&pool.busy);
        assert!(!pool.shutdown(Duration::from_millis(50)).await);
        assert_eq!(busy.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_is_not_counted_busy() {
        let pool = WorkerPool::start(2, |fail: bool| async move {
            if fail {
                panic!("job failed");
            }
        });

        pool.submit(true).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.busy(), 0);

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_queued_jobs_dropped_at_shutdown() {
        let ran = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = watch::channel(false);

        let pool = {
            let ran = Arc::clone(&ran);
            WorkerPool::start(1, move |_: ()| {
                let ran = Arc::clone(&ran);
                let mut release_rx = release_rx.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    let _ = release_rx.wait_for(|go| *go).await;
                }
            })
        };

        for _ in 0..3 {
            pool.submit(()).unwrap();
        }
        sleep(Duration::from_millis(50)).await;

        let shutdown = tokio::spawn(pool.shutdown(Duration::from_secs(5)));
        sleep(Duration::from_millis(20)).await;
        release_tx.send(true).unwrap();

        assert!(shutdown.await.unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_pool_shuts_down_cleanly() {
        let pool = WorkerPool::start(1, |_: u8| async {});
        assert_eq!(pool.size(), 1);
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }
}
