//! Bounded-concurrency, bounded-backlog fallible job executor.
//!
//! Mirrors the shape of a classic fixed-size worker pool: a bounded job
//! queue feeding `max_workers` long-running tasks, with a bounded
//! failure-result queue the caller drains for diagnostics. The producer
//! side (`submit`) is always non-blocking — a full queue returns
//! immediately rather than stalling the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, SubmitError};

/// A unit of work: publish one message to one broker.
pub type Job = Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send>>;

/// A job's failure, handed to the dispatcher for logging.
#[derive(Debug)]
pub struct FailedResult {
    /// Id of the worker task that observed the failure.
    pub worker_id: usize,
    /// The error returned by the job.
    pub error: BrokerError,
}

/// Fixed-size pool of worker tasks draining a bounded job queue.
pub struct WorkerPool {
    max_workers: usize,
    job_tx: mpsc::Sender<Job>,
    job_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Job>>>,
    result_rx: tokio::sync::Mutex<Option<mpsc::Receiver<FailedResult>>>,
    result_tx: mpsc::Sender<FailedResult>,
    cancel: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Results dropped because the failure-result queue was full.
    pub dropped_results: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Construct a pool. `queue_size` and `max_workers` below 1 are clamped
    /// to 1, matching the reference implementation's leniency toward
    /// misconfigured values rather than failing startup over them.
    #[must_use]
    pub fn new(queue_size: usize, max_workers: usize) -> Self {
        let queue_size = queue_size.max(1);
        let max_workers = max_workers.max(1);
        if queue_size == 0 || max_workers == 0 {
            log::warn!("workerpool: queueSize/maxWorkers clamped to >= 1");
        }

        let (job_tx, job_rx) = mpsc::channel(queue_size);
        let (result_tx, result_rx) = mpsc::channel(queue_size);

        Self {
            max_workers,
            job_tx,
            job_rx: tokio::sync::Mutex::new(Some(job_rx)),
            result_rx: tokio::sync::Mutex::new(Some(result_rx)),
            result_tx,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handles: tokio::sync::Mutex::new(Vec::new()),
            dropped_results: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn `max_workers` worker tasks. Must be called before `submit`.
    pub async fn start(self: &Arc<Self>) {
        let job_rx = self.job_rx.lock().await.take().expect("start() called more than once");
        // A single mpsc::Receiver has one owner; workers round-robin for
        // jobs by taking turns locking it, the standard pattern for a
        // multi-consumer mpsc in tokio.
        let shared_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        let mut handles = self.handles.lock().await;
        for worker_id in 0..self.max_workers {
            let rx = Arc::clone(&shared_rx);
            let result_tx = self.result_tx.clone();
            let cancel = self.cancel.clone();
            let dropped = Arc::clone(&self.dropped_results);

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, result_tx, cancel, dropped).await;
            }));
        }
        self.started.store(true, Ordering::SeqCst);
    }

    /// Non-blocking enqueue. See [`SubmitError`] for the failure policy.
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SubmitError::Closed);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubmitError::Closed);
        }
        if self.cancel.is_cancelled() {
            return Err(SubmitError::Cancelled);
        }
        self.job_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Idempotent shutdown: signal cancellation, let any in-flight job
    /// finish, then wait for every worker task to exit. Jobs still sitting
    /// in the queue when this is called may never run — see the worker
    /// loop's cancellation-first `select!`.
    pub async fn stop(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Take ownership of the failure-result receiver. Call once, typically
    /// from the dispatcher's coordination task.
    pub async fn take_result_receiver(&self) -> mpsc::Receiver<FailedResult> {
        self.result_rx.lock().await.take().expect("take_result_receiver() called more than once")
    }

    /// Number of workers this pool was configured with.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    result_tx: mpsc::Sender<FailedResult>,
    cancel: CancellationToken,
    dropped_results: Arc<AtomicU64>,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                job = guard.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        if let Err(error) = job.await {
            let result = FailedResult { worker_id, error };
            if result_tx.try_send(result).is_err() {
                dropped_results.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_queue_size_and_workers_clamp_to_one() {
        let pool = Arc::new(WorkerPool::new(0, 0));
        assert_eq!(pool.max_workers(), 1);
    }

    #[tokio::test]
    async fn submit_before_start_is_closed() {
        let pool = Arc::new(WorkerPool::new(4, 2));
        let err = pool.submit(Box::pin(async { Ok(()) })).unwrap_err();
        assert_eq!(err, SubmitError::Closed);
    }

    #[tokio::test]
    async fn submit_after_start_runs_the_job() {
        let pool = Arc::new(WorkerPool::new(4, 2));
        pool.start().await;

        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        pool.submit(Box::pin(async move {
            ran2.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
        pool.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_is_closed() {
        let pool = Arc::new(WorkerPool::new(4, 1));
        pool.start().await;
        pool.stop().await;
        let err = pool.submit(Box::pin(async { Ok(()) })).unwrap_err();
        assert_eq!(err, SubmitError::Closed);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let pool = Arc::new(WorkerPool::new(1, 1));
        pool.start().await;

        // Occupy the single worker with a long-running job so the queued
        // job behind it is never drained during this test.
        pool.submit(Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.submit(Box::pin(async { Ok(()) })).unwrap();
        let err = pool.submit(Box::pin(async { Ok(()) })).unwrap_err();
        assert_eq!(err, SubmitError::Full);
    }

    #[tokio::test]
    async fn failed_job_surfaces_on_result_queue() {
        let pool = Arc::new(WorkerPool::new(4, 1));
        let mut results = pool.take_result_receiver().await;
        pool.start().await;

        pool.submit(Box::pin(async {
            Err(BrokerError::Transport { name: "b1".to_string(), source: anyhow::anyhow!("boom") })
        }))
        .unwrap();

        let failed = tokio::time::timeout(Duration::from_secs(1), results.recv()).await.unwrap().unwrap();
        assert!(matches!(failed.error, BrokerError::Transport { .. }));
        pool.stop().await;
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_max_workers() {
        let pool = Arc::new(WorkerPool::new(10, 2));
        pool.start().await;

        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            pool.submit(Box::pin(async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.stop().await;
    }
}
