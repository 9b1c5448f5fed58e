//! Coordination task that routes ingested messages to the worker pool.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerRegistry;
use crate::error::SubmitError;
use crate::message::Message;
use crate::workerpool::WorkerPool;

/// Owns the ingestion queue and broker registry, and runs the single
/// coordination task that fans messages out to the worker pool.
pub struct Dispatcher {
    ingest_tx: mpsc::Sender<Message>,
    ingest_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    registry: BrokerRegistry,
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
    coordinator: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Construct a dispatcher over an already-connected broker registry.
    #[must_use]
    pub fn new(queue_size: usize, max_workers: usize, registry: BrokerRegistry) -> Self {
        let (ingest_tx, ingest_rx) = mpsc::channel(queue_size.max(1));
        Self {
            ingest_tx,
            ingest_rx: tokio::sync::Mutex::new(Some(ingest_rx)),
            registry,
            pool: Arc::new(WorkerPool::new(queue_size, max_workers)),
            cancel: CancellationToken::new(),
            coordinator: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the worker pool's worker tasks. Call once before [`Self::start`].
    pub async fn start_worker_pool(&self) {
        self.pool.start().await;
    }

    /// Spawn the coordination task. Call once, after `start_worker_pool`.
    pub async fn start(self: &Arc<Self>) {
        let mut ingest_rx = self.ingest_rx.lock().await.take().expect("start() called more than once");
        let mut result_rx = self.pool.take_result_receiver().await;
        let cancel = self.cancel.clone();
        let registry = Arc::clone(&self.registry);
        let pool = Arc::clone(&self.pool);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_message = ingest_rx.recv() => {
                        match maybe_message {
                            Some(message) => dispatch_message(&registry, &pool, message),
                            None => break,
                        }
                    }
                    maybe_result = result_rx.recv() => {
                        if let Some(failed) = maybe_result {
                            log::error!(
                                "worker {} publish failed: {}",
                                failed.worker_id,
                                failed.error
                            );
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }

            // The select above is unbiased, so cancellation may win a race
            // against a message that was already accepted into the
            // ingestion queue (submit() returned true before this task
            // observed cancellation). Drain whatever is left before
            // stopping the pool so no accepted message is lost.
            while let Ok(message) = ingest_rx.try_recv() {
                dispatch_message(&registry, &pool, message);
            }

            pool.stop().await;
            log::info!("dispatcher coordination task stopped");
        });

        *self.coordinator.lock().await = Some(handle);
    }

    /// Non-blocking enqueue onto the ingestion queue. Returns `false` when
    /// the queue is full, closed, or shutdown has been requested — callers
    /// (ingress adapters) are expected to drop-log on `false`.
    pub fn submit(&self, message: Message) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.ingest_tx.try_send(message).is_ok()
    }

    /// Cancel the coordination task and wait for the pool to drain.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.coordinator.lock().await.take() {
            let _ = handle.await;
        }
    }
}

fn dispatch_message(registry: &BrokerRegistry, pool: &Arc<WorkerPool>, message: Message) {
    for broker_name in &message.target_brokers {
        let Some(broker) = registry.get(broker_name) else {
            log::error!(
                "message {} targets unknown broker {} (device={}, topic={})",
                message.id,
                broker_name,
                message.device_id,
                message.topic
            );
            continue;
        };

        let broker = Arc::clone(broker);
        let job_message = message.clone();
        let job: crate::workerpool::Job = Box::pin(async move { broker.publish(&job_message).await });

        if let Err(err) = pool.submit(job) {
            log_submit_failure(&message, broker_name, err);
        }
    }
}

fn log_submit_failure(message: &Message, broker_name: &str, err: SubmitError) {
    log::error!(
        "failed to submit publish job for message {} to broker {}: {err} (device={}, topic={})",
        message.id,
        broker_name,
        message.device_id,
        message.topic
    );
}
