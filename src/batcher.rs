use std::{env, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dispatcher::Dispatcher,
    metrics::AppMetrics,
    queue::{AdmissionQueue, PendingRequest, SubmitError, ROUTING_MISS_MESSAGE},
};

/// `maxBatchSize`, the formation timeout, and the admission queue's
/// capacity multiplier.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub timeout: Duration,
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let max_batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(32);
        let timeout_ms = env::var("BATCH_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(50);

        Self {
            max_batch_size,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Queue capacity multiplier `K` (spec permits any `K >= 2`); larger `K`
/// smooths arrival bursts at the cost of memory.
const QUEUE_CAPACITY_MULTIPLIER: usize = 10;

/// Owns the admission queue and the single long-running batch-formation
/// worker. `Batcher::submit` is the ingress-facing entry point; everything
/// else happens on the worker task.
pub struct Batcher {
    queue: AdmissionQueue,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Batcher {
    pub fn new(config: BatchConfig, dispatcher: Dispatcher, metrics: Arc<AppMetrics>) -> Self {
        let (queue, rx) = AdmissionQueue::new(config.max_batch_size * QUEUE_CAPACITY_MULTIPLIER);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_batcher(rx, dispatcher, config, metrics, shutdown.clone()));

        Self {
            queue,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub async fn submit(
        &self,
        id: Uuid,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, SubmitError> {
        self.queue.submit(id, payload, timeout).await
    }

    /// Stop accepting the worker's attention to new arrivals past what's
    /// already queued, dispatch the in-progress partial batch, drain the
    /// rest of the queue into further batches, then return once the
    /// worker has terminated.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::warn!(error = %error, "batcher worker task panicked during shutdown");
            }
        }
    }
}

/// IDLE / FILLING / CLOSED as specified: collect requests off the queue
/// into a growing batch under a dual trigger (size OR a timer armed from
/// the first request), dispatch the closed batch, and route replies back
/// before returning to IDLE.
enum State {
    Idle,
    Filling {
        batch: Vec<PendingRequest>,
        deadline: Instant,
    },
}

async fn run_batcher(
    mut rx: tokio::sync::mpsc::Receiver<PendingRequest>,
    dispatcher: Dispatcher,
    config: BatchConfig,
    metrics: Arc<AppMetrics>,
    shutdown: CancellationToken,
) {
    let mut state = State::Idle;

    loop {
        state = match state {
            State::Idle => {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        drain_queue(&mut rx, &dispatcher, &config, &metrics).await;
                        break;
                    }
                    item = rx.recv() => {
                        match item {
                            Some(item) => State::Filling {
                                batch: vec![item],
                                deadline: Instant::now() + config.timeout,
                            },
                            None => break,
                        }
                    }
                }
            }
            State::Filling { mut batch, deadline } => {
                let shutdown_triggered = fill_batch(&mut batch, deadline, &mut rx, &config, &shutdown).await;

                dispatch_and_route(&dispatcher, batch, &metrics).await;

                if shutdown_triggered {
                    drain_queue(&mut rx, &dispatcher, &config, &metrics).await;
                    break;
                }

                State::Idle
            }
        };
    }

    info!("batcher worker terminated");
}

/// Grows `batch` until the size trigger fires, the per-batch timer
/// elapses, or shutdown is signaled. Returns `true` if shutdown was the
/// trigger. The size check happens synchronously right after each push
/// (never via a race against the timer), which is what guarantees the
/// size trigger wins ties rather than relying on `select!`'s
/// pseudo-random arm choice. `rx.recv()` is listed before `sleep_until`
/// in the `biased` select so an item already buffered in the channel is
/// always drained before a same-tick timer expiry closes the batch —
/// otherwise an arrival that would complete the batch could be deferred
/// to the next one, which is exactly the split the size-trigger-wins
/// rule forbids.
async fn fill_batch(
    batch: &mut Vec<PendingRequest>,
    deadline: Instant,
    rx: &mut tokio::sync::mpsc::Receiver<PendingRequest>,
    config: &BatchConfig,
    shutdown: &CancellationToken,
) -> bool {
    loop {
        if batch.len() >= config.max_batch_size {
            return false;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return true,
            item = rx.recv() => {
                match item {
                    Some(item) => batch.push(item),
                    None => return false,
                }
            }
            _ = tokio::time::sleep_until(deadline) => return false,
        }
    }
}

/// Pulls whatever is already sitting in the queue into further
/// size-bounded batches, with no timer — this runs only after shutdown,
/// once the ingress layer has stopped admitting new work, so there is
/// nothing left to wait for.
async fn drain_queue(
    rx: &mut tokio::sync::mpsc::Receiver<PendingRequest>,
    dispatcher: &Dispatcher,
    config: &BatchConfig,
    metrics: &Arc<AppMetrics>,
) {
    loop {
        let mut batch = Vec::new();
        while batch.len() < config.max_batch_size {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        if batch.is_empty() {
            break;
        }

        debug!(batch_size = batch.len(), "dispatching drain batch");
        dispatch_and_route(dispatcher, batch, metrics).await;
    }
}

async fn dispatch_and_route(dispatcher: &Dispatcher, batch: Vec<PendingRequest>, metrics: &Arc<AppMetrics>) {
    let size = batch.len();
    debug!(batch_size = size, "dispatching batch");

    let responses = dispatcher.dispatch(&batch).await;
    let mut by_id: std::collections::HashMap<_, _> =
        responses.into_iter().map(|response| (response.id, response)).collect();

    for request in batch {
        let response = by_id
            .remove(&request.id)
            .unwrap_or_else(|| crate::queue::Response::err(request.id, ROUTING_MISS_MESSAGE));
        request.reply(response);
    }

    metrics.observe_batch(size as u64);
}
