use std::time::Duration;

use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use uuid::Uuid;

/// The error message synthesized when a batch's reply carries no entry for
/// a given id — a routing miss (spec §4.3/§4.4). Shared between the
/// dispatcher and the batcher's drain path so both sides of the "no entry
/// for this id" case produce an identical, matchable message, and so
/// `AppError` can distinguish a routing miss from any other backend
/// failure without inventing a separate channel for it.
pub const ROUTING_MISS_MESSAGE: &str = "response not found";

/// A request admitted into the pipeline: its correlation id, opaque
/// payload, and the single-use slot its eventual [`Response`] is delivered
/// to. Ownership passes from the submitting ingress call to the batcher at
/// the moment it is pulled off the queue.
pub struct PendingRequest {
    pub id: Uuid,
    pub payload: Value,
    pub(crate) reply_tx: oneshot::Sender<Response>,
}

impl PendingRequest {
    /// Deliver `response` to this request's caller and close the slot.
    /// The slot is single-buffered, so this never blocks even if the
    /// caller has already abandoned its wait.
    pub fn reply(self, response: Response) {
        let _ = self.reply_tx.send(response);
    }
}

/// The result tuple corresponding to one [`PendingRequest`]: the same
/// correlation id, and either a result payload or an error message, never
/// both.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: Uuid,
    pub outcome: Result<Value, String>,
}

impl Response {
    pub fn ok(id: Uuid, value: Value) -> Self {
        Self {
            id,
            outcome: Ok(value),
        }
    }

    pub fn err(id: Uuid, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Err(message.into()),
        }
    }
}

/// Why a [`Submit`](AdmissionQueue::submit) call failed to produce a
/// result for its caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The caller's deadline elapsed (or it cancelled) before a queue slot
    /// opened up, or before a reply arrived. The request is discarded in
    /// the former case; in the latter it remains in the batcher's
    /// pipeline and its eventual reply is dropped.
    #[error("request cancelled before a reply was available")]
    Cancelled,
    /// A reply was delivered, but it carried an error (dispatch failure,
    /// per-request backend error, or a routing miss).
    #[error("{0}")]
    Failed(String),
}

/// Bounded FIFO of [`PendingRequest`]s: one consumer (the batcher), N
/// concurrent producers (ingress handlers). Capacity is `maxBatchSize *
/// K`, `K >= 2`; `K = 10` here, which smooths arrival bursts without
/// unbounded memory growth.
#[derive(Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<PendingRequest>,
}

impl AdmissionQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Submit one request and await its reply, honoring `timeout` at both
    /// the enqueue wait and the reply wait.
    pub async fn submit(
        &self,
        id: Uuid,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, SubmitError> {
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingRequest {
            id,
            payload,
            reply_tx,
        };

        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => return Err(SubmitError::Cancelled),
            send_result = self.tx.send(pending) => {
                send_result.map_err(|_| SubmitError::Cancelled)?;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, reply_rx).await {
            Ok(Ok(response)) => response.outcome.map_err(SubmitError::Failed),
            Ok(Err(_)) | Err(_) => Err(SubmitError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_returns_the_value_delivered_to_its_reply_slot() {
        let (queue, mut rx) = AdmissionQueue::new(4);
        let id = Uuid::new_v4();
        let submit = queue.submit(id, Value::Null, Duration::from_secs(1));
        tokio::pin!(submit);

        let pending = rx.recv().await.expect("request reached the queue");
        assert_eq!(pending.id, id);
        pending.reply(Response::ok(id, Value::from(1)));

        let outcome = submit.await;
        assert_eq!(outcome.unwrap(), Value::from(1));
    }

    #[tokio::test]
    async fn submit_blocks_while_the_queue_is_full() {
        let (queue, mut rx) = AdmissionQueue::new(1);
        let blocker = queue.submit(Uuid::new_v4(), Value::Null, Duration::from_secs(5));
        tokio::pin!(blocker);
        // Drive the first submit until its item occupies the sole slot,
        // then leave it unconsumed so the channel reports full.
        tokio::task::yield_now().await;

        let second = queue.submit(Uuid::new_v4(), Value::Null, Duration::from_millis(50));
        let error = second.await.expect_err("queue is full, no consumer draining it");
        assert!(matches!(error, SubmitError::Cancelled));

        let pending = rx.recv().await.expect("first item eventually observed");
        pending.reply(Response::ok(Uuid::new_v4(), Value::Null));
        let _ = blocker.await;
    }

    #[tokio::test]
    async fn submit_reports_cancelled_when_deadline_elapses_before_reply() {
        let (queue, mut rx) = AdmissionQueue::new(4);
        let outcome = queue.submit(Uuid::new_v4(), Value::Null, Duration::from_millis(20));
        let error = outcome.await.expect_err("no reply ever sent");
        assert!(matches!(error, SubmitError::Cancelled));

        // The request was still observed by the consumer; discarding a
        // late reply must not panic.
        let pending = rx.recv().await.expect("request reached the queue");
        pending.reply(Response::ok(Uuid::new_v4(), Value::Null));
    }

    #[tokio::test]
    async fn submit_surfaces_backend_error_message() {
        let (queue, mut rx) = AdmissionQueue::new(4);
        let id = Uuid::new_v4();
        let submit = queue.submit(id, Value::Null, Duration::from_secs(1));
        tokio::pin!(submit);

        let pending = rx.recv().await.expect("request reached the queue");
        pending.reply(Response::err(id, "boom"));

        let error = submit.await.expect_err("reply carried an error");
        match error {
            SubmitError::Failed(message) => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
