//! Asynchronous, rate-limited, retrying delivery.
//!
//! Messages go into a bounded pending buffer shared by a fixed set of worker
//! tasks. Every worker draws from one aggregate rate limiter, retries failed
//! sends with a fixed delay, and reports exactly one [`SendResult`] per
//! accepted message on the results channel.
//!
//! Shutdown ([`SendQueue::stop`]):
//! 1. further enqueues fail with [`QueueError::Closed`]
//! 2. workers exit at their next scheduling point, finishing any send in flight
//! 3. messages still pending, or taken but still waiting on the rate limit,
//!    are reported with [`DeliveryError::Cancelled`]
//! 4. the results channel closes

pub mod retry;

use std::sync::Arc;

use herald_common::{Signal, config::QueueConfig, internal};
use herald_smtp::Message;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    sync::{Mutex as AsyncMutex, broadcast, mpsc},
    task::JoinHandle,
};

pub use self::retry::RetryPolicy;
use crate::{DeliveryError, SystemError, Transport, rate_limiter::RateLimiter};

/// Final outcome of one queued message.
#[derive(Debug)]
pub struct SendResult {
    pub message: Message,
    /// `None` on success, otherwise the error from the last attempt.
    pub error: Option<DeliveryError>,
    /// Sends attempted; zero if the message was cancelled before its first.
    pub attempts: u32,
}

impl SendResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a message was not accepted. The message is handed back.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Send queue is full")]
    Full(Message),

    #[error("Send queue is stopped")]
    Closed(Message),
}

impl QueueError {
    #[must_use]
    pub fn into_message(self) -> Message {
        match self {
            Self::Full(message) | Self::Closed(message) => message,
        }
    }
}

/// Stream of per-message outcomes. Ends once the queue has stopped and
/// every result has been delivered.
pub type Results = mpsc::UnboundedReceiver<SendResult>;

type Pending = Arc<AsyncMutex<mpsc::Receiver<Message>>>;

pub struct SendQueue {
    sender: Mutex<Option<mpsc::Sender<Message>>>,
    pending: Pending,
    results: Mutex<Option<mpsc::UnboundedSender<SendResult>>>,
    shutdown: broadcast::Sender<Signal>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SendQueue {
    /// Spawns `config.workers` workers delivering through `transport`.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` cannot drive a queue (no
    /// workers, empty buffer, non-positive rate).
    pub fn start(
        transport: Arc<dyn Transport>,
        config: QueueConfig,
    ) -> Result<(Self, Results), DeliveryError> {
        config.validate().map_err(SystemError::Configuration)?;

        let (sender, receiver) = mpsc::channel(config.buffer_size);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        let pending: Pending = Arc::new(AsyncMutex::new(receiver));
        let limiter = Arc::new(RateLimiter::new(
            config.messages_per_second,
            config.burst_size,
        ));
        let retry = RetryPolicy::new(config.retry_count, config.retry_delay());

        let workers = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker(Worker {
                    id,
                    transport: Arc::clone(&transport),
                    pending: Arc::clone(&pending),
                    limiter: Arc::clone(&limiter),
                    retry,
                    results: results_tx.clone(),
                    shutdown: shutdown.subscribe(),
                }))
            })
            .collect();

        internal!(
            level = DEBUG,
            workers = config.workers,
            rate = config.messages_per_second,
            "Send queue started"
        );

        Ok((
            Self {
                sender: Mutex::new(Some(sender)),
                pending,
                results: Mutex::new(Some(results_tx)),
                shutdown,
                workers: Mutex::new(workers),
            },
            results_rx,
        ))
    }

    /// Queues `message` if there is room, without waiting.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the pending buffer is at capacity,
    /// [`QueueError::Closed`] after [`Self::stop`].
    pub fn try_enqueue(&self, message: Message) -> Result<(), QueueError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(QueueError::Closed(message));
        };

        sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(message) => QueueError::Full(message),
            mpsc::error::TrySendError::Closed(message) => QueueError::Closed(message),
        })
    }

    /// Queues `message`, waiting for room if the pending buffer is full.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] if the queue is or becomes stopped.
    pub async fn enqueue(&self, message: Message) -> Result<(), QueueError> {
        let Some(sender) = self.sender.lock().clone() else {
            return Err(QueueError::Closed(message));
        };

        sender
            .send(message)
            .await
            .map_err(|mpsc::error::SendError(message)| QueueError::Closed(message))
    }

    /// Stops the queue. See the module documentation for the exact sequence.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        drop(self.sender.lock().take());
        let _ = self.shutdown.send(Signal::Shutdown);

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(err) = handle.await {
                tracing::error!("Send queue worker failed: {err}");
            }
        }

        let Some(results) = self.results.lock().take() else {
            return;
        };

        let mut pending = self.pending.lock().await;
        pending.close();

        let mut cancelled = 0usize;
        while let Ok(message) = pending.try_recv() {
            cancelled += 1;
            let _ = results.send(SendResult {
                message,
                error: Some(DeliveryError::Cancelled),
                attempts: 0,
            });
        }

        internal!(
            level = DEBUG,
            cancelled,
            "Send queue stopped"
        );
    }
}

struct Worker {
    id: usize,
    transport: Arc<dyn Transport>,
    pending: Pending,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    results: mpsc::UnboundedSender<SendResult>,
    shutdown: broadcast::Receiver<Signal>,
}

#[tracing::instrument(skip_all, fields(worker = worker.id))]
async fn worker(mut worker: Worker) {
    loop {
        let next = tokio::select! {
            biased;
            _ = worker.shutdown.recv() => None,
            message = next_message(&worker.pending) => message,
        };
        let Some(message) = next else {
            break;
        };

        let stopped = tokio::select! {
            biased;
            _ = worker.shutdown.recv() => true,
            () = worker.limiter.until_ready() => false,
        };
        if stopped {
            internal!(level = DEBUG, "Stopped while waiting on the rate limit");
            let _ = worker.results.send(SendResult {
                message,
                error: Some(DeliveryError::Cancelled),
                attempts: 0,
            });
            break;
        }

        let transport = &worker.transport;
        let (outcome, attempts) = worker
            .retry
            .run(|_| transport.send(&message))
            .await;

        if let Err(err) = &outcome {
            tracing::warn!(attempts, "Failed to send message: {err}");
        }

        let result = SendResult {
            message,
            error: outcome.err(),
            attempts,
        };
        if worker.results.send(result).is_err() {
            internal!(level = DEBUG, "Results receiver dropped");
        }
    }

    internal!("Worker exiting");
}

/// Waits for the next pending message; `None` once the queue is closed and
/// drained.
async fn next_message(pending: &AsyncMutex<mpsc::Receiver<Message>>) -> Option<Message> {
    pending.lock().await.recv().await
}
