//! Serialized direct-message delivery.
//!
//! Any number of producers append `DeliveryTask`s; exactly one worker pops
//! them in FIFO order, sends each, then sleeps `pacing` before the next one
//! so a burst of subscribers never trips Discord's per-user DM limit.
//! The queue is unbounded: a detected change fans out to dozens of users at
//! most. Tasks still queued at shutdown are lost.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::subscriptions::UserId;

/// Lower bound on the gap between two sends.
pub const MIN_PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTask {
    pub recipient: UserId,
    pub body: String,
}

/// Sendable target for one user (for Discord: the DM channel id).
/// Keeps the user so send-time refusals can still name who was unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientHandle {
    pub user: UserId,
    pub address: String,
}

impl RecipientHandle {
    pub fn new(user: UserId, address: impl Into<String>) -> Self {
        Self {
            user,
            address: address.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("recipient {0} cannot be messaged")]
    UnknownRecipient(UserId),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("delivery worker has stopped; task for {0} not queued")]
pub struct QueueClosed(pub UserId);

#[async_trait::async_trait]
pub trait DirectMessenger: Send + Sync {
    async fn resolve_recipient(&self, user: &UserId) -> Result<RecipientHandle, DeliveryError>;
    async fn send(&self, to: &RecipientHandle, body: &str) -> Result<(), DeliveryError>;
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryTask>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side; there is exactly one per queue.
pub struct DeliveryWorker {
    rx: mpsc::UnboundedReceiver<DeliveryTask>,
    depth: Arc<AtomicUsize>,
    pacing: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: usize,
    pub failed: usize,
}

impl DeliveryQueue {
    /// `pacing` below `MIN_PACING` is raised to it.
    pub fn new(pacing: Duration) -> (Self, DeliveryWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                depth: depth.clone(),
            },
            DeliveryWorker {
                rx,
                depth,
                pacing: pacing.max(MIN_PACING),
            },
        )
    }

    /// Never blocks and never drops while the worker is alive.
    pub fn enqueue(&self, task: DeliveryTask) -> Result<(), QueueClosed> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueClosed(task.recipient));
        }
        counter!("delivery_enqueued_total").increment(1);
        gauge!("delivery_queue_depth").set(self.len() as f64);
        Ok(())
    }

    /// Tasks queued and not yet popped.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeliveryWorker {
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Drain until every `DeliveryQueue` handle is dropped.
    pub async fn run<M>(mut self, messenger: Arc<M>) -> DeliveryStats
    where
        M: DirectMessenger + ?Sized,
    {
        let mut stats = DeliveryStats::default();
        while let Some(task) = self.rx.recv().await {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            gauge!("delivery_queue_depth").set(self.depth.load(Ordering::SeqCst) as f64);

            match deliver_one(messenger.as_ref(), &task).await {
                Ok(()) => {
                    stats.sent += 1;
                    counter!("delivery_sent_total").increment(1);
                    tracing::debug!(target: "delivery", recipient = %task.recipient, "dm sent");
                }
                Err(DeliveryError::UnknownRecipient(user)) => {
                    stats.failed += 1;
                    counter!("delivery_failed_total").increment(1);
                    tracing::warn!(target: "delivery", recipient = %user, "recipient unreachable, task dropped");
                }
                Err(DeliveryError::Transport(e)) => {
                    stats.failed += 1;
                    counter!("delivery_failed_total").increment(1);
                    tracing::warn!(target: "delivery", recipient = %task.recipient, "dm failed: {e:#}");
                }
            }

            tokio::time::sleep(self.pacing).await;
        }
        tracing::info!(target: "delivery", sent = stats.sent, failed = stats.failed, "delivery worker stopped");
        stats
    }

    /// Start the worker for the lifetime of the process.
    pub fn spawn(self, messenger: Arc<dyn DirectMessenger>) -> JoinHandle<DeliveryStats> {
        tokio::spawn(self.run(messenger))
    }
}

async fn deliver_one<M>(messenger: &M, task: &DeliveryTask) -> Result<(), DeliveryError>
where
    M: DirectMessenger + ?Sized,
{
    let target = messenger.resolve_recipient(&task.recipient).await?;
    messenger.send(&target, &task.body).await
}
