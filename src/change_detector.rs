use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

use crate::delivery::{DeliveryQueue, DeliveryTask};
use crate::formatter::{render_announcement, render_subscriber_message};
use crate::notify::BroadcastSink;
use crate::sheet::layout::latest_meaningful;
use crate::sheet::{Row, TabularSource};
use crate::state::{DetectorState, StateStore};
use crate::subscriptions::{SubscriptionStore, UserId};

/// Everything the detector talks to, handed over at construction.
pub struct DetectorDeps {
    pub source: Arc<dyn TabularSource>,
    pub broadcast: Arc<dyn BroadcastSink>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub queue: DeliveryQueue,
    pub store: Arc<dyn StateStore>,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Read failed; state untouched, next tick retries.
    SourceUnavailable,
    /// Table empty or without a meaningful row; state untouched.
    NoMeaningfulRecord,
    /// Cold start: key recorded, nobody notified.
    Initialized { key: String },
    Unchanged,
    Changed {
        previous: String,
        key: String,
        broadcast_ok: bool,
        enqueued: usize,
    },
}

/// Polls the inventory sheet and announces a new tail row.
///
/// Two states: uninitialized (`last_seen_key == None`) and armed. The first
/// meaningful read arms the detector without notifying; afterwards every
/// change of the latest row's name is broadcast, fanned out to subscribers,
/// and only then persisted. A crash between the two repeats the notification
/// after restart rather than losing it.
pub struct ChangeDetector {
    deps: DetectorDeps,
    state: DetectorState,
}

impl ChangeDetector {
    pub async fn load(deps: DetectorDeps) -> Self {
        let state = deps.store.load().await;
        match &state.last_seen_key {
            Some(k) => tracing::info!(target: "detector", last_seen = %k, "resuming armed"),
            None => tracing::info!(target: "detector", "no saved state, first poll will initialize"),
        }
        Self { deps, state }
    }

    pub fn last_seen_key(&self) -> Option<&str> {
        self.state.last_seen_key.as_deref()
    }

    pub fn is_armed(&self) -> bool {
        self.state.last_seen_key.is_some()
    }

    /// One tick. Never fails; every error is logged and absorbed here.
    pub async fn poll(&mut self) -> PollOutcome {
        counter!("detector_polls_total").increment(1);

        let rows = match self.read_offloaded().await {
            Ok(rows) => rows,
            Err(e) => {
                counter!("detector_poll_errors_total").increment(1);
                tracing::warn!(target: "detector", source = self.deps.source.name(), "poll failed: {e:#}");
                return PollOutcome::SourceUnavailable;
            }
        };

        let Some((record, key)) = latest_meaningful(&rows)
            .and_then(|v| v.identity().map(|k| (v.cells(), k.to_string())))
        else {
            tracing::debug!(target: "detector", rows = rows.len(), "no meaningful row");
            return PollOutcome::NoMeaningfulRecord;
        };
        tracing::trace!(target: "detector", rows = rows.len(), latest = %key, "polled");

        let previous = match self.state.last_seen_key.clone() {
            None => {
                self.advance(&key).await;
                tracing::info!(target: "detector", key = %key, "initialized, nothing sent");
                return PollOutcome::Initialized { key };
            }
            Some(prev) if prev == key => return PollOutcome::Unchanged,
            Some(prev) => prev,
        };

        counter!("detector_changes_total").increment(1);
        tracing::info!(target: "detector", from = %previous, to = %key, "new car listed");

        let broadcast_ok = match self.deps.broadcast.publish(&render_announcement(record)).await {
            Ok(()) => true,
            Err(e) => {
                counter!("broadcast_errors_total").increment(1);
                tracing::warn!(target: "detector", "broadcast failed: {e:#}");
                false
            }
        };

        let enqueued = self.fan_out(&key, &render_subscriber_message(record)).await;
        self.advance(&key).await;

        PollOutcome::Changed {
            previous,
            key,
            broadcast_ok,
            enqueued,
        }
    }

    /// Tick forever on a fixed period. A slow poll delays the next tick
    /// instead of bunching them up, so polls never overlap.
    pub async fn run(mut self, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = self.poll().await;
            tracing::debug!(target: "detector", ?outcome, "tick");
        }
    }

    /// Run the read on its own task so a slow or panicking adapter never
    /// stalls the scheduler driving the tick.
    async fn read_offloaded(&self) -> anyhow::Result<Vec<Row>> {
        let source = Arc::clone(&self.deps.source);
        tokio::spawn(async move { source.read_rows().await })
            .await
            .map_err(|e| anyhow::anyhow!("source read task aborted: {e}"))?
    }

    async fn fan_out(&self, key: &str, body: &str) -> usize {
        let mut users: Vec<UserId> = match self.deps.subscriptions.list_by_item(key).await {
            Ok(set) => set.into_iter().collect(),
            Err(e) => {
                tracing::warn!(target: "detector", item = key, "subscriber lookup failed: {e:#}");
                return 0;
            }
        };
        users.sort();

        let mut enqueued = 0;
        for user in users {
            let task = DeliveryTask {
                recipient: user,
                body: body.to_string(),
            };
            match self.deps.queue.enqueue(task) {
                Ok(()) => enqueued += 1,
                Err(e) => tracing::warn!(target: "detector", "{e}"),
            }
        }
        tracing::info!(target: "detector", item = key, subscribers = enqueued, "dms queued");
        enqueued
    }

    /// In-memory state always moves forward; a failed write only risks a
    /// repeat notification after a restart.
    async fn advance(&mut self, key: &str) {
        self.state = DetectorState::armed(key);
        if let Err(e) = self.deps.store.save(&self.state).await {
            tracing::warn!(target: "detector", "persist state: {e:#}");
        }
    }
}
