// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod app;
pub mod catalog;
pub mod config;
pub mod formatter;
pub mod metrics;
pub mod sheet;
pub mod state;
pub mod subscriptions;

// Notification pipeline: broadcast sinks, change detection, DM delivery
pub mod change_detector;
pub mod delivery;
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::change_detector::{ChangeDetector, DetectorDeps, PollOutcome};
pub use crate::config::BotConfig;
pub use crate::delivery::{DeliveryQueue, DeliveryTask, DeliveryWorker, DirectMessenger};
pub use crate::notify::{BroadcastMux, BroadcastSink};
pub use crate::sheet::{Row, TabularSource};
pub use crate::subscriptions::{SubscriptionStore, UserId};
