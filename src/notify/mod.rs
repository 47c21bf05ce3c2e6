// src/notify/mod.rs
pub mod discord;
pub mod webhook;

use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Fire-and-forget publish to a public destination.
#[async_trait::async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Publishes to every configured sink. Succeeds when at least one sink did.
#[derive(Clone, Default)]
pub struct BroadcastMux {
    sinks: Vec<Arc<dyn BroadcastSink>>,
}

impl BroadcastMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn BroadcastSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait::async_trait]
impl BroadcastSink for BroadcastMux {
    async fn publish(&self, text: &str) -> Result<()> {
        if self.sinks.is_empty() {
            return Err(anyhow!("no broadcast sink configured"));
        }
        let mut delivered = 0usize;
        for sink in &self.sinks {
            match sink.publish(text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(target: "discord", sink = sink.name(), "broadcast failed: {e:#}")
                }
            }
        }
        if delivered == 0 {
            return Err(anyhow!("all {} broadcast sinks failed", self.sinks.len()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
