use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("detector_polls_total", "Inventory polls attempted.");
        describe_counter!(
            "detector_poll_errors_total",
            "Polls that failed to read the inventory sheet."
        );
        describe_counter!(
            "detector_changes_total",
            "New latest rows detected after cold start."
        );
        describe_counter!("broadcast_errors_total", "Channel announcements that failed.");
        describe_counter!("delivery_enqueued_total", "DMs queued for subscribers.");
        describe_counter!("delivery_sent_total", "DMs delivered.");
        describe_counter!(
            "delivery_failed_total",
            "DMs dropped after resolve/send failure."
        );
        describe_counter!("catalog_cache_hits_total", "/items answered from the cached catalog.");
        describe_counter!("catalog_cache_misses_total", "/items requests that re-read the sheet.");
        describe_gauge!("delivery_queue_depth", "DMs waiting in the delivery queue.");
    });
}

/// Install the Prometheus recorder. Call once, from `main`.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_described();
    Ok(handle)
}
