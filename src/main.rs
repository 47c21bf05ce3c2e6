//! Inventory watch bot — binary entrypoint.
//! Loads `.env`, installs tracing and metrics, then hands over to `App`.

use inventory_watch_bot::app::App;
use inventory_watch_bot::config::{BotConfig, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("inventory_watch_bot=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let config = BotConfig::from_env()?;
    init_tracing(config.log_format);

    let metrics = match inventory_watch_bot::metrics::install_prometheus() {
        Ok(h) => Some(h),
        Err(e) => {
            tracing::warn!("metrics disabled: {e:#}");
            None
        }
    };

    App::build(config, metrics).await?.run().await
}
