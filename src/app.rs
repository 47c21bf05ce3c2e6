//! Process context: builds every collaborator from `BotConfig`, wires them
//! together, and owns their lifetime (start, run, teardown on Ctrl-C).

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::{self, ApiState};
use crate::change_detector::{ChangeDetector, DetectorDeps};
use crate::config::BotConfig;
use crate::delivery::{DeliveryQueue, DeliveryWorker, DirectMessenger};
use crate::notify::discord::{ChannelSink, DiscordClient};
use crate::notify::webhook::DiscordWebhook;
use crate::notify::{BroadcastMux, BroadcastSink};
use crate::sheet::google::{SheetsClient, TokenSource};
use crate::sheet::TabularSource;
use crate::state::FileStateStore;
use crate::subscriptions::SheetSubscriptionStore;

pub struct App {
    config: BotConfig,
    detector: ChangeDetector,
    worker: DeliveryWorker,
    messenger: Arc<dyn DirectMessenger>,
    api_state: ApiState,
}

impl App {
    pub async fn build(config: BotConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let tokens = match &config.google_access_token {
            Some(t) => TokenSource::Static(t.clone()),
            None => TokenSource::Metadata,
        };
        let sheets = SheetsClient::new(&config.spreadsheet_id, tokens);
        let inventory: Arc<dyn TabularSource> =
            Arc::new(sheets.worksheet(&config.inventory_worksheet));
        let subscriptions = Arc::new(SheetSubscriptionStore::new(Arc::new(
            sheets.worksheet(&config.subscriptions_worksheet),
        )));

        let discord = DiscordClient::new(&config.discord_token);
        let mut mux = BroadcastMux::new().with_sink(Arc::new(ChannelSink::new(
            discord.clone(),
            config.channel_id,
        )));
        if let Some(url) = &config.webhook_url {
            mux = mux.with_sink(Arc::new(DiscordWebhook::new(url.clone())));
        }
        let broadcast: Arc<dyn BroadcastSink> = Arc::new(mux);

        let (queue, worker) = DeliveryQueue::new(config.dm_pacing);
        let detector = ChangeDetector::load(DetectorDeps {
            source: inventory.clone(),
            broadcast,
            subscriptions,
            queue,
            store: Arc::new(FileStateStore::new(&config.state_file)),
        })
        .await;

        Ok(Self {
            config,
            detector,
            worker,
            messenger: Arc::new(discord),
            api_state: ApiState::new(inventory, metrics),
        })
    }

    /// Runs until Ctrl-C. Queued DMs are dropped on shutdown.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            detector,
            worker,
            messenger,
            api_state,
        } = self;

        let worker_task = worker.spawn(messenger);
        let detector_task = tokio::spawn(detector.run(config.poll_interval));

        let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind keep-alive server on {addr}"))?;
        tracing::info!(
            %addr,
            poll_secs = config.poll_interval.as_secs(),
            pacing_ms = config.dm_pacing.as_millis() as u64,
            "inventory watch started"
        );

        let served = axum::serve(listener, api::router(api_state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            })
            .await
            .context("keep-alive server");

        detector_task.abort();
        worker_task.abort();
        served
    }
}
