//! Dry run of the notification pipeline against an in-memory sheet.
//! Announcements and DMs go to the log instead of Discord.

use std::sync::Arc;
use std::time::Duration;

use inventory_watch_bot::delivery::{DeliveryError, RecipientHandle};
use inventory_watch_bot::sheet::MemorySheet;
use inventory_watch_bot::state::{DetectorState, MemoryStateStore};
use inventory_watch_bot::catalog::available_items;
use inventory_watch_bot::subscriptions::{apply_selection, MemorySubscriptionStore, UserId};
use inventory_watch_bot::{
    BroadcastSink, ChangeDetector, DeliveryQueue, DetectorDeps, DirectMessenger,
};

struct LogSink;

#[async_trait::async_trait]
impl BroadcastSink for LogSink {
    async fn publish(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!("channel <- {text}");
        Ok(())
    }
    fn name(&self) -> &'static str {
        "log"
    }
}

struct LogMessenger;

#[async_trait::async_trait]
impl DirectMessenger for LogMessenger {
    async fn resolve_recipient(&self, user: &UserId) -> Result<RecipientHandle, DeliveryError> {
        Ok(RecipientHandle::new(user.clone(), user.to_string()))
    }
    async fn send(&self, to: &RecipientHandle, body: &str) -> Result<(), DeliveryError> {
        tracing::info!("dm {} <- {}", to.address, body.lines().next().unwrap_or_default());
        Ok(())
    }
}

fn car(name: &str, price: &str, stars: [&str; 4], turbo: &str) -> Vec<String> {
    let mut r = vec![String::new(); 31];
    r[22] = name.into();
    r[23] = price.into();
    for (i, s) in stars.iter().enumerate() {
        r[26 + i] = s.to_string();
    }
    r[30] = turbo.into();
    r
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let sheet = Arc::new(MemorySheet::with_rows(
        "BDD",
        vec![car("Jugular", "1200000", ["3", "3", "2", "1"], "TRUE")],
    ));

    // what a select menu would offer and two users would pick
    let offered: Vec<String> = available_items(&[
        vec!["".into(), "".into(), "Voiture".into()],
        vec!["".into(), "".into(), "Banshee".into()],
        vec!["".into(), "".into(), "Buffalo STX".into()],
    ]);
    let subs = Arc::new(MemorySubscriptionStore::new());
    for uid in ["1001", "1002"] {
        apply_selection(subs.as_ref(), &UserId::new(uid), &offered, &["Banshee".to_string()]).await?;
    }

    let (queue, worker) = DeliveryQueue::new(Duration::from_secs(1));
    let worker_task = worker.spawn(Arc::new(LogMessenger));

    let mut detector = ChangeDetector::load(DetectorDeps {
        source: sheet.clone(),
        broadcast: Arc::new(LogSink),
        subscriptions: subs,
        queue,
        store: Arc::new(MemoryStateStore::new(DetectorState::default())),
    })
    .await;

    let script = [
        None,
        Some(car("Banshee", "105000", ["5", "0", "x", "2"], "false")),
        None,
        Some(car("Buffalo STX", "", [""; 4], "")),
    ];
    for next in script {
        if let Some(row) = next {
            sheet.push_row(row);
        }
        let outcome = detector.poll().await;
        tracing::info!(?outcome, "tick");
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    drop(detector);
    let stats = worker_task.await?;
    println!("pipeline-demo done: {} dm(s) sent", stats.sent);
    Ok(())
}
