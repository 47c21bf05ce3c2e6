// tests/change_detector.rs
//
// Drives the detector tick by tick against in-memory collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use inventory_watch_bot::delivery::{DeliveryQueue, DeliveryWorker};
use inventory_watch_bot::sheet::MemorySheet;
use inventory_watch_bot::state::{DetectorState, FileStateStore, MemoryStateStore, StateStore};
use inventory_watch_bot::subscriptions::{MemorySubscriptionStore, SubscriptionStore, UserId};
use inventory_watch_bot::{BroadcastSink, ChangeDetector, DetectorDeps, PollOutcome};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait::async_trait]
impl BroadcastSink for RecordingSink {
    async fn publish(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(anyhow!("channel not found"));
        }
        Ok(())
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

fn car(name: &str) -> Vec<String> {
    let mut r = vec![String::new(); 31];
    r[22] = name.to_string();
    r[23] = "15000".to_string();
    r
}

struct Harness {
    sheet: Arc<MemorySheet>,
    sink: Arc<RecordingSink>,
    subs: Arc<MemorySubscriptionStore>,
    store: Arc<MemoryStateStore>,
    queue: DeliveryQueue,
    _worker: DeliveryWorker,
    detector: ChangeDetector,
}

async fn harness_with(sink: RecordingSink, initial: DetectorState, rows: Vec<Vec<String>>) -> Harness {
    let sheet = Arc::new(MemorySheet::with_rows("BDD", rows));
    let sink = Arc::new(sink);
    let subs = Arc::new(MemorySubscriptionStore::new());
    let store = Arc::new(MemoryStateStore::new(initial));
    let (queue, worker) = DeliveryQueue::new(Duration::from_secs(1));
    let detector = ChangeDetector::load(DetectorDeps {
        source: sheet.clone(),
        broadcast: sink.clone(),
        subscriptions: subs.clone(),
        queue: queue.clone(),
        store: store.clone(),
    })
    .await;
    Harness {
        sheet,
        sink,
        subs,
        store,
        queue,
        _worker: worker,
        detector,
    }
}

async fn harness(rows: Vec<Vec<String>>) -> Harness {
    harness_with(RecordingSink::default(), DetectorState::default(), rows).await
}

#[tokio::test]
async fn unchanged_tail_initializes_once_and_never_notifies() {
    let mut h = harness(vec![car("Jugular")]).await;
    h.subs.add_subscription(&UserId::new("1"), "Jugular").await.unwrap();

    assert_eq!(
        h.detector.poll().await,
        PollOutcome::Initialized { key: "Jugular".into() }
    );
    for _ in 0..5 {
        assert_eq!(h.detector.poll().await, PollOutcome::Unchanged);
    }

    assert!(h.sink.sent.lock().unwrap().is_empty());
    assert!(h.queue.is_empty());
    assert_eq!(h.store.current().last_seen_key.as_deref(), Some("Jugular"));
}

#[tokio::test]
async fn change_broadcasts_once_and_queues_one_dm_per_subscriber() {
    let mut h = harness(vec![car("Jugular")]).await;
    for uid in ["10", "20", "30"] {
        h.subs.add_subscription(&UserId::new(uid), "Banshee").await.unwrap();
    }
    h.subs.add_subscription(&UserId::new("99"), "Jugular").await.unwrap();
    h.detector.poll().await;

    h.sheet.push_row(car("Banshee"));
    let outcome = h.detector.poll().await;

    assert_eq!(
        outcome,
        PollOutcome::Changed {
            previous: "Jugular".into(),
            key: "Banshee".into(),
            broadcast_ok: true,
            enqueued: 3,
        }
    );
    let sent = h.sink.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("**Nom** : Banshee"));
    assert_eq!(h.queue.len(), 3);
    assert_eq!(h.detector.last_seen_key(), Some("Banshee"));
    assert_eq!(h.store.current().last_seen_key.as_deref(), Some("Banshee"));

    // the same tail again is a no-op
    assert_eq!(h.detector.poll().await, PollOutcome::Unchanged);
    assert_eq!(h.sink.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_tail_matters() {
    let mut h = harness(vec![car("A")]).await;
    h.subs.add_subscription(&UserId::new("1"), "B").await.unwrap();
    h.detector.poll().await;

    // two rows land between polls; B is never announced
    h.sheet.push_row(car("B"));
    h.sheet.push_row(car("C"));
    let outcome = h.detector.poll().await;
    assert!(matches!(outcome, PollOutcome::Changed { ref key, enqueued: 0, .. } if key == "C"));
}

#[tokio::test]
async fn trailing_blank_rows_are_ignored() {
    let mut h = harness(vec![car("A")]).await;
    h.detector.poll().await;
    h.sheet.push_row(car("   "));
    h.sheet.push_row(vec!["x".into(); 5]);
    assert_eq!(h.detector.poll().await, PollOutcome::Unchanged);
}

#[tokio::test]
async fn empty_table_leaves_everything_untouched() {
    let mut h = harness(vec![]).await;
    assert_eq!(h.detector.poll().await, PollOutcome::NoMeaningfulRecord);
    assert!(!h.detector.is_armed());
    assert_eq!(h.store.current(), DetectorState::default());

    h.sheet.set_rows(vec![car("A")]);
    h.detector.poll().await;
    h.sheet.set_rows(vec![]);
    assert_eq!(h.detector.poll().await, PollOutcome::NoMeaningfulRecord);
    assert_eq!(h.detector.last_seen_key(), Some("A"));
    assert!(h.sink.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn source_errors_keep_state_and_retry_next_tick() {
    let mut h = harness(vec![car("A")]).await;
    h.detector.poll().await;

    h.sheet.push_row(car("B"));
    h.sheet.set_unavailable(true);
    assert_eq!(h.detector.poll().await, PollOutcome::SourceUnavailable);
    assert_eq!(h.detector.last_seen_key(), Some("A"));

    h.sheet.set_unavailable(false);
    assert!(matches!(h.detector.poll().await, PollOutcome::Changed { .. }));
}

#[tokio::test]
async fn broadcast_failure_still_fans_out_and_persists() {
    let sink = RecordingSink {
        fail: true,
        ..Default::default()
    };
    let mut h = harness_with(sink, DetectorState::armed("A"), vec![car("B")]).await;
    h.subs.add_subscription(&UserId::new("7"), "B").await.unwrap();

    let outcome = h.detector.poll().await;
    assert_eq!(
        outcome,
        PollOutcome::Changed {
            previous: "A".into(),
            key: "B".into(),
            broadcast_ok: false,
            enqueued: 1,
        }
    );
    assert_eq!(h.sink.sent.lock().unwrap().len(), 1);
    assert_eq!(h.store.current().last_seen_key.as_deref(), Some("B"));
}

#[tokio::test]
async fn failed_state_write_still_advances_in_memory() {
    let mut h = harness(vec![car("A")]).await;
    h.detector.poll().await;
    h.store.set_fail_writes(true);

    h.sheet.push_row(car("B"));
    assert!(matches!(h.detector.poll().await, PollOutcome::Changed { .. }));
    assert_eq!(h.detector.last_seen_key(), Some("B"));
    assert_eq!(h.store.current().last_seen_key.as_deref(), Some("A"));

    // no repeat while the process lives
    assert_eq!(h.detector.poll().await, PollOutcome::Unchanged);
}

#[tokio::test]
async fn restart_resumes_from_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sheet_state.json");
    let sheet = Arc::new(MemorySheet::with_rows("BDD", vec![car("A")]));
    let sink = Arc::new(RecordingSink::default());

    let boot = |store: Arc<FileStateStore>| {
        let (queue, worker) = DeliveryQueue::new(Duration::from_secs(1));
        let deps = DetectorDeps {
            source: sheet.clone(),
            broadcast: sink.clone(),
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
            queue,
            store,
        };
        (deps, worker)
    };

    let (deps, _w1) = boot(Arc::new(FileStateStore::new(&path)));
    let mut first = ChangeDetector::load(deps).await;
    assert!(matches!(first.poll().await, PollOutcome::Initialized { .. }));
    drop(first);

    let (deps, _w2) = boot(Arc::new(FileStateStore::new(&path)));
    let mut second = ChangeDetector::load(deps).await;
    assert!(second.is_armed());
    assert_eq!(second.poll().await, PollOutcome::Unchanged);
    assert!(sink.sent.lock().unwrap().is_empty());

    let saved = FileStateStore::new(&path).load().await;
    assert_eq!(saved.last_seen_key.as_deref(), Some("A"));
}

#[tokio::test(start_paused = true)]
async fn run_ticks_on_the_period_and_announces_once() {
    let h = harness(vec![car("Jugular")]).await;
    let Harness {
        detector,
        sheet,
        sink,
        store,
        ..
    } = h;
    let task = tokio::spawn(detector.run(Duration::from_secs(20)));

    // first tick fires immediately and only arms the detector
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(store.current().last_seen_key.as_deref(), Some("Jugular"));
    assert!(sink.sent.lock().unwrap().is_empty());

    sheet.push_row(car("Banshee"));
    tokio::time::sleep(Duration::from_secs(19)).await;
    assert!(sink.sent.lock().unwrap().is_empty(), "announced before the next period");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.sent.lock().unwrap().len(), 1);
    assert_eq!(store.current().last_seen_key.as_deref(), Some("Banshee"));

    // several more periods with the same tail stay quiet
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.sent.lock().unwrap().len(), 1);

    task.abort();
}

#[tokio::test]
async fn untrimmed_saved_key_does_not_reannounce() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sheet_state.json");
    std::fs::write(&path, r#"{"last_value": "Jugular "}"#).unwrap();

    let sheet = Arc::new(MemorySheet::with_rows("BDD", vec![car("Jugular")]));
    let sink = Arc::new(RecordingSink::default());
    let (queue, _worker) = DeliveryQueue::new(Duration::from_secs(1));
    let mut detector = ChangeDetector::load(DetectorDeps {
        source: sheet,
        broadcast: sink.clone(),
        subscriptions: Arc::new(MemorySubscriptionStore::new()),
        queue,
        store: Arc::new(FileStateStore::new(&path)),
    })
    .await;

    assert_eq!(detector.poll().await, PollOutcome::Unchanged);
    assert!(sink.sent.lock().unwrap().is_empty());
}
