// src/state.rs
//! Persisted change-detection state: the last car name we announced.
//!
//! File format (reads the older `{"last_value": ...}` files as well):
//! `{ "last_value": "Jugular", "updated_at": "2025-09-06T09:00:00Z" }`
//!
//! Older writers stored the raw cell, so the key is trimmed on load to
//! match what `RowView::identity` compares against.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorState {
    #[serde(rename = "last_value", default)]
    pub last_seen_key: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DetectorState {
    pub fn armed(key: impl Into<String>) -> Self {
        Self {
            last_seen_key: Some(key.into()),
            updated_at: Some(Utc::now()),
        }
    }

    /// Trim the key; a blank key counts as never initialized.
    fn normalized(mut self) -> Self {
        self.last_seen_key = self
            .last_seen_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }
}

#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Missing or unreadable state loads as uninitialized.
    async fn load(&self) -> DetectorState;
    async fn save(&self, state: &DetectorState) -> Result<()>;
}

pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> DetectorState {
        match fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str::<DetectorState>(&s)
                .map(DetectorState::normalized)
                .unwrap_or_else(|e| {
                    tracing::warn!(target: "detector", path = %self.path.display(), "corrupt state file, starting cold: {e}");
                    DetectorState::default()
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DetectorState::default(),
            Err(e) => {
                tracing::warn!(target: "detector", path = %self.path.display(), "read state: {e:#}");
                DetectorState::default()
            }
        }
    }

    /// Write to `<path>.tmp`, then rename over the real file so a crash
    /// mid-write never leaves a truncated state behind.
    async fn save(&self, state: &DetectorState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create state dir {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state).context("encode state")?;
        fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename into {}", self.path.display()))?;
        Ok(())
    }
}

/// Non-durable store for tests; can be told to fail writes.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<DetectorState>,
    fail_writes: AtomicBool,
}

impl MemoryStateStore {
    pub fn new(initial: DetectorState) -> Self {
        Self {
            state: Mutex::new(initial),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> DetectorState {
        self.state.lock().expect("state mutex poisoned").clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> DetectorState {
        self.current()
    }

    async fn save(&self, state: &DetectorState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("state store is read-only");
        }
        *self.state.lock().expect("state mutex poisoned") = state.clone();
        Ok(())
    }
}
