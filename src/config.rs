// src/config.rs
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::MIN_PACING;

pub const DEFAULT_POLL_SECS: u64 = 20;
pub const DEFAULT_PACING_MS: u64 = 1_000;
pub const DEFAULT_STATE_FILE: &str = "sheet_state.json";
pub const DEFAULT_HTTP_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub channel_id: u64,
    pub spreadsheet_id: String,
    /// `None` means ask the GCE metadata server.
    pub google_access_token: Option<String>,
    pub inventory_worksheet: String,
    pub subscriptions_worksheet: String,
    pub poll_interval: Duration,
    pub dm_pacing: Duration,
    pub state_file: PathBuf,
    pub http_port: u16,
    pub webhook_url: Option<String>,
    pub log_format: LogFormat,
}

impl BotConfig {
    /// Read the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let opt = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |k: &str| opt(k).ok_or_else(|| anyhow!("{k} missing"));
        let parsed = |k: &str, default: u64| -> Result<u64> {
            match opt(k) {
                Some(v) => v.parse().with_context(|| format!("{k} must be an integer, got {v:?}")),
                None => Ok(default),
            }
        };

        let channel_id = required("CHANNEL_ID")?
            .parse::<u64>()
            .context("CHANNEL_ID must be a numeric channel id")?;
        let http_port = u16::try_from(parsed("HTTP_PORT", DEFAULT_HTTP_PORT as u64)?)
            .context("HTTP_PORT out of range")?;

        let log_format = match opt("LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            channel_id,
            spreadsheet_id: required("SPREADSHEET_ID")?,
            google_access_token: opt("GOOGLE_ACCESS_TOKEN"),
            inventory_worksheet: opt("INVENTORY_WORKSHEET").unwrap_or_else(|| "BDD".into()),
            subscriptions_worksheet: opt("SUBSCRIPTIONS_WORKSHEET")
                .unwrap_or_else(|| "Abonnements".into()),
            poll_interval: Duration::from_secs(parsed("POLL_SECONDS", DEFAULT_POLL_SECS)?.max(1)),
            dm_pacing: Duration::from_millis(parsed("DM_PACING_MS", DEFAULT_PACING_MS)?)
                .max(MIN_PACING),
            state_file: opt("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            http_port,
            webhook_url: opt("DISCORD_WEBHOOK_URL"),
            log_format,
        })
    }
}
