//! Minimal Discord REST (v10) client authenticated with the bot token:
//! post to a channel, open a DM channel, post to that DM.

use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use super::BroadcastSink;
use crate::delivery::{DeliveryError, DirectMessenger, RecipientHandle};
use crate::subscriptions::UserId;

const API_BASE: &str = "https://discord.com/api/v10";
/// Discord rejects message content longer than this (in characters).
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("discord HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
}

impl DiscordError {
    /// 403/404: the user or channel is gone, or refuses our messages.
    pub fn is_unreachable_target(&self) -> bool {
        matches!(
            self,
            DiscordError::Http { status, .. }
                if *status == StatusCode::NOT_FOUND || *status == StatusCode::FORBIDDEN
        )
    }
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    token: String,
    base_url: String,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

pub fn clamp_message(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            token: token.into(),
            base_url: API_BASE.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// POST with the bot token. A 429 is waited out (Discord tells us how
    /// long) up to `max_retries` attempts; other statuses are returned as is.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, DiscordError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let resp = self
                .http
                .post(&url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .timeout(self.timeout)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let wait = resp
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .filter(|b| b.retry_after.is_finite())
                    .map(|b| Duration::from_secs_f64(b.retry_after.clamp(0.0, 60.0)))
                    .unwrap_or(Duration::from_secs(1));
                tracing::warn!(target: "discord", path, ?wait, attempt, "rate limited");
                tokio::time::sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DiscordError::Http { status, body });
            }
            return Ok(resp.json::<T>().await?);
        }
    }

    pub async fn create_message(&self, channel_id: &str, content: &str) -> Result<(), DiscordError> {
        self.post::<serde::de::IgnoredAny>(
            &format!("/channels/{channel_id}/messages"),
            &json!({ "content": clamp_message(content) }),
        )
        .await
        .map(|_| ())
    }

    pub async fn open_dm(&self, user: &UserId) -> Result<String, DiscordError> {
        let ch: DmChannel = self
            .post("/users/@me/channels", &json!({ "recipient_id": user.as_str() }))
            .await?;
        Ok(ch.id)
    }
}

/// 403/404 on either the DM open or the DM post means the user blocks us
/// or is gone; retrying would never help.
fn delivery_error(user: &UserId, e: DiscordError) -> DeliveryError {
    if e.is_unreachable_target() {
        DeliveryError::UnknownRecipient(user.clone())
    } else {
        DeliveryError::Transport(e.into())
    }
}

#[async_trait::async_trait]
impl DirectMessenger for DiscordClient {
    async fn resolve_recipient(&self, user: &UserId) -> Result<RecipientHandle, DeliveryError> {
        self.open_dm(user)
            .await
            .map(|channel| RecipientHandle::new(user.clone(), channel))
            .map_err(|e| delivery_error(user, e))
    }

    async fn send(&self, to: &RecipientHandle, body: &str) -> Result<(), DeliveryError> {
        self.create_message(&to.address, body)
            .await
            .map_err(|e| delivery_error(&to.user, e))
    }
}

/// The announcement channel, as a broadcast sink.
pub struct ChannelSink {
    client: DiscordClient,
    channel_id: String,
}

impl ChannelSink {
    pub fn new(client: DiscordClient, channel_id: u64) -> Self {
        Self {
            client,
            channel_id: channel_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl BroadcastSink for ChannelSink {
    async fn publish(&self, text: &str) -> anyhow::Result<()> {
        self.client.create_message(&self.channel_id, text).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord-channel"
    }
}
