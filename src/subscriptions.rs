//! Who wants to hear about which car.
//!
//! The notification pipeline depends only on the four-operation
//! `SubscriptionStore` contract; the selection UI lives elsewhere.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sheet::{Row, TabularSource};

/// Discord user snowflake, kept as the string the sheet stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Idempotent.
    async fn add_subscription(&self, user: &UserId, item: &str) -> Result<()>;
    /// No-op when the pair is absent.
    async fn remove_subscription(&self, user: &UserId, item: &str) -> Result<()>;
    async fn list_by_user(&self, user: &UserId) -> Result<HashSet<String>>;
    async fn list_by_item(&self, item: &str) -> Result<HashSet<UserId>>;
}

/// Make `user`'s subscriptions among `offered` equal `selected`.
/// Subscriptions outside `offered` are left alone (the select menu only ever
/// shows a page of the catalog).
///
/// This is what a subscription UI calls when a user submits the menu; the
/// bot itself ships without one, so `pipeline_demo` drives it directly.
pub async fn apply_selection<S: SubscriptionStore + ?Sized>(
    store: &S,
    user: &UserId,
    offered: &[String],
    selected: &[String],
) -> Result<()> {
    let current = store.list_by_user(user).await?;
    for item in selected {
        if !current.contains(item) {
            store.add_subscription(user, item).await?;
        }
    }
    for item in offered {
        if current.contains(item) && !selected.contains(item) {
            store.remove_subscription(user, item).await?;
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    by_user: Mutex<HashMap<UserId, BTreeSet<String>>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn add_subscription(&self, user: &UserId, item: &str) -> Result<()> {
        self.by_user
            .lock()
            .expect("subscriptions mutex poisoned")
            .entry(user.clone())
            .or_default()
            .insert(item.trim().to_string());
        Ok(())
    }

    async fn remove_subscription(&self, user: &UserId, item: &str) -> Result<()> {
        let mut map = self.by_user.lock().expect("subscriptions mutex poisoned");
        if let Some(items) = map.get_mut(user) {
            items.remove(item.trim());
            if items.is_empty() {
                map.remove(user);
            }
        }
        Ok(())
    }

    async fn list_by_user(&self, user: &UserId) -> Result<HashSet<String>> {
        let map = self.by_user.lock().expect("subscriptions mutex poisoned");
        Ok(map
            .get(user)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_by_item(&self, item: &str) -> Result<HashSet<UserId>> {
        let item = item.trim();
        let map = self.by_user.lock().expect("subscriptions mutex poisoned");
        Ok(map
            .iter()
            .filter(|(_, items)| items.contains(item))
            .map(|(u, _)| u.clone())
            .collect())
    }
}

const USER_COL: usize = 0;
const ITEM_COL: usize = 1;
pub const SUBSCRIPTION_HEADER: [&str; 2] = ["user_id", "voiture"];

/// Store backed by the `Abonnements` worksheet: a header row, then one
/// `(user_id, voiture)` pair per row. Last write wins; concurrent editors of
/// the sheet can race with us.
pub struct SheetSubscriptionStore {
    sheet: Arc<dyn TabularSource>,
}

impl SheetSubscriptionStore {
    pub fn new(sheet: Arc<dyn TabularSource>) -> Self {
        Self { sheet }
    }

    async fn pairs(&self) -> Result<Vec<(usize, UserId, String)>> {
        Ok(pairs_of(&self.sheet.read_rows().await?))
    }
}

/// Data rows with their index in the worksheet (header skipped).
fn pairs_of(rows: &[Row]) -> Vec<(usize, UserId, String)> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, r)| {
            let user = r.get(USER_COL).map(|s| s.trim()).filter(|s| !s.is_empty())?;
            let item = r.get(ITEM_COL).map(|s| s.trim()).filter(|s| !s.is_empty())?;
            Some((i, UserId::new(user), item.to_string()))
        })
        .collect()
}

#[async_trait::async_trait]
impl SubscriptionStore for SheetSubscriptionStore {
    async fn add_subscription(&self, user: &UserId, item: &str) -> Result<()> {
        let item = item.trim();
        let rows = self.sheet.read_rows().await?;
        if rows.is_empty() {
            let header: Row = SUBSCRIPTION_HEADER.iter().map(|s| s.to_string()).collect();
            self.sheet.append_row(header).await?;
        }
        let exists = pairs_of(&rows).iter().any(|(_, u, i)| u == user && i == item);
        if exists {
            return Ok(());
        }
        self.sheet
            .append_row(vec![user.to_string(), item.to_string()])
            .await?;
        tracing::debug!(target: "subscriptions", %user, item, "subscribed");
        Ok(())
    }

    async fn remove_subscription(&self, user: &UserId, item: &str) -> Result<()> {
        let item = item.trim();
        let hit = self
            .pairs()
            .await?
            .into_iter()
            .find(|(_, u, i)| u == user && i == item);
        if let Some((idx, _, _)) = hit {
            self.sheet.delete_row(idx).await?;
            tracing::debug!(target: "subscriptions", %user, item, "unsubscribed");
        }
        Ok(())
    }

    async fn list_by_user(&self, user: &UserId) -> Result<HashSet<String>> {
        Ok(self
            .pairs()
            .await?
            .into_iter()
            .filter(|(_, u, _)| u == user)
            .map(|(_, _, i)| i)
            .collect())
    }

    async fn list_by_item(&self, item: &str) -> Result<HashSet<UserId>> {
        let item = item.trim();
        Ok(self
            .pairs()
            .await?
            .into_iter()
            .filter(|(_, _, i)| i == item)
            .map(|(_, u, _)| u)
            .collect())
    }
}
