//! Keep-alive HTTP surface: uptime pings, health, metrics, catalog search.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;

use crate::catalog::{available_items, filter_items};
use crate::sheet::TabularSource;

/// How long a catalog read is served before `/items` hits the sheet again.
/// The endpoint is public and shares the Sheets quota with the detector.
pub const CATALOG_TTL: Duration = Duration::from_secs(60);

/// Last catalog read, shared by every `/items` request.
/// The lock is held across the refresh so concurrent misses cost one read.
pub struct CatalogCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Arc<Vec<String>>)>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    async fn get_or_refresh(&self, source: &dyn TabularSource) -> anyhow::Result<Arc<Vec<String>>> {
        let mut slot = self.slot.lock().await;
        if let Some((fetched_at, items)) = slot.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                counter!("catalog_cache_hits_total").increment(1);
                return Ok(Arc::clone(items));
            }
        }
        counter!("catalog_cache_misses_total").increment(1);
        let items = Arc::new(available_items(&source.read_rows().await?));
        *slot = Some((Instant::now(), Arc::clone(&items)));
        Ok(items)
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub inventory: Arc<dyn TabularSource>,
    pub metrics: Option<PrometheusHandle>,
    pub catalog: Arc<CatalogCache>,
}

impl ApiState {
    pub fn new(inventory: Arc<dyn TabularSource>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            inventory,
            metrics,
            catalog: Arc::new(CatalogCache::new(CATALOG_TTL)),
        }
    }

    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog = Arc::new(CatalogCache::new(ttl));
        self
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/health", get(|| async { "ok" }))
        .route("/metrics", get(render_metrics))
        .route("/items", get(items))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(State(state): State<ApiState>) -> (StatusCode, String) {
    match &state.metrics {
        Some(h) => (StatusCode::OK, h.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

#[derive(serde::Deserialize)]
struct ItemsQuery {
    #[serde(default)]
    q: String,
}

async fn items(
    State(state): State<ApiState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let catalog = state
        .catalog
        .get_or_refresh(state.inventory.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(target: "sheets", "catalog read failed: {e:#}");
            (StatusCode::BAD_GATEWAY, "inventory unavailable".to_string())
        })?;
    let found = filter_items(&catalog, &query.q);
    Ok(Json(json!({ "query": query.q, "items": found })))
}
