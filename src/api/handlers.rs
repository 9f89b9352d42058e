//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{SetOptions, TieredCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateResponse, SetRequest,
    SetResponse, StatsResponse, SweepResponse,
};

/// Cache type served over HTTP: arbitrary JSON values.
pub type JsonCache = TieredCache<Value>;

/// Application state shared across all handlers.
///
/// The cache serializes its own internal mutation, so handlers share it
/// through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<JsonCache>,
}

impl AppState {
    /// Creates a new AppState around an existing cache.
    pub fn new(cache: JsonCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration, opening the durable tier
    /// when persistence is enabled.
    pub fn from_config(config: &Config) -> Self {
        Self::new(TieredCache::new(config.clone()))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL and namespace.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let options = SetOptions {
        ttl: req.ttl,
        namespace: req.namespace,
    };
    state
        .cache
        .set_with_options(req.key.clone(), req.value, options)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from either tier by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from both tiers.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.cache.delete(&key).await {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for DELETE /namespace/:ns
///
/// Removes every entry tagged with the namespace.
pub async fn invalidate_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.cache.invalidate_namespace(&namespace).await;
    Json(InvalidateResponse { namespace, removed })
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear().await;
    Json(ClearResponse::cleared())
}

/// Handler for POST /sweep
///
/// Runs an expiry sweep immediately instead of waiting for the timer.
pub async fn sweep_handler(State(state): State<AppState>) -> Json<SweepResponse> {
    Json(state.cache.sweep_expired().await.into())
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    let disk = state.cache.disk_usage().await;

    Json(StatsResponse::new(
        &stats,
        state.cache.config().eviction_policy,
        disk,
    ))
}

/// Handler for GET /health
///
/// Reports "degraded" when persistence was requested but the durable tier
/// could not be opened.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.cache.config().persist_to_disk && !state.cache.is_persistent() {
        Json(HealthResponse::degraded())
    } else {
        Json(HealthResponse::healthy())
    }
}
