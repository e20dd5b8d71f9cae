//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::ExpiringCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, KeysResponse, SetRequest,
    SetResponse, StatsResponse, TtlResponse,
};

/// Application state shared across all handlers.
///
/// The cache synchronizes internally, so clones can be handed to every
/// handler without an outer lock.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache handle
    pub cache: ExpiringCache<String, String>,
}

impl AppState {
    /// Creates a new AppState around an existing cache.
    pub fn new(cache: ExpiringCache<String, String>) -> Self {
        Self { cache }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = ExpiringCache::new(config.default_ttl())?;
        Ok(Self::new(cache))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair with an optional TTL in milliseconds.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl().unwrap_or_else(|| state.cache.default_ttl());
    state.cache.set_with_ttl(req.key.clone(), req.value, ttl);

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get(key.as_str())
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for GET /touch/:key
///
/// Reads the value and resets its TTL to the cache default.
pub async fn touch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get_lru(key.as_str())
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.cache.delete(key.as_str()) {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /ttl/:key
///
/// Always succeeds; a missing key reports `ttl_ms: -1`.
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<TtlResponse> {
    let remaining = state.cache.remaining_ttl(key.as_str());
    Json(TtlResponse::new(key, remaining))
}

/// Handler for GET /keys
pub async fn keys_handler(State(state): State<AppState>) -> Json<KeysResponse> {
    Json(KeysResponse::new(state.cache.keys()))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear();
    Json(ClearResponse::new())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
