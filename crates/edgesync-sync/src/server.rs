//! # Peer Server
//!
//! Local HTTP API exposing the engine's operations, so that another
//! instance (or an operator) can pull from, push to, inspect and drive
//! this one. The pull/push routes mirror the remote protocol, which lets an
//! instance act as the master for its own edges.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  /health                         "OK"                             │
//! │  GET  /api/sync/tables                discovered entities              │
//! │  GET  /api/sync/status                status of every entity           │
//! │  GET  /api/sync/status/{entity}       status of one entity             │
//! │  GET  /api/sync/pull/{entity}?since=  JSON array of changed records    │
//! │  POST /api/sync/push/{entity}         apply a JSON array of records    │
//! │  POST /api/sync/reset[/{entity}]      forget watermark(s) (?all=true)  │
//! │  POST /api/sync/full                  run one full cycle               │
//! │                                                                         │
//! │  unknown entity → 404    malformed body / since → 400                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use edgesync_core::record::json_kind;
use edgesync_core::Timestamp;

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Server
// =============================================================================

/// HTTP server over a shared [`SyncEngine`].
pub struct PeerServer {
    engine: Arc<SyncEngine>,
    bind_addr: String,
}

/// Handle for controlling a running peer server.
#[derive(Clone)]
pub struct PeerHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl PeerHandle {
    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shuts down the peer server.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::Internal("Peer server shutdown channel closed".into()))
    }
}

impl PeerServer {
    pub fn new(engine: Arc<SyncEngine>, bind_addr: impl Into<String>) -> Self {
        PeerServer {
            engine,
            bind_addr: bind_addr.into(),
        }
    }

    /// Starts the server and returns a handle.
    pub async fn start(self) -> SyncResult<PeerHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            SyncError::ServerError(format!("Failed to bind to {}: {}", self.bind_addr, e))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SyncError::ServerError(e.to_string()))?;

        let app = router(self.engine);

        info!(addr = %local_addr, "Peer server started");

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                    info!("Peer server shutting down");
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Peer server stopped with error");
            }
        });

        Ok(PeerHandle {
            local_addr,
            shutdown_tx,
        })
    }
}

/// Builds the router with every sync route.
pub fn router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sync/tables", get(tables_handler))
        .route("/api/sync/status", get(status_handler))
        .route("/api/sync/status/{entity}", get(entity_status_handler))
        .route("/api/sync/pull/{entity}", get(pull_handler))
        .route("/api/sync/push/{entity}", post(push_handler))
        .route("/api/sync/reset", post(reset_all_handler))
        .route("/api/sync/reset/{entity}", post(reset_handler))
        .route("/api/sync/full", post(full_sync_handler))
        .with_state(engine)
}

// =============================================================================
// Errors
// =============================================================================

/// A [`SyncError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Peer request failed");
            json!({
                "success": false,
                "message": "Internal server error",
                "error": self.0.to_string(),
            })
        } else {
            json!({ "success": false, "message": self.0.to_string() })
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn tables_handler(State(engine): State<Arc<SyncEngine>>) -> Json<Value> {
    let catalog = engine.tables().await;
    let data: Vec<Value> = catalog
        .iter()
        .map(|entity| {
            json!({
                "table": entity.table,
                "model_class": entity.model,
                "capabilities": entity.capabilities,
                "push": entity.push,
            })
        })
        .collect();

    Json(json!({ "success": true, "count": data.len(), "data": data }))
}

async fn status_handler(State(engine): State<Arc<SyncEngine>>) -> Json<Value> {
    let status = engine.status().await;
    Json(json!({ "success": true, "data": status }))
}

async fn entity_status_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(entity): Path<String>,
) -> ApiResult<Json<Value>> {
    let status = engine.entity_status(&entity).await?;
    Ok(Json(json!({ "success": true, "data": status })))
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    since: Option<String>,
}

async fn pull_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(entity): Path<String>,
    Query(query): Query<PullQuery>,
) -> ApiResult<Json<Value>> {
    let since = match query.since.as_deref() {
        None | Some("") => None,
        Some(text) => Some(Timestamp::parse_loose(text).ok_or_else(|| {
            SyncError::InvalidPayload(format!("'since' is not a timestamp: {text}"))
        })?),
    };

    let records = engine.serve_pull(&entity, since).await?;
    Ok(Json(Value::from(
        records.into_iter().map(Value::from).collect::<Vec<_>>(),
    )))
}

async fn push_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(entity): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|e| SyncError::InvalidPayload(format!("body is not JSON: {e}")))?;

    let values = match parsed {
        Value::Array(values) => values,
        other => {
            return Err(SyncError::InvalidPayload(format!(
                "Expected array of records, got {}",
                json_kind(&other)
            ))
            .into())
        }
    };

    let receipt = engine.serve_push(&entity, values).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully processed {} records", receipt.processed),
        "processed": receipt.processed,
        "total_received": receipt.total_received,
        "stale": receipt.stale,
        "errors": receipt.errors,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ResetQuery {
    #[serde(default)]
    all: bool,
}

async fn reset_all_handler(State(engine): State<Arc<SyncEngine>>) -> ApiResult<Json<Value>> {
    let removed = engine.reset(None).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Reset sync data for all tables",
        "removed": removed,
    })))
}

async fn reset_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(entity): Path<String>,
    Query(query): Query<ResetQuery>,
) -> ApiResult<Json<Value>> {
    if query.all {
        return reset_all_handler(State(engine)).await;
    }

    let removed = engine.reset(Some(&entity)).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Reset sync data for table '{}'", entity),
        "removed": removed,
    })))
}

async fn full_sync_handler(State(engine): State<Arc<SyncEngine>>) -> Json<Value> {
    let result = engine.sync().await;
    let message = if result.success {
        "Full sync completed".to_string()
    } else {
        result.message.clone()
    };

    Json(json!({
        "success": result.success,
        "message": message,
        "data": result,
    }))
}
