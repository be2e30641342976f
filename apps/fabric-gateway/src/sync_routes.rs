//! Server side of the C7 sync wire contract, merged into the gateway's
//! router alongside `fabric-transport`'s `/messages`/`/sse`/`/health`.
//! `fabric-transport` stays free of a `fabric-sync` dependency; this module
//! is the binary-level seam where the two meet, same as `AppState` is for
//! C8/C9.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fabric_protocol::FabricError;
use fabric_sync::{SyncAck, SyncEngine, SyncHello, SyncResponse};
use serde_json::json;
use tracing::warn;

struct SyncApiError(FabricError);

impl IntoResponse for SyncApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            FabricError::PeerUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FabricError::RecordTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_outcome()}))).into_response()
    }
}

impl From<FabricError> for SyncApiError {
    fn from(err: FabricError) -> Self {
        SyncApiError(err)
    }
}

async fn hello_handler(
    State(engine): State<Arc<SyncEngine>>,
    Json(hello): Json<SyncHello>,
) -> Result<Json<SyncResponse>, SyncApiError> {
    Ok(Json(engine.respond_to_hello(&hello)?))
}

async fn ack_handler(State(_engine): State<Arc<SyncEngine>>, Json(_ack): Json<SyncAck>) -> StatusCode {
    // The initiator's ack is informational only: applying a batch is
    // idempotent, so there is nothing to reconcile here beyond logging.
    StatusCode::NO_CONTENT
}

async fn snapshot_handler(State(engine): State<Arc<SyncEngine>>) -> Result<Json<Vec<fabric_protocol::MemoryItem>>, SyncApiError> {
    match engine.scan_for_seeding().await {
        Ok(items) => Ok(Json(items)),
        Err(e) => {
            warn!(error = %e, "snapshot scan failed");
            Err(e.into())
        }
    }
}

pub fn build_sync_router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/sync", post(hello_handler))
        .route("/sync/ack", post(ack_handler))
        .route("/sync/snapshot", get(snapshot_handler))
        .with_state(engine)
}
