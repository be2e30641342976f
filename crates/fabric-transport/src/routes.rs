//! `POST /messages`, `GET /sse`, `GET /health`, grounded directly on
//! `aios-api`'s axum `Router` + SSE pattern, generalized from per-session
//! kernel-event replay to per-session JSON-RPC-style request/response
//! correlation.

use std::convert::Infallible;
use std::time::Duration as StdDuration;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fabric_protocol::{FabricError, InvocationContext, SessionId};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::dispatch::{ToolDispatcher, ToolOutcome};
use crate::state::AppState;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<FabricError> for ApiError {
    fn from(err: FabricError) -> Self {
        let status = match err {
            FabricError::Unauthorized => StatusCode::UNAUTHORIZED,
            FabricError::Forbidden(_) => StatusCode::FORBIDDEN,
            FabricError::NotFound(_) => StatusCode::NOT_FOUND,
            FabricError::SessionExpired => StatusCode::GONE,
            FabricError::CallTimeout | FabricError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError { status, body: json!({ "error": err.to_outcome() }) }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError { status: StatusCode::UNAUTHORIZED, body: json!({"error": "no session"}) })
}

#[derive(Debug, Deserialize)]
struct SseQuery {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    recovery_token: Option<String>,
}

/// Subscribing opens a new session (when no `session_id` is given) or
/// recovers one (when `session_id` + `recovery_token` are given), then
/// streams buffered and subsequent outbound events as newline-delimited
/// JSON SSE frames.
async fn sse_handler(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let token = bearer_token(&headers)?;

    let (session_id, mut backlog) = match (query.session_id, query.recovery_token) {
        (Some(session_id), Some(recovery_token)) => {
            state.authenticator.validate(token, "agent").await?;
            let backlog = state.sessions.recover(&session_id, &recovery_token)?;
            (session_id, backlog)
        }
        _ => {
            let principal = state.authenticator.validate(token, "agent").await?;
            let session_id = state.sessions.open(principal);
            (session_id, Vec::new())
        }
    };

    backlog.insert(0, json!({"type": "session_open", "session_id": session_id.as_str()}));

    let stream = stream! {
        for event in backlog {
            yield Ok(Event::default().data(event.to_string()));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(StdDuration::from_secs(15))))
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    session_id: SessionId,
    request_id: String,
    tool_name: String,
    #[serde(default)]
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct MessageAccepted {
    session_id: String,
    request_id: String,
}

/// Accepts one inbound call, dispatches it under `per_call_timeout`, and
/// delivers the response on the session's SSE stream rather than in the
/// HTTP response body — the two are correlated only by `request_id`.
async fn messages_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<MessageAccepted>> {
    let token = bearer_token(&headers)?;
    let principal = state
        .sessions
        .principal_of(&request.session_id)
        .ok_or_else(|| ApiError {
            status: StatusCode::NOT_FOUND,
            body: json!({"error": "unknown session"}),
        })?;
    state.authenticator.validate(token, "agent").await?;
    state.sessions.touch(&request.session_id)?;
    state.sessions.begin_call(&request.session_id, request.request_id.clone(), request.tool_name.clone())?;

    let sessions = state.sessions.clone();
    let dispatcher = state.dispatcher.clone();
    let session_id = request.session_id.clone();
    let request_id = request.request_id.clone();
    let machine_id = state.machine_id.clone();
    let per_call_timeout = state.per_call_timeout;
    let accepted = MessageAccepted {
        session_id: request.session_id.as_str().to_owned(),
        request_id: request.request_id.clone(),
    };

    tokio::spawn(async move {
        let context = InvocationContext {
            agent_id: principal.agent_id,
            machine_id,
            tool_name: request.tool_name,
            parameters: request.parameters,
            session_id: session_id.clone(),
            time: chrono::Utc::now(),
        };
        let outcome = match tokio::time::timeout(per_call_timeout, dispatcher.dispatch(context)).await {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::Err(FabricError::CallTimeout.to_outcome()),
        };
        let frame = match outcome {
            ToolOutcome::Ok(result) => json!({"request_id": request_id, "result": result}),
            ToolOutcome::Err(error) => json!({"request_id": request_id, "error": error}),
        };
        sessions.end_call(&session_id, &request_id);
        if let Err(e) = sessions.push_outbound(&session_id, frame) {
            warn!(session_id = %session_id, error = %e, "failed to buffer response, session gone");
        }
    });

    Ok(Json(accepted))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    uptime_s: i64,
    agent_count: usize,
    memory_count: usize,
    sync_lag_s: f64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let uptime_s = chrono::Utc::now().signed_duration_since(state.started_at).num_seconds();
    Json(HealthReport {
        status: "ok",
        uptime_s,
        agent_count: (state.agent_count)(),
        memory_count: (state.memory_count)(),
        sync_lag_s: (state.sync_lag_s)(),
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/messages", post(messages_handler))
        .route("/sse", get(sse_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Principal, StaticTokenAuthenticator};
    use crate::session::SessionTable;
    use async_trait::async_trait;
    use fabric_protocol::AgentId;
    use std::sync::Arc;

    struct EchoDispatcher;

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        async fn dispatch(&self, context: InvocationContext) -> ToolOutcome {
            ToolOutcome::Ok(json!({"echo": context.tool_name}))
        }
    }

    fn test_state() -> AppState {
        let authenticator = StaticTokenAuthenticator::new().with_agent_token(
            "tok-a1",
            Principal { agent_id: AgentId::from_string("a1"), roles: vec!["agent".into()] },
        );
        AppState {
            sessions: Arc::new(SessionTable::new()),
            authenticator: Arc::new(authenticator),
            dispatcher: Arc::new(EchoDispatcher),
            machine_id: fabric_protocol::MachineId::from_string("m1"),
            per_call_timeout: StdDuration::from_secs(5),
            started_at: chrono::Utc::now(),
            agent_count: Arc::new(|| 0),
            memory_count: Arc::new(|| 0),
            sync_lag_s: Arc::new(|| 0.0),
        }
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer tok-a1".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn messages_handler_rejects_unknown_session() {
        let state = test_state();
        let request = MessageRequest {
            session_id: SessionId::new_uuid(),
            request_id: "r1".into(),
            tool_name: "store_memory".into(),
            parameters: json!({}),
        };
        let err = messages_handler(State(state), auth_headers(), Json(request)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_handler_accepts_known_session() {
        let state = test_state();
        let principal = Principal { agent_id: AgentId::from_string("a1"), roles: vec!["agent".into()] };
        let session_id = state.sessions.open(principal);
        let request = MessageRequest {
            session_id: session_id.clone(),
            request_id: "r1".into(),
            tool_name: "store_memory".into(),
            parameters: json!({}),
        };
        let accepted = messages_handler(State(state), auth_headers(), Json(request)).await.unwrap();
        assert_eq!(accepted.0.session_id, session_id.as_str());
    }

    #[tokio::test]
    async fn health_handler_reports_ok_status() {
        let state = test_state();
        let report = health_handler(State(state)).await;
        assert_eq!(report.0.status, "ok");
    }
}
