//! Black-box test driving `build_router` behind a real `TcpListener`: two
//! agents each holding their own session must get back only their own
//! tool responses, correlated by `request_id`, even when their calls race.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_protocol::{AgentId, InvocationContext};
use fabric_transport::{build_router, AppState, Principal, SessionTable, StaticTokenAuthenticator, ToolDispatcher, ToolOutcome};
use serde_json::json;

/// Echoes the tool name back, tagged with the calling agent, so a test can
/// tell two concurrent calls apart by their result payload alone.
struct TaggingDispatcher;

#[async_trait]
impl ToolDispatcher for TaggingDispatcher {
    async fn dispatch(&self, context: InvocationContext) -> ToolOutcome {
        ToolOutcome::Ok(json!({"tool": context.tool_name, "agent": context.agent_id.as_str()}))
    }
}

async fn spawn_gateway() -> (String, AppState) {
    let authenticator = StaticTokenAuthenticator::new()
        .with_agent_token("tok-a1", Principal { agent_id: AgentId::from_string("a1"), roles: vec!["agent".into()] })
        .with_agent_token("tok-a2", Principal { agent_id: AgentId::from_string("a2"), roles: vec!["agent".into()] });
    let state = AppState {
        sessions: Arc::new(SessionTable::new()),
        authenticator: Arc::new(authenticator),
        dispatcher: Arc::new(TaggingDispatcher),
        machine_id: fabric_protocol::MachineId::from_string("m1"),
        per_call_timeout: Duration::from_secs(5),
        started_at: chrono::Utc::now(),
        agent_count: Arc::new(|| 0),
        memory_count: Arc::new(|| 0),
        sync_lag_s: Arc::new(|| 0.0),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

async fn call(base_url: &str, token: &str, session_id: &str, request_id: &str, tool_name: &str) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/messages"))
        .bearer_auth(token)
        .json(&json!({"session_id": session_id, "request_id": request_id, "tool_name": tool_name}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success(), "unexpected status {}", response.status());
}

#[tokio::test]
async fn concurrent_sessions_do_not_cross_deliver_responses() {
    let (base_url, state) = spawn_gateway().await;

    let session_a = state.sessions.open(Principal { agent_id: AgentId::from_string("a1"), roles: vec!["agent".into()] });
    let session_b = state.sessions.open(Principal { agent_id: AgentId::from_string("a2"), roles: vec!["agent".into()] });

    let (url_a, url_b) = (base_url.clone(), base_url.clone());
    let (sid_a, sid_b) = (session_a.as_str().to_owned(), session_b.as_str().to_owned());
    tokio::join!(
        call(&url_a, "tok-a1", &sid_a, "req-a", "store_memory"),
        call(&url_b, "tok-a2", &sid_b, "req-b", "recall_memory"),
    );

    // Dispatch happens on a spawned task; give both a moment to land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let handle_a = state.sessions.get(&session_a).unwrap();
    let buffer_a = handle_a.lock().session.outbound_buffer.clone();
    assert_eq!(buffer_a.len(), 1);
    assert_eq!(buffer_a[0]["request_id"], "req-a");
    assert_eq!(buffer_a[0]["result"]["tool"], "store_memory");
    assert_eq!(buffer_a[0]["result"]["agent"], "a1");

    let handle_b = state.sessions.get(&session_b).unwrap();
    let buffer_b = handle_b.lock().session.outbound_buffer.clone();
    assert_eq!(buffer_b.len(), 1);
    assert_eq!(buffer_b[0]["request_id"], "req-b");
    assert_eq!(buffer_b[0]["result"]["tool"], "recall_memory");
    assert_eq!(buffer_b[0]["result"]["agent"], "a2");
}

#[tokio::test]
async fn messages_to_unknown_session_are_rejected_over_the_wire() {
    let (base_url, _state) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/messages"))
        .bearer_auth("tok-a1")
        .json(&json!({"session_id": fabric_protocol::SessionId::new_uuid().as_str(), "request_id": "r1", "tool_name": "store_memory"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_ok_over_the_wire() {
    let (base_url, _state) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let body: serde_json::Value = client.get(format!("{base_url}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
