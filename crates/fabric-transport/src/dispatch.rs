//! The seam between a transport session and the tool surface that actually
//! executes calls. Kept abstract so this crate never depends on
//! `fabric-tools`; the gateway binary wires a concrete dispatcher in.

use async_trait::async_trait;
use fabric_protocol::{ErrorOutcome, InvocationContext};
use serde_json::Value;

/// Outcome of one tool invocation, mirroring the `{result}` /
/// `{error: {kind, detail, retriable}}` wire contract every tool returns.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok(Value),
    Err(ErrorOutcome),
}

#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, context: InvocationContext) -> ToolOutcome;
}
