//! MCP transport (C8): session table, SSE outbound stream, JSON-RPC-style
//! inbound endpoint, and the authenticator/dispatcher seams the gateway
//! binary wires concrete implementations into.

pub mod auth;
pub mod dispatch;
pub mod routes;
pub mod session;
pub mod state;
pub mod sweeper;

pub use auth::{Authenticator, Principal, StaticTokenAuthenticator};
pub use dispatch::{ToolDispatcher, ToolOutcome};
pub use routes::build_router;
pub use session::{SessionHandle, SessionTable};
pub use state::AppState;
pub use sweeper::{spawn_session_sweeper, SessionTimeouts};
