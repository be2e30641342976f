//! Tool surface (C9): the MCP-callable tool table dispatching into
//! C3-C7, gated by the rule engine and auditing every call.

pub mod dispatcher;
pub mod params;
pub mod registry;

pub use dispatcher::FabricToolDispatcher;
pub use registry::{FabricToolKind, ToolDefinition, ToolRegistry};
