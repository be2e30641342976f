//! Authenticator seam. Credential vault internals are out of scope here;
//! this crate only needs something that turns a bearer token into a
//! principal and can vouch for a sync peer's machine identity.

use std::collections::HashMap;

use async_trait::async_trait;
use fabric_protocol::{AgentId, FabricError, FabricResult, MachineId};

/// The authenticated identity behind an incoming MCP session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub agent_id: AgentId,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token into a principal, rejecting tokens that
    /// lack `required_scope`.
    async fn validate(&self, token: &str, required_scope: &str) -> FabricResult<Principal>;

    /// Resolve a bearer token presented on a peer-to-peer sync connection
    /// into the machine identity it speaks for.
    async fn principal_for_sync(&self, token: &str) -> FabricResult<MachineId>;
}

/// Fixed token table, for tests and single-operator deployments where the
/// vault is a config file rather than a running service.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuthenticator {
    agents: HashMap<String, Principal>,
    machines: HashMap<String, MachineId>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.agents.insert(token.into(), principal);
        self
    }

    pub fn with_sync_token(mut self, token: impl Into<String>, machine_id: MachineId) -> Self {
        self.machines.insert(token.into(), machine_id);
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn validate(&self, token: &str, required_scope: &str) -> FabricResult<Principal> {
        let principal = self.agents.get(token).ok_or(FabricError::Unauthorized)?;
        if required_scope.is_empty() || principal.has_role(required_scope) {
            Ok(principal.clone())
        } else {
            Err(FabricError::Forbidden(format!("token lacks required scope {required_scope}")))
        }
    }

    async fn principal_for_sync(&self, token: &str) -> FabricResult<MachineId> {
        self.machines.get(token).cloned().ok_or(FabricError::Unauthorized)
    }
}
