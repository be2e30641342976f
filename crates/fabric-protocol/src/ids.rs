//! Canonical identifier types for the fabric.
//!
//! IDs are opaque, serde-transparent string wrappers. Plain entity ids are
//! backed by UUID v4; `MemoryId` is content-addressed (blake3 of the content
//! plus a random salt, truncated to 128 bits) so that storing identical bytes
//! twice from the same origin tends to collide during dedup lookups before a
//! new id is ever minted.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new id using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identity of an agent authenticated to the fabric.
    AgentId
);
typed_id!(
    /// Identity of a machine participating in the sync fabric.
    MachineId
);
typed_id!(
    /// Identifier of a Message flowing through the coordination bus.
    MessageId
);
typed_id!(
    /// Identifier of a governance rule.
    RuleId
);
typed_id!(
    /// Identifier of an MCP transport session.
    SessionId
);
typed_id!(
    /// Identifier of a delegation created by `delegate_task`.
    DelegationId
);
typed_id!(
    /// Identifier of a pending approval ticket.
    ApprovalId
);

/// Content-addressed 128-bit identifier for a `MemoryItem`.
///
/// Stable across versions of the same item: `version` advances independently
/// of `id`. Never reused once minted, per the storage invariant in the spec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Derive an id from `content` and a random salt using blake3, keeping
    /// only the first 16 bytes (128 bits) of the digest, hex-encoded.
    pub fn derive(content: &[u8], salt: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(content);
        hasher.update(&salt.to_le_bytes());
        let digest = hasher.finalize();
        let bytes = &digest.as_bytes()[..16];
        Self(hex::encode(bytes))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MemoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
