//! Partition identity.
//!
//! A partition is one independently synchronized unit of shared state,
//! addressed by a `(state_type, state_id)` pair. The authoritative snapshot
//! lives in the backend runtime; the gateway only uses the pair to scope
//! broadcast groups and to address bridge calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State type used when a client does not name one.
pub const DEFAULT_STATE_TYPE: &str = "shared";

/// State id used when a client does not name one.
pub const DEFAULT_STATE_ID: &str = "default";

/// Identity of one shared-state partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Namespace of the partition (e.g. `"shared"`).
    pub state_type: String,
    /// Id within the namespace (e.g. `"default"`).
    pub state_id: String,
}

impl Partition {
    /// Create a partition from its two components.
    pub fn new(state_type: impl Into<String>, state_id: impl Into<String>) -> Self {
        Self {
            state_type: state_type.into(),
            state_id: state_id.into(),
        }
    }

    /// The broadcast group all connections bound to this partition join.
    #[must_use]
    pub fn group_name(&self) -> String {
        format!("{}:{}", self.state_type, self.state_id)
    }

    /// URL-style address (`{state_type}/{state_id}`).
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}/{}", self.state_type, self.state_id)
    }

    /// Parse a URL-style address. A bare id resolves against the default
    /// state type; empty segments are rejected.
    #[must_use]
    pub fn from_address(address: &str) -> Option<Self> {
        let trimmed = address.trim_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.split_once('/') {
            Some((state_type, state_id)) => {
                if state_type.is_empty() || state_id.is_empty() || state_id.contains('/') {
                    None
                } else {
                    Some(Self::new(state_type, state_id))
                }
            }
            None => Some(Self::new(DEFAULT_STATE_TYPE, trimmed)),
        }
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TYPE, DEFAULT_STATE_ID)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.state_type, self.state_id)
    }
}
