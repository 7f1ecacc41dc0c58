//! Server-side bookkeeping for a connected (or recently connected) client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;

/// Per-client state used by release-all and reconnect correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub client_id: String,

    /// Endpoint of the most recent connection that identified as this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_address: Option<SocketAddr>,

    /// Locks this client currently owns, including ones pending release.
    #[serde(default)]
    pub held_lock_ids: BTreeSet<String>,
}

impl ClientSession {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            ..Self::default()
        }
    }

    /// Nothing worth keeping: no locks and no address to correlate.
    pub fn is_idle(&self) -> bool {
        self.held_lock_ids.is_empty() && self.last_address.is_none()
    }
}
