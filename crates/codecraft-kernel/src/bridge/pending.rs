//! Correlation table for requests forwarded to agents.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::session::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub client: ClientId,
    pub created: Instant,
}

/// Maps request ids to the client waiting on them. Entries live at most `ttl`.
#[derive(Debug)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
    ttl: Duration,
}

impl PendingTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record a request from `client` and return its fresh id.
    pub fn insert(&mut self, client: ClientId) -> String {
        let id = format!("req_{}", uuid::Uuid::new_v4().simple());
        self.entries.insert(
            id.clone(),
            PendingRequest {
                client,
                created: Instant::now(),
            },
        );
        id
    }

    /// Consume the entry for `id`. Entries past their lifetime are removed
    /// and reported as missing.
    pub fn take(&mut self, id: &str) -> Option<ClientId> {
        let entry = self.entries.remove(id)?;
        if entry.created.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.client)
    }

    /// Drop every entry past the ttl. Returns how many went.
    pub fn evict_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.created.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
