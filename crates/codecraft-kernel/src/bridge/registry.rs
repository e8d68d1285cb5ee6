//! Registered hardware agents.

use std::collections::BTreeMap;

use codecraft_types::{AgentInfo, AgentStatus, Registration};

use crate::outbox::AgentSink;

#[derive(Debug)]
struct AgentRecord {
    info: AgentInfo,
    sink: AgentSink,
    /// Which connection registered this agent. A stale connection closing
    /// must not mark a reconnected agent offline.
    generation: u64,
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentRecord>,
    next_generation: u64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an agent. Returns the connection generation.
    pub fn register(&mut self, reg: &Registration, sink: AgentSink, now_ms: u64) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let info = AgentInfo {
            id: reg.agent_id.clone(),
            name: reg
                .name
                .clone()
                .unwrap_or_else(|| format!("Agent-{}", reg.agent_id)),
            platform: reg.platform.clone().unwrap_or_else(|| "unknown".to_string()),
            status: AgentStatus::Online,
            last_seen: now_ms,
        };
        self.agents.insert(
            reg.agent_id.clone(),
            AgentRecord {
                info,
                sink,
                generation,
            },
        );
        generation
    }

    /// Refresh `lastSeen` and mark online. False for unknown agents.
    pub fn heartbeat(&mut self, id: &str, now_ms: u64) -> bool {
        match self.agents.get_mut(id) {
            Some(record) => {
                record.info.last_seen = now_ms;
                record.info.status = AgentStatus::Online;
                true
            }
            None => false,
        }
    }

    /// Mark offline if `generation` is still the live connection.
    pub fn disconnect(&mut self, id: &str, generation: u64) -> bool {
        match self.agents.get_mut(id) {
            Some(record) if record.generation == generation => {
                record.info.status = AgentStatus::Offline;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&AgentInfo> {
        self.agents.get(id).map(|r| &r.info)
    }

    /// The agent's channel, if it is online.
    pub fn online_sink(&self, id: &str) -> Option<&AgentSink> {
        self.agents
            .get(id)
            .filter(|r| r.info.status == AgentStatus::Online)
            .map(|r| &r.sink)
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.values().map(|r| r.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::outbox;

    fn registration(id: &str) -> Registration {
        Registration {
            agent_id: id.to_string(),
            name: None,
            platform: Some("linux".to_string()),
            auth_token: String::new(),
        }
    }

    #[test]
    fn register_fills_defaults() {
        let mut registry = AgentRegistry::new();
        let (sink, _inbox) = outbox();
        registry.register(&registration("pi"), sink, 1000);

        let info = registry.get("pi").expect("registered");
        assert_eq!(info.name, "Agent-pi");
        assert_eq!(info.platform, "linux");
        assert_eq!(info.status, AgentStatus::Online);
        assert_eq!(info.last_seen, 1000);
    }

    #[test]
    fn stale_disconnect_is_ignored() {
        let mut registry = AgentRegistry::new();
        let (first, _a) = outbox();
        let (second, _b) = outbox();
        let old = registry.register(&registration("pi"), first, 1);
        let new = registry.register(&registration("pi"), second, 2);

        assert!(!registry.disconnect("pi", old));
        assert!(registry.online_sink("pi").is_some());

        assert!(registry.disconnect("pi", new));
        assert!(registry.online_sink("pi").is_none());
        assert_eq!(registry.list()[0].status, AgentStatus::Offline);

        assert!(registry.heartbeat("pi", 3));
        assert!(registry.online_sink("pi").is_some());
    }
}
