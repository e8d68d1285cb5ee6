//! Hardware agent bridge.
//!
//! Agents connect on their own channel and register with a shared secret.
//! Browsers pick an agent, then send capability requests through the bridge,
//! which tags each with a fresh request id, remembers who asked, and routes
//! the agent's eventual reply back to that client alone.
//!
//! ```text
//!   client ──request──▶ bridge ──{requestId}──▶ agent
//!                         │ pending[requestId] = client   (expires after ttl)
//!   client ◀──relay──── bridge ◀──response───── agent
//! ```

mod pending;
mod registry;

pub use pending::{PendingRequest, PendingTable};
pub use registry::AgentRegistry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use codecraft_types::{
    AgentEvent, AgentInfo, AgentResponse, HardwareRequest, Registration, ServerEvent,
};

use crate::config::KernelConfig;
use crate::outbox::{AgentSink, EventSink};
use crate::session::ClientId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid auth token")]
    Unauthorized,

    #[error("No agent selected or agent offline")]
    NoAgentSelected,

    #[error("Agent not found")]
    UnknownAgent(String),

    #[error("Agent offline")]
    AgentOffline(String),
}

/// A registered agent connection, used to report its disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConnection {
    pub agent_id: String,
    pub generation: u64,
}

#[derive(Debug)]
struct BridgeState {
    agents: AgentRegistry,
    pending: PendingTable,
    clients: HashMap<ClientId, EventSink>,
}

impl BridgeState {
    fn broadcast(&self, event: ServerEvent) {
        for sink in self.clients.values() {
            sink.send(event.clone());
        }
    }
}

/// Shared between every connection.
#[derive(Debug)]
pub struct HardwareBridge {
    auth_token: String,
    state: Arc<Mutex<BridgeState>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HardwareBridge {
    pub fn new(auth_token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            auth_token: auth_token.into(),
            state: Arc::new(Mutex::new(BridgeState {
                agents: AgentRegistry::new(),
                pending: PendingTable::new(ttl),
                clients: HashMap::new(),
            })),
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(config.agent_auth_token.clone(), config.pending_ttl())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Clients
    // ═══════════════════════════════════════════════════════════════════

    pub async fn connect_client(&self, client: ClientId, sink: EventSink) {
        self.state.lock().await.clients.insert(client, sink);
    }

    /// Forget a client. Its outstanding requests simply expire.
    pub async fn disconnect_client(&self, client: ClientId) {
        self.state.lock().await.clients.remove(&client);
    }

    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        self.state.lock().await.agents.list()
    }

    /// Check that `agent_id` can be selected.
    pub async fn select_agent(&self, agent_id: &str) -> Result<(), BridgeError> {
        let state = self.state.lock().await;
        if state.agents.get(agent_id).is_none() {
            return Err(BridgeError::UnknownAgent(agent_id.to_string()));
        }
        if state.agents.online_sink(agent_id).is_none() {
            return Err(BridgeError::AgentOffline(agent_id.to_string()));
        }
        Ok(())
    }

    /// Send `request` to the client's selected agent. Returns the request id.
    #[tracing::instrument(level = "debug", skip(self, request), fields(event = request.agent_event()))]
    pub async fn forward(
        &self,
        client: ClientId,
        agent_id: Option<&str>,
        request: &HardwareRequest,
    ) -> Result<String, BridgeError> {
        let mut state = self.state.lock().await;
        let Some(sink) = agent_id.and_then(|id| state.agents.online_sink(id)).cloned() else {
            return Err(BridgeError::NoAgentSelected);
        };

        let request_id = state.pending.insert(client);
        let sent = sink.send(AgentEvent::Request {
            event: request.agent_event(),
            request_id: request_id.clone(),
            params: request.params(),
        });
        if !sent {
            state.pending.take(&request_id);
            return Err(BridgeError::NoAgentSelected);
        }

        let ttl = state.pending.ttl();
        drop(state);
        self.schedule_expiry(request_id.clone(), ttl);
        tracing::debug!(request_id = %request_id, "forwarded to agent");
        Ok(request_id)
    }

    fn schedule_expiry(&self, request_id: String, ttl: Duration) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let evicted = state.lock().await.pending.evict_expired();
            if evicted > 0 {
                tracing::debug!(request_id = %request_id, evicted, "pending requests expired");
            }
        });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Agents
    // ═══════════════════════════════════════════════════════════════════

    /// Register an agent connection. On a bad token the agent is told why
    /// and the caller should drop the connection.
    pub async fn register_agent(
        &self,
        registration: &Registration,
        sink: AgentSink,
    ) -> Result<AgentConnection, BridgeError> {
        if registration.auth_token != self.auth_token {
            tracing::warn!(agent = %registration.agent_id, "agent rejected: bad auth token");
            sink.send(AgentEvent::RegistrationFailed {
                error: BridgeError::Unauthorized.to_string(),
            });
            return Err(BridgeError::Unauthorized);
        }

        let mut state = self.state.lock().await;
        let generation = state.agents.register(registration, sink.clone(), now_ms());
        sink.send(AgentEvent::RegistrationSuccess {
            agent_id: registration.agent_id.clone(),
        });

        if let Some(info) = state.agents.get(&registration.agent_id) {
            tracing::info!(agent = %info.id, name = %info.name, platform = %info.platform, "agent registered");
            let event = ServerEvent::AgentConnected {
                id: info.id.clone(),
                name: info.name.clone(),
                platform: info.platform.clone(),
            };
            state.broadcast(event);
        }

        Ok(AgentConnection {
            agent_id: registration.agent_id.clone(),
            generation,
        })
    }

    pub async fn heartbeat(&self, agent_id: &str) {
        let mut state = self.state.lock().await;
        if !state.agents.heartbeat(agent_id, now_ms()) {
            tracing::debug!(agent = %agent_id, "heartbeat from unknown agent");
        }
    }

    pub async fn agent_disconnected(&self, connection: &AgentConnection) {
        let mut state = self.state.lock().await;
        if state
            .agents
            .disconnect(&connection.agent_id, connection.generation)
        {
            tracing::info!(agent = %connection.agent_id, "agent disconnected");
            state.broadcast(ServerEvent::AgentDisconnected {
                id: connection.agent_id.clone(),
            });
        }
    }

    /// Route an agent's reply to the client that asked. Returns whether it
    /// was delivered.
    pub async fn relay(&self, agent_id: &str, response: AgentResponse) -> bool {
        let Some(event) = response.client_event() else {
            return false;
        };
        let Some(request_id) = response.request_id.as_deref() else {
            tracing::debug!(agent = %agent_id, event, "response without request id dropped");
            return false;
        };

        let mut state = self.state.lock().await;
        let Some(client) = state.pending.take(request_id) else {
            tracing::debug!(agent = %agent_id, request_id, "late or unknown response dropped");
            return false;
        };
        match state.clients.get(&client) {
            Some(sink) => sink.send(ServerEvent::HardwareRelay {
                event,
                payload: response.payload,
            }),
            None => false,
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::outbox;
    use serde_json::{Map, Value};

    fn registration(token: &str) -> Registration {
        Registration {
            agent_id: "pi".to_string(),
            name: Some("Bench Pi".to_string()),
            platform: Some("linux".to_string()),
            auth_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn bad_token_is_rejected() {
        let bridge = HardwareBridge::new("secret", Duration::from_secs(30));
        let (sink, mut inbox) = outbox();
        let err = bridge
            .register_agent(&registration("wrong"), sink)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Unauthorized);
        assert_eq!(
            inbox.drain(),
            vec![AgentEvent::RegistrationFailed {
                error: "Invalid auth token".to_string()
            }]
        );
        assert!(bridge.list_agents().await.is_empty());
    }

    #[tokio::test]
    async fn forward_without_selection_fails() {
        let bridge = HardwareBridge::new("secret", Duration::from_secs(30));
        let err = bridge
            .forward(ClientId(1), None, &HardwareRequest::ListSerialPorts)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No agent selected or agent offline");
    }

    #[tokio::test]
    async fn response_reaches_only_the_requester() {
        let bridge = HardwareBridge::new("secret", Duration::from_secs(30));
        let (agent_sink, mut agent_inbox) = outbox();
        bridge
            .register_agent(&registration("secret"), agent_sink)
            .await
            .expect("register");

        let (a_sink, mut a_inbox) = outbox();
        let (b_sink, mut b_inbox) = outbox();
        bridge.connect_client(ClientId(1), a_sink).await;
        bridge.connect_client(ClientId(2), b_sink).await;

        let id = bridge
            .forward(ClientId(1), Some("pi"), &HardwareRequest::ListSerialPorts)
            .await
            .expect("forward");
        let sent = agent_inbox.drain();
        assert!(matches!(
            sent.last(),
            Some(AgentEvent::Request { event: "list_serial_ports", request_id, .. }) if *request_id == id
        ));

        let mut payload = Map::new();
        payload.insert("ports".into(), Value::Array(vec![]));
        let delivered = bridge
            .relay(
                "pi",
                AgentResponse {
                    event: "serial_ports_list".to_string(),
                    request_id: Some(id),
                    payload: payload.clone(),
                },
            )
            .await;
        assert!(delivered);
        assert_eq!(bridge.pending_len().await, 0);

        assert!(a_inbox.drain().contains(&ServerEvent::HardwareRelay {
            event: "hardware:serialPortsList",
            payload,
        }));
        assert!(!b_inbox
            .drain()
            .iter()
            .any(|e| matches!(e, ServerEvent::HardwareRelay { .. })));
    }
}
