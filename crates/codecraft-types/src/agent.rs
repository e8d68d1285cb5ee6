//! Hardware agent records and the agent-channel messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::envelope::{Envelope, ProtocolError};

/// Connection state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Online => write!(f, "online"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Public view of a registered agent, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub status: AgentStatus,
    /// Milliseconds since the Unix epoch.
    pub last_seen: u64,
}

/// Payload of `register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub agent_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub auth_token: String,
}

/// A capability response from an agent, still carrying its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    /// Agent-side event name, e.g. `serial_opened`.
    pub event: String,
    pub request_id: Option<String>,
    /// Everything except `requestId`.
    pub payload: Map<String, Value>,
}

impl AgentResponse {
    /// Client-facing event name for this response.
    pub fn client_event(&self) -> Option<&'static str> {
        response_client_event(&self.event)
    }
}

/// Maps an agent response event to the `hardware:*` event relayed to the client.
pub fn response_client_event(agent_event: &str) -> Option<&'static str> {
    Some(match agent_event {
        "serial_ports_list" => "hardware:serialPortsList",
        "serial_opened" => "hardware:serialOpened",
        "serial_data" => "hardware:serialData",
        "serial_closed" => "hardware:serialClosed",
        "error_response" => "hardware:error",
        "camera_list_response" => "hardware:camerasList",
        "camera_start_response" => "hardware:cameraStarted",
        "camera_capture_response" => "hardware:cameraImage",
        "camera_stop_response" => "hardware:cameraStopped",
        _ => return None,
    })
}

/// Messages an agent sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Register(Registration),
    Heartbeat,
    Response(AgentResponse),
}

impl AgentMessage {
    pub fn from_envelope(env: &Envelope) -> Result<Self, ProtocolError> {
        match env.event.as_str() {
            "register" => Ok(AgentMessage::Register(env.payload()?)),
            "heartbeat" => Ok(AgentMessage::Heartbeat),
            other if response_client_event(other).is_some() => {
                let mut payload = match &env.data {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                let request_id = payload
                    .remove("requestId")
                    .and_then(|v| v.as_str().map(str::to_string));
                Ok(AgentMessage::Response(AgentResponse {
                    event: other.to_string(),
                    request_id,
                    payload,
                }))
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Messages the server sends to an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    RegistrationSuccess { agent_id: String },
    RegistrationFailed { error: String },
    /// A forwarded capability request.
    Request {
        event: &'static str,
        request_id: String,
        params: Map<String, Value>,
    },
}

impl AgentEvent {
    pub fn into_envelope(self) -> Envelope {
        match self {
            AgentEvent::RegistrationSuccess { agent_id } => {
                Envelope::new("registration_success", json!({ "agentId": agent_id }))
            }
            AgentEvent::RegistrationFailed { error } => {
                Envelope::new("registration_failed", json!({ "error": error }))
            }
            AgentEvent::Request {
                event,
                request_id,
                mut params,
            } => {
                params.insert("requestId".into(), Value::from(request_id));
                Envelope::new(event, Value::Object(params))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_strips_request_id() {
        let env = Envelope::from_text(
            r#"{"event":"serial_opened","data":{"requestId":"req_1","success":true,"port":"COM3"}}"#,
        )
        .expect("frame");
        let msg = AgentMessage::from_envelope(&env).expect("decode");
        let AgentMessage::Response(resp) = msg else {
            panic!("expected response");
        };
        assert_eq!(resp.request_id.as_deref(), Some("req_1"));
        assert!(!resp.payload.contains_key("requestId"));
        assert_eq!(resp.client_event(), Some("hardware:serialOpened"));
    }

    #[test]
    fn register_defaults_optional_fields() {
        let env = Envelope::from_text(
            r#"{"event":"register","data":{"agentId":"pi","authToken":"t"}}"#,
        )
        .expect("frame");
        let AgentMessage::Register(reg) = AgentMessage::from_envelope(&env).expect("decode") else {
            panic!("expected register");
        };
        assert_eq!(reg.agent_id, "pi");
        assert_eq!(reg.name, None);
        assert_eq!(reg.auth_token, "t");
    }

    #[test]
    fn request_envelope_attaches_id() {
        let mut params = Map::new();
        params.insert("port".into(), Value::from("/dev/ttyACM0"));
        let env = AgentEvent::Request {
            event: "serial_open",
            request_id: "req_9".into(),
            params,
        }
        .into_envelope();
        assert_eq!(env.event, "serial_open");
        assert_eq!(env.data["requestId"], "req_9");
        assert_eq!(env.data["port"], "/dev/ttyACM0");
    }
}
