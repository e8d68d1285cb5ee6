//! Events sent by the browser client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::{Envelope, ProtocolError};

/// Payload of `code:execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Text fed to the program: stdin for native runs, `input()` lines for CraftLang.
    #[serde(default)]
    pub input: Option<String>,
}

/// Payload of `code:validate` and `code:format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRequest {
    pub code: String,
}

/// Payload of `python:exec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonExecRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalInput {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectAgentRequest {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
struct SerialOpenParams {
    port: String,
    #[serde(default = "default_baudrate")]
    baudrate: u32,
}

fn default_baudrate() -> u32 {
    9600
}

#[derive(Debug, Deserialize)]
struct SerialWriteParams {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CameraStartParams {
    #[serde(default)]
    camera_id: u32,
}

/// A capability request destined for the selected hardware agent.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareRequest {
    ListSerialPorts,
    SerialOpen { port: String, baudrate: u32 },
    SerialWrite { data: String },
    SerialClose,
    ListCameras,
    CameraStart { camera_id: u32 },
    CameraCapture,
    CameraStop,
}

impl HardwareRequest {
    /// Event name the agent understands.
    pub fn agent_event(&self) -> &'static str {
        match self {
            HardwareRequest::ListSerialPorts => "list_serial_ports",
            HardwareRequest::SerialOpen { .. } => "serial_open",
            HardwareRequest::SerialWrite { .. } => "serial_write",
            HardwareRequest::SerialClose => "serial_close",
            HardwareRequest::ListCameras => "camera_list",
            HardwareRequest::CameraStart { .. } => "camera_start",
            HardwareRequest::CameraCapture => "camera_capture",
            HardwareRequest::CameraStop => "camera_stop",
        }
    }

    /// Request parameters, without the correlation id.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match self {
            HardwareRequest::SerialOpen { port, baudrate } => {
                params.insert("port".into(), Value::from(port.clone()));
                params.insert("baudrate".into(), Value::from(*baudrate));
            }
            HardwareRequest::SerialWrite { data } => {
                params.insert("data".into(), Value::from(data.clone()));
            }
            HardwareRequest::CameraStart { camera_id } => {
                params.insert("cameraId".into(), Value::from(*camera_id));
            }
            _ => {}
        }
        params
    }
}

/// Everything the browser can ask of its session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Execute(ExecuteRequest),
    Stop,
    Validate(SourceRequest),
    Format(SourceRequest),
    LanguageInfo,
    TerminalInput(TerminalInput),
    PythonStart,
    PythonExec(PythonExecRequest),
    PythonReset,
    PythonStop,
    ListAgents,
    SelectAgent(SelectAgentRequest),
    Hardware(HardwareRequest),
}

impl ClientEvent {
    pub fn from_envelope(env: &Envelope) -> Result<Self, ProtocolError> {
        let event = match env.event.as_str() {
            "code:execute" => ClientEvent::Execute(env.payload()?),
            "code:stop" => ClientEvent::Stop,
            "code:validate" => ClientEvent::Validate(env.payload()?),
            "code:format" => ClientEvent::Format(env.payload()?),
            "craftlang:info" => ClientEvent::LanguageInfo,
            "terminal:data" => ClientEvent::TerminalInput(env.payload()?),
            "python:start" => ClientEvent::PythonStart,
            "python:exec" => ClientEvent::PythonExec(env.payload()?),
            "python:reset" => ClientEvent::PythonReset,
            "python:stop" => ClientEvent::PythonStop,
            "hardware:listAgents" => ClientEvent::ListAgents,
            "hardware:selectAgent" => ClientEvent::SelectAgent(env.payload()?),
            "hardware:listSerialPorts" => ClientEvent::Hardware(HardwareRequest::ListSerialPorts),
            "hardware:serialOpen" => {
                let p: SerialOpenParams = env.payload()?;
                ClientEvent::Hardware(HardwareRequest::SerialOpen {
                    port: p.port,
                    baudrate: p.baudrate,
                })
            }
            "hardware:serialWrite" => {
                let p: SerialWriteParams = env.payload()?;
                ClientEvent::Hardware(HardwareRequest::SerialWrite { data: p.data })
            }
            "hardware:serialClose" => ClientEvent::Hardware(HardwareRequest::SerialClose),
            "hardware:listCameras" => ClientEvent::Hardware(HardwareRequest::ListCameras),
            "hardware:cameraStart" => {
                let p: CameraStartParams = env.payload()?;
                ClientEvent::Hardware(HardwareRequest::CameraStart {
                    camera_id: p.camera_id,
                })
            }
            "hardware:cameraCapture" => ClientEvent::Hardware(HardwareRequest::CameraCapture),
            "hardware:cameraStop" => ClientEvent::Hardware(HardwareRequest::CameraStop),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
        ClientEvent::from_envelope(&Envelope::from_text(text).expect("frame"))
    }

    #[test]
    fn execute_carries_fields() {
        let event = decode(
            r#"{"event":"code:execute","data":{"code":"print(1);","language":"craftlang","filename":"a.craft"}}"#,
        )
        .expect("decode");
        match event {
            ClientEvent::Execute(req) => {
                assert_eq!(req.code, "print(1);");
                assert_eq!(req.language, "craftlang");
                assert_eq!(req.filename.as_deref(), Some("a.craft"));
                assert_eq!(req.input, None);
            }
            other => panic!("expected execute, got {:?}", other),
        }
    }

    #[test]
    fn execute_without_code_is_invalid() {
        let err = decode(r#"{"event":"code:execute","data":{"language":"c"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[rstest]
    #[case(r#"{"event":"hardware:serialOpen","data":{"port":"/dev/ttyUSB0"}}"#, "serial_open", json!({"port": "/dev/ttyUSB0", "baudrate": 9600}))]
    #[case(r#"{"event":"hardware:cameraStart","data":{}}"#, "camera_start", json!({"cameraId": 0}))]
    #[case(r#"{"event":"hardware:serialWrite","data":{"data":"hi"}}"#, "serial_write", json!({"data": "hi"}))]
    #[case(r#"{"event":"hardware:listCameras"}"#, "camera_list", json!({}))]
    fn hardware_requests_map_to_agent_events(
        #[case] text: &str,
        #[case] agent_event: &str,
        #[case] params: Value,
    ) {
        match decode(text).expect("decode") {
            ClientEvent::Hardware(req) => {
                assert_eq!(req.agent_event(), agent_event);
                assert_eq!(Value::Object(req.params()), params);
            }
            other => panic!("expected hardware request, got {:?}", other),
        }
    }

    #[test]
    fn validate_and_format_share_a_payload() {
        let body = r#"{"code":"let x = 1;"}"#;
        let validate = decode(&format!(r#"{{"event":"code:validate","data":{}}}"#, body));
        let format = decode(&format!(r#"{{"event":"code:format","data":{}}}"#, body));
        let source = SourceRequest {
            code: "let x = 1;".to_string(),
        };
        assert_eq!(validate.expect("validate"), ClientEvent::Validate(source.clone()));
        assert_eq!(format.expect("format"), ClientEvent::Format(source));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = decode(r#"{"event":"debug:start","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(e) if e == "debug:start"));
    }
}
