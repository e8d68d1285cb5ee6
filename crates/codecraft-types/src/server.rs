//! Events the server pushes to a browser client.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent::AgentInfo;
use crate::envelope::Envelope;

/// Which stream an `execution:output` chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Output,
    Error,
    Warn,
}

/// One lexer or parser complaint, as reported by `code:validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Static description of the embedded language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub keywords: Vec<String>,
    pub builtins: Vec<String>,
    pub operators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Output { output: String, kind: OutputKind },
    /// Setup failures and compiler errors.
    Error { error: String },
    Complete { exit_code: i32 },
    Validation { valid: bool, errors: Vec<Diagnostic> },
    Formatted { code: String },
    LanguageInfo(LanguageInfo),
    TerminalOutput { data: String },
    PythonReady { message: String },
    PythonStopped { message: String },
    AgentsList { agents: Vec<AgentInfo> },
    AgentSelected {
        agent_id: String,
        success: bool,
        error: Option<String>,
    },
    AgentConnected { id: String, name: String, platform: String },
    AgentDisconnected { id: String },
    HardwareError { error: String },
    /// An agent response forwarded under its `hardware:*` name.
    HardwareRelay {
        event: &'static str,
        payload: Map<String, Value>,
    },
}

impl ServerEvent {
    pub fn output(output: impl Into<String>, kind: OutputKind) -> Self {
        ServerEvent::Output {
            output: output.into(),
            kind,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            ServerEvent::Output { output, kind } => {
                Envelope::new("execution:output", json!({ "output": output, "type": kind }))
            }
            ServerEvent::Error { error } => {
                Envelope::new("execution:error", json!({ "error": error }))
            }
            ServerEvent::Complete { exit_code } => {
                Envelope::new("execution:complete", json!({ "exitCode": exit_code }))
            }
            ServerEvent::Validation { valid, errors } => {
                Envelope::new("validation:result", json!({ "valid": valid, "errors": errors }))
            }
            ServerEvent::Formatted { code } => {
                Envelope::new("format:result", json!({ "code": code }))
            }
            ServerEvent::LanguageInfo(info) => Envelope::new("craftlang:info", json!(info)),
            ServerEvent::TerminalOutput { data } => {
                Envelope::new("terminal:data", json!({ "data": data }))
            }
            ServerEvent::PythonReady { message } => {
                Envelope::new("python:ready", json!({ "message": message }))
            }
            ServerEvent::PythonStopped { message } => {
                Envelope::new("python:stopped", json!({ "message": message }))
            }
            ServerEvent::AgentsList { agents } => {
                Envelope::new("hardware:agentsList", json!({ "agents": agents }))
            }
            ServerEvent::AgentSelected {
                agent_id,
                success,
                error,
            } => {
                let mut data = json!({ "agentId": agent_id, "success": success });
                if let Some(error) = error {
                    data["error"] = Value::from(error);
                }
                Envelope::new("hardware:agentSelected", data)
            }
            ServerEvent::AgentConnected { id, name, platform } => Envelope::new(
                "hardware:agentConnected",
                json!({ "id": id, "name": name, "platform": platform }),
            ),
            ServerEvent::AgentDisconnected { id } => {
                Envelope::new("hardware:agentDisconnected", json!({ "id": id }))
            }
            ServerEvent::HardwareError { error } => {
                Envelope::new("hardware:error", json!({ "error": error }))
            }
            ServerEvent::HardwareRelay { event, payload } => {
                Envelope::new(event, Value::Object(payload))
            }
        }
    }
}
