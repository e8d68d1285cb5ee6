//! Per-client execution orchestrator.
//!
//! A [`Session`] owns everything one browser connection can start: the
//! foreground code run, the persistent Python child, the interactive shell
//! and the selected hardware agent. All of it is torn down on [`Session::close`].
//!
//! ```text
//!   ClientEvent ──▶ Session::handle
//!                     ├─ code:*       ──▶ Foreground ──▶ native::run (embedded / interpreted / compiled)
//!                     ├─ python:*     ──▶ REPL worker (serialized)
//!                     ├─ terminal:*   ──▶ Terminal
//!                     └─ hardware:*   ──▶ HardwareBridge
//! ```

mod foreground;
pub mod language;
mod native;
mod process;
mod repl;
mod terminal;

pub use foreground::{Foreground, RunId, RunOutput};
pub use language::{Language, Strategy, UnsupportedLanguage};
pub use native::{ProcessError, RunRequest};
pub use process::{exit_code, terminate, TERMINATE_GRACE};
pub use repl::{spawn_worker, PythonRepl, ReplCommand, ReplHandle, ReplReply, SessionError};
pub use terminal::Terminal;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use codecraft_types::{ClientEvent, ExecuteRequest, ServerEvent};

use crate::bridge::HardwareBridge;
use crate::config::KernelConfig;
use crate::craftlang;
use crate::outbox::EventSink;

/// Identifier of a browser connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Session {
    id: ClientId,
    config: Arc<KernelConfig>,
    sink: EventSink,
    bridge: Arc<HardwareBridge>,
    foreground: Foreground,
    repl: ReplHandle,
    repl_task: Mutex<Option<JoinHandle<()>>>,
    terminal: Option<Terminal>,
    selected_agent: Mutex<Option<String>>,
}

impl Session {
    /// Register with the bridge and start the session's shell.
    ///
    /// A shell that fails to start is logged; the rest of the session works
    /// without it.
    pub async fn open(
        id: ClientId,
        config: Arc<KernelConfig>,
        bridge: Arc<HardwareBridge>,
        sink: EventSink,
    ) -> Self {
        bridge.connect_client(id, sink.clone()).await;

        let terminal = match Terminal::spawn(&config.shell, &config.workspace_dir, sink.clone()) {
            Ok(terminal) => Some(terminal),
            Err(e) => {
                tracing::warn!(client = %id, shell = %config.shell, error = %e, "terminal unavailable");
                None
            }
        };

        let repl = PythonRepl::new(
            config.python.clone(),
            config.workspace_dir.clone(),
            config.repl_ready_timeout(),
            sink.clone(),
        );
        let (repl, repl_task) = spawn_worker(repl);

        tracing::info!(client = %id, "session opened");
        Self {
            id,
            foreground: Foreground::new(sink.clone()),
            config,
            sink,
            bridge,
            repl,
            repl_task: Mutex::new(Some(repl_task)),
            terminal,
            selected_agent: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Act on one client event. Failures are reported to the client as events.
    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::Execute(request) => self.execute(request).await,
            ClientEvent::Stop => {
                if !self.foreground.stop().await {
                    tracing::debug!(client = %self.id, "stop with nothing running");
                }
            }
            ClientEvent::Validate(source) => {
                let errors = craftlang::validate_syntax(&source.code);
                self.send(ServerEvent::Validation {
                    valid: errors.is_empty(),
                    errors,
                });
            }
            ClientEvent::Format(source) => self.send(ServerEvent::Formatted {
                code: craftlang::format_source(&source.code),
            }),
            ClientEvent::LanguageInfo => {
                self.send(ServerEvent::LanguageInfo(craftlang::language_info()))
            }
            ClientEvent::TerminalInput(input) => match &self.terminal {
                Some(terminal) => {
                    if let Err(e) = terminal.write(&input.data).await {
                        tracing::debug!(client = %self.id, error = %e, "terminal write failed");
                    }
                }
                None => tracing::debug!(client = %self.id, "terminal input with no terminal"),
            },
            ClientEvent::PythonStart => self.queue_python(ReplCommand::Start),
            ClientEvent::PythonExec(request) => self.queue_python(ReplCommand::Exec(request.code)),
            ClientEvent::PythonReset => self.queue_python(ReplCommand::Reset),
            ClientEvent::PythonStop => self.queue_python(ReplCommand::Stop),
            ClientEvent::ListAgents => {
                let agents = self.bridge.list_agents().await;
                self.send(ServerEvent::AgentsList { agents });
            }
            ClientEvent::SelectAgent(request) => {
                let result = self.bridge.select_agent(&request.agent_id).await;
                if result.is_ok() {
                    *self.selected_agent.lock().await = Some(request.agent_id.clone());
                }
                self.send(ServerEvent::AgentSelected {
                    agent_id: request.agent_id,
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                });
            }
            ClientEvent::Hardware(request) => {
                let selected = self.selected_agent.lock().await.clone();
                if let Err(e) = self
                    .bridge
                    .forward(self.id, selected.as_deref(), &request)
                    .await
                {
                    self.send(ServerEvent::HardwareError {
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, request), fields(client = %self.id, language = %request.language))]
    async fn execute(&self, request: ExecuteRequest) {
        let language = match request.language.parse::<Language>() {
            Ok(language) => language,
            Err(e) => {
                self.send(ServerEvent::Error {
                    error: e.to_string(),
                });
                return;
            }
        };

        let run = RunRequest {
            language,
            strategy: language.strategy(&self.config),
            code: request.code,
            input: request.input,
            tag: self.id.to_string(),
            workspace: self.config.workspace_dir.clone(),
            max_call_depth: self.config.max_call_depth,
        };
        let id = self
            .foreground
            .start(move |out, cancel| native::run(run, out, cancel))
            .await;
        tracing::debug!(client = %self.id, run = %id, "run started");
    }

    fn queue_python(&self, command: ReplCommand) {
        if !self.repl.send(command) {
            self.send(ServerEvent::Error {
                error: "Python session not available".to_string(),
            });
        }
    }

    fn send(&self, event: ServerEvent) {
        if !self.sink.send(event) {
            tracing::trace!(client = %self.id, "client gone, event dropped");
        }
    }

    /// Wait until the current foreground run finishes.
    pub async fn wait_for_run(&self) {
        self.foreground.wait().await;
    }

    /// Stop everything the session started and leave the bridge.
    pub async fn close(&self) {
        self.foreground.shutdown().await;
        // Dropping the worker's PythonRepl kills its child.
        if let Some(task) = self.repl_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(terminal) = &self.terminal {
            terminal.kill().await;
        }
        self.bridge.disconnect_client(self.id).await;
        tracing::info!(client = %self.id, "session closed");
    }
}
