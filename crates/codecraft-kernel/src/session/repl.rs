//! Persistent Python session.
//!
//! One `python3` child per client, started lazily and kept alive between
//! requests so definitions survive. The child runs a small driver that
//! announces itself with a `READY` line, then answers each JSON request line
//! with exactly one JSON reply line.
//!
//! Requests are serialized through a single worker task: a new request is
//! not written until the previous reply has been read. `Stop` and `Reset`
//! are the exception; they kill a running cell instead of queueing behind it.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use codecraft_types::{OutputKind, ServerEvent};

use crate::outbox::EventSink;

use super::process::{terminate, TERMINATE_GRACE};

/// Readiness line printed once by the driver.
pub const READY: &str = "READY";

/// Line that asks the driver to exit.
pub const EXIT: &str = "__EXIT__";

/// The driver program, run with `python3 -u -c`.
pub const DRIVER_SOURCE: &str = include_str!("../../python/repl_driver.py");

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session did not become ready within {0:?}")]
    NotReady(Duration),

    #[error("session exited")]
    Exited,

    #[error("session I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Protocol(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct ReplRequest<'a> {
    code: &'a str,
}

/// The driver's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplReply {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub ok: bool,
}

struct ReplProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<()>,
}

/// A lazily started Python child.
pub struct PythonRepl {
    program: String,
    cwd: PathBuf,
    ready_timeout: Duration,
    sink: EventSink,
    process: Option<ReplProcess>,
}

impl PythonRepl {
    pub fn new(
        program: impl Into<String>,
        cwd: impl Into<PathBuf>,
        ready_timeout: Duration,
        sink: EventSink,
    ) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            ready_timeout,
            sink,
            process: None,
        }
    }

    /// Whether a child is running. Reaps it if it has exited.
    pub fn is_alive(&mut self) -> bool {
        let exited = match self.process.as_mut() {
            None => return false,
            Some(proc) => !matches!(proc.child.try_wait(), Ok(None)),
        };
        if exited {
            tracing::debug!("python session exited");
            if let Some(proc) = self.process.take() {
                proc.stderr_task.abort();
            }
        }
        !exited
    }

    /// Start the child unless one is already running.
    pub async fn ensure(&mut self) -> Result<(), SessionError> {
        if self.is_alive() {
            return Ok(());
        }
        self.process = Some(self.spawn().await?);
        Ok(())
    }

    async fn spawn(&self) -> Result<ReplProcess, SessionError> {
        std::fs::create_dir_all(&self.cwd)?;
        let mut child = Command::new(&self.program)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER_SOURCE)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        tracing::debug!(pid = ?child.id(), "python session spawned");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SessionError::Exited);
        };

        let sink = self.sink.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.send(ServerEvent::output(format!("{}\n", line), OutputKind::Error));
            }
        });

        let mut stdout = BufReader::new(stdout).lines();
        let ready = tokio::time::timeout(self.ready_timeout, async {
            while let Some(line) = stdout.next_line().await? {
                if line.trim() == READY {
                    return Ok::<(), SessionError>(());
                }
            }
            Err(SessionError::Exited)
        })
        .await;

        let mut process = ReplProcess {
            child,
            stdin,
            stdout,
            stderr_task,
        };
        match ready {
            Ok(Ok(())) => Ok(process),
            Ok(Err(e)) => {
                shut_down(&mut process).await;
                Err(e)
            }
            Err(_) => {
                shut_down(&mut process).await;
                Err(SessionError::NotReady(self.ready_timeout))
            }
        }
    }

    /// Run one cell and wait for its reply.
    ///
    /// Lines that are not a reply are forwarded as plain output.
    #[tracing::instrument(level = "debug", skip_all, fields(len = code.len()))]
    pub async fn exec(&mut self, code: &str) -> Result<ReplReply, SessionError> {
        self.ensure().await?;
        let Some(proc) = self.process.as_mut() else {
            return Err(SessionError::Exited);
        };

        let mut line = serde_json::to_string(&ReplRequest { code })?;
        line.push('\n');
        proc.stdin.write_all(line.as_bytes()).await?;
        proc.stdin.flush().await?;

        while let Some(line) = proc.stdout.next_line().await? {
            match serde_json::from_str::<ReplReply>(&line) {
                Ok(reply) => return Ok(reply),
                Err(_) => {
                    self.sink
                        .send(ServerEvent::output(format!("{}\n", line), OutputKind::Output));
                }
            }
        }

        // Reaps the child so the next request starts a fresh one.
        self.is_alive();
        Err(SessionError::Exited)
    }

    /// Ask the child to exit, then make sure it does.
    pub async fn stop(&mut self) {
        if let Some(mut proc) = self.process.take() {
            shut_down(&mut proc).await;
        }
    }

    /// Replace the child with a fresh one.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.stop().await;
        self.ensure().await
    }
}

async fn shut_down(proc: &mut ReplProcess) {
    let exit = format!("{}\n", EXIT);
    if let Err(e) = proc.stdin.write_all(exit.as_bytes()).await {
        tracing::trace!(error = %e, "python session stdin already closed");
    }
    let _ = proc.stdin.flush().await;
    terminate(&mut proc.child, TERMINATE_GRACE).await;
    proc.stderr_task.abort();
}

// ═══════════════════════════════════════════════════════════════════════════
// Worker
// ═══════════════════════════════════════════════════════════════════════════

/// Work queued for a session's Python child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Start,
    Exec(String),
    Reset,
    Stop,
}

/// Sender half of a session's REPL queue.
#[derive(Debug, Clone)]
pub struct ReplHandle {
    tx: mpsc::UnboundedSender<ReplCommand>,
}

impl ReplHandle {
    /// Queue a command. Returns false once the worker has gone.
    pub fn send(&self, command: ReplCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Start the worker that owns `repl`. It stops the child when every handle
/// has been dropped.
pub fn spawn_worker(repl: PythonRepl) -> (ReplHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(worker(repl, rx));
    (ReplHandle { tx }, task)
}

async fn worker(mut repl: PythonRepl, mut rx: mpsc::UnboundedReceiver<ReplCommand>) {
    let mut backlog = VecDeque::new();
    loop {
        let command = match backlog.pop_front() {
            Some(command) => command,
            None => match rx.recv().await {
                Some(command) => command,
                None => break,
            },
        };
        let code = match command {
            ReplCommand::Exec(code) => code,
            other => {
                control(&mut repl, other).await;
                continue;
            }
        };

        let sink = repl.sink.clone();
        match exec_interruptible(&mut repl, &code, &mut rx, &mut backlog).await {
            Ok(result) => report_exec(&sink, result),
            Err(interrupt) => {
                tracing::debug!(command = ?interrupt, "python cell interrupted");
                sink.send(ServerEvent::output("Execution interrupted\n", OutputKind::Error));
                sink.send(ServerEvent::Complete { exit_code: 1 });
                control(&mut repl, interrupt).await;
            }
        }
    }
    repl.stop().await;
}

/// Run one cell while still listening for commands. `Stop` and `Reset` cut
/// the cell short and are returned as the error; other commands wait in
/// `backlog` until the cell finishes.
async fn exec_interruptible(
    repl: &mut PythonRepl,
    code: &str,
    rx: &mut mpsc::UnboundedReceiver<ReplCommand>,
    backlog: &mut VecDeque<ReplCommand>,
) -> Result<Result<ReplReply, SessionError>, ReplCommand> {
    let exec = repl.exec(code);
    tokio::pin!(exec);
    loop {
        tokio::select! {
            result = &mut exec => return Ok(result),
            Some(command) = rx.recv() => match command {
                ReplCommand::Stop | ReplCommand::Reset => return Err(command),
                other => backlog.push_back(other),
            },
        }
    }
}

fn report_exec(sink: &EventSink, result: Result<ReplReply, SessionError>) {
    match result {
        Ok(reply) => {
            if !reply.stdout.is_empty() {
                sink.send(ServerEvent::output(reply.stdout, OutputKind::Output));
            }
            if !reply.stderr.is_empty() {
                let kind = if reply.ok {
                    OutputKind::Warn
                } else {
                    OutputKind::Error
                };
                sink.send(ServerEvent::output(reply.stderr, kind));
            }
            sink.send(ServerEvent::Complete {
                exit_code: if reply.ok { 0 } else { 1 },
            });
        }
        Err(e) => {
            sink.send(ServerEvent::Error {
                error: format!("Python exec error: {}", e),
            });
        }
    }
}

/// Start, reset or stop the child.
async fn control(repl: &mut PythonRepl, command: ReplCommand) {
    let sink = repl.sink.clone();
    match command {
        ReplCommand::Start => match repl.ensure().await {
            Ok(()) => {
                sink.send(ServerEvent::PythonReady {
                    message: "Python session ready".to_string(),
                });
            }
            Err(e) => {
                sink.send(ServerEvent::Error {
                    error: format!("Python start error: {}", e),
                });
            }
        },
        ReplCommand::Reset => match repl.reset().await {
            Ok(()) => {
                sink.send(ServerEvent::PythonReady {
                    message: "Python session reset".to_string(),
                });
            }
            Err(e) => {
                sink.send(ServerEvent::Error {
                    error: format!("Python reset error: {}", e),
                });
            }
        },
        ReplCommand::Stop => {
            repl.stop().await;
            sink.send(ServerEvent::PythonStopped {
                message: "Python session stopped".to_string(),
            });
        }
        ReplCommand::Exec(code) => report_exec(&sink, repl.exec(&code).await),
    }
}
