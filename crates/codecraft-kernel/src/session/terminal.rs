//! Per-session interactive shell.
//!
//! The shell runs with piped stdio rather than a pseudo-terminal, so programs
//! that insist on a tty see none. Both output streams are forwarded as
//! `terminal:data` in arrival order.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use codecraft_types::ServerEvent;

use crate::outbox::EventSink;

use super::process::{terminate, Utf8Chunks, TERMINATE_GRACE};

pub struct Terminal {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    pumps: Vec<JoinHandle<()>>,
}

impl Terminal {
    /// Start `shell -i` in `cwd`.
    pub fn spawn(shell: &str, cwd: &Path, sink: EventSink) -> std::io::Result<Self> {
        std::fs::create_dir_all(cwd)?;
        let mut child = Command::new(shell)
            .arg("-i")
            .current_dir(cwd)
            .env("TERM", "dumb")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        tracing::debug!(shell, pid = ?child.id(), "terminal started");

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, sink));
        }

        Ok(Self {
            stdin: Mutex::new(child.stdin.take()),
            child: Mutex::new(child),
            pumps,
        })
    }

    /// Write raw keystrokes to the shell.
    pub async fn write(&self, data: &str) -> std::io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        match stdin.as_mut() {
            Some(pipe) => {
                pipe.write_all(data.as_bytes()).await?;
                pipe.flush().await
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "terminal closed",
            )),
        }
    }

    /// Close stdin and terminate the shell.
    pub async fn kill(&self) {
        self.stdin.lock().await.take();
        let mut child = self.child.lock().await;
        terminate(&mut child, TERMINATE_GRACE).await;
        for pump in &self.pumps {
            pump.abort();
        }
        tracing::debug!("terminal closed");
    }
}

fn pump<R>(mut pipe: R, sink: EventSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let mut decoder = Utf8Chunks::default();
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let data = decoder.push(&buf[..n]);
                    if !data.is_empty() && !sink.send(ServerEvent::TerminalOutput { data }) {
                        break;
                    }
                }
            }
        }
    })
}
