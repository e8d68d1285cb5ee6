//! One-shot runs: embedded CraftLang and native compile/interpret.
//!
//! Native runs write the code to a scratch file in the workspace, optionally
//! compile it, then spawn the result and stream its stdout and stderr as they
//! arrive. Scratch files are removed when the run ends, however it ends.
//!
//! ```text
//!   code ──▶ temp_<client>_XXXX.<ext> ──▶ [cc -o …_exec] ──▶ spawn ──▶ stream ──▶ complete
//!                     └──────────── removed on drop ───────────────┘
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codecraft_types::{OutputKind, ServerEvent};

use crate::craftlang::{self, RunOptions};

use super::foreground::RunOutput;
use super::language::{Language, Strategy};
use super::process::{exit_code, terminate, Utf8Chunks, TERMINATE_GRACE};

const READ_CHUNK: usize = 8192;

/// Failures that keep a native program from starting.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to write source file: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a one-shot run needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub language: Language,
    pub strategy: Strategy,
    pub code: String,
    pub input: Option<String>,
    /// Prefix for scratch file names, e.g. the client id.
    pub tag: String,
    pub workspace: PathBuf,
    pub max_call_depth: usize,
}

/// Execute a request to completion, reporting through `out`.
pub async fn run(request: RunRequest, out: RunOutput, cancel: CancellationToken) {
    match request.strategy.clone() {
        Strategy::Embedded => run_embedded(request, out, cancel).await,
        Strategy::Interpreted { program } => {
            if let Err(e) = run_interpreted(&request, &program, &out, &cancel).await {
                report_setup_failure(&out, e);
            }
        }
        Strategy::Compiled { compiler } => {
            if let Err(e) = run_compiled(&request, &compiler, &out, &cancel).await {
                report_setup_failure(&out, e);
            }
        }
    }
}

fn report_setup_failure(out: &RunOutput, e: ProcessError) {
    tracing::warn!(run = %out.id(), error = %e, "run setup failed");
    out.emit(ServerEvent::Error {
        error: e.to_string(),
    });
}

// ═══════════════════════════════════════════════════════════════════════════
// Embedded
// ═══════════════════════════════════════════════════════════════════════════

async fn run_embedded(request: RunRequest, out: RunOutput, cancel: CancellationToken) {
    let interrupt = Arc::new(AtomicBool::new(false));
    let options = RunOptions {
        input: request.input,
        max_call_depth: request.max_call_depth,
        interrupt: Some(Arc::clone(&interrupt)),
        debug: false,
    };
    let source = request.code;
    let mut worker = tokio::task::spawn_blocking(move || craftlang::run(&source, &options));

    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = cancel.cancelled() => {
            interrupt.store(true, Ordering::Relaxed);
            worker.await
        }
    };

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            out.emit(ServerEvent::Error {
                error: format!("CraftLang worker failed: {}", e),
            });
            return;
        }
    };

    match outcome.error {
        None => {
            out.emit(ServerEvent::output(outcome.output, OutputKind::Output));
            out.emit(ServerEvent::Complete { exit_code: 0 });
        }
        Some(error) => {
            if !outcome.output.is_empty() {
                out.emit(ServerEvent::output(outcome.output, OutputKind::Output));
            }
            out.emit(ServerEvent::output(format!("Error: {}\n", error), OutputKind::Error));
            out.emit(ServerEvent::Complete { exit_code: 1 });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Native
// ═══════════════════════════════════════════════════════════════════════════

/// A compiled binary's path, removed on drop.
struct ScratchBinary(PathBuf);

impl Drop for ScratchBinary {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %self.0.display(), error = %e, "failed to remove binary");
            }
        }
    }
}

/// Write the code to a fresh scratch file. The filesystem work runs on the
/// blocking pool.
async fn write_source(request: &RunRequest) -> Result<tempfile::TempPath, ProcessError> {
    let workspace = request.workspace.clone();
    let prefix = format!("temp_{}_", request.tag);
    let suffix = request.language.extension();
    let code = request.code.clone();
    tokio::task::spawn_blocking(move || create_scratch(&workspace, &prefix, suffix, &code))
        .await
        .map_err(|e| ProcessError::Scratch(std::io::Error::other(e)))?
}

fn create_scratch(
    workspace: &Path,
    prefix: &str,
    suffix: &str,
    code: &str,
) -> Result<tempfile::TempPath, ProcessError> {
    std::fs::create_dir_all(workspace).map_err(ProcessError::Scratch)?;
    // Absolute, since the child runs with the workspace as its cwd.
    let dir = std::fs::canonicalize(workspace).map_err(ProcessError::Scratch)?;
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(ProcessError::Scratch)?;
    file.write_all(code.as_bytes())
        .and_then(|_| file.flush())
        .map_err(ProcessError::Scratch)?;
    Ok(file.into_temp_path())
}

fn binary_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "temp".to_string());
    source.with_file_name(format!("{}_exec", stem))
}

#[tracing::instrument(level = "debug", skip(request, out, cancel), fields(run = %out.id()))]
async fn run_interpreted(
    request: &RunRequest,
    program: &str,
    out: &RunOutput,
    cancel: &CancellationToken,
) -> Result<(), ProcessError> {
    let source = write_source(request).await?;
    let mut cmd = Command::new(program);
    cmd.arg(&*source);
    stream_process(cmd, program, request, out, cancel).await
}

#[tracing::instrument(level = "debug", skip(request, out, cancel), fields(run = %out.id()))]
async fn run_compiled(
    request: &RunRequest,
    compiler: &str,
    out: &RunOutput,
    cancel: &CancellationToken,
) -> Result<(), ProcessError> {
    let source = write_source(request).await?;
    let binary = ScratchBinary(binary_path(&source));

    let mut compile = Command::new(compiler);
    compile
        .arg("-o")
        .arg(&binary.0)
        .arg(&*source)
        .current_dir(&request.workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::select! {
        result = compile.output() => result.map_err(|source| ProcessError::Spawn {
            program: compiler.to_string(),
            source,
        })?,
        _ = cancel.cancelled() => {
            tracing::debug!("cancelled during compilation");
            out.emit(ServerEvent::Complete { exit_code: 128 + 15 });
            return Ok(());
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let error = if stderr.trim().is_empty() {
            "Compilation failed".to_string()
        } else {
            stderr
        };
        out.emit(ServerEvent::Error { error });
        out.emit(ServerEvent::Complete {
            exit_code: exit_code(output.status),
        });
        return Ok(());
    }

    let program = binary.0.display().to_string();
    let cmd = Command::new(&binary.0);
    stream_process(cmd, &program, request, out, cancel).await
}

/// Spawn `cmd`, stream its output, and report its exit code.
async fn stream_process(
    mut cmd: Command,
    program: &str,
    request: &RunRequest,
    out: &RunOutput,
    cancel: &CancellationToken,
) -> Result<(), ProcessError> {
    cmd.current_dir(&request.workspace)
        .stdin(if request.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;
    tracing::debug!(program, pid = ?child.id(), "spawned");

    if let (Some(text), Some(mut stdin)) = (request.input.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                tracing::debug!(error = %e, "stdin closed early");
            }
            // Dropping stdin signals EOF.
        });
    }

    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| spawn_drain(pipe, OutputKind::Output, out.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| spawn_drain(pipe, OutputKind::Error, out.clone()));

    let status = tokio::select! {
        status = child.wait() => status.map_err(|source| ProcessError::Wait {
            program: program.to_string(),
            source,
        })?,
        _ = cancel.cancelled() => {
            match terminate(&mut child, TERMINATE_GRACE).await {
                Some(status) => status,
                None => {
                    out.emit(ServerEvent::Complete { exit_code: 128 + 9 });
                    return Ok(());
                }
            }
        }
    };

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        // Drain tasks end at EOF; a panic there only loses output.
        let _ = task.await;
    }

    let code = exit_code(status);
    tracing::debug!(program, code, "exited");
    out.emit(ServerEvent::Complete { exit_code: code });
    Ok(())
}

fn spawn_drain<R>(mut pipe: R, kind: OutputKind, out: RunOutput) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut decoder = Utf8Chunks::default();
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = decoder.push(&buf[..n]);
                    if !text.is_empty() {
                        out.emit(ServerEvent::output(text, kind));
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "output pipe read failed");
                    break;
                }
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            out.emit(ServerEvent::output(rest, kind));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_sits_next_to_source() {
        let path = binary_path(Path::new("/work/temp_7_abc.cpp"));
        assert_eq!(path, PathBuf::from("/work/temp_7_abc_exec"));
    }

    #[tokio::test]
    async fn scratch_source_is_absolute_and_removed_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = RunRequest {
            language: Language::Python,
            strategy: Strategy::Interpreted {
                program: "python3".to_string(),
            },
            code: "print(1)\n".to_string(),
            input: None,
            tag: "9".to_string(),
            workspace: dir.path().join("nested"),
            max_call_depth: 64,
        };

        let source = write_source(&request).await.expect("scratch file");
        assert!(source.is_absolute());
        let name = source.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with("temp_9_") && name.ends_with(".py"), "{}", name);
        assert_eq!(std::fs::read_to_string(&*source).expect("read"), "print(1)\n");

        let path = source.to_path_buf();
        drop(source);
        assert!(!path.exists());
    }
}
