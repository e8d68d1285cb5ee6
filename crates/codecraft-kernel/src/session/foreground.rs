//! The session's single foreground run.
//!
//! Each run gets a fresh id. Starting a run first makes it current, then
//! cancels and joins whatever ran before, so the old run's last events are
//! queued before the new run's first. Events from a run that is no longer
//! current are dropped, which keeps a superseded run's completion out of the
//! client's view.
//!
//! ```text
//!   start(run 2):  current = 2 ─▶ cancel(run 1) ─▶ join(run 1) ─▶ spawn(run 2)
//!   run 1 emits:   current != 1 ─▶ dropped
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codecraft_types::ServerEvent;

use crate::outbox::EventSink;

/// Identifier of one foreground run within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event sink for one run, silenced once the run is superseded.
#[derive(Debug, Clone)]
pub struct RunOutput {
    id: RunId,
    current: Arc<AtomicU64>,
    sink: EventSink,
}

impl RunOutput {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id.0
    }

    /// Forward an event if this run is still the session's current run.
    pub fn emit(&self, event: ServerEvent) -> bool {
        if !self.is_current() {
            tracing::trace!(run = %self.id, "dropping event from superseded run");
            return false;
        }
        self.sink.send(event)
    }
}

struct RunHandle {
    id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// At most one live foreground run.
pub struct Foreground {
    sink: EventSink,
    next_id: AtomicU64,
    current: Arc<AtomicU64>,
    slot: Mutex<Option<RunHandle>>,
}

impl Foreground {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            next_id: AtomicU64::new(1),
            current: Arc::new(AtomicU64::new(0)),
            slot: Mutex::new(None),
        }
    }

    /// Supersede the current run (if any) and start a new one.
    ///
    /// `run` receives its gated output and a token that fires on stop or
    /// supersession.
    pub async fn start<F, Fut>(&self, run: F) -> RunId
    where
        F: FnOnce(RunOutput, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        let id = RunId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.current.store(id.0, Ordering::SeqCst);

        if let Some(previous) = slot.take() {
            tracing::debug!(previous = %previous.id, next = %id, "superseding foreground run");
            previous.cancel.cancel();
            if let Err(e) = previous.task.await {
                tracing::warn!(run = %previous.id, error = %e, "foreground run panicked");
            }
        }

        let output = RunOutput {
            id,
            current: Arc::clone(&self.current),
            sink: self.sink.clone(),
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(output, cancel.clone()));
        *slot = Some(RunHandle { id, cancel, task });
        id
    }

    /// Ask the current run to stop. Its completion is still reported.
    /// Returns false when nothing is running.
    pub async fn stop(&self) -> bool {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(handle) if !handle.task.is_finished() => {
                tracing::debug!(run = %handle.id, "stopping foreground run");
                handle.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the current run to finish on its own.
    pub async fn wait(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.take() {
            let _ = handle.task.await;
        }
    }

    /// Cancel and join the current run without reporting anything further.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        self.current.store(0, Ordering::SeqCst);
        if let Some(handle) = slot.take() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::outbox;
    use codecraft_types::OutputKind;
    use std::time::Duration;

    #[tokio::test]
    async fn superseded_run_is_silenced() {
        let (sink, mut inbox) = outbox();
        let fg = Foreground::new(sink);

        fg.start(|out, cancel| async move {
            out.emit(ServerEvent::output("first", OutputKind::Output));
            cancel.cancelled().await;
            // Late completion of the superseded run.
            out.emit(ServerEvent::Complete { exit_code: 143 });
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        fg.start(|out, _cancel| async move {
            out.emit(ServerEvent::output("second", OutputKind::Output));
            out.emit(ServerEvent::Complete { exit_code: 0 });
        })
        .await;
        fg.wait().await;

        assert_eq!(
            inbox.drain(),
            vec![
                ServerEvent::output("first", OutputKind::Output),
                ServerEvent::output("second", OutputKind::Output),
                ServerEvent::Complete { exit_code: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn stop_still_reports_completion() {
        let (sink, mut inbox) = outbox();
        let fg = Foreground::new(sink);

        fg.start(|out, cancel| async move {
            cancel.cancelled().await;
            out.emit(ServerEvent::Complete { exit_code: 143 });
        })
        .await;

        assert!(fg.stop().await);
        fg.wait().await;
        assert_eq!(inbox.drain(), vec![ServerEvent::Complete { exit_code: 143 }]);
        assert!(!fg.stop().await);
    }

    #[tokio::test]
    async fn shutdown_silences_everything() {
        let (sink, mut inbox) = outbox();
        let fg = Foreground::new(sink);

        fg.start(|out, cancel| async move {
            cancel.cancelled().await;
            out.emit(ServerEvent::Complete { exit_code: 143 });
        })
        .await;
        fg.shutdown().await;

        assert!(inbox.drain().is_empty());
        assert!(!fg.stop().await);
    }
}
