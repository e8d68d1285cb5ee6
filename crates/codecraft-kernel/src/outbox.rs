//! Outbound event channels.
//!
//! Every connection (browser or agent) gets one `Outbox` handle, a cloneable,
//! Send+Sync wrapper around an unbounded mpsc sender. Runs, the REPL worker
//! and the bridge all write into it; the connection's writer task drains it
//! onto the socket in order.
//!
//! ```text
//!   foreground run ──┐
//!   repl worker ─────┼──▶ Outbox (mpsc) ──▶ writer task ──▶ WebSocket
//!   bridge relay ────┘
//! ```

use tokio::sync::mpsc;

use codecraft_types::{AgentEvent, ServerEvent};

/// Cloneable sending half.
#[derive(Debug)]
pub struct Outbox<T> {
    sender: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Receiving half, owned by the connection's writer.
#[derive(Debug)]
pub struct Inbox<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

/// Events bound for a browser client.
pub type EventSink = Outbox<ServerEvent>;

/// Events bound for a hardware agent.
pub type AgentSink = Outbox<AgentEvent>;

/// Create a new outbox pair.
pub fn outbox<T>() -> (Outbox<T>, Inbox<T>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Outbox { sender }, Inbox { receiver })
}

impl<T> Outbox<T> {
    /// Queue an event. Returns false if the connection is gone, in which case
    /// the event is discarded (same as writing to a closed pipe).
    pub fn send(&self, event: T) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl<T> Inbox<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecraft_types::OutputKind;

    #[tokio::test]
    async fn clones_share_one_queue_in_order() {
        let (sink, mut inbox) = outbox::<ServerEvent>();
        let other = sink.clone();
        assert!(sink.send(ServerEvent::output("a", OutputKind::Output)));
        assert!(other.send(ServerEvent::Complete { exit_code: 0 }));

        let events = inbox.drain();
        assert_eq!(
            events,
            vec![
                ServerEvent::output("a", OutputKind::Output),
                ServerEvent::Complete { exit_code: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_discarded() {
        let (sink, inbox) = outbox::<ServerEvent>();
        drop(inbox);
        assert!(!sink.send(ServerEvent::Complete { exit_code: 0 }));
    }
}
