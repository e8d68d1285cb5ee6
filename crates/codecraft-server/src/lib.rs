//! WebSocket front end for the codecraft backend.
//!
//! One TCP listener serves two kinds of peers, told apart by the upgrade
//! request's path: browsers on any path, hardware agents on `/agent`. Each
//! connection gets a reader loop (this task) and a writer task draining its
//! outbox onto the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use codecraft_kernel::{
    outbox, AgentConnection, ClientId, HardwareBridge, Inbox, KernelConfig, Session,
};
use codecraft_types::{
    AgentEvent, AgentMessage, ClientEvent, Envelope, ProtocolError, ServerEvent,
};

/// Upgrade path reserved for hardware agents.
pub const AGENT_PATH: &str = "/agent";

/// How long a closing connection's writer gets to flush.
const WRITER_GRACE: Duration = Duration::from_secs(1);

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

pub struct Server {
    config: Arc<KernelConfig>,
    bridge: Arc<HardwareBridge>,
    next_client: AtomicU64,
}

impl Server {
    pub fn new(config: KernelConfig) -> Self {
        let bridge = Arc::new(HardwareBridge::from_config(&config));
        Self {
            config: Arc::new(config),
            bridge,
            next_client: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.listen)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen))?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await.context("accept failed")?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_connection(stream, peer).await;
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut path = String::from("/");
        let handshake = accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                path = req.uri().path().to_string();
                Ok(resp)
            },
        )
        .await;

        let ws = match handshake {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "websocket handshake failed");
                return;
            }
        };

        if path == AGENT_PATH {
            self.agent_loop(ws, peer).await;
        } else {
            self.client_loop(ws, peer).await;
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Browser clients
    // ═══════════════════════════════════════════════════════════════════

    async fn client_loop(&self, ws: WebSocketStream<TcpStream>, peer: SocketAddr) {
        let (writer, mut reader) = ws.split();
        let (sink, inbox) = outbox::<ServerEvent>();
        let writer_task = spawn_writer(writer, inbox, |event| (event.into_envelope(), false));

        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        tracing::info!(client = %id, %peer, "client connected");
        let session = Session::open(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.bridge),
            sink.clone(),
        )
        .await;

        while let Some(frame) = reader.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(client = %id, error = %e, "read failed");
                    break;
                }
            };
            match decode_client(&text) {
                Ok(event) => session.handle(event).await,
                Err(ProtocolError::UnknownEvent(event)) => {
                    tracing::debug!(client = %id, event, "unknown event ignored");
                }
                Err(e) => {
                    tracing::warn!(client = %id, error = %e, "bad client frame");
                    sink.send(ServerEvent::Error {
                        error: e.to_string(),
                    });
                }
            }
        }

        session.close().await;
        drop(session);
        drop(sink);
        finish_writer(writer_task).await;
        tracing::info!(client = %id, "client disconnected");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Hardware agents
    // ═══════════════════════════════════════════════════════════════════

    async fn agent_loop(&self, ws: WebSocketStream<TcpStream>, peer: SocketAddr) {
        let (writer, mut reader) = ws.split();
        let (sink, inbox) = outbox::<AgentEvent>();
        // A failed registration is the last thing the agent hears.
        let writer_task = spawn_writer(writer, inbox, |event| {
            let last = matches!(event, AgentEvent::RegistrationFailed { .. });
            (event.into_envelope(), last)
        });
        tracing::debug!(%peer, "agent connected");

        let mut connection: Option<AgentConnection> = None;
        while let Some(frame) = reader.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "agent read failed");
                    break;
                }
            };
            let message = match decode_agent(&text) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "bad agent frame");
                    continue;
                }
            };

            match message {
                AgentMessage::Register(registration) => {
                    match self.bridge.register_agent(&registration, sink.clone()).await {
                        Ok(registered) => connection = Some(registered),
                        Err(_) => break,
                    }
                }
                AgentMessage::Heartbeat => match &connection {
                    Some(c) => self.bridge.heartbeat(&c.agent_id).await,
                    None => tracing::debug!(%peer, "heartbeat before registration"),
                },
                AgentMessage::Response(response) => match &connection {
                    Some(c) => {
                        self.bridge.relay(&c.agent_id, response).await;
                    }
                    None => tracing::debug!(%peer, "response before registration"),
                },
            }
        }

        if let Some(c) = &connection {
            self.bridge.agent_disconnected(c).await;
        }
        // The registry keeps a sender for offline agents, so the writer
        // never sees its inbox close.
        drop(sink);
        finish_writer(writer_task).await;
    }
}

fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    ClientEvent::from_envelope(&Envelope::from_text(text)?)
}

fn decode_agent(text: &str) -> Result<AgentMessage, ProtocolError> {
    AgentMessage::from_envelope(&Envelope::from_text(text)?)
}

/// Drain `inbox` onto the socket. `encode` returns the frame and whether it
/// should be the last one.
fn spawn_writer<T, F>(mut writer: WsWriter, mut inbox: Inbox<T>, encode: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> (Envelope, bool) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let (envelope, last) = encode(event);
            let text = match envelope.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(event = %envelope.event, error = %e, "unencodable event");
                    continue;
                }
            };
            if writer.send(Message::Text(text)).await.is_err() || last {
                break;
            }
        }
        let _ = writer.close().await;
    })
}

async fn finish_writer(mut task: JoinHandle<()>) {
    if tokio::time::timeout(WRITER_GRACE, &mut task).await.is_err() {
        task.abort();
    }
}
