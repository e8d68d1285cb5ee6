//! Wire types for codecraft: event envelopes and the messages that ride in them.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. Both the
//! browser-facing channel and the hardware-agent channel speak the same framing:
//! one JSON object per text frame, `{"event": "<name>", "data": {...}}`.
//!
//! ```text
//!   browser ──▶ ClientEvent ──▶ kernel ──▶ ServerEvent ──▶ browser
//!   agent   ──▶ AgentMessage ─▶ kernel ──▶ AgentEvent  ──▶ agent
//! ```

pub mod agent;
pub mod client;
pub mod envelope;
pub mod server;

// Flat re-exports for convenience
pub use agent::*;
pub use client::*;
pub use envelope::*;
pub use server::*;
