//! codecraft-kernel: the backend of the codecraft web IDE.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes CraftLang source using logos
//! - **Parser**: Hand-written recursive descent with error recovery
//! - **AST**: Tree types and an S-expression rendering
//! - **Interpreter**: Tree-walking evaluation with lexical closures
//! - **Session**: Per-client orchestration of code runs, the Python REPL and the shell
//! - **Bridge**: Routing of hardware requests to remote agents
//! - **Config**: `server.toml` loading

pub mod ast;
pub mod bridge;
pub mod config;
pub mod craftlang;
pub mod interpreter;
pub mod lexer;
pub mod outbox;
pub mod parser;
pub mod session;

pub use bridge::{AgentConnection, BridgeError, HardwareBridge};
pub use config::KernelConfig;
pub use craftlang::{CraftError, RunOptions, RunOutcome};
pub use outbox::{outbox, AgentSink, EventSink, Inbox, Outbox};
pub use session::{ClientId, Session};
