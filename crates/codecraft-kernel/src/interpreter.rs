//! Interpreter module for CraftLang.
//!
//! # Architecture
//!
//! - **Value**: numbers, strings, booleans, `null`, functions
//! - **Environment**: frames linked to their enclosing frame, with constants
//! - **Flow**: statement completion, carrying `return` up to the call boundary
//! - **Interpreter**: the tree walk, with injected output and input
//!
//! # Example
//!
//! ```
//! use codecraft_kernel::interpreter::{BufferedOutput, Interpreter, ScriptedInput};
//! use codecraft_kernel::parser::parse;
//!
//! let program = parse("print(1 + 2 * 3);").unwrap();
//! let mut out = BufferedOutput::new();
//! let mut input = ScriptedInput::default();
//! Interpreter::new(&mut out, &mut input).interpret(&program).unwrap();
//! assert_eq!(out.as_str(), "7\n");
//! ```

mod builtins;
mod control_flow;
mod eval;
mod io;
mod scope;
mod value;

pub use control_flow::Flow;
pub use eval::{EvalResult, Interpreter, RuntimeError, DEFAULT_MAX_CALL_DEPTH};
pub use io::{BufferedOutput, InputSource, OutputSink, ScriptedInput};
pub use scope::{assign, lookup, Env, Environment, ScopeError};
pub use value::{format_number, parse_number, Builtin, Function, Value};
