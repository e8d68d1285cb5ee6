//! Statement completion.

use super::value::Value;

/// How a statement finished.
///
/// `Return` travels up through blocks and loops and is turned back into a
/// plain value at the function-call boundary.
#[derive(Debug, Clone)]
pub enum Flow {
    /// Normal completion with the statement's value.
    Normal(Value),
    /// A `return` is unwinding to the nearest call.
    Return(Value),
}
