//! Abstract syntax tree for CraftLang.
//!
//! The parser produces a [`Program`]; the interpreter walks it. Nodes are
//! read-only once built. [`sexpr`] renders a tree in a compact S-expression
//! form for tests and the debug dump.

mod types;
pub mod sexpr;

pub use types::*;
