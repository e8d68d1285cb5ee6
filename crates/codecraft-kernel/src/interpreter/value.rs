//! Runtime values.

use std::fmt;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Literal};

use super::scope::Env;

/// A CraftLang value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Function(Rc<Function>),
    Builtin(Builtin),
}

/// A user function: its declaration plus the frame it closed over.
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Env,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }
}

/// Functions provided by the host in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Clock,
    ToString,
    ToNumber,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Clock, Builtin::ToString, Builtin::ToNumber];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Clock => "clock",
            Builtin::ToString => "toString",
            Builtin::ToNumber => "toNumber",
        }
    }
}

impl Value {
    /// `null` is false, numbers are false only at zero, strings only when empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// Strict equality: no coercion between types, functions compare by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Builtin(_) => "function",
        }
    }

    /// Numeric conversion with the host's `Number()` rules; `None` when it yields NaN.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(*n),
            Value::Str(s) => parse_number(s),
            Value::Function(_) | Value::Builtin(_) => None,
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Number(n) => Value::Number(*n),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Builtin(b) => write!(f, "<native fn {}>", b.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Format a number the way a browser console would: integers without a
/// fractional part, exponent notation outside `[1e-6, 1e21)`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

/// Parse text with the host's `Number()` rules.
///
/// Surrounding whitespace is ignored, empty text is zero, `0x`/`0o`/`0b`
/// prefixes are honoured, and `Infinity` is the only spelled-out value.
pub fn parse_number(text: &str) -> Option<f64> {
    let s = text.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|(prefix, radix)| s.strip_prefix(prefix).map(|digits| (digits, *radix)));
    if let Some((digits, radix)) = radix {
        return u64::from_str_radix(digits, radix).ok().map(|v| v as f64);
    }

    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned == "Infinity" {
        return Some(if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if !unsigned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3.0, "3")]
    #[case(-0.0, "0")]
    #[case(0.5, "0.5")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(1e21, "1e+21")]
    #[case(1e-7, "1e-7")]
    #[case(123456789012.0, "123456789012")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    fn numbers_format_like_a_console(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[rstest]
    #[case("42", Some(42.0))]
    #[case("  3.5 ", Some(3.5))]
    #[case("", Some(0.0))]
    #[case("0x1F", Some(31.0))]
    #[case("-Infinity", Some(f64::NEG_INFINITY))]
    #[case("1e3", Some(1000.0))]
    #[case("abc", None)]
    #[case("inf", None)]
    #[case("12px", None)]
    fn number_parsing(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_number(text), expected);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("0".into()).is_truthy());
        assert!(Value::Builtin(Builtin::Clock).is_truthy());
    }

    #[test]
    fn equality_does_not_coerce() {
        assert!(!Value::Number(1.0).strict_equals(&Value::Str("1".into())));
        assert!(!Value::Null.strict_equals(&Value::Bool(false)));
        assert!(Value::Str("a".into()).strict_equals(&Value::Str("a".into())));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }
}
