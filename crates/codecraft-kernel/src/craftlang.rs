//! CraftLang front door: run, validate, format, describe.
//!
//! ```text
//!   source ──▶ lexer::tokenize ──▶ parser::parse_tokens ──▶ Interpreter
//!                                        │                       │
//!                                        ▼                       ▼
//!                                   ParseError[]            RuntimeError
//! ```

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use codecraft_types::{Diagnostic, LanguageInfo};

use crate::ast::sexpr::format_program;
use crate::interpreter::{
    Builtin, BufferedOutput, Interpreter, OutputSink, RuntimeError, ScriptedInput,
    DEFAULT_MAX_CALL_DEPTH,
};
use crate::lexer::{self, TokenKind};
use crate::parser::{self, ParseError};

pub const LANGUAGE_NAME: &str = "CraftLang";
pub const LANGUAGE_VERSION: &str = "1.0.0";

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum CraftError {
    Syntax(Vec<ParseError>),
    Runtime(RuntimeError),
}

impl CraftError {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CraftError::Syntax(errors) => errors.iter().map(syntax_diagnostic).collect(),
            CraftError::Runtime(e) => vec![Diagnostic {
                kind: "runtime".to_string(),
                message: e.message.clone(),
                line: e.line.unwrap_or(0),
                column: 0,
            }],
        }
    }
}

impl fmt::Display for CraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CraftError::Syntax(errors) => {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                f.write_str(&messages.join("\n"))
            }
            CraftError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CraftError {}

fn syntax_diagnostic(e: &ParseError) -> Diagnostic {
    Diagnostic {
        kind: "syntax".to_string(),
        message: e.message.clone(),
        line: e.line,
        column: e.column,
    }
}

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Lines served to `input()`, one per call.
    pub input: Option<String>,
    pub max_call_depth: usize,
    pub interrupt: Option<Arc<AtomicBool>>,
    /// Prefix the output with a token listing and the parsed tree.
    pub debug: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            interrupt: None,
            debug: false,
        }
    }
}

/// Result of [`run`]: everything printed, and the error if the run failed.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: String,
    pub error: Option<CraftError>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Lex, parse and interpret `source`.
///
/// Output printed before a runtime error is kept.
pub fn run(source: &str, options: &RunOptions) -> RunOutcome {
    let mut output = BufferedOutput::new();
    let tokens = lexer::tokenize(source);

    if options.debug {
        output_tokens(&mut output, &tokens);
    }

    let program = match parser::parse_tokens(tokens) {
        Ok(program) => program,
        Err(errors) => {
            return RunOutcome {
                output: output.into_string(),
                error: Some(CraftError::Syntax(errors)),
            };
        }
    };

    if options.debug {
        output.write(&format!("=== AST ===\n{}\n\n", format_program(&program)));
    }

    let mut input = ScriptedInput::new(options.input.as_deref().unwrap_or(""));
    let result = {
        let mut interpreter =
            Interpreter::new(&mut output, &mut input).with_max_depth(options.max_call_depth);
        if let Some(flag) = &options.interrupt {
            interpreter = interpreter.with_interrupt(Arc::clone(flag));
        }
        interpreter.interpret(&program)
    };

    RunOutcome {
        output: output.into_string(),
        error: result.err().map(CraftError::Runtime),
    }
}

fn output_tokens(output: &mut BufferedOutput, tokens: &[lexer::Token]) {
    output.write("=== TOKENS ===\n");
    for token in tokens.iter().filter(|t| t.kind != TokenKind::Eof) {
        output.write(&format!("{} ({}:{})\n", token.kind, token.line, token.column));
    }
    output.write("\n");
}

/// Every syntax error in `source`, without running it.
pub fn validate_syntax(source: &str) -> Vec<Diagnostic> {
    match parser::parse(source) {
        Ok(_) => Vec::new(),
        Err(errors) => errors.iter().map(syntax_diagnostic).collect(),
    }
}

/// Re-indent by brace depth, four spaces per level.
pub fn format_source(source: &str) -> String {
    let mut depth = 0usize;
    let mut lines = Vec::new();

    for raw in source.lines() {
        let line = raw.trim();
        if line.is_empty() {
            lines.push(String::new());
            continue;
        }
        if line.starts_with('}') {
            depth = depth.saturating_sub(1);
        }
        lines.push(format!("{}{}", "    ".repeat(depth), line));
        if line.ends_with('{') {
            depth += 1;
        }
    }

    lines.join("\n")
}

pub fn language_info() -> LanguageInfo {
    let operators = [
        "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "=", "!", "and", "or", "not",
    ];
    LanguageInfo {
        name: LANGUAGE_NAME.to_string(),
        version: LANGUAGE_VERSION.to_string(),
        keywords: TokenKind::KEYWORDS.iter().map(|k| k.to_string()).collect(),
        builtins: Builtin::ALL.iter().map(|b| b.name().to_string()).collect(),
        operators: operators.iter().map(|o| o.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_before_runtime_error_is_kept() {
        let outcome = run("print(\"before\");\nprint(missing);", &RunOptions::default());
        assert_eq!(outcome.output, "before\n");
        let error = outcome.error.expect("should fail");
        assert_eq!(error.to_string(), "Undefined variable 'missing' at line 2");
    }

    #[test]
    fn syntax_errors_stop_before_running() {
        let outcome = run("print(1);\nlet = 2;", &RunOptions::default());
        assert_eq!(outcome.output, "");
        assert!(matches!(outcome.error, Some(CraftError::Syntax(ref e)) if e.len() == 1));
    }

    #[test]
    fn input_lines_are_consumed_in_order() {
        let options = RunOptions {
            input: Some("Ada\n36".to_string()),
            ..RunOptions::default()
        };
        let outcome = run(
            "let n = input(\"name? \");\nlet age = input(\"age? \");\nprint(n + \" \" + (age + 1));",
            &options,
        );
        assert!(outcome.success(), "{:?}", outcome.error);
        assert_eq!(outcome.output, "name? age? Ada 37\n");
    }

    #[test]
    fn debug_dump_lists_tokens_and_tree() {
        let options = RunOptions {
            debug: true,
            ..RunOptions::default()
        };
        let outcome = run("print(1);", &options);
        assert!(outcome.output.starts_with("=== TOKENS ===\n'print' (1:1)\n"));
        assert!(outcome.output.contains("=== AST ===\n(print 1)\n"));
        assert!(outcome.output.ends_with("1\n"));
    }

    #[test]
    fn validate_collects_positions() {
        let errors = validate_syntax("let x = ;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "syntax");
        assert_eq!((errors[0].line, errors[0].column), (1, 9));
        assert!(validate_syntax("let x = 1;").is_empty());
    }

    #[test]
    fn format_reindents_braces() {
        let formatted = format_source("function f() {\nreturn 1;\n}\n");
        assert_eq!(formatted, "function f() {\n    return 1;\n}");
    }

    #[test]
    fn info_lists_builtins() {
        let info = language_info();
        assert_eq!(info.name, "CraftLang");
        assert_eq!(info.builtins, vec!["clock", "toString", "toNumber"]);
        assert!(info.keywords.contains(&"function".to_string()));
    }
}
