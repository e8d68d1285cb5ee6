//! Lexer for CraftLang source code.
//!
//! Converts source text into a flat token sequence using the logos lexer
//! generator. The lexer never fails: characters it does not recognise become
//! [`TokenKind::Illegal`] tokens, and the parser reports them with position.
//!
//! # Token Categories
//!
//! - **Keywords**: `let`, `const`, `if`, `else`, `while`, `for`, `function`,
//!   `return`, `true`, `false`, `null`, `print`, `input`, `and`, `or`, `not`
//! - **Literals**: numbers (`42`, `3.14`), strings (`"a"`, `'b'`)
//! - **Operators**: `==`, `!=`, `<=`, `>=`, `+`, `-`, `*`, `/`, `%`, `=`, `<`, `>`, `!`
//! - **Punctuation**: `;`, `,`, `(`, `)`, `{`, `}`, `[`, `]`
//! - **Identifiers**: `[A-Za-z_$][A-Za-z0-9_$]*`
//!
//! Whitespace (newlines included) and comments are discarded. Every sequence
//! ends with exactly one [`TokenKind::Eof`].

use std::fmt;

use logos::{Logos, Span};

/// Token kinds produced by the lexer.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // ═══════════════════════════════════════════════════════════════════
    // Keywords
    // ═══════════════════════════════════════════════════════════════════
    #[token("let")]
    Let,

    #[token("const")]
    Const,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("while")]
    While,

    #[token("for")]
    For,

    #[token("function")]
    Function,

    #[token("return")]
    Return,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[token("print")]
    Print,

    #[token("input")]
    Input,

    #[token("and")]
    And,

    #[token("or")]
    Or,

    /// `not` and `!` both lex to the same unary operator.
    #[token("not")]
    #[token("!")]
    Not,

    // ═══════════════════════════════════════════════════════════════════
    // Operators (two-character forms win by longest match)
    // ═══════════════════════════════════════════════════════════════════
    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<=")]
    LtEq,

    #[token(">=")]
    GtEq,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("=")]
    Assign,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    // ═══════════════════════════════════════════════════════════════════
    // Punctuation
    // ═══════════════════════════════════════════════════════════════════
    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    // ═══════════════════════════════════════════════════════════════════
    // Comments (skipped)
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r"//[^\n]*", logos::skip)]
    #[token("/*", skip_block_comment)]
    Comment,

    // ═══════════════════════════════════════════════════════════════════
    // Literals and identifiers
    // ═══════════════════════════════════════════════════════════════════
    /// Decimal number. A second `.` ends the literal, so `1.2.3` is `1.2`, `.`, `3`.
    #[regex(r"[0-9]+(\.[0-9]*)?", lex_number)]
    Number(f64),

    #[token("\"", |lex| lex_string(lex, '"'))]
    #[token("'", |lex| lex_string(lex, '\''))]
    Str(String),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// A character the grammar has no use for.
    Illegal(String),

    /// End of input.
    Eof,
}

fn lex_number(lex: &mut logos::Lexer<TokenKind>) -> Option<f64> {
    lex.slice().parse().ok()
}

/// Reads the body of a string literal after its opening quote.
///
/// An unterminated string runs to the end of input rather than failing.
fn lex_string(lex: &mut logos::Lexer<TokenKind>, quote: char) -> String {
    let mut value = String::new();
    let mut consumed = 0;
    let mut chars = lex.remainder().chars();

    while let Some(c) = chars.next() {
        consumed += c.len_utf8();
        if c == quote {
            break;
        }
        if c == '\\' {
            match chars.next() {
                Some(escaped) => {
                    consumed += escaped.len_utf8();
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                None => break,
            }
            continue;
        }
        value.push(c);
    }

    lex.bump(consumed);
    value
}

fn skip_block_comment(lex: &mut logos::Lexer<TokenKind>) -> logos::Skip {
    let rest = lex.remainder();
    let len = rest.find("*/").map(|i| i + 2).unwrap_or(rest.len());
    lex.bump(len);
    logos::Skip
}

impl TokenKind {
    /// Keyword spellings, in declaration order.
    pub const KEYWORDS: &'static [&'static str] = &[
        "let", "const", "if", "else", "while", "for", "function", "return", "true", "false",
        "null", "print", "input", "and", "or", "not",
    ];

    /// Whether this token starts a statement form (used for error recovery).
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Let
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Print
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Let => write!(f, "'let'"),
            TokenKind::Const => write!(f, "'const'"),
            TokenKind::If => write!(f, "'if'"),
            TokenKind::Else => write!(f, "'else'"),
            TokenKind::While => write!(f, "'while'"),
            TokenKind::For => write!(f, "'for'"),
            TokenKind::Function => write!(f, "'function'"),
            TokenKind::Return => write!(f, "'return'"),
            TokenKind::True => write!(f, "'true'"),
            TokenKind::False => write!(f, "'false'"),
            TokenKind::Null => write!(f, "'null'"),
            TokenKind::Print => write!(f, "'print'"),
            TokenKind::Input => write!(f, "'input'"),
            TokenKind::And => write!(f, "'and'"),
            TokenKind::Or => write!(f, "'or'"),
            TokenKind::Not => write!(f, "'!'"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::LtEq => write!(f, "'<='"),
            TokenKind::GtEq => write!(f, "'>='"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Assign => write!(f, "'='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Comment => write!(f, "comment"),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Illegal(s) => write!(f, "illegal character '{}'", s),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its source position. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

/// Byte offsets where each line begins, for span → line/column mapping.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.starts[line];
        let column = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line + 1, column + 1)
    }
}

/// Tokenize source text.
///
/// The result is never empty: it always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Vec<Token> {
    let index = LineIndex::new(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let kind = match result {
            Ok(kind) => kind,
            Err(()) => TokenKind::Illegal(lexer.slice().to_string()),
        };
        let (line, column) = index.position(source, span.start);
        tokens.push(Token {
            kind,
            line,
            column,
            span,
        });
    }

    let (line, column) = index.position(source, source.len());
    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
        column,
        span: source.len()..source.len(),
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("  \n\t "), vec![TokenKind::Eof]);
    }

    #[test]
    fn second_dot_ends_number() {
        assert_eq!(
            kinds("1.2.3"),
            vec![
                TokenKind::Number(1.2),
                TokenKind::Illegal(".".into()),
                TokenKind::Number(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_win() {
        assert_eq!(
            kinds("a<=b != c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::LtEq,
                TokenKind::Ident("b".into()),
                TokenKind::NotEq,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_need_word_boundary() {
        assert_eq!(
            kinds("letter let"),
            vec![TokenKind::Ident("letter".into()), TokenKind::Let, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_eats_rest() {
        assert_eq!(kinds("1 /* never closed\n2"), vec![TokenKind::Number(1.0), TokenKind::Eof]);
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = tokenize("let x = 1;\n  print(x);");
        let print = tokens.iter().find(|t| t.kind == TokenKind::Print).expect("print");
        assert_eq!((print.line, print.column), (2, 3));
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    }

    #[test]
    fn eof_sits_at_end_of_last_line() {
        let tokens = tokenize("a\nbc");
        let eof = tokens.last().expect("eof");
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!((eof.line, eof.column), (2, 3));
    }
}
