//! Recursive-descent parser for CraftLang.
//!
//! One token of lookahead, precedence climbing for expressions. Binding
//! strength from loosest to tightest:
//!
//! ```text
//!   assignment   IDENT = expr          (right-associative)
//!   logic_or     or
//!   logic_and    and
//!   equality     == !=
//!   relational   > >= < <=
//!   additive     + -
//!   multiplicative * / %
//!   unary        ! - not
//!   call         primary ( args )*
//!   primary      literals, identifiers, input(...), ( expr )
//! ```
//!
//! A syntax error inside a statement is recorded and the parser skips ahead
//! to the next statement boundary, so one pass reports every broken statement.

use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, FunctionDecl, Literal, Program, Stmt, StmtKind, UnaryOp};
use crate::lexer::{self, Token, TokenKind};

/// Maximum nesting of statements and parenthesised expressions.
/// Deeper input is rejected instead of exhausting the stack.
const MAX_NESTING: usize = 128;

/// Maximum depth of one expression tree. Every operator in a chain like
/// `1 + 1 + 1` and every link of `f()()` adds a level, as does each nesting.
const MAX_EXPRESSION_DEPTH: usize = 512;

/// A syntax error at a token position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.message, self.line)
    }
}

impl std::error::Error for ParseError {}

type ParseResult<T> = Result<T, ParseError>;

/// Parse CraftLang source into a Program.
pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    parse_tokens(lexer::tokenize(source))
}

/// Parse an already tokenized source. `tokens` must end with `Eof`.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::new();
    let mut errors = Vec::new();

    while !parser.at_end() {
        match parser.statement() {
            Ok(stmt) => statements.push(stmt),
            Err(e) => {
                errors.push(e);
                parser.synchronize();
            }
        }
    }

    if errors.is_empty() {
        Ok(Program { statements })
    } else {
        Err(errors)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    expr_depth: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
                span: 0..0,
            });
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            expr_depth: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Token cursor
    // ═══════════════════════════════════════════════════════════════════

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    /// Compares token kinds, ignoring literal payloads.
    fn check(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.peek().kind) == mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("Expected {} {}, got {}", kind, context, self.peek().kind)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("Expected {}, got {}", what, other))),
        }
    }

    fn error_here(&self, message: String) -> ParseError {
        let token = self.peek();
        error_at(token, message)
    }

    fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!("Nesting too deep (max {})", MAX_NESTING)));
        }
        self.deepen()?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.expr_depth -= 1;
        result
    }

    /// Count one more level of expression tree.
    fn deepen(&mut self) -> ParseResult<()> {
        if self.expr_depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error_here(format!(
                "Expression too deep (max {})",
                MAX_EXPRESSION_DEPTH
            )));
        }
        self.expr_depth += 1;
        Ok(())
    }

    /// Skip to the start of the next statement after an error.
    fn synchronize(&mut self) {
        self.depth = 0;
        self.expr_depth = 0;
        let first = self.advance();
        if matches!(first.kind, TokenKind::Semicolon | TokenKind::RBrace) {
            return;
        }
        while !self.at_end() {
            if self.peek().kind.starts_statement() {
                return;
            }
            let token = self.advance();
            if matches!(token.kind, TokenKind::Semicolon | TokenKind::RBrace) {
                return;
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.descend(|p| match p.peek().kind.clone() {
            TokenKind::Let | TokenKind::Const => p.var_decl(),
            TokenKind::Function => p.function_decl(),
            TokenKind::If => p.if_stmt(),
            TokenKind::While => p.while_stmt(),
            TokenKind::For => p.for_stmt(),
            TokenKind::Return => p.return_stmt(),
            TokenKind::LBrace => {
                let line = p.advance().line;
                Ok(Stmt::new(StmtKind::Block(p.block_body()?), line))
            }
            TokenKind::Print => p.print_stmt(),
            _ => p.expression_stmt(),
        })
    }

    fn var_decl(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let constant = keyword.kind == TokenKind::Const;
        let name = self.expect_ident("variable name")?;
        self.expect(&TokenKind::Assign, "after variable name")?;
        let value = self.expression()?;
        self.expect(&TokenKind::Semicolon, "after variable declaration")?;
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                value,
                constant,
            },
            keyword.line,
        ))
    }

    fn function_decl(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "after function name")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "after parameters")?;
        self.expect(&TokenKind::LBrace, "before function body")?;
        let body = self.block_body()?;

        Ok(Stmt::new(
            StmtKind::Function(Rc::new(FunctionDecl { name, params, body })),
            line,
        ))
    }

    /// Statements up to and including the closing brace; the opening brace is already consumed.
    fn block_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RBrace, "after block")?;
        Ok(statements)
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        self.expect(&TokenKind::LParen, "after 'if'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "after if condition")?;
        let then_branch = Box::new(self.statement()?);
        // A dangling else binds to the innermost if.
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            line,
        ))
    }

    fn while_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        self.expect(&TokenKind::LParen, "after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "after while condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::new(StmtKind::While { condition, body }, line))
    }

    fn for_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        self.expect(&TokenKind::LParen, "after 'for'")?;
        let init = Box::new(self.statement()?);
        let condition = self.expression()?;
        self.expect(&TokenKind::Semicolon, "after loop condition")?;
        let update = self.expression()?;
        self.expect(&TokenKind::RParen, "after for clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                update,
                body,
            },
            line,
        ))
    }

    fn return_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon, "after return value")?;
        Ok(Stmt::new(StmtKind::Return(value), line))
    }

    fn print_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.advance().line;
        self.expect(&TokenKind::LParen, "after 'print'")?;
        let value = self.expression()?;
        self.expect(&TokenKind::RParen, "after print argument")?;
        self.expect(&TokenKind::Semicolon, "after print statement")?;
        Ok(Stmt::new(StmtKind::Print(value), line))
    }

    fn expression_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.peek().line;
        let expr = self.expression()?;
        self.expect(&TokenKind::Semicolon, "after expression")?;
        Ok(Stmt::new(StmtKind::Expression(expr), line))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    fn expression(&mut self) -> ParseResult<Expr> {
        self.descend(|p| p.assignment())
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.logic_or()?;

        if self.check(&TokenKind::Assign) {
            let equals = self.advance();
            let value = self.descend(|p| p.assignment())?;
            return match target {
                Expr::Identifier(name) => Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                }),
                _ => Err(error_at(&equals, "Invalid assignment target".to_string())),
            };
        }

        Ok(target)
    }

    /// Left-associative binary level: `next (op next)*`.
    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let saved = self.expr_depth;
        let result = self.fold_binary(ops, next);
        self.expr_depth = saved;
        result
    }

    fn fold_binary(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.check(kind) {
                    self.deepen()?;
                    self.advance();
                    let right = next(self)?;
                    left = Expr::Binary {
                        left: Box::new(left),
                        op: *op,
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn logic_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::Or, BinaryOp::Or)], Self::logic_and)
    }

    fn logic_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::And, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::NotEq, BinaryOp::NotEq)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::GtEq, BinaryOp::GtEq),
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::LtEq, BinaryOp::LtEq),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        let Some(op) = op else {
            return self.call();
        };
        self.advance();
        let operand = self.descend(|p| p.unary())?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let saved = self.expr_depth;
        let result = self.call_chain();
        self.expr_depth = saved;
        result
    }

    fn call_chain(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        while self.check(&TokenKind::LParen) {
            self.deepen()?;
            let line = self.advance().line;
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    args.push(self.expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RParen, "after arguments")?;
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
                line,
            };
        }

        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Number(n) => Expr::Literal(Literal::Number(n)),
            TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::Null => Expr::Literal(Literal::Null),
            TokenKind::Ident(name) => Expr::Identifier(name),
            TokenKind::Input => {
                self.expect(&TokenKind::LParen, "after 'input'")?;
                let prompt = if self.check(&TokenKind::RParen) {
                    None
                } else {
                    Some(Box::new(self.expression()?))
                };
                self.expect(&TokenKind::RParen, "after input prompt")?;
                Expr::Input(prompt)
            }
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "after expression")?;
                inner
            }
            TokenKind::Eof => {
                return Err(error_at(&token, "Unexpected end of input".to_string()));
            }
            ref other => {
                return Err(error_at(&token, format!("Unexpected token: {}", other)));
            }
        };
        Ok(expr)
    }
}

fn error_at(token: &Token, message: String) -> ParseError {
    ParseError {
        message,
        line: token.line,
        column: token.column,
    }
}
