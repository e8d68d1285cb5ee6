//! AST type definitions.

use std::fmt;
use std::rc::Rc;

/// A complete CraftLang program is a sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A statement together with the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let x = expr;` or `const x = expr;`
    VarDecl {
        name: String,
        value: Expr,
        constant: bool,
    },
    /// `function name(a, b) { ... }`
    Function(Rc<FunctionDecl>),
    /// `if (cond) stmt else stmt`
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// `while (cond) stmt`
    While { condition: Expr, body: Box<Stmt> },
    /// `for (init cond; update) stmt`
    For {
        init: Box<Stmt>,
        condition: Expr,
        update: Expr,
        body: Box<Stmt>,
    },
    /// `return;` or `return expr;`
    Return(Option<Expr>),
    /// `expr;`
    Expression(Expr),
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `print(expr);`
    Print(Expr),
}

/// A function declaration. Shared between the tree and every function value
/// created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `name = value`; only bare identifiers are assignable.
    Assign { name: String, value: Box<Expr> },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        line: usize,
    },
    Identifier(String),
    Literal(Literal),
    /// `input()` or `input(prompt)`
    Input(Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Type name of the literal.
    pub fn datatype(&self) -> &'static str {
        match self {
            Literal::Number(_) => "number",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "boolean",
            Literal::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}
