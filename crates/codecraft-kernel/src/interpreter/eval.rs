//! Tree-walking evaluation.
//!
//! Statements produce a [`Flow`], expressions produce a [`Value`]. Every node
//! maps to one rule in [`Interpreter::execute`] or [`Interpreter::evaluate`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, Program, Stmt, StmtKind, UnaryOp};

use super::builtins;
use super::control_flow::Flow;
use super::io::{InputSource, OutputSink};
use super::scope::{self, Env, Environment, ScopeError};
use super::value::{parse_number, Function, Value};

/// Default limit on nested function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

const DEFAULT_PROMPT: &str = "Input: ";

/// An evaluation failure, with the line of the statement being run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: Option<usize>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {}", self.message, line),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

pub type EvalResult<T> = Result<T, RuntimeError>;

/// Evaluates a program against a global frame.
pub struct Interpreter<'io> {
    globals: Env,
    output: &'io mut dyn OutputSink,
    input: &'io mut dyn InputSource,
    interrupt: Option<Arc<AtomicBool>>,
    max_depth: usize,
    depth: usize,
    line: usize,
    /// Frames that closures were declared in; emptied on drop.
    captured: Vec<Weak<RefCell<Environment>>>,
}

impl<'io> Interpreter<'io> {
    pub fn new(output: &'io mut dyn OutputSink, input: &'io mut dyn InputSource) -> Self {
        let globals = Environment::global();
        builtins::install(&globals);
        Self {
            globals,
            output,
            input,
            interrupt: None,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: 0,
            line: 0,
            captured: Vec::new(),
        }
    }

    /// Abort with a RuntimeError once `flag` is set. Checked at loop
    /// iterations and calls.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn globals(&self) -> &Env {
        &self.globals
    }

    /// Run a program in the global frame and return its last statement value.
    pub fn interpret(&mut self, program: &Program) -> EvalResult<Value> {
        let globals = Rc::clone(&self.globals);
        let mut last = Value::Null;
        for stmt in &program.statements {
            match self.execute(stmt, &globals)? {
                Flow::Normal(value) => last = value,
                Flow::Return(_) => {
                    self.line = stmt.line;
                    return Err(self.error("Cannot return from top-level code"));
                }
            }
        }
        Ok(last)
    }

    fn error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            line: (self.line > 0).then_some(self.line),
        }
    }

    fn scope_error(&self, e: ScopeError) -> RuntimeError {
        self.error(e.to_string())
    }

    fn remember_closure_frame(&mut self, env: &Env) {
        if self.captured.len() >= 1024 && self.captured.len().is_power_of_two() {
            self.captured.retain(|frame| frame.strong_count() > 0);
        }
        let seen = self
            .captured
            .last()
            .is_some_and(|frame| frame.as_ptr() == Rc::as_ptr(env));
        if !seen {
            self.captured.push(Rc::downgrade(env));
        }
    }

    fn check_interrupt(&self) -> EvalResult<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(self.error("Execution interrupted")),
            _ => Ok(()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    pub fn execute(&mut self, stmt: &Stmt, env: &Env) -> EvalResult<Flow> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                value,
                constant,
            } => {
                let value = self.evaluate(value, env)?;
                self.line = stmt.line;
                env.borrow_mut()
                    .define(name, value.clone(), *constant)
                    .map_err(|e| self.scope_error(e))?;
                Ok(Flow::Normal(value))
            }
            StmtKind::Function(decl) => {
                let function = Value::Function(Rc::new(Function {
                    decl: Rc::clone(decl),
                    closure: Rc::clone(env),
                }));
                env.borrow_mut()
                    .define(&decl.name, function, false)
                    .map_err(|e| self.scope_error(e))?;
                self.remember_closure_frame(env);
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    self.execute(then_branch, env)
                } else if let Some(otherwise) = else_branch {
                    self.execute(otherwise, env)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            StmtKind::While { condition, body } => {
                let mut last = Value::Null;
                while self.evaluate(condition, env)?.is_truthy() {
                    self.check_interrupt()?;
                    match self.execute(body, env)? {
                        Flow::Normal(value) => last = value,
                        returning @ Flow::Return(_) => return Ok(returning),
                    }
                }
                Ok(Flow::Normal(last))
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                // The counter lives in the enclosing frame and outlasts the loop.
                if let returning @ Flow::Return(_) = self.execute(init, env)? {
                    return Ok(returning);
                }
                let mut last = Value::Null;
                while self.evaluate(condition, env)?.is_truthy() {
                    self.check_interrupt()?;
                    match self.execute(body, env)? {
                        Flow::Normal(value) => last = value,
                        returning @ Flow::Return(_) => return Ok(returning),
                    }
                    self.evaluate(update, env)?;
                }
                Ok(Flow::Normal(last))
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Expression(expr) => Ok(Flow::Normal(self.evaluate(expr, env)?)),
            StmtKind::Block(statements) => {
                let block_env = Environment::child(env);
                self.execute_block(statements, &block_env)
            }
            StmtKind::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                self.output.write(&format!("{}\n", value));
                Ok(Flow::Normal(Value::Null))
            }
        }
    }

    fn execute_block(&mut self, statements: &[Stmt], env: &Env) -> EvalResult<Flow> {
        let mut last = Value::Null;
        for stmt in statements {
            match self.execute(stmt, env)? {
                Flow::Normal(value) => last = value,
                returning @ Flow::Return(_) => return Ok(returning),
            }
        }
        Ok(Flow::Normal(last))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    pub fn evaluate(&mut self, expr: &Expr, env: &Env) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(Value::from(lit)),
            Expr::Identifier(name) => scope::lookup(env, name).map_err(|e| self.scope_error(e)),
            Expr::Assign { name, value } => {
                let value = self.evaluate(value, env)?;
                scope::assign(env, name, value.clone()).map_err(|e| self.scope_error(e))?;
                Ok(value)
            }
            Expr::Unary { op, operand } => {
                let operand = self.evaluate(operand, env)?;
                match op {
                    UnaryOp::Neg => match operand {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(self.error("Operand must be a number for operator '-'")),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                }
            }
            Expr::Binary { left, op, right } => {
                // Both sides are always evaluated, `and`/`or` included.
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                self.binary(*op, left, right)
            }
            Expr::Call { callee, args, .. } => {
                let callee = self.evaluate(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, env)?);
                }
                self.call(callee, values)
            }
            Expr::Input(prompt) => {
                let prompt = match prompt {
                    Some(expr) => self.evaluate(expr, env)?.to_string(),
                    None => DEFAULT_PROMPT.to_string(),
                };
                self.output.write(&prompt);
                let line = self.input.read_line(&prompt);
                Ok(match parse_number(&line) {
                    Some(n) => Value::Number(n),
                    None => Value::Str(line),
                })
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
        use Value::{Bool, Number, Str};

        match op {
            BinaryOp::Add => match (&left, &right) {
                (Number(a), Number(b)) => Ok(Number(a + b)),
                _ => Ok(Str(format!("{}{}", left, right))),
            },
            BinaryOp::Eq => Ok(Bool(left.strict_equals(&right))),
            BinaryOp::NotEq => Ok(Bool(!left.strict_equals(&right))),
            BinaryOp::And => Ok(Bool(left.is_truthy() && right.is_truthy())),
            BinaryOp::Or => Ok(Bool(left.is_truthy() || right.is_truthy())),
            _ => {
                let (Number(a), Number(b)) = (&left, &right) else {
                    return Err(self.error(format!("Operands must be numbers for operator '{}'", op)));
                };
                let (a, b) = (*a, *b);
                Ok(match op {
                    BinaryOp::Sub => Number(a - b),
                    BinaryOp::Mul => Number(a * b),
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(self.error("Division by zero"));
                        }
                        Number(a / b)
                    }
                    BinaryOp::Mod => Number(a % b),
                    BinaryOp::Lt => Bool(a < b),
                    BinaryOp::LtEq => Bool(a <= b),
                    BinaryOp::Gt => Bool(a > b),
                    BinaryOp::GtEq => Bool(a >= b),
                    BinaryOp::Add | BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::And | BinaryOp::Or => {
                        unreachable!("handled above")
                    }
                })
            }
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> EvalResult<Value> {
        self.check_interrupt()?;
        match callee {
            Value::Builtin(builtin) => builtins::call(builtin, &args).map_err(|m| self.error(m)),
            Value::Function(function) => self.call_function(&function, args),
            _ => Err(self.error("Can only call functions")),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> EvalResult<Value> {
        if args.len() != function.arity() {
            return Err(self.error(format!(
                "Function '{}' expects {} arguments, got {}",
                function.name(),
                function.arity(),
                args.len()
            )));
        }
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "Maximum call depth exceeded ({}) in '{}'",
                self.max_depth,
                function.name()
            )));
        }

        let frame = Environment::child(&function.closure);
        for (param, arg) in function.decl.params.iter().zip(args) {
            frame
                .borrow_mut()
                .define(param, arg, false)
                .map_err(|e| self.scope_error(e))?;
        }

        let caller_line = self.line;
        self.depth += 1;
        let result = self.execute_block(&function.decl.body, &frame);
        self.depth -= 1;
        self.line = caller_line;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(Value::Null),
        }
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        // A frame holding a closure over itself is an Rc cycle.
        for frame in self.captured.drain(..) {
            if let Some(frame) = frame.upgrade() {
                frame.borrow_mut().clear();
            }
        }
        self.globals.borrow_mut().clear();
    }
}
