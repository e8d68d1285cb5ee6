//! S-expression rendering of the AST.
//!
//! One line per program, e.g. `(let x (+ 1 (* 2 3)))`. Numbers are printed the
//! way the interpreter prints them, strings are quoted with Rust escaping.

use super::types::*;
use crate::interpreter::format_number;

/// Render a whole program; statements are separated by spaces.
pub fn format_program(program: &Program) -> String {
    program
        .statements
        .iter()
        .map(format_stmt)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_stmt(stmt: &Stmt) -> String {
    match &stmt.kind {
        StmtKind::VarDecl {
            name,
            value,
            constant,
        } => {
            let keyword = if *constant { "const" } else { "let" };
            format!("({} {} {})", keyword, name, format_expr(value))
        }
        StmtKind::Function(decl) => format!(
            "(function {} ({}) {})",
            decl.name,
            decl.params.join(" "),
            format_block(&decl.body)
        ),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => match else_branch {
            Some(otherwise) => format!(
                "(if {} {} {})",
                format_expr(condition),
                format_stmt(then_branch),
                format_stmt(otherwise)
            ),
            None => format!("(if {} {})", format_expr(condition), format_stmt(then_branch)),
        },
        StmtKind::While { condition, body } => {
            format!("(while {} {})", format_expr(condition), format_stmt(body))
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => format!(
            "(for {} {} {} {})",
            format_stmt(init),
            format_expr(condition),
            format_expr(update),
            format_stmt(body)
        ),
        StmtKind::Return(Some(value)) => format!("(return {})", format_expr(value)),
        StmtKind::Return(None) => "(return)".to_string(),
        StmtKind::Expression(expr) => format_expr(expr),
        StmtKind::Block(statements) => format_block(statements),
        StmtKind::Print(expr) => format!("(print {})", format_expr(expr)),
    }
}

fn format_block(statements: &[Stmt]) -> String {
    if statements.is_empty() {
        return "(block)".to_string();
    }
    let inner: Vec<String> = statements.iter().map(format_stmt).collect();
    format!("(block {})", inner.join(" "))
}

pub fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Binary { left, op, right } => {
            format!("({} {} {})", op, format_expr(left), format_expr(right))
        }
        Expr::Unary { op, operand } => format!("({} {})", op, format_expr(operand)),
        Expr::Assign { name, value } => format!("(= {} {})", name, format_expr(value)),
        Expr::Call { callee, args, .. } => {
            let mut parts = vec![format_expr(callee)];
            parts.extend(args.iter().map(format_expr));
            format!("(call {})", parts.join(" "))
        }
        Expr::Identifier(name) => name.clone(),
        Expr::Literal(lit) => format_literal(lit),
        Expr::Input(Some(prompt)) => format!("(input {})", format_expr(prompt)),
        Expr::Input(None) => "(input)".to_string(),
    }
}

fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Number(n) => format_number(*n),
        Literal::Str(s) => format!("{:?}", s),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
    }
}
