//! Human-readable rendering of expressions and statements in the text syntax
//! accepted by the parser. Parentheses are emitted only where precedence
//! requires them, so parsed trees print back to equivalent source.

use std::fmt::{self, Write};

use super::{BinOp, Expr, Stmt};
use crate::value::format_float;

const INDENT: &str = "  ";

const PREC_TERNARY: u8 = 1;
const PREC_UNARY: u8 = 8;
const PREC_POSTFIX: u8 = 9;

impl BinOp {
    /// Binding strength in the text syntax; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::Eq | BinOp::Neq => 4,
            BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => 5,
            BinOp::Add | BinOp::Sub | BinOp::Concat => 6,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
        }
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary { .. } | Expr::Arrow { .. } => PREC_TERNARY,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } => PREC_UNARY,
        _ => PREC_POSTFIX + 1,
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn write_operand(out: &mut String, expr: &Expr, min_prec: u8) {
    if precedence(expr) < min_prec {
        out.push('(');
        fmt_expr(out, expr);
        out.push(')');
    } else {
        fmt_expr(out, expr);
    }
}

fn write_args(out: &mut String, args: &[Expr]) {
    out.push('(');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_operand(out, a, PREC_TERNARY);
    }
    out.push(')');
}

fn fmt_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Int { value } => {
            let _ = write!(out, "{}", value);
        }
        Expr::Float { value } => out.push_str(&format_float(*value)),
        Expr::String { value } => {
            let _ = write!(out, "{:?}", value);
        }
        Expr::Bool { value } => {
            let _ = write!(out, "{}", value);
        }
        Expr::Null => out.push_str("null"),
        Expr::Var { name, scope } => {
            if let Some(scope) = scope {
                out.push_str(scope);
                out.push_str("::");
            }
            out.push_str(name);
        }
        Expr::Property { object, field } => {
            out.push_str(object);
            out.push('.');
            out.push_str(field);
        }
        Expr::Member { object, property } => {
            write_operand(out, object, PREC_POSTFIX);
            out.push('.');
            out.push_str(property.as_str());
        }
        Expr::Computed { object, key } => {
            write_operand(out, object, PREC_POSTFIX);
            out.push('[');
            fmt_expr(out, key);
            out.push(']');
        }
        Expr::Index { array, index } => {
            write_operand(out, array, PREC_POSTFIX);
            out.push('[');
            fmt_expr(out, index);
            out.push(']');
        }
        Expr::Binary { op, left, right } => {
            let p = op.precedence();
            write_operand(out, left, p);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            // Left-associative: an equal-precedence right child needs parens.
            write_operand(out, right, p + 1);
        }
        Expr::Unary { op, operand } => {
            out.push_str(op.symbol());
            write_operand(out, operand, PREC_UNARY);
        }
        Expr::Ternary { condition, then, otherwise } => {
            write_operand(out, condition, PREC_TERNARY + 1);
            out.push_str(" ? ");
            write_operand(out, then, PREC_TERNARY);
            out.push_str(" : ");
            write_operand(out, otherwise, PREC_TERNARY);
        }
        Expr::Call { function, args } => {
            out.push_str(function);
            write_args(out, args);
        }
        Expr::MethodCall { receiver, method, args } => {
            write_operand(out, receiver, PREC_POSTFIX);
            out.push('.');
            out.push_str(method);
            write_args(out, args);
        }
        Expr::Group { inner } => {
            out.push('(');
            fmt_expr(out, inner);
            out.push(')');
        }
        Expr::Array { elements } => {
            out.push('[');
            for (i, e) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_operand(out, e, PREC_TERNARY);
            }
            out.push(']');
        }
        Expr::Object { keys, values } => {
            if keys.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, (k, v)) in keys.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if is_ident(k) {
                    out.push_str(k);
                } else {
                    let _ = write!(out, "{:?}", k);
                }
                out.push_str(": ");
                write_operand(out, v, PREC_TERNARY);
            }
            out.push_str(" }");
        }
        Expr::Arrow { params, body, .. } => {
            out.push('(');
            out.push_str(&params.join(", "));
            out.push_str(") => ");
            write_operand(out, body, PREC_TERNARY);
        }
    }
}

fn fmt_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    out.push_str("{\n");
    for s in stmts {
        fmt_stmt(out, s, depth + 1);
        out.push('\n');
    }
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push('}');
}

fn fmt_target(out: &mut String, target: &str, scope: &Option<String>) {
    if let Some(scope) = scope {
        out.push_str(scope);
        out.push_str("::");
    }
    out.push_str(target);
}

fn fmt_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    match stmt {
        Stmt::Assign { target, scope, value } => {
            fmt_target(out, target, scope);
            out.push_str(" = ");
            fmt_expr(out, value);
        }
        Stmt::CompoundAssign { target, scope, operator, value } => {
            fmt_target(out, target, scope);
            let _ = write!(out, " {}= ", operator.bin_op().symbol());
            fmt_expr(out, value);
        }
        Stmt::If { condition, then, otherwise } => {
            out.push_str("if (");
            fmt_expr(out, condition);
            out.push_str(") ");
            fmt_block(out, then, depth);
            if !otherwise.is_empty() {
                out.push_str(" else ");
                fmt_block(out, otherwise, depth);
            }
        }
        Stmt::While { condition, body } => {
            out.push_str("while (");
            fmt_expr(out, condition);
            out.push_str(") ");
            fmt_block(out, body, depth);
        }
        Stmt::ForEach { item, iterable, body } => {
            let _ = write!(out, "for ({} in ", item);
            fmt_expr(out, iterable);
            out.push_str(") ");
            fmt_block(out, body, depth);
        }
        Stmt::Call { function, args } => {
            out.push_str(function);
            write_args(out, args);
        }
        Stmt::Return { value } => {
            out.push_str("return");
            if let Some(v) = value {
                out.push(' ');
                fmt_expr(out, v);
            }
        }
        Stmt::Break => out.push_str("break"),
        Stmt::Continue => out.push_str("continue"),
        Stmt::Delete { target } => {
            out.push_str("delete ");
            fmt_expr(out, target);
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        fmt_expr(&mut out, self);
        f.write_str(&out)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        fmt_stmt(&mut out, self, 0);
        f.write_str(&out)
    }
}

/// Render a statement list one statement per line.
pub fn format_block(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for (i, s) in stmts.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        fmt_stmt(&mut out, s, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, UnaryOp};

    #[test]
    fn binary_precedence_parens() {
        let e = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::var("a"), Expr::var("b")),
            Expr::var("c"),
        );
        assert_eq!(e.to_string(), "(a + b) * c");
        let e = Expr::binary(
            BinOp::Sub,
            Expr::var("a"),
            Expr::binary(BinOp::Sub, Expr::var("b"), Expr::var("c")),
        );
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn postfix_and_literals() {
        let e = Expr::method_call(Expr::member(Expr::var("user"), "name"), "toUpperCase", vec![]);
        assert_eq!(e.to_string(), "user.name.toUpperCase()");
        let e = Expr::object(vec![("a".into(), Expr::float(1.5)), ("b c".into(), Expr::string("x"))]);
        assert_eq!(e.to_string(), r#"{ a: 1.5, "b c": "x" }"#);
        let e = Expr::unary(UnaryOp::Not, Expr::var("Counter:on"));
        assert_eq!(e.to_string(), "!Counter::on");
    }

    #[test]
    fn ternary_and_arrow() {
        let e = Expr::ternary(Expr::var("c"), Expr::int(1), Expr::int(2));
        assert_eq!(e.to_string(), "c ? 1 : 2");
        let e = Expr::arrow(vec!["x".into()], Expr::binary(BinOp::Mul, Expr::var("x"), Expr::int(2)), true);
        assert_eq!(e.to_string(), "(x) => x * 2");
    }

    #[test]
    fn statement_block() {
        let stmts = vec![
            Stmt::for_each("x", Expr::var("xs"), vec![Stmt::compound_assign("total", AssignOp::Add, Expr::var("x"))]),
            Stmt::ret(Some(Expr::var("total"))),
        ];
        assert_eq!(format_block(&stmts), "for (x in xs) {\n  total += x\n}\nreturn total");
    }
}
