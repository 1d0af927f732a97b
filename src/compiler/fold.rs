//! Compile-time evaluation of constant subtrees.
//!
//! Only literals and operators over literals fold. Calls never fold, even
//! pure builtins, and an operation that would fail at runtime is left for
//! the VM so the error surfaces when the program runs.

use crate::ast::{BinOp, Expr};
use crate::value::{Object, Value};
use crate::vm::ops;

pub(crate) fn evaluate(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Int { value } => Some(Value::Int(*value)),
        Expr::Float { value } => Some(Value::Float(*value)),
        Expr::String { value } => Some(Value::String(value.clone())),
        Expr::Bool { value } => Some(Value::Bool(*value)),
        Expr::Null => Some(Value::Null),
        Expr::Group { inner } => evaluate(inner),
        Expr::Unary { op, operand } => ops::unary(*op, &evaluate(operand)?).ok(),
        Expr::Binary { op: BinOp::And, left, right } => {
            let l = evaluate(left)?;
            if l.is_truthy() { evaluate(right) } else { Some(l) }
        }
        Expr::Binary { op: BinOp::Or, left, right } => {
            let l = evaluate(left)?;
            if l.is_truthy() { Some(l) } else { evaluate(right) }
        }
        Expr::Binary { op, left, right } => {
            let (l, r) = (evaluate(left)?, evaluate(right)?);
            ops::binary(*op, &l, &r).ok()
        }
        Expr::Ternary { condition, then, otherwise } => {
            if evaluate(condition)?.is_truthy() { evaluate(then) } else { evaluate(otherwise) }
        }
        Expr::Array { elements } => elements.iter().map(evaluate).collect::<Option<Vec<_>>>().map(Value::Array),
        Expr::Object { keys, values } if keys.len() == values.len() => {
            let mut obj = Object::with_capacity(keys.len());
            for (k, v) in keys.iter().zip(values) {
                obj.set(k.clone(), evaluate(v)?);
            }
            Some(Value::Object(obj))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::UnaryOp;

    #[test]
    fn folds_arithmetic() {
        let e = Expr::binary(BinOp::Add, Expr::int(1), Expr::binary(BinOp::Mul, Expr::int(2), Expr::float(1.5)));
        assert_eq!(evaluate(&e), Some(Value::Float(4.0)));
    }

    #[test]
    fn variables_and_calls_block_folding() {
        assert_eq!(evaluate(&Expr::binary(BinOp::Add, Expr::int(1), Expr::var("x"))), None);
        assert_eq!(evaluate(&Expr::call("math_abs", vec![Expr::int(-1)])), None);
    }

    #[test]
    fn failing_operations_do_not_fold() {
        assert_eq!(evaluate(&Expr::binary(BinOp::Mod, Expr::int(1), Expr::int(0))), None);
        assert_eq!(evaluate(&Expr::unary(UnaryOp::Neg, Expr::string("x"))), None);
    }

    #[test]
    fn short_circuit_ignores_the_unused_side() {
        let e = Expr::binary(BinOp::Or, Expr::string("hit"), Expr::var("never"));
        assert_eq!(evaluate(&e), Some(Value::from("hit")));
        let e = Expr::ternary(Expr::null(), Expr::var("never"), Expr::int(2));
        assert_eq!(evaluate(&e), Some(Value::Int(2)));
    }
}
