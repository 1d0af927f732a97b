//! Arithmetic, comparison and logic shared by the VM and the constant folder.

use std::cmp::Ordering;

use super::VmError;
use crate::ast::{BinOp, UnaryOp};
use crate::value::Value;

type VmResult<T> = Result<T, VmError>;

pub fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Eq => "eq",
        BinOp::Neq => "neq",
        BinOp::Lt => "lt",
        BinOp::Lte => "lte",
        BinOp::Gt => "gt",
        BinOp::Gte => "gte",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Concat => "concat",
    }
}

fn mismatch(op: BinOp, l: &Value, r: &Value) -> VmError {
    VmError::TypeMismatch { op: op_name(op), left: l.type_name(), right: r.type_name() }
}

/// Apply a binary operator to two evaluated operands.
///
/// `and`/`or` here are the eager forms: both operands are already evaluated
/// and the deciding operand is returned.
pub fn binary(op: BinOp, l: &Value, r: &Value) -> VmResult<Value> {
    match op {
        BinOp::Add => add(l, r),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arith(op, l, r),
        BinOp::Concat => Ok(Value::String(format!("{}{}", l.to_display_string(), r.to_display_string()))),
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::Neq => Ok(Value::Bool(l != r)),
        BinOp::Lt => compare(op, l, r).map(|o| Value::Bool(o == Some(Ordering::Less))),
        BinOp::Lte => compare(op, l, r).map(|o| Value::Bool(matches!(o, Some(Ordering::Less | Ordering::Equal)))),
        BinOp::Gt => compare(op, l, r).map(|o| Value::Bool(o == Some(Ordering::Greater))),
        BinOp::Gte => compare(op, l, r).map(|o| Value::Bool(matches!(o, Some(Ordering::Greater | Ordering::Equal)))),
        BinOp::And => Ok(if l.is_truthy() { r.clone() } else { l.clone() }),
        BinOp::Or => Ok(if l.is_truthy() { l.clone() } else { r.clone() }),
    }
}

fn add(l: &Value, r: &Value) -> VmResult<Value> {
    match (l, r) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", l.to_display_string(), r.to_display_string())))
        }
        _ => arith(BinOp::Add, l, r),
    }
}

fn arith(op: BinOp, l: &Value, r: &Value) -> VmResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
            float_arith(op, a, b)
        }
        _ => Err(mismatch(op, l, r)),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> VmResult<Value> {
    Ok(Value::Int(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div if b == 0 => return Err(VmError::DivisionByZero { op: "div" }),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Mod if b == 0 => return Err(VmError::DivisionByZero { op: "mod" }),
        BinOp::Mod => a.wrapping_rem(b),
        _ => return Err(VmError::TypeMismatch { op: op_name(op), left: "int", right: "int" }),
    }))
}

fn float_arith(op: BinOp, a: f64, b: f64) -> VmResult<Value> {
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Err(VmError::DivisionByZero { op: "div" }),
        BinOp::Div => a / b,
        BinOp::Mod if b == 0.0 => return Err(VmError::DivisionByZero { op: "mod" }),
        BinOp::Mod => a % b,
        _ => return Err(VmError::TypeMismatch { op: op_name(op), left: "float", right: "float" }),
    }))
}

// `None` only for NaN operands, which fail every ordering test.
fn compare(op: BinOp, l: &Value, r: &Value) -> VmResult<Option<Ordering>> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
            Ok(a.partial_cmp(&b))
        }
        _ => Err(mismatch(op, l, r)),
    }
}

pub fn unary(op: UnaryOp, v: &Value) -> VmResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => match v {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(VmError::UnaryTypeMismatch { op: "negate", operand: other.type_name() }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_promotion() {
        assert_eq!(binary(BinOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(binary(BinOp::Mul, &Value::Int(2), &Value::Float(1.5)).unwrap(), Value::Float(3.0));
        assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
    }

    #[test]
    fn int_overflow_wraps() {
        assert_eq!(binary(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap(), Value::Int(i64::MIN));
        assert_eq!(binary(BinOp::Div, &Value::Int(i64::MIN), &Value::Int(-1)).unwrap(), Value::Int(i64::MIN));
    }

    #[test]
    fn string_addition_concatenates() {
        assert_eq!(binary(BinOp::Add, &Value::from("n="), &Value::Int(4)).unwrap(), Value::from("n=4"));
        assert_eq!(binary(BinOp::Add, &Value::Float(1.5), &Value::from("x")).unwrap(), Value::from("1.5x"));
        assert_eq!(binary(BinOp::Concat, &Value::Int(1), &Value::Null).unwrap(), Value::from("1null"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(binary(BinOp::Div, &Value::Int(10), &Value::Int(0)), Err(VmError::DivisionByZero { .. })));
        assert!(matches!(binary(BinOp::Mod, &Value::Int(10), &Value::Int(0)), Err(VmError::DivisionByZero { .. })));
        assert!(matches!(binary(BinOp::Div, &Value::Float(1.0), &Value::Float(0.0)), Err(VmError::DivisionByZero { .. })));
    }

    #[test]
    fn arithmetic_type_mismatch_names_kinds() {
        let err = binary(BinOp::Sub, &Value::from("a"), &Value::Bool(true)).unwrap_err();
        assert_eq!(err.to_string(), "type mismatch in sub: string and bool");
    }

    #[test]
    fn comparisons() {
        assert_eq!(binary(BinOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinOp::Gte, &Value::from("b"), &Value::from("a")).unwrap(), Value::Bool(true));
        assert!(binary(BinOp::Lt, &Value::Int(1), &Value::from("2")).is_err());
        assert_eq!(binary(BinOp::Eq, &Value::Int(1), &Value::Float(1.0)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn eager_logic_returns_deciding_operand() {
        assert_eq!(binary(BinOp::And, &Value::Int(0), &Value::from("x")).unwrap(), Value::Int(0));
        assert_eq!(binary(BinOp::Or, &Value::Int(0), &Value::from("a")).unwrap(), Value::from("a"));
    }

    #[test]
    fn unary_ops() {
        assert_eq!(unary(UnaryOp::Not, &Value::Array(vec![])).unwrap(), Value::Bool(true));
        assert_eq!(unary(UnaryOp::Neg, &Value::Float(2.5)).unwrap(), Value::Float(-2.5));
        assert!(unary(UnaryOp::Neg, &Value::Null).is_err());
    }
}
