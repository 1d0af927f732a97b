//! Structural fingerprints and variable dependency sets for expressions.
//!
//! Two trees with the same shape and payloads produce the same key no matter
//! where they were allocated. The cache uses the key as entry identity.

use super::{BinOp, Expr, UnaryOp};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the UTF-8 bytes of `s`.
pub fn fnv1a(s: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Order-sensitive combine: `combine(a, b) != combine(b, a)` in general.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    a ^ b
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(a << 6)
        .wrapping_add(a >> 2)
}

// Per-kind seeds. Stable across releases since serialized ASTs must keep
// hashing to the same key.
fn kind_tag(expr: &Expr) -> u64 {
    match expr {
        Expr::Int { .. } => 0,
        Expr::Float { .. } => 1,
        Expr::String { .. } => 2,
        Expr::Bool { .. } => 3,
        Expr::Null => 4,
        Expr::Var { .. } => 5,
        Expr::Property { .. } => 6,
        Expr::Index { .. } => 7,
        Expr::Binary { .. } => 8,
        Expr::Unary { .. } => 9,
        Expr::Call { .. } => 10,
        Expr::Ternary { .. } => 11,
        Expr::Member { .. } => 12,
        Expr::Computed { .. } => 13,
        Expr::MethodCall { .. } => 14,
        Expr::Group { .. } => 15,
        Expr::Array { .. } => 16,
        Expr::Object { .. } => 17,
        Expr::Arrow { .. } => 18,
    }
}

fn bin_op_tag(op: BinOp) -> u64 {
    op as u64
}

fn unary_op_tag(op: UnaryOp) -> u64 {
    op as u64
}

/// Structural cache key of an expression tree.
pub fn structural_key(expr: &Expr) -> u64 {
    let mut hash = kind_tag(expr);
    match expr {
        Expr::Int { value } => hash = hash_combine(hash, *value as u64),
        // Every NaN payload is one literal.
        Expr::Float { value } if value.is_nan() => hash = hash_combine(hash, f64::NAN.to_bits()),
        Expr::Float { value } => hash = hash_combine(hash, value.to_bits()),
        Expr::String { value } => hash = hash_combine(hash, fnv1a(value)),
        Expr::Bool { value } => hash = hash_combine(hash, *value as u64),
        Expr::Null => {}
        Expr::Var { name, scope } => {
            hash = hash_combine(hash, fnv1a(name));
            // Scoped and unscoped reads compile to different loads.
            if let Some(scope) = scope {
                hash = hash_combine(hash, fnv1a(scope));
            }
        }
        Expr::Property { object, field } => {
            hash = hash_combine(hash, fnv1a(object));
            hash = hash_combine(hash, fnv1a(field));
        }
        Expr::Member { object, property } => {
            hash = hash_combine(hash, structural_key(object));
            hash = hash_combine(hash, property.hash());
        }
        Expr::Computed { object, key } => {
            hash = hash_combine(hash, structural_key(object));
            hash = hash_combine(hash, structural_key(key));
        }
        Expr::Index { array, index } => {
            hash = hash_combine(hash, structural_key(array));
            hash = hash_combine(hash, structural_key(index));
        }
        Expr::Binary { op, left, right } => {
            hash = hash_combine(hash, bin_op_tag(*op));
            hash = hash_combine(hash, structural_key(left));
            hash = hash_combine(hash, structural_key(right));
        }
        Expr::Unary { op, operand } => {
            hash = hash_combine(hash, unary_op_tag(*op));
            hash = hash_combine(hash, structural_key(operand));
        }
        Expr::Ternary { condition, then, otherwise } => {
            hash = hash_combine(hash, structural_key(condition));
            hash = hash_combine(hash, structural_key(then));
            hash = hash_combine(hash, structural_key(otherwise));
        }
        Expr::Call { function, args } => {
            hash = hash_combine(hash, fnv1a(function));
            hash = hash_combine(hash, args.len() as u64);
            for arg in args {
                hash = hash_combine(hash, structural_key(arg));
            }
        }
        Expr::MethodCall { receiver, method, args } => {
            hash = hash_combine(hash, structural_key(receiver));
            hash = hash_combine(hash, fnv1a(method));
            hash = hash_combine(hash, args.len() as u64);
            for arg in args {
                hash = hash_combine(hash, structural_key(arg));
            }
        }
        Expr::Group { inner } => hash = hash_combine(hash, structural_key(inner)),
        Expr::Array { elements } => {
            hash = hash_combine(hash, elements.len() as u64);
            for e in elements {
                hash = hash_combine(hash, structural_key(e));
            }
        }
        Expr::Object { keys, values } => {
            hash = hash_combine(hash, keys.len() as u64);
            for k in keys {
                hash = hash_combine(hash, fnv1a(k));
            }
            hash = hash_combine(hash, values.len() as u64);
            for v in values {
                hash = hash_combine(hash, structural_key(v));
            }
        }
        Expr::Arrow { params, body, expression_body } => {
            hash = hash_combine(hash, params.len() as u64);
            for p in params {
                hash = hash_combine(hash, fnv1a(p));
            }
            hash = hash_combine(hash, structural_key(body));
            hash = hash_combine(hash, *expression_body as u64);
        }
    }
    hash
}

/// Distinct name hashes of every variable the expression reads, in first-seen
/// order. Scoped reads depend on the bare name.
pub fn dependencies(expr: &Expr) -> Vec<u64> {
    let mut deps = Vec::new();
    collect_dependencies(expr, &mut deps);
    deps
}

fn push_dep(deps: &mut Vec<u64>, name: &str) {
    let h = fnv1a(name);
    if !deps.contains(&h) {
        deps.push(h);
    }
}

fn collect_dependencies(expr: &Expr, deps: &mut Vec<u64>) {
    match expr {
        Expr::Int { .. } | Expr::Float { .. } | Expr::String { .. } | Expr::Bool { .. } | Expr::Null => {}
        Expr::Var { name, .. } => push_dep(deps, name),
        Expr::Property { object, .. } => push_dep(deps, object),
        Expr::Member { object, .. } => collect_dependencies(object, deps),
        Expr::Computed { object, key } => {
            collect_dependencies(object, deps);
            collect_dependencies(key, deps);
        }
        Expr::Index { array, index } => {
            collect_dependencies(array, deps);
            collect_dependencies(index, deps);
        }
        Expr::Binary { left, right, .. } => {
            collect_dependencies(left, deps);
            collect_dependencies(right, deps);
        }
        Expr::Unary { operand, .. } => collect_dependencies(operand, deps),
        Expr::Ternary { condition, then, otherwise } => {
            collect_dependencies(condition, deps);
            collect_dependencies(then, deps);
            collect_dependencies(otherwise, deps);
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_dependencies(a, deps)),
        Expr::MethodCall { receiver, args, .. } => {
            collect_dependencies(receiver, deps);
            args.iter().for_each(|a| collect_dependencies(a, deps));
        }
        Expr::Group { inner } => collect_dependencies(inner, deps),
        Expr::Array { elements } => elements.iter().for_each(|e| collect_dependencies(e, deps)),
        Expr::Object { values, .. } => values.iter().for_each(|v| collect_dependencies(v, deps)),
        // Parameters shadow outer names; the body is never evaluated anyway.
        Expr::Arrow { .. } => {}
    }
}
