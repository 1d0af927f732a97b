//! Builtin function registry and the default property/method behaviour of
//! strings, arrays and objects.
//!
//! Builtins are lenient about argument kinds: a wrong kind yields a neutral
//! result (`null`, `0`, `-1` or `""`) rather than an error. Only arity is
//! enforced.

use super::VmError;
use crate::value::Value;

type VmResult<T> = Result<T, VmError>;

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    /// Same arguments always give the same result and nothing else is touched.
    pub pure: bool,
    func: fn(&[Value]) -> Value,
}

impl Builtin {
    pub fn check_arity(&self, got: usize) -> VmResult<()> {
        let ok = got >= self.min_args && self.max_args.is_none_or(|max| got <= max);
        if ok {
            return Ok(());
        }
        Err(VmError::Arity { function: self.name.to_string(), expected: self.arity(), got })
    }

    /// Accepted argument count: `2`, `1 to 3` or `at least 1`.
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", max),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

macro_rules! builtin {
    ($name:literal, $min:expr, $max:expr, $pure:expr, $func:expr) => {
        Builtin { name: $name, min_args: $min, max_args: $max, pure: $pure, func: $func }
    };
}

static BUILTINS: &[Builtin] = &[
    builtin!("string_toUpper", 1, Some(1), true, |a| map_str(&a[0], |s| s.to_uppercase())),
    builtin!("string_toLower", 1, Some(1), true, |a| map_str(&a[0], |s| s.to_lowercase())),
    builtin!("string_trim", 1, Some(1), true, |a| map_str(&a[0], |s| s.trim().to_string())),
    builtin!("string_substring", 2, Some(3), true, |a| substring(&a[0], &a[1], a.get(2))),
    builtin!("string_split", 2, Some(2), true, |a| split(&a[0], &a[1])),
    builtin!("string_length", 1, Some(1), true, |a| Value::Int(a[0].as_str().map_or(0, |s| s.chars().count() as i64))),
    builtin!("array_length", 1, Some(1), true, |a| Value::Int(as_array(&a[0]).map_or(0, |v| v.len() as i64))),
    builtin!("array_push", 2, Some(2), true, |a| push(&a[0], &a[1])),
    builtin!("array_pop", 1, Some(1), true, |a| as_array(&a[0]).and_then(|v| v.last().cloned()).unwrap_or_default()),
    builtin!("array_indexOf", 2, Some(2), true, |a| index_of(&a[0], &a[1])),
    builtin!("array_join", 1, Some(2), true, |a| join(&a[0], a.get(1))),
    builtin!("array_slice", 2, Some(3), true, |a| slice(&a[0], &a[1], a.get(2))),
    builtin!("array_reverse", 1, Some(1), true, |a| reverse(&a[0])),
    builtin!("math_abs", 1, Some(1), true, |a| abs(&a[0])),
    builtin!("math_min", 1, None, true, |a| extreme(a, std::cmp::Ordering::Less)),
    builtin!("math_max", 1, None, true, |a| extreme(a, std::cmp::Ordering::Greater)),
    builtin!("math_clamp", 3, Some(3), true, |a| clamp(&a[0], &a[1], &a[2])),
    builtin!("math_random", 0, Some(0), false, |_| Value::Int(fastrand::i64(0..=i32::MAX as i64))),
    builtin!("type_toInt", 1, Some(1), true, |a| to_int(&a[0])),
    builtin!("type_toString", 1, Some(1), true, |a| Value::String(a[0].to_display_string())),
    builtin!("type_typeof", 1, Some(1), true, |a| Value::from(a[0].type_name())),
];

/// Registry index of a builtin, used as the `CALL_BUILTIN` operand.
pub fn lookup(name: &str) -> Option<u16> {
    BUILTINS.iter().position(|b| b.name == name).map(|i| i as u16)
}

pub fn get(id: u16) -> Option<&'static Builtin> {
    BUILTINS.get(id as usize)
}

pub fn all() -> &'static [Builtin] {
    BUILTINS
}

pub fn is_pure(name: &str) -> bool {
    lookup(name).and_then(get).is_some_and(|b| b.pure)
}

pub fn call(id: u16, args: &[Value]) -> VmResult<Value> {
    let builtin = get(id).ok_or_else(|| VmError::BadOperand { reason: format!("no builtin with index {}", id) })?;
    builtin.check_arity(args.len())?;
    Ok((builtin.func)(args))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn map_str(v: &Value, f: impl FnOnce(&str) -> String) -> Value {
    v.as_str().map(|s| Value::String(f(s))).unwrap_or_default()
}

fn as_array(v: &Value) -> Option<&Vec<Value>> {
    match v {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn as_int(v: Option<&Value>) -> Option<i64> {
    match v {
        Some(Value::Int(n)) => Some(*n),
        _ => None,
    }
}

/// Character-based substring with both bounds clamped into range.
fn substring(s: &Value, start: &Value, end: Option<&Value>) -> Value {
    let (Some(s), Some(start)) = (s.as_str(), as_int(Some(start))) else {
        return Value::Null;
    };
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let start = start.clamp(0, len);
    let end = as_int(end).unwrap_or(len).clamp(start, len);
    Value::String(chars[start as usize..end as usize].iter().collect())
}

fn split(s: &Value, delim: &Value) -> Value {
    let (Some(s), Some(delim)) = (s.as_str(), delim.as_str()) else {
        return Value::Null;
    };
    let parts: Vec<Value> = if delim.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(delim).filter(|p| !p.is_empty()).map(Value::from).collect()
    };
    Value::Array(parts)
}

fn push(arr: &Value, item: &Value) -> Value {
    match as_array(arr) {
        Some(items) => {
            let mut out = items.clone();
            out.push(item.clone());
            Value::Array(out)
        }
        None => Value::Null,
    }
}

fn index_of(arr: &Value, needle: &Value) -> Value {
    let pos = as_array(arr).and_then(|items| items.iter().position(|v| v == needle));
    Value::Int(pos.map_or(-1, |p| p as i64))
}

fn join(arr: &Value, sep: Option<&Value>) -> Value {
    let Some(items) = as_array(arr) else {
        return Value::String(String::new());
    };
    let sep = sep.and_then(Value::as_str).unwrap_or(",");
    let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
    Value::String(parts.join(sep))
}

/// Negative bounds count from the end.
fn slice(arr: &Value, start: &Value, end: Option<&Value>) -> Value {
    let (Some(items), Some(start)) = (as_array(arr), as_int(Some(start))) else {
        return Value::Null;
    };
    let len = items.len() as i64;
    let resolve = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
    let start = resolve(start);
    let end = resolve(as_int(end).unwrap_or(len)).max(start);
    Value::Array(items[start as usize..end as usize].to_vec())
}

fn reverse(arr: &Value) -> Value {
    match as_array(arr) {
        Some(items) => Value::Array(items.iter().rev().cloned().collect()),
        None => Value::Null,
    }
}

fn abs(v: &Value) -> Value {
    match v {
        Value::Int(n) => Value::Int(n.wrapping_abs()),
        Value::Float(f) => Value::Float(f.abs()),
        _ => Value::Int(0),
    }
}

/// Smallest (`Less`) or largest (`Greater`) numeric argument. The result
/// keeps the kind of the winning argument; non-numbers are skipped.
fn extreme(args: &[Value], want: std::cmp::Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for v in args {
        let Some(x) = v.as_f64() else { continue };
        match best.and_then(Value::as_f64) {
            Some(b) if x.partial_cmp(&b) != Some(want) => {}
            _ => best = Some(v),
        }
    }
    best.cloned().unwrap_or(Value::Int(0))
}

fn clamp(v: &Value, lo: &Value, hi: &Value) -> Value {
    match (v, lo, hi) {
        (Value::Int(v), Value::Int(lo), Value::Int(hi)) => Value::Int((*v).max(*lo).min(*hi)),
        _ => match (v.as_f64(), lo.as_f64(), hi.as_f64()) {
            (Some(v), Some(lo), Some(hi)) => Value::Float(v.max(lo).min(hi)),
            _ => Value::Int(0),
        },
    }
}

fn to_int(v: &Value) -> Value {
    Value::Int(match v {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => *b as i64,
        Value::String(s) => leading_int(s),
        _ => 0,
    })
}

// Leading optional sign and digits; anything unparseable is 0.
fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    s[..end].parse().unwrap_or(0)
}

// ── Properties and methods ──────────────────────────────────────────

/// Default static property read: object keys, plus `length` on strings,
/// arrays and objects. `None` when the property does not exist.
pub fn property(object: &Value, name: &str) -> Option<Value> {
    match object {
        Value::Object(obj) => match obj.get(name) {
            Some(v) => Some(v.clone()),
            None if name == "length" => Some(Value::Int(obj.len() as i64)),
            None => None,
        },
        Value::Array(items) if name == "length" => Some(Value::Int(items.len() as i64)),
        Value::String(s) if name == "length" => Some(Value::Int(s.chars().count() as i64)),
        _ => None,
    }
}

const STRING_METHODS: &[&str] = &["length", "toUpperCase", "toLowerCase", "trim", "substring", "split", "includes"];
const ARRAY_METHODS: &[&str] = &["length", "push", "pop", "reverse", "indexOf", "join", "slice", "includes"];

/// Whether `name` is a builtin method on strings or arrays. All of them are
/// pure: receivers are values, so `push` returns a new array.
pub fn is_builtin_method(name: &str) -> bool {
    STRING_METHODS.contains(&name) || ARRAY_METHODS.contains(&name)
}

/// Default method dispatch for string and array receivers.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> VmResult<Value> {
    let arity = |min: usize, max: usize| -> VmResult<()> {
        if args.len() < min || args.len() > max {
            let expected = if min == max { min.to_string() } else { format!("{} to {}", min, max) };
            return Err(VmError::Arity { function: name.to_string(), expected, got: args.len() });
        }
        Ok(())
    };
    match receiver {
        Value::String(s) => match name {
            "length" => arity(0, 0).map(|_| Value::Int(s.chars().count() as i64)),
            "toUpperCase" => arity(0, 0).map(|_| Value::String(s.to_uppercase())),
            "toLowerCase" => arity(0, 0).map(|_| Value::String(s.to_lowercase())),
            "trim" => arity(0, 0).map(|_| Value::String(s.trim().to_string())),
            "substring" => arity(1, 2).map(|_| substring(receiver, &args[0], args.get(1))),
            "split" => arity(1, 1).map(|_| split(receiver, &args[0])),
            "includes" => arity(1, 1).map(|_| Value::Bool(args[0].as_str().is_some_and(|n| s.contains(n)))),
            _ => Err(VmError::UndefinedFunction { name: format!("string.{}", name) }),
        },
        Value::Array(items) => match name {
            "length" => arity(0, 0).map(|_| Value::Int(items.len() as i64)),
            "push" => arity(1, 1).map(|_| push(receiver, &args[0])),
            "pop" => arity(0, 0).map(|_| items.last().cloned().unwrap_or_default()),
            "reverse" => arity(0, 0).map(|_| reverse(receiver)),
            "indexOf" => arity(1, 1).map(|_| index_of(receiver, &args[0])),
            "join" => arity(0, 1).map(|_| join(receiver, args.first())),
            "slice" => arity(1, 2).map(|_| slice(receiver, &args[0], args.get(1))),
            "includes" => arity(1, 1).map(|_| Value::Bool(items.contains(&args[0]))),
            _ => Err(VmError::UndefinedFunction { name: format!("array.{}", name) }),
        },
        other => Err(VmError::InvalidReceiver {
            operation: format!("call method '{}'", name),
            kind: other.type_name(),
        }),
    }
}
