use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::compiler::{CompiledExpr, Instruction, KEEP, LOCAL, Opcode, POOLED};
use crate::value::{Object, Value};

pub mod builtins;
pub mod ops;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    #[error("undefined function: {name}")]
    UndefinedFunction { name: String },
    #[error("division by zero in {op}")]
    DivisionByZero { op: &'static str },
    #[error("type mismatch in {op}: {left} and {right}")]
    TypeMismatch { op: &'static str, left: &'static str, right: &'static str },
    #[error("cannot {op} a {operand}")]
    UnaryTypeMismatch { op: &'static str, operand: &'static str },
    #[error("cannot {operation} on null")]
    NullReceiver { operation: String },
    #[error("cannot {operation} on a {kind}")]
    InvalidReceiver { operation: String, kind: &'static str },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow: program declared a maximum depth of {max}")]
    StackOverflow { max: u32 },
    #[error("bad operand: {reason}")]
    BadOperand { reason: String },
    #[error("cannot assign to '{name}': context is read-only")]
    ReadOnly { name: String },
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity { function: String, expected: String, got: usize },
    #[error("{0}")]
    Host(String),
}

pub type VmResult<T> = Result<T, VmError>;

// ── Evaluation context ──────────────────────────────────────────────

/// Host side of an evaluation: variable storage, property reads and
/// function dispatch.
pub trait EvalContext {
    /// Current value of a variable. `scope` is set for `Scope::name` reads.
    fn resolve(&self, name: &str, scope: Option<&str>) -> Option<Value>;

    fn get_property(&self, object: &Value, name: &str) -> Option<Value> {
        builtins::property(object, name)
    }

    /// Call a context function, or a method when `receiver` is set.
    fn invoke(&mut self, name: &str, receiver: Option<&Value>, args: &[Value]) -> VmResult<Value> {
        match receiver {
            Some(r) => builtins::call_method(r, name, args),
            None => Err(VmError::UndefinedFunction { name: name.to_string() }),
        }
    }

    fn assign(&mut self, name: &str, scope: Option<&str>, value: Value) -> VmResult<()> {
        let _ = value;
        Err(VmError::ReadOnly { name: qualified(name, scope) })
    }
}

/// Plain maps work as contexts. Scoped variables live under `"scope:name"`.
impl<S: BuildHasher> EvalContext for HashMap<String, Value, S> {
    fn resolve(&self, name: &str, scope: Option<&str>) -> Option<Value> {
        match scope {
            Some(scope) => self.get(&format!("{scope}:{name}")).cloned(),
            None => self.get(name).cloned(),
        }
    }

    fn assign(&mut self, name: &str, scope: Option<&str>, value: Value) -> VmResult<()> {
        let key = match scope {
            Some(scope) => format!("{scope}:{name}"),
            None => name.to_string(),
        };
        self.insert(key, value);
        Ok(())
    }
}

pub(crate) fn qualified(name: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{scope}::{name}"),
        None => name.to_string(),
    }
}

// ── VM ──────────────────────────────────────────────────────────────

/// Run a compiled program against a context. The result is the value on
/// top of the stack at `HALT` (or end of code), or null when it is empty.
pub fn execute(program: &CompiledExpr, ctx: &mut dyn EvalContext) -> VmResult<Value> {
    Vm::new(program, ctx).run()
}

struct Vm<'p, 'c> {
    program: &'p CompiledExpr,
    ctx: &'c mut dyn EvalContext,
    stack: Vec<Value>,
    locals: Vec<Value>,
}

impl<'p, 'c> Vm<'p, 'c> {
    fn new(program: &'p CompiledExpr, ctx: &'c mut dyn EvalContext) -> Self {
        Vm {
            program,
            ctx,
            stack: Vec::with_capacity(program.max_stack_depth as usize),
            locals: vec![Value::Null; program.local_count as usize],
        }
    }

    fn push(&mut self, v: Value) -> VmResult<()> {
        if self.stack.len() >= self.program.max_stack_depth as usize {
            return Err(VmError::StackOverflow { max: self.program.max_stack_depth });
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: i32) -> VmResult<Vec<Value>> {
        let n = usize::try_from(n).map_err(|_| bad(format!("negative count {n}")))?;
        if n > self.stack.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn string(&self, idx: u16) -> VmResult<&'p str> {
        self.program.string(idx).ok_or_else(|| bad(format!("string index {idx} out of range")))
    }

    fn local(&mut self, slot: u16) -> VmResult<&mut Value> {
        self.locals.get_mut(slot as usize).ok_or_else(|| bad(format!("local slot {slot} out of range")))
    }

    fn run(mut self) -> VmResult<Value> {
        let program = self.program;
        let code = &program.code;
        let mut pc = 0usize;

        while pc < code.len() {
            let inst = code[pc];
            let mut next = pc + 1;

            match inst.opcode {
                Opcode::Nop => {}
                Opcode::Halt => break,

                // Literals
                Opcode::PushInt if inst.a == POOLED => {
                    let n = self
                        .program
                        .ints
                        .get(inst.b as usize)
                        .copied()
                        .ok_or_else(|| bad(format!("int index {} out of range", inst.b)))?;
                    self.push(Value::Int(n))?;
                }
                Opcode::PushInt => self.push(Value::Int(inst.c as i64))?,
                Opcode::PushFloat => {
                    let text = self.string(inst.b)?;
                    let f = text.parse::<f64>().map_err(|_| bad(format!("'{text}' is not a float")))?;
                    self.push(Value::Float(f))?;
                }
                Opcode::PushString => {
                    let s = self.string(inst.b)?;
                    self.push(Value::String(s.to_string()))?;
                }
                Opcode::PushBool => self.push(Value::Bool(inst.a != 0))?,
                Opcode::PushNull => self.push(Value::Null)?,

                // Stack shuffling
                Opcode::Dup => {
                    let top = self.peek()?.clone();
                    self.push(top)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Swap => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(VmError::StackUnderflow);
                    }
                    self.stack.swap(len - 1, len - 2);
                }

                // Variables
                Opcode::LoadVar => {
                    let name = self.string(inst.b)?;
                    let v = self
                        .ctx
                        .resolve(name, None)
                        .ok_or_else(|| VmError::UndefinedVariable { name: name.to_string() })?;
                    self.push(v)?;
                }
                Opcode::LoadGlobal => {
                    let name = self.string(inst.b)?;
                    let scope = self.string(scope_index(inst.c)?)?;
                    let v = self
                        .ctx
                        .resolve(name, Some(scope))
                        .ok_or_else(|| VmError::UndefinedVariable { name: qualified(name, Some(scope)) })?;
                    self.push(v)?;
                }
                Opcode::LoadLocal => {
                    let v = self.local(inst.b)?.clone();
                    self.push(v)?;
                }
                Opcode::StoreVar => {
                    let v = self.pop()?;
                    if inst.a == LOCAL {
                        *self.local(inst.b)? = v;
                    } else {
                        let name = self.string(inst.b)?;
                        let scope = match inst.c {
                            0 => None,
                            c => Some(self.string(scope_index(c - 1)?)?),
                        };
                        self.ctx.assign(name, scope, v)?;
                    }
                }

                // Properties
                Opcode::GetProp => {
                    let object = self.pop()?;
                    let name = self.string(inst.b)?;
                    let v = match object {
                        Value::Null => Value::Null,
                        ref o => self.ctx.get_property(o, name).unwrap_or_default(),
                    };
                    self.push(v)?;
                }
                Opcode::GetPropComputed => {
                    let key = self.pop()?;
                    let object = self.pop()?;
                    let v = self.computed(&object, &key)?;
                    self.push(v)?;
                }
                Opcode::GetIndex => {
                    let index = self.pop()?;
                    let array = self.pop()?;
                    let v = read_index(&array, &index)?;
                    self.push(v)?;
                }
                Opcode::SetProp => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let object = self.pop()?;
                    self.push(set_key(object, &key, value)?)?;
                }
                Opcode::DeleteProp => {
                    let key = self.pop()?;
                    let object = self.pop()?;
                    self.push(delete_key(object, &key)?)?;
                }

                // Calls
                Opcode::CallBuiltin => {
                    let args = self.pop_n(inst.c)?;
                    self.push(builtins::call(inst.b, &args)?)?;
                }
                Opcode::CallFunction => {
                    let name = self.string(inst.b)?;
                    let args = self.pop_n(inst.c)?;
                    let v = self.ctx.invoke(name, None, &args)?;
                    self.push(v)?;
                }
                Opcode::CallMethod => {
                    let name = self.string(inst.b)?;
                    let args = self.pop_n(inst.c)?;
                    let receiver = self.pop()?;
                    if receiver.is_null() {
                        return Err(VmError::NullReceiver { operation: format!("call method '{name}'") });
                    }
                    let v = self.ctx.invoke(name, Some(&receiver), &args)?;
                    self.push(v)?;
                }

                // Operators
                Opcode::Not => {
                    let v = self.pop()?;
                    self.push(Value::Bool(!v.is_truthy()))?;
                }
                Opcode::Negate => {
                    let v = self.pop()?;
                    self.push(ops::unary(crate::ast::UnaryOp::Neg, &v)?)?;
                }

                // Control flow
                Opcode::Jump => next = jump_target(pc, inst, code.len())?,
                Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                    let truthy = if inst.a & KEEP != 0 { self.peek()?.is_truthy() } else { self.pop()?.is_truthy() };
                    if truthy == (inst.opcode == Opcode::JumpIfTrue) {
                        next = jump_target(pc, inst, code.len())?;
                    }
                }

                // Containers
                Opcode::MakeArray => {
                    let items = self.pop_n(inst.c)?;
                    self.push(Value::Array(items))?;
                }
                Opcode::MakeObject => {
                    let flat = self.pop_n(inst.c.saturating_mul(2))?;
                    let mut obj = Object::with_capacity(flat.len() / 2);
                    let mut it = flat.into_iter();
                    while let (Some(k), Some(v)) = (it.next(), it.next()) {
                        obj.set(k.to_display_string(), v);
                    }
                    self.push(Value::Object(obj))?;
                }

                op => {
                    let bin = op.bin_op().ok_or_else(|| bad(format!("{} has no handler", op.name())))?;
                    let r = self.pop()?;
                    let l = self.pop()?;
                    self.push(ops::binary(bin, &l, &r)?)?;
                }
            }

            pc = next;
        }

        Ok(self.stack.pop().unwrap_or_default())
    }

    fn computed(&self, object: &Value, key: &Value) -> VmResult<Value> {
        match (object, key) {
            (Value::Null, _) => Err(VmError::NullReceiver { operation: "read a computed member".to_string() }),
            (Value::Object(_), _) => {
                Ok(self.ctx.get_property(object, &key.to_display_string()).unwrap_or_default())
            }
            (Value::Array(_) | Value::String(_), Value::Int(_)) => read_index(object, key),
            (Value::Array(_) | Value::String(_), Value::String(name)) => {
                Ok(self.ctx.get_property(object, name).unwrap_or_default())
            }
            (_, key) => Err(VmError::InvalidReceiver {
                operation: format!("read member with a {} key", key.type_name()),
                kind: object.type_name(),
            }),
        }
    }
}

fn bad(reason: String) -> VmError {
    VmError::BadOperand { reason }
}

fn scope_index(c: i32) -> VmResult<u16> {
    u16::try_from(c).map_err(|_| bad(format!("scope index {c} out of range")))
}

fn jump_target(pc: usize, inst: Instruction, len: usize) -> VmResult<usize> {
    let target = inst.jump_target(pc);
    if target < 0 || target as usize > len {
        return Err(bad(format!("jump from {pc} to {target} leaves the program")));
    }
    Ok(target as usize)
}

/// `a[i]` on arrays and strings, `o[k]` on objects. Out of range or missing
/// keys read as null.
fn read_index(container: &Value, index: &Value) -> VmResult<Value> {
    match (container, index) {
        (Value::Array(items), Value::Int(i)) => {
            Ok(usize::try_from(*i).ok().and_then(|i| items.get(i)).cloned().unwrap_or_default())
        }
        (Value::String(s), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default()),
        (Value::Object(obj), key) => Ok(obj.get(&key.to_display_string()).cloned().unwrap_or_default()),
        (Value::Null, _) => Err(VmError::NullReceiver { operation: "index".to_string() }),
        (Value::Array(_) | Value::String(_), key) => Err(VmError::TypeMismatch {
            op: "index",
            left: container.type_name(),
            right: key.type_name(),
        }),
        (other, _) => Err(VmError::InvalidReceiver { operation: "index".to_string(), kind: other.type_name() }),
    }
}

fn set_key(object: Value, key: &Value, value: Value) -> VmResult<Value> {
    match (object, key) {
        (Value::Object(mut obj), key) => {
            obj.set(key.to_display_string(), value);
            Ok(Value::Object(obj))
        }
        (Value::Array(mut items), Value::Int(i)) => {
            let len = items.len();
            match usize::try_from(*i) {
                Ok(idx) if idx < len => items[idx] = value,
                Ok(idx) if idx == len => items.push(value),
                _ => return Err(VmError::IndexOutOfRange { index: *i, len }),
            }
            Ok(Value::Array(items))
        }
        (Value::Null, _) => Err(VmError::NullReceiver { operation: "set a member".to_string() }),
        (other, _) => Err(VmError::InvalidReceiver { operation: "set a member".to_string(), kind: other.type_name() }),
    }
}

fn delete_key(object: Value, key: &Value) -> VmResult<Value> {
    match (object, key) {
        (Value::Object(mut obj), key) => {
            obj.remove(&key.to_display_string());
            Ok(Value::Object(obj))
        }
        (Value::Array(mut items), Value::Int(i)) => {
            if let Ok(idx) = usize::try_from(*i) {
                if idx < items.len() {
                    items.remove(idx);
                }
            }
            Ok(Value::Array(items))
        }
        (Value::Null, _) => Err(VmError::NullReceiver { operation: "delete a member".to_string() }),
        (other, _) => Err(VmError::InvalidReceiver { operation: "delete a member".to_string(), kind: other.type_name() }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, Stmt};
    use crate::compiler::{CompileOptions, compile, compile_block, compile_with};
    use crate::parser;

    type Vars = HashMap<String, Value>;

    fn vars(pairs: &[(&str, Value)]) -> Vars {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn eval_in(src: &str, ctx: &mut Vars) -> VmResult<Value> {
        let expr = parser::expression(src).unwrap();
        execute(&compile(&expr).unwrap(), ctx)
    }

    fn eval(src: &str) -> Value {
        eval_in(src, &mut Vars::new()).unwrap()
    }

    fn run(src: &str, ctx: &mut Vars) -> VmResult<Value> {
        let stmts = parser::statements(src).unwrap();
        execute(&compile_block(&stmts, &CompileOptions::default()).unwrap(), ctx)
    }

    #[test]
    fn price_times_quantity_threshold() {
        let mut ctx = vars(&[("price", Value::Int(25)), ("qty", Value::Int(4))]);
        assert_eq!(eval_in("(price * qty) >= 100", &mut ctx), Ok(Value::Bool(true)));
        ctx.insert("qty".into(), Value::Int(3));
        assert_eq!(eval_in("(price * qty) >= 100", &mut ctx), Ok(Value::Bool(false)));
    }

    #[test]
    fn division_by_zero_at_runtime() {
        assert_eq!(eval_in("10 / 0", &mut Vars::new()), Err(VmError::DivisionByZero { op: "div" }));
    }

    #[test]
    fn ternary_uses_truthiness() {
        assert_eq!(eval("0 ? 'yes' : 'no'"), Value::from("no"));
        assert_eq!(eval("'' ? 1 : 2"), Value::Int(2));
        assert_eq!(eval("[] ? 1 : 2"), Value::Int(2));
        assert_eq!(eval("0.5 ? 1 : 2"), Value::Int(1));
    }

    #[test]
    fn short_circuit_skips_the_right_side() {
        // `boom` is not defined; reaching it would fail.
        let mut ctx = vars(&[("flag", Value::Bool(false))]);
        assert_eq!(eval_in("flag && boom()", &mut ctx), Ok(Value::Bool(false)));
        assert_eq!(eval_in("!flag || boom()", &mut ctx), Ok(Value::Bool(true)));
        assert_eq!(eval_in("0 || 'a'", &mut ctx), Ok(Value::from("a")));
    }

    #[test]
    fn unresolved_names_are_errors() {
        assert_eq!(eval_in("missing + 1", &mut Vars::new()), Err(VmError::UndefinedVariable { name: "missing".into() }));
        assert_eq!(eval_in("nope(1)", &mut Vars::new()), Err(VmError::UndefinedFunction { name: "nope".into() }));
    }

    #[test]
    fn scoped_reads_use_the_scope_key() {
        let mut ctx = vars(&[("Counter:value", Value::Int(7)), ("value", Value::Int(1))]);
        assert_eq!(eval_in("Counter::value + value", &mut ctx), Ok(Value::Int(8)));
        let err = eval_in("Other::value", &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: Other::value");
    }

    #[test]
    fn member_access_rules() {
        let user: Value = serde_json::json!({"name": "Ada", "tags": ["x", "y"]}).into();
        let mut ctx = vars(&[("user", user), ("none", Value::Null)]);
        assert_eq!(eval_in("user.name", &mut ctx), Ok(Value::from("Ada")));
        assert_eq!(eval_in("user.age", &mut ctx), Ok(Value::Null));
        assert_eq!(eval_in("user['name']", &mut ctx), Ok(Value::from("Ada")));
        assert_eq!(eval_in("user.tags[1]", &mut ctx), Ok(Value::from("y")));
        assert_eq!(eval_in("user.tags[5]", &mut ctx), Ok(Value::Null));
        assert_eq!(eval_in("user.tags.length", &mut ctx), Ok(Value::Int(2)));
        assert_eq!(eval_in("none.name", &mut ctx), Ok(Value::Null));
        assert!(matches!(eval_in("none['name']", &mut ctx), Err(VmError::NullReceiver { .. })));
        assert!(matches!(eval_in("none.trim()", &mut ctx), Err(VmError::NullReceiver { .. })));
    }

    #[test]
    fn index_nodes_read_arrays() {
        let mut ctx = vars(&[("xs", Value::Array(vec![Value::Int(10), Value::Int(20)]))]);
        let e = Expr::index(Expr::var("xs"), Expr::int(1));
        assert_eq!(execute(&compile(&e).unwrap(), &mut ctx), Ok(Value::Int(20)));
        let e = Expr::property("xs", "length");
        assert_eq!(execute(&compile(&e).unwrap(), &mut ctx), Ok(Value::Int(2)));
    }

    #[test]
    fn builtins_and_methods() {
        assert_eq!(eval("math_max(3, 9, 4)"), Value::Int(9));
        assert_eq!(eval("string_toUpper('abc')"), Value::from("ABC"));
        assert_eq!(eval("'  hi '.trim().length"), Value::Int(2));
        assert_eq!(eval("[1, 2, 3].join('-')"), Value::from("1-2-3"));
        assert!(matches!(eval_in("math_abs()", &mut Vars::new()), Err(VmError::Arity { .. })));
    }

    #[test]
    fn literals_build_containers() {
        assert_eq!(eval("{a: 1, 'b': [true, null]}.b[0]"), Value::Bool(true));
        assert_eq!(eval("[1, 2.5, 'x']").to_string(), "[1, 2.5, \"x\"]");
    }

    #[test]
    fn results_match_with_and_without_optimizations() {
        let plain = CompileOptions { fold_constants: false, eliminate_dead_code: false, debug_info: false };
        for src in ["1 + 2 * 3", "true ? 'a' : missing", "(2 > 1) && 'yes'", "-(4 % 3) + 0.5", "'n=' + 3"] {
            let e = parser::expression(src).unwrap();
            let a = execute(&compile(&e).unwrap(), &mut Vars::new());
            let b = execute(&compile_with(&e, &plain).unwrap(), &mut Vars::new());
            assert_eq!(a, b, "{src}");
        }
    }

    #[test]
    fn statements_assign_and_loop() {
        let mut ctx = vars(&[("xs", serde_json::json!([1, 2, 3, 4]).into())]);
        let src = "total = 0\nfor (x in xs) {\n  if (x == 3) { continue }\n  total += x\n}\nreturn total";
        assert_eq!(run(src, &mut ctx), Ok(Value::Int(7)));
        assert_eq!(ctx.get("total"), Some(&Value::Int(7)));
    }

    #[test]
    fn while_with_break() {
        let mut ctx = Vars::new();
        let src = "i = 0\nwhile (true) {\n  i += 1\n  if (i >= 5) { break }\n}\nreturn i";
        assert_eq!(run(src, &mut ctx), Ok(Value::Int(5)));
    }

    #[test]
    fn delete_writes_back() {
        let mut ctx = vars(&[("o", serde_json::json!({"a": 1, "b": 2}).into())]);
        run("delete o.a", &mut ctx).unwrap();
        assert_eq!(ctx.get("o"), Some(&Value::from(serde_json::json!({"b": 2}))));
    }

    #[test]
    fn block_without_return_is_null() {
        assert_eq!(run("x = 1", &mut Vars::new()), Ok(Value::Null));
    }

    #[test]
    fn read_only_context_rejects_assignment() {
        struct Fixed;
        impl EvalContext for Fixed {
            fn resolve(&self, _: &str, _: Option<&str>) -> Option<Value> {
                Some(Value::Int(1))
            }
        }
        let stmts = vec![Stmt::assign("x", Expr::int(2))];
        let program = compile_block(&stmts, &CompileOptions::default()).unwrap();
        assert_eq!(execute(&program, &mut Fixed), Err(VmError::ReadOnly { name: "x".into() }));
    }

    #[test]
    fn hand_built_bytecode_is_checked() {
        let program = CompiledExpr {
            code: vec![Instruction::simple(Opcode::Add), Instruction::simple(Opcode::Halt)],
            strings: vec![],
            ints: vec![],
            max_stack_depth: 2,
            local_count: 0,
            debug: None,
        };
        assert_eq!(execute(&program, &mut Vars::new()), Err(VmError::StackUnderflow));

        let program = CompiledExpr {
            code: vec![Instruction::simple(Opcode::PushNull), Instruction::simple(Opcode::PushNull)],
            max_stack_depth: 1,
            ..program
        };
        assert_eq!(execute(&program, &mut Vars::new()), Err(VmError::StackOverflow { max: 1 }));
    }

    #[test]
    fn eager_and_or_opcodes() {
        let e = Expr::binary(BinOp::And, Expr::var("a"), Expr::var("b"));
        let mut ctx = vars(&[("a", Value::Int(1)), ("b", Value::from("b"))]);
        assert_eq!(execute(&compile(&e).unwrap(), &mut ctx), Ok(Value::from("b")));
        let program = CompiledExpr {
            code: vec![
                Instruction::new(Opcode::PushInt, 0, 0, 0),
                Instruction::new(Opcode::PushInt, 0, 0, 5),
                Instruction::simple(Opcode::Or),
            ],
            strings: vec![],
            ints: vec![],
            max_stack_depth: 2,
            local_count: 0,
            debug: None,
        };
        assert_eq!(execute(&program, &mut Vars::new()), Ok(Value::Int(5)));
    }
}
