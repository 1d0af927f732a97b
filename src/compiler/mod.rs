use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::*;
use crate::value::{Value, format_float};
use crate::vm::builtins;

mod dce;
pub mod disasm;
pub mod encode;
pub(crate) mod fold;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unsupported expression node: {kind}")]
    Unsupported { kind: &'static str },
    #[error("malformed {kind} node: {reason}")]
    Malformed { kind: &'static str, reason: String },
    #[error("{pool} pool overflow: more than {max} entries")]
    PoolOverflow { pool: &'static str, max: usize },
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
}

type CompileResult<T> = Result<T, CompileError>;

// ── Opcodes ─────────────────────────────────────────────────────────
//
// Numbering is part of the bytecode format. New opcodes go after HALT.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0,
    PushInt,
    PushFloat,
    PushString,
    PushBool,
    PushNull,
    Dup,
    Pop,
    Swap,
    LoadVar,
    LoadLocal,
    LoadGlobal,
    StoreVar,
    GetProp,
    GetPropComputed,
    SetProp,
    CallMethod,
    CallBuiltin,
    CallFunction,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    Negate,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    GetIndex,
    Halt,
    MakeArray,
    MakeObject,
    DeleteProp,
}

impl Opcode {
    pub const ALL: [Opcode; 43] = [
        Opcode::Nop,
        Opcode::PushInt,
        Opcode::PushFloat,
        Opcode::PushString,
        Opcode::PushBool,
        Opcode::PushNull,
        Opcode::Dup,
        Opcode::Pop,
        Opcode::Swap,
        Opcode::LoadVar,
        Opcode::LoadLocal,
        Opcode::LoadGlobal,
        Opcode::StoreVar,
        Opcode::GetProp,
        Opcode::GetPropComputed,
        Opcode::SetProp,
        Opcode::CallMethod,
        Opcode::CallBuiltin,
        Opcode::CallFunction,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Concat,
        Opcode::Eq,
        Opcode::Neq,
        Opcode::Lt,
        Opcode::Lte,
        Opcode::Gt,
        Opcode::Gte,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Negate,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::JumpIfTrue,
        Opcode::GetIndex,
        Opcode::Halt,
        Opcode::MakeArray,
        Opcode::MakeObject,
        Opcode::DeleteProp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PushInt => "PUSH_INT",
            Opcode::PushFloat => "PUSH_FLOAT",
            Opcode::PushString => "PUSH_STRING",
            Opcode::PushBool => "PUSH_BOOL",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::Dup => "DUP",
            Opcode::Pop => "POP",
            Opcode::Swap => "SWAP",
            Opcode::LoadVar => "LOAD_VAR",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreVar => "STORE_VAR",
            Opcode::GetProp => "GET_PROP",
            Opcode::GetPropComputed => "GET_PROP_COMPUTED",
            Opcode::SetProp => "SET_PROP",
            Opcode::CallMethod => "CALL_METHOD",
            Opcode::CallBuiltin => "CALL_BUILTIN",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Concat => "CONCAT",
            Opcode::Eq => "EQ",
            Opcode::Neq => "NEQ",
            Opcode::Lt => "LT",
            Opcode::Lte => "LTE",
            Opcode::Gt => "GT",
            Opcode::Gte => "GTE",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Negate => "NEGATE",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfFalse => "JUMP_IF_FALSE",
            Opcode::JumpIfTrue => "JUMP_IF_TRUE",
            Opcode::GetIndex => "GET_INDEX",
            Opcode::Halt => "HALT",
            Opcode::MakeArray => "MAKE_ARRAY",
            Opcode::MakeObject => "MAKE_OBJECT",
            Opcode::DeleteProp => "DELETE_PROP",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue)
    }

    /// The binary operator an arithmetic/comparison opcode applies.
    pub fn bin_op(self) -> Option<BinOp> {
        Some(match self {
            Opcode::Add => BinOp::Add,
            Opcode::Sub => BinOp::Sub,
            Opcode::Mul => BinOp::Mul,
            Opcode::Div => BinOp::Div,
            Opcode::Mod => BinOp::Mod,
            Opcode::Concat => BinOp::Concat,
            Opcode::Eq => BinOp::Eq,
            Opcode::Neq => BinOp::Neq,
            Opcode::Lt => BinOp::Lt,
            Opcode::Lte => BinOp::Lte,
            Opcode::Gt => BinOp::Gt,
            Opcode::Gte => BinOp::Gte,
            Opcode::And => BinOp::And,
            Opcode::Or => BinOp::Or,
            _ => return None,
        })
    }

    fn for_bin_op(op: BinOp) -> Opcode {
        match op {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Sub,
            BinOp::Mul => Opcode::Mul,
            BinOp::Div => Opcode::Div,
            BinOp::Mod => Opcode::Mod,
            BinOp::Concat => Opcode::Concat,
            BinOp::Eq => Opcode::Eq,
            BinOp::Neq => Opcode::Neq,
            BinOp::Lt => Opcode::Lt,
            BinOp::Lte => Opcode::Lte,
            BinOp::Gt => Opcode::Gt,
            BinOp::Gte => Opcode::Gte,
            BinOp::And => Opcode::And,
            BinOp::Or => Opcode::Or,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Opcode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

// ── Instruction encoding ────────────────────────────────────────────
//
// [opcode:8 | a:8 | b:16 | c:32], 8 bytes, little endian on the wire.
//   a  small operand: bool literal, pooled/keep/local flags
//   b  pool index, local slot or builtin id
//   c  immediate int, jump offset (relative to the jump itself) or count

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: u8,
    pub b: u16,
    pub c: i32,
}

const _: () = assert!(std::mem::size_of::<Instruction>() == 8);

impl Instruction {
    pub const fn new(opcode: Opcode, a: u8, b: u16, c: i32) -> Self {
        Instruction { opcode, a, b, c }
    }

    pub const fn simple(opcode: Opcode) -> Self {
        Instruction::new(opcode, 0, 0, 0)
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let b = self.b.to_le_bytes();
        let c = self.c.to_le_bytes();
        [self.opcode as u8, self.a, b[0], b[1], c[0], c[1], c[2], c[3]]
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self, u8> {
        Ok(Instruction {
            opcode: Opcode::try_from(bytes[0])?,
            a: bytes[1],
            b: u16::from_le_bytes([bytes[2], bytes[3]]),
            c: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Absolute target of a jump at `pc`.
    pub fn jump_target(self, pc: usize) -> i64 {
        pc as i64 + self.c as i64
    }

    /// Values popped and pushed when executed.
    pub fn stack_effect(self) -> (u32, u32) {
        let n = self.c.max(0) as u32;
        match self.opcode {
            Opcode::Nop | Opcode::Jump | Opcode::Halt => (0, 0),
            Opcode::PushInt
            | Opcode::PushFloat
            | Opcode::PushString
            | Opcode::PushBool
            | Opcode::PushNull
            | Opcode::LoadVar
            | Opcode::LoadLocal
            | Opcode::LoadGlobal => (0, 1),
            Opcode::Dup => (1, 2),
            Opcode::Pop | Opcode::StoreVar => (1, 0),
            Opcode::Swap => (2, 2),
            Opcode::GetProp | Opcode::Not | Opcode::Negate => (1, 1),
            Opcode::GetPropComputed | Opcode::GetIndex | Opcode::DeleteProp => (2, 1),
            Opcode::SetProp => (3, 1),
            Opcode::CallMethod => (n + 1, 1),
            Opcode::CallBuiltin | Opcode::CallFunction | Opcode::MakeArray => (n, 1),
            Opcode::MakeObject => (2 * n, 1),
            Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                if self.a & KEEP != 0 { (0, 0) } else { (1, 0) }
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Concat
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Lt
            | Opcode::Lte
            | Opcode::Gt
            | Opcode::Gte
            | Opcode::And
            | Opcode::Or => (2, 1),
        }
    }
}

/// `PUSH_INT`: `b` indexes the int pool instead of `c` holding the value.
pub const POOLED: u8 = 1;
/// Conditional jumps: leave the tested value on the stack.
pub const KEEP: u8 = 1;
/// `STORE_VAR`: `b` is a local slot rather than a name.
pub const LOCAL: u8 = 1;

// ── Compiled program ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    /// JSON of the tree the program was compiled from.
    pub source: String,
    /// Statement number (1-based, preorder) per instruction.
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    pub code: Vec<Instruction>,
    /// Names, string literals and float literal text.
    pub strings: Vec<String>,
    /// Integer literals outside the `i32` immediate range.
    pub ints: Vec<i64>,
    pub max_stack_depth: u32,
    pub local_count: u16,
    pub debug: Option<DebugInfo>,
}

impl CompiledExpr {
    pub fn string(&self, idx: u16) -> Option<&str> {
        self.strings.get(idx as usize).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub fold_constants: bool,
    pub eliminate_dead_code: bool,
    pub debug_info: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { fold_constants: true, eliminate_dead_code: true, debug_info: false }
    }
}

/// Compile an expression with default options.
pub fn compile(expr: &Expr) -> CompileResult<CompiledExpr> {
    compile_with(expr, &CompileOptions::default())
}

pub fn compile_with(expr: &Expr, options: &CompileOptions) -> CompileResult<CompiledExpr> {
    let mut c = Compiler::new(options);
    c.line = 1;
    c.compile_expr(expr)?;
    c.emit(Instruction::simple(Opcode::Halt));
    let source = if options.debug_info { serde_json::to_string(expr).ok() } else { None };
    c.finish(source)
}

/// Compile a statement list. The program's result is the value of the
/// `return` that ends it, or null.
pub fn compile_block(stmts: &[Stmt], options: &CompileOptions) -> CompileResult<CompiledExpr> {
    let mut c = Compiler::new(options);
    c.compile_stmts(stmts)?;
    c.emit(Instruction::simple(Opcode::Halt));
    let source = if options.debug_info { serde_json::to_string(stmts).ok() } else { None };
    c.finish(source)
}

// ── Compiler ────────────────────────────────────────────────────────

#[derive(Default)]
struct LoopLabels {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

struct Compiler<'o> {
    options: &'o CompileOptions,
    code: Vec<Instruction>,
    lines: Vec<u32>,
    line: u32,
    strings: Vec<String>,
    string_index: FxHashMap<String, u16>,
    ints: Vec<i64>,
    depth: u32,
    max_depth: u32,
    locals: Vec<(String, u16)>,
    next_slot: u16,
    local_count: u16,
    loops: Vec<LoopLabels>,
}

impl<'o> Compiler<'o> {
    fn new(options: &'o CompileOptions) -> Self {
        Compiler {
            options,
            code: Vec::new(),
            lines: Vec::new(),
            line: 0,
            strings: Vec::new(),
            string_index: FxHashMap::default(),
            ints: Vec::new(),
            depth: 0,
            max_depth: 0,
            locals: Vec::new(),
            next_slot: 0,
            local_count: 0,
            loops: Vec::new(),
        }
    }

    fn finish(mut self, source: Option<String>) -> CompileResult<CompiledExpr> {
        if self.options.eliminate_dead_code {
            let removed = dce::eliminate(&mut self.code, &mut self.lines);
            if removed > 0 {
                tracing::trace!(removed, "dead instructions removed");
            }
        }
        tracing::debug!(
            instructions = self.code.len(),
            strings = self.strings.len(),
            ints = self.ints.len(),
            max_stack = self.max_depth,
            "compiled program"
        );
        let debug = source.map(|source| DebugInfo { source, lines: self.lines });
        Ok(CompiledExpr {
            code: self.code,
            strings: self.strings,
            ints: self.ints,
            max_stack_depth: self.max_depth,
            local_count: self.local_count,
            debug,
        })
    }

    // ---- Emission ----

    fn emit(&mut self, inst: Instruction) -> usize {
        let (pops, pushes) = inst.stack_effect();
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        let idx = self.code.len();
        self.code.push(inst);
        self.lines.push(self.line);
        idx
    }

    fn emit_op(&mut self, opcode: Opcode) -> usize {
        self.emit(Instruction::simple(opcode))
    }

    fn emit_jump(&mut self, opcode: Opcode, a: u8) -> usize {
        self.emit(Instruction::new(opcode, a, 0, 0))
    }

    fn emit_jump_to(&mut self, target: usize) {
        let pc = self.code.len();
        self.emit(Instruction::new(Opcode::Jump, 0, 0, target as i32 - pc as i32));
    }

    fn patch_jump(&mut self, jump_pos: usize) {
        let target = self.code.len();
        self.code[jump_pos].c = target as i32 - jump_pos as i32;
    }

    fn intern(&mut self, s: &str) -> CompileResult<u16> {
        if let Some(&idx) = self.string_index.get(s) {
            return Ok(idx);
        }
        let idx = u16::try_from(self.strings.len())
            .map_err(|_| CompileError::PoolOverflow { pool: "string", max: u16::MAX as usize })?;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        Ok(idx)
    }

    fn push_int(&mut self, n: i64) -> CompileResult<()> {
        match i32::try_from(n) {
            Ok(imm) => {
                self.emit(Instruction::new(Opcode::PushInt, 0, 0, imm));
            }
            Err(_) => {
                let idx = match self.ints.iter().position(|&x| x == n) {
                    Some(i) => i,
                    None => {
                        self.ints.push(n);
                        self.ints.len() - 1
                    }
                };
                let idx = u16::try_from(idx)
                    .map_err(|_| CompileError::PoolOverflow { pool: "int", max: u16::MAX as usize })?;
                self.emit(Instruction::new(Opcode::PushInt, POOLED, idx, 0));
            }
        }
        Ok(())
    }

    /// Push a folded scalar. Containers are never produced by folding.
    fn push_value(&mut self, v: &Value) -> CompileResult<bool> {
        match v {
            Value::Null => {
                self.emit_op(Opcode::PushNull);
            }
            Value::Bool(b) => {
                self.emit(Instruction::new(Opcode::PushBool, *b as u8, 0, 0));
            }
            Value::Int(n) => self.push_int(*n)?,
            Value::Float(f) => {
                let idx = self.intern(&format_float(*f))?;
                self.emit(Instruction::new(Opcode::PushFloat, 0, idx, 0));
            }
            Value::String(s) => {
                let idx = self.intern(s)?;
                self.emit(Instruction::new(Opcode::PushString, 0, idx, 0));
            }
            Value::Array(_) | Value::Object(_) => return Ok(false),
        }
        Ok(true)
    }

    fn with_depth<T>(&mut self, depth: u32, f: impl FnOnce(&mut Self) -> T) -> T {
        self.depth = depth;
        f(self)
    }

    // ---- Locals ----

    fn resolve_local(&self, name: &str) -> Option<u16> {
        self.locals.iter().rev().find(|(n, _)| n == name).map(|(_, s)| *s)
    }

    fn alloc_slot(&mut self) -> CompileResult<u16> {
        let slot = self.next_slot;
        self.next_slot = slot
            .checked_add(1)
            .ok_or(CompileError::PoolOverflow { pool: "local", max: u16::MAX as usize })?;
        self.local_count = self.local_count.max(self.next_slot);
        Ok(slot)
    }

    fn load_local(&mut self, slot: u16) {
        self.emit(Instruction::new(Opcode::LoadLocal, 0, slot, 0));
    }

    fn store_local(&mut self, slot: u16) {
        self.emit(Instruction::new(Opcode::StoreVar, LOCAL, slot, 0));
    }

    // ---- Expressions ----

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        if self.options.fold_constants && !expr.is_literal() {
            if let Some(v) = fold::evaluate(expr) {
                if self.push_value(&v)? {
                    return Ok(());
                }
            }
        }

        match expr {
            Expr::Int { value } => self.push_int(*value)?,
            Expr::Float { value } => {
                self.push_value(&Value::Float(*value))?;
            }
            Expr::String { value } => {
                let idx = self.intern(value)?;
                self.emit(Instruction::new(Opcode::PushString, 0, idx, 0));
            }
            Expr::Bool { value } => {
                self.emit(Instruction::new(Opcode::PushBool, *value as u8, 0, 0));
            }
            Expr::Null => {
                self.emit_op(Opcode::PushNull);
            }
            Expr::Var { name, scope: None } => self.load_name(name)?,
            Expr::Var { name, scope: Some(scope) } => {
                let name_idx = self.intern(name)?;
                let scope_idx = self.intern(scope)?;
                self.emit(Instruction::new(Opcode::LoadGlobal, 0, name_idx, scope_idx as i32));
            }
            Expr::Property { object, field } => {
                self.load_name(object)?;
                let idx = self.intern(field)?;
                self.emit(Instruction::new(Opcode::GetProp, 0, idx, 0));
            }
            Expr::Member { object, property } => {
                self.compile_expr(object)?;
                let idx = self.intern(property.as_str())?;
                self.emit(Instruction::new(Opcode::GetProp, 0, idx, 0));
            }
            Expr::Computed { object, key } => {
                self.compile_expr(object)?;
                self.compile_expr(key)?;
                self.emit_op(Opcode::GetPropComputed);
            }
            Expr::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.emit_op(Opcode::GetIndex);
            }
            Expr::Binary { op: op @ (BinOp::And | BinOp::Or), left, right } => {
                self.compile_short_circuit(*op, left, right)?;
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(Opcode::for_bin_op(*op));
            }
            Expr::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit_op(match op {
                    UnaryOp::Neg => Opcode::Negate,
                    UnaryOp::Not => Opcode::Not,
                });
            }
            Expr::Ternary { condition, then, otherwise } => self.compile_ternary(condition, then, otherwise)?,
            Expr::Call { function, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let argc = args.len() as i32;
                match builtins::lookup(function) {
                    Some(id) => self.emit(Instruction::new(Opcode::CallBuiltin, 0, id, argc)),
                    None => {
                        let idx = self.intern(function)?;
                        self.emit(Instruction::new(Opcode::CallFunction, 0, idx, argc))
                    }
                };
            }
            Expr::MethodCall { receiver, method, args } => {
                self.compile_expr(receiver)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let idx = self.intern(method)?;
                self.emit(Instruction::new(Opcode::CallMethod, 0, idx, args.len() as i32));
            }
            Expr::Group { inner } => self.compile_expr(inner)?,
            Expr::Array { elements } => {
                for e in elements {
                    self.compile_expr(e)?;
                }
                self.emit(Instruction::new(Opcode::MakeArray, 0, 0, elements.len() as i32));
            }
            Expr::Object { keys, values } => {
                if keys.len() != values.len() {
                    return Err(CompileError::Malformed {
                        kind: "object",
                        reason: format!("{} keys but {} values", keys.len(), values.len()),
                    });
                }
                for (k, v) in keys.iter().zip(values) {
                    let idx = self.intern(k)?;
                    self.emit(Instruction::new(Opcode::PushString, 0, idx, 0));
                    self.compile_expr(v)?;
                }
                self.emit(Instruction::new(Opcode::MakeObject, 0, 0, keys.len() as i32));
            }
            Expr::Arrow { .. } => return Err(CompileError::Unsupported { kind: "arrow" }),
        }
        Ok(())
    }

    fn load_name(&mut self, name: &str) -> CompileResult<()> {
        match self.resolve_local(name) {
            Some(slot) => self.load_local(slot),
            None => {
                let idx = self.intern(name)?;
                self.emit(Instruction::new(Opcode::LoadVar, 0, idx, 0));
            }
        }
        Ok(())
    }

    /// `a && b` / `a || b`: the deciding operand is the result and the right
    /// side is never evaluated once the left decides.
    fn compile_short_circuit(&mut self, op: BinOp, left: &Expr, right: &Expr) -> CompileResult<()> {
        if self.options.fold_constants {
            if let Some(l) = fold::evaluate(left) {
                let decided = if op == BinOp::And { !l.is_truthy() } else { l.is_truthy() };
                if decided && self.push_value(&l)? {
                    return Ok(());
                }
                if !decided {
                    return self.compile_expr(right);
                }
            }
        }
        self.compile_expr(left)?;
        let jump_op = if op == BinOp::And { Opcode::JumpIfFalse } else { Opcode::JumpIfTrue };
        let jump = self.emit_jump(jump_op, KEEP);
        self.emit_op(Opcode::Pop);
        self.compile_expr(right)?;
        self.patch_jump(jump);
        Ok(())
    }

    fn compile_ternary(&mut self, condition: &Expr, then: &Expr, otherwise: &Expr) -> CompileResult<()> {
        if self.options.fold_constants {
            if let Some(c) = fold::evaluate(condition) {
                return self.compile_expr(if c.is_truthy() { then } else { otherwise });
            }
        }
        self.compile_expr(condition)?;
        let to_else = self.emit_jump(Opcode::JumpIfFalse, 0);
        let base = self.depth;
        self.compile_expr(then)?;
        let to_end = self.emit_jump(Opcode::Jump, 0);
        self.patch_jump(to_else);
        self.with_depth(base, |c| c.compile_expr(otherwise))?;
        self.patch_jump(to_end);
        Ok(())
    }

    // ---- Statements ----

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.line += 1;
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn store_target(&mut self, target: &str, scope: Option<&str>) -> CompileResult<()> {
        if scope.is_none() {
            if let Some(slot) = self.resolve_local(target) {
                self.store_local(slot);
                return Ok(());
            }
        }
        let name_idx = self.intern(target)?;
        let scope_ref = match scope {
            Some(s) => self.intern(s)? as i32 + 1,
            None => 0,
        };
        self.emit(Instruction::new(Opcode::StoreVar, 0, name_idx, scope_ref));
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Assign { target, scope, value } => {
                self.compile_expr(value)?;
                self.store_target(target, scope.as_deref())?;
            }
            Stmt::CompoundAssign { target, scope, operator, value } => {
                let current = match scope {
                    Some(s) => Expr::scoped_var(s.clone(), target.clone()),
                    None => Expr::Var { name: target.clone(), scope: None },
                };
                self.compile_expr(&current)?;
                self.compile_expr(value)?;
                self.emit_op(Opcode::for_bin_op(operator.bin_op()));
                self.store_target(target, scope.as_deref())?;
            }
            Stmt::If { condition, then, otherwise } => {
                self.compile_expr(condition)?;
                let to_else = self.emit_jump(Opcode::JumpIfFalse, 0);
                self.compile_stmts(then)?;
                if otherwise.is_empty() {
                    self.patch_jump(to_else);
                } else {
                    let to_end = self.emit_jump(Opcode::Jump, 0);
                    self.patch_jump(to_else);
                    self.compile_stmts(otherwise)?;
                    self.patch_jump(to_end);
                }
            }
            Stmt::While { condition, body } => {
                let start = self.code.len();
                self.compile_expr(condition)?;
                let exit = self.emit_jump(Opcode::JumpIfFalse, 0);
                self.loops.push(LoopLabels::default());
                self.compile_stmts(body)?;
                let labels = self.loops.pop().unwrap_or_default();
                for pos in labels.continues {
                    self.code[pos].c = start as i32 - pos as i32;
                }
                self.emit_jump_to(start);
                self.patch_jump(exit);
                for pos in labels.breaks {
                    self.patch_jump(pos);
                }
            }
            Stmt::ForEach { item, iterable, body } => self.compile_for_each(item, iterable, body)?,
            Stmt::Call { function, args } => {
                self.compile_expr(&Expr::call(function.clone(), args.clone()))?;
                self.emit_op(Opcode::Pop);
            }
            Stmt::Return { value } => {
                match value {
                    Some(v) => self.compile_expr(v)?,
                    None => {
                        self.emit_op(Opcode::PushNull);
                    }
                }
                self.emit_op(Opcode::Halt);
                // Code after a return starts from an empty stack again.
                self.depth = self.depth.saturating_sub(1);
            }
            Stmt::Break | Stmt::Continue => {
                let pos = self.emit_jump(Opcode::Jump, 0);
                let labels = self.loops.last_mut().ok_or_else(|| CompileError::Malformed {
                    kind: stmt.kind_name(),
                    reason: "outside of a loop".to_string(),
                })?;
                if matches!(stmt, Stmt::Break) {
                    labels.breaks.push(pos);
                } else {
                    labels.continues.push(pos);
                }
            }
            Stmt::Delete { target } => self.compile_delete(target)?,
        }
        Ok(())
    }

    fn compile_for_each(&mut self, item: &str, iterable: &Expr, body: &[Stmt]) -> CompileResult<()> {
        let saved_slots = self.next_slot;
        let saved_locals = self.locals.len();
        let list = self.alloc_slot()?;
        let index = self.alloc_slot()?;
        let item_slot = self.alloc_slot()?;
        let length = self.intern("length")?;

        self.compile_expr(iterable)?;
        self.store_local(list);
        self.push_int(0)?;
        self.store_local(index);

        // while (index < list.length)
        let start = self.code.len();
        self.load_local(index);
        self.load_local(list);
        self.emit(Instruction::new(Opcode::GetProp, 0, length, 0));
        self.emit_op(Opcode::Lt);
        let exit = self.emit_jump(Opcode::JumpIfFalse, 0);

        self.load_local(list);
        self.load_local(index);
        self.emit_op(Opcode::GetIndex);
        self.store_local(item_slot);

        self.locals.push((item.to_string(), item_slot));
        self.loops.push(LoopLabels::default());
        self.compile_stmts(body)?;
        let labels = self.loops.pop().unwrap_or_default();
        self.locals.truncate(saved_locals);

        for pos in labels.continues {
            self.patch_jump(pos);
        }
        self.load_local(index);
        self.push_int(1)?;
        self.emit_op(Opcode::Add);
        self.store_local(index);
        self.emit_jump_to(start);
        self.patch_jump(exit);
        for pos in labels.breaks {
            self.patch_jump(pos);
        }
        self.next_slot = saved_slots;
        Ok(())
    }

    /// `delete x.key` / `delete x[key]` removes the key from the object held
    /// in `x` and writes the result back.
    fn compile_delete(&mut self, target: &Expr) -> CompileResult<()> {
        let (var, scope) = match target {
            Expr::Property { object, field } => {
                self.load_name(object)?;
                let idx = self.intern(field)?;
                self.emit(Instruction::new(Opcode::PushString, 0, idx, 0));
                (object.clone(), None)
            }
            Expr::Member { object, property } => {
                let Expr::Var { name, scope } = object.as_ref() else {
                    return Err(self.bad_delete(target));
                };
                self.compile_expr(object)?;
                let idx = self.intern(property.as_str())?;
                self.emit(Instruction::new(Opcode::PushString, 0, idx, 0));
                (name.clone(), scope.clone())
            }
            Expr::Computed { object, key } => {
                let Expr::Var { name, scope } = object.as_ref() else {
                    return Err(self.bad_delete(target));
                };
                self.compile_expr(object)?;
                self.compile_expr(key)?;
                (name.clone(), scope.clone())
            }
            _ => return Err(self.bad_delete(target)),
        };
        self.emit_op(Opcode::DeleteProp);
        self.store_target(&var, scope.as_deref())
    }

    fn bad_delete(&self, target: &Expr) -> CompileError {
        CompileError::Malformed {
            kind: "delete",
            reason: format!("cannot delete a {} expression; target a property of a variable", target.kind_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ops(c: &CompiledExpr) -> Vec<Opcode> {
        c.code.iter().map(|i| i.opcode).collect()
    }

    fn no_fold() -> CompileOptions {
        CompileOptions { fold_constants: false, ..CompileOptions::default() }
    }

    #[test]
    fn opcode_numbering_is_stable() {
        assert_eq!(Opcode::Nop as u8, 0);
        assert_eq!(Opcode::PushInt as u8, 1);
        assert_eq!(Opcode::GetIndex as u8, 38);
        assert_eq!(Opcode::Halt as u8, 39);
        assert_eq!(Opcode::DeleteProp as u8, 42);
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i);
            assert_eq!(Opcode::try_from(i as u8), Ok(*op));
        }
        assert_eq!(Opcode::try_from(200), Err(200));
    }

    #[test]
    fn instruction_layout() {
        let inst = Instruction::new(Opcode::Jump, 1, 0x0203, -2);
        let bytes = inst.to_bytes();
        assert_eq!(bytes, [Opcode::Jump as u8, 1, 0x03, 0x02, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(Instruction::from_bytes(bytes), Ok(inst));
    }

    #[test]
    fn binary_operands_left_then_right() {
        let e = Expr::binary(BinOp::Mul, Expr::var("price"), Expr::var("qty"));
        let c = compile(&e).unwrap();
        assert_eq!(ops(&c), vec![Opcode::LoadVar, Opcode::LoadVar, Opcode::Mul, Opcode::Halt]);
        assert_eq!(c.strings, vec!["price", "qty"]);
        assert_eq!(c.max_stack_depth, 2);
    }

    #[test]
    fn wide_ints_go_to_the_pool() {
        let c = compile_with(&Expr::int(1 << 40), &no_fold()).unwrap();
        assert_eq!(c.code[0], Instruction::new(Opcode::PushInt, POOLED, 0, 0));
        assert_eq!(c.ints, vec![1 << 40]);
        let c = compile_with(&Expr::int(-7), &no_fold()).unwrap();
        assert_eq!(c.code[0], Instruction::new(Opcode::PushInt, 0, 0, -7));
        assert!(c.ints.is_empty());
    }

    #[test]
    fn strings_are_interned_once() {
        let e = Expr::binary(BinOp::Concat, Expr::var("a"), Expr::binary(BinOp::Concat, Expr::string("a"), Expr::var("a")));
        let c = compile_with(&e, &no_fold()).unwrap();
        assert_eq!(c.strings, vec!["a"]);
    }

    #[test]
    fn constant_subtrees_fold() {
        let e = Expr::binary(BinOp::Add, Expr::var("x"), Expr::binary(BinOp::Mul, Expr::int(2), Expr::int(3)));
        let c = compile(&e).unwrap();
        assert_eq!(ops(&c), vec![Opcode::LoadVar, Opcode::PushInt, Opcode::Add, Opcode::Halt]);
        assert_eq!(c.code[1].c, 6);
    }

    #[test]
    fn folding_never_hides_runtime_errors() {
        let e = Expr::binary(BinOp::Div, Expr::int(10), Expr::int(0));
        let c = compile(&e).unwrap();
        assert_eq!(ops(&c), vec![Opcode::PushInt, Opcode::PushInt, Opcode::Div, Opcode::Halt]);
    }

    #[test]
    fn constant_ternary_keeps_one_branch() {
        let e = Expr::ternary(Expr::bool(false), Expr::var("a"), Expr::var("b"));
        let c = compile(&e).unwrap();
        assert_eq!(ops(&c), vec![Opcode::LoadVar, Opcode::Halt]);
        assert_eq!(c.strings, vec!["b"]);
    }

    #[test]
    fn ternary_layout() {
        let e = Expr::ternary(Expr::var("c"), Expr::int(1), Expr::int(2));
        let c = compile(&e).unwrap();
        assert_eq!(
            ops(&c),
            vec![Opcode::LoadVar, Opcode::JumpIfFalse, Opcode::PushInt, Opcode::Jump, Opcode::PushInt, Opcode::Halt]
        );
        assert_eq!(c.code[1].jump_target(1), 4);
        assert_eq!(c.code[3].jump_target(3), 5);
        assert_eq!(c.max_stack_depth, 1);
    }

    #[test]
    fn short_circuit_layout() {
        let e = Expr::binary(BinOp::And, Expr::var("a"), Expr::call("f", vec![]));
        let c = compile(&e).unwrap();
        assert_eq!(
            ops(&c),
            vec![Opcode::LoadVar, Opcode::JumpIfFalse, Opcode::Pop, Opcode::CallFunction, Opcode::Halt]
        );
        assert_eq!(c.code[1].a, KEEP);
        assert_eq!(c.code[1].jump_target(1), 4);
    }

    #[test]
    fn builtin_calls_use_registry_ids() {
        let e = Expr::call("math_abs", vec![Expr::var("x")]);
        let c = compile(&e).unwrap();
        assert_eq!(c.code[1].opcode, Opcode::CallBuiltin);
        assert_eq!(Some(c.code[1].b), builtins::lookup("math_abs"));
        assert_eq!(c.code[1].c, 1);
    }

    #[test]
    fn arrow_is_unsupported() {
        let e = Expr::binary(BinOp::Add, Expr::int(1), Expr::arrow(vec![], Expr::int(1), true));
        let err = compile(&e).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { kind: "arrow" }));
    }

    #[test]
    fn mismatched_object_literal_is_malformed() {
        let e = Expr::Object { keys: vec!["a".into()], values: vec![] };
        assert!(matches!(compile(&e), Err(CompileError::Malformed { kind: "object", .. })));
    }

    #[test]
    fn break_outside_loop_is_malformed() {
        let err = compile_block(&[Stmt::Break], &CompileOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "malformed break node: outside of a loop");
    }

    #[test]
    fn delete_needs_a_variable_owner() {
        let ok = compile_block(&[Stmt::delete(Expr::member(Expr::var("o"), "k"))], &CompileOptions::default()).unwrap();
        assert!(ops(&ok).contains(&Opcode::DeleteProp));
        let bad = compile_block(&[Stmt::delete(Expr::var("o"))], &CompileOptions::default());
        assert!(matches!(bad, Err(CompileError::Malformed { kind: "delete", .. })));
    }

    #[test]
    fn for_each_allocates_hidden_locals() {
        let stmts = vec![Stmt::for_each("x", Expr::var("xs"), vec![Stmt::compound_assign("sum", AssignOp::Add, Expr::var("x"))])];
        let c = compile_block(&stmts, &CompileOptions::default()).unwrap();
        assert_eq!(c.local_count, 3);
        // The loop item reads from a slot, never by name.
        assert!(!c.strings.contains(&"x".to_string()));
    }

    #[test]
    fn debug_info_records_statement_numbers() {
        let opts = CompileOptions { debug_info: true, ..CompileOptions::default() };
        let stmts = vec![Stmt::assign("a", Expr::int(1)), Stmt::assign("b", Expr::int(2))];
        let c = compile_block(&stmts, &opts).unwrap();
        let debug = c.debug.unwrap();
        assert_eq!(debug.lines, vec![1, 1, 2, 2, 2]);
        assert!(debug.source.contains("\"assign\""));
    }
}
