//! Flat binary form of a compiled program.
//!
//! ```text
//! "RXBC" version:u16 max_stack:u32 locals:u16
//! code_len:u32   instruction*8 bytes
//! strings:u32    (len:u32 utf8)*
//! ints:u32       i64*
//! ```
//!
//! All integers little endian. Debug info is not serialized.

use super::{CompileError, CompiledExpr, Instruction, Opcode, POOLED};

const MAGIC: &[u8; 4] = b"RXBC";
const VERSION: u16 = 1;

impl CompiledExpr {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.code.len() * 8);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.max_stack_depth.to_le_bytes());
        out.extend_from_slice(&self.local_count.to_le_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        for inst in &self.code {
            out.extend_from_slice(&inst.to_bytes());
        }
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        for s in &self.strings {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&(self.ints.len() as u32).to_le_bytes());
        for n in &self.ints {
            out.extend_from_slice(&n.to_le_bytes());
        }
        out
    }

    /// Decode and validate a program. Every opcode, pool index and jump
    /// target is checked so the VM never sees an out-of-range operand.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CompileError> {
        let mut r = Reader { bytes, pos: 0 };
        if r.take(4)? != MAGIC {
            return Err(invalid("missing RXBC header"));
        }
        let version = r.u16()?;
        if version != VERSION {
            return Err(invalid(format!("unsupported version {version}")));
        }
        let max_stack_depth = r.u32()?;
        let local_count = r.u16()?;

        let code_len = r.u32()? as usize;
        let mut code = Vec::with_capacity(code_len.min(bytes.len() / 8));
        for pc in 0..code_len {
            let raw: [u8; 8] = r.array()?;
            let inst = Instruction::from_bytes(raw)
                .map_err(|byte| invalid(format!("unknown opcode {byte} at {pc}")))?;
            code.push(inst);
        }

        let string_count = r.u32()? as usize;
        let mut strings = Vec::with_capacity(string_count.min(bytes.len()));
        for _ in 0..string_count {
            let len = r.u32()? as usize;
            let s = std::str::from_utf8(r.take(len)?).map_err(|_| invalid("string pool entry is not utf-8"))?;
            strings.push(s.to_string());
        }

        let int_count = r.u32()? as usize;
        let mut ints = Vec::with_capacity(int_count.min(bytes.len() / 8));
        for _ in 0..int_count {
            ints.push(i64::from_le_bytes(r.array()?));
        }
        if r.pos != bytes.len() {
            return Err(invalid(format!("{} trailing bytes", bytes.len() - r.pos)));
        }

        let program = CompiledExpr { code, strings, ints, max_stack_depth, local_count, debug: None };
        validate(&program)?;
        Ok(program)
    }
}

fn invalid(msg: impl Into<String>) -> CompileError {
    CompileError::InvalidBytecode(msg.into())
}

fn validate(p: &CompiledExpr) -> Result<(), CompileError> {
    let strings = p.strings.len();
    for (pc, inst) in p.code.iter().enumerate() {
        let string_ok = |idx: usize| idx < strings;
        let ok = match inst.opcode {
            Opcode::PushInt if inst.a == POOLED => (inst.b as usize) < p.ints.len(),
            Opcode::PushFloat => p.string(inst.b).is_some_and(|s| s.parse::<f64>().is_ok()),
            Opcode::PushString | Opcode::LoadVar | Opcode::GetProp | Opcode::CallMethod | Opcode::CallFunction => {
                string_ok(inst.b as usize)
            }
            Opcode::LoadGlobal => string_ok(inst.b as usize) && inst.c >= 0 && string_ok(inst.c as usize),
            Opcode::LoadLocal => inst.b < p.local_count,
            Opcode::StoreVar if inst.a == super::LOCAL => inst.b < p.local_count,
            Opcode::StoreVar => string_ok(inst.b as usize) && inst.c >= 0 && (inst.c == 0 || string_ok(inst.c as usize - 1)),
            Opcode::CallBuiltin => crate::vm::builtins::get(inst.b).is_some(),
            op if op.is_jump() => {
                let target = inst.jump_target(pc);
                target >= 0 && (target as usize) <= p.code.len()
            }
            _ => true,
        };
        let count_ok = !matches!(
            inst.opcode,
            Opcode::CallBuiltin | Opcode::CallFunction | Opcode::CallMethod | Opcode::MakeArray | Opcode::MakeObject
        ) || inst.c >= 0;
        if !ok || !count_ok {
            return Err(invalid(format!("bad operand for {} at {pc}", inst.opcode.name())));
        }
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CompileError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len()).ok_or_else(|| invalid("truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CompileError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, CompileError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CompileError> {
        Ok(u32::from_le_bytes(self.array()?))
    }
}
