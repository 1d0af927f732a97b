//! Human-readable listing of a compiled program.

use std::fmt::Write;

use super::{CompiledExpr, Instruction, KEEP, LOCAL, Opcode, POOLED};
use crate::vm::builtins;

pub fn disassemble(program: &CompiledExpr) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "; {} instructions, {} strings, {} ints, max stack {}, {} locals",
        program.code.len(),
        program.strings.len(),
        program.ints.len(),
        program.max_stack_depth,
        program.local_count
    );
    for (pc, inst) in program.code.iter().enumerate() {
        let operands = operands(program, pc, *inst);
        let line = if operands.is_empty() {
            format!("{pc:04}  {}", inst.opcode.name())
        } else {
            format!("{pc:04}  {:<18}{operands}", inst.opcode.name())
        };
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

fn string_operand(program: &CompiledExpr, idx: u16) -> String {
    match program.string(idx) {
        Some(s) => format!("{s:?}"),
        None => format!("<bad string #{idx}>"),
    }
}

fn operands(program: &CompiledExpr, pc: usize, inst: Instruction) -> String {
    match inst.opcode {
        Opcode::PushInt if inst.a == POOLED => match program.ints.get(inst.b as usize) {
            Some(n) => format!("{n}  ; int #{}", inst.b),
            None => format!("<bad int #{}>", inst.b),
        },
        Opcode::PushInt => inst.c.to_string(),
        Opcode::PushFloat => program.string(inst.b).unwrap_or("<bad float>").to_string(),
        Opcode::PushBool => (inst.a != 0).to_string(),
        Opcode::PushString | Opcode::LoadVar | Opcode::GetProp => string_operand(program, inst.b),
        Opcode::LoadLocal => format!("local {}", inst.b),
        Opcode::LoadGlobal => {
            let scope = program.string(inst.c as u16).unwrap_or("?");
            format!("{scope}::{}", program.string(inst.b).unwrap_or("?"))
        }
        Opcode::StoreVar if inst.a == LOCAL => format!("local {}", inst.b),
        Opcode::StoreVar if inst.c > 0 => {
            let scope = program.string((inst.c - 1) as u16).unwrap_or("?");
            format!("{scope}::{}", program.string(inst.b).unwrap_or("?"))
        }
        Opcode::StoreVar => string_operand(program, inst.b),
        Opcode::CallBuiltin => {
            let name = builtins::get(inst.b).map_or("<unknown builtin>", |b| b.name);
            format!("{name}/{}", inst.c)
        }
        Opcode::CallFunction | Opcode::CallMethod => {
            format!("{}/{}", program.string(inst.b).unwrap_or("?"), inst.c)
        }
        Opcode::MakeArray | Opcode::MakeObject => inst.c.to_string(),
        Opcode::Jump => format!("-> {:04}", inst.jump_target(pc)),
        Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
            let keep = if inst.a & KEEP != 0 { "  (keep)" } else { "" };
            format!("-> {:04}{keep}", inst.jump_target(pc))
        }
        _ => String::new(),
    }
}
