//! Unreachable instruction removal.
//!
//! Walks control flow from the entry point, drops every instruction no path
//! reaches (code after a `return`, the skipped arm of a folded branch) and
//! rewrites relative jump offsets for the compacted program.

use super::{Instruction, Opcode};

pub(super) fn eliminate(code: &mut Vec<Instruction>, lines: &mut Vec<u32>) -> usize {
    let reachable = reachable(code);
    let removed = reachable.iter().filter(|r| !**r).count();
    if removed == 0 {
        return 0;
    }

    // new_index[i] = position of old instruction i after compaction; for a
    // removed instruction, the position of the next kept one.
    let mut new_index = Vec::with_capacity(code.len() + 1);
    let mut next = 0usize;
    for &keep in &reachable {
        new_index.push(next);
        if keep {
            next += 1;
        }
    }
    new_index.push(next);

    let mut out = Vec::with_capacity(next);
    let mut out_lines = Vec::with_capacity(next);
    for (old_pc, inst) in code.iter().enumerate() {
        if !reachable[old_pc] {
            continue;
        }
        let mut inst = *inst;
        if inst.opcode.is_jump() {
            let target = inst.jump_target(old_pc).clamp(0, code.len() as i64) as usize;
            inst.c = new_index[target] as i32 - new_index[old_pc] as i32;
        }
        out.push(inst);
        if let Some(line) = lines.get(old_pc) {
            out_lines.push(*line);
        }
    }
    *code = out;
    *lines = out_lines;
    removed
}

fn reachable(code: &[Instruction]) -> Vec<bool> {
    let mut seen = vec![false; code.len()];
    let mut work = vec![0usize];
    while let Some(pc) = work.pop() {
        let Some(inst) = code.get(pc) else { continue };
        if seen[pc] {
            continue;
        }
        seen[pc] = true;
        let target = inst.jump_target(pc);
        match inst.opcode {
            Opcode::Halt => {}
            Opcode::Jump => {
                if target >= 0 {
                    work.push(target as usize);
                }
            }
            Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                if target >= 0 {
                    work.push(target as usize);
                }
                work.push(pc + 1);
            }
            _ => work.push(pc + 1),
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(o: Opcode) -> Instruction {
        Instruction::simple(o)
    }

    #[test]
    fn drops_code_after_halt() {
        let mut code = vec![op(Opcode::PushNull), op(Opcode::Halt), op(Opcode::PushNull), op(Opcode::Halt)];
        let mut lines = vec![1, 1, 2, 2];
        assert_eq!(eliminate(&mut code, &mut lines), 2);
        assert_eq!(code.len(), 2);
        assert_eq!(lines, vec![1, 1]);
    }

    #[test]
    fn remaps_jumps_over_removed_code() {
        // 0 jump -> 3 ; 1,2 dead ; 3 push ; 4 jif -> 0 ; 5 halt
        let mut code = vec![
            Instruction::new(Opcode::Jump, 0, 0, 3),
            op(Opcode::PushNull),
            op(Opcode::Pop),
            op(Opcode::PushNull),
            Instruction::new(Opcode::JumpIfFalse, 0, 0, -4),
            op(Opcode::Halt),
        ];
        let mut lines = vec![0; 6];
        assert_eq!(eliminate(&mut code, &mut lines), 2);
        assert_eq!(code[0].jump_target(0), 1);
        assert_eq!(code[2].opcode, Opcode::JumpIfFalse);
        assert_eq!(code[2].jump_target(2), 0);
    }

    #[test]
    fn untouched_when_everything_is_live() {
        let mut code = vec![op(Opcode::PushNull), op(Opcode::Halt)];
        let mut lines = vec![];
        assert_eq!(eliminate(&mut code, &mut lines), 0);
        assert_eq!(code.len(), 2);
    }
}
