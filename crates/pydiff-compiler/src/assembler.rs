//! Assembly of symbolic instructions into a [`CodeObject`].
//!
//! Jump arguments depend on byte offsets, and offsets depend on how many
//! `EXTENDED_ARG` prefixes each argument needs, so layout is iterated until
//! no instruction changes size. The maximum stack depth comes from a flow
//! analysis over the resolved jumps.

use crate::bytecode::{CodeFlags, CodeObject, Instruction, JumpKind, OpCode};
use crate::emit::EmitterOutput;

/// Code object metadata that does not come from the emitter.
#[derive(Debug, Clone, Default)]
pub struct CodeHeader {
    pub name: String,
    pub filename: String,
    pub firstlineno: u32,
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub flags: CodeFlags,
    pub docstring: Option<u32>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
}

/// Assemble emitted instructions into a finished code object.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn assemble(output: EmitterOutput, header: CodeHeader) -> CodeObject {
    let EmitterOutput {
        chunk,
        constants,
        names,
        varnames,
    } = output;

    let targets: Vec<Option<usize>> = chunk
        .instructions()
        .iter()
        .map(|instr| {
            instr
                .target
                .map(|label| chunk.label_position(label).unwrap_or(chunk.len()))
        })
        .collect();

    let instructions = resolve_jumps(chunk.instructions(), &targets);
    let stacksize = max_stack_depth(&instructions, &targets);
    let (code, offsets) = encode(&instructions);
    let lnotab = line_table(&instructions, &offsets, header.firstlineno);

    let mut flags = header.flags;
    if header.cellvars.is_empty() && header.freevars.is_empty() {
        flags |= CodeFlags::NOFREE;
    }

    CodeObject {
        argcount: header.argcount,
        posonlyargcount: header.posonlyargcount,
        kwonlyargcount: header.kwonlyargcount,
        nlocals: varnames.len() as u32,
        stacksize,
        flags,
        code,
        consts: constants,
        docstring: header.docstring,
        names,
        varnames,
        freevars: header.freevars,
        cellvars: header.cellvars,
        filename: header.filename,
        name: header.name,
        firstlineno: header.firstlineno,
        lnotab,
    }
}

/// Code units (two bytes each) needed to encode an argument.
fn instr_size(arg: u32) -> u32 {
    match arg {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Fill in jump arguments, iterating until every instruction's size is stable.
fn resolve_jumps(instructions: &[Instruction], targets: &[Option<usize>]) -> Vec<Instruction> {
    let mut resolved = instructions.to_vec();
    let mut sizes: Vec<u32> = resolved.iter().map(|i| instr_size(i.arg)).collect();

    loop {
        let offsets = unit_offsets(&sizes);
        let mut changed = false;

        for (i, instr) in resolved.iter_mut().enumerate() {
            let (Some(target), Some(kind)) = (targets[i], instr.op.jump_kind()) else {
                continue;
            };
            let target_offset = offsets[target];
            instr.arg = match kind {
                JumpKind::Absolute => target_offset * 2,
                JumpKind::Relative => {
                    let next = offsets[i] + sizes[i];
                    debug_assert!(target_offset >= next, "backward relative jump");
                    target_offset.saturating_sub(next) * 2
                }
            };
            let size = instr_size(instr.arg);
            if size != sizes[i] {
                sizes[i] = size;
                changed = true;
            }
        }

        if !changed {
            return resolved;
        }
    }
}

/// Unit offset of each instruction, plus one trailing entry for the end.
fn unit_offsets(sizes: &[u32]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(sizes.len() + 1);
    let mut offset = 0;
    for size in sizes {
        offsets.push(offset);
        offset += size;
    }
    offsets.push(offset);
    offsets
}

/// Maximum stack depth reachable along any path.
fn max_stack_depth(instructions: &[Instruction], targets: &[Option<usize>]) -> u32 {
    let mut start_depth: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut worklist = Vec::new();
    let mut max_depth = 0;

    enqueue(&mut start_depth, &mut worklist, 0, 0);
    while let Some(index) = worklist.pop() {
        let Some(depth) = start_depth[index] else {
            continue;
        };
        let instr = &instructions[index];

        let new_depth = (depth + instr.op.stack_effect(instr.arg, false)).max(0);
        max_depth = max_depth.max(new_depth);

        if let Some(target) = targets[index] {
            let target_depth = (depth + instr.op.stack_effect(instr.arg, true)).max(0);
            max_depth = max_depth.max(target_depth);
            enqueue(&mut start_depth, &mut worklist, target, target_depth);
        }

        if !instr.op.is_terminal() {
            enqueue(&mut start_depth, &mut worklist, index + 1, new_depth);
        }
    }

    max_depth as u32
}

/// Schedule `index` if it is reached with a deeper stack than seen so far.
fn enqueue(start_depth: &mut [Option<i32>], worklist: &mut Vec<usize>, index: usize, depth: i32) {
    if index < start_depth.len() && start_depth[index].is_none_or(|seen| seen < depth) {
        start_depth[index] = Some(depth);
        worklist.push(index);
    }
}

/// Encode to wordcode. Returns the bytes and each instruction's byte offset.
fn encode(instructions: &[Instruction]) -> (Vec<u8>, Vec<u32>) {
    let mut code = Vec::with_capacity(instructions.len() * 2);
    let mut offsets = Vec::with_capacity(instructions.len());

    for instr in instructions {
        offsets.push(code.len() as u32);
        for shift in (1..instr_size(instr.arg)).rev() {
            code.push(u8::from(OpCode::ExtendedArg));
            code.push((instr.arg >> (8 * shift)) as u8);
        }
        code.push(u8::from(instr.op));
        code.push(instr.arg as u8);
    }

    (code, offsets)
}

/// Build the `co_lnotab` table of (byte delta, signed line delta) pairs.
fn line_table(instructions: &[Instruction], offsets: &[u32], firstlineno: u32) -> Vec<u8> {
    let mut table = Vec::new();
    let mut last_line = i64::from(firstlineno);
    let mut last_offset = 0u32;

    for (instr, &offset) in instructions.iter().zip(offsets) {
        let line = i64::from(instr.line);
        if line == 0 || line == last_line {
            continue;
        }

        let mut byte_delta = offset - last_offset;
        let mut line_delta = line - last_line;
        while byte_delta > 255 {
            table.extend([255, 0]);
            byte_delta -= 255;
        }
        while line_delta > 127 {
            table.extend([byte_delta as u8, 127]);
            byte_delta = 0;
            line_delta -= 127;
        }
        while line_delta < -128 {
            table.extend([byte_delta as u8, -128i8 as u8]);
            byte_delta = 0;
            line_delta += 128;
        }
        table.extend([byte_delta as u8, line_delta as i8 as u8]);

        last_line = line;
        last_offset = offset;
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Constant;
    use crate::emit::CodeEmitter;

    fn header() -> CodeHeader {
        CodeHeader {
            name: "<module>".into(),
            filename: "<test>".into(),
            firstlineno: 1,
            ..Default::default()
        }
    }

    #[test]
    fn simple_module() {
        let mut emitter = CodeEmitter::new();
        emitter.load_const(Constant::Int("1".into()));
        emitter.emit_name(OpCode::StoreName, "x");
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        assert_eq!(code.code, vec![100, 0, 90, 0, 100, 1, 83, 0]);
        assert_eq!(code.stacksize, 1);
        assert_eq!(code.flags, CodeFlags::NOFREE);
        assert_eq!(code.names, vec!["x"]);
    }

    #[test]
    fn forward_and_backward_jumps() {
        let mut emitter = CodeEmitter::new();
        let top = emitter.new_label();
        let end = emitter.new_label();
        emitter.bind_label(top);
        emitter.emit_name(OpCode::LoadName, "x");
        emitter.emit_jump(OpCode::PopJumpIfFalse, end);
        emitter.emit_jump(OpCode::JumpAbsolute, top);
        emitter.bind_label(end);
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        assert_eq!(code.code, vec![101, 0, 114, 6, 113, 0, 100, 0, 83, 0]);
    }

    #[test]
    fn relative_jump_measures_from_next_instruction() {
        let mut emitter = CodeEmitter::new();
        let end = emitter.new_label();
        emitter.emit_jump(OpCode::JumpForward, end);
        emitter.emit(OpCode::PopTop);
        emitter.bind_label(end);
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        assert_eq!(&code.code[..4], &[110, 2, 1, 0]);
    }

    #[test]
    fn wide_arguments_get_extended_arg_prefixes() {
        let mut emitter = CodeEmitter::new();
        for i in 0..300 {
            emitter.load_const(Constant::Int(i.to_string()));
            emitter.emit(OpCode::PopTop);
        }
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        let tail = &code.code[code.code.len() - 8..];
        // LOAD_CONST 299 is EXTENDED_ARG 1, LOAD_CONST 43.
        assert_eq!(tail, &[144, 1, 100, 43, 1, 0, 83, 0]);
    }

    #[test]
    fn jump_targets_shift_past_extended_args() {
        let mut emitter = CodeEmitter::new();
        let end = emitter.new_label();
        emitter.emit_jump(OpCode::JumpAbsolute, end);
        for _ in 0..200 {
            emitter.emit(OpCode::Nop);
        }
        emitter.bind_label(end);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        // Target is after a 2-unit jump and 200 NOPs: (2 + 200) * 2 = 404.
        assert_eq!(&code.code[..4], &[144, 1, 113, 148]);
    }

    #[test]
    fn stack_depth_follows_both_branches() {
        let mut emitter = CodeEmitter::new();
        let handler = emitter.new_label();
        emitter.emit_jump(OpCode::SetupFinally, handler);
        emitter.emit(OpCode::PopBlock);
        emitter.emit(OpCode::BeginFinally);
        emitter.bind_label(handler);
        emitter.emit(OpCode::EndFinally);
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        assert_eq!(code.stacksize, 6);
    }

    #[test]
    fn line_table_records_changes() {
        let mut emitter = CodeEmitter::new();
        emitter.set_line(1);
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::PopTop);
        emitter.set_line(3);
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(emitter.finish(), header());
        assert_eq!(code.lnotab, vec![4, 2]);
    }

    #[test]
    fn cells_clear_nofree() {
        let mut emitter = CodeEmitter::new();
        emitter.load_const(Constant::None);
        emitter.emit(OpCode::ReturnValue);

        let code = assemble(
            emitter.finish(),
            CodeHeader {
                cellvars: vec!["x".into()],
                flags: CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS,
                ..header()
            },
        );
        assert_eq!(code.flags, CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS);
    }
}
