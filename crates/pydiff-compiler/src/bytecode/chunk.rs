//! Instruction chunk for a code object under construction.
//!
//! Instructions are kept symbolic until assembly: jumps name a [`Label`]
//! instead of an offset, since `EXTENDED_ARG` prefixes can move every
//! later instruction.

use super::OpCode;

/// A jump target, bound to an instruction index once its position is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

/// One instruction before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    /// Argument; for jumps it is filled in by the assembler.
    pub arg: u32,
    /// Jump target.
    pub target: Option<Label>,
    /// Source line that produced this instruction.
    pub line: u32,
}

/// The instructions of a single code object.
#[derive(Debug, Clone, Default)]
pub struct InstructionChunk {
    instructions: Vec<Instruction>,
    /// Instruction index per label, `None` until bound.
    labels: Vec<Option<usize>>,
}

impl InstructionChunk {
    /// Create a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an instruction.
    pub fn write(&mut self, op: OpCode, arg: u32, line: u32) {
        self.instructions.push(Instruction {
            op,
            arg,
            target: None,
            line,
        });
    }

    /// Write a jump to `target`.
    pub fn write_jump(&mut self, op: OpCode, target: Label, line: u32) {
        debug_assert!(op.jump_kind().is_some(), "{} is not a jump", op.name());
        self.instructions.push(Instruction {
            op,
            arg: 0,
            target: Some(target),
            line,
        });
    }

    /// Allocate an unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the next instruction written.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.instructions.len());
    }

    /// Instruction index a label is bound to.
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).copied().flatten()
    }

    /// Number of instructions written.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if no instructions have been written.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instructions written so far.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Overwrite the argument of an already written instruction.
    pub fn set_arg(&mut self, index: usize, arg: u32) {
        if let Some(instr) = self.instructions.get_mut(index) {
            instr.arg = arg;
        }
    }

    /// Whether a label is bound to instruction `index`.
    pub fn has_label_at(&self, index: usize) -> bool {
        self.labels.contains(&Some(index))
    }

    /// Whether no label is bound strictly between `start` and the end, so
    /// the tail from `start` is straight-line code.
    pub fn is_straight_line(&self, start: usize) -> bool {
        let end = self.instructions.len();
        !self
            .labels
            .iter()
            .flatten()
            .any(|&position| position > start && position < end)
    }

    /// Replace the instructions from `start` on. Labels bound past the old
    /// end move to the new end.
    pub fn replace_tail(&mut self, start: usize, replacement: &[Instruction]) {
        let old_end = self.instructions.len();
        self.instructions.truncate(start);
        self.instructions.extend_from_slice(replacement);
        let new_end = self.instructions.len();
        for label in self.labels.iter_mut() {
            if *label == Some(old_end) {
                *label = Some(new_end);
            }
        }
    }

    /// Whether the code ends in `RETURN_VALUE` that nothing jumps past.
    ///
    /// A label bound after the final return starts a fresh block that
    /// still needs its own exit.
    pub fn ends_with_return(&self) -> bool {
        let end = self.instructions.len();
        matches!(self.instructions.last(), Some(i) if i.op == OpCode::ReturnValue)
            && !self.labels.contains(&Some(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_bind_to_next_instruction() {
        let mut chunk = InstructionChunk::new();
        let label = chunk.new_label();
        assert_eq!(chunk.label_position(label), None);

        chunk.write(OpCode::LoadConst, 0, 1);
        chunk.bind(label);
        chunk.write(OpCode::ReturnValue, 0, 1);

        assert_eq!(chunk.label_position(label), Some(1));
        assert_eq!(chunk.len(), 2);
    }

    #[test]
    fn jump_records_target() {
        let mut chunk = InstructionChunk::new();
        let label = chunk.new_label();
        chunk.write_jump(OpCode::JumpAbsolute, label, 3);

        let jump = chunk.instructions()[0];
        assert_eq!(jump.target, Some(label));
        assert_eq!(jump.line, 3);
    }

    #[test]
    fn replace_tail_moves_end_labels() {
        let mut chunk = InstructionChunk::new();
        let start = chunk.new_label();
        let end = chunk.new_label();
        chunk.bind(start);
        chunk.write(OpCode::LoadConst, 0, 1);
        chunk.write(OpCode::LoadConst, 1, 1);
        chunk.bind(end);
        assert!(chunk.is_straight_line(0));

        let folded = Instruction {
            op: OpCode::LoadConst,
            arg: 2,
            target: None,
            line: 1,
        };
        chunk.replace_tail(0, &[folded]);
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.label_position(start), Some(0));
        assert_eq!(chunk.label_position(end), Some(1));
    }

    #[test]
    fn labels_break_straight_line_runs() {
        let mut chunk = InstructionChunk::new();
        chunk.write(OpCode::LoadConst, 0, 1);
        let middle = chunk.new_label();
        chunk.bind(middle);
        chunk.write(OpCode::LoadConst, 1, 1);
        assert!(!chunk.is_straight_line(0));
        assert!(chunk.is_straight_line(1));
        assert!(chunk.has_label_at(1));
    }

    #[test]
    fn trailing_label_needs_exit() {
        let mut chunk = InstructionChunk::new();
        assert!(!chunk.ends_with_return());

        chunk.write(OpCode::LoadConst, 0, 1);
        chunk.write(OpCode::ReturnValue, 0, 1);
        assert!(chunk.ends_with_return());

        let end = chunk.new_label();
        chunk.bind(end);
        assert!(!chunk.ends_with_return());
    }
}
