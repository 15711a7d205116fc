//! Bytecode emitter for the Python compiler.
//!
//! The [`CodeEmitter`] provides a high-level API for generating the
//! instructions of one code object, handling constants, name tables,
//! labels and the frame block stack.
//!
//! # Example
//!
//! ```
//! use pydiff_compiler::bytecode::{Constant, OpCode};
//! use pydiff_compiler::emit::CodeEmitter;
//!
//! let mut emitter = CodeEmitter::new();
//! emitter.set_line(1);
//! emitter.load_const(Constant::Int("42".into()));
//! emitter.emit_name(OpCode::StoreName, "x");
//! emitter.load_const(Constant::None);
//! emitter.emit(OpCode::ReturnValue);
//!
//! let output = emitter.finish();
//! assert_eq!(output.names, vec!["x".to_string()]);
//! ```

mod jumps;

use rustc_hash::FxHashMap;

use crate::bytecode::{Constant, ConstantPool, Instruction, InstructionChunk, Label, OpCode};
pub use jumps::{BlockKind, BlockStack, FrameBlock};

/// Ordered, deduplicated list of names (`co_names`, `co_varnames`).
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl NameTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, appending it if new.
    pub fn index_of(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consume the table, yielding names in index order.
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Everything the emitter produced for one code object.
#[derive(Debug)]
pub struct EmitterOutput {
    pub chunk: InstructionChunk,
    pub constants: Vec<Constant>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
}

/// Emits the instructions of a single code object.
#[derive(Debug)]
pub struct CodeEmitter {
    /// The instruction chunk being built
    chunk: InstructionChunk,

    /// Constants referenced by `LOAD_CONST`
    constants: ConstantPool,

    /// Names referenced by name, attribute and global opcodes
    names: NameTable,

    /// Fast locals, parameters first
    varnames: NameTable,

    /// Frame blocks for break/continue/return unwinding
    blocks: BlockStack,

    /// Current source line for debug info
    current_line: u32,

    /// Tuples folded from constant loads, appended to the pool on finish
    folded: Vec<(usize, Constant)>,

    /// Nesting depth of unreachable code; nothing is emitted while positive
    suppressed: u32,
}

impl Default for CodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeEmitter {
    /// Create a new emitter.
    pub fn new() -> Self {
        Self {
            chunk: InstructionChunk::new(),
            constants: ConstantPool::new(),
            names: NameTable::new(),
            varnames: NameTable::new(),
            blocks: BlockStack::new(),
            current_line: 1,
            folded: Vec::new(),
            suppressed: 0,
        }
    }

    /// Set current source line for debug info.
    ///
    /// All subsequent instructions will be associated with this line number.
    pub fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    /// Get current source line.
    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    // ==========================================================================
    // Basic Emission
    // ==========================================================================

    /// Emit an opcode with a zero argument.
    pub fn emit(&mut self, op: OpCode) {
        self.emit_arg(op, 0);
    }

    /// Emit an opcode with an argument.
    ///
    /// `BUILD_TUPLE` over straight-line constant loads becomes a single
    /// `LOAD_CONST`, and `BUILD_TUPLE n; UNPACK_SEQUENCE n` for `n <= 3`
    /// becomes stack rotations.
    pub fn emit_arg(&mut self, op: OpCode, arg: u32) {
        if self.is_suppressed() {
            return;
        }
        match op {
            OpCode::BuildTuple if self.fold_const_tuple(arg) => {}
            OpCode::UnpackSequence if self.swap_unpack(arg) => {}
            _ => self.chunk.write(op, arg, self.current_line),
        }
    }

    /// Emit a jump to `target`.
    pub fn emit_jump(&mut self, op: OpCode, target: Label) {
        if self.is_suppressed() {
            return;
        }
        self.chunk.write_jump(op, target, self.current_line);
    }

    /// Start compiling unreachable code.
    ///
    /// Names are still registered but no instructions or constants are
    /// produced until the matching [`CodeEmitter::resume`].
    pub fn suppress(&mut self) {
        self.suppressed += 1;
    }

    /// Leave one level of unreachable code.
    pub fn resume(&mut self) {
        self.suppressed = self.suppressed.saturating_sub(1);
    }

    /// Whether emission is currently suppressed.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed > 0
    }

    fn fold_const_tuple(&mut self, count: u32) -> bool {
        let count = count as usize;
        let len = self.chunk.len();
        if count == 0 || count > len {
            return false;
        }
        let start = len - count;
        if !self.chunk.is_straight_line(start) || self.folded.iter().any(|(at, _)| *at >= start) {
            return false;
        }
        let tail = &self.chunk.instructions()[start..];
        if tail.iter().any(|instr| instr.op != OpCode::LoadConst) {
            return false;
        }
        let items: Option<Vec<Constant>> = tail
            .iter()
            .map(|instr| self.constants.get(instr.arg).cloned())
            .collect();
        let Some(items) = items else {
            return false;
        };
        let line = tail[0].line;

        self.chunk.replace_tail(
            start,
            &[Instruction {
                op: OpCode::LoadConst,
                arg: 0,
                target: None,
                line,
            }],
        );
        self.folded.push((start, Constant::Tuple(items)));
        true
    }

    fn swap_unpack(&mut self, count: u32) -> bool {
        let len = self.chunk.len();
        let Some(last) = self.chunk.instructions().last() else {
            return false;
        };
        if last.op != OpCode::BuildTuple || last.arg != count || count > 3 || self.chunk.has_label_at(len) {
            return false;
        }
        let line = last.line;
        let rotate = |op| Instruction {
            op,
            arg: 0,
            target: None,
            line,
        };
        let replacement = match count {
            0 | 1 => vec![],
            2 => vec![rotate(OpCode::RotTwo)],
            _ => vec![rotate(OpCode::RotThree), rotate(OpCode::RotTwo)],
        };
        self.chunk.replace_tail(len - 1, &replacement);
        true
    }

    /// Allocate a new label.
    pub fn new_label(&mut self) -> Label {
        self.chunk.new_label()
    }

    /// Bind a label to the next instruction.
    pub fn bind_label(&mut self, label: Label) {
        self.chunk.bind(label);
    }

    /// Whether the code so far ends in an unconditional return.
    pub fn ends_with_return(&self) -> bool {
        self.chunk.ends_with_return()
    }

    // ==========================================================================
    // Constants and Names
    // ==========================================================================

    /// Add a constant to the pool without emitting anything.
    pub fn add_const(&mut self, constant: Constant) -> u32 {
        self.constants.add(constant)
    }

    /// Emit `LOAD_CONST` for a constant.
    pub fn load_const(&mut self, constant: Constant) {
        if self.is_suppressed() {
            return;
        }
        let index = self.constants.add(constant);
        self.emit_arg(OpCode::LoadConst, index);
    }

    /// Emit an opcode whose argument indexes `co_names`.
    pub fn emit_name(&mut self, op: OpCode, name: &str) {
        let index = self.names.index_of(name);
        self.emit_arg(op, index);
    }

    /// Emit an opcode whose argument indexes `co_varnames`.
    pub fn emit_fast(&mut self, op: OpCode, name: &str) {
        let index = self.varnames.index_of(name);
        self.emit_arg(op, index);
    }

    /// Register a fast local without emitting anything.
    pub fn add_varname(&mut self, name: &str) -> u32 {
        self.varnames.index_of(name)
    }

    // ==========================================================================
    // Frame Blocks
    // ==========================================================================

    /// The frame block stack.
    pub fn blocks(&self) -> &BlockStack {
        &self.blocks
    }

    /// Enter a frame block.
    pub fn push_block(&mut self, kind: BlockKind, start: Label, exit: Option<Label>) {
        self.blocks.push(kind, start, exit);
    }

    /// Leave the innermost frame block.
    pub fn pop_block(&mut self, kind: BlockKind) {
        let popped = self.blocks.pop();
        debug_assert_eq!(popped.map(|b| b.kind), Some(kind));
    }

    /// Finish emission.
    pub fn finish(mut self) -> EmitterOutput {
        for (at, constant) in std::mem::take(&mut self.folded) {
            let index = self.constants.append(constant);
            self.chunk.set_arg(at, index);
        }
        EmitterOutput {
            chunk: self.chunk,
            constants: self.constants.into_constants(),
            names: self.names.into_names(),
            varnames: self.varnames.into_names(),
        }
    }
}
