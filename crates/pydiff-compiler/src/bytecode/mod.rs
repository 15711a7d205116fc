//! Bytecode types for the Python compiler.
//!
//! This module contains the core bytecode types:
//!
//! - [`OpCode`] - The CPython 3.8 instruction set
//! - [`InstructionChunk`] - Symbolic instructions with jump labels
//! - [`Constant`] and [`ConstantPool`] - Per-code-object constant storage
//! - [`CodeObject`] and [`CodeFlags`] - The assembled result

mod chunk;
mod code;
mod constant;
mod opcode;

pub use chunk::{Instruction, InstructionChunk, Label};
pub use code::{CodeFlags, CodeObject};
pub use constant::{Constant, ConstantPool};
pub use opcode::{
    COMPARE_EXCEPTION_MATCH, FORMAT_VALUE_HAVE_SPEC, HAVE_ARGUMENT, JumpKind,
    MAKE_FUNCTION_ANNOTATIONS, MAKE_FUNCTION_CLOSURE, MAKE_FUNCTION_DEFAULTS,
    MAKE_FUNCTION_KWDEFAULTS, OpCode,
};
