//! Python 3.8 Bytecode Compiler
//!
//! Turns Python source into CPython 3.8 code objects: the same
//! instructions, constants, name tables and flags the reference
//! interpreter would produce, for the subset of optimizations that show up
//! in `co_code` and `co_consts`.
//!
//! ## Architecture
//!
//! - **Pass 1 (Symbols)**: [`symtable::SymbolTable::build`] resolves every
//!   name to local, global, cell or free
//! - **Pass 2 (Code generation)**: the compiler lowers each scope through a
//!   [`emit::CodeEmitter`] and assembles it into a [`CodeObject`]
//!
//! ## Modules
//!
//! - [`bytecode`]: Instruction set, constants and code objects
//! - [`emit`]: Per-scope bytecode emitter with frame blocks
//! - [`symtable`]: Scope analysis
//!
//! # Example
//!
//! ```
//! let code = pydiff_compiler::compile("x = 1\n", "example.py").unwrap();
//! assert_eq!(code.names, vec!["x".to_string()]);
//! ```

pub mod bytecode;
pub mod emit;
pub mod symtable;

mod assembler;
mod compiler;
mod expr;
mod function_compiler;
mod stmt;

pub use bytecode::{CodeFlags, CodeObject, Constant, OpCode};

// Re-export CompilationError from core for convenience
pub use pydiff_core::CompilationError;

use bumpalo::Bump;
use pydiff_parser::Parser;

use crate::compiler::Compiler;
use crate::symtable::SymbolTable;

/// Compile a module's source text into its top-level code object.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile(source: &str, filename: &str) -> Result<CodeObject, CompilationError> {
    let arena = Bump::new();
    let module = Parser::parse(source, &arena)?;
    let symtable = SymbolTable::build(&module)?;
    let code = Compiler::compile_module(&module, &symtable, filename)?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_are_reported() {
        let error = compile("x = (1,\n", "<test>").unwrap_err();
        assert!(matches!(error, CompilationError::Parse(_)));
    }

    #[test]
    fn scope_errors_are_reported() {
        let error = compile("return 1\n", "<test>").unwrap_err();
        assert_eq!(error.message(), "'return' outside function");
        assert_eq!(error.span().line, 1);
    }

    #[test]
    fn filename_is_recorded() {
        let code = compile("def f():\n    pass\n", "pkg/mod.py").unwrap();
        assert_eq!(code.filename, "pkg/mod.py");
        assert_eq!(code.children().next().unwrap().filename, "pkg/mod.py");
    }
}
