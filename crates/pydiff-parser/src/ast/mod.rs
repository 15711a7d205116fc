//! Abstract Syntax Tree (AST) for Python.
//!
//! This module provides:
//! - AST node definitions for the supported Python constructs
//! - Parser for transforming tokens into AST
//! - Literal decoding (numbers, strings, bytes, f-strings)
//!
//! # Example
//!
//! ```
//! use pydiff_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let source = "def greet(name):\n    return 'hello ' + name\n";
//!
//! match Parser::parse(source, &arena) {
//!     Ok(module) => println!("Parsed successfully: {} statements", module.body.len()),
//!     Err(error) => eprintln!("Parse error: {}", error),
//! }
//! ```

pub mod ops;

mod literals;
mod parser;

pub mod expr;
mod expr_parser;

pub mod stmt;
mod stmt_parser;

pub use pydiff_core::{ParseError, ParseErrorKind};

pub use expr::*;
pub use ops::*;
pub use parser::Parser;
pub use stmt::*;

use pydiff_core::Span;

/// An identifier with its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident<'ast> {
    /// The identifier text
    pub name: &'ast str,
    /// Source location
    pub span: Span,
}

impl<'ast> Ident<'ast> {
    /// Create a new identifier.
    pub fn new(name: &'ast str, span: Span) -> Self {
        Self { name, span }
    }
}

/// Identifies a scope-creating node: the module, a `def`, `class`, `lambda`
/// or comprehension.
///
/// Ids are dense and assigned in source order, with the module always
/// [`ScopeId::MODULE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The module scope.
    pub const MODULE: ScopeId = ScopeId(0);

    /// Index for dense per-scope tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parsed module.
///
/// All nodes borrow from the arena the module was parsed into and remain
/// valid for the lifetime of the arena.
#[derive(Debug, Clone, Copy)]
pub struct Module<'ast> {
    /// Top-level statements
    pub body: &'ast [Stmt<'ast>],
    /// Number of scopes, module included
    pub scope_count: u32,
}

impl<'ast> Module<'ast> {
    /// The module docstring, if the first statement is a string literal.
    pub fn docstring(&self) -> Option<&'ast str> {
        self.body.first().and_then(Stmt::as_docstring)
    }
}
