//! Python 3.8 parser crate.
//!
//! This crate provides the lexer and parser for Python source code.
//! It includes:
//! - Lexical analysis, including `INDENT`/`DEDENT` layout tokens
//! - Abstract Syntax Tree (AST) definitions with per-scope ids
//! - A strict recursive-descent parser with Pratt expression parsing
//! - Literal decoding, implicit string concatenation and f-strings
//!
//! # Example
//!
//! ```
//! use pydiff_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let source = r#"
//! class Player:
//!     health = 100
//!
//!     def take_damage(self, amount):
//!         self.health -= amount
//! "#;
//!
//! match Parser::parse(source, &arena) {
//!     Ok(module) => println!("Parsed successfully: {} statements", module.body.len()),
//!     Err(error) => eprintln!("Parse error: {}", error),
//! }
//! ```

// Lexer module
pub mod lexer;

// AST module
pub mod ast;

// Re-export commonly used types at crate root
pub use ast::Parser;
pub use lexer::{Lexer, Token, TokenKind};
pub use pydiff_core::Span;
