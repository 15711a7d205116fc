//! Shared types for the pydiff front end: source spans and the error
//! hierarchy used by the parser and compiler crates.

mod error;
mod span;

pub use error::{CompilationError, CompileError, LexError, ParseError, ParseErrorKind};
pub use span::Span;
