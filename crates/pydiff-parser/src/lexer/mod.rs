//! Lexical analysis for Python source.

mod cursor;
mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind, lookup_keyword};
