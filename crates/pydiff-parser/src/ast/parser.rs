//! Parser infrastructure for Python.
//!
//! Provides the main [`Parser`] struct with token navigation and the entry
//! points for parsing a module or a single expression.

use crate::ast::{Expr, Module, ParseError, ParseErrorKind, ScopeId};
use crate::lexer::{Lexer, Token, TokenKind};
use bumpalo::Bump;
use pydiff_core::LexError;
use std::borrow::Cow;

/// Deepest nesting of expressions and indented blocks the parser accepts.
const MAX_NESTING: u32 = 100;

/// The main parser for Python source code.
///
/// Tokens are produced up front into a buffer, allowing arbitrary peeking
/// ahead without consuming tokens. Parsing is strict: the first error aborts.
///
/// The `'ast` lifetime refers to the arena where AST nodes and token
/// lexemes are allocated. The source string only needs to live during
/// the call to `new()`.
pub struct Parser<'ast> {
    /// Buffered tokens, always ending with `EOF`
    pub(super) buffer: Vec<Token<'ast>>,
    /// Current position in the buffer
    pub(super) position: usize,
    /// Arena allocator for AST nodes
    pub(super) arena: &'ast Bump,
    /// Next scope id to hand out
    pub(super) next_scope: u32,
    /// Current recursion depth, bounded by `MAX_NESTING`
    depth: u32,
    /// Lexical error that cut the token buffer short
    lex_error: Option<LexError>,
}

impl<'ast> Parser<'ast> {
    /// Create a new parser for the given module source.
    ///
    /// `\r\n` and lone `\r` line endings are read as `\n`.
    pub fn new(source: &str, arena: &'ast Bump) -> Self {
        let source = normalize_newlines(source);
        let (buffer, lex_error) = Lexer::new(&source, arena).collect_partial();
        Self {
            buffer,
            position: 0,
            arena,
            next_scope: ScopeId::MODULE.0 + 1,
            depth: 0,
            lex_error,
        }
    }

    /// Create a parser over an already-lexed fragment, continuing the scope
    /// numbering of an enclosing parser.
    pub(super) fn for_fragment(buffer: Vec<Token<'ast>>, arena: &'ast Bump, next_scope: u32) -> Self {
        Self {
            buffer,
            position: 0,
            arena,
            next_scope,
            depth: 0,
            lex_error: None,
        }
    }

    /// Parse a complete module.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn parse(source: &str, arena: &'ast Bump) -> Result<Module<'ast>, ParseError> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_module();
        parser.finish(result)
    }

    /// Parse a single expression (for testing and tooling).
    pub fn expression(source: &str, arena: &'ast Bump) -> Result<&'ast Expr<'ast>, ParseError> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_testlist_star_expr().and_then(|expr| {
            parser.eat(TokenKind::Newline);
            parser.expect(TokenKind::Eof)?;
            Ok(expr)
        });
        parser.finish(result)
    }

    /// Report the lexical error in place of a parse error that only arose
    /// because the token stream was cut short.
    fn finish<T>(&mut self, result: Result<T, ParseError>) -> Result<T, ParseError> {
        match (result, self.lex_error.take()) {
            (Ok(value), None) => Ok(value),
            (Ok(_), Some(lex)) => Err(lex.into()),
            (Err(_), Some(lex)) if self.position + 1 >= self.buffer.len() => Err(lex.into()),
            (Err(error), _) => Err(error),
        }
    }

    /// Allocate the id for a new scope-creating node.
    pub(super) fn new_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        id
    }

    /// Run `parse` one nesting level deeper, failing once the nesting
    /// limit is reached instead of exhausting the stack.
    pub(super) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new(
                ParseErrorKind::TooDeeplyNested,
                self.peek().span,
                "too many levels of nesting",
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // ========================================================================
    // Token Navigation
    // ========================================================================

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> &Token<'ast> {
        self.peek_nth(0)
    }

    /// Peek ahead n tokens without consuming. Past the end this is `EOF`.
    pub fn peek_nth(&self, n: usize) -> &Token<'ast> {
        let last = self.buffer.len() - 1;
        &self.buffer[(self.position + n).min(last)]
    }

    /// Get the current token and advance to the next.
    pub fn advance(&mut self) -> Token<'ast> {
        let token = *self.peek();
        if self.position + 1 < self.buffer.len() {
            self.position += 1;
        }
        token
    }

    /// Check if the current token matches the given kind.
    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Check if the current token is EOF.
    pub fn is_eof(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    /// If the current token matches the given kind, consume it and return Some.
    /// Otherwise, return None without consuming.
    pub fn eat(&mut self, kind: TokenKind) -> Option<Token<'ast>> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Expect the current token to be of the given kind.
    /// If it matches, consume and return it. Otherwise, return an error.
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token<'ast>, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.description()))
        }
    }

    // ========================================================================
    // Error Helpers
    // ========================================================================

    /// "expected X, found Y" at the current token.
    pub(super) fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => ParseError::unexpected_eof(token.span),
            TokenKind::Indent => ParseError::new(
                ParseErrorKind::UnexpectedIndent,
                token.span,
                "unexpected indent",
            ),
            found => ParseError::expected_token(token.span, expected, found.description()),
        }
    }

    /// Generic "invalid syntax" at the current token.
    pub(super) fn invalid_syntax(&self) -> ParseError {
        let token = self.peek();
        ParseError::new(ParseErrorKind::InvalidSyntax, token.span, "invalid syntax")
    }
}

/// Translate `\r\n` and lone `\r` to `\n`.
fn normalize_newlines(source: &str) -> Cow<'_, str> {
    if source.contains('\r') {
        Cow::Owned(source.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation() {
        let arena = Bump::new();
        let mut parser = Parser::new("a b", &arena);

        assert_eq!(parser.peek().lexeme, "a");
        assert_eq!(parser.peek_nth(1).lexeme, "b");
        assert!(parser.eat(TokenKind::Name).is_some());
        assert!(parser.eat(TokenKind::Colon).is_none());
        assert!(parser.expect(TokenKind::Name).is_ok());
        assert!(parser.expect(TokenKind::Name).is_err());
    }

    #[test]
    fn advance_stops_at_eof() {
        let arena = Bump::new();
        let mut parser = Parser::new("", &arena);
        assert!(parser.is_eof());
        parser.advance();
        parser.advance();
        assert!(parser.is_eof());
        assert_eq!(parser.peek_nth(5).kind, TokenKind::Eof);
    }

    #[test]
    fn crlf_is_normalized() {
        let arena = Bump::new();
        let module = Parser::parse("x = 1\r\nif x:\r\n    y = 2\r\n", &arena).unwrap();
        assert_eq!(module.body.len(), 2);
        let module = Parser::parse("x = 1\ry = 2\r", &arena).unwrap();
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn parse_error_reported_before_later_lex_error() {
        let arena = Bump::new();
        let error = Parser::parse("def f(:", &arena).unwrap_err();
        assert_eq!(error.span.line, 1);
        assert_eq!(error.span.col, 7);
        assert_ne!(error.kind, ParseErrorKind::Lexical);
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let arena = Bump::new();
        let source = format!("x = {}1\n", "-".repeat(3000));
        let error = Parser::parse(&source, &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::TooDeeplyNested);
        assert_eq!(error.message, "too many levels of nesting");

        let source = format!("x = {}1{}\n", "(".repeat(150), ")".repeat(150));
        let error = Parser::parse(&source, &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::TooDeeplyNested);
    }

    #[test]
    fn lambda_and_conditional_chains_are_bounded() {
        let arena = Bump::new();
        let source = format!("f = {}0\n", "lambda: ".repeat(300));
        let error = Parser::parse(&source, &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::TooDeeplyNested);

        let source = format!("x = {}0\n", "a if b else ".repeat(300));
        let error = Parser::parse(&source, &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::TooDeeplyNested);

        let source = format!("x = {}0\n", "a if b else ".repeat(10));
        assert!(Parser::parse(&source, &arena).is_ok());
    }

    #[test]
    fn moderate_nesting_parses() {
        let arena = Bump::new();
        let source = format!("x = {}1{}\ny = {}1\n", "(".repeat(20), ")".repeat(20), "-".repeat(40));
        let module = Parser::parse(&source, &arena).unwrap();
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn long_flat_chains_do_not_count_as_nesting() {
        let arena = Bump::new();
        let terms = vec!["a"; 500].join(" + ");
        let module = Parser::parse(&format!("x = {terms}\n"), &arena).unwrap();
        assert_eq!(module.body.len(), 1);
    }

    #[test]
    fn lex_error_reported_when_parser_runs_out() {
        let arena = Bump::new();
        let error = Parser::parse("x = 'abc\n", &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::Lexical);

        let error = Parser::parse("x = 1\n)\n", &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::Lexical);
        assert_eq!(error.span.line, 2);
    }
}
