//! Unified error types for the Python front end.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CompilationError (top-level wrapper)
//! ├── ParseError    - Lexer and parser errors (with ParseErrorKind)
//! └── CompileError  - Errors found while lowering a well-formed tree
//! ```
//!
//! Every variant is a Python `SyntaxError` from the user's point of view;
//! the split only records which phase noticed the problem.

use thiserror::Error;

use crate::Span;

// ============================================================================
// Lexer Errors
// ============================================================================

/// Errors that occur during lexical analysis (tokenization).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    /// A string literal was not properly terminated.
    #[error("unterminated string literal at {span}")]
    UnterminatedString { span: Span },

    /// A dedent that does not return to any enclosing indentation level.
    #[error("unindent does not match any outer indentation level at {span}")]
    InconsistentDedent { span: Span },

    /// A numeric literal could not be parsed.
    #[error("invalid number at {span}: {detail}")]
    InvalidNumber { span: Span, detail: String },

    /// A closing bracket without a matching opener.
    #[error("unmatched '{ch}' at {span}")]
    UnmatchedBracket { ch: char, span: Span },

    /// Input ended inside an open bracket.
    #[error("unexpected EOF in multi-line statement at {span}")]
    EofInStatement { span: Span },

    /// A backslash not followed by a newline.
    #[error("unexpected character after line continuation character at {span}")]
    BadContinuation { span: Span },

    /// Brackets nested deeper than the tokenizer tracks.
    #[error("too many nested parentheses at {span}")]
    TooManyNestedParens { span: Span },

    /// Indented blocks nested deeper than the tokenizer tracks.
    #[error("too many levels of indentation at {span}")]
    TooDeepIndentation { span: Span },

    /// Indentation whose meaning depends on the width of a tab.
    #[error("inconsistent use of tabs and spaces in indentation at {span}")]
    TabError { span: Span },
}

impl LexError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::InconsistentDedent { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
            LexError::UnmatchedBracket { span, .. } => *span,
            LexError::EofInStatement { span } => *span,
            LexError::BadContinuation { span } => *span,
            LexError::TooManyNestedParens { span } => *span,
            LexError::TooDeepIndentation { span } => *span,
            LexError::TabError { span } => *span,
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Categories of parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// A specific token was expected but not found.
    ExpectedToken,
    /// An unexpected token was encountered.
    UnexpectedToken,
    /// Unexpected end of file.
    UnexpectedEof,
    /// An expression was expected.
    ExpectedExpression,
    /// An identifier was expected.
    ExpectedIdentifier,
    /// A compound statement header without an indented body.
    ExpectedIndentedBlock,
    /// Indentation where none is allowed.
    UnexpectedIndent,
    /// The left-hand side cannot be assigned to or deleted.
    InvalidTarget,
    /// A literal value could not be decoded.
    InvalidLiteral,
    /// Invalid escape sequence in a bytes literal.
    InvalidEscapeSequence,
    /// Malformed parameter or argument list.
    InvalidArguments,
    /// Error reported by the lexer.
    Lexical,
    /// Expressions or blocks nested beyond the parser's limit.
    TooDeeplyNested,
    /// General syntax error.
    InvalidSyntax,
}

impl ParseErrorKind {
    /// Returns a human-readable name for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::ExpectedToken => "expected token",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnexpectedEof => "unexpected end of file",
            ParseErrorKind::ExpectedExpression => "expected expression",
            ParseErrorKind::ExpectedIdentifier => "expected identifier",
            ParseErrorKind::ExpectedIndentedBlock => "expected an indented block",
            ParseErrorKind::UnexpectedIndent => "unexpected indent",
            ParseErrorKind::InvalidTarget => "invalid target",
            ParseErrorKind::InvalidLiteral => "invalid literal",
            ParseErrorKind::InvalidEscapeSequence => "invalid escape sequence",
            ParseErrorKind::InvalidArguments => "invalid arguments",
            ParseErrorKind::Lexical => "lexical error",
            ParseErrorKind::TooDeeplyNested => "too deeply nested",
            ParseErrorKind::InvalidSyntax => "invalid syntax",
        }
    }
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parse error with location and context.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {span}: {message}")]
pub struct ParseError {
    /// The category of this error.
    pub kind: ParseErrorKind,
    /// The source location where the error occurred.
    pub span: Span,
    /// A detailed error message.
    pub message: String,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(kind: ParseErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    /// Create an "expected token" error.
    pub fn expected_token(span: Span, expected: &str, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedToken,
            span,
            format!("expected {expected}, found {found}"),
        )
    }

    /// Create an "unexpected token" error.
    pub fn unexpected_token(span: Span, token: &str) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedToken,
            span,
            format!("unexpected token: {token}"),
        )
    }

    /// Create an "unexpected EOF" error.
    pub fn unexpected_eof(span: Span) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedEof,
            span,
            "unexpected end of file".to_string(),
        )
    }

    /// Create an "expected identifier" error.
    pub fn expected_identifier(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedIdentifier,
            span,
            format!("expected identifier, found {found}"),
        )
    }

    /// Create an "expected expression" error.
    pub fn expected_expression(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedExpression,
            span,
            format!("expected expression, found {found}"),
        )
    }

    /// Create an "invalid target" error for an assignment or deletion.
    pub fn invalid_target(span: Span, action: &str, what: &str) -> Self {
        Self::new(
            ParseErrorKind::InvalidTarget,
            span,
            format!("cannot {action} {what}"),
        )
    }
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        let span = error.span();
        ParseError::new(ParseErrorKind::Lexical, span, error.to_string())
    }
}

// ============================================================================
// Compile Errors
// ============================================================================

/// Syntax errors detected after parsing, while building scopes or bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("'return' outside function at {span}")]
    ReturnOutsideFunction { span: Span },

    #[error("'break' outside loop at {span}")]
    BreakOutsideLoop { span: Span },

    #[error("'continue' not properly in loop at {span}")]
    ContinueOutsideLoop { span: Span },

    #[error("'yield' outside function at {span}")]
    YieldOutsideFunction { span: Span },

    #[error("'yield' inside {kind} at {span}")]
    YieldInComprehension { kind: &'static str, span: Span },

    #[error("import * only allowed at module level at {span}")]
    ImportStarNotAtModuleLevel { span: Span },

    #[error("default 'except:' must be last at {span}")]
    DefaultExceptNotLast { span: Span },

    #[error("can't use starred expression here at {span}")]
    StarredMisuse { span: Span },

    #[error("cannot assign to {what} at {span}")]
    InvalidTarget { what: &'static str, span: Span },

    #[error("multiple starred expressions in assignment at {span}")]
    MultipleStarredTargets { span: Span },

    #[error("too many expressions in star-unpacking assignment at {span}")]
    TooManyUnpackTargets { span: Span },

    #[error("duplicate argument '{name}' in function definition at {span}")]
    DuplicateArgument { name: String, span: Span },

    #[error("nonlocal declaration not allowed at module level at {span}")]
    NonlocalAtModuleLevel { span: Span },

    #[error("no binding for nonlocal '{name}' found at {span}")]
    NoBindingForNonlocal { name: String, span: Span },

    #[error("annotated name '{name}' can't be {declaration} at {span}")]
    AnnotatedNameConflict {
        name: String,
        declaration: &'static str,
        span: Span,
    },

    #[error("name '{name}' is {detail} at {span}")]
    ConflictingDeclaration {
        name: String,
        detail: &'static str,
        span: Span,
    },

    #[error("'await' outside function at {span}")]
    AwaitOutsideFunction { span: Span },

    #[error("'{what}' outside async function at {span}")]
    OutsideAsyncFunction { what: &'static str, span: Span },

    #[error("asynchronous comprehension outside of an asynchronous function at {span}")]
    AsyncComprehensionOutsideAsync { span: Span },

    #[error("'yield from' inside async function at {span}")]
    YieldFromInAsync { span: Span },

    #[error("'return' with value in async generator at {span}")]
    ReturnValueInAsyncGenerator { span: Span },

    #[error("assignment expression within a comprehension cannot be used in a class body at {span}")]
    NamedExprInClassComprehension { span: Span },

    #[error("assignment expression cannot rebind comprehension iteration variable '{name}' at {span}")]
    NamedExprRebindsIterationVariable { name: String, span: Span },

    #[error("assignment expression cannot be used in a comprehension iterable expression at {span}")]
    NamedExprInComprehensionIterable { span: Span },

    #[error("too many nested expressions at {span}")]
    TooDeeplyNested { span: Span },
}

impl CompileError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompileError::ReturnOutsideFunction { span }
            | CompileError::BreakOutsideLoop { span }
            | CompileError::ContinueOutsideLoop { span }
            | CompileError::YieldOutsideFunction { span }
            | CompileError::YieldInComprehension { span, .. }
            | CompileError::ImportStarNotAtModuleLevel { span }
            | CompileError::DefaultExceptNotLast { span }
            | CompileError::StarredMisuse { span }
            | CompileError::InvalidTarget { span, .. }
            | CompileError::MultipleStarredTargets { span }
            | CompileError::TooManyUnpackTargets { span }
            | CompileError::DuplicateArgument { span, .. }
            | CompileError::NonlocalAtModuleLevel { span }
            | CompileError::NoBindingForNonlocal { span, .. }
            | CompileError::AnnotatedNameConflict { span, .. }
            | CompileError::ConflictingDeclaration { span, .. }
            | CompileError::AwaitOutsideFunction { span }
            | CompileError::OutsideAsyncFunction { span, .. }
            | CompileError::AsyncComprehensionOutsideAsync { span }
            | CompileError::YieldFromInAsync { span }
            | CompileError::ReturnValueInAsyncGenerator { span }
            | CompileError::NamedExprInClassComprehension { span }
            | CompileError::NamedExprRebindsIterationVariable { span, .. }
            | CompileError::NamedExprInComprehensionIterable { span }
            | CompileError::TooDeeplyNested { span } => *span,
        }
    }
}

// ============================================================================
// Top-level
// ============================================================================

/// Any error produced while turning source text into a code object.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl CompilationError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompilationError::Parse(error) => error.span,
            CompilationError::Compile(error) => error.span(),
        }
    }

    /// The diagnostic text without the trailing position.
    pub fn message(&self) -> String {
        match self {
            CompilationError::Parse(error) => error.message.clone(),
            CompilationError::Compile(error) => {
                let text = error.to_string();
                let suffix = format!(" at {}", error.span());
                text.strip_suffix(&suffix).unwrap_or(&text).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_converts_to_parse_error() {
        let lex = LexError::UnterminatedString {
            span: Span::new(3, 7, 4),
        };
        let parse: ParseError = lex.into();

        assert_eq!(parse.kind, ParseErrorKind::Lexical);
        assert_eq!(parse.span, Span::new(3, 7, 4));
        assert!(parse.message.contains("unterminated string"));
    }

    #[test]
    fn parse_error_display() {
        let error = ParseError::expected_token(Span::new(1, 7, 1), "')'", "':'");
        assert_eq!(
            error.to_string(),
            "expected token at 1:7: expected ')', found ':'"
        );
    }

    #[test]
    fn compilation_error_span_and_message() {
        let error: CompilationError = CompileError::ReturnOutsideFunction {
            span: Span::new(4, 1, 6),
        }
        .into();

        assert_eq!(error.span(), Span::new(4, 1, 6));
        assert_eq!(error.message(), "'return' outside function");
    }

    #[test]
    fn async_error_message_names_the_statement() {
        let error: CompilationError = CompileError::OutsideAsyncFunction {
            what: "async with",
            span: Span::new(2, 5, 10),
        }
        .into();
        assert_eq!(error.message(), "'async with' outside async function");
    }

    #[test]
    fn tab_error_converts_to_lexical_parse_error() {
        let parse: ParseError = LexError::TabError { span: Span::point(3, 1) }.into();
        assert_eq!(parse.kind, ParseErrorKind::Lexical);
        assert!(parse.message.starts_with("inconsistent use of tabs and spaces"));
    }

    #[test]
    fn compilation_error_message_for_parse_errors() {
        let error: CompilationError =
            ParseError::expected_expression(Span::point(2, 3), "newline").into();
        assert_eq!(error.message(), "expected expression, found newline");
    }
}
