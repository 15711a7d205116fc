//! Main lexer implementation for Python source.
//!
//! The [`Lexer`] converts source text into a stream of [`Token`]s, including
//! the layout tokens (`NEWLINE`, `INDENT`, `DEDENT`) that carry Python's block
//! structure. Newlines inside brackets and after a backslash continuation are
//! not significant and produce no tokens.
//!
//! The lexer copies all string content (identifiers, literals) into the arena,
//! allowing the source string to be freed after lexing completes.

use std::collections::VecDeque;

use bumpalo::Bump;
use pydiff_core::{LexError, Span};

use super::cursor::{Cursor, is_ident_continue, is_ident_start};
use super::token::{OPERATORS, Token, TokenKind, lookup_keyword};

/// Tab stops used when measuring indentation.
const TAB_SIZE: u32 = 8;
/// Tab stops of the second measurement that catches tab/space mixes whose
/// meaning depends on the tab width.
const ALT_TAB_SIZE: u32 = 1;
/// Deepest block nesting the tokenizer accepts.
const MAX_INDENT: usize = 100;
/// Deepest bracket nesting the tokenizer accepts.
const MAX_BRACKETS: usize = 200;

/// Position captured at the start of a token.
#[derive(Clone, Copy)]
struct Mark {
    line: u32,
    col: u32,
    offset: u32,
}

/// Lexer for Python source code.
///
/// The `'src` lifetime is the source string being lexed (temporary).
/// The `'ast` lifetime is the arena where token lexemes are allocated (persists).
pub struct Lexer<'src, 'ast> {
    /// Low-level character cursor.
    cursor: Cursor<'src>,
    /// Arena for allocating token lexemes.
    arena: &'ast Bump,
    /// Indentation widths of the enclosing blocks, measured with both tab
    /// sizes; always starts with `(0, 0)`.
    indents: Vec<(u32, u32)>,
    /// Open brackets with their positions.
    brackets: Vec<(char, Span)>,
    /// Tokens produced ahead of time (dedents, end-of-file sequence).
    pending: VecDeque<Token<'ast>>,
    /// Whether the cursor sits at the start of a logical line.
    at_line_start: bool,
    /// Kind of the last token handed out.
    last_kind: Option<TokenKind>,
    /// Lexing an embedded expression: no layout tokens at all.
    fragment: bool,
    /// Set once `EOF` has been produced.
    finished: bool,
}

impl<'src, 'ast> Lexer<'src, 'ast> {
    /// Create a new lexer for a complete module.
    pub fn new(source: &'src str, arena: &'ast Bump) -> Self {
        Self {
            cursor: Cursor::new(source),
            arena,
            indents: vec![(0, 0)],
            brackets: Vec::new(),
            pending: VecDeque::new(),
            at_line_start: true,
            last_kind: None,
            fragment: false,
            finished: false,
        }
    }

    /// Create a lexer for an expression embedded in a larger file.
    ///
    /// Positions start at `line:col` and line breaks are insignificant, as
    /// they are inside brackets.
    pub fn fragment(source: &'src str, arena: &'ast Bump, line: u32, col: u32) -> Self {
        Self {
            cursor: Cursor::with_position(source, line, col),
            at_line_start: false,
            fragment: true,
            ..Self::new(source, arena)
        }
    }

    /// Tokenize an entire module, ending with `EOF`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn tokenize(source: &'src str, arena: &'ast Bump) -> Result<Vec<Token<'ast>>, LexError> {
        Self::new(source, arena).collect_all()
    }

    /// Drain the lexer into a vector, ending with `EOF`.
    pub fn collect_all(mut self) -> Result<Vec<Token<'ast>>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Drain the lexer, stopping at the first error.
    ///
    /// On failure the tokens scanned so far are returned followed by an `EOF`
    /// at the error position, so a parser can report an earlier syntax error
    /// before the lexical one.
    pub fn collect_partial(mut self) -> (Vec<Token<'ast>>, Option<LexError>) {
        let mut tokens = Vec::new();
        loop {
            match self.next_token() {
                Ok(token) => {
                    let done = token.kind == TokenKind::Eof;
                    tokens.push(token);
                    if done {
                        return (tokens, None);
                    }
                }
                Err(error) => {
                    tokens.push(Token::new(TokenKind::Eof, "", error.span()));
                    return (tokens, Some(error));
                }
            }
        }
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self) -> Result<Token<'ast>, LexError> {
        let token = match self.pending.pop_front() {
            Some(token) => token,
            None => self.scan_token()?,
        };
        self.last_kind = Some(token.kind);
        Ok(token)
    }

    // =========================================
    // Internal: Layout
    // =========================================

    /// Scan the next token from source.
    fn scan_token(&mut self) -> Result<Token<'ast>, LexError> {
        loop {
            if self.finished {
                return Ok(self.make_layout(TokenKind::Eof));
            }

            if self.at_line_start && self.brackets.is_empty() {
                if let Some(token) = self.scan_indentation()? {
                    return Ok(token);
                }
                if self.at_line_start {
                    // Blank or comment-only line.
                    continue;
                }
            }

            self.skip_spaces();

            let Some(c) = self.cursor.peek() else {
                return self.end_of_input();
            };

            let mark = self.mark();
            match c {
                '#' => self.skip_comment(),
                '\\' => {
                    self.cursor.advance();
                    if !self.cursor.eat('\n') {
                        return Err(LexError::BadContinuation {
                            span: Span::new(mark.line, mark.col, 1),
                        });
                    }
                }
                '\n' => {
                    self.cursor.advance();
                    if self.fragment || !self.brackets.is_empty() {
                        continue;
                    }
                    self.at_line_start = true;
                    return Ok(Token::new(
                        TokenKind::Newline,
                        "",
                        Span::new(mark.line, mark.col, 1),
                    ));
                }
                '\u{FEFF}' if mark.offset == 0 => {
                    self.cursor.advance();
                }
                c if c.is_ascii_digit() => return self.scan_number(mark),
                '.' if self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    return self.scan_number(mark);
                }
                '\'' | '"' => return self.scan_string(mark),
                c if is_ident_start(c) => return self.scan_identifier(mark),
                _ => return self.scan_operator(mark),
            }
        }
    }

    /// Measure the indentation of a new line and emit `INDENT`/`DEDENT`.
    ///
    /// Leaves `at_line_start` set when the line turned out to be blank.
    fn scan_indentation(&mut self) -> Result<Option<Token<'ast>>, LexError> {
        let mut width = 0;
        let mut alt_width = 0;
        loop {
            match self.cursor.peek() {
                Some(' ') => {
                    width += 1;
                    alt_width += 1;
                }
                Some('\t') => {
                    width = (width / TAB_SIZE + 1) * TAB_SIZE;
                    alt_width = (alt_width / ALT_TAB_SIZE + 1) * ALT_TAB_SIZE;
                }
                Some('\x0C') => {
                    width = 0;
                    alt_width = 0;
                }
                _ => break,
            }
            self.cursor.advance();
        }

        match self.cursor.peek() {
            Some('#') => {
                self.skip_comment();
                self.cursor.eat('\n');
                if self.cursor.is_eof() {
                    self.at_line_start = false;
                }
                return Ok(None);
            }
            Some('\n') => {
                self.cursor.advance();
                return Ok(None);
            }
            None => {
                self.at_line_start = false;
                return Ok(None);
            }
            _ => {}
        }

        self.at_line_start = false;
        let mark = self.mark();
        let (current, alt_current) = self.indents.last().copied().unwrap_or((0, 0));
        let tab_error = LexError::TabError {
            span: Span::point(mark.line, mark.col),
        };

        if width > current {
            if self.indents.len() >= MAX_INDENT {
                return Err(LexError::TooDeepIndentation {
                    span: Span::point(mark.line, mark.col),
                });
            }
            if alt_width <= alt_current {
                return Err(tab_error);
            }
            self.indents.push((width, alt_width));
            return Ok(Some(Token::new(
                TokenKind::Indent,
                "",
                Span::new(mark.line, 1, mark.col - 1),
            )));
        }

        if width < current {
            while self.indents.last().is_some_and(|&(top, _)| top > width) {
                self.indents.pop();
                self.pending.push_back(self.make_layout(TokenKind::Dedent));
            }
            match self.indents.last() {
                Some(&(top, alt_top)) if top == width => {
                    if alt_top != alt_width {
                        return Err(tab_error);
                    }
                }
                _ => {
                    return Err(LexError::InconsistentDedent {
                        span: Span::point(mark.line, mark.col),
                    });
                }
            }
            return Ok(self.pending.pop_front());
        }

        if alt_width != alt_current {
            return Err(tab_error);
        }
        Ok(None)
    }

    /// Produce the closing `NEWLINE`, `DEDENT`s and `EOF`.
    fn end_of_input(&mut self) -> Result<Token<'ast>, LexError> {
        if let Some(&(_, span)) = self.brackets.last() {
            return Err(LexError::EofInStatement { span });
        }

        self.finished = true;
        if !self.fragment {
            let needs_newline = !matches!(
                self.last_kind,
                None | Some(TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
            );
            if needs_newline {
                self.pending.push_back(self.make_layout(TokenKind::Newline));
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.pending.push_back(self.make_layout(TokenKind::Dedent));
            }
        }
        self.pending.push_back(self.make_layout(TokenKind::Eof));

        Ok(self.pending.pop_front().unwrap_or_else(|| self.make_layout(TokenKind::Eof)))
    }

    fn skip_spaces(&mut self) {
        self.cursor.eat_while(|c| matches!(c, ' ' | '\t' | '\x0C'));
    }

    fn skip_comment(&mut self) {
        self.cursor.eat_while(|c| c != '\n');
    }

    // =========================================
    // Internal: Token construction
    // =========================================

    fn mark(&self) -> Mark {
        Mark {
            line: self.cursor.line(),
            col: self.cursor.column(),
            offset: self.cursor.offset(),
        }
    }

    /// Create a zero-width layout token at the current position.
    fn make_layout(&self, kind: TokenKind) -> Token<'ast> {
        Token::new(
            kind,
            "",
            Span::point(self.cursor.line(), self.cursor.column()),
        )
    }

    /// Create a token from a mark to the current position.
    /// Copies the lexeme into the arena.
    fn make_token(&self, kind: TokenKind, mark: Mark) -> Token<'ast> {
        let text = self.cursor.slice_from(mark.offset);
        let len = text.chars().count() as u32;
        let lexeme = self.arena.alloc_str(text);
        Token::new(kind, lexeme, Span::new(mark.line, mark.col, len))
    }

    // =========================================
    // Scanning: Numbers
    // =========================================

    /// Scan an integer, float or imaginary literal.
    fn scan_number(&mut self, mark: Mark) -> Result<Token<'ast>, LexError> {
        let radix = match (self.cursor.peek(), self.cursor.peek_nth(1)) {
            (Some('0'), Some('x' | 'X')) => Some(16),
            (Some('0'), Some('o' | 'O')) => Some(8),
            (Some('0'), Some('b' | 'B')) => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            self.cursor.advance();
            self.cursor.advance();
            let digits = self.cursor.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let valid = !digits.is_empty()
                && digits.chars().all(|c| c == '_' || c.is_digit(radix))
                && digit_groups_ok(digits.strip_prefix('_').unwrap_or(digits));
            if !valid {
                return Err(self.invalid_number(mark, "invalid digit in prefixed literal"));
            }
            return Ok(self.make_token(TokenKind::Int, mark));
        }

        let mut kind = TokenKind::Int;
        let integer = self.eat_digits();
        if self.cursor.peek() == Some('.') {
            self.cursor.advance();
            self.eat_digits();
            kind = TokenKind::Float;
        }
        if matches!(self.cursor.peek(), Some('e' | 'E')) {
            let sign = matches!(self.cursor.peek_nth(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self
                .cursor
                .peek_nth(digit_at)
                .is_some_and(|c| c.is_ascii_digit())
            {
                self.cursor.advance();
                if sign {
                    self.cursor.advance();
                }
                self.eat_digits();
                kind = TokenKind::Float;
            }
        }
        if matches!(self.cursor.peek(), Some('j' | 'J')) {
            self.cursor.advance();
            kind = TokenKind::Imaginary;
        }

        let text = self.cursor.slice_from(mark.offset);
        if !text
            .split(|c: char| !(c.is_ascii_digit() || c == '_'))
            .all(digit_groups_ok)
        {
            return Err(self.invalid_number(mark, "invalid decimal literal"));
        }
        if kind == TokenKind::Int
            && integer.len() > 1
            && integer.starts_with('0')
            && integer.chars().any(|c| c.is_ascii_digit() && c != '0')
        {
            return Err(self.invalid_number(
                mark,
                "leading zeros in decimal integer literals are not permitted",
            ));
        }
        if self.cursor.check(is_ident_start) {
            self.cursor.eat_while(is_ident_continue);
            return Err(self.invalid_number(mark, "invalid decimal literal"));
        }

        Ok(self.make_token(kind, mark))
    }

    /// Consume decimal digits (including underscores as separators).
    fn eat_digits(&mut self) -> &'src str {
        self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_')
    }

    fn invalid_number(&self, mark: Mark, detail: &str) -> LexError {
        let len = self.cursor.slice_from(mark.offset).chars().count() as u32;
        LexError::InvalidNumber {
            span: Span::new(mark.line, mark.col, len),
            detail: detail.to_string(),
        }
    }

    // =========================================
    // Scanning: Identifiers and strings
    // =========================================

    /// Scan an identifier, keyword or prefixed string literal.
    fn scan_identifier(&mut self, mark: Mark) -> Result<Token<'ast>, LexError> {
        let ident = self.cursor.eat_while(is_ident_continue);

        if is_string_prefix(ident) && self.cursor.check(|c| c == '\'' || c == '"') {
            return self.scan_string(mark);
        }

        let kind = lookup_keyword(ident).unwrap_or(TokenKind::Name);
        Ok(self.make_token(kind, mark))
    }

    /// Scan a string body starting at the opening quote.
    ///
    /// The prefix, if any, has already been consumed and is part of the lexeme.
    fn scan_string(&mut self, mark: Mark) -> Result<Token<'ast>, LexError> {
        let Some(quote) = self.cursor.advance() else {
            return Err(LexError::UnterminatedString {
                span: Span::point(mark.line, mark.col),
            });
        };
        let triple = self.cursor.peek() == Some(quote) && self.cursor.peek_nth(1) == Some(quote);
        if triple {
            self.cursor.advance();
            self.cursor.advance();
        }

        let unterminated = || LexError::UnterminatedString {
            span: Span::point(mark.line, mark.col),
        };

        loop {
            match self.cursor.peek() {
                None => return Err(unterminated()),
                Some('\\') => {
                    self.cursor.advance();
                    if self.cursor.advance().is_none() {
                        return Err(unterminated());
                    }
                }
                Some('\n') if !triple => return Err(unterminated()),
                Some(c) if c == quote => {
                    if !triple {
                        self.cursor.advance();
                        break;
                    }
                    if self.cursor.peek_nth(1) == Some(quote)
                        && self.cursor.peek_nth(2) == Some(quote)
                    {
                        self.cursor.advance();
                        self.cursor.advance();
                        self.cursor.advance();
                        break;
                    }
                    self.cursor.advance();
                }
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }

        Ok(self.make_token(TokenKind::String, mark))
    }

    // =========================================
    // Scanning: Operators
    // =========================================

    /// Scan an operator or delimiter, tracking bracket nesting.
    fn scan_operator(&mut self, mark: Mark) -> Result<Token<'ast>, LexError> {
        let Some(&(spelling, kind)) = OPERATORS
            .iter()
            .find(|(spelling, _)| self.cursor.check_str(spelling))
        else {
            let ch = self.cursor.peek().unwrap_or('\0');
            return Err(LexError::UnexpectedChar {
                ch,
                span: Span::new(mark.line, mark.col, 1),
            });
        };
        self.cursor.advance_str(spelling);
        let span = Span::new(mark.line, mark.col, spelling.len() as u32);

        let opens = matches!(
            kind,
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace
        );
        if opens && self.brackets.len() >= MAX_BRACKETS {
            return Err(LexError::TooManyNestedParens { span });
        }

        match kind {
            TokenKind::LeftParen => self.brackets.push(('(', span)),
            TokenKind::LeftBracket => self.brackets.push(('[', span)),
            TokenKind::LeftBrace => self.brackets.push(('{', span)),
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                let (open, close) = match kind {
                    TokenKind::RightParen => ('(', ')'),
                    TokenKind::RightBracket => ('[', ']'),
                    _ => ('{', '}'),
                };
                match self.brackets.pop() {
                    Some((opened, _)) if opened == open => {}
                    _ => return Err(LexError::UnmatchedBracket { ch: close, span }),
                }
            }
            _ => {}
        }

        Ok(self.make_token(kind, mark))
    }
}

/// Whether an identifier is a valid string prefix (`r`, `b`, `u`, `f` and
/// the two-letter combinations Python accepts).
fn is_string_prefix(ident: &str) -> bool {
    matches!(
        ident.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
    )
}

/// Underscores may only separate digits: no doubles, none trailing.
fn digit_groups_ok(digits: &str) -> bool {
    !digits.contains("__") && !digits.ends_with('_') && !digits.starts_with('_')
}
