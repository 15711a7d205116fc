//! Literal decoding: integers, floats, string and bytes escapes, implicit
//! concatenation and f-strings.

use super::parser::Parser;
use crate::ast::expr::*;
use crate::ast::{ParseError, ParseErrorKind};
use crate::lexer::{Lexer, Token, TokenKind};
use pydiff_core::Span;

/// f-string fields may nest inside a format spec only this deep.
const MAX_FSTRING_NESTING: u32 = 2;

/// Convert an integer literal to canonical decimal text.
///
/// Accepts decimal, `0x`, `0o` and `0b` forms with `_` separators. The
/// lexer has already validated the digits.
pub(super) fn parse_int(lexeme: &str) -> String {
    let cleaned: String = lexeme.chars().filter(|&c| c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();

    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else {
        let trimmed = lower.trim_start_matches('0');
        return if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        };
    };

    // Little-endian limbs in base 10^9.
    const LIMB: u64 = 1_000_000_000;
    let mut limbs: Vec<u64> = vec![0];
    for digit in digits.chars().filter_map(|c| c.to_digit(radix)) {
        let mut carry = u64::from(digit);
        for limb in limbs.iter_mut() {
            let value = *limb * u64::from(radix) + carry;
            *limb = value % LIMB;
            carry = value / LIMB;
        }
        while carry > 0 {
            limbs.push(carry % LIMB);
            carry /= LIMB;
        }
    }

    let mut text = String::new();
    let mut iter = limbs.iter().rev();
    if let Some(top) = iter.next() {
        text.push_str(&top.to_string());
    }
    for limb in iter {
        text.push_str(&format!("{limb:09}"));
    }
    text
}

/// Parse a float literal (or the numeric part of an imaginary literal).
pub(super) fn parse_float(lexeme: &str) -> Option<f64> {
    let cleaned: String = lexeme.chars().filter(|&c| c != '_').collect();
    cleaned.parse::<f64>().ok()
}

/// Prefix flags of a string token.
#[derive(Debug, Clone, Copy, Default)]
struct StringPrefix {
    raw: bool,
    bytes: bool,
    format: bool,
}

/// A string token split into its prefix and body.
struct StringPiece<'t> {
    prefix: StringPrefix,
    body: &'t str,
    /// Position of the first body character.
    line: u32,
    col: u32,
    span: Span,
}

fn split_string_token<'t>(token: &Token<'t>) -> StringPiece<'t> {
    let lexeme = token.lexeme;
    let quote_at = lexeme.find(['\'', '"']).unwrap_or(0);
    let mut prefix = StringPrefix::default();
    for c in lexeme[..quote_at].chars() {
        match c.to_ascii_lowercase() {
            'r' => prefix.raw = true,
            'b' => prefix.bytes = true,
            'f' => prefix.format = true,
            _ => {}
        }
    }

    let quoted = &lexeme[quote_at..];
    let quote_len = if quoted.starts_with("'''") || quoted.starts_with("\"\"\"") {
        3
    } else {
        1
    };
    let body = quoted
        .get(quote_len..quoted.len().saturating_sub(quote_len))
        .unwrap_or("");

    StringPiece {
        prefix,
        body,
        line: token.span.line,
        col: token.span.col + (quote_at + quote_len) as u32,
        span: token.span,
    }
}

fn escape_error(span: Span, message: impl Into<String>) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidEscapeSequence, span, message)
}

/// Character stream over a literal body that keeps track of positions.
struct LiteralCursor {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl LiteralCursor {
    fn new(body: &str, line: u32, col: u32) -> Self {
        Self {
            chars: body.chars().collect(),
            pos: 0,
            line,
            col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn take_digits(&mut self, radix: u32, max: usize) -> String {
        let mut digits = String::new();
        while digits.len() < max {
            match self.peek() {
                Some(c) if c.is_digit(radix) => {
                    digits.push(c);
                    self.advance();
                }
                _ => break,
            }
        }
        digits
    }
}

/// Output of escape decoding: text for `str`, bytes for `bytes`.
trait LiteralSink {
    fn push_char(&mut self, c: char, span: Span) -> Result<(), ParseError>;
    fn push_code(&mut self, code: u32, span: Span) -> Result<(), ParseError>;
    fn push_str(&mut self, s: &str, span: Span) -> Result<(), ParseError> {
        s.chars().try_for_each(|c| self.push_char(c, span))
    }
    /// Whether `\u`, `\U` and `\N` are escapes.
    fn unicode_escapes(&self) -> bool;
}

impl LiteralSink for String {
    fn push_char(&mut self, c: char, _span: Span) -> Result<(), ParseError> {
        self.push(c);
        Ok(())
    }

    fn push_code(&mut self, code: u32, span: Span) -> Result<(), ParseError> {
        if code > 0x10FFFF {
            return Err(escape_error(span, "illegal Unicode character"));
        }
        // Lone surrogates cannot live in a Rust string.
        self.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
        Ok(())
    }

    fn unicode_escapes(&self) -> bool {
        true
    }
}

impl LiteralSink for Vec<u8> {
    fn push_char(&mut self, c: char, span: Span) -> Result<(), ParseError> {
        if !c.is_ascii() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidLiteral,
                span,
                "bytes can only contain ASCII literal characters.",
            ));
        }
        self.push(c as u8);
        Ok(())
    }

    fn push_code(&mut self, code: u32, _span: Span) -> Result<(), ParseError> {
        self.push((code & 0xFF) as u8);
        Ok(())
    }

    fn unicode_escapes(&self) -> bool {
        false
    }
}

/// Decode one backslash escape; the cursor sits just after the backslash.
fn decode_escape(cursor: &mut LiteralCursor, out: &mut impl LiteralSink) -> Result<(), ParseError> {
    let start = cursor.span();
    let Some(c) = cursor.advance() else {
        return out.push_char('\\', start);
    };

    let simple = match c {
        '\n' => return Ok(()),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(decoded) = simple {
        return out.push_char(decoded, start);
    }

    match c {
        '0'..='7' => {
            let mut digits = c.to_string();
            digits.push_str(&cursor.take_digits(8, 2));
            let code = u32::from_str_radix(&digits, 8).unwrap_or(0);
            out.push_code(code, start)
        }
        'x' => hex_escape(cursor, out, 2, start, "truncated \\xXX escape"),
        'u' if out.unicode_escapes() => hex_escape(cursor, out, 4, start, "truncated \\uXXXX escape"),
        'U' if out.unicode_escapes() => {
            hex_escape(cursor, out, 8, start, "truncated \\UXXXXXXXX escape")
        }
        'N' if out.unicode_escapes() && cursor.peek() == Some('{') => {
            // Named escapes are kept verbatim.
            let mut text = String::from("\\N");
            while let Some(c) = cursor.advance() {
                text.push(c);
                if c == '}' {
                    return out.push_str(&text, start);
                }
            }
            Err(escape_error(start, "malformed \\N character escape"))
        }
        other => {
            out.push_char('\\', start)?;
            out.push_char(other, start)
        }
    }
}

fn hex_escape(
    cursor: &mut LiteralCursor,
    out: &mut impl LiteralSink,
    width: usize,
    start: Span,
    message: &str,
) -> Result<(), ParseError> {
    let digits = cursor.take_digits(16, width);
    if digits.len() != width {
        return Err(escape_error(start, message));
    }
    let code = u32::from_str_radix(&digits, 16).map_err(|_| escape_error(start, message))?;
    out.push_code(code, start)
}

/// Decode a whole non-f-string body.
fn decode_body(piece: &StringPiece<'_>, out: &mut impl LiteralSink) -> Result<(), ParseError> {
    let mut cursor = LiteralCursor::new(piece.body, piece.line, piece.col);
    while let Some(c) = cursor.peek() {
        let span = cursor.span();
        cursor.advance();
        if c == '\\' && !piece.prefix.raw {
            decode_escape(&mut cursor, out)?;
        } else {
            out.push_char(c, span)?;
        }
    }
    Ok(())
}

/// Accumulates the parts of a joined string, merging adjacent literals.
#[derive(Default)]
struct JoinedBuilder<'ast> {
    parts: Vec<FStringPart<'ast>>,
    literal: String,
}

impl<'ast> JoinedBuilder<'ast> {
    fn flush(&mut self, parser: &Parser<'ast>) {
        if !self.literal.is_empty() {
            let text = parser.arena.alloc_str(&self.literal);
            self.parts.push(FStringPart::Literal(text));
            self.literal.clear();
        }
    }

    fn push_formatted(&mut self, parser: &Parser<'ast>, value: FormattedValue<'ast>) {
        self.flush(parser);
        self.parts.push(FStringPart::Formatted(value));
    }

    fn finish(mut self, parser: &Parser<'ast>, span: Span) -> &'ast JoinedStrExpr<'ast> {
        self.flush(parser);
        parser.arena.alloc(JoinedStrExpr {
            values: parser.arena.alloc_slice_copy(&self.parts),
            span,
        })
    }
}

impl<'ast> Parser<'ast> {
    /// Parse one or more adjacent string tokens into a single constant or
    /// f-string.
    pub(super) fn parse_strings(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let mut pieces = Vec::new();
        while self.check(TokenKind::String) {
            pieces.push(split_string_token(&self.advance()));
        }

        let Some(first) = pieces.first() else {
            return Err(self.unexpected("string"));
        };
        let span = pieces
            .iter()
            .fold(first.span, |span, piece| span.merge(piece.span));

        let bytes = first.prefix.bytes;
        if let Some(mixed) = pieces.iter().find(|p| p.prefix.bytes != bytes) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidLiteral,
                mixed.span,
                "cannot mix bytes and nonbytes literals",
            ));
        }

        if bytes {
            let mut out = Vec::new();
            for piece in &pieces {
                decode_body(piece, &mut out)?;
            }
            let value = Constant::Bytes(self.arena.alloc_slice_copy(&out));
            return Ok(self.arena.alloc(Expr::Constant(ConstantExpr { value, span })));
        }

        if !pieces.iter().any(|p| p.prefix.format) {
            let mut out = String::new();
            for piece in &pieces {
                decode_body(piece, &mut out)?;
            }
            let value = Constant::Str(self.arena.alloc_str(&out));
            return Ok(self.arena.alloc(Expr::Constant(ConstantExpr { value, span })));
        }

        let mut builder = JoinedBuilder::default();
        for piece in &pieces {
            if piece.prefix.format {
                let mut cursor = LiteralCursor::new(piece.body, piece.line, piece.col);
                self.parse_fstring_body(&mut cursor, piece.prefix.raw, 0, &mut builder)?;
            } else {
                decode_body(piece, &mut builder.literal)?;
            }
        }
        let joined = builder.finish(self, span);
        Ok(self.arena.alloc(Expr::JoinedStr(joined)))
    }

    /// Parse f-string content until the end of the body, or (inside a
    /// format spec, `depth > 0`) until the `}` closing the field.
    fn parse_fstring_body(
        &mut self,
        cursor: &mut LiteralCursor,
        raw: bool,
        depth: u32,
        out: &mut JoinedBuilder<'ast>,
    ) -> Result<(), ParseError> {
        while let Some(c) = cursor.peek() {
            let span = cursor.span();
            match c {
                '{' if depth == 0 && cursor.peek_nth(1) == Some('{') => {
                    cursor.advance();
                    cursor.advance();
                    out.literal.push('{');
                }
                '}' if depth == 0 && cursor.peek_nth(1) == Some('}') => {
                    cursor.advance();
                    cursor.advance();
                    out.literal.push('}');
                }
                '}' if depth > 0 => return Ok(()),
                '}' => {
                    return Err(fstring_error(span, "f-string: single '}' is not allowed"));
                }
                '{' => {
                    if depth >= MAX_FSTRING_NESTING {
                        return Err(fstring_error(span, "f-string: expressions nested too deeply"));
                    }
                    cursor.advance();
                    self.parse_fstring_field(cursor, raw, depth, out)?;
                }
                '\\' if !raw => {
                    cursor.advance();
                    decode_escape(cursor, &mut out.literal)?;
                }
                _ => {
                    cursor.advance();
                    out.literal.push(c);
                }
            }
        }
        Ok(())
    }

    /// Parse one `{expr[=][!c][:spec]}` field; the cursor sits after `{`.
    fn parse_fstring_field(
        &mut self,
        cursor: &mut LiteralCursor,
        raw: bool,
        depth: u32,
        out: &mut JoinedBuilder<'ast>,
    ) -> Result<(), ParseError> {
        let (line, col) = (cursor.line, cursor.col);
        let field_span = Span::point(line, col);
        let text = scan_fstring_expression(cursor)?;
        if text.trim().is_empty() {
            return Err(fstring_error(field_span, "f-string: empty expression not allowed"));
        }

        let value = self.parse_fstring_expression(&text, line, col)?;

        let mut self_documenting = false;
        if cursor.peek() == Some('=') {
            cursor.advance();
            self_documenting = true;
            out.literal.push_str(&text);
            out.literal.push('=');
            while let Some(c) = cursor.peek().filter(|c| c.is_whitespace()) {
                cursor.advance();
                out.literal.push(c);
            }
        }

        let mut conversion = None;
        if cursor.peek() == Some('!') {
            cursor.advance();
            match cursor.advance() {
                Some(c @ ('s' | 'r' | 'a')) => conversion = Some(c),
                _ => {
                    return Err(fstring_error(
                        cursor.span(),
                        "f-string: invalid conversion character: expected 's', 'r', or 'a'",
                    ));
                }
            }
        }

        let mut format_spec = None;
        if cursor.peek() == Some(':') {
            let spec_span = cursor.span();
            cursor.advance();
            let mut spec = JoinedBuilder::default();
            self.parse_fstring_body(cursor, raw, depth + 1, &mut spec)?;
            format_spec = Some(spec.finish(self, spec_span));
        }

        if cursor.advance() != Some('}') {
            return Err(fstring_error(cursor.span(), "f-string: expecting '}'"));
        }

        if self_documenting && conversion.is_none() && format_spec.is_none() {
            conversion = Some('r');
        }

        out.push_formatted(
            self,
            FormattedValue {
                value,
                conversion,
                format_spec,
            },
        );
        Ok(())
    }

    /// Parse the text of an f-string field as an expression, sharing this
    /// parser's arena and scope numbering.
    fn parse_fstring_expression(
        &mut self,
        text: &str,
        line: u32,
        col: u32,
    ) -> Result<&'ast Expr<'ast>, ParseError> {
        let tokens = Lexer::fragment(text, self.arena, line, col).collect_all()?;
        let mut sub = Parser::for_fragment(tokens, self.arena, self.next_scope);
        let value = sub.parse_yield_or_testlist()?;
        sub.expect(TokenKind::Eof)?;
        self.next_scope = sub.next_scope;
        Ok(value)
    }
}

/// Scan the expression part of a field, stopping before the `=`, `!`, `:`
/// or `}` that ends it.
fn scan_fstring_expression(cursor: &mut LiteralCursor) -> Result<String, ParseError> {
    let mut text = String::new();
    let mut nesting = 0usize;
    let mut quote: Option<(char, bool)> = None;

    loop {
        let span = cursor.span();
        let Some(c) = cursor.peek() else {
            return Err(fstring_error(span, "f-string: expecting '}'"));
        };

        if c == '\\' {
            return Err(fstring_error(
                span,
                "f-string expression part cannot include a backslash",
            ));
        }

        if let Some((q, triple)) = quote {
            if c == q {
                if !triple {
                    quote = None;
                } else if cursor.peek_nth(1) == Some(q) && cursor.peek_nth(2) == Some(q) {
                    text.push(q);
                    text.push(q);
                    cursor.advance();
                    cursor.advance();
                    quote = None;
                }
            }
            text.push(c);
            cursor.advance();
            continue;
        }

        match c {
            '\'' | '"' => {
                let triple = cursor.peek_nth(1) == Some(c) && cursor.peek_nth(2) == Some(c);
                if triple {
                    text.push(c);
                    text.push(c);
                    cursor.advance();
                    cursor.advance();
                }
                quote = Some((c, triple));
            }
            '#' => {
                return Err(fstring_error(span, "f-string expression part cannot include '#'"));
            }
            '(' | '[' | '{' => nesting += 1,
            ')' | ']' => nesting = nesting.saturating_sub(1),
            '}' if nesting > 0 => nesting -= 1,
            '}' => return Ok(text),
            '=' | '!' | '<' | '>' if nesting == 0 && cursor.peek_nth(1) == Some('=') => {
                text.push(c);
                text.push('=');
                cursor.advance();
                cursor.advance();
                continue;
            }
            '=' | '!' | ':' if nesting == 0 => return Ok(text),
            _ => {}
        }

        text.push(c);
        cursor.advance();
    }
}

fn fstring_error(span: Span, message: &str) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidSyntax, span, message)
}
