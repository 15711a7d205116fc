/// A cursor over source text that tracks position.
///
/// Provides low-level character access with peek/advance semantics.
/// Tracks byte offset, line number, and column number as it advances.
/// Columns count characters, not bytes.
pub struct Cursor<'src> {
    /// The source text being scanned.
    source: &'src str,
    /// Remaining source text (slice starting at current position).
    rest: &'src str,
    /// Current byte offset from start of source.
    offset: u32,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
}

impl<'src> Cursor<'src> {
    /// Create a new cursor at the start of the source.
    pub fn new(source: &'src str) -> Self {
        Self::with_position(source, 1, 1)
    }

    /// Create a cursor whose first character sits at `line:column`.
    ///
    /// Used for source fragments embedded in a larger file, such as the
    /// expression part of an f-string replacement field.
    pub fn with_position(source: &'src str, line: u32, column: u32) -> Self {
        Self {
            source,
            rest: source,
            offset: 0,
            line,
            column,
        }
    }

    /// Current byte offset from start of source.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Current line number (1-indexed).
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current column number (1-indexed).
    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Check if we've reached the end of input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.rest.is_empty()
    }

    /// Peek at the current character without consuming it.
    #[inline]
    pub fn peek(&self) -> Option<char> {
        let first = *self.rest.as_bytes().first()?;
        if first < 128 {
            Some(first as char)
        } else {
            self.rest.chars().next()
        }
    }

    /// Peek at the nth character ahead (0 = current).
    #[inline]
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    /// Check if the current character satisfies a predicate.
    #[inline]
    pub fn check(&self, f: impl Fn(char) -> bool) -> bool {
        self.peek().is_some_and(f)
    }

    /// Check if the upcoming text matches the given string.
    #[inline]
    pub fn check_str(&self, s: &str) -> bool {
        self.rest.starts_with(s)
    }

    /// Consume the current character and advance.
    ///
    /// Returns the consumed character, or `None` if at EOF.
    pub fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        let len = ch.len_utf8();
        self.rest = &self.rest[len..];
        self.offset += len as u32;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    /// Advance over the given text, which must be what comes next.
    pub fn advance_str(&mut self, s: &str) {
        debug_assert!(self.rest.starts_with(s));
        for _ in s.chars() {
            self.advance();
        }
    }

    /// Consume if the current character matches.
    #[inline]
    pub fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume characters while the predicate matches.
    ///
    /// Returns the consumed slice.
    pub fn eat_while(&mut self, f: impl Fn(char) -> bool) -> &'src str {
        let start = self.offset;
        while self.check(&f) {
            self.advance();
        }
        self.slice_from(start)
    }

    /// Get a slice of source from a starting offset to current position.
    #[inline]
    pub fn slice_from(&self, start: u32) -> &'src str {
        &self.source[start as usize..self.offset as usize]
    }
}

/// Check if a character can start an identifier.
#[inline]
pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier.
#[inline]
pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_basics() {
        let mut cursor = Cursor::new("hello");
        assert_eq!(cursor.peek(), Some('h'));
        assert_eq!(cursor.offset(), 0);

        assert_eq!(cursor.advance(), Some('h'));
        assert_eq!(cursor.peek(), Some('e'));
        assert_eq!(cursor.offset(), 1);
    }

    #[test]
    fn cursor_eat() {
        let mut cursor = Cursor::new("hello");

        assert!(cursor.eat('h'));
        assert!(!cursor.eat('h'));
        assert!(cursor.eat('e'));
    }

    #[test]
    fn cursor_eat_while() {
        let mut cursor = Cursor::new("aaabbb");

        assert_eq!(cursor.eat_while(|c| c == 'a'), "aaa");
        assert_eq!(cursor.eat_while(|c| c == 'b'), "bbb");
        assert!(cursor.is_eof());
    }

    #[test]
    fn cursor_peek_nth() {
        let cursor = Cursor::new("abc");
        assert_eq!(cursor.peek_nth(0), Some('a'));
        assert_eq!(cursor.peek_nth(2), Some('c'));
        assert_eq!(cursor.peek_nth(3), None);
    }

    #[test]
    fn cursor_counts_columns_in_characters() {
        let mut cursor = Cursor::new("héllo");

        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.offset(), 3);
        assert_eq!(cursor.column(), 3);
    }

    #[test]
    fn cursor_line_and_column() {
        let mut cursor = Cursor::new("ab\ncd");

        cursor.advance();
        cursor.advance();
        assert_eq!((cursor.line(), cursor.column()), (1, 3));

        cursor.advance();
        assert_eq!((cursor.line(), cursor.column()), (2, 1));
    }

    #[test]
    fn cursor_with_position_offsets_tracking() {
        let mut cursor = Cursor::with_position("a+b", 4, 10);
        cursor.advance();
        assert_eq!((cursor.line(), cursor.column()), (4, 11));
    }

    #[test]
    fn cursor_slice_from() {
        let mut cursor = Cursor::new("hello world");
        let start = cursor.offset();

        cursor.eat_while(|ch| ch != ' ');
        assert_eq!(cursor.slice_from(start), "hello");
    }

    #[test]
    fn ident_classes() {
        assert!(is_ident_start('a'));
        assert!(is_ident_start('_'));
        assert!(is_ident_start('é'));
        assert!(!is_ident_start('0'));

        assert!(is_ident_continue('0'));
        assert!(!is_ident_continue('-'));
    }
}
