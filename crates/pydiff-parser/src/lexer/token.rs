//! Token types and definitions for the Python lexer.

use pydiff_core::Span;
use std::fmt;

/// A token from the source code.
///
/// The `'ast` lifetime refers to the arena where the lexeme string is allocated.
/// This allows the source string to be freed after lexing, since all string
/// content is copied into the arena.
#[derive(Clone, Copy, PartialEq)]
pub struct Token<'ast> {
    /// The type of token.
    pub kind: TokenKind,
    /// The source text of this token (allocated in arena).
    pub lexeme: &'ast str,
    /// Location in source.
    pub span: Span,
}

impl<'ast> Token<'ast> {
    /// Create a new token.
    #[inline]
    pub fn new(kind: TokenKind, lexeme: &'ast str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?} @ {:?})", self.kind, self.lexeme, self.span)
    }
}

/// All possible token types in the supported Python grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================
    // Literals
    // =========================================
    /// Integer literal: `42`, `0xFF`, `1_000`
    Int,
    /// Float literal: `3.14`, `1e10`, `.5`
    Float,
    /// Imaginary literal: `2j`, `1.5J`
    Imaginary,
    /// String or bytes literal, prefix and quotes included: `'a'`, `rb"x"`, `f"{x}"`
    String,

    // =========================================
    // Identifiers
    // =========================================
    /// User-defined name
    Name,

    // =========================================
    // Keywords
    // =========================================
    /// `False`
    False,
    /// `None`
    None,
    /// `True`
    True,
    /// `and`
    And,
    /// `as`
    As,
    /// `assert`
    Assert,
    /// `async`
    Async,
    /// `await`
    Await,
    /// `break`
    Break,
    /// `class`
    Class,
    /// `continue`
    Continue,
    /// `def`
    Def,
    /// `del`
    Del,
    /// `elif`
    Elif,
    /// `else`
    Else,
    /// `except`
    Except,
    /// `finally`
    Finally,
    /// `for`
    For,
    /// `from`
    From,
    /// `global`
    Global,
    /// `if`
    If,
    /// `import`
    Import,
    /// `in`
    In,
    /// `is`
    Is,
    /// `lambda`
    Lambda,
    /// `nonlocal`
    Nonlocal,
    /// `not`
    Not,
    /// `or`
    Or,
    /// `pass`
    Pass,
    /// `raise`
    Raise,
    /// `return`
    Return,
    /// `try`
    Try,
    /// `while`
    While,
    /// `with`
    With,
    /// `yield`
    Yield,

    // =========================================
    // Operators - Arithmetic
    // =========================================
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `/`
    Slash,
    /// `//`
    SlashSlash,
    /// `%`
    Percent,
    /// `@`
    At,

    // =========================================
    // Operators - Bitwise
    // =========================================
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `~`
    Tilde,
    /// `<<`
    LessLess,
    /// `>>`
    GreaterGreater,

    // =========================================
    // Operators - Comparison
    // =========================================
    /// `==`
    EqualEqual,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,

    // =========================================
    // Operators - Assignment
    // =========================================
    /// `=`
    Equal,
    /// `+=`
    PlusEqual,
    /// `-=`
    MinusEqual,
    /// `*=`
    StarEqual,
    /// `/=`
    SlashEqual,
    /// `//=`
    SlashSlashEqual,
    /// `%=`
    PercentEqual,
    /// `@=`
    AtEqual,
    /// `&=`
    AmpEqual,
    /// `|=`
    PipeEqual,
    /// `^=`
    CaretEqual,
    /// `<<=`
    LessLessEqual,
    /// `>>=`
    GreaterGreaterEqual,
    /// `**=`
    StarStarEqual,
    /// `:=`
    ColonEqual,

    // =========================================
    // Delimiters
    // =========================================
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `;`
    Semicolon,
    /// `->`
    Arrow,
    /// `...`
    Ellipsis,

    // =========================================
    // Layout
    // =========================================
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased
    Dedent,
    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if this token kind is a keyword.
    pub fn is_keyword(self) -> bool {
        lookup_keyword(self.description().trim_matches('\'')) == Some(self)
    }

    /// Check if this token kind is an augmented assignment operator.
    pub fn is_augmented_assign(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            PlusEqual
                | MinusEqual
                | StarEqual
                | SlashEqual
                | SlashSlashEqual
                | PercentEqual
                | AtEqual
                | AmpEqual
                | PipeEqual
                | CaretEqual
                | LessLessEqual
                | GreaterGreaterEqual
                | StarStarEqual
        )
    }

    /// Check if this token kind can begin an expression.
    pub fn starts_expression(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Int | Float
                | Imaginary
                | String
                | Name
                | False
                | None
                | True
                | Lambda
                | Not
                | Plus
                | Minus
                | Tilde
                | Star
                | LeftParen
                | LeftBracket
                | LeftBrace
                | Ellipsis
                | Yield
                | Await
        )
    }

    /// Get the string representation of this token kind for error messages.
    pub fn description(self) -> &'static str {
        use TokenKind::*;
        match self {
            Int => "integer literal",
            Float => "float literal",
            Imaginary => "imaginary literal",
            String => "string literal",
            Name => "identifier",
            False => "'False'",
            None => "'None'",
            True => "'True'",
            And => "'and'",
            As => "'as'",
            Assert => "'assert'",
            Async => "'async'",
            Await => "'await'",
            Break => "'break'",
            Class => "'class'",
            Continue => "'continue'",
            Def => "'def'",
            Del => "'del'",
            Elif => "'elif'",
            Else => "'else'",
            Except => "'except'",
            Finally => "'finally'",
            For => "'for'",
            From => "'from'",
            Global => "'global'",
            If => "'if'",
            Import => "'import'",
            In => "'in'",
            Is => "'is'",
            Lambda => "'lambda'",
            Nonlocal => "'nonlocal'",
            Not => "'not'",
            Or => "'or'",
            Pass => "'pass'",
            Raise => "'raise'",
            Return => "'return'",
            Try => "'try'",
            While => "'while'",
            With => "'with'",
            Yield => "'yield'",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            StarStar => "'**'",
            Slash => "'/'",
            SlashSlash => "'//'",
            Percent => "'%'",
            At => "'@'",
            Amp => "'&'",
            Pipe => "'|'",
            Caret => "'^'",
            Tilde => "'~'",
            LessLess => "'<<'",
            GreaterGreater => "'>>'",
            EqualEqual => "'=='",
            BangEqual => "'!='",
            Less => "'<'",
            LessEqual => "'<='",
            Greater => "'>'",
            GreaterEqual => "'>='",
            Equal => "'='",
            PlusEqual => "'+='",
            MinusEqual => "'-='",
            StarEqual => "'*='",
            SlashEqual => "'/='",
            SlashSlashEqual => "'//='",
            PercentEqual => "'%='",
            AtEqual => "'@='",
            AmpEqual => "'&='",
            PipeEqual => "'|='",
            CaretEqual => "'^='",
            LessLessEqual => "'<<='",
            GreaterGreaterEqual => "'>>='",
            StarStarEqual => "'**='",
            ColonEqual => "':='",
            LeftParen => "'('",
            RightParen => "')'",
            LeftBracket => "'['",
            RightBracket => "']'",
            LeftBrace => "'{'",
            RightBrace => "'}'",
            Comma => "','",
            Colon => "':'",
            Dot => "'.'",
            Semicolon => "';'",
            Arrow => "'->'",
            Ellipsis => "'...'",
            Newline => "newline",
            Indent => "indent",
            Dedent => "dedent",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Look up a keyword from an identifier string.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match ident {
        // Values
        "False" => False,
        "None" => None,
        "True" => True,

        // Control flow
        "if" => If,
        "elif" => Elif,
        "else" => Else,
        "for" => For,
        "while" => While,
        "break" => Break,
        "continue" => Continue,
        "return" => Return,
        "try" => Try,
        "except" => Except,
        "finally" => Finally,
        "raise" => Raise,
        "with" => With,
        "yield" => Yield,
        "pass" => Pass,
        "assert" => Assert,

        // Declarations
        "def" => Def,
        "class" => Class,
        "lambda" => Lambda,
        "del" => Del,
        "global" => Global,
        "nonlocal" => Nonlocal,
        "import" => Import,
        "from" => From,
        "as" => As,
        "async" => Async,
        "await" => Await,

        // Word operators
        "and" => And,
        "or" => Or,
        "not" => Not,
        "in" => In,
        "is" => Is,

        _ => return Option::None,
    })
}

/// Operators and delimiters, longest spelling first within each leading character.
pub(crate) const OPERATORS: &[(&str, TokenKind)] = &[
    ("**=", TokenKind::StarStarEqual),
    ("//=", TokenKind::SlashSlashEqual),
    ("<<=", TokenKind::LessLessEqual),
    (">>=", TokenKind::GreaterGreaterEqual),
    ("...", TokenKind::Ellipsis),
    ("**", TokenKind::StarStar),
    ("//", TokenKind::SlashSlash),
    ("<<", TokenKind::LessLess),
    (">>", TokenKind::GreaterGreater),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::BangEqual),
    ("->", TokenKind::Arrow),
    ("+=", TokenKind::PlusEqual),
    ("-=", TokenKind::MinusEqual),
    ("*=", TokenKind::StarEqual),
    ("/=", TokenKind::SlashEqual),
    ("%=", TokenKind::PercentEqual),
    ("@=", TokenKind::AtEqual),
    ("&=", TokenKind::AmpEqual),
    ("|=", TokenKind::PipeEqual),
    ("^=", TokenKind::CaretEqual),
    (":=", TokenKind::ColonEqual),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("@", TokenKind::At),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
    ("=", TokenKind::Equal),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("[", TokenKind::LeftBracket),
    ("]", TokenKind::RightBracket),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    (".", TokenKind::Dot),
    (";", TokenKind::Semicolon),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(lookup_keyword("if"), Some(TokenKind::If));
        assert_eq!(lookup_keyword("None"), Some(TokenKind::None));
        assert_eq!(lookup_keyword("none"), Option::None);
        assert_eq!(lookup_keyword("print"), Option::None);
    }

    #[test]
    fn token_categories() {
        assert!(TokenKind::Def.is_keyword());
        assert!(TokenKind::True.is_keyword());
        assert!(!TokenKind::Name.is_keyword());
        assert!(!TokenKind::Plus.is_keyword());
        assert!(TokenKind::StarStarEqual.is_augmented_assign());
        assert!(!TokenKind::Equal.is_augmented_assign());
        assert!(TokenKind::LeftBracket.starts_expression());
        assert!(!TokenKind::RightBracket.starts_expression());
    }

    #[test]
    fn token_new() {
        let token = Token::new(TokenKind::Name, "foo", Span::new(1, 5, 3));
        assert_eq!(token.kind, TokenKind::Name);
        assert_eq!(token.lexeme, "foo");
        assert_eq!(token.span, Span::new(1, 5, 3));
    }

    #[test]
    fn token_debug_format() {
        let token = Token::new(TokenKind::Name, "foo", Span::new(1, 5, 3));
        let debug = format!("{:?}", token);
        assert!(debug.contains("Name"));
        assert!(debug.contains("foo"));
        assert!(debug.contains("1:5"));
    }

    #[test]
    fn token_kind_description() {
        assert_eq!(TokenKind::Int.description(), "integer literal");
        assert_eq!(TokenKind::Def.description(), "'def'");
        assert_eq!(TokenKind::SlashSlashEqual.description(), "'//='");
        assert_eq!(TokenKind::Newline.description(), "newline");
        assert_eq!(TokenKind::Eof.to_string(), "end of file");
    }

    #[test]
    fn operators_are_longest_first() {
        for (i, (spelling, _)) in OPERATORS.iter().enumerate() {
            for (longer, _) in &OPERATORS[..i] {
                assert!(
                    !(longer.len() < spelling.len() && spelling.starts_with(longer)),
                    "{spelling} is shadowed by {longer}"
                );
            }
        }
    }
}
