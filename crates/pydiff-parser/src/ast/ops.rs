//! Operator definitions for Python expressions.
//!
//! Provides enums for binary, unary, boolean and comparison operators along
//! with the binding powers used by the Pratt parser.

use crate::lexer::TokenKind;
use std::fmt;

/// Arithmetic and bitwise binary operators.
///
/// Organized by precedence from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `<<`
    LShift,
    /// `>>`
    RShift,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `@`
    MatMul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinaryOp {
    /// Get the binding power (precedence) for this operator.
    ///
    /// Higher values bind more tightly. Returns (left_bp, right_bp).
    /// `**` binds tighter than a unary operator on its left but looser on
    /// its right, so `-2 ** 2` is `-(2 ** 2)` and `2 ** -1` parses.
    pub fn binding_power(&self) -> (u8, u8) {
        use BinaryOp::*;
        match self {
            BitOr => (11, 12),
            BitXor => (13, 14),
            BitAnd => (15, 16),
            LShift | RShift => (17, 18),
            Add | Sub => (19, 20),
            Mul | MatMul | Div | FloorDiv | Mod => (21, 22),
            Pow => (25, 23),
        }
    }

    /// Try to convert a token kind to a binary operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;

        Some(match token {
            Pipe => BinaryOp::BitOr,
            Caret => BinaryOp::BitXor,
            Amp => BinaryOp::BitAnd,
            LessLess => BinaryOp::LShift,
            GreaterGreater => BinaryOp::RShift,
            Plus => BinaryOp::Add,
            Minus => BinaryOp::Sub,
            Star => BinaryOp::Mul,
            At => BinaryOp::MatMul,
            Slash => BinaryOp::Div,
            SlashSlash => BinaryOp::FloorDiv,
            Percent => BinaryOp::Mod,
            StarStar => BinaryOp::Pow,
            _ => return Option::None,
        })
    }

    /// Convert an augmented assignment token (`+=`, `**=`, ...) to its operator.
    pub fn from_augmented_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;

        Some(match token {
            PipeEqual => BinaryOp::BitOr,
            CaretEqual => BinaryOp::BitXor,
            AmpEqual => BinaryOp::BitAnd,
            LessLessEqual => BinaryOp::LShift,
            GreaterGreaterEqual => BinaryOp::RShift,
            PlusEqual => BinaryOp::Add,
            MinusEqual => BinaryOp::Sub,
            StarEqual => BinaryOp::Mul,
            AtEqual => BinaryOp::MatMul,
            SlashEqual => BinaryOp::Div,
            SlashSlashEqual => BinaryOp::FloorDiv,
            PercentEqual => BinaryOp::Mod,
            StarStarEqual => BinaryOp::Pow,
            _ => return Option::None,
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;
        let s = match self {
            BitOr => "|",
            BitXor => "^",
            BitAnd => "&",
            LShift => "<<",
            RShift => ">>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            MatMul => "@",
            Div => "/",
            FloorDiv => "//",
            Mod => "%",
            Pow => "**",
        };
        write!(f, "{}", s)
    }
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Neg,
    /// `+`
    Pos,
    /// `~`
    Invert,
}

impl UnaryOp {
    /// Binding power for the operand of an arithmetic prefix operator.
    pub const ARITHMETIC_BP: u8 = 23;
    /// Binding power for the operand of `not`.
    pub const NOT_BP: u8 = 7;

    /// Try to convert a token kind to a unary operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        match token {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::Invert),
            _ => None,
        }
    }

    /// Binding power for this operator's operand.
    pub fn binding_power(&self) -> u8 {
        match self {
            UnaryOp::Not => Self::NOT_BP,
            _ => Self::ARITHMETIC_BP,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        };
        write!(f, "{}", s)
    }
}

/// Short-circuiting boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    /// `or`
    Or,
    /// `and`
    And,
}

impl BoolOp {
    /// Get the binding power (precedence) for this operator.
    pub fn binding_power(&self) -> (u8, u8) {
        match self {
            BoolOp::Or => (3, 4),
            BoolOp::And => (5, 6),
        }
    }

    /// Try to convert a token kind to a boolean operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        match token {
            TokenKind::Or => Some(BoolOp::Or),
            TokenKind::And => Some(BoolOp::And),
            _ => None,
        }
    }
}

/// Comparison operators; a chain like `a < b == c` holds several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

impl CmpOp {
    /// Binding power shared by every comparison.
    pub const BINDING_POWER: (u8, u8) = (9, 10);

    /// Convert a single-token comparison operator.
    ///
    /// `not in` and `is not` span two tokens and are recognized by the parser.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;

        Some(match token {
            Less => CmpOp::Lt,
            LessEqual => CmpOp::LtE,
            EqualEqual => CmpOp::Eq,
            BangEqual => CmpOp::NotEq,
            Greater => CmpOp::Gt,
            GreaterEqual => CmpOp::GtE,
            In => CmpOp::In,
            Is => CmpOp::Is,
            _ => return Option::None,
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CmpOp::*;
        let s = match self {
            Lt => "<",
            LtE => "<=",
            Eq => "==",
            NotEq => "!=",
            Gt => ">",
            GtE => ">=",
            In => "in",
            NotIn => "not in",
            Is => "is",
            IsNot => "is not",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_precedence_ordering() {
        let (or_l, _) = BinaryOp::BitOr.binding_power();
        let (add_l, _) = BinaryOp::Add.binding_power();
        let (mul_l, _) = BinaryOp::Mul.binding_power();
        let (pow_l, pow_r) = BinaryOp::Pow.binding_power();

        assert!(or_l < add_l);
        assert!(add_l < mul_l);
        assert!(mul_l < pow_l);
        // Right-associative with a unary-friendly right operand.
        assert!(pow_r < pow_l);
        assert_eq!(pow_r, UnaryOp::ARITHMETIC_BP);
    }

    #[test]
    fn boolean_and_comparison_sit_below_bitwise() {
        let (or_l, _) = BoolOp::Or.binding_power();
        let (and_l, _) = BoolOp::And.binding_power();
        let (cmp_l, _) = CmpOp::BINDING_POWER;
        let (bitor_l, _) = BinaryOp::BitOr.binding_power();

        assert!(or_l < and_l);
        assert!(and_l < UnaryOp::NOT_BP);
        assert!(UnaryOp::NOT_BP < cmp_l);
        assert!(cmp_l < bitor_l);
    }

    #[test]
    fn operator_tokens() {
        assert_eq!(BinaryOp::from_token(TokenKind::At), Some(BinaryOp::MatMul));
        assert_eq!(
            BinaryOp::from_augmented_token(TokenKind::SlashSlashEqual),
            Some(BinaryOp::FloorDiv)
        );
        assert_eq!(BinaryOp::from_token(TokenKind::Equal), None);
        assert_eq!(UnaryOp::from_token(TokenKind::Tilde), Some(UnaryOp::Invert));
        assert_eq!(CmpOp::from_token(TokenKind::Is), Some(CmpOp::Is));
        assert_eq!(BoolOp::from_token(TokenKind::And), Some(BoolOp::And));
    }

    #[test]
    fn display() {
        assert_eq!(BinaryOp::FloorDiv.to_string(), "//");
        assert_eq!(CmpOp::IsNot.to_string(), "is not");
        assert_eq!(UnaryOp::Not.to_string(), "not");
    }
}
