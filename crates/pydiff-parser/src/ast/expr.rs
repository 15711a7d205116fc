//! Expression AST nodes for Python.
//!
//! Provides nodes for all expression types including:
//! - Literals (numbers, strings, bytes, `None`, `True`, `False`, `...`)
//! - Boolean, binary, unary and comparison operations
//! - Postfix operations (call, subscript, attribute access)
//! - Displays (tuple, list, set, dict) and comprehensions
//! - Lambdas, conditional expressions, `yield`, `await`, f-strings
//! - Assignment expressions (`name := value`)
//!
//! # Expression Precedence
//!
//! The parser uses Pratt parsing with the following precedence levels:
//! 1. Lambda and conditional (`x if c else y`)
//! 2. `or`
//! 3. `and`
//! 4. `not` (prefix)
//! 5. Comparisons (`<`, `==`, `in`, `not in`, `is`, `is not`), chained
//! 6. `|`
//! 7. `^`
//! 8. `&`
//! 9. `<<`, `>>`
//! 10. `+`, `-`
//! 11. `*`, `@`, `/`, `//`, `%`
//! 12. Prefix unary (`+`, `-`, `~`)
//! 13. `**` - right associative
//! 14. `await` (prefix)
//! 15. Postfix (call, subscript, attribute)

use crate::ast::{BinaryOp, BoolOp, CmpOp, Ident, ScopeId, UnaryOp};
use pydiff_core::Span;

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    /// Literal constant
    Constant(ConstantExpr<'ast>),
    /// Name reference
    Name(Ident<'ast>),
    /// f-string
    JoinedStr(&'ast JoinedStrExpr<'ast>),
    /// `and` / `or` chain
    BoolOp(&'ast BoolOpExpr<'ast>),
    /// Binary arithmetic or bitwise operation
    Binary(&'ast BinaryExpr<'ast>),
    /// Unary prefix operation
    Unary(&'ast UnaryExpr<'ast>),
    /// Comparison chain
    Compare(&'ast CompareExpr<'ast>),
    /// Anonymous function
    Lambda(&'ast LambdaExpr<'ast>),
    /// Conditional expression
    IfExp(&'ast IfExpr<'ast>),
    /// Dict display
    Dict(&'ast DictExpr<'ast>),
    /// Set display
    Set(SequenceExpr<'ast>),
    /// List display
    List(SequenceExpr<'ast>),
    /// Tuple display
    Tuple(SequenceExpr<'ast>),
    /// List, set, dict comprehension or generator expression
    Comprehension(&'ast ComprehensionExpr<'ast>),
    /// `yield` with an optional value
    Yield(&'ast YieldExpr<'ast>),
    /// `yield from`
    YieldFrom(&'ast YieldExpr<'ast>),
    /// `await`
    Await(&'ast AwaitExpr<'ast>),
    /// Assignment expression (`name := value`)
    NamedExpr(&'ast NamedExpr<'ast>),
    /// Function call
    Call(&'ast CallExpr<'ast>),
    /// Attribute access (`.`)
    Attribute(&'ast AttributeExpr<'ast>),
    /// Subscript (`[]`)
    Subscript(&'ast SubscriptExpr<'ast>),
    /// Slice inside a subscript
    Slice(&'ast SliceExpr<'ast>),
    /// Starred expression (`*x`)
    Starred(&'ast StarredExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Self::Constant(e) => e.span,
            Self::Name(e) => e.span,
            Self::JoinedStr(e) => e.span,
            Self::BoolOp(e) => e.span,
            Self::Binary(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Compare(e) => e.span,
            Self::Lambda(e) => e.span,
            Self::IfExp(e) => e.span,
            Self::Dict(e) => e.span,
            Self::Set(e) | Self::List(e) | Self::Tuple(e) => e.span,
            Self::Comprehension(e) => e.span,
            Self::Yield(e) | Self::YieldFrom(e) => e.span,
            Self::Await(e) => e.span,
            Self::NamedExpr(e) => e.span,
            Self::Call(e) => e.span,
            Self::Attribute(e) => e.span,
            Self::Subscript(e) => e.span,
            Self::Slice(e) => e.span,
            Self::Starred(e) => e.span,
        }
    }

    /// The literal value, if this is a constant expression.
    pub fn as_constant(&self) -> Option<&Constant<'ast>> {
        match self {
            Self::Constant(c) => Some(&c.value),
            _ => None,
        }
    }

    /// Human-readable description used in "cannot assign to ..." errors.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Constant(c) => match c.value {
                Constant::None => "None",
                Constant::Bool(true) => "True",
                Constant::Bool(false) => "False",
                Constant::Ellipsis => "Ellipsis",
                _ => "literal",
            },
            Self::Name(_) => "name",
            Self::JoinedStr(_) => "f-string expression",
            Self::BoolOp(_) | Self::Binary(_) | Self::Unary(_) => "operator",
            Self::Compare(_) => "comparison",
            Self::Lambda(_) => "lambda",
            Self::IfExp(_) => "conditional expression",
            Self::Dict(_) | Self::Set(_) => "literal",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Comprehension(c) => c.kind.describe(),
            Self::Yield(_) | Self::YieldFrom(_) => "yield expression",
            Self::Await(_) => "await expression",
            Self::NamedExpr(_) => "named expression",
            Self::Call(_) => "function call",
            Self::Attribute(_) => "attribute",
            Self::Subscript(_) => "subscript",
            Self::Slice(_) => "slice",
            Self::Starred(_) => "starred",
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantExpr<'ast> {
    /// The value
    pub value: Constant<'ast>,
    /// Source location
    pub span: Span,
}

/// A literal constant value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant<'ast> {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// `...`
    Ellipsis,
    /// Integer in canonical decimal form, optionally with a leading `-`.
    /// Stored as text so values of any size are exact.
    Int(&'ast str),
    /// Float literal
    Float(f64),
    /// Imaginary literal (real part zero)
    Complex(f64),
    /// Decoded string
    Str(&'ast str),
    /// Decoded bytes
    Bytes(&'ast [u8]),
    /// Tuple of constants (produced by constant folding)
    Tuple(&'ast [Constant<'ast>]),
}

impl Constant<'_> {
    /// Python truthiness of the constant.
    pub fn is_truthy(&self) -> bool {
        match self {
            Constant::None => false,
            Constant::Bool(b) => *b,
            Constant::Ellipsis => true,
            Constant::Int(digits) => digits.trim_start_matches('-') != "0",
            Constant::Float(v) | Constant::Complex(v) => *v != 0.0,
            Constant::Str(s) => !s.is_empty(),
            Constant::Bytes(b) => !b.is_empty(),
            Constant::Tuple(items) => !items.is_empty(),
        }
    }
}

/// An f-string: literal text and formatted fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinedStrExpr<'ast> {
    /// Parts in source order
    pub values: &'ast [FStringPart<'ast>],
    /// Source location
    pub span: Span,
}

/// A piece of an f-string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FStringPart<'ast> {
    /// Literal text
    Literal(&'ast str),
    /// `{value!conversion:format_spec}`
    Formatted(FormattedValue<'ast>),
}

/// A replacement field inside an f-string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormattedValue<'ast> {
    /// The expression to format
    pub value: &'ast Expr<'ast>,
    /// `!s`, `!r`, `!a`
    pub conversion: Option<char>,
    /// Format spec, itself an f-string
    pub format_spec: Option<&'ast JoinedStrExpr<'ast>>,
}

/// A chain of `and` or `or`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoolOpExpr<'ast> {
    /// Operator
    pub op: BoolOp,
    /// Operands, at least two
    pub values: &'ast [Expr<'ast>],
    /// Source location
    pub span: Span,
}

/// A binary operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    /// Left operand
    pub left: &'ast Expr<'ast>,
    /// Operator
    pub op: BinaryOp,
    /// Right operand
    pub right: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A unary prefix operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    /// Operator
    pub op: UnaryOp,
    /// Operand
    pub operand: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A comparison chain: `left op0 c0 op1 c1 ...`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareExpr<'ast> {
    /// First operand
    pub left: &'ast Expr<'ast>,
    /// Operators
    pub ops: &'ast [CmpOp],
    /// Right-hand operands, one per operator
    pub comparators: &'ast [Expr<'ast>],
    /// Source location
    pub span: Span,
}

/// `lambda args: body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambdaExpr<'ast> {
    /// Parameters
    pub args: &'ast Arguments<'ast>,
    /// Body expression
    pub body: &'ast Expr<'ast>,
    /// Scope created by the lambda
    pub scope: ScopeId,
    /// Source location
    pub span: Span,
}

/// `body if test else orelse`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfExpr<'ast> {
    /// Condition
    pub test: &'ast Expr<'ast>,
    /// Value when true
    pub body: &'ast Expr<'ast>,
    /// Value when false
    pub orelse: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A dict display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictExpr<'ast> {
    /// Entries in source order
    pub entries: &'ast [DictEntry<'ast>],
    /// Source location
    pub span: Span,
}

/// One entry of a dict display; a missing key is a `**mapping` unpack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictEntry<'ast> {
    /// Key, or `None` for `**value`
    pub key: Option<&'ast Expr<'ast>>,
    /// Value
    pub value: &'ast Expr<'ast>,
}

/// Elements of a tuple, list or set display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceExpr<'ast> {
    /// Elements
    pub elements: &'ast [Expr<'ast>],
    /// Source location
    pub span: Span,
}

/// Which comprehension a [`ComprehensionExpr`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComprehensionKind {
    /// `[x for ...]`
    List,
    /// `{x for ...}`
    Set,
    /// `{k: v for ...}`
    Dict,
    /// `(x for ...)`
    Generator,
}

impl ComprehensionKind {
    /// Name of the code object built for this comprehension.
    pub fn code_name(&self) -> &'static str {
        match self {
            ComprehensionKind::List => "<listcomp>",
            ComprehensionKind::Set => "<setcomp>",
            ComprehensionKind::Dict => "<dictcomp>",
            ComprehensionKind::Generator => "<genexpr>",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ComprehensionKind::List => "list comprehension",
            ComprehensionKind::Set => "set comprehension",
            ComprehensionKind::Dict => "dict comprehension",
            ComprehensionKind::Generator => "generator expression",
        }
    }
}

/// A comprehension or generator expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComprehensionExpr<'ast> {
    /// Kind of comprehension
    pub kind: ComprehensionKind,
    /// Element expression (the key for dict comprehensions)
    pub element: &'ast Expr<'ast>,
    /// Value expression for dict comprehensions
    pub value: Option<&'ast Expr<'ast>>,
    /// `for` clauses, outermost first
    pub generators: &'ast [Comprehension<'ast>],
    /// Scope created by the comprehension
    pub scope: ScopeId,
    /// Source location
    pub span: Span,
}

/// One `for target in iter if cond...` clause.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comprehension<'ast> {
    /// Loop target
    pub target: &'ast Expr<'ast>,
    /// Iterable
    pub iter: &'ast Expr<'ast>,
    /// Filters
    pub ifs: &'ast [Expr<'ast>],
    /// `async for`
    pub is_async: bool,
}

/// `yield` / `yield from`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldExpr<'ast> {
    /// Yielded value
    pub value: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `await value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AwaitExpr<'ast> {
    pub value: &'ast Expr<'ast>,
    pub span: Span,
}

/// `target := value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamedExpr<'ast> {
    /// Bound name
    pub target: Ident<'ast>,
    /// Assigned value, also the result of the expression
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A function call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    /// Callee
    pub func: &'ast Expr<'ast>,
    /// Positional arguments, possibly starred
    pub args: &'ast [Expr<'ast>],
    /// Keyword arguments and `**` unpacks
    pub keywords: &'ast [Keyword<'ast>],
    /// Source location
    pub span: Span,
}

/// A keyword argument; a missing name is a `**mapping` unpack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyword<'ast> {
    /// Argument name
    pub arg: Option<Ident<'ast>>,
    /// Argument value
    pub value: &'ast Expr<'ast>,
}

/// `value.attr`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeExpr<'ast> {
    /// Object
    pub value: &'ast Expr<'ast>,
    /// Attribute name
    pub attr: Ident<'ast>,
    /// Source location
    pub span: Span,
}

/// `value[index]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptExpr<'ast> {
    /// Object
    pub value: &'ast Expr<'ast>,
    /// Index, slice, or tuple of them
    pub index: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `lower:upper:step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceExpr<'ast> {
    /// Lower bound
    pub lower: Option<&'ast Expr<'ast>>,
    /// Upper bound
    pub upper: Option<&'ast Expr<'ast>>,
    /// Step
    pub step: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `*value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarredExpr<'ast> {
    /// The starred expression
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A parameter list for `def` and `lambda`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Arguments<'ast> {
    /// Positional-only parameters (before `/`)
    pub posonly: &'ast [Param<'ast>],
    /// Positional-or-keyword parameters
    pub args: &'ast [Param<'ast>],
    /// `*args`
    pub vararg: Option<Param<'ast>>,
    /// Keyword-only parameters (after `*` or `*args`)
    pub kwonly: &'ast [Param<'ast>],
    /// `**kwargs`
    pub kwarg: Option<Param<'ast>>,
}

impl<'ast> Arguments<'ast> {
    /// Every parameter in frame order: positional, keyword-only, `*args`, `**kwargs`.
    pub fn all(&self) -> impl Iterator<Item = &Param<'ast>> {
        self.posonly
            .iter()
            .chain(self.args)
            .chain(self.kwonly)
            .chain(self.vararg.as_ref())
            .chain(self.kwarg.as_ref())
    }

    /// Positional parameters (positional-only first).
    pub fn positional(&self) -> impl Iterator<Item = &Param<'ast>> {
        self.posonly.iter().chain(self.args)
    }
}

/// A single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    /// Parameter name
    pub name: Ident<'ast>,
    /// Annotation (`def` only)
    pub annotation: Option<&'ast Expr<'ast>>,
    /// Default value
    pub default: Option<&'ast Expr<'ast>>,
}
