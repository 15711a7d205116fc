//! Statement AST nodes for Python.
//!
//! Simple statements (expression, assignment, `pass`, `return`, imports...)
//! and compound statements (`if`, `while`, `for`, `try`, `with`, `def`,
//! `class`). Blocks are arena slices of statements.

use crate::ast::{Arguments, BinaryOp, Expr, Ident, Keyword, ScopeId};
use pydiff_core::Span;

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// Expression statement
    Expr(ExprStmt<'ast>),
    /// `a = b = value`
    Assign(&'ast AssignStmt<'ast>),
    /// `target op= value`
    AugAssign(&'ast AugAssignStmt<'ast>),
    /// `target: annotation [= value]`
    AnnAssign(&'ast AnnAssignStmt<'ast>),
    /// `del a, b`
    Delete(&'ast DeleteStmt<'ast>),
    /// `pass`
    Pass(Span),
    /// `break`
    Break(Span),
    /// `continue`
    Continue(Span),
    /// `return [value]`
    Return(&'ast ReturnStmt<'ast>),
    /// `raise [exc [from cause]]`
    Raise(&'ast RaiseStmt<'ast>),
    /// `global a, b`
    Global(&'ast NamesStmt<'ast>),
    /// `nonlocal a, b`
    Nonlocal(&'ast NamesStmt<'ast>),
    /// `import a.b as c`
    Import(&'ast ImportStmt<'ast>),
    /// `from .a import b as c`
    ImportFrom(&'ast ImportFromStmt<'ast>),
    /// `if` / `elif` / `else`
    If(&'ast IfStmt<'ast>),
    /// `while` / `else`
    While(&'ast WhileStmt<'ast>),
    /// `for` / `else`
    For(&'ast ForStmt<'ast>),
    /// `try` / `except` / `else` / `finally`
    Try(&'ast TryStmt<'ast>),
    /// `with a as b, c:`
    With(&'ast WithStmt<'ast>),
    /// `assert test, msg`
    Assert(&'ast AssertStmt<'ast>),
    /// `def`
    FunctionDef(&'ast FunctionDef<'ast>),
    /// `class`
    ClassDef(&'ast ClassDef<'ast>),
}

impl<'ast> Stmt<'ast> {
    /// Get the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Self::Expr(s) => s.span,
            Self::Assign(s) => s.span,
            Self::AugAssign(s) => s.span,
            Self::AnnAssign(s) => s.span,
            Self::Delete(s) => s.span,
            Self::Pass(span) | Self::Break(span) | Self::Continue(span) => *span,
            Self::Return(s) => s.span,
            Self::Raise(s) => s.span,
            Self::Global(s) | Self::Nonlocal(s) => s.span,
            Self::Import(s) => s.span,
            Self::ImportFrom(s) => s.span,
            Self::If(s) => s.span,
            Self::While(s) => s.span,
            Self::For(s) => s.span,
            Self::Try(s) => s.span,
            Self::With(s) => s.span,
            Self::Assert(s) => s.span,
            Self::FunctionDef(s) => s.span,
            Self::ClassDef(s) => s.span,
        }
    }

    /// The docstring, if this statement is a bare string literal.
    pub fn as_docstring(&self) -> Option<&'ast str> {
        match self {
            Self::Expr(ExprStmt {
                value: Expr::Constant(c),
                ..
            }) => match c.value {
                crate::ast::Constant::Str(text) => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

/// An expression evaluated for its side effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprStmt<'ast> {
    /// The expression
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `targets[0] = targets[1] = ... = value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignStmt<'ast> {
    /// Targets, left to right
    pub targets: &'ast [Expr<'ast>],
    /// Assigned value
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `target op= value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugAssignStmt<'ast> {
    /// Target (name, attribute or subscript)
    pub target: &'ast Expr<'ast>,
    /// Operator
    pub op: BinaryOp,
    /// Right-hand side
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `target: annotation [= value]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnAssignStmt<'ast> {
    /// Target
    pub target: &'ast Expr<'ast>,
    /// Annotation
    pub annotation: &'ast Expr<'ast>,
    /// Optional value
    pub value: Option<&'ast Expr<'ast>>,
    /// Target is a bare, unparenthesized name
    pub simple: bool,
    /// Source location
    pub span: Span,
}

/// `del targets`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleteStmt<'ast> {
    /// Targets
    pub targets: &'ast [Expr<'ast>],
    /// Source location
    pub span: Span,
}

/// `return [value]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStmt<'ast> {
    /// Returned value
    pub value: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `raise [exc [from cause]]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaiseStmt<'ast> {
    /// Exception
    pub exc: Option<&'ast Expr<'ast>>,
    /// Cause
    pub cause: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `global` / `nonlocal` names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamesStmt<'ast> {
    /// Declared names
    pub names: &'ast [Ident<'ast>],
    /// Source location
    pub span: Span,
}

/// `name as asname` in an import.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alias<'ast> {
    /// Imported name, dotted for `import a.b`, `*` for star imports
    pub name: Ident<'ast>,
    /// Binding name
    pub asname: Option<Ident<'ast>>,
}

/// `import a, b.c as d`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportStmt<'ast> {
    /// Imported modules
    pub names: &'ast [Alias<'ast>],
    /// Source location
    pub span: Span,
}

/// `from [.]*module import names`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportFromStmt<'ast> {
    /// Module, absent for `from . import x`
    pub module: Option<&'ast str>,
    /// Imported names
    pub names: &'ast [Alias<'ast>],
    /// Number of leading dots
    pub level: u32,
    /// Source location
    pub span: Span,
}

/// `if test: body else: orelse` (`elif` nests in `orelse`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    /// Condition
    pub test: &'ast Expr<'ast>,
    /// Then block
    pub body: &'ast [Stmt<'ast>],
    /// Else block
    pub orelse: &'ast [Stmt<'ast>],
    /// Source location
    pub span: Span,
}

/// `while test: body else: orelse`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhileStmt<'ast> {
    /// Condition
    pub test: &'ast Expr<'ast>,
    /// Loop body
    pub body: &'ast [Stmt<'ast>],
    /// Runs when the loop ends without `break`
    pub orelse: &'ast [Stmt<'ast>],
    /// Source location
    pub span: Span,
}

/// `for target in iter: body else: orelse`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForStmt<'ast> {
    /// Loop target
    pub target: &'ast Expr<'ast>,
    /// Iterable
    pub iter: &'ast Expr<'ast>,
    /// Loop body
    pub body: &'ast [Stmt<'ast>],
    /// Runs when the loop ends without `break`
    pub orelse: &'ast [Stmt<'ast>],
    /// `async for`
    pub is_async: bool,
    /// Source location
    pub span: Span,
}

/// `try` statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TryStmt<'ast> {
    /// Protected block
    pub body: &'ast [Stmt<'ast>],
    /// `except` clauses
    pub handlers: &'ast [ExceptHandler<'ast>],
    /// `else` block
    pub orelse: &'ast [Stmt<'ast>],
    /// `finally` block
    pub finalbody: &'ast [Stmt<'ast>],
    /// Source location
    pub span: Span,
}

/// `except [type [as name]]: body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExceptHandler<'ast> {
    /// Matched exception type
    pub typ: Option<&'ast Expr<'ast>>,
    /// Bound name
    pub name: Option<Ident<'ast>>,
    /// Handler body
    pub body: &'ast [Stmt<'ast>],
    /// Source location
    pub span: Span,
}

/// `with items: body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithStmt<'ast> {
    /// Context managers
    pub items: &'ast [WithItem<'ast>],
    /// Body
    pub body: &'ast [Stmt<'ast>],
    /// `async with`
    pub is_async: bool,
    /// Source location
    pub span: Span,
}

/// `context_expr [as target]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithItem<'ast> {
    /// Context manager
    pub context_expr: &'ast Expr<'ast>,
    /// Binding target
    pub target: Option<&'ast Expr<'ast>>,
}

/// `assert test [, msg]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssertStmt<'ast> {
    /// Checked condition
    pub test: &'ast Expr<'ast>,
    /// Message
    pub msg: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// A function definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionDef<'ast> {
    /// Function name
    pub name: Ident<'ast>,
    /// Parameters
    pub args: &'ast Arguments<'ast>,
    /// Body
    pub body: &'ast [Stmt<'ast>],
    /// Decorators, outermost first
    pub decorators: &'ast [Expr<'ast>],
    /// Return annotation
    pub returns: Option<&'ast Expr<'ast>>,
    /// Scope created by the function
    pub scope: ScopeId,
    /// `async def`
    pub is_async: bool,
    /// Source location (the `def` keyword, or the first decorator)
    pub span: Span,
}

/// A class definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDef<'ast> {
    /// Class name
    pub name: Ident<'ast>,
    /// Positional base expressions, possibly starred
    pub bases: &'ast [Expr<'ast>],
    /// Keyword arguments such as `metaclass=`
    pub keywords: &'ast [Keyword<'ast>],
    /// Body
    pub body: &'ast [Stmt<'ast>],
    /// Decorators, outermost first
    pub decorators: &'ast [Expr<'ast>],
    /// Scope created by the class body
    pub scope: ScopeId,
    /// Source location
    pub span: Span,
}
