//! Compile-time evaluation of constant expressions.
//!
//! Only operations whose result cannot depend on runtime state are folded:
//! unary operators on numeric literals, `not` on any literal, and tuples
//! whose elements all fold. Binary operators are left to the interpreter.

use pydiff_parser::ast::{self, Expr, UnaryOp};

use crate::bytecode::Constant;

/// Convert a parsed literal into a code object constant.
pub(crate) fn from_literal(literal: &ast::Constant<'_>) -> Constant {
    match *literal {
        ast::Constant::None => Constant::None,
        ast::Constant::Bool(value) => Constant::Bool(value),
        ast::Constant::Ellipsis => Constant::Ellipsis,
        ast::Constant::Int(digits) => Constant::Int(digits.to_string()),
        ast::Constant::Float(value) => Constant::Float(value),
        ast::Constant::Complex(imag) => Constant::Complex { real: 0.0, imag },
        ast::Constant::Str(text) => Constant::Str(text.to_string()),
        ast::Constant::Bytes(bytes) => Constant::Bytes(bytes.to_vec()),
        ast::Constant::Tuple(items) => Constant::Tuple(items.iter().map(from_literal).collect()),
    }
}

/// The value of `expr` if it folds to a constant.
pub(crate) fn fold(expr: &Expr<'_>) -> Option<Constant> {
    match expr {
        Expr::Constant(constant) => Some(from_literal(&constant.value)),
        Expr::Unary(unary) => fold_unary(unary.op, fold(unary.operand)?),
        Expr::Tuple(tuple) => tuple
            .elements
            .iter()
            .map(fold)
            .collect::<Option<Vec<_>>>()
            .map(Constant::Tuple),
        _ => None,
    }
}

/// Elements folded into a tuple, or `None` if any is not constant.
pub(crate) fn fold_all(elements: &[Expr<'_>]) -> Option<Vec<Constant>> {
    elements.iter().map(fold).collect()
}

fn fold_unary(op: UnaryOp, operand: Constant) -> Option<Constant> {
    match op {
        UnaryOp::Not => Some(Constant::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Constant::Int(digits) => Some(Constant::Int(negate_digits(&digits))),
            Constant::Bool(value) => Some(Constant::Int(if value { "-1" } else { "0" }.into())),
            Constant::Float(value) => Some(Constant::Float(-value)),
            Constant::Complex { real, imag } => Some(Constant::Complex {
                real: -real,
                imag: -imag,
            }),
            _ => None,
        },
        UnaryOp::Pos => match operand {
            Constant::Int(_) | Constant::Float(_) | Constant::Complex { .. } => Some(operand),
            Constant::Bool(value) => Some(Constant::Int(if value { "1" } else { "0" }.into())),
            _ => None,
        },
        UnaryOp::Invert => match operand {
            Constant::Int(digits) => {
                let value: i128 = digits.parse().ok()?;
                Some(Constant::Int((!value).to_string()))
            }
            Constant::Bool(value) => Some(Constant::Int(if value { "-2" } else { "-1" }.into())),
            _ => None,
        },
    }
}

fn negate_digits(digits: &str) -> String {
    match digits.strip_prefix('-') {
        Some(positive) => positive.to_string(),
        None if digits == "0" => digits.to_string(),
        None => format!("-{digits}"),
    }
}
