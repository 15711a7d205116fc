//! Expression lowering.
//!
//! Expressions leave exactly one value on the stack. Conditions used for
//! control flow go through [`Compiler::jump_if`] instead, which branches
//! directly without materializing a boolean where it can.

mod calls;
pub(crate) mod constant;

use pydiff_core::CompileError;
use pydiff_parser::ast::{
    BinaryOp, BoolOp, CmpOp, DictEntry, Expr, FStringPart, JoinedStrExpr, SliceExpr, UnaryOp,
};

use crate::bytecode::{Constant, FORMAT_VALUE_HAVE_SPEC, Label, OpCode};
use crate::compiler::{CompileResult, Compiler, NameContext};
use crate::symtable::ScopeKind;
use constant::{fold, fold_all};

/// Opcodes used to build a list, tuple or set display.
struct SequenceOps {
    /// Builds the whole display when nothing is starred
    single: OpCode,
    /// Packs a run of plain elements between starred ones
    inner: OpCode,
    /// Joins the packed runs and starred iterables
    outer: OpCode,
}

const LIST_OPS: SequenceOps = SequenceOps {
    single: OpCode::BuildList,
    inner: OpCode::BuildTuple,
    outer: OpCode::BuildListUnpack,
};

const TUPLE_OPS: SequenceOps = SequenceOps {
    single: OpCode::BuildTuple,
    inner: OpCode::BuildTuple,
    outer: OpCode::BuildTupleUnpack,
};

const SET_OPS: SequenceOps = SequenceOps {
    single: OpCode::BuildSet,
    inner: OpCode::BuildSet,
    outer: OpCode::BuildSetUnpack,
};

/// Entries in one `BUILD_MAP` are capped so the argument fits in 16 bits.
const MAX_MAP_RUN: usize = 0xFFFF;

impl Compiler<'_> {
    /// Compile an expression for its value.
    pub(crate) fn compile_expr(&mut self, expr: &Expr<'_>) -> CompileResult {
        self.advance_line(expr.span());

        if let Some(value) = fold(expr) {
            self.load_const(value);
            return Ok(());
        }

        match expr {
            Expr::Constant(literal) => self.load_const(constant::from_literal(&literal.value)),
            Expr::Name(ident) => self.nameop(ident.name, NameContext::Load),
            Expr::JoinedStr(joined) => self.compile_joined_str(joined)?,
            Expr::BoolOp(bool_op) => {
                let jump = match bool_op.op {
                    BoolOp::And => OpCode::JumpIfFalseOrPop,
                    BoolOp::Or => OpCode::JumpIfTrueOrPop,
                };
                let end = self.new_label();
                if let Some((last, rest)) = bool_op.values.split_last() {
                    for value in rest {
                        self.compile_expr(value)?;
                        self.emit_jump(jump, end);
                    }
                    self.compile_expr(last)?;
                }
                self.bind_label(end);
            }
            Expr::Binary(binary) => {
                self.compile_expr(binary.left)?;
                self.compile_expr(binary.right)?;
                self.emit(binary_opcode(binary.op));
            }
            Expr::Unary(unary) => {
                if unary.op == UnaryOp::Not
                    && let Some((left, op, right)) = inverted_compare(unary.operand)
                {
                    return self.compile_compare(left, &[op], std::slice::from_ref(right));
                }
                self.compile_expr(unary.operand)?;
                self.emit(match unary.op {
                    UnaryOp::Not => OpCode::UnaryNot,
                    UnaryOp::Neg => OpCode::UnaryNegative,
                    UnaryOp::Pos => OpCode::UnaryPositive,
                    UnaryOp::Invert => OpCode::UnaryInvert,
                });
            }
            Expr::Compare(compare) => {
                self.compile_compare(compare.left, compare.ops, compare.comparators)?
            }
            Expr::Lambda(lambda) => self.compile_lambda(lambda)?,
            Expr::IfExp(if_exp) => {
                let end = self.new_label();
                let orelse = self.new_label();
                self.jump_if(if_exp.test, orelse, false)?;
                self.compile_expr(if_exp.body)?;
                self.emit_jump(OpCode::JumpForward, end);
                self.bind_label(orelse);
                self.compile_expr(if_exp.orelse)?;
                self.bind_label(end);
            }
            Expr::Dict(dict) => self.compile_dict(dict.entries)?,
            Expr::Set(set) => self.compile_sequence(set.elements, &SET_OPS)?,
            Expr::List(list) => self.compile_sequence(list.elements, &LIST_OPS)?,
            Expr::Tuple(tuple) => self.compile_sequence(tuple.elements, &TUPLE_OPS)?,
            Expr::Comprehension(comp) => self.compile_comprehension(comp)?,
            Expr::Yield(yield_expr) => {
                if !self.unit.kind.is_function_like() {
                    return Err(CompileError::YieldOutsideFunction {
                        span: yield_expr.span,
                    });
                }
                match yield_expr.value {
                    Some(value) => self.compile_expr(value)?,
                    None => self.load_const(Constant::None),
                }
                self.emit(OpCode::YieldValue);
            }
            Expr::YieldFrom(yield_expr) => {
                if !self.unit.kind.is_function_like() {
                    return Err(CompileError::YieldOutsideFunction {
                        span: yield_expr.span,
                    });
                }
                if self.symbols().is_async {
                    return Err(CompileError::YieldFromInAsync {
                        span: yield_expr.span,
                    });
                }
                if let Some(value) = yield_expr.value {
                    self.compile_expr(value)?;
                }
                self.emit(OpCode::GetYieldFromIter);
                self.load_const(Constant::None);
                self.emit(OpCode::YieldFrom);
            }
            Expr::Call(call) => self.compile_call(call)?,
            Expr::Attribute(attribute) => {
                self.compile_expr(attribute.value)?;
                self.emit_mangled(OpCode::LoadAttr, attribute.attr.name);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(subscript.value)?;
                self.compile_expr(subscript.index)?;
                self.emit(OpCode::BinarySubscr);
            }
            Expr::Slice(slice) => self.compile_slice(slice)?,
            Expr::Starred(starred) => {
                return Err(CompileError::StarredMisuse { span: starred.span });
            }
            Expr::Await(await_expr) => {
                if !self.unit.kind.is_function_like() {
                    return Err(CompileError::AwaitOutsideFunction {
                        span: await_expr.span,
                    });
                }
                if !self.symbols().is_async && !matches!(self.unit.kind, ScopeKind::Comprehension(_)) {
                    return Err(CompileError::OutsideAsyncFunction {
                        what: "await",
                        span: await_expr.span,
                    });
                }
                self.compile_expr(await_expr.value)?;
                self.emit_await();
            }
            Expr::NamedExpr(named) => {
                self.compile_expr(named.value)?;
                self.emit(OpCode::DupTop);
                self.nameop(named.target.name, NameContext::Store);
            }
        }
        Ok(())
    }

    /// Wait on the awaitable on top of the stack.
    pub(crate) fn emit_await(&mut self) {
        self.emit(OpCode::GetAwaitable);
        self.load_const(Constant::None);
        self.emit(OpCode::YieldFrom);
    }

    /// Compile the iterable of a `for` loop or comprehension.
    ///
    /// A list display is iterated as a tuple and a constant set as a frozen
    /// set, since the loop cannot observe the difference.
    pub(crate) fn compile_iterable(&mut self, iter: &Expr<'_>) -> CompileResult {
        match iter {
            Expr::List(list) if !list.elements.iter().any(is_starred) => {
                self.advance_line(iter.span());
                match fold_all(list.elements) {
                    Some(items) => {
                        self.load_const(Constant::Tuple(items));
                        Ok(())
                    }
                    None => self.compile_sequence(list.elements, &TUPLE_OPS),
                }
            }
            Expr::Set(set) => match fold_all(set.elements) {
                Some(items) => {
                    self.advance_line(iter.span());
                    self.load_const(frozenset(items));
                    Ok(())
                }
                None => self.compile_expr(iter),
            },
            _ => self.compile_expr(iter),
        }
    }

    // ==========================================================================
    // Conditions
    // ==========================================================================

    /// Jump to `target` when `expr` is truthy (`when` true) or falsy.
    pub(crate) fn jump_if(&mut self, expr: &Expr<'_>, target: Label, when: bool) -> CompileResult {
        let folded = fold(expr).is_some() || inverted_compare_of_not(expr).is_some();
        if !folded {
            match expr {
                Expr::Unary(unary) if unary.op == UnaryOp::Not => {
                    return self.jump_if(unary.operand, target, !when);
                }
                Expr::BoolOp(bool_op) => {
                    let short_circuit = bool_op.op == BoolOp::Or;
                    let next = if short_circuit == when {
                        target
                    } else {
                        self.new_label()
                    };
                    if let Some((last, rest)) = bool_op.values.split_last() {
                        for value in rest {
                            self.jump_if(value, next, short_circuit)?;
                        }
                        self.jump_if(last, target, when)?;
                    }
                    if next != target {
                        self.bind_label(next);
                    }
                    return Ok(());
                }
                Expr::IfExp(if_exp) => {
                    let end = self.new_label();
                    let orelse = self.new_label();
                    self.jump_if(if_exp.test, orelse, false)?;
                    self.jump_if(if_exp.body, target, when)?;
                    self.emit_jump(OpCode::JumpForward, end);
                    self.bind_label(orelse);
                    self.jump_if(if_exp.orelse, target, when)?;
                    self.bind_label(end);
                    return Ok(());
                }
                Expr::Compare(compare) if compare.ops.len() > 1 => {
                    self.advance_line(expr.span());
                    let cleanup = self.new_label();
                    let last = compare.ops.len() - 1;
                    self.compile_expr(compare.left)?;
                    for (op, comparator) in compare.ops[..last].iter().zip(compare.comparators) {
                        self.compile_expr(comparator)?;
                        self.emit(OpCode::DupTop);
                        self.emit(OpCode::RotThree);
                        self.emit_arg(OpCode::CompareOp, compare_arg(*op));
                        self.emit_jump(OpCode::PopJumpIfFalse, cleanup);
                    }
                    self.compile_comparator(compare.ops[last], &compare.comparators[last])?;
                    self.emit_arg(OpCode::CompareOp, compare_arg(compare.ops[last]));
                    self.emit_jump(pop_jump(when), target);
                    let end = self.new_label();
                    self.emit_jump(OpCode::JumpForward, end);
                    self.bind_label(cleanup);
                    self.emit(OpCode::PopTop);
                    if !when {
                        self.emit_jump(OpCode::JumpForward, target);
                    }
                    self.bind_label(end);
                    return Ok(());
                }
                _ => {}
            }
        }

        self.compile_expr(expr)?;
        self.emit_jump(pop_jump(when), target);
        Ok(())
    }

    fn compile_compare(
        &mut self,
        left: &Expr<'_>,
        ops: &[CmpOp],
        comparators: &[Expr<'_>],
    ) -> CompileResult {
        self.compile_expr(left)?;
        let Some((&last_op, leading)) = ops.split_last() else {
            return Ok(());
        };
        let last = leading.len();
        if leading.is_empty() {
            self.compile_comparator(last_op, &comparators[0])?;
            self.emit_arg(OpCode::CompareOp, compare_arg(last_op));
            return Ok(());
        }

        let cleanup = self.new_label();
        for (op, comparator) in leading.iter().zip(comparators) {
            self.compile_expr(comparator)?;
            self.emit(OpCode::DupTop);
            self.emit(OpCode::RotThree);
            self.emit_arg(OpCode::CompareOp, compare_arg(*op));
            self.emit_jump(OpCode::JumpIfFalseOrPop, cleanup);
        }
        self.compile_comparator(last_op, &comparators[last])?;
        self.emit_arg(OpCode::CompareOp, compare_arg(last_op));
        let end = self.new_label();
        self.emit_jump(OpCode::JumpForward, end);
        self.bind_label(cleanup);
        self.emit(OpCode::RotTwo);
        self.emit(OpCode::PopTop);
        self.bind_label(end);
        Ok(())
    }

    /// The right operand of the final comparison; membership tests iterate
    /// it, so displays are folded like loop iterables.
    fn compile_comparator(&mut self, op: CmpOp, comparator: &Expr<'_>) -> CompileResult {
        match op {
            CmpOp::In | CmpOp::NotIn => self.compile_iterable(comparator),
            _ => self.compile_expr(comparator),
        }
    }

    // ==========================================================================
    // Displays
    // ==========================================================================

    fn compile_sequence(&mut self, elements: &[Expr<'_>], ops: &SequenceOps) -> CompileResult {
        let mut runs = 0;
        let mut pending = 0;
        for element in elements {
            if let Expr::Starred(starred) = element {
                if pending > 0 {
                    self.emit_arg(ops.inner, pending);
                    pending = 0;
                    runs += 1;
                }
                self.compile_expr(starred.value)?;
                runs += 1;
            } else {
                self.compile_expr(element)?;
                pending += 1;
            }
        }
        if runs > 0 {
            if pending > 0 {
                self.emit_arg(ops.inner, pending);
                runs += 1;
            }
            self.emit_arg(ops.outer, runs);
        } else {
            self.emit_arg(ops.single, pending);
        }
        Ok(())
    }

    fn compile_dict(&mut self, entries: &[DictEntry<'_>]) -> CompileResult {
        let mut containers = 0;
        let mut run = 0;
        let mut last_unpacked = false;
        for (i, entry) in entries.iter().enumerate() {
            last_unpacked = entry.key.is_none();
            if run == MAX_MAP_RUN || (run > 0 && last_unpacked) {
                self.compile_map_run(&entries[i - run..i])?;
                containers += 1;
                run = 0;
            }
            if last_unpacked {
                self.compile_expr(entry.value)?;
                containers += 1;
            } else {
                run += 1;
            }
        }
        if run > 0 || containers == 0 {
            self.compile_map_run(&entries[entries.len() - run..])?;
            containers += 1;
        }
        if containers > 1 || last_unpacked {
            self.emit_arg(OpCode::BuildMapUnpack, containers);
        }
        Ok(())
    }

    /// One `BUILD_MAP` or `BUILD_CONST_KEY_MAP` for a run of `key: value` entries.
    fn compile_map_run(&mut self, entries: &[DictEntry<'_>]) -> CompileResult {
        let keys: Option<Vec<Constant>> = entries
            .iter()
            .map(|entry| entry.key.and_then(fold))
            .collect();
        match keys {
            Some(keys) if entries.len() > 1 => {
                for entry in entries {
                    self.compile_expr(entry.value)?;
                }
                self.load_const(Constant::Tuple(keys));
                self.emit_arg(OpCode::BuildConstKeyMap, entries.len() as u32);
            }
            _ => {
                for entry in entries {
                    if let Some(key) = entry.key {
                        self.compile_expr(key)?;
                    }
                    self.compile_expr(entry.value)?;
                }
                self.emit_arg(OpCode::BuildMap, entries.len() as u32);
            }
        }
        Ok(())
    }

    fn compile_slice(&mut self, slice: &SliceExpr<'_>) -> CompileResult {
        for bound in [slice.lower, slice.upper] {
            match bound {
                Some(bound) => self.compile_expr(bound)?,
                None => self.load_const(Constant::None),
            }
        }
        let mut count = 2;
        if let Some(step) = slice.step {
            self.compile_expr(step)?;
            count += 1;
        }
        self.emit_arg(OpCode::BuildSlice, count);
        Ok(())
    }

    fn compile_joined_str(&mut self, joined: &JoinedStrExpr<'_>) -> CompileResult {
        for part in joined.values {
            match part {
                FStringPart::Literal(text) => self.load_const(Constant::Str(text.to_string())),
                FStringPart::Formatted(field) => {
                    self.compile_expr(field.value)?;
                    let mut arg = match field.conversion {
                        Some('s') => 1,
                        Some('r') => 2,
                        Some('a') => 3,
                        _ => 0,
                    };
                    if let Some(spec) = field.format_spec {
                        self.compile_joined_str(spec)?;
                        arg |= FORMAT_VALUE_HAVE_SPEC;
                    }
                    self.emit_arg(OpCode::FormatValue, arg);
                }
            }
        }
        if joined.values.len() != 1 {
            self.emit_arg(OpCode::BuildString, joined.values.len() as u32);
        }
        Ok(())
    }

    // ==========================================================================
    // Targets
    // ==========================================================================

    /// Store the value on top of the stack into `target`.
    pub(crate) fn compile_store(&mut self, target: &Expr<'_>) -> CompileResult {
        match target {
            Expr::Name(ident) => self.nameop(ident.name, NameContext::Store),
            Expr::Attribute(attribute) => {
                self.compile_expr(attribute.value)?;
                self.emit_mangled(OpCode::StoreAttr, attribute.attr.name);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(subscript.value)?;
                self.compile_expr(subscript.index)?;
                self.emit(OpCode::StoreSubscr);
            }
            Expr::List(seq) | Expr::Tuple(seq) => self.unpack_into(seq.elements)?,
            Expr::Starred(starred) => {
                return Err(CompileError::StarredMisuse { span: starred.span });
            }
            other => {
                return Err(CompileError::InvalidTarget {
                    what: other.describe(),
                    span: other.span(),
                });
            }
        }
        Ok(())
    }

    fn unpack_into(&mut self, elements: &[Expr<'_>]) -> CompileResult {
        let count = elements.len();
        let mut seen_star = false;
        for (i, element) in elements.iter().enumerate() {
            if let Expr::Starred(starred) = element {
                if seen_star {
                    return Err(CompileError::MultipleStarredTargets { span: starred.span });
                }
                let after = count - i - 1;
                if i >= 1 << 8 || after >= (i32::MAX >> 8) as usize {
                    return Err(CompileError::TooManyUnpackTargets { span: starred.span });
                }
                self.emit_arg(OpCode::UnpackEx, (i + (after << 8)) as u32);
                seen_star = true;
            }
        }
        if !seen_star {
            self.emit_arg(OpCode::UnpackSequence, count as u32);
        }
        for element in elements {
            match element {
                Expr::Starred(starred) => self.compile_store(starred.value)?,
                _ => self.compile_store(element)?,
            }
        }
        Ok(())
    }

    /// Delete `target`.
    pub(crate) fn compile_delete(&mut self, target: &Expr<'_>) -> CompileResult {
        match target {
            Expr::Name(ident) => self.nameop(ident.name, NameContext::Del),
            Expr::Attribute(attribute) => {
                self.compile_expr(attribute.value)?;
                self.emit_mangled(OpCode::DeleteAttr, attribute.attr.name);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(subscript.value)?;
                self.compile_expr(subscript.index)?;
                self.emit(OpCode::DeleteSubscr);
            }
            Expr::List(seq) | Expr::Tuple(seq) => {
                for element in seq.elements {
                    self.compile_delete(element)?;
                }
            }
            other => {
                return Err(CompileError::InvalidTarget {
                    what: other.describe(),
                    span: other.span(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn is_starred(expr: &Expr<'_>) -> bool {
    matches!(expr, Expr::Starred(_))
}

fn frozenset(items: Vec<Constant>) -> Constant {
    let mut unique: Vec<Constant> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    Constant::FrozenSet(unique)
}

/// `not (a OP b)` for an operator with an exact negation.
fn inverted_compare<'a, 'ast>(
    operand: &'a Expr<'ast>,
) -> Option<(&'a Expr<'ast>, CmpOp, &'a Expr<'ast>)> {
    let Expr::Compare(compare) = operand else {
        return None;
    };
    let ([op], [right]) = (compare.ops, compare.comparators) else {
        return None;
    };
    let inverted = match op {
        CmpOp::Is => CmpOp::IsNot,
        CmpOp::IsNot => CmpOp::Is,
        CmpOp::In => CmpOp::NotIn,
        CmpOp::NotIn => CmpOp::In,
        _ => return None,
    };
    Some((compare.left, inverted, right))
}

fn inverted_compare_of_not<'a, 'ast>(
    expr: &'a Expr<'ast>,
) -> Option<(&'a Expr<'ast>, CmpOp, &'a Expr<'ast>)> {
    match expr {
        Expr::Unary(unary) if unary.op == UnaryOp::Not => inverted_compare(unary.operand),
        _ => None,
    }
}

fn pop_jump(when: bool) -> OpCode {
    if when {
        OpCode::PopJumpIfTrue
    } else {
        OpCode::PopJumpIfFalse
    }
}

fn compare_arg(op: CmpOp) -> u32 {
    match op {
        CmpOp::Lt => 0,
        CmpOp::LtE => 1,
        CmpOp::Eq => 2,
        CmpOp::NotEq => 3,
        CmpOp::Gt => 4,
        CmpOp::GtE => 5,
        CmpOp::In => 6,
        CmpOp::NotIn => 7,
        CmpOp::Is => 8,
        CmpOp::IsNot => 9,
    }
}

pub(crate) fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::BitOr => OpCode::BinaryOr,
        BinaryOp::BitXor => OpCode::BinaryXor,
        BinaryOp::BitAnd => OpCode::BinaryAnd,
        BinaryOp::LShift => OpCode::BinaryLshift,
        BinaryOp::RShift => OpCode::BinaryRshift,
        BinaryOp::Add => OpCode::BinaryAdd,
        BinaryOp::Sub => OpCode::BinarySubtract,
        BinaryOp::Mul => OpCode::BinaryMultiply,
        BinaryOp::MatMul => OpCode::BinaryMatrixMultiply,
        BinaryOp::Div => OpCode::BinaryTrueDivide,
        BinaryOp::FloorDiv => OpCode::BinaryFloorDivide,
        BinaryOp::Mod => OpCode::BinaryModulo,
        BinaryOp::Pow => OpCode::BinaryPower,
    }
}

pub(crate) fn inplace_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::BitOr => OpCode::InplaceOr,
        BinaryOp::BitXor => OpCode::InplaceXor,
        BinaryOp::BitAnd => OpCode::InplaceAnd,
        BinaryOp::LShift => OpCode::InplaceLshift,
        BinaryOp::RShift => OpCode::InplaceRshift,
        BinaryOp::Add => OpCode::InplaceAdd,
        BinaryOp::Sub => OpCode::InplaceSubtract,
        BinaryOp::Mul => OpCode::InplaceMultiply,
        BinaryOp::MatMul => OpCode::InplaceMatrixMultiply,
        BinaryOp::Div => OpCode::InplaceTrueDivide,
        BinaryOp::FloorDiv => OpCode::InplaceFloorDivide,
        BinaryOp::Mod => OpCode::InplaceModulo,
        BinaryOp::Pow => OpCode::InplacePower,
    }
}
