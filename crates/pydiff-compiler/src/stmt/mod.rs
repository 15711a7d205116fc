//! Statement lowering.
//!
//! Loops and `try` bodies push a [`FrameBlock`](crate::emit::FrameBlock) so
//! that `break`, `continue` and `return` know what has to be unwound on the
//! way out: iterators to pop, `finally` bodies to call, handlers to close.

mod try_stmt;

use pydiff_core::{CompileError, Span};
use pydiff_parser::ast::{
    AnnAssignStmt, AugAssignStmt, Expr, ForStmt, IfStmt, ImportFromStmt, ImportStmt, Stmt,
    WhileStmt,
};

use crate::bytecode::{Constant, OpCode};
use crate::compiler::{CompileResult, Compiler, NameContext};
use crate::emit::{BlockKind, FrameBlock};
use crate::expr::constant::fold;
use crate::expr::inplace_opcode;
use crate::symtable::mangle;

impl Compiler<'_> {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt<'_>) -> CompileResult {
        self.set_line(stmt.span());
        match stmt {
            Stmt::Expr(expr) => {
                if fold(expr.value).is_none() {
                    self.compile_expr(expr.value)?;
                    self.emit(OpCode::PopTop);
                }
            }
            Stmt::Assign(assign) => {
                self.compile_expr(assign.value)?;
                let count = assign.targets.len();
                for (i, target) in assign.targets.iter().enumerate() {
                    if i + 1 < count {
                        self.emit(OpCode::DupTop);
                    }
                    self.compile_store(target)?;
                }
            }
            Stmt::AugAssign(aug) => self.compile_aug_assign(aug)?,
            Stmt::AnnAssign(ann) => self.compile_ann_assign(ann)?,
            Stmt::Delete(delete) => {
                for target in delete.targets {
                    self.compile_delete(target)?;
                }
            }
            Stmt::Pass(_) | Stmt::Global(_) | Stmt::Nonlocal(_) => {}
            Stmt::Break(span) => self.compile_break(*span)?,
            Stmt::Continue(span) => self.compile_continue(*span)?,
            Stmt::Return(ret) => self.compile_return(ret.value, ret.span)?,
            Stmt::Raise(raise) => {
                let mut count = 0;
                if let Some(exc) = raise.exc {
                    self.compile_expr(exc)?;
                    count += 1;
                    if let Some(cause) = raise.cause {
                        self.compile_expr(cause)?;
                        count += 1;
                    }
                }
                self.emit_arg(OpCode::RaiseVarargs, count);
            }
            Stmt::Import(import) => self.compile_import(import)?,
            Stmt::ImportFrom(import) => self.compile_import_from(import)?,
            Stmt::If(if_stmt) => self.compile_if(if_stmt)?,
            Stmt::While(while_stmt) => self.compile_while(while_stmt)?,
            Stmt::For(for_stmt) => self.compile_for(for_stmt)?,
            Stmt::Try(try_stmt) => {
                if try_stmt.finalbody.is_empty() {
                    self.compile_try_except(try_stmt)?;
                } else {
                    self.compile_try_finally(try_stmt)?;
                }
            }
            Stmt::With(with) => self.compile_with(with, 0)?,
            Stmt::Assert(assert) => {
                let end = self.new_label();
                self.jump_if(assert.test, end, true)?;
                self.unit
                    .emitter
                    .emit_name(OpCode::LoadGlobal, "AssertionError");
                if let Some(msg) = assert.msg {
                    self.compile_expr(msg)?;
                    self.emit_arg(OpCode::CallFunction, 1);
                }
                self.emit_arg(OpCode::RaiseVarargs, 1);
                self.bind_label(end);
            }
            Stmt::FunctionDef(def) => self.compile_function_def(def)?,
            Stmt::ClassDef(class) => self.compile_class_def(class)?,
        }
        Ok(())
    }

    // ==========================================================================
    // Assignment
    // ==========================================================================

    fn compile_aug_assign(&mut self, aug: &AugAssignStmt<'_>) -> CompileResult {
        let op = inplace_opcode(aug.op);
        match aug.target {
            Expr::Name(ident) => {
                self.nameop(ident.name, NameContext::Load);
                self.compile_expr(aug.value)?;
                self.emit(op);
                self.nameop(ident.name, NameContext::Store);
            }
            Expr::Attribute(attribute) => {
                self.compile_expr(attribute.value)?;
                self.emit(OpCode::DupTop);
                self.emit_mangled(OpCode::LoadAttr, attribute.attr.name);
                self.compile_expr(aug.value)?;
                self.emit(op);
                self.emit(OpCode::RotTwo);
                self.emit_mangled(OpCode::StoreAttr, attribute.attr.name);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(subscript.value)?;
                self.compile_expr(subscript.index)?;
                self.emit(OpCode::DupTopTwo);
                self.emit(OpCode::BinarySubscr);
                self.compile_expr(aug.value)?;
                self.emit(op);
                self.emit(OpCode::RotThree);
                self.emit(OpCode::StoreSubscr);
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

    fn compile_ann_assign(&mut self, ann: &AnnAssignStmt<'_>) -> CompileResult {
        if let Some(value) = ann.value {
            self.compile_expr(value)?;
            self.compile_store(ann.target)?;
        }
        let module_or_class = !self.unit.kind.is_function_like();
        match ann.target {
            Expr::Name(ident) if ann.simple => {
                if module_or_class {
                    self.compile_expr(ann.annotation)?;
                    self.unit
                        .emitter
                        .emit_name(OpCode::LoadName, "__annotations__");
                    let mangled = mangle(self.unit.private.as_deref(), ident.name);
                    self.load_const(Constant::Str(mangled));
                    self.emit(OpCode::StoreSubscr);
                }
            }
            Expr::Attribute(attribute) => {
                if ann.value.is_none() {
                    self.check_ann_expr(attribute.value)?;
                }
                if module_or_class {
                    self.check_ann_expr(ann.annotation)?;
                }
            }
            Expr::Subscript(subscript) => {
                if ann.value.is_none() {
                    self.check_ann_expr(subscript.value)?;
                    self.check_ann_subscript(subscript.index)?;
                }
                if module_or_class {
                    self.check_ann_expr(ann.annotation)?;
                }
            }
            _ => {
                if module_or_class {
                    self.check_ann_expr(ann.annotation)?;
                }
            }
        }
        Ok(())
    }

    /// Evaluate an expression only for its side effects.
    fn check_ann_expr(&mut self, expr: &Expr<'_>) -> CompileResult {
        self.compile_expr(expr)?;
        self.emit(OpCode::PopTop);
        Ok(())
    }

    fn check_ann_subscript(&mut self, index: &Expr<'_>) -> CompileResult {
        match index {
            Expr::Slice(slice) => {
                for bound in [slice.lower, slice.upper, slice.step].into_iter().flatten() {
                    self.check_ann_expr(bound)?;
                }
                Ok(())
            }
            Expr::Tuple(tuple) if tuple.elements.iter().any(|e| matches!(e, Expr::Slice(_))) => {
                tuple
                    .elements
                    .iter()
                    .try_for_each(|element| self.check_ann_subscript(element))
            }
            _ => self.check_ann_expr(index),
        }
    }

    // ==========================================================================
    // Imports
    // ==========================================================================

    fn compile_import(&mut self, import: &ImportStmt<'_>) -> CompileResult {
        for alias in import.names {
            let name = alias.name.name;
            self.load_const(Constant::Int("0".into()));
            self.load_const(Constant::None);
            self.emit_mangled(OpCode::ImportName, name);
            match alias.asname {
                Some(asname) => {
                    let mut parts = name.split('.').skip(1).peekable();
                    if parts.peek().is_some() {
                        while let Some(part) = parts.next() {
                            self.unit.emitter.emit_name(OpCode::ImportFrom, part);
                            if parts.peek().is_some() {
                                self.emit(OpCode::RotTwo);
                                self.emit(OpCode::PopTop);
                            }
                        }
                        self.nameop(asname.name, NameContext::Store);
                        self.emit(OpCode::PopTop);
                    } else {
                        self.nameop(asname.name, NameContext::Store);
                    }
                }
                None => {
                    let head = name.split('.').next().unwrap_or(name);
                    self.nameop(head, NameContext::Store);
                }
            }
        }
        Ok(())
    }

    fn compile_import_from(&mut self, import: &ImportFromStmt<'_>) -> CompileResult {
        self.load_const(Constant::Int(import.level.to_string()));
        let names = import
            .names
            .iter()
            .map(|alias| Constant::Str(alias.name.name.to_string()))
            .collect();
        self.load_const(Constant::Tuple(names));
        self.emit_mangled(OpCode::ImportName, import.module.unwrap_or(""));

        for (i, alias) in import.names.iter().enumerate() {
            if i == 0 && alias.name.name == "*" {
                self.emit(OpCode::ImportStar);
                return Ok(());
            }
            self.emit_mangled(OpCode::ImportFrom, alias.name.name);
            let store = alias.asname.unwrap_or(alias.name);
            self.nameop(store.name, NameContext::Store);
        }
        self.emit(OpCode::PopTop);
        Ok(())
    }

    // ==========================================================================
    // Control flow
    // ==========================================================================

    fn compile_if(&mut self, if_stmt: &IfStmt<'_>) -> CompileResult {
        let end = self.new_label();
        match fold(if_stmt.test).map(|value| value.is_truthy()) {
            Some(false) => {
                self.unreachable(|c| c.compile_statements(if_stmt.body))?;
                self.compile_statements(if_stmt.orelse)?;
            }
            Some(true) => {
                self.compile_statements(if_stmt.body)?;
                self.unreachable(|c| c.compile_statements(if_stmt.orelse))?;
            }
            None => {
                let next = if if_stmt.orelse.is_empty() {
                    end
                } else {
                    self.new_label()
                };
                self.jump_if(if_stmt.test, next, false)?;
                self.compile_statements(if_stmt.body)?;
                if !if_stmt.orelse.is_empty() {
                    self.emit_jump(OpCode::JumpForward, end);
                    self.bind_label(next);
                    self.compile_statements(if_stmt.orelse)?;
                }
            }
        }
        self.bind_label(end);
        Ok(())
    }

    fn compile_while(&mut self, while_stmt: &WhileStmt<'_>) -> CompileResult {
        let constant = fold(while_stmt.test).map(|value| value.is_truthy());
        if constant == Some(false) {
            let start = self.new_label();
            let end = self.new_label();
            self.unreachable(|c| {
                c.unit
                    .emitter
                    .push_block(BlockKind::WhileLoop, start, Some(end));
                let body = c.compile_statements(while_stmt.body);
                c.unit.emitter.pop_block(BlockKind::WhileLoop);
                body
            })?;
            return self.compile_statements(while_stmt.orelse);
        }

        let start = self.new_label();
        let end = self.new_label();
        let anchor = self.new_label();
        self.bind_label(start);
        self.unit
            .emitter
            .push_block(BlockKind::WhileLoop, start, Some(end));
        if constant.is_none() {
            self.jump_if(while_stmt.test, anchor, false)?;
        }
        self.compile_statements(while_stmt.body)?;
        self.emit_jump(OpCode::JumpAbsolute, start);
        if constant.is_none() {
            self.bind_label(anchor);
        }
        self.unit.emitter.pop_block(BlockKind::WhileLoop);
        self.compile_statements(while_stmt.orelse)?;
        self.bind_label(end);
        Ok(())
    }

    fn compile_for(&mut self, for_stmt: &ForStmt<'_>) -> CompileResult {
        if for_stmt.is_async {
            return self.compile_async_for(for_stmt);
        }
        let start = self.new_label();
        let cleanup = self.new_label();
        let end = self.new_label();
        self.unit
            .emitter
            .push_block(BlockKind::ForLoop, start, Some(end));
        self.compile_iterable(for_stmt.iter)?;
        self.emit(OpCode::GetIter);
        self.bind_label(start);
        self.emit_jump(OpCode::ForIter, cleanup);
        self.compile_store(for_stmt.target)?;
        self.compile_statements(for_stmt.body)?;
        self.emit_jump(OpCode::JumpAbsolute, start);
        self.bind_label(cleanup);
        self.unit.emitter.pop_block(BlockKind::ForLoop);
        self.compile_statements(for_stmt.orelse)?;
        self.bind_label(end);
        Ok(())
    }

    /// `async for` replaces `FOR_ITER` with an awaited `__anext__` inside a
    /// handler; `END_ASYNC_FOR` ends the loop on `StopAsyncIteration`.
    fn compile_async_for(&mut self, for_stmt: &ForStmt<'_>) -> CompileResult {
        if !self.symbols().is_async {
            return Err(CompileError::OutsideAsyncFunction {
                what: "async for",
                span: for_stmt.span,
            });
        }
        let start = self.new_label();
        let except = self.new_label();
        let end = self.new_label();
        self.compile_iterable(for_stmt.iter)?;
        self.emit(OpCode::GetAiter);

        self.bind_label(start);
        self.unit
            .emitter
            .push_block(BlockKind::ForLoop, start, Some(end));
        self.emit_jump(OpCode::SetupFinally, except);
        self.emit(OpCode::GetAnext);
        self.load_const(Constant::None);
        self.emit(OpCode::YieldFrom);
        self.emit(OpCode::PopBlock);
        self.compile_store(for_stmt.target)?;
        self.compile_statements(for_stmt.body)?;
        self.emit_jump(OpCode::JumpAbsolute, start);
        self.unit.emitter.pop_block(BlockKind::ForLoop);

        self.bind_label(except);
        self.emit(OpCode::EndAsyncFor);
        self.compile_statements(for_stmt.orelse)?;
        self.bind_label(end);
        Ok(())
    }

    fn compile_return(&mut self, value: Option<&Expr<'_>>, span: Span) -> CompileResult {
        if !self.unit.kind.is_function_like() {
            return Err(CompileError::ReturnOutsideFunction { span });
        }
        let symbols = self.symbols();
        if value.is_some() && symbols.coroutine && symbols.generator {
            return Err(CompileError::ReturnValueInAsyncGenerator { span });
        }
        let preserve_tos = value.is_some_and(|value| fold(value).is_none());
        if let Some(value) = value
            && preserve_tos
        {
            self.compile_expr(value)?;
        }
        for block in self.unit.emitter.blocks().unwind_order() {
            self.unwind_block(&block, preserve_tos);
        }
        match value {
            None => self.load_const(Constant::None),
            Some(value) if !preserve_tos => self.compile_expr(value)?,
            Some(_) => {}
        }
        self.emit(OpCode::ReturnValue);
        Ok(())
    }

    fn compile_break(&mut self, span: Span) -> CompileResult {
        let Some((loop_block, inner)) = self.unit.emitter.blocks().innermost_loop() else {
            return Err(CompileError::BreakOutsideLoop { span });
        };
        for block in &inner {
            self.unwind_block(block, false);
        }
        self.unwind_block(&loop_block, false);
        if let Some(exit) = loop_block.exit {
            self.emit_jump(OpCode::JumpAbsolute, exit);
        }
        Ok(())
    }

    fn compile_continue(&mut self, span: Span) -> CompileResult {
        let Some((loop_block, inner)) = self.unit.emitter.blocks().innermost_loop() else {
            return Err(CompileError::ContinueOutsideLoop { span });
        };
        for block in &inner {
            self.unwind_block(block, false);
        }
        self.emit_jump(OpCode::JumpAbsolute, loop_block.start);
        Ok(())
    }

    /// Emit the code that leaves `block` early, keeping the value on top of
    /// the stack in place when `preserve_tos` is set.
    fn unwind_block(&mut self, block: &FrameBlock, preserve_tos: bool) {
        match block.kind {
            BlockKind::WhileLoop => {}
            BlockKind::ForLoop => {
                if preserve_tos {
                    self.emit(OpCode::RotTwo);
                }
                self.emit(OpCode::PopTop);
            }
            BlockKind::Except => self.emit(OpCode::PopBlock),
            BlockKind::FinallyTry => {
                self.emit(OpCode::PopBlock);
                if let Some(exit) = block.exit {
                    self.emit_jump(OpCode::CallFinally, exit);
                }
            }
            BlockKind::FinallyEnd => {
                self.emit_arg(OpCode::PopFinally, u32::from(preserve_tos));
            }
            BlockKind::With | BlockKind::AsyncWith => {
                self.emit(OpCode::PopBlock);
                if preserve_tos {
                    self.emit(OpCode::RotTwo);
                }
                self.emit(OpCode::BeginFinally);
                self.emit(OpCode::WithCleanupStart);
                if block.kind == BlockKind::AsyncWith {
                    self.emit_await();
                }
                self.emit(OpCode::WithCleanupFinish);
                self.emit_arg(OpCode::PopFinally, 0);
            }
            BlockKind::HandlerCleanup => {
                if preserve_tos {
                    self.emit(OpCode::RotFour);
                }
                match block.exit {
                    Some(exit) => {
                        self.emit(OpCode::PopBlock);
                        self.emit(OpCode::PopExcept);
                        self.emit_jump(OpCode::CallFinally, exit);
                    }
                    None => self.emit(OpCode::PopExcept),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pydiff_core::{CompilationError, CompileError};

    use crate::bytecode::{CodeObject, Constant, OpCode};
    use crate::compile;

    fn ops(code: &CodeObject) -> Vec<OpCode> {
        code.units()
            .map(|(_, op, _)| OpCode::try_from(op).unwrap())
            .collect()
    }

    fn function(source: &str) -> CodeObject {
        let module = compile(source, "<test>").unwrap();
        module.children().next().unwrap().clone()
    }

    #[test]
    fn module_assignment() {
        let code = compile("x = 1\n", "<test>").unwrap();
        assert_eq!(
            ops(&code),
            vec![
                OpCode::LoadConst,
                OpCode::StoreName,
                OpCode::LoadConst,
                OpCode::ReturnValue
            ]
        );
        assert_eq!(code.consts, vec![Constant::Int("1".into()), Constant::None]);
        assert_eq!(code.names, vec!["x"]);
    }

    #[test]
    fn docstring_is_stored() {
        let code = compile("'''Module doc.'''\nx = 1\n", "<test>").unwrap();
        assert_eq!(code.consts[0], Constant::Str("Module doc.".into()));
        assert_eq!(code.docstring, Some(0));
        assert_eq!(code.names, vec!["__doc__", "x"]);
    }

    #[test]
    fn constant_expression_statements_are_dropped() {
        let code = compile("1\n'text'\nx\n", "<test>").unwrap();
        assert_eq!(
            ops(&code),
            vec![
                OpCode::LoadName,
                OpCode::PopTop,
                OpCode::LoadConst,
                OpCode::ReturnValue
            ]
        );
    }

    #[test]
    fn chained_assignment_duplicates_value() {
        let code = compile("a = b = f()\n", "<test>").unwrap();
        let ops = ops(&code);
        assert_eq!(ops[2], OpCode::DupTop);
        assert_eq!(ops[3], OpCode::StoreName);
        assert_eq!(ops[4], OpCode::StoreName);
    }

    #[test]
    fn swap_uses_rotation() {
        let code = compile("a, b = b, a\n", "<test>").unwrap();
        assert_eq!(ops(&code)[2], OpCode::RotTwo);
    }

    #[test]
    fn starred_unpacking() {
        let code = compile("a, *b, c = items\n", "<test>").unwrap();
        let units: Vec<_> = code
            .units()
            .map(|(_, op, arg)| (OpCode::try_from(op).unwrap(), arg))
            .collect();
        assert_eq!(units[1], (OpCode::ExtendedArg, 1));
        assert_eq!(units[2], (OpCode::UnpackEx, 1));
    }

    #[test]
    fn multiple_starred_targets_are_rejected() {
        let error = compile("*a, *b = items\n", "<test>").unwrap_err();
        assert!(matches!(
            error,
            CompilationError::Compile(CompileError::MultipleStarredTargets { .. })
        ));
    }

    #[test]
    fn augmented_subscript() {
        let code = compile("a[i] += 1\n", "<test>").unwrap();
        assert_eq!(
            ops(&code)[..8],
            [
                OpCode::LoadName,
                OpCode::LoadName,
                OpCode::DupTopTwo,
                OpCode::BinarySubscr,
                OpCode::LoadConst,
                OpCode::InplaceAdd,
                OpCode::RotThree,
                OpCode::StoreSubscr,
            ]
        );
    }

    #[test]
    fn while_loop_with_break() {
        let f = function("def f(x):\n    while x:\n        if x > 3:\n            break\n        x -= 1\n");
        let ops = ops(&f);
        assert_eq!(ops[0], OpCode::LoadFast);
        assert_eq!(ops[1], OpCode::PopJumpIfFalse);
        assert!(ops.contains(&OpCode::JumpAbsolute));
        assert_eq!(ops.last(), Some(&OpCode::ReturnValue));
    }

    #[test]
    fn while_true_has_no_test() {
        let f = function("def f():\n    while True:\n        g()\n");
        assert_eq!(
            ops(&f),
            vec![
                OpCode::LoadGlobal,
                OpCode::CallFunction,
                OpCode::PopTop,
                OpCode::JumpAbsolute,
                OpCode::LoadConst,
                OpCode::ReturnValue
            ]
        );
    }

    #[test]
    fn dead_branches_still_register_names() {
        let code = compile("if 0:\n    x = 1\ny = 2\n", "<test>").unwrap();
        assert_eq!(code.names, vec!["x", "y"]);
        assert!(!code.consts.contains(&Constant::Int("1".into())));
    }

    #[test]
    fn return_inside_for_pops_iterator() {
        let f = function("def f(items):\n    for item in items:\n        return item\n");
        let ops = ops(&f);
        let ret = ops.iter().position(|op| *op == OpCode::ReturnValue).unwrap();
        assert_eq!(&ops[ret - 3..=ret], &[
            OpCode::LoadFast,
            OpCode::RotTwo,
            OpCode::PopTop,
            OpCode::ReturnValue
        ]);
    }

    #[test]
    fn for_over_list_display_iterates_tuple() {
        let code = compile("for x in [1, 2]:\n    pass\n", "<test>").unwrap();
        assert_eq!(
            code.consts[0],
            Constant::Tuple(vec![Constant::Int("1".into()), Constant::Int("2".into())])
        );
    }

    #[test]
    fn imports() {
        let code = compile("import os.path\nimport a.b.c as d\nfrom . import x as y\n", "<test>")
            .unwrap();
        assert_eq!(code.names, vec!["os.path", "os", "a.b.c", "b", "c", "d", "", "x", "y"]);
        assert!(code.consts.contains(&Constant::Tuple(vec![Constant::Str("x".into())])));
    }

    #[test]
    fn module_annotations() {
        let code = compile("x: int = 1\n", "<test>").unwrap();
        let ops = ops(&code);
        assert_eq!(ops[0], OpCode::SetupAnnotations);
        assert!(ops.contains(&OpCode::StoreSubscr));
        assert!(code.names.contains(&"__annotations__".to_string()));
    }

    #[test]
    fn function_annotations_are_not_evaluated() {
        let f = function("def f():\n    x: int = 1\n");
        assert_eq!(
            ops(&f),
            vec![
                OpCode::LoadConst,
                OpCode::StoreFast,
                OpCode::LoadConst,
                OpCode::ReturnValue
            ]
        );
    }

    #[test]
    fn async_for_awaits_next_item() {
        let f = function("async def f(xs):\n    async for x in xs:\n        g(x)\n");
        assert_eq!(
            ops(&f),
            vec![
                OpCode::LoadFast,
                OpCode::GetAiter,
                OpCode::SetupFinally,
                OpCode::GetAnext,
                OpCode::LoadConst,
                OpCode::YieldFrom,
                OpCode::PopBlock,
                OpCode::StoreFast,
                OpCode::LoadGlobal,
                OpCode::LoadFast,
                OpCode::CallFunction,
                OpCode::PopTop,
                OpCode::JumpAbsolute,
                OpCode::EndAsyncFor,
                OpCode::LoadConst,
                OpCode::ReturnValue
            ]
        );
    }

    #[test]
    fn return_inside_async_for_pops_iterator() {
        let f = function("async def f(xs):\n    async for x in xs:\n        return x\n");
        let ops = ops(&f);
        let ret = ops.iter().position(|op| *op == OpCode::ReturnValue).unwrap();
        assert_eq!(
            ops[ret - 3..=ret],
            [OpCode::LoadFast, OpCode::RotTwo, OpCode::PopTop, OpCode::ReturnValue]
        );
    }

    #[test]
    fn control_flow_errors() {
        for (source, expected) in [
            ("return 1\n", "'return' outside function"),
            ("break\n", "'break' outside loop"),
            ("continue\n", "'continue' not properly in loop"),
            ("class C:\n    yield 1\n", "'yield' outside function"),
        ] {
            let error = compile(source, "<test>").unwrap_err();
            assert_eq!(error.message(), expected, "{source}");
        }
    }

    #[test]
    fn assert_raises_assertion_error() {
        let code = compile("assert x, 'msg'\n", "<test>").unwrap();
        let ops = ops(&code);
        assert_eq!(
            ops[..6],
            [
                OpCode::LoadName,
                OpCode::PopJumpIfTrue,
                OpCode::LoadGlobal,
                OpCode::LoadConst,
                OpCode::CallFunction,
                OpCode::RaiseVarargs
            ]
        );
    }
}
