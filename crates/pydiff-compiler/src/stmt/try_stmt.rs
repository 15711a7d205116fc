//! `try` and `with` statements.
//!
//! Both use the 3.8 block protocol: `SETUP_FINALLY`/`SETUP_WITH` push a
//! handler, `POP_BLOCK` removes it on the normal path, and `BEGIN_FINALLY`
//! enters the cleanup code with `None` standing in for "no exception".

use pydiff_core::CompileError;
use pydiff_parser::ast::{ExceptHandler, TryStmt, WithStmt};

use crate::bytecode::{COMPARE_EXCEPTION_MATCH, Constant, OpCode};
use crate::compiler::{CompileResult, Compiler, NameContext};
use crate::emit::BlockKind;

impl Compiler<'_> {
    pub(super) fn compile_try_finally(&mut self, stmt: &TryStmt<'_>) -> CompileResult {
        let body = self.new_label();
        let end = self.new_label();

        self.emit_jump(OpCode::SetupFinally, end);
        self.bind_label(body);
        self.unit
            .emitter
            .push_block(BlockKind::FinallyTry, body, Some(end));
        if stmt.handlers.is_empty() {
            self.compile_statements(stmt.body)?;
        } else {
            self.compile_try_except(stmt)?;
        }
        self.emit(OpCode::PopBlock);
        self.emit(OpCode::BeginFinally);
        self.unit.emitter.pop_block(BlockKind::FinallyTry);

        self.bind_label(end);
        self.unit.emitter.push_block(BlockKind::FinallyEnd, end, None);
        self.compile_statements(stmt.finalbody)?;
        self.emit(OpCode::EndFinally);
        self.unit.emitter.pop_block(BlockKind::FinallyEnd);
        Ok(())
    }

    pub(super) fn compile_try_except(&mut self, stmt: &TryStmt<'_>) -> CompileResult {
        let body = self.new_label();
        let mut except = self.new_label();
        let orelse = self.new_label();
        let end = self.new_label();

        self.emit_jump(OpCode::SetupFinally, except);
        self.bind_label(body);
        self.unit.emitter.push_block(BlockKind::Except, body, None);
        self.compile_statements(stmt.body)?;
        self.emit(OpCode::PopBlock);
        self.unit.emitter.pop_block(BlockKind::Except);
        self.emit_jump(OpCode::JumpForward, orelse);

        let count = stmt.handlers.len();
        self.bind_label(except);
        for (i, handler) in stmt.handlers.iter().enumerate() {
            if handler.typ.is_none() && i + 1 < count {
                return Err(CompileError::DefaultExceptNotLast { span: handler.span });
            }
            self.set_line(handler.span);
            except = self.new_label();
            if let Some(typ) = handler.typ {
                self.emit(OpCode::DupTop);
                self.compile_expr(typ)?;
                self.emit_arg(OpCode::CompareOp, COMPARE_EXCEPTION_MATCH);
                self.emit_jump(OpCode::PopJumpIfFalse, except);
            }
            self.emit(OpCode::PopTop);
            self.compile_handler_body(handler)?;
            self.emit_jump(OpCode::JumpForward, end);
            self.bind_label(except);
        }
        self.emit(OpCode::EndFinally);
        self.bind_label(orelse);
        self.compile_statements(stmt.orelse)?;
        self.bind_label(end);
        Ok(())
    }

    /// The body of one `except` clause, with the exception already matched.
    ///
    /// A named handler is wrapped in an implicit `try`/`finally` that
    /// clears the name, so the traceback cycle is broken on every exit.
    fn compile_handler_body(&mut self, handler: &ExceptHandler<'_>) -> CompileResult {
        let Some(name) = handler.name else {
            let cleanup_body = self.new_label();
            self.emit(OpCode::PopTop);
            self.emit(OpCode::PopTop);
            self.bind_label(cleanup_body);
            self.unit
                .emitter
                .push_block(BlockKind::HandlerCleanup, cleanup_body, None);
            self.compile_statements(handler.body)?;
            self.unit.emitter.pop_block(BlockKind::HandlerCleanup);
            self.emit(OpCode::PopExcept);
            return Ok(());
        };

        let cleanup_end = self.new_label();
        let cleanup_body = self.new_label();
        self.nameop(name.name, NameContext::Store);
        self.emit(OpCode::PopTop);

        self.emit_jump(OpCode::SetupFinally, cleanup_end);
        self.bind_label(cleanup_body);
        self.unit
            .emitter
            .push_block(BlockKind::HandlerCleanup, cleanup_body, Some(cleanup_end));
        self.compile_statements(handler.body)?;
        self.unit.emitter.pop_block(BlockKind::HandlerCleanup);
        self.emit(OpCode::PopBlock);
        self.emit(OpCode::BeginFinally);

        self.bind_label(cleanup_end);
        self.unit
            .emitter
            .push_block(BlockKind::FinallyEnd, cleanup_end, None);
        self.load_const(Constant::None);
        self.nameop(name.name, NameContext::Store);
        self.nameop(name.name, NameContext::Del);
        self.emit(OpCode::EndFinally);
        self.emit(OpCode::PopExcept);
        self.unit.emitter.pop_block(BlockKind::FinallyEnd);
        Ok(())
    }

    /// `with` statements nest one block per item, outermost first.
    pub(super) fn compile_with(&mut self, stmt: &WithStmt<'_>, position: usize) -> CompileResult {
        if stmt.is_async {
            return self.compile_async_with(stmt, position);
        }
        let Some(item) = stmt.items.get(position) else {
            return self.compile_statements(stmt.body);
        };
        let block = self.new_label();
        let finally = self.new_label();

        self.compile_expr(item.context_expr)?;
        self.emit_jump(OpCode::SetupWith, finally);
        self.bind_label(block);
        self.unit
            .emitter
            .push_block(BlockKind::With, block, Some(finally));
        match item.target {
            Some(target) => self.compile_store(target)?,
            None => self.emit(OpCode::PopTop),
        }
        if position + 1 == stmt.items.len() {
            self.compile_statements(stmt.body)?;
        } else {
            self.compile_with(stmt, position + 1)?;
        }
        self.emit(OpCode::PopBlock);
        self.emit(OpCode::BeginFinally);
        self.unit.emitter.pop_block(BlockKind::With);

        self.bind_label(finally);
        self.unit
            .emitter
            .push_block(BlockKind::FinallyEnd, finally, None);
        self.emit(OpCode::WithCleanupStart);
        self.emit(OpCode::WithCleanupFinish);
        self.emit(OpCode::EndFinally);
        self.unit.emitter.pop_block(BlockKind::FinallyEnd);
        Ok(())
    }

    /// Like `with`, but `__aenter__` and `__aexit__` are awaited.
    fn compile_async_with(&mut self, stmt: &WithStmt<'_>, position: usize) -> CompileResult {
        if !self.symbols().is_async {
            return Err(CompileError::OutsideAsyncFunction {
                what: "async with",
                span: stmt.span,
            });
        }
        let Some(item) = stmt.items.get(position) else {
            return self.compile_statements(stmt.body);
        };
        let block = self.new_label();
        let finally = self.new_label();

        self.compile_expr(item.context_expr)?;
        self.emit(OpCode::BeforeAsyncWith);
        self.emit_await();
        self.emit_jump(OpCode::SetupAsyncWith, finally);
        self.bind_label(block);
        self.unit
            .emitter
            .push_block(BlockKind::AsyncWith, block, Some(finally));
        match item.target {
            Some(target) => self.compile_store(target)?,
            None => self.emit(OpCode::PopTop),
        }
        if position + 1 == stmt.items.len() {
            self.compile_statements(stmt.body)?;
        } else {
            self.compile_async_with(stmt, position + 1)?;
        }
        self.emit(OpCode::PopBlock);
        self.emit(OpCode::BeginFinally);
        self.unit.emitter.pop_block(BlockKind::AsyncWith);

        self.bind_label(finally);
        self.unit
            .emitter
            .push_block(BlockKind::FinallyEnd, finally, None);
        self.emit(OpCode::WithCleanupStart);
        self.emit_await();
        self.emit(OpCode::WithCleanupFinish);
        self.emit(OpCode::EndFinally);
        self.unit.emitter.pop_block(BlockKind::FinallyEnd);
        Ok(())
    }
}
