//! Call lowering.
//!
//! Plain calls use `CALL_FUNCTION` or `CALL_FUNCTION_KW`; attribute calls
//! without keywords or unpacking use `LOAD_METHOD`/`CALL_METHOD`. Anything
//! with `*` or `**` arguments packs positional arguments into one tuple and
//! keywords into one mapping for `CALL_FUNCTION_EX`.

use pydiff_parser::ast::{CallExpr, Expr, Keyword};

use super::is_starred;
use crate::bytecode::{Constant, OpCode};
use crate::compiler::{CompileResult, Compiler};

impl Compiler<'_> {
    pub(crate) fn compile_call(&mut self, call: &CallExpr<'_>) -> CompileResult {
        if let Expr::Attribute(method) = call.func
            && call.keywords.is_empty()
            && !call.args.iter().any(is_starred)
        {
            self.compile_expr(method.value)?;
            self.emit_mangled(OpCode::LoadMethod, method.attr.name);
            for arg in call.args {
                self.compile_expr(arg)?;
            }
            self.emit_arg(OpCode::CallMethod, call.args.len() as u32);
            return Ok(());
        }

        self.compile_expr(call.func)?;
        self.compile_call_args(0, call.args, call.keywords)
    }

    /// Emit the arguments and call instruction for a callable already on
    /// the stack, preceded by `pushed` positional arguments.
    pub(crate) fn compile_call_args(
        &mut self,
        pushed: u32,
        args: &[Expr<'_>],
        keywords: &[Keyword<'_>],
    ) -> CompileResult {
        let unpacks_keywords = keywords.iter().any(|keyword| keyword.arg.is_none());

        let mut packed = 0;
        let mut pending = pushed;
        for arg in args {
            if let Expr::Starred(starred) = arg {
                if pending > 0 {
                    self.emit_arg(OpCode::BuildTuple, pending);
                    pending = 0;
                    packed += 1;
                }
                self.compile_expr(starred.value)?;
                packed += 1;
            } else {
                self.compile_expr(arg)?;
                pending += 1;
            }
        }

        if packed == 0 && !unpacks_keywords {
            if keywords.is_empty() {
                self.emit_arg(OpCode::CallFunction, pending);
                return Ok(());
            }
            let mut names = Vec::with_capacity(keywords.len());
            for keyword in keywords {
                self.compile_expr(keyword.value)?;
                if let Some(name) = keyword.arg {
                    names.push(Constant::Str(name.name.to_string()));
                }
            }
            self.load_const(Constant::Tuple(names));
            self.emit_arg(OpCode::CallFunctionKw, pending + keywords.len() as u32);
            return Ok(());
        }

        if pending > 0 {
            self.emit_arg(OpCode::BuildTuple, pending);
            packed += 1;
        }
        if packed > 1 {
            self.emit_arg(OpCode::BuildTupleUnpackWithCall, packed);
        } else if packed == 0 {
            self.emit_arg(OpCode::BuildTuple, 0);
        }

        let mut mappings = 0;
        let mut run = 0;
        for (i, keyword) in keywords.iter().enumerate() {
            if keyword.arg.is_none() {
                if run > 0 {
                    self.compile_keyword_map(&keywords[i - run..i])?;
                    mappings += 1;
                    run = 0;
                }
                self.compile_expr(keyword.value)?;
                mappings += 1;
            } else {
                run += 1;
            }
        }
        if run > 0 {
            self.compile_keyword_map(&keywords[keywords.len() - run..])?;
            mappings += 1;
        }
        if mappings > 1 {
            self.emit_arg(OpCode::BuildMapUnpackWithCall, mappings);
        }
        self.emit_arg(OpCode::CallFunctionEx, u32::from(mappings > 0));
        Ok(())
    }

    /// A mapping for a run of named keyword arguments.
    fn compile_keyword_map(&mut self, keywords: &[Keyword<'_>]) -> CompileResult {
        let name = |keyword: &Keyword<'_>| {
            Constant::Str(keyword.arg.map(|ident| ident.name).unwrap_or_default().to_string())
        };
        if keywords.len() > 1 {
            for keyword in keywords {
                self.compile_expr(keyword.value)?;
            }
            self.load_const(Constant::Tuple(keywords.iter().map(name).collect()));
            self.emit_arg(OpCode::BuildConstKeyMap, keywords.len() as u32);
        } else {
            for keyword in keywords {
                self.load_const(name(keyword));
                self.compile_expr(keyword.value)?;
            }
            self.emit_arg(OpCode::BuildMap, keywords.len() as u32);
        }
        Ok(())
    }
}
