//! Scopes that produce new code objects.
//!
//! Functions, classes, lambdas and comprehensions all follow the same
//! pattern: evaluate whatever the enclosing scope must supply (defaults,
//! annotations, the outermost iterable), compile the body in a fresh
//! [`CodeUnit`](crate::compiler::CodeUnit), then build the function object
//! with `MAKE_FUNCTION` and the closure cells it needs.

use pydiff_core::CompileError;
use pydiff_parser::ast::{
    Arguments, ClassDef, Comprehension, ComprehensionExpr, ComprehensionKind, Expr, FunctionDef,
    LambdaExpr,
};

use crate::bytecode::{
    CodeObject, Constant, MAKE_FUNCTION_ANNOTATIONS, MAKE_FUNCTION_CLOSURE,
    MAKE_FUNCTION_DEFAULTS, MAKE_FUNCTION_KWDEFAULTS, OpCode,
};
use crate::compiler::{CompileResult, Compiler, NameContext};
use crate::symtable::mangle;

impl Compiler<'_> {
    // ==========================================================================
    // def
    // ==========================================================================

    pub(crate) fn compile_function_def(&mut self, def: &FunctionDef<'_>) -> CompileResult {
        for decorator in def.decorators {
            self.compile_expr(decorator)?;
        }
        let firstlineno = def
            .decorators
            .first()
            .map_or(def.span.line, |decorator| decorator.span().line);

        let mut flags = self.compile_defaults(def.args)?;
        if self.compile_annotations(def.args, def.returns)? {
            flags |= MAKE_FUNCTION_ANNOTATIONS;
        }

        self.enter_scope(def.name.name, def.scope, firstlineno);
        let docstring = def
            .body
            .split_first()
            .and_then(|(first, rest)| Some((first.as_docstring()?, rest)));
        let body = match docstring {
            Some((doc, rest)) => {
                let index = self.unit.emitter.add_const(Constant::Str(doc.to_string()));
                self.unit.docstring = Some(index);
                rest
            }
            None => {
                self.unit.emitter.add_const(Constant::None);
                def.body
            }
        };
        self.set_arg_counts(def.args);
        self.compile_statements(body)?;
        self.emit_implicit_return();
        let qualname = self.unit.qualname.clone();
        let code = self.exit_scope();

        self.make_closure(code, flags, qualname);
        for _ in def.decorators {
            self.emit_arg(OpCode::CallFunction, 1);
        }
        self.nameop(def.name.name, NameContext::Store);
        Ok(())
    }

    fn set_arg_counts(&mut self, args: &Arguments<'_>) {
        self.unit.posonlyargcount = args.posonly.len() as u32;
        self.unit.argcount = (args.posonly.len() + args.args.len()) as u32;
        self.unit.kwonlyargcount = args.kwonly.len() as u32;
    }

    /// Push positional and keyword-only defaults, returning the
    /// `MAKE_FUNCTION` flags that describe them.
    fn compile_defaults(&mut self, args: &Arguments<'_>) -> CompileResult<u32> {
        let mut flags = 0;

        let defaults: Vec<&Expr<'_>> = args.positional().filter_map(|param| param.default).collect();
        if !defaults.is_empty() {
            for default in &defaults {
                self.compile_expr(default)?;
            }
            self.emit_arg(OpCode::BuildTuple, defaults.len() as u32);
            flags |= MAKE_FUNCTION_DEFAULTS;
        }

        let mut keys = Vec::new();
        for param in args.kwonly {
            if let Some(default) = param.default {
                keys.push(Constant::Str(self.mangled(param.name.name)));
                self.compile_expr(default)?;
            }
        }
        if !keys.is_empty() {
            let count = keys.len() as u32;
            self.load_const(Constant::Tuple(keys));
            self.emit_arg(OpCode::BuildConstKeyMap, count);
            flags |= MAKE_FUNCTION_KWDEFAULTS;
        }
        Ok(flags)
    }

    /// Push the annotations dict, if any parameter or the return is
    /// annotated.
    fn compile_annotations(
        &mut self,
        args: &Arguments<'_>,
        returns: Option<&Expr<'_>>,
    ) -> CompileResult<bool> {
        let params = args
            .args
            .iter()
            .chain(args.posonly)
            .chain(args.vararg.as_ref())
            .chain(args.kwonly)
            .chain(args.kwarg.as_ref());

        let mut keys = Vec::new();
        for param in params {
            if let Some(annotation) = param.annotation {
                self.compile_expr(annotation)?;
                keys.push(Constant::Str(self.mangled(param.name.name)));
            }
        }
        if let Some(returns) = returns {
            self.compile_expr(returns)?;
            keys.push(Constant::Str("return".to_string()));
        }
        if keys.is_empty() {
            return Ok(false);
        }
        let count = keys.len() as u32;
        self.load_const(Constant::Tuple(keys));
        self.emit_arg(OpCode::BuildConstKeyMap, count);
        Ok(true)
    }

    fn mangled(&self, name: &str) -> String {
        mangle(self.unit.private.as_deref(), name)
    }

    /// Build a function object from `code`, passing down the cells its
    /// free variables refer to.
    fn make_closure(&mut self, code: CodeObject, mut flags: u32, qualname: String) {
        if !code.freevars.is_empty() {
            for name in &code.freevars {
                // Resolved by the symbol table, so the slot always exists.
                let index = self.closure_index(name).unwrap_or_default();
                self.emit_arg(OpCode::LoadClosure, index);
            }
            self.emit_arg(OpCode::BuildTuple, code.freevars.len() as u32);
            flags |= MAKE_FUNCTION_CLOSURE;
        }
        self.load_const(Constant::Code(Box::new(code)));
        self.load_const(Constant::Str(qualname));
        self.emit_arg(OpCode::MakeFunction, flags);
    }

    // ==========================================================================
    // class
    // ==========================================================================

    pub(crate) fn compile_class_def(&mut self, class: &ClassDef<'_>) -> CompileResult {
        for decorator in class.decorators {
            self.compile_expr(decorator)?;
        }
        let firstlineno = class
            .decorators
            .first()
            .map_or(class.span.line, |decorator| decorator.span().line);

        self.enter_scope(class.name.name, class.scope, firstlineno);
        self.unit.private = Some(class.name.name.to_string());
        self.nameop("__name__", NameContext::Load);
        self.nameop("__module__", NameContext::Store);
        self.load_const(Constant::Str(self.unit.qualname.clone()));
        self.nameop("__qualname__", NameContext::Store);
        self.compile_body(class.body)?;

        if self.symbols().needs_class_closure {
            let index = self.closure_index("__class__").unwrap_or_default();
            self.emit_arg(OpCode::LoadClosure, index);
            self.emit(OpCode::DupTop);
            self.nameop("__classcell__", NameContext::Store);
        } else {
            self.load_const(Constant::None);
        }
        self.emit(OpCode::ReturnValue);
        let qualname = self.unit.qualname.clone();
        let code = self.exit_scope();

        self.emit(OpCode::LoadBuildClass);
        self.make_closure(code, 0, qualname);
        self.load_const(Constant::Str(class.name.name.to_string()));
        self.compile_call_args(2, class.bases, class.keywords)?;
        for _ in class.decorators {
            self.emit_arg(OpCode::CallFunction, 1);
        }
        self.nameop(class.name.name, NameContext::Store);
        Ok(())
    }

    // ==========================================================================
    // lambda
    // ==========================================================================

    pub(crate) fn compile_lambda(&mut self, lambda: &LambdaExpr<'_>) -> CompileResult {
        let flags = self.compile_defaults(lambda.args)?;

        self.enter_scope("<lambda>", lambda.scope, lambda.span.line);
        // None first, so a string body is never taken for a docstring
        self.unit.emitter.add_const(Constant::None);
        self.set_arg_counts(lambda.args);
        self.compile_expr(lambda.body)?;
        self.emit(OpCode::ReturnValue);
        let qualname = self.unit.qualname.clone();
        let code = self.exit_scope();

        self.make_closure(code, flags, qualname);
        Ok(())
    }

    // ==========================================================================
    // Comprehensions
    // ==========================================================================

    /// Comprehensions run in their own function, called with an iterator
    /// over the outermost iterable.
    ///
    /// An asynchronous list, set or dict comprehension is a coroutine that
    /// the caller awaits; an asynchronous generator expression is returned
    /// as is.
    pub(crate) fn compile_comprehension(&mut self, comp: &ComprehensionExpr<'_>) -> CompileResult {
        let Some(outermost) = comp.generators.first() else {
            return Ok(());
        };
        let in_coroutine = self.symbols().coroutine;

        self.enter_scope(comp.kind.code_name(), comp.scope, comp.span.line);
        let awaited = self.symbols().coroutine && comp.kind != ComprehensionKind::Generator;
        if awaited && !in_coroutine {
            return Err(CompileError::AsyncComprehensionOutsideAsync { span: comp.span });
        }
        self.unit.argcount = 1;
        match comp.kind {
            ComprehensionKind::List => self.emit_arg(OpCode::BuildList, 0),
            ComprehensionKind::Set => self.emit_arg(OpCode::BuildSet, 0),
            ComprehensionKind::Dict => self.emit_arg(OpCode::BuildMap, 0),
            ComprehensionKind::Generator => {}
        }
        self.compile_generator(comp, 0)?;
        if comp.kind == ComprehensionKind::Generator {
            self.emit_implicit_return();
        } else {
            self.emit(OpCode::ReturnValue);
        }
        let qualname = self.unit.qualname.clone();
        let code = self.exit_scope();

        self.make_closure(code, 0, qualname);
        self.compile_iterable(outermost.iter)?;
        self.emit(iter_opcode(outermost));
        self.emit_arg(OpCode::CallFunction, 1);
        if awaited {
            self.emit_await();
        }
        Ok(())
    }

    fn compile_generator(&mut self, comp: &ComprehensionExpr<'_>, index: usize) -> CompileResult {
        let generator: &Comprehension<'_> = &comp.generators[index];
        let start = self.new_label();
        let if_cleanup = self.new_label();
        let anchor = self.new_label();

        if index == 0 {
            self.unit.emitter.emit_fast(OpCode::LoadFast, ".0");
        } else {
            self.compile_iterable(generator.iter)?;
            self.emit(iter_opcode(generator));
        }
        self.bind_label(start);
        if generator.is_async {
            // `anchor` is the handler that ends the loop on StopAsyncIteration.
            self.emit_jump(OpCode::SetupFinally, anchor);
            self.emit(OpCode::GetAnext);
            self.load_const(Constant::None);
            self.emit(OpCode::YieldFrom);
            self.emit(OpCode::PopBlock);
        } else {
            self.emit_jump(OpCode::ForIter, anchor);
        }
        self.compile_store(generator.target)?;
        for condition in generator.ifs {
            self.jump_if(condition, if_cleanup, false)?;
        }

        let depth = index + 1;
        if depth < comp.generators.len() {
            self.compile_generator(comp, depth)?;
        } else {
            let stack_depth = depth as u32 + 1;
            match comp.kind {
                ComprehensionKind::Generator => {
                    self.compile_expr(comp.element)?;
                    self.emit(OpCode::YieldValue);
                    self.emit(OpCode::PopTop);
                }
                ComprehensionKind::List => {
                    self.compile_expr(comp.element)?;
                    self.emit_arg(OpCode::ListAppend, stack_depth);
                }
                ComprehensionKind::Set => {
                    self.compile_expr(comp.element)?;
                    self.emit_arg(OpCode::SetAdd, stack_depth);
                }
                ComprehensionKind::Dict => {
                    self.compile_expr(comp.element)?;
                    if let Some(value) = comp.value {
                        self.compile_expr(value)?;
                    }
                    self.emit_arg(OpCode::MapAdd, stack_depth);
                }
            }
        }

        self.bind_label(if_cleanup);
        self.emit_jump(OpCode::JumpAbsolute, start);
        self.bind_label(anchor);
        if generator.is_async {
            self.emit(OpCode::EndAsyncFor);
        }
        Ok(())
    }
}

fn iter_opcode(generator: &Comprehension<'_>) -> OpCode {
    if generator.is_async {
        OpCode::GetAiter
    } else {
        OpCode::GetIter
    }
}
