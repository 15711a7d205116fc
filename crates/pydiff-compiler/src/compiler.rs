//! Code generation driver.
//!
//! The [`Compiler`] walks the tree produced by the parser and lowers it into
//! one [`CodeObject`] per scope. Each scope under construction is a
//! [`CodeUnit`]; entering a `def`, `class`, `lambda` or comprehension pushes
//! the current unit and starts a fresh one, and leaving it assembles the
//! finished unit into a code object that becomes a constant of its parent.
//!
//! Statement and expression lowering live in [`crate::stmt`] and
//! [`crate::expr`]; scopes that build functions and classes live in
//! [`crate::function_compiler`].

use pydiff_core::{CompileError, Span};
use pydiff_parser::ast::{Module, ScopeId, Stmt};

use crate::assembler::{CodeHeader, assemble};
use crate::bytecode::{CodeFlags, CodeObject, Constant, Label, OpCode};
use crate::emit::CodeEmitter;
use crate::symtable::{Scope, ScopeKind, SymbolScope, SymbolTable, mangle};

pub(crate) type CompileResult<T = ()> = Result<T, CompileError>;

/// How a name is being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameContext {
    Load,
    Store,
    Del,
}

/// One scope being compiled.
#[derive(Debug)]
pub(crate) struct CodeUnit {
    pub scope: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub qualname: String,
    /// Class name used for private name mangling
    pub private: Option<String>,
    pub emitter: CodeEmitter,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub firstlineno: u32,
    /// Constant slot of the docstring
    pub docstring: Option<u32>,
}

impl CodeUnit {
    fn new(
        info: &Scope,
        scope: ScopeId,
        name: String,
        qualname: String,
        private: Option<String>,
        firstlineno: u32,
    ) -> Self {
        let mut emitter = CodeEmitter::new();
        emitter.set_line(firstlineno);
        for param in &info.params {
            emitter.add_varname(param);
        }
        Self {
            scope,
            kind: info.kind,
            name,
            qualname,
            private,
            emitter,
            cellvars: info.cellvars(),
            freevars: info.freevars(),
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            firstlineno,
            docstring: None,
        }
    }
}

/// Lowers a module into code objects.
pub(crate) struct Compiler<'sym> {
    symtable: &'sym SymbolTable,
    filename: String,
    /// The scope being compiled
    pub(crate) unit: CodeUnit,
    /// Enclosing scopes, innermost last
    parents: Vec<CodeUnit>,
}

impl<'sym> Compiler<'sym> {
    fn new(symtable: &'sym SymbolTable, filename: &str) -> Self {
        let unit = CodeUnit::new(
            symtable.scope(ScopeId::MODULE),
            ScopeId::MODULE,
            "<module>".to_string(),
            "<module>".to_string(),
            None,
            1,
        );
        Self {
            symtable,
            filename: filename.to_string(),
            unit,
            parents: Vec::new(),
        }
    }

    /// Compile a whole module.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn compile_module(
        module: &Module<'_>,
        symtable: &'sym SymbolTable,
        filename: &str,
    ) -> CompileResult<CodeObject> {
        let mut compiler = Compiler::new(symtable, filename);
        if let Some(first) = module.body.first() {
            compiler.set_line(first.span());
        }
        compiler.compile_body(module.body)?;
        compiler.emit_implicit_return();
        let unit = compiler.unit_snapshot();
        Ok(compiler.assemble_unit(unit))
    }

    /// Swap the finished module unit out of the compiler.
    fn unit_snapshot(&mut self) -> CodeUnit {
        let placeholder = CodeUnit::new(
            self.symtable.scope(ScopeId::MODULE),
            ScopeId::MODULE,
            String::new(),
            String::new(),
            None,
            1,
        );
        std::mem::replace(&mut self.unit, placeholder)
    }

    // ==========================================================================
    // Scopes
    // ==========================================================================

    /// Symbol information for the current scope.
    pub(crate) fn symbols(&self) -> &'sym Scope {
        self.symtable.scope(self.unit.scope)
    }

    /// Start compiling a nested scope.
    pub(crate) fn enter_scope(&mut self, name: &str, scope: ScopeId, firstlineno: u32) {
        let info = self.symtable.scope(scope);
        let qualname = self.qualname_for(name, info.kind);
        let mut unit = CodeUnit::new(
            info,
            scope,
            name.to_string(),
            qualname,
            self.unit.private.clone(),
            firstlineno,
        );
        if self.unit.emitter.is_suppressed() {
            unit.emitter.suppress();
        }
        let parent = std::mem::replace(&mut self.unit, unit);
        self.parents.push(parent);
    }

    /// Finish the current scope and return to its parent.
    pub(crate) fn exit_scope(&mut self) -> CodeObject {
        let finished = match self.parents.pop() {
            Some(parent) => std::mem::replace(&mut self.unit, parent),
            None => self.unit_snapshot(),
        };
        self.assemble_unit(finished)
    }

    fn assemble_unit(&self, unit: CodeUnit) -> CodeObject {
        let info = self.symtable.scope(unit.scope);
        let header = CodeHeader {
            name: unit.name,
            filename: self.filename.clone(),
            firstlineno: unit.firstlineno,
            argcount: unit.argcount,
            posonlyargcount: unit.posonlyargcount,
            kwonlyargcount: unit.kwonlyargcount,
            flags: code_flags(info),
            docstring: unit.docstring,
            cellvars: unit.cellvars,
            freevars: unit.freevars,
        };
        assemble(unit.emitter.finish(), header)
    }

    fn qualname_for(&self, name: &str, kind: ScopeKind) -> String {
        let parent = &self.unit;
        if parent.kind == ScopeKind::Module {
            return name.to_string();
        }
        if matches!(kind, ScopeKind::Function | ScopeKind::Class) {
            let mangled = mangle(parent.private.as_deref(), name);
            if self.symbols().lookup(&mangled) == Some(SymbolScope::GlobalExplicit) {
                return name.to_string();
            }
        }
        match parent.kind {
            ScopeKind::Function | ScopeKind::Lambda => {
                format!("{}.<locals>.{}", parent.qualname, name)
            }
            _ => format!("{}.{}", parent.qualname, name),
        }
    }

    // ==========================================================================
    // Emission helpers
    // ==========================================================================

    pub(crate) fn emit(&mut self, op: OpCode) {
        self.unit.emitter.emit(op);
    }

    pub(crate) fn emit_arg(&mut self, op: OpCode, arg: u32) {
        self.unit.emitter.emit_arg(op, arg);
    }

    pub(crate) fn emit_jump(&mut self, op: OpCode, target: Label) {
        self.unit.emitter.emit_jump(op, target);
    }

    pub(crate) fn new_label(&mut self) -> Label {
        self.unit.emitter.new_label()
    }

    pub(crate) fn bind_label(&mut self, label: Label) {
        self.unit.emitter.bind_label(label);
    }

    pub(crate) fn load_const(&mut self, constant: Constant) {
        self.unit.emitter.load_const(constant);
    }

    /// Emit an opcode naming an attribute or module, mangled in class bodies.
    pub(crate) fn emit_mangled(&mut self, op: OpCode, name: &str) {
        let mangled = mangle(self.unit.private.as_deref(), name);
        self.unit.emitter.emit_name(op, &mangled);
    }

    /// Associate following instructions with the line of `span`.
    pub(crate) fn set_line(&mut self, span: Span) {
        self.unit.emitter.set_line(span.line);
    }

    /// Advance the line for an expression that starts on a later line.
    pub(crate) fn advance_line(&mut self, span: Span) {
        if span.line > self.unit.emitter.current_line() {
            self.unit.emitter.set_line(span.line);
        }
    }

    /// Compile `body` without producing any code.
    pub(crate) fn unreachable<F>(&mut self, body: F) -> CompileResult
    where
        F: FnOnce(&mut Self) -> CompileResult,
    {
        self.unit.emitter.suppress();
        let result = body(self);
        self.unit.emitter.resume();
        result
    }

    /// Append `return None` unless the code already ends with a return.
    pub(crate) fn emit_implicit_return(&mut self) {
        if !self.unit.emitter.ends_with_return() {
            self.load_const(Constant::None);
            self.emit(OpCode::ReturnValue);
        }
    }

    // ==========================================================================
    // Names
    // ==========================================================================

    /// Load, store or delete a variable according to its resolved scope.
    pub(crate) fn nameop(&mut self, name: &str, ctx: NameContext) {
        let mangled = mangle(self.unit.private.as_deref(), name);
        let function_like = self.unit.kind.is_function_like();

        enum Access {
            Fast,
            Global,
            Deref(u32),
            Name,
        }

        let access = match self.symbols().lookup(&mangled) {
            Some(SymbolScope::Free) => self.free_index(&mangled).map_or(Access::Name, Access::Deref),
            Some(SymbolScope::Cell) => self.cell_index(&mangled).map_or(Access::Name, Access::Deref),
            Some(SymbolScope::Local) if function_like => Access::Fast,
            Some(SymbolScope::GlobalImplicit) if function_like => Access::Global,
            Some(SymbolScope::GlobalExplicit) => Access::Global,
            _ => Access::Name,
        };

        match access {
            Access::Fast => {
                let op = match ctx {
                    NameContext::Load => OpCode::LoadFast,
                    NameContext::Store => OpCode::StoreFast,
                    NameContext::Del => OpCode::DeleteFast,
                };
                self.unit.emitter.emit_fast(op, &mangled);
            }
            Access::Global => {
                let op = match ctx {
                    NameContext::Load => OpCode::LoadGlobal,
                    NameContext::Store => OpCode::StoreGlobal,
                    NameContext::Del => OpCode::DeleteGlobal,
                };
                self.unit.emitter.emit_name(op, &mangled);
            }
            Access::Deref(index) => {
                let op = match ctx {
                    NameContext::Load if self.unit.kind == ScopeKind::Class => {
                        OpCode::LoadClassderef
                    }
                    NameContext::Load => OpCode::LoadDeref,
                    NameContext::Store => OpCode::StoreDeref,
                    NameContext::Del => OpCode::DeleteDeref,
                };
                self.emit_arg(op, index);
            }
            Access::Name => {
                let op = match ctx {
                    NameContext::Load => OpCode::LoadName,
                    NameContext::Store => OpCode::StoreName,
                    NameContext::Del => OpCode::DeleteName,
                };
                self.unit.emitter.emit_name(op, &mangled);
            }
        }
    }

    fn cell_index(&self, name: &str) -> Option<u32> {
        self.unit
            .cellvars
            .iter()
            .position(|cell| cell == name)
            .map(|index| index as u32)
    }

    fn free_index(&self, name: &str) -> Option<u32> {
        self.unit
            .freevars
            .iter()
            .position(|free| free == name)
            .map(|index| (self.unit.cellvars.len() + index) as u32)
    }

    /// Closure slot of `name` when passing it down to a nested scope.
    pub(crate) fn closure_index(&self, name: &str) -> Option<u32> {
        if self.unit.kind == ScopeKind::Class && name == "__class__" {
            return self.cell_index(name);
        }
        match self.symbols().lookup(name) {
            Some(SymbolScope::Cell) => self.cell_index(name),
            _ => self.free_index(name),
        }
    }

    // ==========================================================================
    // Bodies
    // ==========================================================================

    /// Compile a module or class body: annotations setup, docstring, statements.
    pub(crate) fn compile_body(&mut self, body: &[Stmt<'_>]) -> CompileResult {
        if body.iter().any(has_annotation) {
            self.emit(OpCode::SetupAnnotations);
        }
        let mut statements = body;
        if let Some((first, rest)) = body.split_first()
            && let Some(doc) = first.as_docstring()
        {
            self.set_line(first.span());
            let doc = Constant::Str(doc.to_string());
            self.unit.docstring = Some(self.unit.emitter.add_const(doc.clone()));
            self.load_const(doc);
            self.nameop("__doc__", NameContext::Store);
            statements = rest;
        }
        self.compile_statements(statements)
    }

    pub(crate) fn compile_statements(&mut self, body: &[Stmt<'_>]) -> CompileResult {
        body.iter().try_for_each(|stmt| self.compile_stmt(stmt))
    }
}

/// Code flags derived from a scope's analysis.
fn code_flags(info: &Scope) -> CodeFlags {
    let mut flags = CodeFlags::empty();
    if info.kind.is_function_like() {
        flags |= CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
        if info.varargs {
            flags |= CodeFlags::VARARGS;
        }
        if info.varkeywords {
            flags |= CodeFlags::VARKEYWORDS;
        }
        if info.nested {
            flags |= CodeFlags::NESTED;
        }
        flags |= match (info.coroutine, info.generator) {
            (true, true) => CodeFlags::ASYNC_GENERATOR,
            (true, false) => CodeFlags::COROUTINE,
            (false, true) => CodeFlags::GENERATOR,
            (false, false) => CodeFlags::empty(),
        };
    }
    flags
}

/// Whether a statement is or contains an annotated assignment, looking into
/// compound statements but not nested scopes.
fn has_annotation(stmt: &Stmt<'_>) -> bool {
    let any = |body: &[Stmt<'_>]| body.iter().any(has_annotation);
    match stmt {
        Stmt::AnnAssign(_) => true,
        Stmt::If(s) => any(s.body) || any(s.orelse),
        Stmt::While(s) => any(s.body) || any(s.orelse),
        Stmt::For(s) => any(s.body) || any(s.orelse),
        Stmt::With(s) => any(s.body),
        Stmt::Try(s) => {
            any(s.body)
                || any(s.orelse)
                || any(s.finalbody)
                || s.handlers.iter().any(|handler| any(handler.body))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::compile;
    use crate::bytecode::{CodeFlags, Constant};

    #[test]
    fn qualnames_follow_nesting() {
        let code = compile(
            "def outer():\n    def inner():\n        pass\n    class K:\n        def m(self):\n            pass\n",
            "<test>",
        )
        .unwrap();
        let outer = code.children().next().unwrap();
        let qualnames: Vec<_> = outer
            .consts
            .iter()
            .filter_map(|c| match c {
                Constant::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert!(qualnames.contains(&"outer.<locals>.inner"));
        assert!(qualnames.contains(&"outer.<locals>.K"));

        let class_body = outer.children().nth(1).unwrap();
        assert_eq!(class_body.consts[0], Constant::Str("outer.<locals>.K".into()));
        assert!(class_body
            .consts
            .contains(&Constant::Str("outer.<locals>.K.m".into())));
    }

    #[test]
    fn global_declared_function_keeps_bare_qualname() {
        let code = compile(
            "def outer():\n    global helper\n    def helper():\n        pass\n",
            "<test>",
        )
        .unwrap();
        let outer = code.children().next().unwrap();
        assert!(outer.consts.contains(&Constant::Str("helper".into())));
    }

    #[test]
    fn function_flags() {
        let code = compile(
            "def f(*args, **kwargs):\n    yield args\n",
            "<test>",
        )
        .unwrap();
        let f = code.children().next().unwrap();
        assert!(f.flags.contains(
            CodeFlags::OPTIMIZED
                | CodeFlags::NEWLOCALS
                | CodeFlags::VARARGS
                | CodeFlags::VARKEYWORDS
                | CodeFlags::GENERATOR
                | CodeFlags::NOFREE
        ));
        assert!(!f.flags.contains(CodeFlags::NESTED));
        assert_eq!(code.flags, CodeFlags::NOFREE);
    }

    #[test]
    fn nested_closure_flags() {
        let code = compile(
            "def f():\n    x = 1\n    def g():\n        return x\n    return g\n",
            "<test>",
        )
        .unwrap();
        let f = code.children().next().unwrap();
        assert_eq!(f.cellvars, vec!["x"]);
        assert!(!f.flags.contains(CodeFlags::NOFREE));
        let g = f.children().next().unwrap();
        assert_eq!(g.freevars, vec!["x"]);
        assert!(g.flags.contains(CodeFlags::NESTED));
    }
}
