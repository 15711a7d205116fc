//! Symbol table construction and scope analysis.
//!
//! The builder walks the tree once, recording for every scope the names it
//! binds, uses and declares. Analysis then resolves each name to one of the
//! [`SymbolScope`] classes, working out which locals must become cells
//! because a nested scope reads them.
//!
//! Class bodies are special: their bindings are invisible to nested
//! functions, and a method that uses `super` or `__class__` makes the class
//! create an implicit `__class__` cell.
//!
//! An assignment expression inside a comprehension binds its name in the
//! nearest enclosing function or module, not in the comprehension itself.

use bitflags::bitflags;
use pydiff_core::{CompileError, Span};
use pydiff_parser::ast::{
    Arguments, ComprehensionExpr, ComprehensionKind, Expr, FStringPart, Ident, JoinedStrExpr,
    Module, NamedExpr, ScopeId, Stmt,
};
use rustc_hash::{FxHashMap, FxHashSet};

type NameSet = FxHashSet<String>;

/// Deepest expression nesting walked before giving up.
const MAX_EXPR_DEPTH: u32 = 300;

bitflags! {
    /// How a name is used within one scope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SymbolFlags: u16 {
        /// Declared `global`.
        const GLOBAL = 0x001;
        /// Assigned, deleted or otherwise bound.
        const LOCAL = 0x002;
        /// A parameter.
        const PARAM = 0x004;
        /// Declared `nonlocal`.
        const NONLOCAL = 0x008;
        /// Read.
        const USE = 0x010;
        /// Free in a method but bound in the class body.
        const FREE_CLASS = 0x020;
        /// Bound by an import.
        const IMPORT = 0x040;
        /// Annotated.
        const ANNOT = 0x080;
        /// Bound as the target of a comprehension `for` clause.
        const COMP_ITER = 0x100;

        const BOUND = Self::LOCAL.bits() | Self::PARAM.bits() | Self::IMPORT.bits();
    }
}

/// Resolved storage class of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Local to the scope.
    Local,
    /// Declared `global`.
    GlobalExplicit,
    /// Not bound anywhere visible; looked up as a global.
    GlobalImplicit,
    /// Bound in an enclosing function scope.
    Free,
    /// Local, but also read by a nested scope.
    Cell,
}

/// The kind of block a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeKind {
    #[default]
    Module,
    Class,
    Function,
    Lambda,
    Comprehension(ComprehensionKind),
}

impl ScopeKind {
    /// Whether the scope has fast locals and a fresh namespace per call.
    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            ScopeKind::Function | ScopeKind::Lambda | ScopeKind::Comprehension(_)
        )
    }
}

/// A name recorded in one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub flags: SymbolFlags,
    pub scope: SymbolScope,
    /// Where the name was first seen, or its `nonlocal` declaration.
    pub span: Span,
}

/// Symbols and properties of one scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Symbols in first-seen order.
    symbols: Vec<Symbol>,
    index: FxHashMap<String, usize>,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    /// Directly nested scopes in source order.
    pub children: Vec<ScopeId>,
    /// Inside a function, directly or through other scopes.
    pub nested: bool,
    /// Contains `yield` or is a generator expression.
    pub generator: bool,
    /// Declared with `async def`.
    pub is_async: bool,
    /// An `async def`, or contains `await` or an `async for` clause.
    pub coroutine: bool,
    pub varargs: bool,
    pub varkeywords: bool,
    /// A method uses `__class__`, so the class body creates the cell.
    pub needs_class_closure: bool,
    /// First `yield` seen directly in this scope.
    yield_span: Option<Span>,
    /// Nesting of comprehension iterables being visited in this scope.
    comp_iter_expr: u32,
}

impl Scope {
    fn new(kind: ScopeKind, nested: bool) -> Self {
        Self {
            kind,
            nested,
            ..Self::default()
        }
    }

    /// Look up a symbol by its (mangled) name.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&i| &self.symbols[i])
    }

    fn symbol_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.index.get(name).map(|&i| &mut self.symbols[i])
    }

    /// Resolved scope of a name, if the scope knows it.
    pub fn lookup(&self, name: &str) -> Option<SymbolScope> {
        self.symbol(name).map(|symbol| symbol.scope)
    }

    /// All symbols in first-seen order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Names stored in cells, sorted.
    pub fn cellvars(&self) -> Vec<String> {
        let mut cells: Vec<String> = self
            .symbols
            .iter()
            .filter(|s| s.scope == SymbolScope::Cell)
            .map(|s| s.name.clone())
            .collect();
        if self.needs_class_closure {
            cells.push("__class__".to_string());
        }
        cells.sort();
        cells
    }

    /// Names captured from enclosing scopes, sorted.
    pub fn freevars(&self) -> Vec<String> {
        let mut free: Vec<String> = self
            .symbols
            .iter()
            .filter(|s| s.scope == SymbolScope::Free || s.flags.contains(SymbolFlags::FREE_CLASS))
            .map(|s| s.name.clone())
            .collect();
        free.sort();
        free
    }

    fn add(&mut self, name: String, flags: SymbolFlags, span: Span) {
        self.index.insert(name.clone(), self.symbols.len());
        self.symbols.push(Symbol {
            name,
            flags,
            scope: SymbolScope::GlobalImplicit,
            span,
        });
    }
}

/// Resolved scopes for a whole module, indexed by [`ScopeId`].
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// Build and analyze the symbol table for a module.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(module: &Module<'_>) -> Result<Self, CompileError> {
        let mut builder = Builder {
            scopes: vec![Scope::default(); module.scope_count as usize],
            stack: Vec::new(),
            private: None,
            comp_iter_target: false,
            depth: 0,
        };
        builder.enter(ScopeId::MODULE, ScopeKind::Module);
        builder.visit_body(module.body)?;
        builder.exit();

        let mut scopes = builder.scopes;
        let mut free = NameSet::default();
        let mut global = NameSet::default();
        analyze_block(&mut scopes, ScopeId::MODULE, None, &mut free, &mut global)?;
        Ok(Self { scopes })
    }

    /// The scope with the given id.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }
}

/// Apply private name mangling: `__spam` in class `Ham` becomes `_Ham__spam`.
pub fn mangle(private: Option<&str>, name: &str) -> String {
    let Some(private) = private else {
        return name.to_string();
    };
    if !name.starts_with("__") || name.ends_with("__") || name.contains('.') {
        return name.to_string();
    }
    let class = private.trim_start_matches('_');
    if class.is_empty() {
        return name.to_string();
    }
    format!("_{class}{name}")
}

// ============================================================================
// Construction
// ============================================================================

struct Builder {
    scopes: Vec<Scope>,
    /// Scopes being visited, innermost last
    stack: Vec<ScopeId>,
    /// Enclosing class name for mangling
    private: Option<String>,
    /// Visiting the target of a comprehension `for` clause
    comp_iter_target: bool,
    /// Current expression nesting
    depth: u32,
}

impl Builder {
    fn enter(&mut self, id: ScopeId, kind: ScopeKind) {
        let nested = self.stack.last().is_some_and(|&parent| {
            let parent = &self.scopes[parent.index()];
            parent.nested || parent.kind.is_function_like()
        });
        if let Some(&parent) = self.stack.last() {
            self.scopes[parent.index()].children.push(id);
        }
        self.scopes[id.index()] = Scope::new(kind, nested);
        self.stack.push(id);
    }

    fn exit(&mut self) {
        self.stack.pop();
    }

    fn current(&mut self) -> &mut Scope {
        let id = self.stack.last().copied().unwrap_or(ScopeId::MODULE);
        &mut self.scopes[id.index()]
    }

    fn current_kind(&self) -> ScopeKind {
        let id = self.stack.last().copied().unwrap_or(ScopeId::MODULE);
        self.scopes[id.index()].kind
    }

    fn flags_of(&mut self, name: &str) -> SymbolFlags {
        let mangled = mangle(self.private.as_deref(), name);
        self.current()
            .symbol(&mangled)
            .map(|s| s.flags)
            .unwrap_or_default()
    }

    fn add_def(&mut self, name: &str, flag: SymbolFlags, span: Span) -> Result<(), CompileError> {
        let id = self.stack.last().copied().unwrap_or(ScopeId::MODULE);
        self.add_def_in(id, name, flag, span)
    }

    fn add_def_in(
        &mut self,
        id: ScopeId,
        name: &str,
        flag: SymbolFlags,
        span: Span,
    ) -> Result<(), CompileError> {
        let mangled = mangle(self.private.as_deref(), name);
        let flag = if self.comp_iter_target && flag.contains(SymbolFlags::LOCAL) {
            flag | SymbolFlags::COMP_ITER
        } else {
            flag
        };
        let scope = &mut self.scopes[id.index()];
        match scope.symbol_mut(&mangled) {
            Some(symbol) => {
                if flag.contains(SymbolFlags::PARAM) && symbol.flags.contains(SymbolFlags::PARAM) {
                    return Err(CompileError::DuplicateArgument {
                        name: name.to_string(),
                        span,
                    });
                }
                symbol.flags |= flag;
                if flag.contains(SymbolFlags::NONLOCAL) {
                    symbol.span = span;
                }
            }
            None => scope.add(mangled.clone(), flag, span),
        }

        if flag.contains(SymbolFlags::PARAM) {
            scope.params.push(mangled);
        } else if flag.contains(SymbolFlags::GLOBAL) {
            // Global declarations are visible in the module's own table.
            let module = &mut self.scopes[ScopeId::MODULE.index()];
            match module.symbol_mut(&mangled) {
                Some(symbol) => symbol.flags |= flag,
                None => module.add(mangled, flag, span),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn visit_body(&mut self, body: &[Stmt<'_>]) -> Result<(), CompileError> {
        body.iter().try_for_each(|stmt| self.visit_stmt(stmt))
    }

    fn visit_stmt(&mut self, stmt: &Stmt<'_>) -> Result<(), CompileError> {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.add_def(def.name.name, SymbolFlags::LOCAL, def.name.span)?;
                self.visit_defaults(def.args)?;
                self.visit_annotations(def.args, def.returns)?;
                self.visit_exprs(def.decorators)?;
                self.enter(def.scope, ScopeKind::Function);
                if def.is_async {
                    let scope = self.current();
                    scope.is_async = true;
                    scope.coroutine = true;
                }
                self.visit_params(def.args)?;
                self.visit_body(def.body)?;
                self.exit();
            }
            Stmt::ClassDef(class) => {
                self.add_def(class.name.name, SymbolFlags::LOCAL, class.name.span)?;
                self.visit_exprs(class.bases)?;
                for keyword in class.keywords {
                    self.visit_expr(keyword.value)?;
                }
                self.visit_exprs(class.decorators)?;
                self.enter(class.scope, ScopeKind::Class);
                let outer = self.private.replace(class.name.name.to_string());
                self.visit_body(class.body)?;
                self.private = outer;
                self.exit();
            }
            Stmt::Return(ret) => {
                if let Some(value) = ret.value {
                    self.visit_expr(value)?;
                }
            }
            Stmt::Delete(del) => {
                for target in del.targets {
                    self.visit_target(target)?;
                }
            }
            Stmt::Assign(assign) => {
                for target in assign.targets {
                    self.visit_target(target)?;
                }
                self.visit_expr(assign.value)?;
            }
            Stmt::AnnAssign(ann) => {
                if let Expr::Name(name) = ann.target {
                    let current = self.flags_of(name.name);
                    let declared = current.intersection(SymbolFlags::GLOBAL | SymbolFlags::NONLOCAL);
                    if !declared.is_empty() && self.current_kind() != ScopeKind::Module && ann.simple {
                        return Err(CompileError::AnnotatedNameConflict {
                            name: name.name.to_string(),
                            declaration: if declared.contains(SymbolFlags::GLOBAL) {
                                "global"
                            } else {
                                "nonlocal"
                            },
                            span: name.span,
                        });
                    }
                    if ann.simple {
                        self.add_def(name.name, SymbolFlags::ANNOT | SymbolFlags::LOCAL, name.span)?;
                    } else if ann.value.is_some() {
                        self.add_def(name.name, SymbolFlags::LOCAL, name.span)?;
                    }
                } else {
                    self.visit_target(ann.target)?;
                }
                self.visit_expr(ann.annotation)?;
                if let Some(value) = ann.value {
                    self.visit_expr(value)?;
                }
            }
            Stmt::AugAssign(aug) => {
                self.visit_target(aug.target)?;
                self.visit_expr(aug.value)?;
            }
            Stmt::For(stmt) => {
                self.visit_target(stmt.target)?;
                self.visit_expr(stmt.iter)?;
                self.visit_body(stmt.body)?;
                self.visit_body(stmt.orelse)?;
            }
            Stmt::While(stmt) => {
                self.visit_expr(stmt.test)?;
                self.visit_body(stmt.body)?;
                self.visit_body(stmt.orelse)?;
            }
            Stmt::If(stmt) => {
                self.visit_expr(stmt.test)?;
                self.visit_body(stmt.body)?;
                self.visit_body(stmt.orelse)?;
            }
            Stmt::Raise(raise) => {
                if let Some(exc) = raise.exc {
                    self.visit_expr(exc)?;
                    if let Some(cause) = raise.cause {
                        self.visit_expr(cause)?;
                    }
                }
            }
            Stmt::Try(stmt) => {
                self.visit_body(stmt.body)?;
                self.visit_body(stmt.orelse)?;
                for handler in stmt.handlers {
                    if let Some(typ) = handler.typ {
                        self.visit_expr(typ)?;
                    }
                    if let Some(name) = handler.name {
                        self.add_def(name.name, SymbolFlags::LOCAL, name.span)?;
                    }
                    self.visit_body(handler.body)?;
                }
                self.visit_body(stmt.finalbody)?;
            }
            Stmt::Assert(stmt) => {
                self.visit_expr(stmt.test)?;
                if let Some(msg) = stmt.msg {
                    self.visit_expr(msg)?;
                }
            }
            Stmt::Import(import) => {
                for alias in import.names {
                    let bound = match alias.asname {
                        Some(asname) => asname.name,
                        None => alias.name.name.split('.').next().unwrap_or(alias.name.name),
                    };
                    self.add_def(bound, SymbolFlags::IMPORT, alias.name.span)?;
                }
            }
            Stmt::ImportFrom(import) => {
                for alias in import.names {
                    if alias.name.name == "*" {
                        if self.current_kind() != ScopeKind::Module {
                            return Err(CompileError::ImportStarNotAtModuleLevel { span: import.span });
                        }
                        continue;
                    }
                    let bound = alias.asname.unwrap_or(alias.name);
                    self.add_def(bound.name, SymbolFlags::IMPORT, bound.span)?;
                }
            }
            Stmt::Global(names) => {
                for name in names.names {
                    self.check_declaration(name.name, name.span, "global")?;
                    self.add_def(name.name, SymbolFlags::GLOBAL, name.span)?;
                }
            }
            Stmt::Nonlocal(names) => {
                for name in names.names {
                    self.check_declaration(name.name, name.span, "nonlocal")?;
                    self.add_def(name.name, SymbolFlags::NONLOCAL, names.span)?;
                }
            }
            Stmt::Expr(stmt) => self.visit_expr(stmt.value)?,
            Stmt::With(stmt) => {
                for item in stmt.items {
                    self.visit_expr(item.context_expr)?;
                    if let Some(target) = item.target {
                        self.visit_target(target)?;
                    }
                }
                self.visit_body(stmt.body)?;
            }
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
        Ok(())
    }

    /// Reject `global`/`nonlocal` for a name the scope already uses.
    fn check_declaration(
        &mut self,
        name: &str,
        span: Span,
        declaration: &'static str,
    ) -> Result<(), CompileError> {
        let current = self.flags_of(name);
        let global = declaration == "global";
        let detail = if current.contains(SymbolFlags::PARAM) {
            if global { "parameter and global" } else { "parameter and nonlocal" }
        } else if current.contains(SymbolFlags::USE) {
            if global {
                "used prior to global declaration"
            } else {
                "used prior to nonlocal declaration"
            }
        } else if current.contains(SymbolFlags::ANNOT) {
            return Err(CompileError::AnnotatedNameConflict {
                name: name.to_string(),
                declaration,
                span,
            });
        } else if current.contains(SymbolFlags::LOCAL) {
            if global {
                "assigned to before global declaration"
            } else {
                "assigned to before nonlocal declaration"
            }
        } else {
            return Ok(());
        };
        Err(CompileError::ConflictingDeclaration {
            name: name.to_string(),
            detail,
            span,
        })
    }

    fn visit_defaults(&mut self, args: &Arguments<'_>) -> Result<(), CompileError> {
        for param in args.positional().chain(args.kwonly) {
            if let Some(default) = param.default {
                self.visit_expr(default)?;
            }
        }
        Ok(())
    }

    fn visit_annotations(
        &mut self,
        args: &Arguments<'_>,
        returns: Option<&Expr<'_>>,
    ) -> Result<(), CompileError> {
        for param in args.all() {
            if let Some(annotation) = param.annotation {
                self.visit_expr(annotation)?;
            }
        }
        if let Some(returns) = returns {
            self.visit_expr(returns)?;
        }
        Ok(())
    }

    fn visit_params(&mut self, args: &Arguments<'_>) -> Result<(), CompileError> {
        for param in args.posonly.iter().chain(args.args).chain(args.kwonly) {
            self.add_def(param.name.name, SymbolFlags::PARAM, param.name.span)?;
        }
        if let Some(vararg) = &args.vararg {
            self.add_def(vararg.name.name, SymbolFlags::PARAM, vararg.name.span)?;
            self.current().varargs = true;
        }
        if let Some(kwarg) = &args.kwarg {
            self.add_def(kwarg.name.name, SymbolFlags::PARAM, kwarg.name.span)?;
            self.current().varkeywords = true;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn visit_exprs(&mut self, exprs: &[Expr<'_>]) -> Result<(), CompileError> {
        exprs.iter().try_for_each(|expr| self.visit_expr(expr))
    }

    /// Visit an assignment or deletion target.
    fn visit_target(&mut self, target: &Expr<'_>) -> Result<(), CompileError> {
        match target {
            Expr::Name(name) => self.add_def(name.name, SymbolFlags::LOCAL, name.span),
            Expr::Tuple(seq) | Expr::List(seq) => {
                seq.elements.iter().try_for_each(|e| self.visit_target(e))
            }
            Expr::Starred(starred) => self.visit_target(starred.value),
            Expr::Attribute(attr) => self.visit_expr(attr.value),
            Expr::Subscript(sub) => {
                self.visit_expr(sub.value)?;
                self.visit_expr(sub.index)
            }
            other => self.visit_expr(other),
        }
    }

    fn visit_expr(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(CompileError::TooDeeplyNested { span: expr.span() });
        }
        self.depth += 1;
        let result = self.visit_expr_kind(expr);
        self.depth -= 1;
        result
    }

    fn visit_expr_kind(&mut self, expr: &Expr<'_>) -> Result<(), CompileError> {
        match expr {
            Expr::Constant(_) => Ok(()),
            Expr::Name(name) => {
                self.add_def(name.name, SymbolFlags::USE, name.span)?;
                if name.name == "super" && self.current_kind().is_function_like() {
                    self.add_def("__class__", SymbolFlags::USE, name.span)?;
                }
                Ok(())
            }
            Expr::JoinedStr(joined) => self.visit_joined(joined),
            Expr::BoolOp(op) => self.visit_exprs(op.values),
            Expr::Binary(bin) => {
                self.visit_expr(bin.left)?;
                self.visit_expr(bin.right)
            }
            Expr::Unary(unary) => self.visit_expr(unary.operand),
            Expr::Compare(cmp) => {
                self.visit_expr(cmp.left)?;
                self.visit_exprs(cmp.comparators)
            }
            Expr::Lambda(lambda) => {
                self.visit_defaults(lambda.args)?;
                self.enter(lambda.scope, ScopeKind::Lambda);
                self.visit_params(lambda.args)?;
                self.visit_expr(lambda.body)?;
                self.exit();
                Ok(())
            }
            Expr::IfExp(ifexp) => {
                self.visit_expr(ifexp.test)?;
                self.visit_expr(ifexp.body)?;
                self.visit_expr(ifexp.orelse)
            }
            Expr::Dict(dict) => {
                for entry in dict.entries {
                    if let Some(key) = entry.key {
                        self.visit_expr(key)?;
                    }
                }
                for entry in dict.entries {
                    self.visit_expr(entry.value)?;
                }
                Ok(())
            }
            Expr::Set(seq) | Expr::List(seq) | Expr::Tuple(seq) => self.visit_exprs(seq.elements),
            Expr::Comprehension(comp) => self.visit_comprehension(comp),
            Expr::Yield(y) | Expr::YieldFrom(y) => {
                if let Some(value) = y.value {
                    self.visit_expr(value)?;
                }
                let scope = self.current();
                scope.generator = true;
                scope.yield_span.get_or_insert(y.span);
                Ok(())
            }
            Expr::Call(call) => {
                self.visit_expr(call.func)?;
                self.visit_exprs(call.args)?;
                for keyword in call.keywords {
                    self.visit_expr(keyword.value)?;
                }
                Ok(())
            }
            Expr::Attribute(attr) => self.visit_expr(attr.value),
            Expr::Subscript(sub) => {
                self.visit_expr(sub.value)?;
                self.visit_expr(sub.index)
            }
            Expr::Slice(slice) => {
                for part in [slice.lower, slice.upper, slice.step].into_iter().flatten() {
                    self.visit_expr(part)?;
                }
                Ok(())
            }
            Expr::Starred(starred) => self.visit_expr(starred.value),
            Expr::Await(await_expr) => {
                self.visit_expr(await_expr.value)?;
                self.current().coroutine = true;
                Ok(())
            }
            Expr::NamedExpr(named) => self.visit_named(named),
        }
    }

    fn visit_named(&mut self, named: &NamedExpr<'_>) -> Result<(), CompileError> {
        if self.current().comp_iter_expr > 0 {
            return Err(CompileError::NamedExprInComprehensionIterable { span: named.span });
        }
        if matches!(self.current_kind(), ScopeKind::Comprehension(_)) {
            self.bind_named_outside(named.target)?;
        }
        self.visit_expr(named.value)?;
        self.add_def(named.target.name, SymbolFlags::LOCAL, named.target.span)
    }

    /// Declare the target of `:=` in a comprehension as belonging to the
    /// nearest enclosing function (nonlocal) or module (global).
    fn bind_named_outside(&mut self, target: Ident<'_>) -> Result<(), CompileError> {
        let mangled = mangle(self.private.as_deref(), target.name);
        for index in (0..self.stack.len()).rev() {
            let id = self.stack[index];
            let scope = &self.scopes[id.index()];
            let flags = scope.symbol(&mangled).map(|s| s.flags).unwrap_or_default();
            match scope.kind {
                ScopeKind::Comprehension(_) => {
                    if flags.contains(SymbolFlags::COMP_ITER) {
                        return Err(CompileError::NamedExprRebindsIterationVariable {
                            name: target.name.to_string(),
                            span: target.span,
                        });
                    }
                }
                ScopeKind::Function | ScopeKind::Lambda => {
                    let declaration = if flags.contains(SymbolFlags::GLOBAL) {
                        SymbolFlags::GLOBAL
                    } else {
                        SymbolFlags::NONLOCAL
                    };
                    self.add_def(target.name, declaration, target.span)?;
                    return self.add_def_in(id, target.name, SymbolFlags::LOCAL, target.span);
                }
                ScopeKind::Module => {
                    return self.add_def(target.name, SymbolFlags::GLOBAL, target.span);
                }
                ScopeKind::Class => {
                    return Err(CompileError::NamedExprInClassComprehension { span: target.span });
                }
            }
        }
        Ok(())
    }

    /// Visit a comprehension iterable, where `:=` is not allowed.
    fn visit_comp_iter(&mut self, iter: &Expr<'_>) -> Result<(), CompileError> {
        self.current().comp_iter_expr += 1;
        let result = self.visit_expr(iter);
        self.current().comp_iter_expr -= 1;
        result
    }

    fn visit_comp_target(&mut self, target: &Expr<'_>) -> Result<(), CompileError> {
        self.comp_iter_target = true;
        let result = self.visit_target(target);
        self.comp_iter_target = false;
        result
    }

    fn visit_joined(&mut self, joined: &JoinedStrExpr<'_>) -> Result<(), CompileError> {
        for part in joined.values {
            if let FStringPart::Formatted(formatted) = part {
                self.visit_expr(formatted.value)?;
                if let Some(spec) = formatted.format_spec {
                    self.visit_joined(spec)?;
                }
            }
        }
        Ok(())
    }

    fn visit_comprehension(&mut self, comp: &ComprehensionExpr<'_>) -> Result<(), CompileError> {
        let Some((outermost, rest)) = comp.generators.split_first() else {
            return Ok(());
        };

        // The outermost iterable is evaluated in the enclosing scope.
        self.visit_comp_iter(outermost.iter)?;

        self.enter(comp.scope, ScopeKind::Comprehension(comp.kind));
        if comp.generators.iter().any(|generator| generator.is_async) {
            self.current().coroutine = true;
        }
        self.add_def(".0", SymbolFlags::PARAM, comp.span)?;
        self.visit_comp_target(outermost.target)?;
        self.visit_exprs(outermost.ifs)?;
        for generator in rest {
            self.visit_comp_target(generator.target)?;
            self.visit_comp_iter(generator.iter)?;
            self.visit_exprs(generator.ifs)?;
        }
        if let Some(value) = comp.value {
            self.visit_expr(value)?;
        }
        self.visit_expr(comp.element)?;

        let scope = self.current();
        if let Some(span) = scope.yield_span {
            return Err(CompileError::YieldInComprehension {
                kind: comp.kind.describe(),
                span,
            });
        }
        if comp.kind == ComprehensionKind::Generator {
            scope.generator = true;
        }
        self.exit();
        Ok(())
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Resolve every name in `id` and its children.
///
/// `bound` holds names bound in enclosing function scopes (absent at module
/// level), `global` names known to be global. Names this block needs from
/// outside are added to `free`.
fn analyze_block(
    scopes: &mut [Scope],
    id: ScopeId,
    mut bound: Option<&mut NameSet>,
    free: &mut NameSet,
    global: &mut NameSet,
) -> Result<(), CompileError> {
    let kind = scopes[id.index()].kind;
    let mut local = NameSet::default();
    let mut resolved: FxHashMap<String, SymbolScope> = FxHashMap::default();
    let mut newglobal = NameSet::default();
    let mut newfree = NameSet::default();
    let mut newbound = NameSet::default();

    // A class namespace is invisible to nested functions, so children see
    // what the class itself saw.
    if kind == ScopeKind::Class {
        newglobal.extend(global.iter().cloned());
        if let Some(bound) = bound.as_deref() {
            newbound.extend(bound.iter().cloned());
        }
    }

    for symbol in &scopes[id.index()].symbols {
        let scope = analyze_name(symbol, bound.as_deref_mut(), &mut local, free, global)?;
        resolved.insert(symbol.name.clone(), scope);
    }

    if kind == ScopeKind::Class {
        newbound.insert("__class__".to_string());
    } else {
        if kind.is_function_like() {
            newbound.extend(local.iter().cloned());
        }
        if let Some(bound) = bound.as_deref() {
            newbound.extend(bound.iter().cloned());
        }
        newglobal.extend(global.iter().cloned());
    }

    let children = scopes[id.index()].children.clone();
    for child in children {
        let mut child_bound = newbound.clone();
        let mut child_global = newglobal.clone();
        let mut child_free = NameSet::default();
        analyze_block(
            scopes,
            child,
            Some(&mut child_bound),
            &mut child_free,
            &mut child_global,
        )?;
        newfree.extend(child_free);
    }

    let scope = &mut scopes[id.index()];
    if kind.is_function_like() {
        // Locals read by children become cells.
        for (name, resolution) in resolved.iter_mut() {
            if *resolution == SymbolScope::Local && newfree.remove(name) {
                *resolution = SymbolScope::Cell;
            }
        }
    } else if kind == ScopeKind::Class && newfree.remove("__class__") {
        scope.needs_class_closure = true;
    }

    update_symbols(scope, &resolved, bound.as_deref(), &newfree, kind == ScopeKind::Class);
    free.extend(newfree);
    Ok(())
}

fn analyze_name(
    symbol: &Symbol,
    bound: Option<&mut NameSet>,
    local: &mut NameSet,
    free: &mut NameSet,
    global: &mut NameSet,
) -> Result<SymbolScope, CompileError> {
    let name = &symbol.name;
    let flags = symbol.flags;

    if flags.contains(SymbolFlags::GLOBAL) {
        if flags.contains(SymbolFlags::NONLOCAL) {
            return Err(CompileError::ConflictingDeclaration {
                name: name.clone(),
                detail: "nonlocal and global",
                span: symbol.span,
            });
        }
        global.insert(name.clone());
        if let Some(bound) = bound {
            bound.remove(name);
        }
        return Ok(SymbolScope::GlobalExplicit);
    }

    if flags.contains(SymbolFlags::NONLOCAL) {
        let Some(bound) = bound else {
            return Err(CompileError::NonlocalAtModuleLevel { span: symbol.span });
        };
        if !bound.contains(name) {
            return Err(CompileError::NoBindingForNonlocal {
                name: name.clone(),
                span: symbol.span,
            });
        }
        free.insert(name.clone());
        return Ok(SymbolScope::Free);
    }

    if flags.intersects(SymbolFlags::BOUND) {
        local.insert(name.clone());
        global.remove(name);
        return Ok(SymbolScope::Local);
    }

    if bound.is_some_and(|bound| bound.contains(name)) {
        free.insert(name.clone());
        return Ok(SymbolScope::Free);
    }

    Ok(SymbolScope::GlobalImplicit)
}

/// Store resolutions and add free names that pass through this scope.
fn update_symbols(
    scope: &mut Scope,
    resolved: &FxHashMap<String, SymbolScope>,
    bound: Option<&NameSet>,
    free: &NameSet,
    is_class: bool,
) {
    for symbol in &mut scope.symbols {
        if let Some(&resolution) = resolved.get(&symbol.name) {
            symbol.scope = resolution;
        }
    }

    let mut passing: Vec<&String> = free.iter().collect();
    passing.sort();
    for name in passing {
        if let Some(symbol) = scope.symbol_mut(name) {
            // A method's free name that the class body also binds.
            if is_class && symbol.flags.intersects(SymbolFlags::BOUND | SymbolFlags::GLOBAL) {
                symbol.flags |= SymbolFlags::FREE_CLASS;
            }
            continue;
        }
        if bound.is_some_and(|bound| !bound.contains(name)) {
            continue;
        }
        let span = Span::default();
        scope.add(name.clone(), SymbolFlags::empty(), span);
        if let Some(symbol) = scope.symbol_mut(name) {
            symbol.scope = SymbolScope::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use pydiff_parser::Parser;

    fn build(source: &str) -> Result<SymbolTable, CompileError> {
        let arena = Bump::new();
        let module = Parser::parse(source, &arena).unwrap();
        SymbolTable::build(&module)
    }

    #[test]
    fn module_names_are_implicit_globals_or_locals() {
        let table = build("x = 1\nprint(x)\n").unwrap();
        let module = table.scope(ScopeId::MODULE);
        assert_eq!(module.lookup("x"), Some(SymbolScope::Local));
        assert_eq!(module.lookup("print"), Some(SymbolScope::GlobalImplicit));
    }

    #[test]
    fn function_params_and_locals() {
        let table = build("def f(a, b=1, *args, c, **kw):\n    d = a\n").unwrap();
        let f = table.scope(ScopeId(1));
        assert_eq!(f.kind, ScopeKind::Function);
        assert_eq!(f.params, vec!["a", "b", "c", "args", "kw"]);
        assert!(f.varargs && f.varkeywords);
        assert_eq!(f.lookup("d"), Some(SymbolScope::Local));
        assert!(!f.nested);
    }

    #[test]
    fn closures_create_cells_and_free_vars() {
        let table = build("def outer():\n    x = 1\n    def inner():\n        return x\n").unwrap();
        let outer = table.scope(ScopeId(1));
        let inner = table.scope(ScopeId(2));
        assert_eq!(outer.lookup("x"), Some(SymbolScope::Cell));
        assert_eq!(outer.cellvars(), vec!["x"]);
        assert_eq!(inner.lookup("x"), Some(SymbolScope::Free));
        assert_eq!(inner.freevars(), vec!["x"]);
        assert!(inner.nested);
    }

    #[test]
    fn free_names_pass_through_intermediate_scopes() {
        let source = "def a():\n    v = 1\n    def b():\n        def c():\n            return v\n";
        let table = build(source).unwrap();
        assert_eq!(table.scope(ScopeId(2)).freevars(), vec!["v"]);
        assert_eq!(table.scope(ScopeId(3)).freevars(), vec!["v"]);
    }

    #[test]
    fn class_bindings_are_invisible_to_methods() {
        let table = build("class C:\n    x = 1\n    def m(self):\n        return x\n").unwrap();
        let method = table.scope(ScopeId(2));
        assert_eq!(method.lookup("x"), Some(SymbolScope::GlobalImplicit));
        assert!(method.freevars().is_empty());
    }

    #[test]
    fn super_creates_class_cell() {
        let table = build("class C:\n    def m(self):\n        return super().m()\n").unwrap();
        let class = table.scope(ScopeId(1));
        let method = table.scope(ScopeId(2));
        assert!(class.needs_class_closure);
        assert_eq!(class.cellvars(), vec!["__class__"]);
        assert_eq!(method.freevars(), vec!["__class__"]);
    }

    #[test]
    fn class_binding_shadowing_outer_free_name() {
        let source = "def f():\n    x = 1\n    class C:\n        x = 2\n        def m(self):\n            return x\n";
        let table = build(source).unwrap();
        let class = table.scope(ScopeId(2));
        assert_eq!(class.lookup("x"), Some(SymbolScope::Local));
        assert!(class.symbol("x").unwrap().flags.contains(SymbolFlags::FREE_CLASS));
        assert_eq!(class.freevars(), vec!["x"]);
    }

    #[test]
    fn global_declarations() {
        let table = build("def f():\n    global g\n    g = 1\n").unwrap();
        assert_eq!(table.scope(ScopeId(1)).lookup("g"), Some(SymbolScope::GlobalExplicit));
        assert_eq!(table.scope(ScopeId::MODULE).lookup("g"), Some(SymbolScope::GlobalExplicit));
    }

    #[test]
    fn nonlocal_binds_to_enclosing_function() {
        let table = build("def f():\n    x = 0\n    def g():\n        nonlocal x\n        x += 1\n").unwrap();
        assert_eq!(table.scope(ScopeId(1)).lookup("x"), Some(SymbolScope::Cell));
        assert_eq!(table.scope(ScopeId(2)).lookup("x"), Some(SymbolScope::Free));
    }

    #[test]
    fn nonlocal_errors() {
        assert!(matches!(
            build("nonlocal x\n"),
            Err(CompileError::NonlocalAtModuleLevel { .. })
        ));
        assert!(matches!(
            build("def f():\n    nonlocal x\n"),
            Err(CompileError::NoBindingForNonlocal { .. })
        ));
    }

    #[test]
    fn declaration_conflicts() {
        let error = build("def f(a):\n    global a\n").unwrap_err();
        assert_eq!(error.to_string(), "name 'a' is parameter and global at 2:12");

        let error = build("def f():\n    x = 1\n    global x\n").unwrap_err();
        assert!(error.to_string().contains("assigned to before global declaration"));

        let error = build("def f():\n    print(x)\n    nonlocal x\n").unwrap_err();
        assert!(error.to_string().contains("used prior to nonlocal declaration"));

        let error = build("def f():\n    global x\n    x: int = 1\n").unwrap_err();
        assert!(matches!(error, CompileError::AnnotatedNameConflict { declaration: "global", .. }));
    }

    #[test]
    fn duplicate_argument() {
        let error = build("def f(a, a):\n    pass\n").unwrap_err();
        assert!(matches!(error, CompileError::DuplicateArgument { ref name, .. } if name == "a"));
        assert!(build("lambda x, *x: 0\n").is_err());
    }

    #[test]
    fn import_star_only_at_module_level() {
        assert!(build("from os import *\n").is_ok());
        assert!(matches!(
            build("def f():\n    from os import *\n"),
            Err(CompileError::ImportStarNotAtModuleLevel { .. })
        ));
    }

    #[test]
    fn imports_bind_first_component_or_alias() {
        let table = build("import os.path\nimport a.b as c\nfrom x import y as z\n").unwrap();
        let module = table.scope(ScopeId::MODULE);
        assert_eq!(module.lookup("os"), Some(SymbolScope::Local));
        assert_eq!(module.lookup("c"), Some(SymbolScope::Local));
        assert_eq!(module.lookup("z"), Some(SymbolScope::Local));
        assert_eq!(module.lookup("a"), None);
    }

    #[test]
    fn comprehension_scope() {
        let table = build("def f(n):\n    return [i * n for i in range(n)]\n").unwrap();
        let comp = table.scope(ScopeId(2));
        assert_eq!(comp.kind, ScopeKind::Comprehension(ComprehensionKind::List));
        assert_eq!(comp.params, vec![".0"]);
        assert_eq!(comp.lookup("i"), Some(SymbolScope::Local));
        assert_eq!(comp.lookup("n"), Some(SymbolScope::Free));
        // The outermost iterable is evaluated in the function.
        assert_eq!(comp.lookup("range"), None);
        assert_eq!(table.scope(ScopeId(1)).lookup("n"), Some(SymbolScope::Cell));
    }

    #[test]
    fn generators() {
        let table = build("def g():\n    yield 1\nx = (i for i in y)\n").unwrap();
        assert!(table.scope(ScopeId(1)).generator);
        assert!(table.scope(ScopeId(2)).generator);
        assert!(!table.scope(ScopeId::MODULE).generator);
    }

    #[test]
    fn yield_inside_comprehension() {
        let error = build("def f():\n    return [(yield x) for x in y]\n").unwrap_err();
        assert_eq!(
            error.to_string(),
            "'yield' inside list comprehension at 2:14"
        );
    }

    #[test]
    fn named_expression_in_comprehension_binds_in_function() {
        let table = build("def f(z):\n    [y := x for x in z]\n    return y\n").unwrap();
        let f = table.scope(ScopeId(1));
        let comp = table.scope(ScopeId(2));
        assert_eq!(f.lookup("y"), Some(SymbolScope::Cell));
        assert_eq!(comp.lookup("y"), Some(SymbolScope::Free));
        assert_eq!(comp.lookup("x"), Some(SymbolScope::Local));
        assert!(comp.symbol("x").unwrap().flags.contains(SymbolFlags::COMP_ITER));
    }

    #[test]
    fn named_expression_in_module_comprehension_is_global() {
        let table = build("[y := x for x in z]\nprint(y)\n").unwrap();
        assert_eq!(table.scope(ScopeId::MODULE).lookup("y"), Some(SymbolScope::GlobalExplicit));
        assert_eq!(table.scope(ScopeId(1)).lookup("y"), Some(SymbolScope::GlobalExplicit));
    }

    #[test]
    fn named_expression_outside_comprehension_is_local() {
        let table = build("def f():\n    if (n := g()) > 1:\n        return n\n").unwrap();
        assert_eq!(table.scope(ScopeId(1)).lookup("n"), Some(SymbolScope::Local));
        let table = build("class C:\n    (n := 1)\n").unwrap();
        assert_eq!(table.scope(ScopeId(1)).lookup("n"), Some(SymbolScope::Local));
    }

    #[test]
    fn named_expression_errors() {
        let error = build("class C:\n    [y := x for x in z]\n").unwrap_err();
        assert!(matches!(error, CompileError::NamedExprInClassComprehension { .. }));

        let error = build("[x := 1 for x in z]\n").unwrap_err();
        assert_eq!(
            error.to_string(),
            "assignment expression cannot rebind comprehension iteration variable 'x' at 1:2"
        );
        let error = build("[[y := 1 for a in b] for y in c]\n").unwrap_err();
        assert!(matches!(error, CompileError::NamedExprRebindsIterationVariable { ref name, .. } if name == "y"));

        assert!(matches!(
            build("[x for x in (y := z)]\n"),
            Err(CompileError::NamedExprInComprehensionIterable { .. })
        ));
        assert!(matches!(
            build("[x for a in b for x in (y := a)]\n"),
            Err(CompileError::NamedExprInComprehensionIterable { .. })
        ));
    }

    #[test]
    fn async_scopes() {
        let table = build("async def f():\n    await x\nasync def g():\n    yield 1\n").unwrap();
        let f = table.scope(ScopeId(1));
        assert!(f.is_async && f.coroutine && !f.generator);
        let g = table.scope(ScopeId(2));
        assert!(g.coroutine && g.generator);

        let table = build("def h(y):\n    return (await x for x in y)\n").unwrap();
        assert!(!table.scope(ScopeId(1)).coroutine);
        let genexp = table.scope(ScopeId(2));
        assert!(genexp.coroutine && genexp.generator);

        let table = build("async def f(y):\n    return [x async for x in y]\n").unwrap();
        assert!(table.scope(ScopeId(2)).coroutine);
        assert!(!table.scope(ScopeId(2)).is_async);
    }

    #[test]
    fn long_operator_chain_is_too_deep() {
        let terms = vec!["a"; 400].join(" + ");
        let error = build(&format!("x = {terms}\n")).unwrap_err();
        assert!(matches!(error, CompileError::TooDeeplyNested { .. }));

        let terms = vec!["a"; 100].join(" + ");
        assert!(build(&format!("x = {terms}\n")).is_ok());
    }

    #[test]
    fn private_names_are_mangled() {
        assert_eq!(mangle(Some("Ham"), "__spam"), "_Ham__spam");
        assert_eq!(mangle(Some("_Ham"), "__spam"), "_Ham__spam");
        assert_eq!(mangle(Some("Ham"), "__init__"), "__init__");
        assert_eq!(mangle(Some("___"), "__spam"), "__spam");
        assert_eq!(mangle(None, "__spam"), "__spam");

        let table = build("class C:\n    __x = 1\n    def m(self):\n        return self.__x\n").unwrap();
        assert_eq!(table.scope(ScopeId(1)).lookup("_C__x"), Some(SymbolScope::Local));
    }
}
