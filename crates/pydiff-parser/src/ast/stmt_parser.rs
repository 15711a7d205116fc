//! Statement parsing.
//!
//! Simple statements are separated by `;` and terminated by a newline.
//! Compound statements own indented blocks delimited by `INDENT`/`DEDENT`
//! tokens, or a run of simple statements on the header line.

use super::expr_parser::EXPR_BP;
use super::parser::Parser;
use crate::ast::*;
use crate::lexer::TokenKind;
use pydiff_core::Span;

impl<'ast> Parser<'ast> {
    /// Parse every statement up to the end of input.
    pub(super) fn parse_module(&mut self) -> Result<Module<'ast>, ParseError> {
        let mut body = Vec::new();

        loop {
            while self.eat(TokenKind::Newline).is_some() {}
            if self.is_eof() {
                break;
            }
            self.parse_statement_into(&mut body)?;
        }

        Ok(Module {
            body: self.arena.alloc_slice_copy(&body),
            scope_count: self.next_scope,
        })
    }

    /// Parse one logical line (or one compound statement) into `out`.
    fn parse_statement_into(&mut self, out: &mut Vec<Stmt<'ast>>) -> Result<(), ParseError> {
        let stmt = match self.peek().kind {
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for(None)?,
            TokenKind::Try => self.parse_try()?,
            TokenKind::With => self.parse_with(None)?,
            TokenKind::Def => self.parse_function(&[], None, false)?,
            TokenKind::Class => self.parse_class(&[], None)?,
            TokenKind::At => self.parse_decorated()?,
            TokenKind::Async => self.parse_async()?,
            TokenKind::Indent => return Err(self.unexpected("statement")),
            _ => return self.parse_simple_statements(out),
        };
        out.push(stmt);
        Ok(())
    }

    /// Parse `: block`, either indented on following lines or inline.
    fn parse_block(&mut self) -> Result<&'ast [Stmt<'ast>], ParseError> {
        self.expect(TokenKind::Colon)?;

        let mut body = Vec::new();
        if self.eat(TokenKind::Newline).is_none() {
            self.parse_simple_statements(&mut body)?;
            return Ok(self.arena.alloc_slice_copy(&body));
        }

        if self.eat(TokenKind::Indent).is_none() {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedIndentedBlock,
                self.peek().span,
                "expected an indented block",
            ));
        }

        self.nested(|parser| {
            while !parser.check(TokenKind::Dedent) && !parser.is_eof() {
                parser.parse_statement_into(&mut body)?;
            }
            Ok(())
        })?;
        self.eat(TokenKind::Dedent);

        Ok(self.arena.alloc_slice_copy(&body))
    }

    /// Parse `small_stmt (';' small_stmt)* [';'] NEWLINE`.
    fn parse_simple_statements(&mut self, out: &mut Vec<Stmt<'ast>>) -> Result<(), ParseError> {
        loop {
            out.push(self.parse_small_statement()?);
            if self.eat(TokenKind::Semicolon).is_none() {
                break;
            }
            if self.check(TokenKind::Newline) || self.is_eof() {
                break;
            }
        }

        if self.eat(TokenKind::Newline).is_none() && !self.is_eof() {
            return Err(self.unexpected("newline"));
        }
        Ok(())
    }

    fn parse_small_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let token = *self.peek();
        match token.kind {
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass(token.span))
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break(token.span))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue(token.span))
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::Raise => self.parse_raise(),
            TokenKind::Global | TokenKind::Nonlocal => self.parse_names(),
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_import_from(),
            TokenKind::Del => self.parse_del(),
            TokenKind::Assert => self.parse_assert(),
            _ => self.parse_expr_statement(),
        }
    }

    // ========================================================================
    // Simple statements
    // ========================================================================

    fn parse_return(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Return)?;
        let value = if self.starts_list_item() {
            Some(self.parse_testlist_star_expr()?)
        } else {
            None
        };
        let span = value.map_or(keyword.span, |v| keyword.span.merge(v.span()));
        Ok(Stmt::Return(self.arena.alloc(ReturnStmt { value, span })))
    }

    fn parse_raise(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Raise)?;
        let mut span = keyword.span;

        let mut exc = None;
        let mut cause = None;
        if self.peek().kind.starts_expression() {
            let value = self.parse_test()?;
            span = span.merge(value.span());
            exc = Some(value);

            if self.eat(TokenKind::From).is_some() {
                let value = self.parse_test()?;
                span = span.merge(value.span());
                cause = Some(value);
            }
        }

        Ok(Stmt::Raise(self.arena.alloc(RaiseStmt { exc, cause, span })))
    }

    /// `global a, b` / `nonlocal a, b`
    fn parse_names(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.advance();
        let mut names = vec![self.expect_ident()?];
        while self.eat(TokenKind::Comma).is_some() {
            names.push(self.expect_ident()?);
        }

        let span = keyword.span.merge(names[names.len() - 1].span);
        let stmt = self.arena.alloc(NamesStmt {
            names: self.arena.alloc_slice_copy(&names),
            span,
        });
        Ok(if keyword.kind == TokenKind::Global {
            Stmt::Global(stmt)
        } else {
            Stmt::Nonlocal(stmt)
        })
    }

    fn parse_import(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Import)?;
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let asname = self.parse_as_name()?;
            names.push(Alias { name, asname });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }

        let last = names[names.len() - 1];
        let span = keyword.span.merge(last.asname.unwrap_or(last.name).span);
        Ok(Stmt::Import(self.arena.alloc(ImportStmt {
            names: self.arena.alloc_slice_copy(&names),
            span,
        })))
    }

    fn parse_import_from(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::From)?;

        let mut level = 0;
        loop {
            if self.eat(TokenKind::Dot).is_some() {
                level += 1;
            } else if self.eat(TokenKind::Ellipsis).is_some() {
                level += 3;
            } else {
                break;
            }
        }

        let module = if self.check(TokenKind::Name) {
            Some(self.parse_dotted_name()?.name)
        } else if level == 0 {
            return Err(self.unexpected("module name"));
        } else {
            None
        };

        self.expect(TokenKind::Import)?;

        let mut names = Vec::new();
        let end = if let Some(star) = self.eat(TokenKind::Star) {
            names.push(Alias {
                name: Ident::new("*", star.span),
                asname: None,
            });
            star.span
        } else if self.eat(TokenKind::LeftParen).is_some() {
            loop {
                let name = self.expect_ident()?;
                let asname = self.parse_as_name()?;
                names.push(Alias { name, asname });
                if self.eat(TokenKind::Comma).is_none() || self.check(TokenKind::RightParen) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen)?.span
        } else {
            loop {
                let name = self.expect_ident()?;
                let asname = self.parse_as_name()?;
                names.push(Alias { name, asname });
                let Some(comma) = self.eat(TokenKind::Comma) else {
                    break;
                };
                if !self.check(TokenKind::Name) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        comma.span,
                        "trailing comma not allowed without surrounding parentheses",
                    ));
                }
            }
            let last = names[names.len() - 1];
            last.asname.unwrap_or(last.name).span
        };

        Ok(Stmt::ImportFrom(self.arena.alloc(ImportFromStmt {
            module,
            names: self.arena.alloc_slice_copy(&names),
            level,
            span: keyword.span.merge(end),
        })))
    }

    /// `a.b.c` as a single identifier whose text is the joined path.
    fn parse_dotted_name(&mut self) -> Result<Ident<'ast>, ParseError> {
        let first = self.expect_ident()?;
        if !self.check(TokenKind::Dot) {
            return Ok(first);
        }

        let mut path = String::from(first.name);
        let mut span = first.span;
        while self.eat(TokenKind::Dot).is_some() {
            let part = self.expect_ident()?;
            path.push('.');
            path.push_str(part.name);
            span = span.merge(part.span);
        }
        Ok(Ident::new(self.arena.alloc_str(&path), span))
    }

    fn parse_as_name(&mut self) -> Result<Option<Ident<'ast>>, ParseError> {
        if self.eat(TokenKind::As).is_some() {
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    fn parse_del(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Del)?;
        let mut targets = Vec::new();
        let mut span = keyword.span;

        loop {
            let target = self.parse_expr(EXPR_BP)?;
            self.check_target(target, "delete")?;
            span = span.merge(target.span());
            targets.push(*target);
            if self.eat(TokenKind::Comma).is_none() || !self.starts_list_item() {
                break;
            }
        }

        Ok(Stmt::Delete(self.arena.alloc(DeleteStmt {
            targets: self.arena.alloc_slice_copy(&targets),
            span,
        })))
    }

    fn parse_assert(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Assert)?;
        let test = self.parse_test()?;
        let mut span = keyword.span.merge(test.span());
        let msg = if self.eat(TokenKind::Comma).is_some() {
            let msg = self.parse_test()?;
            span = span.merge(msg.span());
            Some(msg)
        } else {
            None
        };
        Ok(Stmt::Assert(self.arena.alloc(AssertStmt { test, msg, span })))
    }

    /// Expression statements and every kind of assignment.
    fn parse_expr_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let parenthesized = self.check(TokenKind::LeftParen);
        let first = self.parse_yield_or_testlist()?;

        // Annotated assignment
        if self.eat(TokenKind::Colon).is_some() {
            match first {
                Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_) => {}
                Expr::Tuple(_) => return Err(annotation_error(first, "only single target (not tuple) can be annotated")),
                Expr::List(_) => return Err(annotation_error(first, "only single target (not list) can be annotated")),
                _ => return Err(annotation_error(first, "illegal target for annotation")),
            }
            let annotation = self.parse_test()?;
            let value = if self.eat(TokenKind::Equal).is_some() {
                Some(self.parse_yield_or_testlist()?)
            } else {
                None
            };
            let end = value.unwrap_or(annotation).span();
            return Ok(Stmt::AnnAssign(self.arena.alloc(AnnAssignStmt {
                target: first,
                annotation,
                value,
                simple: matches!(first, Expr::Name(_)) && !parenthesized,
                span: first.span().merge(end),
            })));
        }

        // Augmented assignment
        if let Some(op) = BinaryOp::from_augmented_token(self.peek().kind) {
            if !matches!(first, Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_)) {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidTarget,
                    first.span(),
                    format!(
                        "'{}' is an illegal expression for augmented assignment",
                        first.describe()
                    ),
                ));
            }
            self.advance();
            let value = self.parse_yield_or_testlist()?;
            return Ok(Stmt::AugAssign(self.arena.alloc(AugAssignStmt {
                target: first,
                op,
                value,
                span: first.span().merge(value.span()),
            })));
        }

        // Plain (possibly chained) assignment
        if self.check(TokenKind::Equal) {
            let mut targets = vec![*first];
            let mut value = first;
            while self.eat(TokenKind::Equal).is_some() {
                value = self.parse_yield_or_testlist()?;
                targets.push(*value);
            }
            targets.pop();

            for target in &targets {
                self.check_target(target, "assign to")?;
            }

            return Ok(Stmt::Assign(self.arena.alloc(AssignStmt {
                targets: self.arena.alloc_slice_copy(&targets),
                value,
                span: first.span().merge(value.span()),
            })));
        }

        Ok(Stmt::Expr(ExprStmt {
            value: first,
            span: first.span(),
        }))
    }

    fn expect_ident(&mut self) -> Result<Ident<'ast>, ParseError> {
        let token = *self.peek();
        if token.kind != TokenKind::Name {
            if token.kind == TokenKind::Eof {
                return Err(ParseError::unexpected_eof(token.span));
            }
            return Err(ParseError::expected_identifier(
                token.span,
                token.kind.description(),
            ));
        }
        self.advance();
        Ok(Ident::new(token.lexeme, token.span))
    }

    // ========================================================================
    // Compound statements
    // ========================================================================

    fn parse_if(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::If)?;
        self.parse_if_rest(keyword.span)
    }

    /// Everything after `if` or `elif`; `elif` chains nest in `orelse`.
    fn parse_if_rest(&mut self, start: Span) -> Result<Stmt<'ast>, ParseError> {
        let test = self.parse_named_or_test()?;
        let body = self.parse_block()?;

        let orelse: &'ast [Stmt<'ast>] = if let Some(elif) = self.eat(TokenKind::Elif) {
            let nested = self.parse_if_rest(elif.span)?;
            self.arena.alloc_slice_copy(&[nested])
        } else {
            self.parse_else()?
        };

        Ok(Stmt::If(self.arena.alloc(IfStmt {
            test,
            body,
            orelse,
            span: start.merge(test.span()),
        })))
    }

    /// An optional `else:` block.
    fn parse_else(&mut self) -> Result<&'ast [Stmt<'ast>], ParseError> {
        if self.eat(TokenKind::Else).is_some() {
            self.parse_block()
        } else {
            Ok(&[])
        }
    }

    fn parse_while(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::While)?;
        let test = self.parse_named_or_test()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else()?;
        Ok(Stmt::While(self.arena.alloc(WhileStmt {
            test,
            body,
            orelse,
            span: keyword.span.merge(test.span()),
        })))
    }

    /// `async def`, `async for` or `async with`.
    fn parse_async(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Async)?;
        match self.peek().kind {
            TokenKind::Def => self.parse_function(&[], Some(keyword.span), true),
            TokenKind::For => self.parse_for(Some(keyword.span)),
            TokenKind::With => self.parse_with(Some(keyword.span)),
            _ => Err(self.invalid_syntax()),
        }
    }

    /// `async_start` is the span of a leading `async` keyword.
    fn parse_for(&mut self, async_start: Option<Span>) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::For)?;
        let target = self.parse_target_list()?;
        self.check_target(target, "assign to")?;
        self.expect(TokenKind::In)?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else()?;
        Ok(Stmt::For(self.arena.alloc(ForStmt {
            target,
            iter,
            body,
            orelse,
            is_async: async_start.is_some(),
            span: async_start.unwrap_or(keyword.span).merge(iter.span()),
        })))
    }

    fn parse_try(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Try)?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while let Some(except) = self.eat(TokenKind::Except) {
            let mut typ = None;
            let mut name = None;
            if !self.check(TokenKind::Colon) {
                typ = Some(self.parse_test()?);
                if self.eat(TokenKind::As).is_some() {
                    name = Some(self.expect_ident()?);
                }
            }
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                typ,
                name,
                body: handler_body,
                span: except.span,
            });
        }

        let orelse: &'ast [Stmt<'ast>] = if handlers.is_empty() {
            &[]
        } else {
            self.parse_else()?
        };

        let finalbody: &'ast [Stmt<'ast>] = if self.eat(TokenKind::Finally).is_some() {
            self.parse_block()?
        } else {
            &[]
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.unexpected("'except' or 'finally'"));
        }

        Ok(Stmt::Try(self.arena.alloc(TryStmt {
            body,
            handlers: self.arena.alloc_slice_copy(&handlers),
            orelse,
            finalbody,
            span: keyword.span,
        })))
    }

    fn parse_with(&mut self, async_start: Option<Span>) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::With)?;

        let mut items = Vec::new();
        loop {
            let context_expr = self.parse_test()?;
            let target = if self.eat(TokenKind::As).is_some() {
                let target = self.parse_expr(EXPR_BP)?;
                self.check_target(target, "assign to")?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem {
                context_expr,
                target,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }

        let body = self.parse_block()?;
        Ok(Stmt::With(self.arena.alloc(WithStmt {
            items: self.arena.alloc_slice_copy(&items),
            body,
            is_async: async_start.is_some(),
            span: async_start.unwrap_or(keyword.span),
        })))
    }

    /// `@decorator NEWLINE`... followed by `def` or `class`.
    fn parse_decorated(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.peek().span;
        let mut decorators = Vec::new();
        while self.eat(TokenKind::At).is_some() {
            decorators.push(*self.parse_test()?);
            self.expect(TokenKind::Newline)?;
        }
        let decorators = self.arena.alloc_slice_copy(&decorators);

        match self.peek().kind {
            TokenKind::Def => self.parse_function(decorators, Some(start), false),
            TokenKind::Class => self.parse_class(decorators, Some(start)),
            TokenKind::Async if self.peek_nth(1).kind == TokenKind::Def => {
                self.advance();
                self.parse_function(decorators, Some(start), true)
            }
            _ => Err(self.unexpected("'def' or 'class'")),
        }
    }

    fn parse_function(
        &mut self,
        decorators: &'ast [Expr<'ast>],
        start: Option<Span>,
        is_async: bool,
    ) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Def)?;
        let name = self.expect_ident()?;
        let scope = self.new_scope();

        self.expect(TokenKind::LeftParen)?;
        let args = self.parse_parameters(TokenKind::RightParen, true)?;
        self.expect(TokenKind::RightParen)?;

        let returns = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        Ok(Stmt::FunctionDef(self.arena.alloc(FunctionDef {
            name,
            args,
            body,
            decorators,
            returns,
            scope,
            is_async,
            span: start.unwrap_or(keyword.span),
        })))
    }

    fn parse_class(
        &mut self,
        decorators: &'ast [Expr<'ast>],
        start: Option<Span>,
    ) -> Result<Stmt<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Class)?;
        let name = self.expect_ident()?;
        let scope = self.new_scope();

        let (bases, keywords) = if self.eat(TokenKind::LeftParen).is_some() {
            let arguments = self.parse_arguments()?;
            self.expect(TokenKind::RightParen)?;
            arguments
        } else {
            (&[][..], &[][..])
        };

        let body = self.parse_block()?;
        Ok(Stmt::ClassDef(self.arena.alloc(ClassDef {
            name,
            bases,
            keywords,
            body,
            decorators,
            scope,
            span: start.unwrap_or(keyword.span),
        })))
    }

    /// Parse a parameter list up to (not including) `closing`.
    ///
    /// `def` parameters may carry annotations; `lambda` parameters may not.
    pub(super) fn parse_parameters(
        &mut self,
        closing: TokenKind,
        annotations: bool,
    ) -> Result<&'ast Arguments<'ast>, ParseError> {
        let mut posonly: &'ast [Param<'ast>] = &[];
        let mut args = Vec::new();
        let mut vararg = None;
        let mut kwonly = Vec::new();
        let mut kwarg = None;
        let mut star_seen = false;
        let mut seen_default = false;

        while !self.check(closing) {
            if let Some(slash) = self.eat(TokenKind::Slash) {
                if star_seen || !posonly.is_empty() || args.is_empty() {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        slash.span,
                        "invalid syntax",
                    ));
                }
                posonly = self.arena.alloc_slice_copy(&args);
                args.clear();
            } else if let Some(star) = self.eat(TokenKind::Star) {
                if star_seen {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        star.span,
                        "invalid syntax",
                    ));
                }
                star_seen = true;
                if self.check(TokenKind::Name) {
                    vararg = Some(self.parse_param(annotations, false)?);
                } else if !self.check(TokenKind::Comma) {
                    return Err(self.named_after_bare_star());
                }
            } else if self.eat(TokenKind::StarStar).is_some() {
                kwarg = Some(self.parse_param(annotations, false)?);
                self.eat(TokenKind::Comma);
                if !self.check(closing) {
                    return Err(self.invalid_syntax());
                }
                break;
            } else {
                let param = self.parse_param(annotations, true)?;
                if star_seen {
                    kwonly.push(param);
                } else {
                    if param.default.is_some() {
                        seen_default = true;
                    } else if seen_default {
                        return Err(ParseError::new(
                            ParseErrorKind::InvalidSyntax,
                            param.name.span,
                            "non-default argument follows default argument",
                        ));
                    }
                    args.push(param);
                }
            }

            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }

        if star_seen && vararg.is_none() && kwonly.is_empty() {
            return Err(self.named_after_bare_star());
        }

        Ok(self.arena.alloc(Arguments {
            posonly,
            args: self.arena.alloc_slice_copy(&args),
            vararg,
            kwonly: self.arena.alloc_slice_copy(&kwonly),
            kwarg,
        }))
    }

    fn parse_param(&mut self, annotations: bool, defaults: bool) -> Result<Param<'ast>, ParseError> {
        let name = self.expect_ident()?;
        let annotation = if annotations && self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };
        let default = if defaults && self.eat(TokenKind::Equal).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default,
        })
    }

    fn named_after_bare_star(&self) -> ParseError {
        ParseError::new(
            ParseErrorKind::InvalidSyntax,
            self.peek().span,
            "named arguments must follow bare *",
        )
    }
}

fn annotation_error(target: &Expr<'_>, message: &str) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidTarget, target.span(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn parse<'a>(source: &str, arena: &'a Bump) -> Module<'a> {
        Parser::parse(source, arena).unwrap()
    }

    fn error(source: &str) -> ParseError {
        let arena = Bump::new();
        Parser::parse(source, &arena).unwrap_err()
    }

    #[test]
    fn simple_statements_on_one_line() {
        let arena = Bump::new();
        let module = parse("x = 1; y = 2; pass;\n", &arena);
        assert_eq!(module.body.len(), 3);
        assert!(matches!(module.body[2], Stmt::Pass(_)));
    }

    #[test]
    fn assignments() {
        let arena = Bump::new();
        let module = parse("a = b = 1\na, *b = c\nx += 1\ny: int = 2\n(z): int\n", &arena);

        let Stmt::Assign(chain) = module.body[0] else {
            panic!("expected assign");
        };
        assert_eq!(chain.targets.len(), 2);
        assert!(matches!(module.body[1], Stmt::Assign(a) if matches!(a.targets[0], Expr::Tuple(_))));
        assert!(matches!(module.body[2], Stmt::AugAssign(a) if a.op == BinaryOp::Add));
        assert!(matches!(module.body[3], Stmt::AnnAssign(a) if a.simple && a.value.is_some()));
        assert!(matches!(module.body[4], Stmt::AnnAssign(a) if !a.simple && a.value.is_none()));
    }

    #[test]
    fn invalid_assignment_targets() {
        assert_eq!(error("1 = x\n").message, "cannot assign to literal");
        assert_eq!(error("f() = x\n").message, "cannot assign to function call");
        assert_eq!(error("None = 1\n").message, "cannot assign to None");
        assert_eq!(error("del 1\n").kind, ParseErrorKind::InvalidTarget);
        assert_eq!(
            error("a, b: int\n").message,
            "only single target (not tuple) can be annotated"
        );
        assert_eq!(error("f() += 1\n").kind, ParseErrorKind::InvalidTarget);
    }

    #[test]
    fn imports() {
        let arena = Bump::new();
        let module = parse(
            "import os.path as p, sys\nfrom . import a\nfrom ..pkg.mod import (b as c, d,)\nfrom x import *\n",
            &arena,
        );

        let Stmt::Import(import) = module.body[0] else {
            panic!("expected import");
        };
        assert_eq!(import.names[0].name.name, "os.path");
        assert_eq!(import.names[0].asname.map(|a| a.name), Some("p"));

        assert!(matches!(module.body[1], Stmt::ImportFrom(f) if f.level == 1 && f.module.is_none()));
        let Stmt::ImportFrom(from) = module.body[2] else {
            panic!("expected from import");
        };
        assert_eq!(from.level, 2);
        assert_eq!(from.module, Some("pkg.mod"));
        assert_eq!(from.names.len(), 2);
        assert!(matches!(module.body[3], Stmt::ImportFrom(f) if f.names[0].name.name == "*"));

        assert!(Parser::parse("from x import a,\n", &arena).is_err());
        assert!(Parser::parse("from import a\n", &arena).is_err());
    }

    #[test]
    fn if_elif_else_nests() {
        let arena = Bump::new();
        let module = parse("if a:\n    x\nelif b:\n    y\nelse:\n    z\n", &arena);
        let Stmt::If(outer) = module.body[0] else {
            panic!("expected if");
        };
        assert_eq!(outer.orelse.len(), 1);
        let Stmt::If(inner) = outer.orelse[0] else {
            panic!("expected nested if");
        };
        assert_eq!(inner.orelse.len(), 1);
    }

    #[test]
    fn loops_with_else() {
        let arena = Bump::new();
        let module = parse(
            "for i, j in pairs:\n    pass\nelse:\n    done()\nwhile x: x -= 1\n",
            &arena,
        );
        assert!(matches!(module.body[0], Stmt::For(f) if f.orelse.len() == 1));
        assert!(matches!(module.body[1], Stmt::While(w) if w.body.len() == 1));
    }

    #[test]
    fn try_statements() {
        let arena = Bump::new();
        let module = parse(
            "try:\n    a()\nexcept ValueError as e:\n    pass\nexcept:\n    pass\nelse:\n    b()\nfinally:\n    c()\n",
            &arena,
        );
        let Stmt::Try(stmt) = module.body[0] else {
            panic!("expected try");
        };
        assert_eq!(stmt.handlers.len(), 2);
        assert_eq!(stmt.handlers[0].name.map(|n| n.name), Some("e"));
        assert!(stmt.handlers[1].typ.is_none());
        assert_eq!(stmt.orelse.len(), 1);
        assert_eq!(stmt.finalbody.len(), 1);

        assert!(Parser::parse("try:\n    pass\n", &arena).is_err());
    }

    #[test]
    fn with_items() {
        let arena = Bump::new();
        let module = parse("with open(a) as f, lock:\n    pass\n", &arena);
        let Stmt::With(stmt) = module.body[0] else {
            panic!("expected with");
        };
        assert_eq!(stmt.items.len(), 2);
        assert!(stmt.items[0].target.is_some());
        assert!(stmt.items[1].target.is_none());
    }

    #[test]
    fn function_parameters() {
        let arena = Bump::new();
        let module = parse(
            "@dec\n@other(1)\ndef f(a, b=1, /, c: int = 2, *args, d, e=3, **kw) -> int:\n    return a\n",
            &arena,
        );
        let Stmt::FunctionDef(def) = module.body[0] else {
            panic!("expected def");
        };
        assert_eq!(def.decorators.len(), 2);
        assert_eq!(def.args.posonly.len(), 2);
        assert_eq!(def.args.args.len(), 1);
        assert!(def.args.args[0].annotation.is_some());
        assert_eq!(def.args.vararg.map(|p| p.name.name), Some("args"));
        assert_eq!(def.args.kwonly.len(), 2);
        assert_eq!(def.args.kwarg.map(|p| p.name.name), Some("kw"));
        assert!(def.returns.is_some());
        assert_eq!(def.span.line, 1);
    }

    #[test]
    fn parameter_errors() {
        assert_eq!(
            error("def f(a=1, b): pass\n").message,
            "non-default argument follows default argument"
        );
        assert_eq!(
            error("def f(*): pass\n").message,
            "named arguments must follow bare *"
        );
        assert!(matches!(
            error("def f(**kw, a): pass\n").kind,
            ParseErrorKind::InvalidSyntax
        ));
    }

    #[test]
    fn class_with_bases() {
        let arena = Bump::new();
        let module = parse("class A(B, metaclass=M):\n    '''Doc.'''\n", &arena);
        let Stmt::ClassDef(class) = module.body[0] else {
            panic!("expected class");
        };
        assert_eq!(class.bases.len(), 1);
        assert_eq!(class.keywords.len(), 1);
        assert_eq!(class.body[0].as_docstring(), Some("Doc."));
    }

    #[test]
    fn block_errors() {
        assert_eq!(
            error("if x:\npass\n").kind,
            ParseErrorKind::ExpectedIndentedBlock
        );
        assert_eq!(error("  x = 1\n").kind, ParseErrorKind::UnexpectedIndent);
        assert_eq!(error("x = 1 y = 2\n").kind, ParseErrorKind::ExpectedToken);
        assert_eq!(error("async x = 1\n").kind, ParseErrorKind::InvalidSyntax);
        assert_eq!(error("@dec\nasync for x in y: pass\n").kind, ParseErrorKind::ExpectedToken);
    }

    #[test]
    fn async_statements() {
        let arena = Bump::new();
        let module = parse(
            "@dec\nasync def f():\n    async for x in a:\n        pass\n    async with b as c, d:\n        pass\n",
            &arena,
        );
        let Stmt::FunctionDef(def) = module.body[0] else {
            panic!("expected def");
        };
        assert!(def.is_async);
        assert_eq!(def.decorators.len(), 1);
        assert!(matches!(def.body[0], Stmt::For(f) if f.is_async));
        assert!(matches!(def.body[1], Stmt::With(w) if w.is_async && w.items.len() == 2));

        let module = parse("def g():\n    for x in a:\n        pass\n", &arena);
        let Stmt::FunctionDef(def) = module.body[0] else {
            panic!("expected def");
        };
        assert!(!def.is_async);
        assert!(matches!(def.body[0], Stmt::For(f) if !f.is_async));
    }

    #[test]
    fn named_expression_in_conditions() {
        let arena = Bump::new();
        let module = parse("if (n := 1) > 0:\n    pass\nwhile chunk := read():\n    pass\n", &arena);
        assert!(matches!(module.body[0], Stmt::If(_)));
        let Stmt::While(stmt) = module.body[1] else {
            panic!("expected while");
        };
        assert!(matches!(stmt.test, Expr::NamedExpr(n) if n.target.name == "chunk"));

        assert!(Parser::parse("x := 1\n", &arena).is_err());
        assert!(Parser::parse("if 1 := x:\n    pass\n", &arena).is_err());
    }

    #[test]
    fn deeply_nested_blocks_are_an_error() {
        let mut source = String::new();
        for depth in 0..120 {
            source.push_str(&" ".repeat(depth));
            source.push_str("if x:\n");
        }
        source.push_str(&" ".repeat(120));
        source.push_str("pass\n");
        let error = error(&source);
        assert!(
            matches!(error.kind, ParseErrorKind::TooDeeplyNested | ParseErrorKind::Lexical),
            "{error:?}"
        );
    }

    #[test]
    fn yield_statements() {
        let arena = Bump::new();
        let module = parse("def g():\n    yield\n    x = yield 1\n    yield from y\n", &arena);
        let Stmt::FunctionDef(def) = module.body[0] else {
            panic!("expected def");
        };
        assert!(matches!(def.body[0], Stmt::Expr(e) if matches!(e.value, Expr::Yield(_))));
        assert!(matches!(def.body[1], Stmt::Assign(a) if matches!(a.value, Expr::Yield(_))));
        assert!(matches!(def.body[2], Stmt::Expr(e) if matches!(e.value, Expr::YieldFrom(_))));
    }
}
