//! Expression parsing using Pratt parsing (precedence climbing).
//!
//! This module implements expression parsing with proper operator precedence
//! and associativity using the Pratt parsing algorithm. Python's grammar
//! levels map onto minimum binding powers:
//!
//! - `test` (conditional, lambda): [`Parser::parse_test`]
//! - `or_test`: `parse_expr(OR_TEST_BP)`
//! - `expr` (bitwise or and tighter): `parse_expr(EXPR_BP)`

use super::parser::Parser;
use crate::ast::expr::*;
use crate::ast::{BinaryOp, BoolOp, CmpOp, Ident, ParseError, ParseErrorKind, UnaryOp};
use crate::lexer::TokenKind;
use pydiff_core::Span;

/// Minimum binding power of an `or_test`.
pub(super) const OR_TEST_BP: u8 = 3;
/// Minimum binding power of an `expr` (what may follow `*` or stand as a target).
pub(super) const EXPR_BP: u8 = 11;
/// Binding power of postfix call, subscript and attribute access.
const POSTFIX_BP: u8 = 27;

impl<'ast> Parser<'ast> {
    /// Parse a `test`: a lambda, or an `or_test` with an optional
    /// conditional suffix.
    pub fn parse_test(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if self.check(TokenKind::Lambda) {
            return self.nested(Self::parse_lambda);
        }

        let body = self.parse_expr(OR_TEST_BP)?;
        if self.eat(TokenKind::If).is_none() {
            return Ok(body);
        }

        let test = self.parse_expr(OR_TEST_BP)?;
        self.expect(TokenKind::Else)?;
        let orelse = self.nested(Self::parse_test)?;
        let span = body.span().merge(orelse.span());
        Ok(self.arena.alloc(Expr::IfExp(self.arena.alloc(IfExpr {
            test,
            body,
            orelse,
            span,
        }))))
    }

    /// Parse an expression with a minimum binding power.
    ///
    /// This is the core of the Pratt parser. It handles operator precedence
    /// by only consuming operators with sufficient binding power.
    pub fn parse_expr(&mut self, min_bp: u8) -> Result<&'ast Expr<'ast>, ParseError> {
        self.nested(|parser| parser.parse_operators(min_bp))
    }

    fn parse_operators(&mut self, min_bp: u8) -> Result<&'ast Expr<'ast>, ParseError> {
        let mut lhs = self.parse_prefix(min_bp)?;

        loop {
            let kind = self.peek().kind;

            // Postfix operators bind tightest.
            if POSTFIX_BP >= min_bp {
                match kind {
                    TokenKind::Dot => {
                        lhs = self.parse_attribute(lhs)?;
                        continue;
                    }
                    TokenKind::LeftParen => {
                        lhs = self.parse_call(lhs)?;
                        continue;
                    }
                    TokenKind::LeftBracket => {
                        lhs = self.parse_subscript(lhs)?;
                        continue;
                    }
                    _ => {}
                }
            }

            if let Some(op) = BinaryOp::from_token(kind) {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }

                self.advance();
                let rhs = self.parse_expr(r_bp)?;
                let span = lhs.span().merge(rhs.span());
                lhs = self.arena.alloc(Expr::Binary(self.arena.alloc(BinaryExpr {
                    left: lhs,
                    op,
                    right: rhs,
                    span,
                })));
                continue;
            }

            if self.peek_comparison().is_some() {
                let (l_bp, _) = CmpOp::BINDING_POWER;
                if l_bp < min_bp {
                    break;
                }
                lhs = self.parse_comparison(lhs)?;
                continue;
            }

            if let Some(op) = BoolOp::from_token(kind) {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }

                // Gather the whole chain so `a or b or c` is one node.
                let mut values = vec![*lhs];
                while self.eat(kind).is_some() {
                    values.push(*self.parse_expr(r_bp)?);
                }
                let span = lhs.span().merge(values[values.len() - 1].span());
                lhs = self.arena.alloc(Expr::BoolOp(self.arena.alloc(BoolOpExpr {
                    op,
                    values: self.arena.alloc_slice_copy(&values),
                    span,
                })));
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    /// Parse a prefix expression (the start of an expression).
    fn parse_prefix(&mut self, min_bp: u8) -> Result<&'ast Expr<'ast>, ParseError> {
        let token = *self.peek();

        if let Some(op) = UnaryOp::from_token(token.kind) {
            // `not` lives below comparisons: `a == not b` is invalid.
            if op.binding_power() < min_bp {
                return Err(self.invalid_syntax());
            }
            self.advance();
            let operand = self.parse_expr(op.binding_power())?;
            let span = token.span.merge(operand.span());
            return Ok(self.arena.alloc(Expr::Unary(self.arena.alloc(UnaryExpr {
                op,
                operand,
                span,
            }))));
        }

        let arena = self.arena;
        let constant = move |value| -> Result<&'ast Expr<'ast>, ParseError> {
            Ok(arena.alloc(Expr::Constant(ConstantExpr {
                value,
                span: token.span,
            })))
        };

        match token.kind {
            TokenKind::Name => {
                self.advance();
                Ok(self
                    .arena
                    .alloc(Expr::Name(Ident::new(token.lexeme, token.span))))
            }

            TokenKind::Int => {
                self.advance();
                let digits = super::literals::parse_int(token.lexeme);
                constant(Constant::Int(self.arena.alloc_str(&digits)))
            }

            TokenKind::Float => {
                self.advance();
                let value = super::literals::parse_float(token.lexeme)
                    .ok_or_else(|| invalid_literal(token.span, token.lexeme))?;
                constant(Constant::Float(value))
            }

            TokenKind::Imaginary => {
                self.advance();
                let value = super::literals::parse_float(&token.lexeme[..token.lexeme.len() - 1])
                    .ok_or_else(|| invalid_literal(token.span, token.lexeme))?;
                constant(Constant::Complex(value))
            }

            TokenKind::String => self.parse_strings(),

            TokenKind::None => {
                self.advance();
                constant(Constant::None)
            }
            TokenKind::True => {
                self.advance();
                constant(Constant::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                constant(Constant::Bool(false))
            }
            TokenKind::Ellipsis => {
                self.advance();
                constant(Constant::Ellipsis)
            }

            TokenKind::LeftParen => self.parse_paren(),
            TokenKind::LeftBracket => self.parse_list(),
            TokenKind::LeftBrace => self.parse_brace(),

            TokenKind::Eof => Err(ParseError::unexpected_eof(token.span)),
            TokenKind::Indent => Err(self.unexpected("expression")),
            TokenKind::Await => self.parse_await(),
            TokenKind::Async => Err(self.invalid_syntax()),
            other => Err(ParseError::expected_expression(
                token.span,
                other.description(),
            )),
        }
    }

    /// Parse `await primary`; the operand is an atom with its trailers, so
    /// `await x ** 2` awaits `x` alone.
    fn parse_await(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Await)?;
        if self.check(TokenKind::Await) {
            return Err(self.invalid_syntax());
        }
        let value = self.parse_expr(POSTFIX_BP)?;
        let span = keyword.span.merge(value.span());
        Ok(self
            .arena
            .alloc(Expr::Await(self.arena.alloc(AwaitExpr { value, span }))))
    }

    /// Parse `namedexpr_test`: a `test` optionally bound with `:=`.
    pub(super) fn parse_named_or_test(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let target = self.parse_test()?;
        if self.check(TokenKind::ColonEqual) {
            return self.finish_named(target);
        }
        Ok(target)
    }

    /// Parse a `test`, a named expression or a starred `expr`: the elements
    /// of parenthesized and list displays.
    fn parse_star_or_named(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if self.check(TokenKind::Star) {
            return self.parse_starred();
        }
        self.parse_named_or_test()
    }

    /// Parse `:= value` after `target`, which must be a plain name.
    fn finish_named(&mut self, target: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        let Expr::Name(ident) = *target else {
            return Err(ParseError::new(
                ParseErrorKind::InvalidTarget,
                target.span(),
                format!("cannot use named assignment with {}", target.describe()),
            ));
        };
        self.expect(TokenKind::ColonEqual)?;
        let value = self.parse_test()?;
        let span = ident.span.merge(value.span());
        Ok(self.arena.alloc(Expr::NamedExpr(self.arena.alloc(NamedExpr {
            target: ident,
            value,
            span,
        }))))
    }

    // ========================================================================
    // Comparisons
    // ========================================================================

    /// Recognize a comparison operator at the current position, returning
    /// the operator and how many tokens it spans.
    fn peek_comparison(&self) -> Option<(CmpOp, usize)> {
        let kind = self.peek().kind;
        let next = self.peek_nth(1).kind;
        match (kind, next) {
            (TokenKind::Not, TokenKind::In) => Some((CmpOp::NotIn, 2)),
            (TokenKind::Is, TokenKind::Not) => Some((CmpOp::IsNot, 2)),
            _ => CmpOp::from_token(kind).map(|op| (op, 1)),
        }
    }

    /// Parse a comparison chain whose first operand is `left`.
    fn parse_comparison(
        &mut self,
        left: &'ast Expr<'ast>,
    ) -> Result<&'ast Expr<'ast>, ParseError> {
        let (_, r_bp) = CmpOp::BINDING_POWER;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();

        while let Some((op, width)) = self.peek_comparison() {
            for _ in 0..width {
                self.advance();
            }
            ops.push(op);
            comparators.push(*self.parse_expr(r_bp)?);
        }

        let span = left.span().merge(comparators[comparators.len() - 1].span());
        Ok(self.arena.alloc(Expr::Compare(self.arena.alloc(CompareExpr {
            left,
            ops: self.arena.alloc_slice_copy(&ops),
            comparators: self.arena.alloc_slice_copy(&comparators),
            span,
        }))))
    }

    // ========================================================================
    // Lists of expressions
    // ========================================================================

    /// Parse a `test` or a starred `expr`.
    pub(super) fn parse_star_or_test(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if self.check(TokenKind::Star) {
            return self.parse_starred();
        }
        self.parse_test()
    }

    /// Parse an `expr` or a starred `expr` (assignment targets).
    pub(super) fn parse_star_or_expr(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if self.check(TokenKind::Star) {
            return self.parse_starred();
        }
        self.parse_expr(EXPR_BP)
    }

    fn parse_starred(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let star = self.expect(TokenKind::Star)?;
        let value = self.parse_expr(EXPR_BP)?;
        let span = star.span.merge(value.span());
        Ok(self
            .arena
            .alloc(Expr::Starred(self.arena.alloc(StarredExpr { value, span }))))
    }

    /// Parse `testlist_star_expr`: a comma-separated list that becomes a
    /// tuple when a comma is present.
    pub fn parse_testlist_star_expr(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let first = self.parse_star_or_test()?;
        self.finish_implicit_tuple(first, Self::parse_star_or_test)
    }

    /// Parse `testlist`: like [`Self::parse_testlist_star_expr`] without
    /// starred elements.
    pub(super) fn parse_testlist(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let first = self.parse_test()?;
        self.finish_implicit_tuple(first, Self::parse_test)
    }

    /// Parse `exprlist`: the targets of `for` and comprehensions.
    pub(super) fn parse_target_list(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let first = self.parse_star_or_expr()?;
        self.finish_implicit_tuple(first, Self::parse_star_or_expr)
    }

    /// Continue an unparenthesized tuple whose first element is `first`.
    fn finish_implicit_tuple(
        &mut self,
        first: &'ast Expr<'ast>,
        mut item: impl FnMut(&mut Self) -> Result<&'ast Expr<'ast>, ParseError>,
    ) -> Result<&'ast Expr<'ast>, ParseError> {
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }

        let mut elements = vec![*first];
        let mut span = first.span();
        while let Some(comma) = self.eat(TokenKind::Comma) {
            span = span.merge(comma.span);
            if !self.starts_list_item() {
                break;
            }
            let element = item(self)?;
            span = span.merge(element.span());
            elements.push(*element);
        }

        Ok(self.alloc_sequence(Expr::Tuple, elements, span))
    }

    /// Whether the current token can begin another element after a comma.
    pub(super) fn starts_list_item(&self) -> bool {
        let kind = self.peek().kind;
        kind.starts_expression() && kind != TokenKind::Yield
    }

    /// Parse `yield_expr | testlist_star_expr`, the right-hand side of
    /// assignments and expression statements.
    pub(super) fn parse_yield_or_testlist(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if self.check(TokenKind::Yield) {
            return self.parse_yield();
        }
        self.parse_testlist_star_expr()
    }

    /// Parse `yield [from test | testlist_star_expr]`.
    pub(super) fn parse_yield(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Yield)?;

        if self.eat(TokenKind::From).is_some() {
            let value = self.parse_test()?;
            let span = keyword.span.merge(value.span());
            return Ok(self.arena.alloc(Expr::YieldFrom(self.arena.alloc(YieldExpr {
                value: Some(value),
                span,
            }))));
        }

        let value = if self.starts_list_item() {
            Some(self.parse_testlist_star_expr()?)
        } else {
            None
        };
        let span = value.map_or(keyword.span, |v| keyword.span.merge(v.span()));
        Ok(self
            .arena
            .alloc(Expr::Yield(self.arena.alloc(YieldExpr { value, span }))))
    }

    fn alloc_sequence(
        &self,
        wrap: fn(SequenceExpr<'ast>) -> Expr<'ast>,
        elements: Vec<Expr<'ast>>,
        span: Span,
    ) -> &'ast Expr<'ast> {
        self.arena.alloc(wrap(SequenceExpr {
            elements: self.arena.alloc_slice_copy(&elements),
            span,
        }))
    }

    // ========================================================================
    // Atoms
    // ========================================================================

    /// Parse `( ... )`: a parenthesized expression, tuple, generator
    /// expression or parenthesized `yield`.
    fn parse_paren(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let open = self.expect(TokenKind::LeftParen)?;

        if let Some(close) = self.eat(TokenKind::RightParen) {
            return Ok(self.alloc_sequence(Expr::Tuple, Vec::new(), open.span.merge(close.span)));
        }

        if self.check(TokenKind::Yield) {
            let value = self.parse_yield()?;
            self.expect(TokenKind::RightParen)?;
            return Ok(value);
        }

        let first = self.parse_star_or_named()?;

        if self.starts_comprehension() {
            let expr = self.parse_comprehension(ComprehensionKind::Generator, first, None, open.span)?;
            self.expect(TokenKind::RightParen)?;
            return Ok(expr);
        }

        if !self.check(TokenKind::Comma) {
            self.expect(TokenKind::RightParen)?;
            return Ok(first);
        }

        let mut elements = vec![*first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.check(TokenKind::RightParen) {
                break;
            }
            elements.push(*self.parse_star_or_named()?);
        }
        let close = self.expect(TokenKind::RightParen)?;
        Ok(self.alloc_sequence(Expr::Tuple, elements, open.span.merge(close.span)))
    }

    /// Parse `[ ... ]`: a list display or list comprehension.
    fn parse_list(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let open = self.expect(TokenKind::LeftBracket)?;

        if let Some(close) = self.eat(TokenKind::RightBracket) {
            return Ok(self.alloc_sequence(Expr::List, Vec::new(), open.span.merge(close.span)));
        }

        let first = self.parse_star_or_named()?;
        if self.starts_comprehension() {
            let expr = self.parse_comprehension(ComprehensionKind::List, first, None, open.span)?;
            self.expect(TokenKind::RightBracket)?;
            return Ok(expr);
        }

        let elements = self.parse_display_tail(first, TokenKind::RightBracket, Self::parse_star_or_named)?;
        let close = self.expect(TokenKind::RightBracket)?;
        Ok(self.alloc_sequence(Expr::List, elements, open.span.merge(close.span)))
    }

    /// Parse `{ ... }`: a dict or set display, or their comprehensions.
    fn parse_brace(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let open = self.expect(TokenKind::LeftBrace)?;

        if let Some(close) = self.eat(TokenKind::RightBrace) {
            return Ok(self.alloc_dict(Vec::new(), open.span.merge(close.span)));
        }

        // Dict display starting with an unpack.
        if self.eat(TokenKind::StarStar).is_some() {
            let value = self.parse_expr(EXPR_BP)?;
            let entries = self.parse_dict_tail(DictEntry { key: None, value })?;
            let close = self.expect(TokenKind::RightBrace)?;
            return Ok(self.alloc_dict(entries, open.span.merge(close.span)));
        }

        let first = self.parse_star_or_test()?;

        if self.eat(TokenKind::Colon).is_some() {
            let value = self.parse_test()?;
            if self.starts_comprehension() {
                let expr =
                    self.parse_comprehension(ComprehensionKind::Dict, first, Some(value), open.span)?;
                self.expect(TokenKind::RightBrace)?;
                return Ok(expr);
            }
            let entries = self.parse_dict_tail(DictEntry {
                key: Some(first),
                value,
            })?;
            let close = self.expect(TokenKind::RightBrace)?;
            return Ok(self.alloc_dict(entries, open.span.merge(close.span)));
        }

        if self.starts_comprehension() {
            let expr = self.parse_comprehension(ComprehensionKind::Set, first, None, open.span)?;
            self.expect(TokenKind::RightBrace)?;
            return Ok(expr);
        }

        let elements = self.parse_display_tail(first, TokenKind::RightBrace, Self::parse_star_or_test)?;
        let close = self.expect(TokenKind::RightBrace)?;
        Ok(self.alloc_sequence(Expr::Set, elements, open.span.merge(close.span)))
    }

    /// Remaining comma-separated elements of a list or set display.
    fn parse_display_tail(
        &mut self,
        first: &'ast Expr<'ast>,
        closing: TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<&'ast Expr<'ast>, ParseError>,
    ) -> Result<Vec<Expr<'ast>>, ParseError> {
        let mut elements = vec![*first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.check(closing) {
                break;
            }
            elements.push(*item(self)?);
        }
        Ok(elements)
    }

    /// Remaining comma-separated entries of a dict display.
    fn parse_dict_tail(&mut self, first: DictEntry<'ast>) -> Result<Vec<DictEntry<'ast>>, ParseError> {
        let mut entries = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.check(TokenKind::RightBrace) {
                break;
            }
            if self.eat(TokenKind::StarStar).is_some() {
                let value = self.parse_expr(EXPR_BP)?;
                entries.push(DictEntry { key: None, value });
            } else {
                let key = self.parse_test()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_test()?;
                entries.push(DictEntry {
                    key: Some(key),
                    value,
                });
            }
        }
        Ok(entries)
    }

    fn alloc_dict(&self, entries: Vec<DictEntry<'ast>>, span: Span) -> &'ast Expr<'ast> {
        self.arena.alloc(Expr::Dict(self.arena.alloc(DictExpr {
            entries: self.arena.alloc_slice_copy(&entries),
            span,
        })))
    }

    /// Whether a `for` or `async for` clause starts here.
    fn starts_comprehension(&self) -> bool {
        match self.peek().kind {
            TokenKind::For => true,
            TokenKind::Async => self.peek_nth(1).kind == TokenKind::For,
            _ => false,
        }
    }

    /// Parse the `[async] for ... in ... if ...` clauses of a comprehension.
    fn parse_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: &'ast Expr<'ast>,
        value: Option<&'ast Expr<'ast>>,
        start: Span,
    ) -> Result<&'ast Expr<'ast>, ParseError> {
        let scope = self.new_scope();
        let mut generators = Vec::new();
        let mut span = start.merge(element.span());

        while self.starts_comprehension() {
            let is_async = self.eat(TokenKind::Async).is_some();
            self.expect(TokenKind::For)?;
            let target = self.parse_target_list()?;
            self.check_target(target, "assign to")?;
            self.expect(TokenKind::In)?;
            let iter = self.parse_expr(OR_TEST_BP)?;
            span = span.merge(iter.span());

            let mut ifs = Vec::new();
            while self.eat(TokenKind::If).is_some() {
                let cond = self.parse_expr(OR_TEST_BP)?;
                span = span.merge(cond.span());
                ifs.push(*cond);
            }

            generators.push(Comprehension {
                target,
                iter,
                ifs: self.arena.alloc_slice_copy(&ifs),
                is_async,
            });
        }

        Ok(self
            .arena
            .alloc(Expr::Comprehension(self.arena.alloc(ComprehensionExpr {
                kind,
                element,
                value,
                generators: self.arena.alloc_slice_copy(&generators),
                scope,
                span,
            }))))
    }

    // ========================================================================
    // Lambda
    // ========================================================================

    fn parse_lambda(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let keyword = self.expect(TokenKind::Lambda)?;
        let scope = self.new_scope();
        let args = self.parse_parameters(TokenKind::Colon, false)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_test()?;
        let span = keyword.span.merge(body.span());
        Ok(self.arena.alloc(Expr::Lambda(self.arena.alloc(LambdaExpr {
            args,
            body,
            scope,
            span,
        }))))
    }

    // ========================================================================
    // Postfix
    // ========================================================================

    /// Parse `.name`.
    fn parse_attribute(&mut self, value: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        self.expect(TokenKind::Dot)?;
        let name = self.peek();
        if name.kind != TokenKind::Name {
            return Err(ParseError::expected_identifier(
                name.span,
                name.kind.description(),
            ));
        }
        let name = self.advance();
        let attr = Ident::new(name.lexeme, name.span);
        let span = value.span().merge(name.span);
        Ok(self
            .arena
            .alloc(Expr::Attribute(self.arena.alloc(AttributeExpr {
                value,
                attr,
                span,
            }))))
    }

    /// Parse `(arguments)` after a callee.
    fn parse_call(&mut self, func: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let (args, keywords) = self.parse_arguments()?;
        let close = self.expect(TokenKind::RightParen)?;
        let span = func.span().merge(close.span);
        Ok(self.arena.alloc(Expr::Call(self.arena.alloc(CallExpr {
            func,
            args,
            keywords,
            span,
        }))))
    }

    /// Parse an argument list up to (not including) the closing `)`.
    ///
    /// Shared by calls and class bases.
    pub(super) fn parse_arguments(
        &mut self,
    ) -> Result<(&'ast [Expr<'ast>], &'ast [Keyword<'ast>]), ParseError> {
        let mut args: Vec<Expr<'ast>> = Vec::new();
        let mut keywords: Vec<Keyword<'ast>> = Vec::new();

        while !self.check(TokenKind::RightParen) {
            let token = *self.peek();

            if token.kind == TokenKind::Star {
                if keywords.iter().any(|k| k.arg.is_none()) {
                    return Err(invalid_arguments(
                        token.span,
                        "iterable argument unpacking follows keyword argument unpacking",
                    ));
                }
                args.push(*self.parse_starred_argument()?);
            } else if self.eat(TokenKind::StarStar).is_some() {
                let value = self.parse_test()?;
                keywords.push(Keyword { arg: None, value });
            } else {
                let value = self.parse_test()?;
                if self.check(TokenKind::Equal) {
                    let Expr::Name(ident) = *value else {
                        return Err(invalid_arguments(
                            value.span(),
                            "keyword can't be an expression",
                        ));
                    };
                    self.advance();
                    let value = self.parse_test()?;
                    keywords.push(Keyword {
                        arg: Some(ident),
                        value,
                    });
                } else if self.starts_comprehension() {
                    let genexp = self.parse_comprehension(
                        ComprehensionKind::Generator,
                        value,
                        None,
                        value.span(),
                    )?;
                    if !args.is_empty() || !keywords.is_empty() || !self.check(TokenKind::RightParen) {
                        return Err(invalid_arguments(
                            genexp.span(),
                            "Generator expression must be parenthesized",
                        ));
                    }
                    args.push(*genexp);
                } else {
                    let value = if self.check(TokenKind::ColonEqual) {
                        self.finish_named(value)?
                    } else {
                        value
                    };
                    if !keywords.is_empty() {
                        let message = if keywords.iter().any(|k| k.arg.is_none()) {
                            "positional argument follows keyword argument unpacking"
                        } else {
                            "positional argument follows keyword argument"
                        };
                        return Err(invalid_arguments(value.span(), message));
                    }
                    args.push(*value);
                }
            }

            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }

        Ok((
            self.arena.alloc_slice_copy(&args),
            self.arena.alloc_slice_copy(&keywords),
        ))
    }

    /// `*iterable` inside a call: any `test` may follow the star.
    fn parse_starred_argument(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let star = self.expect(TokenKind::Star)?;
        let value = self.parse_test()?;
        let span = star.span.merge(value.span());
        Ok(self
            .arena
            .alloc(Expr::Starred(self.arena.alloc(StarredExpr { value, span }))))
    }

    /// Parse `[index]` after a value.
    fn parse_subscript(&mut self, value: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        self.expect(TokenKind::LeftBracket)?;

        let first = self.parse_slice_item()?;
        let index = if self.check(TokenKind::Comma) {
            let mut elements = vec![*first];
            let mut span = first.span();
            while let Some(comma) = self.eat(TokenKind::Comma) {
                span = span.merge(comma.span);
                if self.check(TokenKind::RightBracket) {
                    break;
                }
                let element = self.parse_slice_item()?;
                span = span.merge(element.span());
                elements.push(*element);
            }
            self.alloc_sequence(Expr::Tuple, elements, span)
        } else {
            first
        };

        let close = self.expect(TokenKind::RightBracket)?;
        let span = value.span().merge(close.span);
        Ok(self
            .arena
            .alloc(Expr::Subscript(self.arena.alloc(SubscriptExpr {
                value,
                index,
                span,
            }))))
    }

    /// Parse one subscript: an expression or `lower:upper:step`.
    fn parse_slice_item(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let start = self.peek().span;
        let lower = if self.check(TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(TokenKind::Colon) {
                return Ok(expr);
            }
            Some(expr)
        };

        let colon = self.expect(TokenKind::Colon)?;
        let mut span = start.merge(colon.span);

        let ends_part = |parser: &Self| {
            matches!(
                parser.peek().kind,
                TokenKind::Colon | TokenKind::Comma | TokenKind::RightBracket
            )
        };

        let upper = if ends_part(self) {
            None
        } else {
            Some(self.parse_test()?)
        };

        let step = if let Some(colon) = self.eat(TokenKind::Colon) {
            span = span.merge(colon.span);
            if ends_part(self) {
                None
            } else {
                Some(self.parse_test()?)
            }
        } else {
            None
        };

        for part in [upper, step].into_iter().flatten() {
            span = span.merge(part.span());
        }

        Ok(self.arena.alloc(Expr::Slice(self.arena.alloc(SliceExpr {
            lower,
            upper,
            step,
            span,
        }))))
    }

    // ========================================================================
    // Target validation
    // ========================================================================

    /// Check that an expression can be assigned to (`action = "assign to"`)
    /// or deleted (`action = "delete"`).
    pub(super) fn check_target(&self, expr: &Expr<'ast>, action: &str) -> Result<(), ParseError> {
        match expr {
            Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_) => Ok(()),
            Expr::Starred(starred) if action == "assign to" => self.check_target(starred.value, action),
            Expr::Tuple(seq) | Expr::List(seq) => seq
                .elements
                .iter()
                .try_for_each(|element| self.check_target(element, action)),
            other => Err(ParseError::invalid_target(
                other.span(),
                action,
                other.describe(),
            )),
        }
    }
}

fn invalid_literal(span: Span, lexeme: &str) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidLiteral,
        span,
        format!("invalid literal {lexeme}"),
    )
}

fn invalid_arguments(span: Span, message: &str) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidArguments, span, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn parse<'a>(source: &str, arena: &'a Bump) -> &'a Expr<'a> {
        Parser::expression(source, arena).unwrap()
    }

    #[test]
    fn precedence_mul_over_add() {
        let arena = Bump::new();
        let Expr::Binary(add) = parse("1 + 2 * 3", &arena) else {
            panic!("expected binary");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(add.right, Expr::Binary(mul) if mul.op == BinaryOp::Mul));
    }

    #[test]
    fn power_is_right_associative_and_beats_unary() {
        let arena = Bump::new();
        let Expr::Unary(neg) = parse("-2 ** 3 ** 2", &arena) else {
            panic!("expected unary");
        };
        assert_eq!(neg.op, UnaryOp::Neg);
        let Expr::Binary(pow) = neg.operand else {
            panic!("expected power");
        };
        assert!(matches!(pow.right, Expr::Binary(inner) if inner.op == BinaryOp::Pow));

        assert!(Parser::expression("2 ** -1", &arena).is_ok());
    }

    #[test]
    fn boolean_chains_are_flat() {
        let arena = Bump::new();
        let Expr::BoolOp(or) = parse("a or b or c and d", &arena) else {
            panic!("expected or");
        };
        assert_eq!(or.op, BoolOp::Or);
        assert_eq!(or.values.len(), 3);
        assert!(matches!(or.values[2], Expr::BoolOp(and) if and.op == BoolOp::And));
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        let arena = Bump::new();
        let Expr::Unary(not) = parse("not a == b", &arena) else {
            panic!("expected not");
        };
        assert!(matches!(not.operand, Expr::Compare(_)));
        assert!(Parser::expression("a == not b", &arena).is_err());
    }

    #[test]
    fn comparison_chain() {
        let arena = Bump::new();
        let Expr::Compare(cmp) = parse("a < b <= c not in d is not e", &arena) else {
            panic!("expected comparison");
        };
        assert_eq!(
            cmp.ops,
            &[CmpOp::Lt, CmpOp::LtE, CmpOp::NotIn, CmpOp::IsNot]
        );
        assert_eq!(cmp.comparators.len(), 4);
    }

    #[test]
    fn conditional_and_lambda() {
        let arena = Bump::new();
        assert!(matches!(parse("a if b else c", &arena), Expr::IfExp(_)));
        let Expr::Lambda(lambda) = parse("lambda x, *a, k=1, **kw: x", &arena) else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.args.args.len(), 1);
        assert!(lambda.args.vararg.is_some());
        assert_eq!(lambda.args.kwonly.len(), 1);
        assert!(lambda.args.kwarg.is_some());
    }

    #[test]
    fn tuples() {
        let arena = Bump::new();
        assert!(matches!(parse("()", &arena), Expr::Tuple(t) if t.elements.is_empty()));
        assert!(matches!(parse("(1,)", &arena), Expr::Tuple(t) if t.elements.len() == 1));
        assert!(matches!(parse("1, 2,", &arena), Expr::Tuple(t) if t.elements.len() == 2));
        assert!(matches!(parse("(1)", &arena), Expr::Constant(_)));
    }

    #[test]
    fn displays_and_comprehensions() {
        let arena = Bump::new();
        assert!(matches!(parse("[1, *a]", &arena), Expr::List(l) if l.elements.len() == 2));
        assert!(matches!(parse("{1, 2}", &arena), Expr::Set(_)));
        assert!(matches!(parse("{}", &arena), Expr::Dict(_)));
        assert!(matches!(parse("{'a': 1, **b}", &arena), Expr::Dict(d) if d.entries.len() == 2));

        let Expr::Comprehension(comp) = parse("[x for x in y if x for z in x]", &arena) else {
            panic!("expected comprehension");
        };
        assert_eq!(comp.kind, ComprehensionKind::List);
        assert_eq!(comp.generators.len(), 2);
        assert_eq!(comp.generators[0].ifs.len(), 1);

        assert!(matches!(
            parse("{k: v for k, v in items}", &arena),
            Expr::Comprehension(c) if c.kind == ComprehensionKind::Dict && c.value.is_some()
        ));
        assert!(matches!(
            parse("(x for x in y)", &arena),
            Expr::Comprehension(c) if c.kind == ComprehensionKind::Generator
        ));
    }

    #[test]
    fn calls() {
        let arena = Bump::new();
        let Expr::Call(call) = parse("f(a, *b, c=1, **d)", &arena) else {
            panic!("expected call");
        };
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.keywords.len(), 2);
        assert!(call.keywords[1].arg.is_none());

        assert!(matches!(parse("f(x for x in y)", &arena), Expr::Call(c) if c.args.len() == 1));
        assert!(Parser::expression("f(a=1, b)", &arena).is_err());
        assert!(Parser::expression("f(**a, *b)", &arena).is_err());
        assert!(Parser::expression("f(a.b=1)", &arena).is_err());
        assert!(Parser::expression("f(x for x in y, 1)", &arena).is_err());
    }

    #[test]
    fn named_expressions() {
        let arena = Bump::new();
        let Expr::NamedExpr(named) = parse("(y := f(x))", &arena) else {
            panic!("expected named expression");
        };
        assert_eq!(named.target.name, "y");
        assert!(matches!(named.value, Expr::Call(_)));

        assert!(matches!(
            parse("[y := 1, y ** 2]", &arena),
            Expr::List(l) if matches!(l.elements[0], Expr::NamedExpr(_))
        ));
        assert!(matches!(
            parse("[y := x for x in z]", &arena),
            Expr::Comprehension(c) if matches!(c.element, Expr::NamedExpr(_))
        ));
        assert!(matches!(
            parse("f(a := 1, b)", &arena),
            Expr::Call(c) if c.args.len() == 2 && matches!(c.args[0], Expr::NamedExpr(_))
        ));

        assert!(Parser::expression("y := 1", &arena).is_err());
        assert!(Parser::expression("{y := 1}", &arena).is_err());
        assert!(Parser::expression("a[y := 1]", &arena).is_err());
        let error = Parser::expression("(a.b := 1)", &arena).unwrap_err();
        assert_eq!(error.message, "cannot use named assignment with attribute");
    }

    #[test]
    fn await_binds_to_primary() {
        let arena = Bump::new();
        let Expr::Binary(pow) = parse("await x.y() ** 2", &arena) else {
            panic!("expected power");
        };
        let Expr::Await(inner) = pow.left else {
            panic!("expected await");
        };
        assert!(matches!(inner.value, Expr::Call(_)));

        assert!(matches!(parse("-await x", &arena), Expr::Unary(u) if matches!(u.operand, Expr::Await(_))));
        assert!(Parser::expression("await -x", &arena).is_err());
        assert!(Parser::expression("await await x", &arena).is_err());
    }

    #[test]
    fn async_comprehension_clauses() {
        let arena = Bump::new();
        let Expr::Comprehension(comp) = parse("[x async for x in a for y in x]", &arena) else {
            panic!("expected comprehension");
        };
        assert!(comp.generators[0].is_async);
        assert!(!comp.generators[1].is_async);
        assert!(matches!(
            parse("f(x async for x in a)", &arena),
            Expr::Call(c) if matches!(c.args[0], Expr::Comprehension(g) if g.generators[0].is_async)
        ));
        assert!(Parser::expression("[x async x in a]", &arena).is_err());
    }

    #[test]
    fn subscripts_and_slices() {
        let arena = Bump::new();
        let Expr::Subscript(sub) = parse("a[1:2, ::3]", &arena) else {
            panic!("expected subscript");
        };
        let Expr::Tuple(index) = sub.index else {
            panic!("expected tuple index");
        };
        assert!(matches!(index.elements[0], Expr::Slice(s) if s.lower.is_some() && s.step.is_none()));
        assert!(matches!(index.elements[1], Expr::Slice(s) if s.lower.is_none() && s.step.is_some()));

        assert!(matches!(parse("a[:]", &arena), Expr::Subscript(_)));
        assert!(Parser::expression("a[]", &arena).is_err());
    }

    #[test]
    fn attribute_requires_identifier() {
        let arena = Bump::new();
        assert!(matches!(parse("a.b.c", &arena), Expr::Attribute(_)));
        let error = Parser::expression("a.if", &arena).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::ExpectedIdentifier);
    }

    #[test]
    fn yield_only_in_parens() {
        let arena = Bump::new();
        assert!(matches!(parse("(yield)", &arena), Expr::Yield(y) if y.value.is_none()));
        assert!(matches!(parse("(yield from x)", &arena), Expr::YieldFrom(_)));
        assert!(Parser::expression("1 + yield", &arena).is_err());
    }

    #[test]
    fn literals() {
        let arena = Bump::new();
        assert_eq!(
            parse("0x10", &arena).as_constant(),
            Some(&Constant::Int("16"))
        );
        assert_eq!(
            parse("1.5", &arena).as_constant(),
            Some(&Constant::Float(1.5))
        );
        assert_eq!(
            parse("2j", &arena).as_constant(),
            Some(&Constant::Complex(2.0))
        );
        assert_eq!(parse("...", &arena).as_constant(), Some(&Constant::Ellipsis));
        assert_eq!(parse("None", &arena).as_constant(), Some(&Constant::None));
    }
}
