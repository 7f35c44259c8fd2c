//! Parser for the Nix expression language.
//!
//! A recursive-descent parser with one precedence function per operator
//! level. Errors caused by running out of input are flagged so callers can
//! tell incomplete input from invalid input.

use std::rc::Rc;

use nixkernel_foundation::{Error, ErrorKind, Result};

use crate::ast::{
    AttrDef, AttrName, AttrValue, BinaryOp, Bindings, DynamicAttr, Expr, ExprKind, ExprRef,
    Formal, Lambda, Param, ReplInput, StrPart,
};
use crate::lexer::Lexer;
use crate::span::{SourceId, Span};
use crate::token::{StrSegment, Token, TokenKind};

/// Deepest nesting of sub-expressions the parser accepts. Operator chains
/// count one level per operator, since evaluating them recurses as well.
pub const MAX_NESTING: usize = 128;

/// Parser for Nix source code.
pub struct Parser<'src> {
    /// The lexer providing tokens.
    lexer: Lexer<'src>,
    /// Current token (lookahead).
    current: Token,
    /// Source text (for error messages).
    source: &'src str,
    /// Source id stamped on spans.
    source_id: SourceId,
    /// Set when parsing the inside of `${ ... }`, where running out of
    /// tokens does not mean the input is incomplete.
    nested: bool,
    /// Current sub-expression nesting.
    depth: usize,
}

impl<'src> Parser<'src> {
    /// Creates a new parser for interactive input.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self::with_source_id(source, SourceId::INTERACTIVE)
    }

    /// Creates a parser whose spans belong to the given source.
    #[must_use]
    pub fn with_source_id(source: &'src str, source_id: SourceId) -> Self {
        Self::from_lexer(Lexer::new(source).with_source_id(source_id), source, source_id, false)
    }

    fn from_lexer(lexer: Lexer<'src>, source: &'src str, source_id: SourceId, nested: bool) -> Self {
        let mut parser = Self {
            lexer,
            current: Token::new(TokenKind::Eof, Span::at_start()),
            source,
            source_id,
            nested,
            depth: 0,
        };
        parser.advance();
        parser
    }

    /// Parses a single expression that must span the whole input.
    ///
    /// # Errors
    /// Returns a parse error if the source is not one complete expression.
    pub fn parse(&mut self) -> Result<ExprRef> {
        let expr = self.parse_expr()?;
        self.expect_eof()?;
        Ok(expr)
    }

    /// Parses interactive input: either `name = expr;` bindings or one
    /// expression.
    ///
    /// # Errors
    /// Returns a parse error if the input is neither form.
    pub fn parse_repl_input(&mut self) -> Result<ReplInput> {
        let starts_binding = matches!(self.current.kind, TokenKind::Ident(_))
            && self.peek_kinds(1).first() == Some(&TokenKind::Assign);
        if !starts_binding {
            return self.parse().map(ReplInput::Expr);
        }

        let mut bindings = Vec::new();
        loop {
            let TokenKind::Ident(name) = self.current.kind.clone() else {
                return Err(self.unexpected());
            };
            self.advance();
            self.expect(&TokenKind::Assign)?;
            let value = self.parse_expr()?;
            bindings.push((name.clone(), named(value, &name)));
            if self.current.kind == TokenKind::Semicolon {
                self.advance();
            }
            if self.current.kind == TokenKind::Eof {
                break;
            }
        }
        Ok(ReplInput::Bindings(bindings))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Parses a full expression, including lambdas and keyword forms.
    fn parse_expr(&mut self) -> Result<ExprRef> {
        self.nested(Self::parse_expr_form)
    }

    fn parse_expr_form(&mut self) -> Result<ExprRef> {
        let start = self.current.span;
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                match self.peek_kinds(1).first() {
                    Some(TokenKind::Colon) => {
                        self.advance();
                        self.advance();
                        let body = self.parse_expr()?;
                        Ok(lambda(Param::Ident(name), body, start))
                    }
                    Some(TokenKind::At) => {
                        self.advance();
                        self.advance();
                        self.parse_pattern_lambda(Some(name), start)
                    }
                    _ => self.parse_implies(),
                }
            }
            TokenKind::LBrace if self.looks_like_pattern() => self.parse_pattern_lambda(None, start),
            TokenKind::Let => self.parse_let(),
            TokenKind::With => {
                self.advance();
                let scope = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                let body = self.parse_expr()?;
                let span = start.to(body.span);
                Ok(Expr::new(ExprKind::With { scope, body }, span))
            }
            TokenKind::Assert => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                let body = self.parse_expr()?;
                let span = start.to(body.span);
                Ok(Expr::new(ExprKind::Assert { cond, body }, span))
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Then)?;
                let then_branch = self.parse_expr()?;
                self.expect(&TokenKind::Else)?;
                let else_branch = self.parse_expr()?;
                let span = start.to(else_branch.span);
                Ok(Expr::new(
                    ExprKind::If {
                        cond,
                        then_branch,
                        else_branch,
                    },
                    span,
                ))
            }
            _ => self.parse_implies(),
        }
    }

    /// Decides whether a `{` starts a pattern lambda rather than a set.
    fn looks_like_pattern(&self) -> bool {
        let ahead = self.peek_kinds(3);
        match ahead.as_slice() {
            [TokenKind::RBrace, next, ..] => matches!(next, TokenKind::Colon | TokenKind::At),
            [TokenKind::Ellipsis, ..] => true,
            [TokenKind::Ident(_), TokenKind::Comma | TokenKind::Question, ..] => true,
            [TokenKind::Ident(_), TokenKind::RBrace, next] => {
                matches!(next, TokenKind::Colon | TokenKind::At)
            }
            _ => false,
        }
    }

    /// Parses `{ formals } [@ name]: body`; `bind` is a leading `name @`.
    fn parse_pattern_lambda(&mut self, bind: Option<String>, start: Span) -> Result<ExprRef> {
        self.expect(&TokenKind::LBrace)?;
        let mut formals: Vec<Formal> = Vec::new();
        let mut ellipsis = false;
        loop {
            match &self.current.kind {
                TokenKind::RBrace => break,
                TokenKind::Ellipsis => {
                    self.advance();
                    ellipsis = true;
                    break;
                }
                TokenKind::Ident(name) => {
                    let name = name.clone();
                    if formals.iter().any(|f| f.name == name) {
                        return Err(
                            self.error(&format!("duplicate formal function argument '{name}'"))
                        );
                    }
                    self.advance();
                    let default = if self.current.kind == TokenKind::Question {
                        self.advance();
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    formals.push(Formal { name, default });
                    if self.current.kind == TokenKind::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.expect(&TokenKind::RBrace)?;

        let bind = if bind.is_some() {
            bind
        } else if self.current.kind == TokenKind::At {
            self.advance();
            match self.current.kind.clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    Some(name)
                }
                _ => return Err(self.unexpected()),
            }
        } else {
            None
        };

        self.expect(&TokenKind::Colon)?;
        let body = self.parse_expr()?;
        Ok(lambda(
            Param::Pattern {
                formals,
                ellipsis,
                bind,
            },
            body,
            start,
        ))
    }

    /// Parses `let bindings in body`.
    fn parse_let(&mut self) -> Result<ExprRef> {
        let start = self.current.span;
        self.expect(&TokenKind::Let)?;
        if self.current.kind == TokenKind::LBrace {
            return Err(self.error("legacy 'let { ... }' syntax is not supported"));
        }
        let bindings = self.parse_bindings(&TokenKind::In)?;
        if !bindings.dynamic.is_empty() {
            return Err(self.error_at(start, "dynamic attributes not allowed in let"));
        }
        self.expect(&TokenKind::In)?;
        let body = self.parse_expr()?;
        let span = start.to(body.span);
        Ok(Expr::new(
            ExprKind::Let {
                bindings: Rc::new(bindings),
                body,
            },
            span,
        ))
    }

    // =========================================================================
    // Operators, loosest first
    // =========================================================================

    fn parse_implies(&mut self) -> Result<ExprRef> {
        let lhs = self.parse_or()?;
        if self.current.kind == TokenKind::Implies {
            self.advance();
            let rhs = self.nested(Self::parse_implies)?;
            return Ok(binary(BinaryOp::Implies, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<ExprRef> {
        self.left_chain(Self::parse_and, |kind| (*kind == TokenKind::Or).then_some(BinaryOp::Or))
    }

    fn parse_and(&mut self) -> Result<ExprRef> {
        self.left_chain(Self::parse_equality, |kind| (*kind == TokenKind::And).then_some(BinaryOp::And))
    }

    fn parse_equality(&mut self) -> Result<ExprRef> {
        let lhs = self.parse_comparison()?;
        let op = match self.current.kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_comparison()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_comparison(&mut self) -> Result<ExprRef> {
        let lhs = self.parse_update()?;
        let op = match self.current.kind {
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::GtEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_update()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_update(&mut self) -> Result<ExprRef> {
        let lhs = self.parse_not()?;
        if self.current.kind == TokenKind::Update {
            self.advance();
            let rhs = self.nested(Self::parse_update)?;
            return Ok(binary(BinaryOp::Update, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<ExprRef> {
        if self.current.kind == TokenKind::Not {
            let start = self.current.span;
            self.advance();
            let operand = self.nested(Self::parse_not)?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Not(operand), span));
        }
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<ExprRef> {
        self.left_chain(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<ExprRef> {
        self.left_chain(Self::parse_concat, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn parse_concat(&mut self) -> Result<ExprRef> {
        let lhs = self.parse_has_attr()?;
        if self.current.kind == TokenKind::Concat {
            self.advance();
            let rhs = self.nested(Self::parse_concat)?;
            return Ok(binary(BinaryOp::Concat, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_has_attr(&mut self) -> Result<ExprRef> {
        self.scoped(|p| {
            let mut target = p.parse_negate()?;
            while p.current.kind == TokenKind::Question {
                p.enter()?;
                p.advance();
                let end = p.current.span;
                let path = p.parse_attr_path()?;
                let span = target.span.to(end);
                target = Expr::new(ExprKind::HasAttr { target, path }, span);
            }
            Ok(target)
        })
    }

    fn parse_negate(&mut self) -> Result<ExprRef> {
        if self.current.kind == TokenKind::Minus {
            let start = self.current.span;
            self.advance();
            let operand = self.nested(Self::parse_negate)?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Negate(operand), span));
        }
        self.parse_application()
    }

    fn parse_application(&mut self) -> Result<ExprRef> {
        self.scoped(|p| {
            let mut func = p.parse_select()?;
            while p.current.starts_argument() {
                p.enter()?;
                let arg = p.parse_select()?;
                let span = func.span.to(arg.span);
                func = Expr::new(ExprKind::Apply { func, arg }, span);
            }
            Ok(func)
        })
    }

    fn parse_select(&mut self) -> Result<ExprRef> {
        let target = self.parse_simple()?;
        if self.current.kind != TokenKind::Dot {
            return Ok(target);
        }
        self.advance();
        let end = self.current.span;
        let path = self.parse_attr_path()?;
        let default = if self.current.kind == TokenKind::OrKw {
            self.advance();
            Some(self.nested(Self::parse_select)?)
        } else {
            None
        };
        let span = target.span.to(default.as_ref().map_or(end, |d| d.span));
        Ok(Expr::new(
            ExprKind::Select {
                target,
                path,
                default,
            },
            span,
        ))
    }

    fn parse_simple(&mut self) -> Result<ExprRef> {
        let span = self.current.span;
        let kind = match self.current.kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                ExprKind::Int(n)
            }
            TokenKind::Float(n) => {
                self.advance();
                ExprKind::Float(n)
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Var(name)
            }
            TokenKind::Str(segments) | TokenKind::IndStr(segments) => {
                self.advance();
                ExprKind::Str(self.parse_string_parts(&segments)?)
            }
            TokenKind::Path(path) => {
                self.advance();
                ExprKind::Path(path)
            }
            TokenKind::SearchPath(name) => {
                self.advance();
                ExprKind::SearchPath(name)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while self.current.kind != TokenKind::RBracket {
                    if !self.current.starts_argument() {
                        return Err(self.unexpected());
                    }
                    elements.push(self.nested(Self::parse_select)?);
                }
                let end = self.current.span;
                self.advance();
                return Ok(Expr::new(ExprKind::List(elements), span.to(end)));
            }
            TokenKind::LBrace => return self.parse_attr_set(false),
            TokenKind::Rec => {
                self.advance();
                if self.current.kind != TokenKind::LBrace {
                    return Err(self.unexpected());
                }
                return self.parse_attr_set(true);
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Expr::new(kind, span))
    }

    /// Parses `{ bindings }` with the cursor on `{`.
    fn parse_attr_set(&mut self, recursive: bool) -> Result<ExprRef> {
        let start = self.current.span;
        self.expect(&TokenKind::LBrace)?;
        let bindings = self.parse_bindings(&TokenKind::RBrace)?;
        let end = self.current.span;
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::AttrSet {
                recursive,
                bindings: Rc::new(bindings),
            },
            start.to(end),
        ))
    }

    /// Resolves string segments, parsing each interpolation.
    fn parse_string_parts(&self, segments: &[StrSegment]) -> Result<Vec<StrPart>> {
        segments
            .iter()
            .map(|segment| match segment {
                StrSegment::Literal(text) => Ok(StrPart::Literal(text.clone())),
                StrSegment::Interpolation {
                    start,
                    end,
                    line,
                    column,
                } => {
                    let lexer = Lexer::with_range(self.source, *start, *end, *line, *column)
                        .with_source_id(self.source_id);
                    let mut inner = Self::from_lexer(lexer, self.source, self.source_id, true);
                    inner.depth = self.depth;
                    inner.nested(Self::parse).map(StrPart::Interpolation)
                }
            })
            .collect()
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Parses attribute definitions up to (not including) `closing`.
    fn parse_bindings(&mut self, closing: &TokenKind) -> Result<Bindings> {
        let mut bindings = Bindings::default();
        while std::mem::discriminant(&self.current.kind) != std::mem::discriminant(closing) {
            if self.current.kind == TokenKind::Inherit {
                self.parse_inherit(&mut bindings)?;
                continue;
            }
            let span = self.current.span;
            let path = self.parse_attr_path()?;
            self.expect(&TokenKind::Assign)?;
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Semicolon)?;
            self.insert_attr(&mut bindings, &path, value, span)?;
        }
        Ok(bindings)
    }

    /// Parses `inherit a b;` or `inherit (e) a b;`.
    fn parse_inherit(&mut self, bindings: &mut Bindings) -> Result<()> {
        self.expect(&TokenKind::Inherit)?;
        let source = if self.current.kind == TokenKind::LParen {
            self.advance();
            let from = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            bindings.inherit_sources.push(from);
            Some(bindings.inherit_sources.len() - 1)
        } else {
            None
        };
        while self.current.kind != TokenKind::Semicolon {
            let span = self.current.span;
            let name = match &self.current.kind {
                TokenKind::Ident(name) => name.clone(),
                TokenKind::OrKw => "or".to_string(),
                TokenKind::Str(segments) => match segments.as_slice() {
                    [StrSegment::Literal(text)] => text.clone(),
                    _ => return Err(self.error("dynamic attributes not allowed in inherit")),
                },
                _ => return Err(self.unexpected()),
            };
            self.advance();
            if bindings.get(&name).is_some() {
                return Err(self.error_at(span, &format!("attribute '{name}' already defined")));
            }
            let value = source.map_or(AttrValue::Inherit, AttrValue::InheritFrom);
            bindings.attrs.push(AttrDef { name, value, span });
        }
        self.advance();
        Ok(())
    }

    /// Parses `a.b."c".${d}`.
    fn parse_attr_path(&mut self) -> Result<Vec<AttrName>> {
        let mut path = vec![self.parse_attr_name()?];
        while self.current.kind == TokenKind::Dot {
            if path.len() >= MAX_NESTING {
                return Err(self.error("attribute path is too long"));
            }
            self.advance();
            path.push(self.parse_attr_name()?);
        }
        Ok(path)
    }

    fn parse_attr_name(&mut self) -> Result<AttrName> {
        let span = self.current.span;
        match self.current.kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(AttrName::Static(name))
            }
            TokenKind::OrKw => {
                self.advance();
                Ok(AttrName::Static("or".into()))
            }
            TokenKind::Str(segments) => {
                self.advance();
                let parts = self.parse_string_parts(&segments)?;
                match parts.as_slice() {
                    [StrPart::Literal(text)] => Ok(AttrName::Static(text.clone())),
                    _ => Ok(AttrName::Dynamic(Expr::new(ExprKind::Str(parts), span))),
                }
            }
            TokenKind::DollarBrace => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RBrace)?;
                Ok(AttrName::Dynamic(expr))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Inserts `path = value` into `bindings`, merging nested paths.
    fn insert_attr(
        &self,
        bindings: &mut Bindings,
        path: &[AttrName],
        value: ExprRef,
        span: Span,
    ) -> Result<()> {
        let Some((head, rest)) = path.split_first() else {
            return Err(self.error_at(span, "empty attribute path"));
        };
        match head {
            AttrName::Static(name) => {
                let existing = bindings.attrs.iter().position(|def| &def.name == name);
                match (existing, rest.is_empty()) {
                    (None, true) => {
                        bindings.attrs.push(AttrDef {
                            name: name.clone(),
                            value: AttrValue::Expr(named(value, name)),
                            span,
                        });
                    }
                    (None, false) => {
                        let mut nested = Bindings::default();
                        self.insert_attr(&mut nested, rest, value, span)?;
                        bindings.attrs.push(AttrDef {
                            name: name.clone(),
                            value: AttrValue::Nested(Rc::new(nested)),
                            span,
                        });
                    }
                    (Some(index), false) => {
                        let def = &mut bindings.attrs[index];
                        let literal = match &def.value {
                            AttrValue::Expr(expr) => match &expr.kind {
                                ExprKind::AttrSet {
                                    recursive: false,
                                    bindings: inner,
                                } => Some(Rc::clone(inner)),
                                _ => None,
                            },
                            _ => None,
                        };
                        if let Some(inner) = literal {
                            def.value = AttrValue::Nested(inner);
                        }
                        match &mut def.value {
                            AttrValue::Nested(nested) => {
                                self.insert_attr(Rc::make_mut(nested), rest, value, span)?;
                            }
                            _ => {
                                return Err(self.error_at(
                                    span,
                                    &format!("attribute '{name}' already defined"),
                                ));
                            }
                        }
                    }
                    (Some(_), true) => {
                        return Err(
                            self.error_at(span, &format!("attribute '{name}' already defined"))
                        );
                    }
                }
            }
            AttrName::Dynamic(name) => {
                let value = if rest.is_empty() {
                    value
                } else {
                    let mut nested = Bindings::default();
                    self.insert_attr(&mut nested, rest, value, span)?;
                    Expr::new(
                        ExprKind::AttrSet {
                            recursive: false,
                            bindings: Rc::new(nested),
                        },
                        span,
                    )
                };
                bindings.dynamic.push(DynamicAttr {
                    name: name.clone(),
                    value,
                    span,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    /// Descends one level, failing once the input nests too deeply.
    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `parse` and restores the nesting depth it started at.
    fn scoped<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let base = self.depth;
        let result = parse(self);
        self.depth = base;
        result
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scoped(|p| {
            p.enter()?;
            parse(p)
        })
    }

    /// Parses a left-associative chain of `operand`s joined by operators.
    fn left_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<ExprRef>,
        operator: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<ExprRef> {
        self.scoped(|p| {
            let mut lhs = operand(p)?;
            while let Some(op) = operator(&p.current.kind) {
                p.enter()?;
                p.advance();
                let rhs = operand(p)?;
                lhs = binary(op, lhs, rhs);
            }
            Ok(lhs)
        })
    }

    // =========================================================================
    // Token handling
    // =========================================================================

    /// Advances to the next non-comment token.
    fn advance(&mut self) {
        loop {
            self.current = self.lexer.next_token();
            if !self.current.kind.is_trivia() {
                break;
            }
        }
    }

    /// Returns up to `n` upcoming non-comment token kinds after the current
    /// one, without consuming them.
    fn peek_kinds(&self, n: usize) -> Vec<TokenKind> {
        let mut lexer = self.lexer.clone();
        let mut kinds = Vec::with_capacity(n);
        while kinds.len() < n {
            let token = lexer.next_token();
            if token.kind.is_trivia() {
                continue;
            }
            let done = token.kind == TokenKind::Eof;
            kinds.push(token.kind);
            if done {
                break;
            }
        }
        kinds
    }

    /// Expects the current token to be of a specific kind, then advances.
    fn expect(&mut self, expected: &TokenKind) -> Result<Span> {
        let matches =
            std::mem::discriminant(&self.current.kind) == std::mem::discriminant(expected);
        if matches {
            let span = self.current.span;
            self.advance();
            Ok(span)
        } else {
            let mut err = self.unexpected();
            if let ErrorKind::ParseError { message, .. } = &mut err.kind {
                message.push_str(", expecting ");
                message.push_str(&expected.name());
            }
            Err(err)
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.current.kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Builds the error for an unexpected current token.
    fn unexpected(&self) -> Error {
        let (message, at_end) = match &self.current.kind {
            TokenKind::Eof => ("unexpected end of file".to_string(), true),
            TokenKind::Error { message, at_end } => (message.clone(), *at_end),
            other => (format!("unexpected {}", other.name()), false),
        };
        self.build_error(self.current.span, message, at_end && !self.nested)
    }

    /// Creates a parse error at the current position.
    fn error(&self, message: &str) -> Error {
        self.error_at(self.current.span, message)
    }

    /// Creates a parse error at a specific span.
    fn error_at(&self, span: Span, message: &str) -> Error {
        self.build_error(span, message.to_string(), false)
    }

    fn build_error(&self, span: Span, message: String, at_end: bool) -> Error {
        Error::new(ErrorKind::ParseError {
            message,
            line: span.line,
            column: span.column,
            context: self.context_at(span),
            at_end,
        })
    }

    /// Gets the source line containing a span.
    fn context_at(&self, span: Span) -> String {
        let start = span.start.min(self.source.len());
        let line_start = self.source[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |i| start + i);
        self.source[line_start..line_end].to_string()
    }
}

fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    let span = lhs.span.to(rhs.span);
    Expr::new(ExprKind::Binary { op, lhs, rhs }, span)
}

fn lambda(param: Param, body: ExprRef, start: Span) -> ExprRef {
    let span = start.to(body.span);
    Expr::new(
        ExprKind::Lambda(Rc::new(Lambda {
            param,
            body,
            name: None,
            span,
        })),
        span,
    )
}

/// Records the binding name on a freshly parsed lambda.
fn named(mut value: ExprRef, name: &str) -> ExprRef {
    if let Some(expr) = Rc::get_mut(&mut value) {
        if let ExprKind::Lambda(lambda) = &mut expr.kind {
            if let Some(lambda) = Rc::get_mut(lambda) {
                lambda.name = Some(name.to_string());
            }
        }
    }
    value
}

/// Parses source code into a single expression.
///
/// # Errors
/// Returns an error if the source cannot be parsed.
pub fn parse(source: &str) -> Result<ExprRef> {
    Parser::new(source).parse()
}

/// Parses interactive input.
///
/// # Errors
/// Returns an error if the source cannot be parsed.
pub fn parse_repl_input(source: &str) -> Result<ReplInput> {
    Parser::new(source).parse_repl_input()
}
