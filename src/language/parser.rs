use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};
use std::rc::Rc;

/// Parses a whole program with a fresh id allocator.
pub fn parse_program(source: &str) -> Result<Program, SyntaxErrors> {
    let mut ids = NodeIds::new();
    parse_with_ids(source, &mut ids)
}

/// Parses a program, drawing expression ids from `ids`.
pub fn parse_with_ids(source: &str, ids: &mut NodeIds) -> Result<Program, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens, ids).parse()
}

/// Nesting depths that decide whether `break` and `return` are allowed.
/// Copied into each recursive step, never shared.
#[derive(Clone, Copy, Debug, Default)]
struct Context {
    loop_depth: u32,
    fun_depth: u32,
}

impl Context {
    fn in_loop(self) -> Self {
        Self {
            loop_depth: self.loop_depth + 1,
            ..self
        }
    }

    // A function body starts outside of any loop: `break` cannot cross a call.
    fn in_function(self) -> Self {
        Self {
            loop_depth: 0,
            fun_depth: self.fun_depth + 1,
        }
    }
}

struct Parser<'ids> {
    tokens: Vec<Token>,
    pos: usize,
    ids: &'ids mut NodeIds,
    errors: Vec<SyntaxError>,
}

impl<'ids> Parser<'ids> {
    fn new(mut tokens: Vec<Token>, ids: &'ids mut NodeIds) -> Self {
        if tokens.last().map(|t| t.kind != TokenKind::Eof).unwrap_or(true) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::new(end.end, end.end, end.line.max(1)),
            });
        }
        Self {
            tokens,
            pos: 0,
            ids,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Program, SyntaxErrors> {
        let statements = self.parse_declarations(Context::default(), &[]);

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    /// Parses declarations until one of `terminators` (or end of input) is reached.
    /// The terminator itself is left for the caller.
    fn parse_declarations(&mut self, ctx: Context, terminators: &[TokenKind]) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_eof() && !terminators.iter().any(|kind| self.check(kind)) {
            let before = self.pos;
            match self.parse_declaration(ctx) {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                    if self.pos == before && !terminators.iter().any(|kind| self.check(kind)) {
                        self.advance();
                    }
                }
            }
        }
        statements
    }

    fn parse_declaration(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        if self.matches(&TokenKind::Var) {
            return self.parse_var_decl().map(Stmt::Var);
        }
        if self.matches(&TokenKind::Fun) {
            return self.parse_fun_decl(ctx).map(|decl| Stmt::Fun(Rc::new(decl)));
        }
        self.parse_statement(ctx)
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, SyntaxError> {
        let start = self.previous_span();
        let name = self.expect_identifier("A variable name should follow `var`")?;
        self.expect(&TokenKind::Eq, "Expected `=` after the variable name")?;
        let init = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semi, "Missing `;` after variable declaration")?;
        Ok(VarDecl {
            name,
            init,
            span: start.union(end),
        })
    }

    fn parse_fun_decl(&mut self, ctx: Context) -> Result<FunDecl, SyntaxError> {
        let start = self.previous_span();
        let name = self.expect_identifier("A function name should follow `fun`")?;
        self.expect(&TokenKind::LParen, "Expected `(` after the function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier("Function parameters must be identifiers")?);
                if self.matches(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RParen, "Expected `)` after the parameter list")?;
        let body_start = self.expect(
            &TokenKind::Do,
            "Expected a `do ... end` block after the parameter list",
        )?;
        let statements = self.parse_declarations(ctx.in_function(), &[TokenKind::End]);
        let end = self.expect(&TokenKind::End, "Missing `end` after function body")?;
        Ok(FunDecl {
            name,
            params,
            body: Block {
                statements,
                span: body_start.union(end),
            },
            span: start.union(end),
        })
    }

    fn parse_statement(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        if self.matches(&TokenKind::Do) {
            let start = self.previous_span();
            let statements = self.parse_declarations(ctx, &[TokenKind::End]);
            let end = self.expect(&TokenKind::End, "Missing `end` after block")?;
            return Ok(Stmt::Block(Block {
                statements,
                span: start.union(end),
            }));
        }
        if self.matches(&TokenKind::If) {
            return self.parse_if(ctx);
        }
        if self.matches(&TokenKind::While) {
            return self.parse_while(ctx);
        }
        if self.matches(&TokenKind::For) {
            return self.parse_for(ctx);
        }
        if self.matches(&TokenKind::Break) {
            let span = self.previous_span();
            if ctx.loop_depth == 0 {
                self.report(
                    SyntaxError::new("`break` outside of a loop", span)
                        .with_help("`break` may only appear inside a `while` or `for` body"),
                );
            }
            self.expect(&TokenKind::Semi, "Missing `;` after `break`")?;
            return Ok(Stmt::Break(span));
        }
        if self.matches(&TokenKind::Return) {
            return self.parse_return(ctx);
        }
        if self.matches(&TokenKind::Print) {
            let start = self.previous_span();
            let expr = self.parse_expression()?;
            let end = self.expect(&TokenKind::Semi, "Missing `;` after print statement")?;
            return Ok(Stmt::Print(PrintStmt {
                expr,
                span: start.union(end),
            }));
        }
        self.parse_expression_statement().map(Stmt::Expr)
    }

    fn parse_expression_statement(&mut self) -> Result<ExprStmt, SyntaxError> {
        let expr = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semi, "Missing `;` after expression")?;
        let span = expr.span().union(end);
        Ok(ExprStmt { expr, span })
    }

    fn parse_if(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        let start = self.previous_span();
        let condition = self.parse_condition("if")?;
        let then_start = self.current_span();
        let then_statements =
            self.parse_declarations(ctx, &[TokenKind::Else, TokenKind::End]);
        let then_branch = Stmt::Block(Block {
            statements: then_statements,
            span: then_start.union(self.current_span()),
        });
        let else_branch = if self.matches(&TokenKind::Else) {
            let else_start = self.previous_span();
            let statements = self.parse_declarations(ctx, &[TokenKind::End]);
            Some(Box::new(Stmt::Block(Block {
                statements,
                span: else_start.union(self.current_span()),
            })))
        } else {
            None
        };
        let end = self.expect(&TokenKind::End, "Missing `end` after if statement")?;
        Ok(Stmt::If(IfStmt {
            condition,
            then_branch: Box::new(then_branch),
            else_branch,
            span: start.union(end),
        }))
    }

    fn parse_while(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        let start = self.previous_span();
        let condition = self.parse_condition("while")?;
        let body_start = self.current_span();
        let statements = self.parse_declarations(ctx.in_loop(), &[TokenKind::End]);
        let end = self.expect(&TokenKind::End, "Missing `end` after while body")?;
        Ok(Stmt::While(WhileStmt {
            condition,
            body: Box::new(Stmt::Block(Block {
                statements,
                span: body_start.union(end),
            })),
            span: start.union(end),
        }))
    }

    /// `for (init; cond; incr) body end` becomes
    /// `do init; while (cond) do body incr; end end`.
    fn parse_for(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        let start = self.previous_span();
        self.expect(&TokenKind::LParen, "Expected `(` after `for`")?;

        let init = if self.matches(&TokenKind::Var) {
            Some(Stmt::Var(self.parse_var_decl()?))
        } else if self.matches(&TokenKind::Semi) {
            None
        } else {
            Some(Stmt::Expr(self.parse_expression_statement()?))
        };

        let condition = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semi, "Missing `;` after the for condition")?;

        let increment = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen, "Expected `)` after the for clauses")?;

        let body_start = self.current_span();
        let mut statements = self.parse_declarations(ctx.in_loop(), &[TokenKind::End]);
        let end = self.expect(&TokenKind::End, "Missing `end` after for body")?;
        let span = start.union(end);

        if let Some(increment) = increment {
            let incr_span = increment.span();
            statements.push(Stmt::Expr(ExprStmt {
                expr: increment,
                span: incr_span,
            }));
        }
        let condition =
            condition.unwrap_or_else(|| Expr::Literal(Literal::Bool(true, start)));
        let looped = Stmt::While(WhileStmt {
            condition,
            body: Box::new(Stmt::Block(Block {
                statements,
                span: body_start.union(end),
            })),
            span,
        });

        Ok(match init {
            Some(init) => Stmt::Block(Block {
                statements: vec![init, looped],
                span,
            }),
            None => looped,
        })
    }

    fn parse_return(&mut self, ctx: Context) -> Result<Stmt, SyntaxError> {
        let start = self.previous_span();
        if ctx.fun_depth == 0 {
            self.report(
                SyntaxError::new("`return` outside of a function", start)
                    .with_help("`return` may only appear inside a `fun` body"),
            );
        }
        if self.matches(&TokenKind::Semi) {
            return Ok(Stmt::Return(ReturnStmt {
                value: None,
                span: start.union(self.previous_span()),
            }));
        }
        let value = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semi, "Missing `;` after return value")?;
        Ok(Stmt::Return(ReturnStmt {
            value: Some(value),
            span: start.union(end),
        }))
    }

    fn parse_condition(&mut self, keyword: &str) -> Result<Expr, SyntaxError> {
        self.expect(
            &TokenKind::LParen,
            &format!("Expected `(` after `{keyword}`"),
        )?;
        let condition = self.parse_expression()?;
        self.expect(
            &TokenKind::RParen,
            &format!("Expected `)` after the {keyword} condition"),
        )?;
        Ok(condition)
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, SyntaxError> {
        let target = self.parse_binary(0)?;
        if !self.matches(&TokenKind::Eq) {
            return Ok(target);
        }
        let eq_span = self.previous_span();
        let value = self.parse_assignment()?;
        match target {
            Expr::Ident { name, .. } => {
                let span = name.span.union(value.span());
                Ok(Expr::Assign {
                    id: self.ids.fresh(),
                    name,
                    value: Box::new(value),
                    span,
                })
            }
            _ => Err(SyntaxError::new("Invalid assignment target", eq_span)
                .with_help("only a variable name can appear on the left of `=`")),
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let (op, prec) = match self.current_binary_op() {
                Some(info) => info,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span().union(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = if self.matches(&TokenKind::Minus) {
            UnaryOp::Neg
        } else if self.matches(&TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_call();
        };
        let start = self.previous_span();
        let expr = self.parse_unary()?;
        let span = start.union(expr.span());
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
            span,
        })
    }

    fn parse_call(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        while self.matches(&TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if self.matches(&TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
            }
            let end = self.expect(&TokenKind::RParen, "Expected `)` after arguments")?;
            let span = expr.span().union(end);
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
                span,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.current().clone();
        let literal = match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                return Ok(Expr::Ident {
                    id: self.ids.fresh(),
                    name: Identifier {
                        name,
                        span: token.span,
                    },
                });
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "Expected a closing `)`")?;
                return Ok(expr);
            }
            TokenKind::Integer(value) => Literal::Int(value, token.span),
            TokenKind::Double(value) => Literal::Double(value, token.span),
            TokenKind::String(value) => Literal::String(value, token.span),
            TokenKind::True => Literal::Bool(true, token.span),
            TokenKind::False => Literal::Bool(false, token.span),
            TokenKind::Nil => Literal::Nil(token.span),
            other => {
                return Err(self.error_here(&format!("Expected an expression, found {other}")));
            }
        };
        self.advance();
        Ok(Expr::Literal(literal))
    }

    fn current_binary_op(&self) -> Option<(BinaryOp, u8)> {
        match self.current().kind {
            TokenKind::PlusPlus => Some((BinaryOp::Concat, 1)),
            TokenKind::Or => Some((BinaryOp::Or, 2)),
            TokenKind::And => Some((BinaryOp::And, 3)),
            TokenKind::EqEq => Some((BinaryOp::Eq, 4)),
            TokenKind::BangEq => Some((BinaryOp::NotEq, 4)),
            TokenKind::Gt => Some((BinaryOp::Gt, 5)),
            TokenKind::GtEq => Some((BinaryOp::GtEq, 5)),
            TokenKind::Lt => Some((BinaryOp::Lt, 5)),
            TokenKind::LtEq => Some((BinaryOp::LtEq, 5)),
            TokenKind::Plus => Some((BinaryOp::Add, 6)),
            TokenKind::Minus => Some((BinaryOp::Sub, 6)),
            TokenKind::Star => Some((BinaryOp::Mul, 7)),
            TokenKind::Slash => Some((BinaryOp::Div, 7)),
            TokenKind::SlashSlash => Some((BinaryOp::FloorDiv, 7)),
            TokenKind::Percent => Some((BinaryOp::Rem, 7)),
            _ => None,
        }
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<Identifier, SyntaxError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Identifier {
                    name,
                    span: token.span,
                })
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: &TokenKind, msg: &str) -> Result<Span, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            Err(self.error_here(msg))
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        if !self.is_eof() {
            self.pos += 1;
        }
        &self.tokens[index]
    }

    fn is_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn previous_span(&self) -> Span {
        if self.pos == 0 {
            self.current_span()
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message.to_string(), self.current_span())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    /// Skips to the next statement boundary: just past a `;`, or before a
    /// token that starts a statement or closes a block.
    fn synchronize(&mut self) {
        while !self.is_eof() {
            if self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::Semi {
                return;
            }
            let kind = &self.current().kind;
            if kind.starts_statement() || matches!(kind, TokenKind::End | TokenKind::Else) {
                return;
            }
            self.advance();
        }
    }
}
