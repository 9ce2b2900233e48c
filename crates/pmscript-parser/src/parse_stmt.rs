//! Statement parsing.

use pmscript_lexer::token::TokenKind;
use pmscript_types::ast::*;
use pmscript_types::DiagnosticCode;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// Parse a block of statements: `{ stmts... }`
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            let before = self.position();
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(before),
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Block { stmts, span })
    }

    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            TokenKind::Semicolon => {
                self.advance();
                Some(Stmt::Empty(start))
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_var_decl()?;
                self.expect_statement_end();
                Some(Stmt::Var(decl))
            }
            TokenKind::Function => self.parse_function_declaration(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Do => self.parse_do_while_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Throw => self.parse_throw_stmt(),
            TokenKind::Try => self.parse_try_stmt(),
            TokenKind::Break => {
                self.advance();
                self.expect_statement_end();
                Some(Stmt::Break(start))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_statement_end();
                Some(Stmt::Continue(start))
            }
            TokenKind::Else | TokenKind::Catch | TokenKind::Finally => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("unexpected '{}'", self.peek_kind()),
                );
                None
            }
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span;
                self.expect_statement_end();
                Some(Stmt::Expr(ExprStmt { expr, span }))
            }
        }
    }

    fn var_kind(&mut self) -> Option<VarKind> {
        let kind = match self.peek_kind() {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => return None,
        };
        self.advance();
        Some(kind)
    }

    /// `let a = 1, b` (without the terminator).
    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let start = self.current_span();
        let kind = self.var_kind()?;
        let first = self.expect_identifier()?;
        self.parse_declarators(kind, first, start)
    }

    /// Parse declarators once the keyword and first name have been consumed.
    fn parse_declarators(
        &mut self,
        kind: VarKind,
        first: Ident,
        start: pmscript_types::Span,
    ) -> Option<VarDecl> {
        let mut declarators = Vec::new();
        let mut name = first;
        loop {
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if kind == VarKind::Const && init.is_none() {
                self.error_at(
                    DiagnosticCode::MISSING_INITIALIZER,
                    "missing initializer in const declaration",
                    name.span,
                );
            }
            let span = match &init {
                Some(e) => name.span.merge(e.span),
                None => name.span,
            };
            declarators.push(Declarator { name, init, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            name = self.expect_identifier()?;
        }
        let span = start.merge(self.previous_span());
        Some(VarDecl {
            kind,
            declarators,
            span,
        })
    }

    fn parse_paren_condition(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Some(condition)
    }

    /// `if (cond) stmt [else stmt]`
    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let condition = self.parse_paren_condition()?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    /// `for (init; test; update) stmt`, `for (x of xs) stmt`, `for (k in obj) stmt`
    fn parse_for_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LParen)?;

        // for (const x of ...) / for (x in ...)
        let decl_start = self.current_span();
        let kind = self.var_kind();
        let init = match kind {
            Some(kind) => {
                let binding = self.expect_identifier()?;
                if self.check_of() || self.check(&TokenKind::In) {
                    return self.parse_for_each(start, Some(kind), binding);
                }
                self.no_in = true;
                let decl = self.parse_declarators(kind, binding, decl_start);
                self.no_in = false;
                Some(ForInit::Var(decl?))
            }
            None => {
                if let TokenKind::Identifier(name) = self.peek_kind().clone() {
                    let is_each = matches!(self.look_ahead(1), TokenKind::In)
                        || matches!(self.look_ahead(1), TokenKind::Identifier(w) if w == "of");
                    if is_each {
                        let span = self.advance().span;
                        return self.parse_for_each(start, None, Ident::new(name, span));
                    }
                }
                if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    self.no_in = true;
                    let expr = self.parse_expression();
                    self.no_in = false;
                    Some(ForInit::Expr(expr?))
                }
            }
        };
        self.expect(&TokenKind::Semicolon)?;

        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.previous_span());
        Some(Stmt::For(ForStmt {
            init,
            test,
            update,
            body,
            span,
        }))
    }

    /// Rest of a `for…of` / `for…in` loop, positioned at `of` or `in`.
    fn parse_for_each(
        &mut self,
        start: pmscript_types::Span,
        kind: Option<VarKind>,
        binding: Ident,
    ) -> Option<Stmt> {
        let is_of = self.check_of();
        self.advance();
        let iterable = self.parse_assignment()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.previous_span());
        let each = ForEachStmt {
            kind,
            binding,
            iterable,
            body,
            span,
        };
        Some(if is_of {
            Stmt::ForOf(each)
        } else {
            Stmt::ForIn(each)
        })
    }

    /// `while (cond) stmt`
    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let condition = self.parse_paren_condition()?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.previous_span());
        Some(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// `do stmt while (cond)`, the trailing `;` is optional.
    fn parse_do_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        let condition = self.parse_paren_condition()?;
        self.eat(&TokenKind::Semicolon);
        let span = start.merge(self.previous_span());
        Some(Stmt::DoWhile(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// `return [expr]`; a line break after `return` ends the statement.
    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let ends_here = self.at_end()
            || self.newline_before()
            || matches!(self.peek_kind(), TokenKind::Semicolon | TokenKind::RBrace);
        let value = if ends_here {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_statement_end();
        let span = start.merge(self.previous_span());
        Some(Stmt::Return(ReturnStmt { value, span }))
    }

    /// `throw expr`
    fn parse_throw_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        if self.newline_before() {
            self.error_at_current(
                DiagnosticCode::ILLEGAL_STATEMENT,
                "illegal newline after throw",
            );
            return None;
        }
        let value = self.parse_expression()?;
        self.expect_statement_end();
        let span = start.merge(self.previous_span());
        Some(Stmt::Throw(ThrowStmt { value, span }))
    }

    /// `try { } [catch [(e)] { }] [finally { }]`
    fn parse_try_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let block = self.parse_block()?;

        let handler = if self.check(&TokenKind::Catch) {
            let catch_start = self.advance().span;
            let param = if self.eat(&TokenKind::LParen) {
                let param = self.expect_identifier()?;
                self.expect(&TokenKind::RParen)?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            let span = catch_start.merge(body.span);
            Some(CatchClause { param, body, span })
        } else {
            None
        };

        let finalizer = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            self.error_at_current(
                DiagnosticCode::ILLEGAL_STATEMENT,
                "missing catch or finally after try",
            );
            return None;
        }

        let span = start.merge(self.previous_span());
        Some(Stmt::Try(TryStmt {
            block,
            handler,
            finalizer,
            span,
        }))
    }
}
