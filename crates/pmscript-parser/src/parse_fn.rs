//! Function declarations, function expressions and arrow functions.

use std::rc::Rc;

use pmscript_lexer::token::TokenKind;
use pmscript_types::ast::*;
use pmscript_types::{DiagnosticCode, Span};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// `function name(params) { body }`
    pub(crate) fn parse_function_declaration(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance();
        let name = self.expect_identifier()?;
        let def = self.parse_function_rest(Some(name), start)?;
        Some(Stmt::Function(Rc::new(def)))
    }

    /// `function [name](params) { body }` in expression position.
    pub(crate) fn parse_function_expression(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance();
        let name = match self.peek_kind() {
            TokenKind::Identifier(_) => Some(self.expect_identifier()?),
            _ => None,
        };
        let def = self.parse_function_rest(name, start)?;
        let span = def.span;
        Some(Expr::new(ExprKind::Function(Rc::new(def)), span))
    }

    /// Parameter list and block body, positioned at `(`.
    pub(crate) fn parse_function_rest(&mut self, name: Option<Ident>, start: Span) -> Option<FunctionDef> {
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::RParen)?;
        let no_in = std::mem::replace(&mut self.no_in, false);
        let body = self.parse_block();
        self.no_in = no_in;
        let body = body?;
        let span = start.merge(self.previous_span());
        Some(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            span,
        })
    }

    /// `x => body` or `(a, b = 1, ...rest) => body`
    pub(crate) fn parse_arrow_function(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let params = if self.eat(&TokenKind::LParen) {
            let params = self.parse_params()?;
            self.expect(&TokenKind::RParen)?;
            params
        } else {
            let name = self.expect_identifier()?;
            vec![Param {
                name,
                default: None,
                rest: false,
            }]
        };
        self.expect(&TokenKind::Arrow)?;

        let no_in = std::mem::replace(&mut self.no_in, false);
        let body = if self.check(&TokenKind::LBrace) {
            self.parse_block().map(FunctionBody::Block)
        } else {
            self.parse_assignment()
                .map(|e| FunctionBody::Expr(Box::new(e)))
        };
        self.no_in = no_in;
        let body = body?;

        let span = start.merge(self.previous_span());
        let def = FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
            span,
        };
        Some(Expr::new(ExprKind::Function(Rc::new(def)), span))
    }

    /// Comma-separated parameters up to (not including) `)`.
    fn parse_params(&mut self) -> Option<Vec<Param>> {
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let rest = self.eat(&TokenKind::DotDotDot);
            let name = self.expect_identifier()?;
            let default = if !rest && self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                rest,
            });
            if rest && !self.check(&TokenKind::RParen) {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    "rest parameter must be last formal parameter",
                );
                return None;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(params)
    }
}
