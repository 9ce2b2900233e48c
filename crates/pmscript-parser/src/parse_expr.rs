//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 1. assignment `=` `+=` `-=` `*=` `/=` `%=`, arrow functions
//! 2. conditional `?:`
//! 3. `||`, `??`
//! 4. `&&`
//! 5. `==` `!=` `===` `!==`
//! 6. `<` `>` `<=` `>=` `in` `instanceof`
//! 7. `+` `-`
//! 8. `*` `/` `%`
//! 9. `**` (right-associative)
//! 10. unary `!` `-` `+` `typeof` `void`, prefix `++`/`--`
//! 11. postfix `++`/`--`
//! 12. `.` `?.` `[]` calls, `new`

use pmscript_lexer::token::TokenKind;
use pmscript_types::ast::*;
use pmscript_types::{DiagnosticCode, Span};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse an expression.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    /// `Assignment = ArrowFunction | Conditional [ AssignOp Assignment ]`
    pub(crate) fn parse_assignment(&mut self) -> Option<Expr> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave();
        result
    }

    fn parse_assignment_inner(&mut self) -> Option<Expr> {
        let arrow_ahead = match self.peek_kind() {
            TokenKind::Identifier(_) => matches!(self.look_ahead(1), TokenKind::Arrow),
            TokenKind::LParen => self.paren_followed_by_arrow(),
            _ => false,
        };
        if arrow_ahead {
            return self.parse_arrow_function();
        }

        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Mod,
            _ => return Some(target),
        };
        if !is_assignable(&target) {
            self.error_at(
                DiagnosticCode::INVALID_ASSIGNMENT_TARGET,
                "invalid assignment target",
                target.span,
            );
            return None;
        }
        self.advance();
        let value = self.parse_assignment()?;
        let span = target.span.merge(value.span);
        Some(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Conditional = LogicalOr [ "?" Assignment ":" Assignment ]`
    fn parse_conditional(&mut self) -> Option<Expr> {
        let test = self.parse_logical_or()?;
        if !self.eat(&TokenKind::Question) {
            return Some(test);
        }
        let no_in = std::mem::replace(&mut self.no_in, false);
        let consequent = self.parse_assignment();
        self.no_in = no_in;
        let consequent = consequent?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        let span = test.span.merge(alternate.span);
        Some(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// `LogicalOr = LogicalAnd { ("||" | "??") LogicalAnd }`
    fn parse_logical_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_logical_and()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::PipePipe => LogicalOp::Or,
                TokenKind::QuestionQuestion => LogicalOp::Nullish,
                _ => break,
            };
            self.advance();
            let right = self.parse_logical_and()?;
            left = logical(left, op, right);
        }
        Some(left)
    }

    /// `LogicalAnd = Equality { "&&" Equality }`
    fn parse_logical_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_equality()?;
            left = logical(left, LogicalOp::And, right);
        }
        Some(left)
    }

    /// `Equality = Relational { EqOp Relational }`
    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::NotEq,
                TokenKind::EqEqEq => BinOp::StrictEq,
                TokenKind::BangEqEq => BinOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    /// `Relational = Additive { RelOp Additive }`
    fn parse_relational(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => BinOp::Less,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::LessEq => BinOp::LessEq,
                TokenKind::GreaterEq => BinOp::GreaterEq,
                TokenKind::InstanceOf => BinOp::InstanceOf,
                TokenKind::In if !self.no_in => BinOp::In,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    /// `Additive = Multiplicative { ("+" | "-") Multiplicative }`
    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    /// `Multiplicative = Exponent { ("*" | "/" | "%") Exponent }`
    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    /// `Exponent = Unary [ "**" Exponent ]`
    fn parse_exponent(&mut self) -> Option<Expr> {
        let base = self.parse_unary()?;
        if !self.eat(&TokenKind::StarStar) {
            return Some(base);
        }
        let exponent = self.parse_exponent()?;
        Some(binary(base, BinOp::Pow, exponent))
    }

    /// `Unary = ( "!" | "-" | "+" | "typeof" | "void" ) Unary | ("++" | "--") Unary | Postfix`
    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::TypeOf => UnaryOp::TypeOf,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(&TokenKind::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let target = self.parse_unary()?;
                return self.update(op, true, target, start);
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        let operand = operand?;
        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `Postfix = CallMember [ "++" | "--" ]` (no line break before the operator)
    fn parse_postfix(&mut self) -> Option<Expr> {
        let expr = self.parse_call_member()?;
        if self.newline_before() {
            return Some(expr);
        }
        let op = match self.peek_kind() {
            TokenKind::PlusPlus => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Some(expr),
        };
        self.advance();
        let start = expr.span;
        let end = self.previous_span();
        self.update(op, false, expr, start.merge(end))
    }

    fn update(&mut self, op: UpdateOp, prefix: bool, target: Expr, start: Span) -> Option<Expr> {
        if !is_assignable(&target) {
            self.error_at(
                DiagnosticCode::INVALID_ASSIGNMENT_TARGET,
                "invalid update target",
                target.span,
            );
            return None;
        }
        let span = start.merge(target.span);
        Some(Expr::new(
            ExprKind::Update {
                op,
                prefix,
                target: Box::new(target),
            },
            span,
        ))
    }

    /// `CallMember = (New | Primary) { "." Name | "?." Name | "?.(" Args | "[" Expr "]" | "(" Args }`
    fn parse_call_member(&mut self) -> Option<Expr> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_property_name()?;
                    expr = member(expr, MemberProperty::Named(name), false, self.previous_span());
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_arguments()?;
                        expr = call(expr, args, true, self.previous_span());
                    } else if self.eat(&TokenKind::LBracket) {
                        let index = self.parse_bracketed_index()?;
                        expr = member(expr, index, true, self.previous_span());
                    } else {
                        let name = self.expect_property_name()?;
                        expr = member(expr, MemberProperty::Named(name), true, self.previous_span());
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_bracketed_index()?;
                    expr = member(expr, index, false, self.previous_span());
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = call(expr, args, false, self.previous_span());
                }
                _ => break,
            }
        }
        Some(expr)
    }

    /// Body of `[expr]` after the `[` has been consumed.
    fn parse_bracketed_index(&mut self) -> Option<MemberProperty> {
        let no_in = std::mem::replace(&mut self.no_in, false);
        let index = self.parse_expression();
        self.no_in = no_in;
        let index = index?;
        self.expect(&TokenKind::RBracket)?;
        Some(MemberProperty::Computed(Box::new(index)))
    }

    /// `new Callee[(args)]`, where the callee is a member chain without calls.
    fn parse_new(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance();
        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_property_name()?;
                callee = member(callee, MemberProperty::Named(name), false, self.previous_span());
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_bracketed_index()?;
                callee = member(callee, index, false, self.previous_span());
            } else {
                break;
            }
        }
        let args = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let span = start.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            span,
        ))
    }

    /// `( [...]expr, ... )` with an optional trailing comma.
    fn parse_arguments(&mut self) -> Option<Vec<ListItem>> {
        self.expect(&TokenKind::LParen)?;
        let no_in = std::mem::replace(&mut self.no_in, false);
        let items = self.parse_list_items(&TokenKind::RParen);
        self.no_in = no_in;
        let items = items?;
        self.expect(&TokenKind::RParen)?;
        Some(items)
    }

    /// Comma-separated items up to (not including) `close`.
    fn parse_list_items(&mut self, close: &TokenKind) -> Option<Vec<ListItem>> {
        let mut items = Vec::new();
        while !self.check(close) {
            if self.eat(&TokenKind::DotDotDot) {
                items.push(ListItem::Spread(self.parse_assignment()?));
            } else {
                items.push(ListItem::Item(self.parse_assignment()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(items)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::Template(s) => ExprKind::Template(vec![TemplatePart::Literal(s)]),
            TokenKind::TemplateStart(s) => {
                self.advance();
                return self.parse_template(s, start);
            }
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(name) => ExprKind::Identifier(name),
            TokenKind::LParen => {
                self.advance();
                let no_in = std::mem::replace(&mut self.no_in, false);
                let inner = self.parse_expression();
                self.no_in = no_in;
                let inner = inner?;
                self.expect(&TokenKind::RParen)?;
                let span = start.merge(self.previous_span());
                return Some(Expr::new(ExprKind::Paren(Box::new(inner)), span));
            }
            TokenKind::LBracket => return self.parse_array_literal(),
            TokenKind::LBrace => return self.parse_object_literal(),
            TokenKind::Function => return self.parse_function_expression(),
            TokenKind::Eof => {
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, "unexpected end of input");
                return None;
            }
            other => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("unexpected token '{other}'"),
                );
                return None;
            }
        };
        self.advance();
        Some(Expr::new(kind, start))
    }

    /// `[a, ...rest]`
    fn parse_array_literal(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance();
        let no_in = std::mem::replace(&mut self.no_in, false);
        let items = self.parse_list_items(&TokenKind::RBracket);
        self.no_in = no_in;
        let items = items?;
        self.expect(&TokenKind::RBracket)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Array(items), span))
    }

    /// `{ key: value, [expr]: value, short, method() { }, ...spread }`
    fn parse_object_literal(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance();
        let no_in = std::mem::replace(&mut self.no_in, false);
        let entries = self.parse_object_entries();
        self.no_in = no_in;
        let entries = entries?;
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Object(entries), span))
    }

    fn parse_object_entries(&mut self) -> Option<Vec<PropertyEntry>> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DotDotDot) {
                entries.push(PropertyEntry::Spread(self.parse_assignment()?));
            } else {
                entries.push(self.parse_object_field()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(entries)
    }

    fn parse_object_field(&mut self) -> Option<PropertyEntry> {
        let start = self.current_span();
        let token = self.peek_kind().clone();
        let key = match &token {
            TokenKind::Identifier(name) => PropertyKey::Named(name.clone()),
            TokenKind::String(s) => PropertyKey::Named(s.clone()),
            TokenKind::Number(n) => PropertyKey::Named(number_key(*n)),
            TokenKind::LBracket => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect(&TokenKind::RBracket)?;
                let value = self.parse_field_value(None, start)?;
                return Some(PropertyEntry::Field {
                    key: PropertyKey::Computed(key),
                    value,
                });
            }
            kind if kind.is_keyword() => PropertyKey::Named(kind.to_string()),
            other => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("expected property name, got '{other}'"),
                );
                return None;
            }
        };
        self.advance();

        if let TokenKind::Identifier(name) = &token {
            if matches!(self.peek_kind(), TokenKind::Comma | TokenKind::RBrace) {
                return Some(PropertyEntry::Shorthand(Ident::new(name.clone(), start)));
            }
        }
        let name = match &key {
            PropertyKey::Named(name) => Some(Ident::new(name.clone(), start)),
            PropertyKey::Computed(_) => None,
        };
        let value = self.parse_field_value(name, start)?;
        Some(PropertyEntry::Field { key, value })
    }

    /// `: value` or a method body `(params) { ... }`.
    fn parse_field_value(&mut self, name: Option<Ident>, start: Span) -> Option<Expr> {
        if self.check(&TokenKind::LParen) {
            let def = self.parse_function_rest(name, start)?;
            let span = def.span;
            return Some(Expr::new(ExprKind::Function(std::rc::Rc::new(def)), span));
        }
        self.expect(&TokenKind::Colon)?;
        self.parse_assignment()
    }

    /// Parse a template literal with substitutions.
    ///
    /// Called after the `TemplateStart` token has been consumed.
    fn parse_template(&mut self, start_text: String, start_span: Span) -> Option<Expr> {
        let mut parts = Vec::new();
        if !start_text.is_empty() {
            parts.push(TemplatePart::Literal(start_text));
        }
        loop {
            self.expect(&TokenKind::InterpolationStart)?;
            let no_in = std::mem::replace(&mut self.no_in, false);
            let expr = self.parse_expression();
            self.no_in = no_in;
            parts.push(TemplatePart::Expr(expr?));
            self.expect(&TokenKind::InterpolationEnd)?;
            match self.peek_kind().clone() {
                TokenKind::TemplatePart(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(TemplatePart::Literal(s));
                    }
                }
                TokenKind::TemplateEnd(s) => {
                    self.advance();
                    if !s.is_empty() {
                        parts.push(TemplatePart::Literal(s));
                    }
                    break;
                }
                _ => {
                    self.error_at_current(
                        DiagnosticCode::UNEXPECTED_TOKEN,
                        "unterminated template literal",
                    );
                    return None;
                }
            }
        }
        let span = start_span.merge(self.previous_span());
        Some(Expr::new(ExprKind::Template(parts), span))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Node Builders
// ══════════════════════════════════════════════════════════════════════════════

fn is_assignable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Identifier(_) => true,
        ExprKind::Member { optional, .. } => !optional,
        ExprKind::Paren(inner) => is_assignable(inner),
        _ => false,
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn logical(left: Expr, op: LogicalOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn member(object: Expr, property: MemberProperty, optional: bool, end: Span) -> Expr {
    let span = object.span.merge(end);
    Expr::new(
        ExprKind::Member {
            object: Box::new(object),
            property,
            optional,
        },
        span,
    )
}

fn call(callee: Expr, args: Vec<ListItem>, optional: bool, end: Span) -> Expr {
    let span = callee.span.merge(end);
    Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
            optional,
        },
        span,
    )
}

/// Property key text for a numeric literal key: `{ 1: "a" }` has key `"1"`.
fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
