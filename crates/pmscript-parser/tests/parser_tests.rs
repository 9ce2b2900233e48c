//! Parser tests: statements, expression precedence, functions, templates,
//! statement termination and error recovery.

use std::rc::Rc;

use pmscript_lexer::Lexer;
use pmscript_parser::{parse_script, ParseResult, Parser, MAX_NESTING};
use pmscript_types::ast::*;
use pmscript_types::{DiagnosticCode, ScriptSource};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> ParseResult {
    let src = ScriptSource::new("test.js", source);
    let lex = Lexer::new(&src).lex();
    Parser::new(lex.tokens, &src).parse()
}

fn parse_ok(source: &str) -> Program {
    let result = parse(source);
    if result.errors.has_errors() {
        for e in &result.errors.errors {
            eprintln!("  ERROR: {} ({})", e.message, e.code);
        }
        panic!("unexpected parse errors (see above)");
    }
    result.program
}

fn first_error(source: &str) -> String {
    parse(source)
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_default()
}

/// The expression of a single expression statement.
fn expr(source: &str) -> Expr {
    let program = parse_ok(source);
    assert_eq!(program.body.len(), 1, "expected one statement");
    match program.body.into_iter().next() {
        Some(Stmt::Expr(s)) => s.expr,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

fn binary_op(e: &Expr) -> BinOp {
    match &e.kind {
        ExprKind::Binary { op, .. } => *op,
        other => panic!("expected binary expression, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_typical_test_script() {
    let program = parse_ok(
        r#"
const data = pm.response.json();
pm.test("Status is 200", function () {
    pm.response.to.have.status(200);
});
pm.test("Has id", () => {
    pm.expect(data).to.have.property('id');
    pm.environment.set("id", data.id);
});
"#,
    );
    assert_eq!(program.body.len(), 3);
    assert!(matches!(program.body[0], Stmt::Var(_)));
    assert!(matches!(program.body[1], Stmt::Expr(_)));
}

#[test]
fn test_var_declarations() {
    let program = parse_ok("var a = 1, b; let c; const d = 'x';");
    let Stmt::Var(first) = &program.body[0] else {
        panic!("expected var declaration");
    };
    assert_eq!(first.kind, VarKind::Var);
    assert_eq!(first.declarators.len(), 2);
    assert!(first.declarators[1].init.is_none());
    assert!(matches!(&program.body[2], Stmt::Var(d) if d.kind == VarKind::Const));
}

#[test]
fn test_const_requires_initializer() {
    let result = parse("const a;");
    assert_eq!(
        result.errors.first().map(|e| e.code),
        Some(DiagnosticCode::MISSING_INITIALIZER)
    );
}

#[test]
fn test_if_else_chain() {
    let program = parse_ok("if (a) { b() } else if (c) d(); else { e() }");
    let Stmt::If(stmt) = &program.body[0] else {
        panic!("expected if");
    };
    assert!(matches!(stmt.else_branch.as_deref(), Some(Stmt::If(_))));
}

#[test]
fn test_classic_for_loop() {
    let program = parse_ok("for (let i = 0; i < items.length; i++) { total += items[i]; }");
    let Stmt::For(stmt) = &program.body[0] else {
        panic!("expected for");
    };
    assert!(matches!(stmt.init, Some(ForInit::Var(_))));
    assert!(stmt.test.is_some());
    assert!(matches!(
        stmt.update.as_ref().map(|e| &e.kind),
        Some(ExprKind::Update { prefix: false, .. })
    ));
}

#[test]
fn test_for_of_and_for_in() {
    let program = parse_ok("for (const item of list) {} for (key in obj) {}");
    match &program.body[0] {
        Stmt::ForOf(each) => {
            assert_eq!(each.kind, Some(VarKind::Const));
            assert_eq!(each.binding.name, "item");
        }
        other => panic!("expected for-of, got {other:?}"),
    }
    match &program.body[1] {
        Stmt::ForIn(each) => {
            assert_eq!(each.kind, None);
            assert_eq!(each.binding.name, "key");
        }
        other => panic!("expected for-in, got {other:?}"),
    }
}

#[test]
fn test_empty_for_header() {
    let program = parse_ok("for (;;) { break; }");
    let Stmt::For(stmt) = &program.body[0] else {
        panic!("expected for");
    };
    assert!(stmt.init.is_none() && stmt.test.is_none() && stmt.update.is_none());
}

#[test]
fn test_while_and_do_while() {
    let program = parse_ok("while (n > 0) n--; do { n++ } while (n < 3)");
    assert!(matches!(program.body[0], Stmt::While(_)));
    assert!(matches!(program.body[1], Stmt::DoWhile(_)));
}

#[test]
fn test_try_catch_finally() {
    let program = parse_ok("try { risky() } catch (e) { log(e) } finally { done() }");
    let Stmt::Try(stmt) = &program.body[0] else {
        panic!("expected try");
    };
    assert_eq!(
        stmt.handler.as_ref().and_then(|h| h.param.as_ref()).map(|p| p.name.as_str()),
        Some("e")
    );
    assert!(stmt.finalizer.is_some());
}

#[test]
fn test_catch_without_binding() {
    let program = parse_ok("try { a() } catch { b() }");
    let Stmt::Try(stmt) = &program.body[0] else {
        panic!("expected try");
    };
    assert!(stmt.handler.as_ref().is_some_and(|h| h.param.is_none()));
}

#[test]
fn test_try_needs_handler() {
    assert_eq!(first_error("try { a() }"), "missing catch or finally after try");
}

#[test]
fn test_return_before_newline_has_no_value() {
    let program = parse_ok("function f() {\n  return\n  42\n}");
    let Stmt::Function(def) = &program.body[0] else {
        panic!("expected function");
    };
    let FunctionBody::Block(body) = &def.body else {
        panic!("expected block body");
    };
    assert!(matches!(&body.stmts[0], Stmt::Return(r) if r.value.is_none()));
    assert_eq!(body.stmts.len(), 2);
}

#[test]
fn test_throw_statement() {
    let program = parse_ok("throw new Error('boom')");
    let Stmt::Throw(stmt) = &program.body[0] else {
        panic!("expected throw");
    };
    assert!(matches!(stmt.value.kind, ExprKind::New { .. }));
}

// ─────────────────────────────────────────────────────────────────────
// Statement termination
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_newline_terminates_statements() {
    let program = parse_ok("let a = 1\nlet b = 2\na = b");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_missing_separator_on_same_line() {
    assert_eq!(first_error("let a = 1 let b = 2"), "expected ';', got 'let'");
}

#[test]
fn test_postfix_increment_needs_same_line() {
    let program = parse_ok("a\n++b");
    assert_eq!(program.body.len(), 2);
    match &program.body[1] {
        Stmt::Expr(s) => assert!(matches!(s.expr.kind, ExprKind::Update { prefix: true, .. })),
        other => panic!("expected expression, got {other:?}"),
    }
}

#[test]
fn test_method_chain_across_lines() {
    let e = expr("pm.expect(x)\n  .to.be\n  .an('object')");
    assert!(matches!(e.kind, ExprKind::Call { .. }));
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_multiplication_binds_tighter() {
    let e = expr("1 + 2 * 3");
    assert_eq!(binary_op(&e), BinOp::Add);
    let ExprKind::Binary { right, .. } = &e.kind else { unreachable!() };
    assert_eq!(binary_op(right), BinOp::Mul);
}

#[test]
fn test_exponent_is_right_associative() {
    let e = expr("2 ** 3 ** 2");
    let ExprKind::Binary { left, right, op } = &e.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinOp::Pow);
    assert!(matches!(left.kind, ExprKind::Number(n) if n == 2.0));
    assert_eq!(binary_op(right), BinOp::Pow);
}

#[test]
fn test_logical_and_binds_tighter_than_or() {
    let e = expr("a || b && c");
    let ExprKind::Logical { op, right, .. } = &e.kind else {
        panic!("expected logical");
    };
    assert_eq!(*op, LogicalOp::Or);
    assert!(matches!(right.kind, ExprKind::Logical { op: LogicalOp::And, .. }));
}

#[test]
fn test_nullish_coalescing() {
    let e = expr("a ?? 'default'");
    assert!(matches!(e.kind, ExprKind::Logical { op: LogicalOp::Nullish, .. }));
}

#[test]
fn test_strict_equality_and_relational() {
    assert_eq!(binary_op(&expr("a === b")), BinOp::StrictEq);
    assert_eq!(binary_op(&expr("a !== b")), BinOp::StrictNotEq);
    assert_eq!(binary_op(&expr("'id' in obj")), BinOp::In);
    assert_eq!(binary_op(&expr("e instanceof Error")), BinOp::InstanceOf);
}

#[test]
fn test_conditional_is_right_associative() {
    let e = expr("a ? b : c ? d : e");
    let ExprKind::Conditional { alternate, .. } = &e.kind else {
        panic!("expected conditional");
    };
    assert!(matches!(alternate.kind, ExprKind::Conditional { .. }));
}

#[test]
fn test_assignment_is_right_associative() {
    let e = expr("a = b = 3");
    let ExprKind::Assign { value, .. } = &e.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(value.kind, ExprKind::Assign { .. }));
}

#[test]
fn test_compound_assignment_to_member() {
    let e = expr("counts[key] += 1");
    assert!(matches!(
        e.kind,
        ExprKind::Assign {
            op: AssignOp::Add,
            ..
        }
    ));
}

#[test]
fn test_invalid_assignment_target() {
    let result = parse("a + b = 3");
    assert_eq!(
        result.errors.first().map(|e| e.code),
        Some(DiagnosticCode::INVALID_ASSIGNMENT_TARGET)
    );
}

#[test]
fn test_unary_operators() {
    let e = expr("typeof !x");
    let ExprKind::Unary { op, operand } = &e.kind else {
        panic!("expected unary");
    };
    assert_eq!(*op, UnaryOp::TypeOf);
    assert!(matches!(operand.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
}

#[test]
fn test_keyword_property_names() {
    let e = expr("pm.expect(x).to.be.null");
    let ExprKind::Member { property, .. } = &e.kind else {
        panic!("expected member");
    };
    assert!(matches!(property, MemberProperty::Named(id) if id.name == "null"));
}

#[test]
fn test_optional_chaining() {
    let e = expr("data?.items?.[0]?.name");
    let ExprKind::Member { optional, object, .. } = &e.kind else {
        panic!("expected member");
    };
    assert!(*optional);
    assert!(matches!(
        object.kind,
        ExprKind::Member {
            optional: true,
            property: MemberProperty::Computed(_),
            ..
        }
    ));
}

#[test]
fn test_optional_call() {
    let e = expr("callback?.(1)");
    assert!(matches!(e.kind, ExprKind::Call { optional: true, .. }));
}

#[test]
fn test_new_with_member_access() {
    let e = expr("new Error('x').message");
    let ExprKind::Member { object, .. } = &e.kind else {
        panic!("expected member");
    };
    assert!(matches!(object.kind, ExprKind::New { .. }));
}

#[test]
fn test_spread_in_calls_and_literals() {
    let e = expr("f(...args, [...xs, 1], { ...base, extra: true })");
    let ExprKind::Call { args, .. } = &e.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 3);
    assert!(matches!(args[0], ListItem::Spread(_)));
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_object_literal_forms() {
    let e = expr("({ a: 1, 'b-c': 2, 3: 'x', [k]: v, short, null: 0, m() { return 1 } })");
    let ExprKind::Paren(inner) = &e.kind else {
        panic!("expected parens");
    };
    let ExprKind::Object(entries) = &inner.kind else {
        panic!("expected object");
    };
    assert_eq!(entries.len(), 7);
    assert!(matches!(
        &entries[2],
        PropertyEntry::Field { key: PropertyKey::Named(k), .. } if k == "3"
    ));
    assert!(matches!(&entries[3], PropertyEntry::Field { key: PropertyKey::Computed(_), .. }));
    assert!(matches!(&entries[4], PropertyEntry::Shorthand(id) if id.name == "short"));
    assert!(matches!(
        &entries[6],
        PropertyEntry::Field { value: Expr { kind: ExprKind::Function(_), .. }, .. }
    ));
}

#[test]
fn test_trailing_commas() {
    parse_ok("f(1, 2,); let a = [1, 2,]; let o = { a: 1, };");
}

#[test]
fn test_template_literal_parts() {
    let e = expr("`Hello ${name}, you are ${age + 1}!`");
    let ExprKind::Template(parts) = &e.kind else {
        panic!("expected template");
    };
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], TemplatePart::Literal("Hello ".into()));
    assert!(matches!(&parts[3], TemplatePart::Expr(e) if binary_op(e) == BinOp::Add));
}

// ─────────────────────────────────────────────────────────────────────
// Functions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_arrow_function_forms() {
    let program = parse_ok("const a = x => x * 2; const b = (x, y = 1, ...rest) => { return x }; const c = () => ({})");
    let arrow = |i: usize| -> Rc<FunctionDef> {
        match &program.body[i] {
            Stmt::Var(d) => match &d.declarators[0].init.as_ref().map(|e| &e.kind) {
                Some(ExprKind::Function(def)) => def.clone(),
                other => panic!("expected function, got {other:?}"),
            },
            other => panic!("expected declaration, got {other:?}"),
        }
    };
    let a = arrow(0);
    assert!(a.is_arrow);
    assert!(matches!(a.body, FunctionBody::Expr(_)));
    let b = arrow(1);
    assert_eq!(b.params.len(), 3);
    assert!(b.params[1].default.is_some());
    assert!(b.params[2].rest);
    assert!(arrow(2).params.is_empty());
}

#[test]
fn test_parenthesized_expression_is_not_arrow() {
    let e = expr("(a + b) * c");
    assert_eq!(binary_op(&e), BinOp::Mul);
}

#[test]
fn test_named_function_expression() {
    let e = expr("(function fact(n) { return n })");
    let ExprKind::Paren(inner) = &e.kind else {
        panic!("expected parens");
    };
    let ExprKind::Function(def) = &inner.kind else {
        panic!("expected function");
    };
    assert_eq!(def.name.as_ref().map(|n| n.name.as_str()), Some("fact"));
    assert!(!def.is_arrow);
}

#[test]
fn test_rest_parameter_must_be_last() {
    assert_eq!(
        first_error("function f(...a, b) {}"),
        "rest parameter must be last formal parameter"
    );
}

// ─────────────────────────────────────────────────────────────────────
// Errors & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unclosed_call_reports_position() {
    let result = parse("pm.test('a', () => {\n  x = 1;\n}");
    let err = result.errors.first().expect("expected an error");
    assert_eq!(err.message, "expected ')', got 'end of input'");
    assert_eq!(err.span.start_line, 3);
}

#[test]
fn test_unexpected_token_message() {
    assert_eq!(first_error("let x = ;"), "unexpected token ';'");
    assert_eq!(first_error("let x ="), "unexpected end of input");
}

#[test]
fn test_stray_closing_brace() {
    assert_eq!(first_error("a();\n}\nb();"), "unexpected '}'");
    assert_eq!(parse("a();\n}\nb();").program.body.len(), 2);
}

#[test]
fn test_recovery_continues_to_next_line() {
    let result = parse("let = 1\nlet ok = 2\nlet = 3");
    assert_eq!(result.errors.total_errors, 2);
    assert!(result
        .program
        .body
        .iter()
        .any(|s| matches!(s, Stmt::Var(d) if d.declarators[0].name.name == "ok")));
}

#[test]
fn test_nesting_limit() {
    let depth = MAX_NESTING as usize + 5;
    let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    let result = parse(&source);
    assert_eq!(
        result.errors.first().map(|e| e.code),
        Some(DiagnosticCode::NESTING_TOO_DEEP)
    );
}

#[test]
fn test_parse_script_combines_lexer_errors_first() {
    let src = ScriptSource::new("test.js", "let a = 'open\nlet b = ;");
    let errors = parse_script(&src).expect_err("script should not parse");
    assert_eq!(
        errors.first().map(|e| e.message.as_str()),
        Some("unterminated string literal")
    );
    assert!(errors.total_errors >= 2);
}

#[test]
fn test_parse_script_ok() {
    let src = ScriptSource::new("test.js", "pm.test('a', () => {})");
    let program = parse_script(&src).expect("script should parse");
    assert_eq!(program.body.len(), 1);
}
