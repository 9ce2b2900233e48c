//! Lexer tests: keywords, operators, literals, template literals,
//! comments, line terminator tracking and error recovery.

use pmscript_lexer::{Lexer, Token, TokenKind, ALL_KEYWORDS};
use pmscript_types::{ScriptSource, MAX_ERRORS};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn tokens(source: &str) -> Vec<Token> {
    let src = ScriptSource::new("test.js", source);
    Lexer::new(&src).lex().tokens
}

/// Token kinds without the trailing Eof.
fn kinds(source: &str) -> Vec<TokenKind> {
    tokens(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn error_count(source: &str) -> usize {
    let src = ScriptSource::new("test.js", source);
    Lexer::new(&src).lex().errors.total_errors
}

fn first_error(source: &str) -> String {
    let src = ScriptSource::new("test.js", source);
    Lexer::new(&src)
        .lex()
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_default()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & identifiers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_all_keywords_lex_as_keywords() {
    for &kw in ALL_KEYWORDS {
        let k = kinds(kw);
        assert_eq!(k.len(), 1, "keyword '{kw}'");
        assert!(k[0].is_keyword(), "'{kw}' should be a keyword token");
    }
}

#[test]
fn test_contextual_names_are_identifiers() {
    assert_eq!(
        kinds("of undefined $x _y café"),
        vec![
            ident("of"),
            ident("undefined"),
            ident("$x"),
            ident("_y"),
            ident("café"),
        ]
    );
}

#[test]
fn test_typical_test_call() {
    assert_eq!(
        kinds("pm.test('a', () => {});"),
        vec![
            ident("pm"),
            TokenKind::Dot,
            ident("test"),
            TokenKind::LParen,
            TokenKind::String("a".into()),
            TokenKind::Comma,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::RParen,
            TokenKind::Semicolon,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_multi_char_operators() {
    assert_eq!(
        kinds("=== !== == != => ... ?. ?? ** += -= *= /= %= ++ -- && || <= >="),
        vec![
            TokenKind::EqEqEq,
            TokenKind::BangEqEq,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::Arrow,
            TokenKind::DotDotDot,
            TokenKind::QuestionDot,
            TokenKind::QuestionQuestion,
            TokenKind::StarStar,
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::PercentEq,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
        ]
    );
}

#[test]
fn test_question_dot_before_digit_is_conditional() {
    assert_eq!(
        kinds("a?.5:1"),
        vec![
            ident("a"),
            TokenKind::Question,
            TokenKind::Number(0.5),
            TokenKind::Colon,
            TokenKind::Number(1.0),
        ]
    );
}

#[test]
fn test_slash_is_division_outside_comments() {
    assert_eq!(
        kinds("a / b // trailing comment"),
        vec![ident("a"), TokenKind::Slash, ident("b")]
    );
}

#[test]
fn test_single_ampersand_is_rejected() {
    assert_eq!(first_error("a & b"), "unexpected character '&'");
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_number_forms() {
    assert_eq!(
        kinds("42 3.14 1e3 0xff .5 2.5e-3 1E+2"),
        vec![
            TokenKind::Number(42.0),
            TokenKind::Number(3.14),
            TokenKind::Number(1000.0),
            TokenKind::Number(255.0),
            TokenKind::Number(0.5),
            TokenKind::Number(0.0025),
            TokenKind::Number(100.0),
        ]
    );
}

#[test]
fn test_member_access_on_number_literal_result() {
    assert_eq!(
        kinds("x.length.toFixed"),
        vec![
            ident("x"),
            TokenKind::Dot,
            ident("length"),
            TokenKind::Dot,
            ident("toFixed"),
        ]
    );
}

#[test]
fn test_string_quotes_and_escapes() {
    assert_eq!(
        kinds(r#"'it\'s' "say \"hi\"" "A\x42\n" '\u{1F600}'"#),
        vec![
            TokenKind::String("it's".into()),
            TokenKind::String("say \"hi\"".into()),
            TokenKind::String("AB\n".into()),
            TokenKind::String("\u{1F600}".into()),
        ]
    );
}

#[test]
fn test_unknown_escape_keeps_character() {
    assert_eq!(kinds(r"'\d'"), vec![TokenKind::String("d".into())]);
    assert_eq!(error_count(r"'\d'"), 0);
}

#[test]
fn test_literal_keywords() {
    assert_eq!(
        kinds("true false null"),
        vec![TokenKind::True, TokenKind::False, TokenKind::Null]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Template literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_plain_template() {
    assert_eq!(kinds("`plain text`"), vec![TokenKind::Template("plain text".into())]);
}

#[test]
fn test_template_with_interpolations() {
    assert_eq!(
        kinds("`a${x}b${y}c`"),
        vec![
            TokenKind::TemplateStart("a".into()),
            TokenKind::InterpolationStart,
            ident("x"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplatePart("b".into()),
            TokenKind::InterpolationStart,
            ident("y"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd("c".into()),
        ]
    );
}

#[test]
fn test_object_literal_inside_interpolation() {
    assert_eq!(
        kinds("`${ {a: 1}.a }`"),
        vec![
            TokenKind::TemplateStart(String::new()),
            TokenKind::InterpolationStart,
            TokenKind::LBrace,
            ident("a"),
            TokenKind::Colon,
            TokenKind::Number(1.0),
            TokenKind::RBrace,
            TokenKind::Dot,
            ident("a"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd(String::new()),
        ]
    );
}

#[test]
fn test_nested_template() {
    assert_eq!(
        kinds("`a${`b${c}`}d`"),
        vec![
            TokenKind::TemplateStart("a".into()),
            TokenKind::InterpolationStart,
            TokenKind::TemplateStart("b".into()),
            TokenKind::InterpolationStart,
            ident("c"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd(String::new()),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd("d".into()),
        ]
    );
}

#[test]
fn test_template_escapes_dollar() {
    assert_eq!(kinds(r"`cost \${x}`"), vec![TokenKind::Template("cost ${x}".into())]);
}

// ─────────────────────────────────────────────────────────────────────
// Comments & line terminators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("a /* inline */ b // rest\nc"),
        vec![ident("a"), ident("b"), ident("c")]
    );
}

#[test]
fn test_newline_before_flag() {
    let toks = tokens("a\nb c");
    assert!(!toks[0].newline_before);
    assert!(toks[1].newline_before);
    assert!(!toks[2].newline_before);
}

#[test]
fn test_newline_inside_block_comment_counts() {
    let toks = tokens("a /*\n*/ b");
    assert!(toks[1].newline_before);
    let toks = tokens("a /* x */ b");
    assert!(!toks[1].newline_before);
}

#[test]
fn test_spans_count_characters() {
    let toks = tokens("'é' x\n  y");
    assert_eq!((toks[1].span.start_line, toks[1].span.start_col), (1, 5));
    assert_eq!((toks[2].span.start_line, toks[2].span.start_col), (2, 3));
}

#[test]
fn test_empty_input_is_just_eof() {
    let toks = tokens("");
    assert_eq!(toks.len(), 1);
    assert_eq!(toks[0].kind, TokenKind::Eof);
}

// ─────────────────────────────────────────────────────────────────────
// Errors & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unterminated_string() {
    assert_eq!(first_error("'abc"), "unterminated string literal");
    assert_eq!(error_count("'abc"), 1);
}

#[test]
fn test_unterminated_template() {
    assert_eq!(first_error("`abc"), "unterminated template literal");
}

#[test]
fn test_unterminated_block_comment() {
    assert_eq!(first_error("a /* never closed"), "unterminated block comment");
}

#[test]
fn test_bad_hex_escape() {
    assert_eq!(error_count(r"'\x4'"), 1);
    assert_eq!(first_error(r"'\x4'"), "invalid hexadecimal escape sequence");
}

#[test]
fn test_recovers_after_unexpected_character() {
    assert_eq!(kinds("a # b"), vec![ident("a"), ident("b")]);
    assert_eq!(first_error("a # b"), "unexpected character '#'");
}

#[test]
fn test_error_collection_is_capped() {
    let source = "#".repeat(MAX_ERRORS + 10);
    assert_eq!(error_count(&source), MAX_ERRORS);
    let toks = tokens(&source);
    assert_eq!(toks.last().map(|t| t.kind.clone()), Some(TokenKind::Eof));
}
