//! Core lexer: converts script text to a token stream.
//!
//! Features:
//! - The JavaScript subset's keywords, operators, punctuation and literals
//! - Template literals with `${expr}` via a mode stack
//! - `//` and `/* */` comments stripped
//! - Line terminators recorded on the following token (`newline_before`)
//! - Error recovery: keeps scanning after bad input, up to [`MAX_ERRORS`]

use pmscript_types::{Diagnostic, DiagnosticCode, Diagnostics, ScriptSource, Span, MAX_ERRORS};

use crate::token::{Token, TokenKind};

/// Lexer mode: top-level code, template text, or a `${...}` interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Inside a template literal: scanning text until `` ` `` or `${`.
    Template,
    /// Inside `${...}`. `brace_depth` counts nested `{` so we know which
    /// `}` closes the interpolation.
    Interpolation { brace_depth: u32 },
}

/// The pmscript lexer.
pub struct Lexer<'src> {
    chars: Vec<char>,
    source: &'src ScriptSource,
    pos: usize,
    line: u32,
    col: u32,
    errors: Diagnostics,
    mode_stack: Vec<Mode>,
    /// Tokens queued for emission before the next scan.
    pending: Vec<Token>,
    /// A line terminator was skipped since the last emitted token.
    saw_newline: bool,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src ScriptSource) -> Self {
        Self {
            chars: source.text.chars().collect(),
            source,
            pos: 0,
            line: 1,
            col: 1,
            errors: Diagnostics::empty(),
            mode_stack: vec![Mode::Normal],
            pending: Vec::new(),
            saw_newline: false,
        }
    }

    /// Lex the entire script into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.errors.total_errors >= MAX_ERRORS {
                break;
            }

            if let Some(pending) = self.pending.pop() {
                tokens.push(pending);
                continue;
            }

            let mut token = match self.current_mode() {
                Mode::Template => self.scan_template_continuation(),
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal(),
            };
            token.newline_before = std::mem::take(&mut self.saw_newline);

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }

        tracing::trace!(
            script = %self.source.name,
            tokens = tokens.len(),
            errors = self.errors.total_errors,
            "lexed script"
        );

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn token(&self, kind: TokenKind, start_line: u32, start_col: u32) -> Token {
        Token::new(kind, self.span_from(start_line, start_col))
    }

    fn emit_error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let source_line = self.source.line(span.start_line).unwrap_or("").to_string();
        let err = Diagnostic::new(&self.source.name, code, message, span, source_line);
        self.errors.push(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip whitespace, line terminators and comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some('\n') => {
                    self.saw_newline = true;
                    self.advance();
                }
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => self.skip_block_comment(),
                _ => return,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();
        self.advance();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_COMMENT,
                        "unterminated block comment",
                        span,
                    );
                    return;
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                Some('\n') => {
                    self.saw_newline = true;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal-mode scanning
    // ─────────────────────────────────────────────────────────────

    fn scan_normal(&mut self) -> Token {
        self.skip_trivia();

        if self.errors.total_errors >= MAX_ERRORS {
            return Token::new(TokenKind::Eof, self.current_span());
        }

        let start_line = self.line;
        let start_col = self.col;
        let Some(ch) = self.advance() else {
            if self.mode_stack.len() > 1 {
                self.emit_error(
                    DiagnosticCode::UNTERMINATED_STRING,
                    "unterminated template literal",
                    self.current_span(),
                );
            }
            return Token::new(TokenKind::Eof, self.current_span());
        };

        let kind = match ch {
            '"' | '\'' => return self.scan_string(ch, start_line, start_col),
            '`' => return self.scan_template(start_line, start_col),
            '0'..='9' => return self.scan_number(ch, start_line, start_col),
            '.' if matches!(self.peek(), Some('0'..='9')) => {
                return self.scan_number(ch, start_line, start_col)
            }
            c if is_ident_start(c) => return self.scan_identifier(c, start_line, start_col),

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    TokenKind::StarStar
                } else if self.eat('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            // Comments were consumed by skip_trivia, so this is division.
            '/' => {
                if self.eat('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::BangEqEq
                    } else {
                        TokenKind::BangEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '&' if self.peek() == Some('&') => {
                self.advance();
                TokenKind::AmpAmp
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                TokenKind::PipePipe
            }
            '?' => {
                if self.eat('?') {
                    TokenKind::QuestionQuestion
                } else if self.peek() == Some('.') && !matches!(self.peek_at(1), Some('0'..='9'))
                {
                    // `a?.b` but not `cond?.5:1`
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else {
                    TokenKind::Dot
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '{' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
                TokenKind::LBrace
            }
            '}' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    if *brace_depth == 0 {
                        // This `}` ends the interpolation: back to template text.
                        self.pop_mode();
                        self.push_mode(Mode::Template);
                        return self.token(TokenKind::InterpolationEnd, start_line, start_col);
                    }
                    *brace_depth -= 1;
                }
                TokenKind::RBrace
            }
            _ => {
                let span = self.span_from(start_line, start_col);
                self.emit_error(
                    DiagnosticCode::UNEXPECTED_CHARACTER,
                    format!("unexpected character '{ch}'"),
                    span,
                );
                return self.scan_normal();
            }
        };
        self.token(kind, start_line, start_col)
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, first: char, start_line: u32, start_col: u32) -> Token {
        let mut text = String::from(first);

        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.advance();
            }
            let span = self.span_from(start_line, start_col);
            return match u64::from_str_radix(&digits, 16) {
                Ok(v) => Token::new(TokenKind::Number(v as f64), span),
                Err(_) => {
                    self.emit_error(
                        DiagnosticCode::INVALID_NUMBER,
                        "invalid hexadecimal literal",
                        span,
                    );
                    Token::new(TokenKind::Number(0.0), span)
                }
            };
        }

        self.take_digits(&mut text);
        if first != '.' && self.peek() == Some('.') && matches!(self.peek_at(1), Some('0'..='9')) {
            text.push('.');
            self.advance();
            self.take_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some('0'..='9')) {
                text.push('e');
                self.advance();
                if sign {
                    text.extend(self.advance());
                }
                self.take_digits(&mut text);
            }
        }

        let span = self.span_from(start_line, start_col);
        match text.parse::<f64>() {
            Ok(value) => Token::new(TokenKind::Number(value), span),
            Err(_) => {
                self.emit_error(
                    DiagnosticCode::INVALID_NUMBER,
                    format!("invalid number literal '{text}'"),
                    span,
                );
                Token::new(TokenKind::Number(0.0), span)
            }
        }
    }

    fn take_digits(&mut self, buf: &mut String) {
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            buf.push(c);
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, first: char, start_line: u32, start_col: u32) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(|&c| is_ident_continue(c)) {
            text.push(c);
            self.advance();
        }
        let kind = TokenKind::from_keyword(&text).unwrap_or(TokenKind::Identifier(text));
        self.token(kind, start_line, start_col)
    }

    // ─────────────────────────────────────────────────────────────
    // String and template literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a quoted string after its opening quote.
    fn scan_string(&mut self, quote: char, start_line: u32, start_col: u32) -> Token {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "unterminated string literal",
                        span,
                    );
                    return Token::new(TokenKind::String(buf), span);
                }
                Some(c) if c == quote => {
                    self.advance();
                    return self.token(TokenKind::String(buf), start_line, start_col);
                }
                Some('\\') => {
                    if let Some(c) = self.scan_escape_sequence() {
                        buf.push(c);
                    }
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
        }
    }

    /// Scan a template literal after its opening backtick.
    fn scan_template(&mut self, start_line: u32, start_col: u32) -> Token {
        match self.scan_template_text(start_line, start_col) {
            TemplateStop::Closed(text) => {
                self.token(TokenKind::Template(text), start_line, start_col)
            }
            TemplateStop::Interpolation(text) => {
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.token(TokenKind::TemplateStart(text), start_line, start_col)
            }
        }
    }

    /// Continue template text after an interpolation's closing `}`.
    fn scan_template_continuation(&mut self) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        match self.scan_template_text(start_line, start_col) {
            TemplateStop::Closed(text) => {
                self.pop_mode();
                self.token(TokenKind::TemplateEnd(text), start_line, start_col)
            }
            TemplateStop::Interpolation(text) => {
                self.pop_mode();
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.token(TokenKind::TemplatePart(text), start_line, start_col)
            }
        }
    }

    /// Read template characters up to the closing backtick or the next `${`.
    /// On `${`, queues an [`TokenKind::InterpolationStart`] token.
    fn scan_template_text(&mut self, start_line: u32, start_col: u32) -> TemplateStop {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "unterminated template literal",
                        span,
                    );
                    return TemplateStop::Closed(buf);
                }
                Some('`') => {
                    self.advance();
                    return TemplateStop::Closed(buf);
                }
                Some('\\') => {
                    if let Some(c) = self.scan_escape_sequence() {
                        buf.push(c);
                    }
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    let line = self.line;
                    let col = self.col;
                    self.advance();
                    self.advance();
                    self.pending
                        .push(Token::new(TokenKind::InterpolationStart, Span::new(line, col, line, col + 1)));
                    return TemplateStop::Interpolation(buf);
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
        }
    }

    /// Scan an escape sequence starting at the `\`.
    /// Returns `None` for line continuations and malformed escapes.
    fn scan_escape_sequence(&mut self) -> Option<char> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();

        let Some(ch) = self.advance() else {
            let span = self.span_from(start_line, start_col);
            self.emit_error(
                DiagnosticCode::UNTERMINATED_STRING,
                "unexpected end of input in escape sequence",
                span,
            );
            return None;
        };
        match ch {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            'v' => Some('\u{b}'),
            '0' => Some('\0'),
            '\n' => None,
            'x' => self.scan_hex_escape(2, start_line, start_col),
            'u' if self.peek() == Some('{') => {
                self.advance();
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                    digits.push(c);
                    self.advance();
                }
                if !self.eat('}') {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(DiagnosticCode::INVALID_ESCAPE, "invalid Unicode escape", span);
                    return None;
                }
                self.char_from_hex(&digits, start_line, start_col)
            }
            'u' => self.scan_hex_escape(4, start_line, start_col),
            // Any other escaped character stands for itself: \' \" \\ \` \$ ...
            other => Some(other),
        }
    }

    fn scan_hex_escape(&mut self, len: usize, start_line: u32, start_col: u32) -> Option<char> {
        let mut digits = String::new();
        for _ in 0..len {
            match self.peek().filter(|c| c.is_ascii_hexdigit()) {
                Some(c) => {
                    digits.push(c);
                    self.advance();
                }
                None => break,
            }
        }
        if digits.len() != len {
            let span = self.span_from(start_line, start_col);
            self.emit_error(
                DiagnosticCode::INVALID_ESCAPE,
                "invalid hexadecimal escape sequence",
                span,
            );
            return None;
        }
        self.char_from_hex(&digits, start_line, start_col)
    }

    fn char_from_hex(&mut self, digits: &str, start_line: u32, start_col: u32) -> Option<char> {
        let decoded = u32::from_str_radix(digits, 16).ok().and_then(char::from_u32);
        if decoded.is_none() {
            let span = self.span_from(start_line, start_col);
            self.emit_error(
                DiagnosticCode::INVALID_ESCAPE,
                format!("invalid code point \\u{{{digits}}}"),
                span,
            );
        }
        decoded
    }
}

enum TemplateStop {
    Closed(String),
    Interpolation(String),
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}
