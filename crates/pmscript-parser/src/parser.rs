//! Core parser infrastructure: token cursor, error reporting, helpers.

use pmscript_lexer::token::{Token, TokenKind};
use pmscript_lexer::Lexer;
use pmscript_types::ast::{Ident, Program};
use pmscript_types::{Diagnostic, DiagnosticCode, Diagnostics, ScriptSource, Span, MAX_ERRORS};

/// Deepest statement/expression nesting the parser accepts.
pub const MAX_NESTING: u32 = 128;

/// The pmscript parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Collects errors and attempts recovery at statement boundaries.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'src ScriptSource,
    errors: Diagnostics,
    /// Current statement/expression nesting depth.
    pub(crate) depth: u32,
    /// Disables the `in` operator while parsing a `for (...)` head.
    pub(crate) no_in: bool,
}

/// Result of parsing.
pub struct ParseResult {
    pub program: Program,
    pub errors: Diagnostics,
}

/// Lex and parse a script in one step.
///
/// Lexer diagnostics are reported ahead of parser diagnostics.
pub fn parse_script(source: &ScriptSource) -> Result<Program, Diagnostics> {
    let lexed = Lexer::new(source).lex();
    let parsed = Parser::new(lexed.tokens, source).parse();
    let mut errors = lexed.errors;
    errors.extend(parsed.errors);
    if errors.has_errors() {
        Err(errors)
    } else {
        Ok(parsed.program)
    }
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, source: &'src ScriptSource) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            errors: Diagnostics::empty(),
            depth: 0,
            no_in: false,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        static EOF: Token = Token {
            kind: TokenKind::Eof,
            span: Span {
                start_line: 1,
                start_col: 1,
                end_line: 1,
                end_col: 1,
            },
            newline_before: false,
        };
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF)
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Look ahead by `n` tokens from the current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.span,
            None => Span::point(1, 1),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// `true` if the current token is the contextual keyword `of`.
    pub(crate) fn check_of(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Identifier(name) if name == "of")
    }

    /// `true` if the current `(` has a matching `)` directly followed by `=>`.
    pub(crate) fn paren_followed_by_arrow(&self) -> bool {
        if !self.check(&TokenKind::LParen) {
            return false;
        }
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(self.pos) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return token.kind == TokenKind::RParen
                            && matches!(
                                self.tokens.get(i + 1).map(|t| &t.kind),
                                Some(TokenKind::Arrow)
                            );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// `true` if a line terminator precedes the current token.
    pub(crate) fn newline_before(&self) -> bool {
        self.peek().newline_before
    }

    // ── Statement Termination ─────────────────────────────────────────────────

    /// Consume a statement terminator.
    ///
    /// A statement ends at `;`, before a token on a new line, before `}`,
    /// or at end of input.
    pub(crate) fn expect_statement_end(&mut self) {
        if self.eat(&TokenKind::Semicolon) {
            return;
        }
        if self.at_end() || self.newline_before() || self.check(&TokenKind::RBrace) {
            return;
        }
        self.error_at_current(
            DiagnosticCode::UNEXPECTED_TOKEN,
            format!("expected ';', got '{}'", self.peek_kind()),
        );
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                DiagnosticCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            other => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{other}'"),
                );
                None
            }
        }
    }

    /// Expect a property name after `.`: identifiers and reserved words
    /// (`to.be.null`, `e.new`) are both accepted.
    pub(crate) fn expect_property_name(&mut self) -> Option<Ident> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ if kind.is_keyword() => {
                let span = self.advance().span;
                Some(Ident::new(kind.to_string(), span))
            }
            _ => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("expected property name, got '{kind}'"),
                );
                None
            }
        }
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Enter one nesting level; reports an error past [`MAX_NESTING`].
    pub(crate) fn enter(&mut self) -> Option<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            self.error_at_current(
                DiagnosticCode::NESTING_TOO_DEEP,
                format!("maximum nesting depth of {MAX_NESTING} exceeded"),
            );
            self.depth -= 1;
            return None;
        }
        Some(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let source_line = self.source.line(span.start_line).unwrap_or("").to_string();
        let error = Diagnostic::new(&self.source.name, code, message, span, source_line);
        self.errors.push(error);
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_ERRORS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip tokens until a likely statement boundary.
    ///
    /// Always consumes at least one token when no progress was made since
    /// `start`, so callers looping over statements cannot stall.
    pub(crate) fn synchronize(&mut self, start: usize) {
        if self.pos == start && !self.at_end() {
            self.advance();
        }
        while !self.at_end() {
            if self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::Semicolon {
                return;
            }
            if self.newline_before() {
                return;
            }
            match self.peek_kind() {
                TokenKind::Var
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Return
                | TokenKind::Throw
                | TokenKind::Try
                | TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a [`Program`].
    pub fn parse(mut self) -> ParseResult {
        let start = self.current_span();
        let mut body = Vec::new();
        while !self.at_end() && !self.too_many_errors() {
            let before = self.position();
            if self.check(&TokenKind::RBrace) {
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, "unexpected '}'");
                self.advance();
                continue;
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(before),
            }
        }
        let span = start.merge(self.previous_span());
        tracing::trace!(
            script = %self.source.name,
            statements = body.len(),
            errors = self.errors.total_errors,
            "parsed script"
        );
        ParseResult {
            program: Program { body, span },
            errors: self.errors,
        }
    }
}
