use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics kept before the front-end stops collecting.
pub const MAX_ERRORS: usize = 20;

/// Numeric diagnostic code.
///
/// `E1xx` are lexical errors, `E2xx` syntax errors, `E3xx` structural limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiagnosticCode(pub u16);

impl DiagnosticCode {
    // ── Lexical (E100–E199) ──
    pub const UNEXPECTED_CHARACTER: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const UNTERMINATED_COMMENT: Self = Self(102);
    pub const INVALID_ESCAPE: Self = Self(103);
    pub const INVALID_NUMBER: Self = Self(104);

    // ── Syntax (E200–E299) ──
    pub const UNEXPECTED_TOKEN: Self = Self(200);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(201);
    pub const MISSING_INITIALIZER: Self = Self(202);
    pub const ILLEGAL_STATEMENT: Self = Self(203);

    // ── Structural limits (E300–E399) ──
    pub const NESTING_TOO_DEEP: Self = Self(300);

    /// Human-readable class name shown in front of script-visible messages.
    pub fn class(self) -> &'static str {
        match self.0 {
            300..=399 => "RangeError",
            _ => "SyntaxError",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured lexing/parsing diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({span})")]
pub struct Diagnostic {
    pub file: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The offending source line, for context.
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(
        file: impl Into<String>,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Message in the form a script author sees it, e.g.
    /// `SyntaxError: expected ')', got '}' (3:5)`.
    pub fn script_message(&self) -> String {
        format!("{}: {}", self.code.class(), self)
    }
}

/// Diagnostics collected by one front-end pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub total_errors: usize,
}

impl Diagnostics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// `true` once [`MAX_ERRORS`] have been reported.
    pub fn is_full(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    /// Add an error; only the first [`MAX_ERRORS`] are stored.
    pub fn push(&mut self, error: Diagnostic) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Append every diagnostic from `other` (lexer errors ahead of parser errors).
    pub fn extend(&mut self, other: Diagnostics) {
        let dropped = other.total_errors - other.errors.len();
        for e in other.errors {
            self.push(e);
        }
        self.total_errors += dropped;
    }

    pub fn first(&self) -> Option<&Diagnostic> {
        self.errors.first()
    }
}
