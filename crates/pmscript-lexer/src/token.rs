//! Token types for the pmscript lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of the supported JavaScript
//! subset and [`Token`], which pairs a kind with a source [`Span`].

use pmscript_types::Span;
use std::fmt;

/// All reserved words recognised by the lexer.
///
/// `of`, `undefined`, `NaN` and `Infinity` are deliberately absent: they are
/// ordinary identifiers that the parser or the global scope give meaning to.
pub const ALL_KEYWORDS: &[&str] = &[
    // Declarations (4)
    "var", "let", "const", "function",
    // Control flow (13)
    "if", "else", "for", "while", "do", "break", "continue", "return", "throw",
    "try", "catch", "finally", "in",
    // Operators (4)
    "new", "typeof", "void", "instanceof",
    // Literals (3)
    "true", "false", "null",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator separates this token from the previous one.
    /// Drives automatic statement termination.
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self {
            kind,
            span,
            newline_before: false,
        }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────

    /// `42`, `3.14`, `1e3`, `0xff`
    Number(f64),
    /// `'text'` or `"text"`
    String(String),
    /// Template literal with no substitutions: `` `text` ``
    Template(String),

    // ── Template Interpolation ───────────────────────────────

    /// Text before the first `${` of a template literal.
    TemplateStart(String),
    /// Text between a `}` and the next `${`.
    TemplatePart(String),
    /// Text after the last `}` up to the closing backtick.
    TemplateEnd(String),
    /// `${`
    InterpolationStart,
    /// The `}` that closes an interpolation.
    InterpolationEnd,

    /// `name`, `$value`, `_private`
    Identifier(String),

    // ── Keywords ─────────────────────────────────────────────

    Var,
    Let,
    Const,
    Function,
    If,
    Else,
    For,
    While,
    Do,
    Break,
    Continue,
    Return,
    Throw,
    Try,
    Catch,
    Finally,
    In,
    New,
    TypeOf,
    Void,
    InstanceOf,
    True,
    False,
    Null,

    // ── Operators ────────────────────────────────────────────

    Plus,
    Minus,
    Star,
    /// `**`
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `===`
    EqEqEq,
    /// `!`
    Bang,
    /// `!=`
    BangEq,
    /// `!==`
    BangEqEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `??`
    QuestionQuestion,
    /// `?`
    Question,
    /// `?.`
    QuestionDot,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    /// `=>`
    Arrow,
    /// `...`
    DotDotDot,

    // ── Punctuation ──────────────────────────────────────────

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,

    Eof,
}

impl TokenKind {
    /// Look up a reserved word; `None` for ordinary identifiers.
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "var" => TokenKind::Var,
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "function" => TokenKind::Function,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "throw" => TokenKind::Throw,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "in" => TokenKind::In,
            "new" => TokenKind::New,
            "typeof" => TokenKind::TypeOf,
            "void" => TokenKind::Void,
            "instanceof" => TokenKind::InstanceOf,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Var
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Throw
                | TokenKind::Try
                | TokenKind::Catch
                | TokenKind::Finally
                | TokenKind::In
                | TokenKind::New
                | TokenKind::TypeOf
                | TokenKind::Void
                | TokenKind::InstanceOf
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Number(n) => return write!(f, "{n}"),
            TokenKind::String(s) => return write!(f, "'{s}'"),
            TokenKind::Template(s) => return write!(f, "`{s}`"),
            TokenKind::Identifier(s) => return f.write_str(s),
            TokenKind::TemplateStart(_) => "template start",
            TokenKind::TemplatePart(_) => "template part",
            TokenKind::TemplateEnd(_) => "template end",
            TokenKind::InterpolationStart => "${",
            TokenKind::InterpolationEnd => "interpolation end",
            TokenKind::Var => "var",
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Function => "function",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Throw => "throw",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Finally => "finally",
            TokenKind::In => "in",
            TokenKind::New => "new",
            TokenKind::TypeOf => "typeof",
            TokenKind::Void => "void",
            TokenKind::InstanceOf => "instanceof",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::EqEqEq => "===",
            TokenKind::Bang => "!",
            TokenKind::BangEq => "!=",
            TokenKind::BangEqEq => "!==",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::QuestionQuestion => "??",
            TokenKind::Question => "?",
            TokenKind::QuestionDot => "?.",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::Arrow => "=>",
            TokenKind::DotDotDot => "...",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
