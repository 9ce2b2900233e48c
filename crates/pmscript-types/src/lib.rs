//! Shared types for the pmscript engine.
//!
//! This crate defines the AST node types, source spans, syntax diagnostics,
//! and the script source wrapper used by the lexer, parser and evaluator.

mod error;
mod span;
pub mod ast;

pub use error::{Diagnostic, DiagnosticCode, Diagnostics, MAX_ERRORS};
pub use span::{ScriptSource, Span};

/// Result type used by the front-end stages.
pub type Result<T> = std::result::Result<T, Diagnostic>;
