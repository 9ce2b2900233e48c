//! pmscript parser: converts a token stream into an AST.

mod parse_expr;
mod parse_fn;
mod parse_stmt;
mod parser;

pub use parser::{parse_script, ParseResult, Parser, MAX_NESTING};
