//! # Cypher Reader
//!
//! Parser for the read-only query dialect that traversals render.
//! Pure functions: no I/O, no state, no storage dependency.

pub mod ast;
pub mod lexer;
pub mod parser;

use crate::Result;
use ast::ReadQuery;

/// Parse a query string into an AST.
pub fn parse(query: &str) -> Result<ReadQuery> {
    let tokens = lexer::tokenize(query)?;
    parser::parse_query(&tokens)
}
