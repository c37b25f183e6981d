//! Stencil Parser
//!
//! Parses a [`TokenStream`](stencil_lexer::TokenStream) into a [`Document`].
//! Tags are dispatched through a [`TagRegistry`]; the built-in tags are
//! `if`, `for` and `block`, and [`CommentTokenParser`] adds `comment`, which
//! also receives every comment lexed by
//! [`CommentLexer`](stencil_lexer::CommentLexer).

pub mod ast;
pub mod expr_parser;
pub mod parser;
pub mod tags;

pub use ast::{CommentNode, Document, Expression, Node};
pub use parser::{Parser, TagRegistry, TokenParser};
pub use tags::CommentTokenParser;

use stencil_lexer::{LexError, SyntaxError};

/// Parser error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// A node contract was broken (e.g. a child attached to a leaf node).
    #[error("{0}")]
    Logic(String),
}

impl ParseError {
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Syntax(e) => Some(e.line),
            ParseError::Logic(_) => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        match error {
            LexError::Syntax(e) => ParseError::Syntax(e),
            other => ParseError::Logic(other.to_string()),
        }
    }
}
