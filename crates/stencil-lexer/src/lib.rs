//! Stencil Lexer
//!
//! Tokenizes Stencil templates (`{{ var }}`, `{% tag %}`, `{# comment #}`)
//! into a [`TokenStream`]. Two tokenizers share one state machine:
//!
//! - [`Lexer`] skips comments entirely.
//! - [`CommentLexer`] turns each `{# ... #}` span into a
//!   `COMMENT_START` / `comment` / `COMMENT_TEXT` / `COMMENT_END` sequence
//!   that the parser handles like an explicit `{% comment %}` tag.
//!
//! # Example
//!
//! ```
//! use stencil_lexer::{CommentLexer, LexerOptions, Source, TokenKind, Tokenize};
//!
//! let lexer = CommentLexer::new(LexerOptions::default()).unwrap();
//! let stream = lexer.tokenize(&Source::anonymous("{# hello #}")).unwrap();
//! let text = stream
//!     .tokens()
//!     .iter()
//!     .find(|t| t.kind == TokenKind::Text)
//!     .unwrap();
//! assert_eq!(text.value, " hello ");
//! ```

pub mod comment;
pub mod lexer;
pub mod options;
pub mod stream;
pub mod token;

pub use comment::{BodyMatch, BodyMatcher, CommentLexer};
pub use lexer::{Lexer, LexerState, Tokenize};
pub use options::LexerOptions;
pub use stream::TokenStream;
pub use token::{Token, TokenKind};

/// Template source text plus the name used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub code: String,
}

impl Source {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// A source without a file behind it (inline strings, tests).
    pub fn anonymous(code: impl Into<String>) -> Self {
        Self::new("template", code)
    }
}

/// A malformed template, with the line it was detected on.
///
/// Displayed as `Unclosed comment in "page.html" at line 3.`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{} in \"{source_name}\" at line {line}.",
    message.strip_suffix('.').unwrap_or(message)
)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub source_name: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, source_name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            source_name: source_name.into(),
        }
    }
}

/// Lexer failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// The dispatch loop reached a state it has no routine for.
    #[error("Invalid lexer state {0:?}.")]
    InvalidState(LexerState),

    #[error("Invalid lexer options: {0}")]
    InvalidOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new("Unclosed comment.", 3, "page.html");
        assert_eq!(err.to_string(), "Unclosed comment in \"page.html\" at line 3.");

        let err = SyntaxError::new("Unknown \"x\" tag (expecting one of \"endif\")", 1, "t");
        assert_eq!(
            err.to_string(),
            "Unknown \"x\" tag (expecting one of \"endif\") in \"t\" at line 1."
        );
    }
}
