//! Stencil Engine
//!
//! Ties the pipeline together: an [`Environment`] owns the active lexer, the
//! tag registry and the compile/render settings. Extensions add tags, and
//! [`CommentExtension`] additionally swaps in the comment-aware lexer.
//!
//! ```
//! use stencil_engine::{CommentExtension, Environment, EnvironmentOptions};
//! use stencil_lexer::Source;
//!
//! let mut env = Environment::new(EnvironmentOptions::default()).unwrap();
//! CommentExtension::set_lexer(&mut env).unwrap();
//! env.add_extension(&CommentExtension);
//!
//! let doc = env.parse_source(&Source::anonymous("{# note #}Hi")).unwrap();
//! assert_eq!(doc.comments()[0].text(), " note ");
//! ```

pub mod environment;
pub mod extension;

pub use environment::{Environment, EnvironmentOptions};
pub use extension::{CommentExtension, Extension};

use stencil_codegen::{CodegenError, RenderError};
use stencil_lexer::LexError;
use stencil_parser::ParseError;

/// Any failure along the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl EngineError {
    /// Template line the error points at, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            EngineError::Lex(LexError::Syntax(e)) => Some(e.line),
            EngineError::Parse(e) => e.line(),
            EngineError::Render(
                RenderError::UndefinedVariable { line, .. }
                | RenderError::UndefinedKey { line, .. }
                | RenderError::UnknownFilter { line, .. }
                | RenderError::InvalidOperand { line, .. },
            ) => Some(*line),
            _ => None,
        }
    }
}
