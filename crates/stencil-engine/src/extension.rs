use stencil_lexer::CommentLexer;
use stencil_parser::{CommentTokenParser, TokenParser};

use crate::{EngineError, Environment};

/// A bundle of tags added to an [`Environment`].
pub trait Extension {
    fn name(&self) -> &'static str;

    fn token_parsers(&self) -> Vec<Box<dyn TokenParser>>;
}

/// Lexes `{# #}` comments into comment nodes and provides the `comment` tag.
///
/// The tag also works on its own (`{% comment "text" %}`); lexed comments
/// additionally need [`CommentExtension::set_lexer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentExtension;

impl CommentExtension {
    /// Replace the environment's lexer with a [`CommentLexer`] built from
    /// its lexer options.
    pub fn set_lexer(env: &mut Environment) -> Result<(), EngineError> {
        let lexer = CommentLexer::new(env.options().lexer.clone())?;
        env.set_lexer(Box::new(lexer));
        Ok(())
    }
}

impl Extension for CommentExtension {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn token_parsers(&self) -> Vec<Box<dyn TokenParser>> {
        vec![Box::new(CommentTokenParser)]
    }
}
