//! Tag parsers.

mod block;
mod comment;
mod control;

pub use block::BlockTokenParser;
pub use comment::CommentTokenParser;
pub use control::{ForTokenParser, IfTokenParser};

use crate::parser::TokenParser;

/// Tags every registry starts with.
pub fn builtins() -> Vec<Box<dyn TokenParser>> {
    vec![
        Box::new(IfTokenParser),
        Box::new(ForTokenParser),
        Box::new(BlockTokenParser),
    ]
}
