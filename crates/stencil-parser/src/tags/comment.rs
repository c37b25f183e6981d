use stencil_lexer::token::comment::{COMMENT_END, COMMENT_TAG, COMMENT_TEXT};
use stencil_lexer::{Token, TokenKind};

use crate::ast::{CommentNode, Node};
use crate::parser::{Parser, TokenParser};
use crate::ParseError;

/// Parses `comment` tags into [`CommentNode`]s.
///
/// Two token shapes reach this parser:
///
/// - `{% comment "text" %}`: the string becomes the text and the node is
///   exposed to debug output;
/// - `COMMENT_START comment COMMENT_TEXT COMMENT_END` as produced by
///   [`CommentLexer`](stencil_lexer::CommentLexer) for `{# text #}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentTokenParser;

impl TokenParser for CommentTokenParser {
    fn tag(&self) -> &'static str {
        COMMENT_TAG
    }

    fn parse(&self, _token: &Token, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        let stream = parser.stream_mut();
        let current = stream.current().clone();

        let exposed = current.kind == TokenKind::String;
        if exposed {
            stream.inject_tokens([Token::new(COMMENT_TEXT, current.value.clone(), current.line)]);
            stream.next_token()?;
        }

        let text = stream.expect(COMMENT_TEXT, None)?;
        stream.expect(COMMENT_END, None)?;

        Ok(Node::Comment(CommentNode::new(
            text.value,
            exposed,
            current.line,
        )))
    }
}
