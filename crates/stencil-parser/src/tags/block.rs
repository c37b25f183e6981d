use stencil_lexer::{Token, TokenKind};

use crate::ast::{BlockNode, Node};
use crate::parser::{Parser, TokenParser};
use crate::ParseError;

/// `{% block name %}` ... `{% endblock [name] %}`, or the short form
/// `{% block name expr %}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTokenParser;

impl TokenParser for BlockTokenParser {
    fn tag(&self) -> &'static str {
        "block"
    }

    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        let name = parser.stream_mut().expect(TokenKind::Name, None)?.value;
        parser.enter_block(&name, token.line)?;

        let body = if parser.stream().test(TokenKind::BlockEnd, None) {
            parser.expect_block_end()?;
            let body = parser.subparse(&["endblock"])?;
            parser.stream_mut().next_token()?;

            if let Some(end_name) = parser.stream_mut().next_if(TokenKind::Name, None) {
                if end_name.value != name {
                    return Err(parser
                        .stream()
                        .error(
                            format!(
                                "Expected endblock for block \"{name}\" (but \"{}\" given).",
                                end_name.value
                            ),
                            end_name.line,
                        )
                        .into());
                }
            }
            body
        } else {
            let expr = parser.parse_expression()?;
            vec![Node::Print {
                line: expr.line,
                expr,
            }]
        };
        parser.expect_block_end()?;
        parser.leave_block();

        Ok(Node::Block(BlockNode {
            name,
            body,
            line: token.line,
        }))
    }
}
