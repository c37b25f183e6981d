use stencil_lexer::{Token, TokenKind};

use crate::ast::{ForNode, IfBranch, IfNode, Node};
use crate::parser::{Parser, TokenParser};
use crate::ParseError;

/// `{% if %}` ... `{% elseif %}` ... `{% else %}` ... `{% endif %}`
#[derive(Debug, Clone, Copy, Default)]
pub struct IfTokenParser;

impl TokenParser for IfTokenParser {
    fn tag(&self) -> &'static str {
        "if"
    }

    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        let condition = parser.parse_expression()?;
        parser.expect_block_end()?;
        let body = parser.subparse(&["elseif", "else", "endif"])?;

        let mut branches = vec![IfBranch { condition, body }];
        let mut else_body = None;

        loop {
            let end = parser.stream_mut().next_token()?;
            match end.value.as_str() {
                "else" => {
                    parser.expect_block_end()?;
                    else_body = Some(parser.subparse(&["endif"])?);
                }
                "elseif" => {
                    let condition = parser.parse_expression()?;
                    parser.expect_block_end()?;
                    let body = parser.subparse(&["elseif", "else", "endif"])?;
                    branches.push(IfBranch { condition, body });
                }
                "endif" => break,
                other => {
                    return Err(parser
                        .stream()
                        .error(
                            format!(
                                "Unexpected \"{other}\" tag closing the \"if\" block started at line {}.",
                                token.line
                            ),
                            end.line,
                        )
                        .into())
                }
            }
        }
        parser.expect_block_end()?;

        Ok(Node::If(IfNode {
            branches,
            else_body,
            line: token.line,
        }))
    }
}

/// `{% for [key,] value in iterable %}` ... `{% else %}` ... `{% endfor %}`
#[derive(Debug, Clone, Copy, Default)]
pub struct ForTokenParser;

impl TokenParser for ForTokenParser {
    fn tag(&self) -> &'static str {
        "for"
    }

    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Node, ParseError> {
        let stream = parser.stream_mut();
        let first = stream.expect(TokenKind::Name, None)?;
        let (key, target) = if stream.next_if(TokenKind::Punctuation, Some(",")).is_some() {
            let target = stream.expect(TokenKind::Name, None)?;
            (Some(first.value), target.value)
        } else {
            (None, first.value)
        };
        stream.expect(TokenKind::Operator, Some("in"))?;

        let iterable = parser.parse_expression()?;
        parser.expect_block_end()?;
        let body = parser.subparse(&["else", "endfor"])?;

        let mut else_body = None;
        if parser.stream_mut().next_token()?.value == "else" {
            parser.expect_block_end()?;
            else_body = Some(parser.subparse(&["endfor"])?);
            parser.stream_mut().next_token()?;
        }
        parser.expect_block_end()?;

        Ok(Node::For(ForNode {
            key,
            target,
            iterable,
            body,
            else_body,
            line: token.line,
        }))
    }
}
