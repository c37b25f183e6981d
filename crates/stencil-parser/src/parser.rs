//! Document parser for Stencil.
//!
//! Walks the token stream, turning text into `Text` nodes, `{{ }}` into
//! `Print` nodes and dispatching `{% name ... %}` to the [`TokenParser`]
//! registered for `name`.

use std::collections::HashMap;

use stencil_lexer::{Token, TokenKind, TokenStream};

use crate::ast::{Document, Expression, Node};
use crate::expr_parser::ExprParser;
use crate::ParseError;

/// Parses one tag, starting right after its name.
pub trait TokenParser: Send + Sync {
    /// Name the tag is registered under.
    fn tag(&self) -> &'static str;

    /// `token` is the tag name; the stream points at the token after it.
    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Node, ParseError>;
}

/// Tag parsers by tag name.
#[derive(Default)]
pub struct TagRegistry {
    parsers: HashMap<String, Box<dyn TokenParser>>,
}

impl TagRegistry {
    /// A registry without any tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `if`, `for` and `block`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for parser in crate::tags::builtins() {
            registry.register(parser);
        }
        registry
    }

    /// Register a tag parser, replacing any parser with the same tag.
    pub fn register(&mut self, parser: Box<dyn TokenParser>) {
        self.parsers.insert(parser.tag().to_string(), parser);
    }

    pub fn get(&self, tag: &str) -> Option<&dyn TokenParser> {
        self.parsers.get(tag).map(|parser| parser.as_ref())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.parsers.contains_key(tag)
    }

    /// Registered tag names, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Stencil document parser.
pub struct Parser<'r> {
    stream: TokenStream,
    tags: &'r TagRegistry,
    /// Names of the blocks being parsed, innermost last.
    block_stack: Vec<String>,
    /// Every block defined so far, with its line.
    blocks: HashMap<String, usize>,
}

impl<'r> Parser<'r> {
    pub fn new(stream: TokenStream, tags: &'r TagRegistry) -> Self {
        Self {
            stream,
            tags,
            block_stack: Vec::new(),
            blocks: HashMap::new(),
        }
    }

    /// Parse a token stream into a document.
    pub fn parse(stream: TokenStream, tags: &TagRegistry) -> Result<Document, ParseError> {
        let name = stream.source_name().to_string();
        let mut parser = Parser::new(stream, tags);
        let nodes = parser.subparse(&[])?;
        tracing::debug!(source = %name, nodes = nodes.len(), "parsed");
        Ok(Document { name, nodes })
    }

    pub fn stream(&self) -> &TokenStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    /// Parse nodes until one of `end_tags` opens a block, or until the end
    /// of the template when `end_tags` is empty.
    ///
    /// On an end tag the stream is left on its name token, so the caller can
    /// tell which one ended the body.
    pub fn subparse(&mut self, end_tags: &[&str]) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();

        while !self.stream.is_eof() {
            match self.stream.current().kind {
                TokenKind::Text => {
                    let token = self.stream.next_token()?;
                    nodes.push(Node::Text {
                        text: token.value,
                        line: token.line,
                    });
                }
                TokenKind::VarStart => {
                    let token = self.stream.next_token()?;
                    let expr = self.parse_expression()?;
                    self.stream.expect(TokenKind::VarEnd, None)?;
                    nodes.push(Node::Print {
                        expr,
                        line: token.line,
                    });
                }
                TokenKind::BlockStart => {
                    self.stream.next_token()?;
                    let token = self.stream.current().clone();

                    if token.kind != TokenKind::Name {
                        return Err(self
                            .stream
                            .error("A block must start with a tag name", token.line)
                            .into());
                    }

                    if end_tags.contains(&token.value.as_str()) {
                        return Ok(nodes);
                    }

                    let tags = self.tags;
                    let Some(handler) = tags.get(&token.value) else {
                        return Err(self.unknown_tag(&token, end_tags).into());
                    };

                    self.stream.next_token()?;
                    tracing::trace!(
                        tag = %token.value,
                        line = token.line,
                        block = ?self.current_block(),
                        "tag"
                    );
                    nodes.push(handler.parse(&token, self)?);
                }
                _ => {
                    let token = self.stream.current();
                    return Err(self
                        .stream
                        .error(
                            format!(
                                "Unexpected token \"{}\" of value \"{}\".",
                                token.kind.describe(),
                                token.value
                            ),
                            token.line,
                        )
                        .into());
                }
            }
        }

        if !end_tags.is_empty() {
            return Err(self
                .stream
                .error(
                    format!(
                        "Unexpected end of template (expecting one of {}).",
                        quoted(end_tags)
                    ),
                    self.stream.current().line,
                )
                .into());
        }

        Ok(nodes)
    }

    fn unknown_tag(&self, token: &Token, end_tags: &[&str]) -> stencil_lexer::SyntaxError {
        let message = if end_tags.is_empty() {
            format!("Unknown \"{}\" tag.", token.value)
        } else {
            format!(
                "Unknown \"{}\" tag (expecting one of {}).",
                token.value,
                quoted(end_tags)
            )
        };
        self.stream.error(message, token.line)
    }

    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        ExprParser::new(&mut self.stream).parse()
    }

    /// Consume the `%}` closing the current tag.
    pub fn expect_block_end(&mut self) -> Result<Token, ParseError> {
        Ok(self.stream.expect(TokenKind::BlockEnd, None)?)
    }

    /// Record a block definition; names are unique per document.
    pub fn enter_block(&mut self, name: &str, line: usize) -> Result<(), ParseError> {
        if let Some(defined) = self.blocks.get(name) {
            return Err(self
                .stream
                .error(
                    format!("The block \"{name}\" has already been defined line {defined}."),
                    line,
                )
                .into());
        }
        self.blocks.insert(name.to_string(), line);
        self.block_stack.push(name.to_string());
        Ok(())
    }

    pub fn leave_block(&mut self) -> Option<String> {
        self.block_stack.pop()
    }

    /// Innermost block being parsed.
    pub fn current_block(&self) -> Option<&str> {
        self.block_stack.last().map(String::as_str)
    }
}

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
