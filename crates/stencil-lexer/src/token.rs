use std::fmt;

/// Token classification for Stencil templates.
///
/// Values live on [`Token::value`] as text; a `Number` keeps its source
/// spelling and is converted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Eof,
    Text,
    BlockStart,
    VarStart,
    BlockEnd,
    VarEnd,
    Name,
    Number,
    String,
    Operator,
    Punctuation,
    InterpolationStart,
    InterpolationEnd,
}

impl TokenKind {
    /// English name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of template",
            TokenKind::Text => "text",
            TokenKind::BlockStart => "begin of statement block",
            TokenKind::VarStart => "begin of print statement",
            TokenKind::BlockEnd => "end of statement block",
            TokenKind::VarEnd => "end of print statement",
            TokenKind::Name => "name",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
            TokenKind::InterpolationStart => "begin of string interpolation",
            TokenKind::InterpolationEnd => "end of string interpolation",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A token produced by the Stencil lexer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
        }
    }

    pub fn test(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn test_value(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Comment roles, aliased onto generic kinds.
///
/// A lexed comment reads like a block tag (`{% comment ... %}`), so its
/// delimiters reuse the block kinds and its body reuses `Text`. Which role a
/// token plays follows from its position in the stream, not from its kind.
pub mod comment {
    use super::TokenKind;

    pub const COMMENT_START: TokenKind = TokenKind::BlockStart;
    pub const COMMENT_TEXT: TokenKind = TokenKind::Text;
    pub const COMMENT_END: TokenKind = TokenKind::BlockEnd;

    /// Tag name emitted between `COMMENT_START` and the body.
    pub const COMMENT_TAG: &str = "comment";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_kinds_alias_block_kinds() {
        assert_eq!(comment::COMMENT_START, TokenKind::BlockStart);
        assert_eq!(comment::COMMENT_TEXT, TokenKind::Text);
        assert_eq!(comment::COMMENT_END, TokenKind::BlockEnd);
    }

    #[test]
    fn test_token_test_value() {
        let token = Token::new(TokenKind::Name, "comment", 3);
        assert!(token.test(TokenKind::Name));
        assert!(token.test_value(TokenKind::Name, "comment"));
        assert!(!token.test_value(TokenKind::Name, "block"));
        assert!(!token.test(TokenKind::String));
    }

    #[test]
    fn test_describe() {
        assert_eq!(TokenKind::Eof.describe(), "end of template");
        assert_eq!(TokenKind::BlockEnd.to_string(), "end of statement block");
    }
}
