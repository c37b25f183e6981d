use crate::token::{Token, TokenKind};
use crate::SyntaxError;

/// Cursor over the tokens of one template.
///
/// The stream always ends with an `Eof` token; the cursor never moves past
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
    current: usize,
    source_name: String,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>, source_name: impl Into<String>) -> Self {
        if !tokens.last().is_some_and(Token::is_eof) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, "", line));
        }
        Self {
            tokens,
            current: 0,
            source_name: source_name.into(),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub fn is_eof(&self) -> bool {
        self.current().is_eof()
    }

    /// Consume the current token and return it.
    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        if self.current + 1 >= self.tokens.len() {
            return Err(self.error("Unexpected end of template.", self.current().line));
        }
        self.current += 1;
        Ok(self.tokens[self.current - 1].clone())
    }

    /// Consume the current token if it matches.
    pub fn next_if(&mut self, kind: TokenKind, value: Option<&str>) -> Option<Token> {
        if self.test(kind, value) {
            self.next_token().ok()
        } else {
            None
        }
    }

    /// Look `n` tokens ahead without moving.
    pub fn look(&self, n: usize) -> Result<&Token, SyntaxError> {
        self.tokens
            .get(self.current + n)
            .ok_or_else(|| self.error("Unexpected end of template.", self.current().line))
    }

    pub fn test(&self, kind: TokenKind, value: Option<&str>) -> bool {
        match value {
            Some(value) => self.current().test_value(kind, value),
            None => self.current().test(kind),
        }
    }

    /// Consume the current token, failing unless it matches.
    pub fn expect(&mut self, kind: TokenKind, value: Option<&str>) -> Result<Token, SyntaxError> {
        if !self.test(kind, value) {
            let token = self.current();
            let found = if token.value.is_empty() {
                String::new()
            } else {
                format!(" of value \"{}\"", token.value)
            };
            let wanted = value.map_or(String::new(), |v| format!(" with value \"{v}\""));
            return Err(self.error(
                format!(
                    "Unexpected token \"{}\"{found} (\"{}\" expected{wanted}).",
                    token.kind.describe(),
                    kind.describe(),
                ),
                token.line,
            ));
        }
        self.next_token()
    }

    /// Insert tokens right after the current one.
    pub fn inject_tokens(&mut self, tokens: impl IntoIterator<Item = Token>) {
        let at = self.current + 1;
        self.tokens.splice(at..at, tokens);
    }

    pub fn error(&self, message: impl Into<String>, line: usize) -> SyntaxError {
        SyntaxError::new(message, line, self.source_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream() -> TokenStream {
        TokenStream::new(
            vec![
                Token::new(TokenKind::BlockStart, "{%", 1),
                Token::new(TokenKind::Name, "comment", 1),
                Token::new(TokenKind::String, "abc", 1),
                Token::new(TokenKind::BlockEnd, "%}", 1),
                Token::new(TokenKind::Eof, "", 1),
            ],
            "page.html",
        )
    }

    #[test]
    fn test_next_returns_consumed_token() {
        let mut stream = stream();
        let token = stream.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::BlockStart);
        assert_eq!(stream.current().value, "comment");
    }

    #[test]
    fn test_next_stops_at_eof() {
        let mut stream = TokenStream::new(Vec::new(), "empty");
        assert!(stream.is_eof());
        let err = stream.next_token().unwrap_err();
        assert_eq!(err.message, "Unexpected end of template.");
    }

    #[test]
    fn test_expect_message() {
        let mut stream = stream();
        let err = stream.expect(TokenKind::Name, Some("block")).unwrap_err();
        assert_eq!(
            err.message,
            "Unexpected token \"begin of statement block\" of value \"{%\" (\"name\" expected with value \"block\")."
        );
        assert_eq!(err.source_name, "page.html");
    }

    #[test]
    fn test_next_if() {
        let mut stream = stream();
        assert!(stream.next_if(TokenKind::Name, None).is_none());
        assert!(stream.next_if(TokenKind::BlockStart, Some("{%")).is_some());
        assert!(stream.test(TokenKind::Name, Some("comment")));
    }

    #[test]
    fn test_inject_after_current() {
        let mut stream = stream();
        stream.next_token().unwrap();
        stream.next_token().unwrap();
        stream.inject_tokens([Token::new(TokenKind::Text, "abc", 1)]);
        assert_eq!(stream.current().kind, TokenKind::String);
        assert_eq!(stream.look(1).unwrap().kind, TokenKind::Text);
        assert_eq!(stream.look(2).unwrap().kind, TokenKind::BlockEnd);
    }
}
