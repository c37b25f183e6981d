//! Comment-aware lexer.
//!
//! The plain [`Lexer`](crate::Lexer) skips `{# ... #}` bodies. This lexer
//! runs the same state machine with an armed comment matcher that never
//! closes a body, so every comment start surfaces as
//! [`DataStep::CommentUnclosed`]. The dispatch loop answers by pushing
//! [`LexerState::Comment`], whose case resolves the body with the real
//! matcher and emits:
//!
//! ```text
//! COMMENT_START("{#")  Name("comment")  COMMENT_TEXT(body)  COMMENT_END("#}")
//! ```
//!
//! The parser then handles the span like an explicit `{% comment %}` tag.

use regex::Regex;

use crate::lexer::{DataStep, Matchers, Run};
use crate::token::comment::{COMMENT_END, COMMENT_START, COMMENT_TAG, COMMENT_TEXT};
use crate::token::TokenKind;
use crate::{LexError, LexerOptions, LexerState, Source, TokenStream, Tokenize};

/// Where a comment body ends, relative to the whole source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMatch {
    /// `start` is the offset of the close delimiter (including any trim
    /// modifier), `end` the offset just past it and its trailing whitespace.
    Matched { start: usize, end: usize },
    NotFound,
}

/// Finds the end of a comment body.
#[derive(Debug, Clone)]
pub enum BodyMatcher {
    /// Never finds a close; turns every comment start into a state switch.
    Armed,
    /// Finds the first close delimiter after the cursor.
    Real(Regex),
}

impl BodyMatcher {
    pub fn find(&self, code: &str, from: usize) -> BodyMatch {
        match self {
            BodyMatcher::Armed => BodyMatch::NotFound,
            BodyMatcher::Real(close) => match close.find_at(code, from) {
                Some(m) => BodyMatch::Matched {
                    start: m.start(),
                    end: m.end(),
                },
                None => BodyMatch::NotFound,
            },
        }
    }
}

/// Lexer that keeps comments as tokens.
///
/// Both matchers are derived once in [`CommentLexer::new`] and never change,
/// so an instance can tokenize any number of sources.
#[derive(Debug, Clone)]
pub struct CommentLexer {
    options: LexerOptions,
    matchers: Matchers,
    body_matcher_armed: BodyMatcher,
    body_matcher_real: BodyMatcher,
}

impl CommentLexer {
    pub fn new(options: LexerOptions) -> Result<Self, LexError> {
        let matchers = Matchers::new(&options)?;
        let body_matcher_real = BodyMatcher::Real(matchers.comment_close.clone());
        Ok(Self {
            options,
            matchers,
            body_matcher_armed: BodyMatcher::Armed,
            body_matcher_real,
        })
    }

    pub fn options(&self) -> &LexerOptions {
        &self.options
    }

    fn dispatch(&self, run: &mut Run<'_>) -> Result<(), LexError> {
        // A comment opener at the very end still has to be resolved.
        while !run.is_at_end() || run.state() == LexerState::Comment {
            match run.state() {
                LexerState::Data => {
                    if run.lex_data(&self.body_matcher_armed)? == DataStep::CommentUnclosed {
                        tracing::debug!(line = run.line(), "entering comment state");
                        run.push_state(LexerState::Comment);
                    }
                }
                LexerState::Comment => self.lex_comment(run)?,
                _ => run.step()?,
            }
        }
        Ok(())
    }

    /// The `Comment` case: emit the comment tokens and return to the
    /// previous state.
    fn lex_comment(&self, run: &mut Run<'_>) -> Result<(), LexError> {
        let (open, close) = &self.options.tag_comment;
        run.push_token_raw(COMMENT_START, open.clone());
        run.push_token_raw(TokenKind::Name, COMMENT_TAG);

        let BodyMatch::Matched { start, end } = self.body_matcher_real.find(run.code(), run.cursor())
        else {
            return Err(run.syntax_error("Unclosed comment.").into());
        };

        let text = run.code()[run.cursor()..start].to_string();
        run.push_token_raw(COMMENT_TEXT, text);
        run.push_token_raw(COMMENT_END, close.clone());
        run.move_cursor_to(end);
        run.pop_state()
    }
}

impl Tokenize for CommentLexer {
    #[tracing::instrument(level = "debug", skip_all, fields(source = %source.name))]
    fn tokenize(&self, source: &Source) -> Result<TokenStream, LexError> {
        let mut run = Run::new(&self.options, &self.matchers, source);
        self.dispatch(&mut run)?;
        let stream = run.finish()?;
        tracing::trace!(tokens = stream.len(), "tokenized");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lexer, SyntaxError, Token};
    use pretty_assertions::assert_eq;

    fn lexer() -> CommentLexer {
        CommentLexer::new(LexerOptions::default()).unwrap()
    }

    fn tokens(source: &str) -> Vec<Token> {
        lexer()
            .tokenize(&Source::anonymous(source))
            .unwrap()
            .into_tokens()
    }

    fn pairs(source: &str) -> Vec<(TokenKind, String)> {
        tokens(source).into_iter().map(|t| (t.kind, t.value)).collect()
    }

    fn t(kind: TokenKind, value: &str) -> (TokenKind, String) {
        (kind, value.to_string())
    }

    /// Bodies of every lexed comment, in order.
    fn comment_bodies(source: &str) -> Vec<String> {
        let tokens = tokens(source);
        tokens
            .windows(3)
            .filter(|w| {
                w[0].test_value(COMMENT_START, "{#") && w[1].test_value(TokenKind::Name, COMMENT_TAG)
            })
            .map(|w| w[2].value.clone())
            .collect()
    }

    #[test]
    fn test_comment_tokens() {
        assert_eq!(
            pairs("{# hello #}"),
            vec![
                t(COMMENT_START, "{#"),
                t(TokenKind::Name, "comment"),
                t(COMMENT_TEXT, " hello "),
                t(COMMENT_END, "#}"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_comment_between_text() {
        assert_eq!(
            pairs("a{# b #}c"),
            vec![
                t(TokenKind::Text, "a"),
                t(COMMENT_START, "{#"),
                t(TokenKind::Name, "comment"),
                t(COMMENT_TEXT, " b "),
                t(COMMENT_END, "#}"),
                t(TokenKind::Text, "c"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_two_comments_in_order() {
        assert_eq!(comment_bodies("{# a #}{# b #}"), vec![" a ", " b "]);
    }

    #[test]
    fn test_multiline_comment_keeps_body_and_counts_lines() {
        let tokens = tokens("{# one\ntwo #}\n{{ x }}");
        assert_eq!(tokens[2].value, " one\ntwo ");
        assert_eq!(tokens[2].line, 1);
        // The newline right after `#}` belongs to the comment close.
        assert_eq!(tokens[4].kind, TokenKind::VarStart);
        assert_eq!(tokens[4].line, 3);
    }

    #[test]
    fn test_empty_comment_keeps_empty_text() {
        assert_eq!(
            pairs("{##}"),
            vec![
                t(COMMENT_START, "{#"),
                t(TokenKind::Name, "comment"),
                t(COMMENT_TEXT, ""),
                t(COMMENT_END, "#}"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_trim_modifiers() {
        assert_eq!(
            pairs("a  {#- x -#}  b"),
            vec![
                t(TokenKind::Text, "a"),
                t(COMMENT_START, "{#"),
                t(TokenKind::Name, "comment"),
                t(COMMENT_TEXT, " x "),
                t(COMMENT_END, "#}"),
                t(TokenKind::Text, "b"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_tags_inside_comment_stay_text() {
        assert_eq!(comment_bodies("{# {{ x }} {% if %} #}"), vec![" {{ x }} {% if %} "]);
    }

    #[test]
    fn test_comment_then_block() {
        assert_eq!(
            pairs("{# c #}{% block a %}{% endblock %}"),
            vec![
                t(COMMENT_START, "{#"),
                t(TokenKind::Name, "comment"),
                t(COMMENT_TEXT, " c "),
                t(COMMENT_END, "#}"),
                t(TokenKind::BlockStart, "{%"),
                t(TokenKind::Name, "block"),
                t(TokenKind::Name, "a"),
                t(TokenKind::BlockEnd, "%}"),
                t(TokenKind::BlockStart, "{%"),
                t(TokenKind::Name, "endblock"),
                t(TokenKind::BlockEnd, "%}"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_explicit_tag_is_lexed_normally() {
        assert_eq!(
            pairs("{% comment 'abc' %}"),
            vec![
                t(TokenKind::BlockStart, "{%"),
                t(TokenKind::Name, "comment"),
                t(TokenKind::String, "abc"),
                t(TokenKind::BlockEnd, "%}"),
                t(TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_unterminated_comment_is_fatal() {
        let err = lexer()
            .tokenize(&Source::anonymous("{# unterminated"))
            .unwrap_err();
        assert_eq!(
            err,
            LexError::Syntax(SyntaxError::new("Unclosed comment.", 1, "template"))
        );
    }

    #[test]
    fn test_comment_opener_at_end_is_fatal() {
        let err = lexer().tokenize(&Source::anonymous("text\n{#")).unwrap_err();
        assert!(matches!(err, LexError::Syntax(ref e) if e.message == "Unclosed comment." && e.line == 2));
    }

    #[test]
    fn test_second_comment_unterminated() {
        let err = lexer()
            .tokenize(&Source::anonymous("{# ok #}\n\n{# broken"))
            .unwrap_err();
        assert!(matches!(err, LexError::Syntax(ref e) if e.line == 3));
    }

    #[test]
    fn test_other_errors_propagate() {
        let err = lexer().tokenize(&Source::anonymous("{# ok #}{{ x ")).unwrap_err();
        assert!(err.to_string().contains("Unclosed \"variable\""));
    }

    #[test]
    fn test_reused_instance_is_idempotent() {
        let lexer = lexer();
        let source = Source::anonymous("x{# a #}y{{ z }}{# b #}");
        let first = lexer.tokenize(&source).unwrap();
        let second = lexer.tokenize(&source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_plain_lexer_has_no_comment_tokens() {
        let plain = Lexer::new(LexerOptions::default()).unwrap();
        let stream = plain.tokenize(&Source::anonymous("a{# b #}c")).unwrap();
        assert!(!stream
            .tokens()
            .iter()
            .any(|t| t.test_value(TokenKind::Name, COMMENT_TAG)));
    }

    #[test]
    fn test_custom_delimiters() {
        let options = LexerOptions {
            tag_comment: ("<!--".into(), "-->".into()),
            ..LexerOptions::default()
        };
        let lexer = CommentLexer::new(options).unwrap();
        let stream = lexer.tokenize(&Source::anonymous("<!-- note -->")).unwrap();
        let values: Vec<&str> = stream.tokens().iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["<!--", "comment", " note ", "-->", ""]);
    }

    #[test]
    fn test_armed_matcher_never_matches() {
        assert_eq!(BodyMatcher::Armed.find("{# a #}", 2), BodyMatch::NotFound);
    }
}
