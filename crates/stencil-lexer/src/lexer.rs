//! Base lexer state machine.
//!
//! A template is lexed by a dispatch loop over [`LexerState`]. Every state
//! except `Comment` has a routine on [`Run`]; the routines are shared by the
//! plain [`Lexer`] here and by [`crate::CommentLexer`], which owns its own
//! loop so it can add the `Comment` case.

use regex::Regex;

use crate::comment::{BodyMatch, BodyMatcher};
use crate::token::{Token, TokenKind};
use crate::{LexError, LexerOptions, Source, SyntaxError, TokenStream};

/// Lexer mode: which routine interprets the upcoming characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexerState {
    Data,
    Block,
    Var,
    String,
    Interpolation,
    Comment,
}

/// Anything that can turn a template source into a token stream.
///
/// Implementations keep only immutable configuration; all per-call state
/// lives in a [`Run`], so one instance may be shared freely.
pub trait Tokenize: Send + Sync {
    fn tokenize(&self, source: &Source) -> Result<TokenStream, LexError>;
}

/// Characters trimmed by the `~` modifier.
const LINE_WHITESPACE: &[char] = &[' ', '\t', '\0', '\x0B'];
/// Characters trimmed by the `-` modifier.
const WHITESPACE: &[char] = &[' ', '\t', '\n', '\r', '\0', '\x0B'];
const PUNCTUATION: &str = "()[]{}?:.,|";

/// One entry of the operator table.
#[derive(Debug, Clone)]
pub(crate) struct Operator {
    pattern: Regex,
    /// Word operators (`not`, `in`, ...) must not touch a preceding name.
    word_start: bool,
    /// ... nor a following one.
    word_end: bool,
}

/// Regular expressions compiled once per lexer instance from its options.
#[derive(Debug, Clone)]
pub(crate) struct Matchers {
    tokens_start: Regex,
    block_close: Regex,
    var_close: Regex,
    block_raw: Regex,
    raw_data_end: Regex,
    pub(crate) comment_close: Regex,
    whitespace: Regex,
    name: Regex,
    number: Regex,
    string: Regex,
    interpolation_start: Regex,
    interpolation_end: Regex,
    operators: Vec<Operator>,
}

impl Matchers {
    pub(crate) fn new(options: &LexerOptions) -> Result<Self, LexError> {
        let delimiters = [
            &options.tag_comment,
            &options.tag_block,
            &options.tag_variable,
            &options.interpolation,
        ];
        if delimiters.iter().any(|(open, close)| open.is_empty() || close.is_empty()) {
            return Err(LexError::InvalidOptions("delimiters must not be empty".into()));
        }

        let trim = regex::escape(&options.whitespace_trim.to_string());
        let line_trim = regex::escape(&options.whitespace_line_trim.to_string());
        let close = |delimiter: &str, trailing_newline: bool| {
            format!(
                r"(?:{}\s*|{}[ \t\x00\x0B]*|{}{})",
                regex::escape(&format!("{}{delimiter}", options.whitespace_trim)),
                regex::escape(&format!("{}{delimiter}", options.whitespace_line_trim)),
                regex::escape(delimiter),
                if trailing_newline { r"\n?" } else { "" },
            )
        };
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| LexError::InvalidOptions(e.to_string()))
        };

        let mut operators = options.operators.clone();
        operators.sort_by_key(|op| std::cmp::Reverse(op.len()));
        let operators = operators
            .iter()
            .filter(|op| !op.trim().is_empty())
            .map(|op| {
                let pattern = op
                    .split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+");
                Ok(Operator {
                    pattern: compile(&format!("^{pattern}"))?,
                    word_start: op.starts_with(|c: char| c.is_ascii_alphabetic()),
                    word_end: op.ends_with(|c: char| c.is_ascii_alphabetic()),
                })
            })
            .collect::<Result<Vec<_>, LexError>>()?;

        Ok(Self {
            tokens_start: compile(&format!(
                "({}|{}|{})({trim}|{line_trim})?",
                regex::escape(&options.tag_variable.0),
                regex::escape(&options.tag_block.0),
                regex::escape(&options.tag_comment.0),
            ))?,
            block_close: compile(&format!(r"^\s*{}", close(&options.tag_block.1, true)))?,
            var_close: compile(&format!(r"^\s*{}", close(&options.tag_variable.1, false)))?,
            block_raw: compile(&format!(
                r"^\s*verbatim\s*{}",
                close(&options.tag_block.1, false)
            ))?,
            raw_data_end: compile(&format!(
                r"{}({trim}|{line_trim})?\s*endverbatim\s*{}",
                regex::escape(&options.tag_block.0),
                close(&options.tag_block.1, false),
            ))?,
            comment_close: compile(&close(&options.tag_comment.1, true))?,
            whitespace: compile(r"^\s+")?,
            name: compile(r"^[a-zA-Z_\x{7f}-\x{10FFFF}][a-zA-Z0-9_\x{7f}-\x{10FFFF}]*")?,
            number: compile(r"^[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?")?,
            string: compile(r#"(?s)^(?:"([^#"\\]*(?:\\.[^#"\\]*)*)"|'([^'\\]*(?:\\.[^'\\]*)*)')"#)?,
            interpolation_start: compile(&format!(
                r"^{}\s*",
                regex::escape(&options.interpolation.0)
            ))?,
            interpolation_end: compile(&format!(
                r"^\s*{}",
                regex::escape(&options.interpolation.1)
            ))?,
            operators,
        })
    }
}

/// What the data routine ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataStep {
    Lexed,
    /// A comment start whose body the given matcher could not close.
    CommentUnclosed,
}

/// A tag opener found by the pre-scan.
#[derive(Debug, Clone)]
struct TagStart {
    offset: usize,
    len: usize,
    delimiter: String,
    modifier: Option<char>,
}

/// Mutable state of a single tokenize call.
pub(crate) struct Run<'l> {
    options: &'l LexerOptions,
    matchers: &'l Matchers,
    source_name: &'l str,
    code: String,
    cursor: usize,
    line: usize,
    tokens: Vec<Token>,
    states: Vec<LexerState>,
    brackets: Vec<(String, usize)>,
    positions: Vec<TagStart>,
    position: usize,
    current_var_block_line: usize,
}

impl<'l> Run<'l> {
    pub(crate) fn new(options: &'l LexerOptions, matchers: &'l Matchers, source: &'l Source) -> Self {
        let code = source.code.replace("\r\n", "\n").replace('\r', "\n");
        let positions = matchers
            .tokens_start
            .captures_iter(&code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(TagStart {
                    offset: whole.start(),
                    len: whole.len(),
                    delimiter: caps.get(1)?.as_str().to_string(),
                    modifier: caps.get(2).and_then(|m| m.as_str().chars().next()),
                })
            })
            .collect();

        Self {
            options,
            matchers,
            source_name: &source.name,
            code,
            cursor: 0,
            line: 1,
            tokens: Vec::new(),
            states: vec![LexerState::Data],
            brackets: Vec::new(),
            positions,
            position: 0,
            current_var_block_line: 1,
        }
    }

    // --- State stack ---

    pub(crate) fn state(&self) -> LexerState {
        self.states.last().copied().unwrap_or(LexerState::Data)
    }

    pub(crate) fn push_state(&mut self, state: LexerState) {
        self.states.push(state);
    }

    pub(crate) fn pop_state(&mut self) -> Result<(), LexError> {
        if self.states.len() <= 1 {
            return Err(LexError::InvalidState(self.state()));
        }
        self.states.pop();
        Ok(())
    }

    // --- Cursor ---

    pub(crate) fn is_at_end(&self) -> bool {
        self.cursor >= self.code.len()
    }

    pub(crate) fn code(&self) -> &str {
        &self.code
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn line(&self) -> usize {
        self.line
    }

    fn rest(&self) -> &str {
        &self.code[self.cursor..]
    }

    /// Move the cursor to `offset`, counting the newlines passed over.
    pub(crate) fn move_cursor_to(&mut self, offset: usize) {
        let offset = offset.min(self.code.len());
        self.line += self.code[self.cursor..offset].matches('\n').count();
        self.cursor = offset;
    }

    fn advance(&mut self, len: usize) {
        self.move_cursor_to(self.cursor + len);
    }

    // --- Tokens ---

    /// Push a token; empty text is dropped.
    fn push_token(&mut self, kind: TokenKind, value: impl Into<String>) {
        let value = value.into();
        if kind == TokenKind::Text && value.is_empty() {
            return;
        }
        self.push_token_raw(kind, value);
    }

    /// Push a token unconditionally, even empty text.
    pub(crate) fn push_token_raw(&mut self, kind: TokenKind, value: impl Into<String>) {
        self.tokens.push(Token::new(kind, value, self.line));
    }

    pub(crate) fn syntax_error(&self, message: impl Into<String>) -> SyntaxError {
        self.syntax_error_at(message, self.line)
    }

    fn syntax_error_at(&self, message: impl Into<String>, line: usize) -> SyntaxError {
        SyntaxError::new(message, line, self.source_name)
    }

    /// Emit `Eof` and check that every bracket and tag was closed.
    pub(crate) fn finish(mut self) -> Result<TokenStream, LexError> {
        self.push_token_raw(TokenKind::Eof, "");

        if let Some((expect, line)) = self.brackets.pop() {
            return Err(self.syntax_error_at(format!("Unclosed \"{expect}\"."), line).into());
        }

        let what = match self.state() {
            LexerState::Data => return Ok(TokenStream::new(self.tokens, self.source_name)),
            LexerState::Block => "block",
            _ => "variable",
        };
        Err(self
            .syntax_error_at(format!("Unclosed \"{what}\"."), self.current_var_block_line)
            .into())
    }

    // --- Per-state routines ---

    /// Dispatch one step for every state that has a shared routine.
    ///
    /// `Data` needs the comment matcher and `Comment` belongs to the caller;
    /// both are reported back instead of handled here.
    pub(crate) fn step(&mut self) -> Result<(), LexError> {
        match self.state() {
            LexerState::Block => self.lex_block(),
            LexerState::Var => self.lex_var(),
            LexerState::String => self.lex_string(),
            LexerState::Interpolation => self.lex_interpolation(),
            state @ (LexerState::Data | LexerState::Comment) => Err(LexError::InvalidState(state)),
        }
    }

    pub(crate) fn lex_data(&mut self, comments: &BodyMatcher) -> Result<DataStep, LexError> {
        let Some(tag) = self.next_tag_start() else {
            let text = self.rest().to_string();
            self.push_token(TokenKind::Text, text);
            self.move_cursor_to(self.code.len());
            return Ok(DataStep::Lexed);
        };

        let text = &self.code[self.cursor..tag.offset];
        let text = match tag.modifier {
            Some(m) if m == self.options.whitespace_trim => text.trim_end_matches(WHITESPACE),
            Some(m) if m == self.options.whitespace_line_trim => {
                text.trim_end_matches(LINE_WHITESPACE)
            }
            _ => text,
        }
        .to_string();
        self.push_token(TokenKind::Text, text);
        self.move_cursor_to(tag.offset + tag.len);

        let options = self.options;
        if tag.delimiter == options.tag_comment.0 {
            return Ok(self.lex_comment(comments));
        }

        if tag.delimiter == options.tag_block.0 {
            if let Some(len) = self.match_len(&self.matchers.block_raw) {
                self.advance(len);
                self.lex_raw_data()?;
            } else {
                self.push_token(TokenKind::BlockStart, tag.delimiter);
                self.push_state(LexerState::Block);
                self.current_var_block_line = self.line;
            }
        } else if tag.delimiter == options.tag_variable.0 {
            self.push_token(TokenKind::VarStart, tag.delimiter);
            self.push_state(LexerState::Var);
            self.current_var_block_line = self.line;
        }

        Ok(DataStep::Lexed)
    }

    fn next_tag_start(&mut self) -> Option<TagStart> {
        while let Some(tag) = self.positions.get(self.position) {
            self.position += 1;
            if tag.offset >= self.cursor {
                return Some(tag.clone());
            }
        }
        None
    }

    /// Skip a comment body, or report that `comments` could not close it.
    fn lex_comment(&mut self, comments: &BodyMatcher) -> DataStep {
        match comments.find(&self.code, self.cursor) {
            BodyMatch::Matched { end, .. } => {
                self.move_cursor_to(end);
                DataStep::Lexed
            }
            BodyMatch::NotFound => DataStep::CommentUnclosed,
        }
    }

    fn lex_raw_data(&mut self) -> Result<(), LexError> {
        let Some(caps) = self.matchers.raw_data_end.captures(self.rest()) else {
            return Err(self
                .syntax_error("Unexpected end of file: Unclosed \"verbatim\" block.")
                .into());
        };

        let (Some(whole), modifier) = (caps.get(0), caps.get(1)) else {
            return Ok(());
        };
        let text = &self.rest()[..whole.start()];
        let text = match modifier.and_then(|m| m.as_str().chars().next()) {
            Some(m) if m == self.options.whitespace_trim => text.trim_end_matches(WHITESPACE),
            Some(m) if m == self.options.whitespace_line_trim => {
                text.trim_end_matches(LINE_WHITESPACE)
            }
            _ => text,
        }
        .to_string();
        let end = whole.end();

        self.push_token(TokenKind::Text, text);
        self.advance(end);
        Ok(())
    }

    fn lex_block(&mut self) -> Result<(), LexError> {
        if self.brackets.is_empty() {
            if let Some(len) = self.match_len(&self.matchers.block_close) {
                self.push_token(TokenKind::BlockEnd, self.options.tag_block.1.clone());
                self.advance(len);
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    fn lex_var(&mut self) -> Result<(), LexError> {
        if self.brackets.is_empty() {
            if let Some(len) = self.match_len(&self.matchers.var_close) {
                self.push_token(TokenKind::VarEnd, self.options.tag_variable.1.clone());
                self.advance(len);
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    fn lex_expression(&mut self) -> Result<(), LexError> {
        let matchers = self.matchers;

        if let Some(len) = self.match_len(&matchers.whitespace) {
            self.advance(len);
            if self.is_at_end() {
                let what = if self.state() == LexerState::Block {
                    "block"
                } else {
                    "variable"
                };
                return Err(self
                    .syntax_error_at(format!("Unclosed \"{what}\"."), self.current_var_block_line)
                    .into());
            }
        }

        if let Some((operator, len)) = self.match_operator() {
            self.push_token(TokenKind::Operator, operator);
            self.advance(len);
            return Ok(());
        }

        for (pattern, kind) in [(&matchers.name, TokenKind::Name), (&matchers.number, TokenKind::Number)] {
            if let Some(len) = self.match_len(pattern) {
                let value = self.rest()[..len].to_string();
                self.push_token(kind, value);
                self.advance(len);
                return Ok(());
            }
        }

        let Some(c) = self.rest().chars().next() else {
            return Ok(());
        };

        if PUNCTUATION.contains(c) {
            match c {
                '(' | '[' | '{' => self.brackets.push((c.to_string(), self.line)),
                ')' | ']' | '}' => {
                    let Some((expect, line)) = self.brackets.pop() else {
                        return Err(self.syntax_error(format!("Unexpected \"{c}\".")).into());
                    };
                    let opener = match c {
                        ')' => "(",
                        ']' => "[",
                        _ => "{",
                    };
                    if expect != opener {
                        return Err(self
                            .syntax_error_at(format!("Unclosed \"{expect}\"."), line)
                            .into());
                    }
                }
                _ => {}
            }
            self.push_token(TokenKind::Punctuation, c.to_string());
            self.advance(c.len_utf8());
            return Ok(());
        }

        if let Some(caps) = matchers.string.captures(self.rest()) {
            let raw = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            let value = unescape(raw);
            let len = caps.get(0).map_or(0, |m| m.end());
            self.push_token(TokenKind::String, value);
            self.advance(len);
            return Ok(());
        }

        if c == '"' {
            self.brackets.push(("\"".into(), self.line));
            self.push_state(LexerState::String);
            self.advance(1);
            return Ok(());
        }

        Err(self.syntax_error(format!("Unexpected character \"{c}\".")).into())
    }

    fn lex_string(&mut self) -> Result<(), LexError> {
        let options = self.options;

        if let Some(len) = self.match_len(&self.matchers.interpolation_start) {
            self.brackets.push((options.interpolation.0.clone(), self.line));
            self.push_token(TokenKind::InterpolationStart, options.interpolation.0.clone());
            self.advance(len);
            self.push_state(LexerState::Interpolation);
            return Ok(());
        }

        let len = self.string_part_len();
        if len > 0 {
            let value = unescape(&self.rest()[..len]);
            self.push_token(TokenKind::String, value);
            self.advance(len);
            return Ok(());
        }

        if self.rest().starts_with('"') {
            if let Some((expect, line)) = self.brackets.pop() {
                if expect != "\"" {
                    return Err(self
                        .syntax_error_at(format!("Unclosed \"{expect}\"."), line)
                        .into());
                }
            }
            self.pop_state()?;
            self.advance(1);
            return Ok(());
        }

        let c = self.rest().chars().next().unwrap_or('\0');
        Err(self.syntax_error(format!("Unexpected character \"{c}\".")).into())
    }

    fn lex_interpolation(&mut self) -> Result<(), LexError> {
        let options = self.options;
        let innermost = self
            .brackets
            .last()
            .is_some_and(|(bracket, _)| *bracket == options.interpolation.0);

        if innermost {
            if let Some(len) = self.match_len(&self.matchers.interpolation_end) {
                self.brackets.pop();
                self.push_token(TokenKind::InterpolationEnd, options.interpolation.1.clone());
                self.advance(len);
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    // --- Helpers ---

    /// Length of an anchored match at the cursor.
    fn match_len(&self, pattern: &Regex) -> Option<usize> {
        pattern.find(self.rest()).map(|m| m.end())
    }

    fn match_operator(&self) -> Option<(String, usize)> {
        let rest = self.rest();
        let previous = self.code[..self.cursor].chars().next_back();

        for operator in &self.matchers.operators {
            let Some(m) = operator.pattern.find(rest) else {
                continue;
            };
            if operator.word_start && previous.is_some_and(|c| !is_operator_boundary(c)) {
                continue;
            }
            if operator.word_end && !rest[m.end()..].chars().next().is_some_and(is_operator_boundary)
            {
                continue;
            }
            let value = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            return Some((value, m.end()));
        }
        None
    }

    /// Length of the literal part of a double quoted string at the cursor,
    /// stopping at the closing quote or an interpolation opener.
    fn string_part_len(&self) -> usize {
        let rest = self.rest();
        let interpolation = self.options.interpolation.0.as_str();
        let mut chars = rest.char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return i,
                '\\' => {
                    chars.next();
                }
                _ if rest[i..].starts_with(interpolation) => return i,
                _ => {}
            }
        }
        rest.len()
    }
}

fn is_operator_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | '{')
}

/// Resolve backslash escapes in a string literal.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('v') => out.push('\x0B'),
            Some('f') => out.push('\x0C'),
            Some('e') => out.push('\x1B'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// The plain template lexer. Comments are skipped and never reach the
/// token stream.
#[derive(Debug, Clone)]
pub struct Lexer {
    options: LexerOptions,
    matchers: Matchers,
    comments: BodyMatcher,
}

impl Lexer {
    pub fn new(options: LexerOptions) -> Result<Self, LexError> {
        let matchers = Matchers::new(&options)?;
        let comments = BodyMatcher::Real(matchers.comment_close.clone());
        Ok(Self {
            options,
            matchers,
            comments,
        })
    }

    pub fn options(&self) -> &LexerOptions {
        &self.options
    }

    fn dispatch(&self, run: &mut Run<'_>) -> Result<(), LexError> {
        while !run.is_at_end() {
            match run.state() {
                LexerState::Data => {
                    if run.lex_data(&self.comments)? == DataStep::CommentUnclosed {
                        return Err(run.syntax_error("Unclosed comment.").into());
                    }
                }
                LexerState::Comment => return Err(LexError::InvalidState(LexerState::Comment)),
                _ => run.step()?,
            }
        }
        Ok(())
    }
}

impl Tokenize for Lexer {
    #[tracing::instrument(level = "debug", skip_all, fields(source = %source.name))]
    fn tokenize(&self, source: &Source) -> Result<TokenStream, LexError> {
        let mut run = Run::new(&self.options, &self.matchers, source);
        self.dispatch(&mut run)?;
        let stream = run.finish()?;
        tracing::trace!(tokens = stream.len(), "tokenized");
        Ok(stream)
    }
}
