//! Expression parser.
//!
//! Precedence climbing over the operator tokens of the stream; see
//! [`BinaryOp::precedence`] and [`UnaryOp::precedence`] for the table.

use stencil_lexer::{TokenKind, TokenStream};

use crate::ast::{BinaryOp, ExprKind, Expression, UnaryOp};
use crate::ParseError;

pub struct ExprParser<'s> {
    stream: &'s mut TokenStream,
}

impl<'s> ExprParser<'s> {
    pub fn new(stream: &'s mut TokenStream) -> Self {
        Self { stream }
    }

    pub fn parse(&mut self) -> Result<Expression, ParseError> {
        self.parse_expression(0)
    }

    fn parse_expression(&mut self, min_precedence: u16) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let token = self.stream.current();
            if token.kind != TokenKind::Operator {
                break;
            }
            let Some(op) = BinaryOp::from_operator(&token.value) else {
                break;
            };
            if op.precedence() < min_precedence {
                break;
            }

            let line = token.line;
            self.stream.next_token()?;
            let next_min = if op.is_right_associative() {
                op.precedence()
            } else {
                op.precedence() + 1
            };
            let right = self.parse_expression(next_min)?;
            left = Expression::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                line,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let token = self.stream.current();
        if token.kind == TokenKind::Operator {
            if let Some(op) = UnaryOp::from_operator(&token.value) {
                let line = token.line;
                self.stream.next_token()?;
                let operand = self.parse_expression(op.precedence())?;
                return Ok(Expression::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    line,
                ));
            }
        }

        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.stream.current().clone();

        match token.kind {
            TokenKind::Name => {
                self.stream.next_token()?;
                let kind = match token.value.as_str() {
                    "true" | "TRUE" => ExprKind::Boolean(true),
                    "false" | "FALSE" => ExprKind::Boolean(false),
                    "null" | "NULL" | "none" | "NONE" => ExprKind::Null,
                    _ => ExprKind::Name(token.value),
                };
                Ok(Expression::new(kind, token.line))
            }
            TokenKind::Number => {
                self.stream.next_token()?;
                let value: f64 = token.value.parse().map_err(|_| {
                    self.stream
                        .error(format!("Invalid number \"{}\".", token.value), token.line)
                })?;
                Ok(Expression::new(ExprKind::Number(value), token.line))
            }
            TokenKind::String | TokenKind::InterpolationStart => self.parse_string(),
            TokenKind::Punctuation if token.value == "(" => {
                self.stream.next_token()?;
                let expr = self.parse_expression(0)?;
                self.stream.expect(TokenKind::Punctuation, Some(")"))?;
                Ok(expr)
            }
            TokenKind::Punctuation if token.value == "[" => self.parse_array(),
            _ => Err(self
                .stream
                .error(
                    format!(
                        "Unexpected token \"{}\" of value \"{}\".",
                        token.kind.describe(),
                        token.value
                    ),
                    token.line,
                )
                .into()),
        }
    }

    /// A string literal, possibly with `#{ }` interpolations, folded into
    /// a concatenation.
    fn parse_string(&mut self) -> Result<Expression, ParseError> {
        let line = self.stream.current().line;
        let mut parts = Vec::new();
        let mut next_can_be_string = true;

        loop {
            if next_can_be_string {
                if let Some(token) = self.stream.next_if(TokenKind::String, None) {
                    parts.push(Expression::new(ExprKind::String(token.value), token.line));
                    next_can_be_string = false;
                    continue;
                }
            }
            if self
                .stream
                .next_if(TokenKind::InterpolationStart, None)
                .is_some()
            {
                parts.push(self.parse_expression(0)?);
                self.stream.expect(TokenKind::InterpolationEnd, None)?;
                next_can_be_string = true;
                continue;
            }
            break;
        }

        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .unwrap_or_else(|| Expression::new(ExprKind::String(String::new()), line));
        Ok(parts.fold(first, |left, right| {
            Expression::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op: BinaryOp::Concat,
                    right: Box::new(right),
                },
                line,
            )
        }))
    }

    fn parse_array(&mut self) -> Result<Expression, ParseError> {
        let open = self.stream.expect(TokenKind::Punctuation, Some("["))?;
        let mut items = Vec::new();

        while !self.stream.test(TokenKind::Punctuation, Some("]")) {
            if !items.is_empty() {
                self.stream.expect(TokenKind::Punctuation, Some(","))?;
                // Trailing comma
                if self.stream.test(TokenKind::Punctuation, Some("]")) {
                    break;
                }
            }
            items.push(self.parse_expression(0)?);
        }
        self.stream.expect(TokenKind::Punctuation, Some("]"))?;

        Ok(Expression::new(ExprKind::Array(items), open.line))
    }

    fn parse_postfix(&mut self, mut expr: Expression) -> Result<Expression, ParseError> {
        loop {
            let token = self.stream.current().clone();
            if token.kind != TokenKind::Punctuation {
                break;
            }

            expr = match token.value.as_str() {
                "." => {
                    self.stream.next_token()?;
                    let attribute = self.stream.current().clone();
                    if !matches!(attribute.kind, TokenKind::Name | TokenKind::Number) {
                        return Err(self
                            .stream
                            .error(
                                format!(
                                    "Expected name or number after \".\", got \"{}\".",
                                    attribute.kind.describe()
                                ),
                                attribute.line,
                            )
                            .into());
                    }
                    self.stream.next_token()?;
                    Expression::new(
                        ExprKind::GetAttr {
                            object: Box::new(expr),
                            attribute: attribute.value,
                        },
                        token.line,
                    )
                }
                "[" => {
                    self.stream.next_token()?;
                    let index = self.parse_expression(0)?;
                    self.stream.expect(TokenKind::Punctuation, Some("]"))?;
                    Expression::new(
                        ExprKind::GetItem {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        token.line,
                    )
                }
                "|" => {
                    self.stream.next_token()?;
                    let name = self.stream.expect(TokenKind::Name, None)?;
                    let args = if self.stream.test(TokenKind::Punctuation, Some("(")) {
                        self.parse_arguments()?
                    } else {
                        Vec::new()
                    };
                    Expression::new(
                        ExprKind::Filter {
                            input: Box::new(expr),
                            name: name.value,
                            args,
                        },
                        token.line,
                    )
                }
                _ => break,
            };
        }

        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.stream.expect(TokenKind::Punctuation, Some("("))?;
        let mut args = Vec::new();

        while !self.stream.test(TokenKind::Punctuation, Some(")")) {
            if !args.is_empty() {
                self.stream.expect(TokenKind::Punctuation, Some(","))?;
            }
            args.push(self.parse_expression(0)?);
        }
        self.stream.expect(TokenKind::Punctuation, Some(")"))?;

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stencil_lexer::{Lexer, LexerOptions, Source, Tokenize};

    /// Helper: parse the expression inside `{{ }}`.
    fn expr(source: &str) -> Expression {
        let mut stream = Lexer::new(LexerOptions::default())
            .unwrap()
            .tokenize(&Source::anonymous(format!("{{{{ {source} }}}}")))
            .unwrap();
        stream.next_token().unwrap();
        ExprParser::new(&mut stream).parse().unwrap()
    }

    fn binary(kind: &ExprKind) -> (&ExprKind, BinaryOp, &ExprKind) {
        match kind {
            ExprKind::Binary { left, op, right } => (&left.kind, *op, &right.kind),
            other => panic!("Expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(expr("42").kind, ExprKind::Number(42.0));
        assert_eq!(expr("'hi'").kind, ExprKind::String("hi".into()));
        assert_eq!(expr("true").kind, ExprKind::Boolean(true));
        assert_eq!(expr("null").kind, ExprKind::Null);
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3");
        let (left, op, right) = binary(&e.kind);
        assert_eq!(left, &ExprKind::Number(1.0));
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(binary(right).1, BinaryOp::Mul);
    }

    #[test]
    fn test_concat_binds_tighter_than_add() {
        let e = expr("'a' ~ 1 + 2");
        let (left, op, right) = binary(&e.kind);
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(binary(left).1, BinaryOp::Concat);
        assert_eq!(right, &ExprKind::Number(2.0));
    }

    #[test]
    fn test_power_is_right_associative() {
        let e = expr("2 ** 3 ** 2");
        let (left, op, right) = binary(&e.kind);
        assert_eq!(op, BinaryOp::Pow);
        assert_eq!(left, &ExprKind::Number(2.0));
        assert_eq!(binary(right).1, BinaryOp::Pow);
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let e = expr("not a and b");
        let (left, op, _) = binary(&e.kind);
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(left, ExprKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_attribute_item_and_filter() {
        let e = expr("user.tags[0]|upper");
        match e.kind {
            ExprKind::Filter { input, name, args } => {
                assert_eq!(name, "upper");
                assert!(args.is_empty());
                assert!(matches!(input.kind, ExprKind::GetItem { .. }));
            }
            other => panic!("Expected filter, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_arguments() {
        let e = expr("items|join(', ')");
        assert!(matches!(e.kind, ExprKind::Filter { ref args, .. } if args.len() == 1));
    }

    #[test]
    fn test_interpolated_string() {
        let e = expr(r#""Hi #{name}!""#);
        let (left, op, right) = binary(&e.kind);
        assert_eq!(op, BinaryOp::Concat);
        assert_eq!(right, &ExprKind::String("!".into()));
        let (first, _, second) = binary(left);
        assert_eq!(first, &ExprKind::String("Hi ".into()));
        assert_eq!(second, &ExprKind::Name("name".into()));
    }

    #[test]
    fn test_array_with_trailing_comma() {
        assert!(matches!(expr("[1, 2,]").kind, ExprKind::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn test_parentheses() {
        let e = expr("(1 + 2) * 3");
        let (left, op, _) = binary(&e.kind);
        assert_eq!(op, BinaryOp::Mul);
        assert_eq!(binary(left).1, BinaryOp::Add);
    }
}
