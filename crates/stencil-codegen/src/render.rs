//! Direct renderer.
//!
//! Interprets a document against a JSON context without going through the
//! compiled module. Values follow the same coercion rules as the JavaScript
//! runtime: `null` and `false` print as the empty string, `true` as `1`,
//! arrays and objects as JSON.

use serde::Deserialize;
use serde_json::{Map, Value};

use stencil_parser::ast::{BinaryOp, ExprKind, Expression, ForNode, IfNode, Node, UnaryOp};
use stencil_parser::Document;

use crate::{escape_html, format_number};

/// Renderer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// HTML-escape printed values unless marked safe by `raw`/`escape`.
    pub autoescape: bool,
    /// Fail on undefined names and attributes instead of printing nothing.
    pub strict_variables: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            autoescape: true,
            strict_variables: false,
        }
    }
}

/// Rendering error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Variable \"{name}\" does not exist at line {line}.")]
    UndefinedVariable { name: String, line: usize },

    #[error("Key \"{key}\" does not exist at line {line}.")]
    UndefinedKey { key: String, line: usize },

    #[error("Unknown \"{name}\" filter at line {line}.")]
    UnknownFilter { name: String, line: usize },

    #[error("{message} at line {line}.")]
    InvalidOperand { message: String, line: usize },
}

/// Render a document against `context`.
///
/// A non-object context is treated as empty.
pub fn render(
    doc: &Document,
    context: &Value,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let root = match context {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let mut renderer = Renderer {
        options,
        scopes: vec![root],
        out: String::new(),
    };
    renderer.render_nodes(&doc.nodes)?;
    Ok(renderer.out)
}

/// An evaluated value, with whether it may be printed without escaping.
#[derive(Debug, Clone, PartialEq)]
struct Evaluated {
    value: Value,
    safe: bool,
}

impl Evaluated {
    fn new(value: Value) -> Self {
        Self { value, safe: false }
    }

    fn safe(value: Value) -> Self {
        Self { value, safe: true }
    }
}

struct Renderer<'o> {
    options: &'o RenderOptions,
    /// Innermost scope last; the first one is the context.
    scopes: Vec<Map<String, Value>>,
    out: String,
}

impl Renderer<'_> {
    fn render_nodes(&mut self, nodes: &[Node]) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node) -> Result<(), RenderError> {
        match node {
            Node::Text { text, .. } => self.out.push_str(text),
            Node::Print { expr, .. } => {
                let evaluated = self.eval(expr)?;
                let text = to_text(&evaluated.value);
                if self.options.autoescape && !evaluated.safe {
                    self.out.push_str(&escape_html(&text));
                } else {
                    self.out.push_str(&text);
                }
            }
            Node::If(node) => self.render_if(node)?,
            Node::For(node) => self.render_for(node)?,
            Node::Block(node) => self.render_nodes(&node.body)?,
            Node::Comment(_) => {}
        }
        Ok(())
    }

    fn render_if(&mut self, node: &IfNode) -> Result<(), RenderError> {
        for branch in &node.branches {
            if is_truthy(&self.eval(&branch.condition)?.value) {
                return self.render_nodes(&branch.body);
            }
        }
        if let Some(body) = &node.else_body {
            self.render_nodes(body)?;
        }
        Ok(())
    }

    fn render_for(&mut self, node: &ForNode) -> Result<(), RenderError> {
        let items: Vec<(Value, Value)> = match self.eval(&node.iterable)?.value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            _ => Vec::new(),
        };

        if items.is_empty() {
            if let Some(body) = &node.else_body {
                self.render_nodes(body)?;
            }
            return Ok(());
        }

        let length = items.len();
        for (i, (key, value)) in items.into_iter().enumerate() {
            let mut scope = Map::new();
            scope.insert(node.target.clone(), value);
            if let Some(key_name) = &node.key {
                scope.insert(key_name.clone(), key);
            }
            scope.insert(
                "loop".into(),
                serde_json::json!({
                    "index": i + 1,
                    "index0": i,
                    "first": i == 0,
                    "last": i + 1 == length,
                    "length": length,
                }),
            );

            self.scopes.push(scope);
            let result = self.render_nodes(&node.body);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn eval(&self, expr: &Expression) -> Result<Evaluated, RenderError> {
        let value = match &expr.kind {
            ExprKind::Null => Value::Null,
            ExprKind::Boolean(b) => Value::Bool(*b),
            ExprKind::Number(n) => number(*n),
            ExprKind::String(s) => Value::String(s.clone()),
            ExprKind::Name(name) => match self.lookup(name) {
                Some(value) => value.clone(),
                None if self.options.strict_variables => {
                    return Err(RenderError::UndefinedVariable {
                        name: name.clone(),
                        line: expr.line,
                    })
                }
                None => Value::Null,
            },
            ExprKind::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item).map(|e| e.value))
                    .collect::<Result<_, _>>()?,
            ),
            ExprKind::GetAttr { object, attribute } => {
                let object = self.eval(object)?.value;
                self.get(&object, &Value::String(attribute.clone()), expr.line)?
            }
            ExprKind::GetItem { object, index } => {
                let object = self.eval(object)?.value;
                let index = self.eval(index)?.value;
                self.get(&object, &index, expr.line)?
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?.value;
                match op {
                    UnaryOp::Not => Value::Bool(!is_truthy(&operand)),
                    UnaryOp::Neg => number(-to_number(&operand, expr.line)?),
                    UnaryOp::Pos => number(to_number(&operand, expr.line)?),
                }
            }
            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right, expr.line)?,
            ExprKind::Filter { input, name, args } => {
                return self.eval_filter(input, name, args, expr.line)
            }
        };
        Ok(Evaluated::new(value))
    }

    fn get(&self, object: &Value, key: &Value, line: usize) -> Result<Value, RenderError> {
        let found = match (object, key) {
            (Value::Object(map), _) => map.get(&to_text(key)).cloned(),
            (Value::Array(items), Value::Number(n)) => {
                n.as_u64().and_then(|i| items.get(i as usize)).cloned()
            }
            (Value::Array(items), Value::String(s)) => {
                s.parse::<usize>().ok().and_then(|i| items.get(i)).cloned()
            }
            _ => None,
        };
        match found {
            Some(value) => Ok(value),
            None if self.options.strict_variables => Err(RenderError::UndefinedKey {
                key: to_text(key),
                line,
            }),
            None => Ok(Value::Null),
        }
    }

    fn eval_binary(
        &self,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
        line: usize,
    ) -> Result<Value, RenderError> {
        let l = self.eval(left)?.value;

        // Short-circuit before evaluating the right side.
        match op {
            BinaryOp::Or if is_truthy(&l) => return Ok(Value::Bool(true)),
            BinaryOp::And if !is_truthy(&l) => return Ok(Value::Bool(false)),
            _ => {}
        }

        let r = self.eval(right)?.value;
        let value = match op {
            BinaryOp::Or | BinaryOp::And => Value::Bool(is_truthy(&r)),
            BinaryOp::Eq => Value::Bool(loose_eq(&l, &r)),
            BinaryOp::NotEq => Value::Bool(!loose_eq(&l, &r)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let ordering = match (&l, &r) {
                    (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                    _ => to_number(&l, line)?.partial_cmp(&to_number(&r, line)?),
                };
                Value::Bool(match (op, ordering) {
                    (_, None) => false,
                    (BinaryOp::Lt, Some(o)) => o.is_lt(),
                    (BinaryOp::Gt, Some(o)) => o.is_gt(),
                    (BinaryOp::LtEq, Some(o)) => o.is_le(),
                    (_, Some(o)) => o.is_ge(),
                })
            }
            BinaryOp::In => Value::Bool(contains(&r, &l)),
            BinaryOp::NotIn => Value::Bool(!contains(&r, &l)),
            BinaryOp::Concat => Value::String(to_text(&l) + &to_text(&r)),
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::FloorDiv
            | BinaryOp::Mod
            | BinaryOp::Pow => {
                let (a, b) = (to_number(&l, line)?, to_number(&r, line)?);
                if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
                    return Err(RenderError::InvalidOperand {
                        message: "Division by zero".into(),
                        line,
                    });
                }
                number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::FloorDiv => (a / b).floor(),
                    BinaryOp::Mod => a % b,
                    _ => a.powf(b),
                })
            }
        };
        Ok(value)
    }

    fn eval_filter(
        &self,
        input: &Expression,
        name: &str,
        args: &[Expression],
        line: usize,
    ) -> Result<Evaluated, RenderError> {
        // `default` must see undefined names even in strict mode.
        let input = if name == "default" {
            match self.eval(input) {
                Ok(evaluated) => evaluated,
                Err(RenderError::UndefinedVariable { .. } | RenderError::UndefinedKey { .. }) => {
                    Evaluated::new(Value::Null)
                }
                Err(e) => return Err(e),
            }
        } else {
            self.eval(input)?
        };
        let args = args
            .iter()
            .map(|arg| self.eval(arg).map(|e| e.value))
            .collect::<Result<Vec<_>, _>>()?;
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

        let result = match name {
            "upper" => Evaluated::new(Value::String(to_text(&input.value).to_uppercase())),
            "lower" => Evaluated::new(Value::String(to_text(&input.value).to_lowercase())),
            "trim" => Evaluated::new(Value::String(to_text(&input.value).trim().to_string())),
            "length" => Evaluated::new(Value::from(length(&input.value))),
            "join" => {
                let separator = to_text(&arg(0));
                let parts: Vec<String> = match &input.value {
                    Value::Array(items) => items.iter().map(to_text).collect(),
                    Value::Object(map) => map.values().map(to_text).collect(),
                    Value::Null => Vec::new(),
                    other => vec![to_text(other)],
                };
                Evaluated::new(Value::String(parts.join(&separator)))
            }
            "default" => {
                if is_empty(&input.value) {
                    Evaluated::new(args.first().cloned().unwrap_or(Value::String(String::new())))
                } else {
                    input
                }
            }
            "escape" | "e" => {
                if input.safe {
                    input
                } else {
                    Evaluated::safe(Value::String(escape_html(&to_text(&input.value))))
                }
            }
            "raw" => Evaluated::safe(input.value),
            _ => {
                return Err(RenderError::UnknownFilter {
                    name: name.to_string(),
                    line,
                })
            }
        };
        Ok(result)
    }
}

// =========================================================================
// Value coercion
// =========================================================================

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn to_number(value: &Value, line: usize) -> Result<f64, RenderError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s.trim().parse().map_err(|_| RenderError::InvalidOperand {
            message: format!("Unsupported operand \"{s}\""),
            line,
        }),
        Value::Array(_) | Value::Object(_) => Err(RenderError::InvalidOperand {
            message: "Unsupported operand type".into(),
            line,
        }),
    }
}

/// Printable form of a value.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".into(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn length(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => to_text(other).chars().count(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            to_text(a) == to_text(b)
        }
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => s.contains(&to_text(needle)),
        Value::Object(map) => map.contains_key(&to_text(needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stencil_lexer::{Lexer, LexerOptions, Source, Tokenize};
    use stencil_parser::{Parser, TagRegistry};

    fn parse(source: &str) -> Document {
        let stream = Lexer::new(LexerOptions::default())
            .unwrap()
            .tokenize(&Source::anonymous(source))
            .unwrap();
        Parser::parse(stream, &TagRegistry::with_builtins()).unwrap()
    }

    fn render_with(source: &str, context: Value, options: &RenderOptions) -> Result<String, RenderError> {
        render(&parse(source), &context, options)
    }

    fn r(source: &str, context: Value) -> String {
        render_with(source, context, &RenderOptions::default()).unwrap()
    }

    // =========================================================================
    // Printing
    // =========================================================================

    #[test]
    fn test_text_only() {
        assert_eq!(r("Hello\n  world", json!({})), "Hello\n  world");
    }

    #[test]
    fn test_print_values() {
        assert_eq!(
            r("{{ s }}|{{ n }}|{{ f }}|{{ t }}|{{ no }}|{{ missing }}", json!({
                "s": "x", "n": 3, "f": 1.5, "t": true, "no": false
            })),
            "x|3|1.5|1||"
        );
    }

    #[test]
    fn test_autoescape() {
        let context = json!({ "html": "<b>&</b>" });
        assert_eq!(r("{{ html }}", context.clone()), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(r("{{ html|raw }}", context.clone()), "<b>&</b>");
        assert_eq!(r("{{ html|e }}", context.clone()), "&lt;b&gt;&amp;&lt;/b&gt;");

        let options = RenderOptions {
            autoescape: false,
            ..RenderOptions::default()
        };
        assert_eq!(render_with("{{ html }}", context, &options).unwrap(), "<b>&</b>");
    }

    // =========================================================================
    // Expressions and filters
    // =========================================================================

    #[test]
    fn test_arithmetic_and_concat() {
        assert_eq!(r("{{ 1 + 2 * 3 }}", json!({})), "7");
        assert_eq!(r("{{ 7 // 2 }} {{ 7 % 4 }} {{ 2 ** 3 }}", json!({})), "3 3 8");
        assert_eq!(r("{{ 'n' ~ (1 + 1) }}", json!({})), "n2");
        assert_eq!(r("{{ '1' ~ 2 + 1 }}", json!({})), "13");
    }

    #[test]
    fn test_attribute_access() {
        let context = json!({ "user": { "name": "Ada", "tags": ["a", "b"] } });
        assert_eq!(r("{{ user.name }} {{ user.tags[1] }} {{ user.tags.0 }}", context), "Ada b a");
    }

    #[test]
    fn test_filters() {
        let context = json!({ "name": "  Ada  ", "items": [1, 2, 3], "empty": "" });
        assert_eq!(r("{{ name|trim|upper }}", context.clone()), "ADA");
        assert_eq!(r("{{ items|length }}", context.clone()), "3");
        assert_eq!(r("{{ items|join(', ') }}", context.clone()), "1, 2, 3");
        assert_eq!(r("{{ empty|default('none') }}", context.clone()), "none");
        assert_eq!(r("{{ 'ABC'|lower }}", context), "abc");
    }

    #[test]
    fn test_in_operator() {
        let context = json!({ "items": [1, 2], "word": "stencil" });
        assert_eq!(r("{{ 2 in items }}{{ 3 in items }}{{ 'ten' in word }}", context), "11");
        assert_eq!(r("{{ 3 not in [1, 2] }}", json!({})), "1");
    }

    #[test]
    fn test_unknown_filter() {
        let err = render_with("{{ a|nope }}", json!({}), &RenderOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown \"nope\" filter at line 1.");
    }

    #[test]
    fn test_division_by_zero() {
        let err = render_with("{{ 1 / 0 }}", json!({}), &RenderOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Division by zero at line 1.");
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_branches() {
        let source = "{% if n > 1 %}many{% elseif n == 1 %}one{% else %}none{% endif %}";
        assert_eq!(r(source, json!({ "n": 5 })), "many");
        assert_eq!(r(source, json!({ "n": 1 })), "one");
        assert_eq!(r(source, json!({ "n": 0 })), "none");
    }

    #[test]
    fn test_for_loop() {
        let context = json!({ "items": ["a", "b", "c"] });
        assert_eq!(
            r("{% for i, x in items %}{{ i }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}", context),
            "0a,1b,2c"
        );
    }

    #[test]
    fn test_for_else() {
        assert_eq!(r("{% for x in items %}{{ x }}{% else %}empty{% endfor %}", json!({ "items": [] })), "empty");
    }

    #[test]
    fn test_for_scope_is_restored() {
        let context = json!({ "x": "outer", "items": [1] });
        assert_eq!(r("{% for x in items %}{{ x }}{% endfor %}{{ x }}", context), "1outer");
    }

    #[test]
    fn test_block_renders_inline() {
        assert_eq!(r("[{% block a %}x{% endblock %}]", json!({})), "[x]");
    }

    // =========================================================================
    // Strict variables
    // =========================================================================

    #[test]
    fn test_strict_variables() {
        let options = RenderOptions {
            strict_variables: true,
            ..RenderOptions::default()
        };
        let err = render_with("\n{{ missing }}", json!({}), &options).unwrap_err();
        assert_eq!(
            err,
            RenderError::UndefinedVariable {
                name: "missing".into(),
                line: 2
            }
        );

        let err = render_with("{{ user.age }}", json!({ "user": {} }), &options).unwrap_err();
        assert_eq!(err.to_string(), "Key \"age\" does not exist at line 1.");

        assert_eq!(
            render_with("{{ missing|default('x') }}", json!({}), &options).unwrap(),
            "x"
        );
    }

    #[test]
    fn test_non_object_context() {
        assert_eq!(r("a{{ b }}c", json!([1, 2])), "ac");
    }
}
