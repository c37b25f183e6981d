//! JavaScript code generator.
//!
//! Compiles a document into an ES module:
//!
//! ```text
//! const stencil = (() => { ... })();
//! export function render(context, runtime = stencil) { ... }
//! ```
//!
//! Scopes are chained objects (`ctx0`, `ctx1`, ...) so loop variables
//! shadow outer names without copying the context.

use stencil_parser::ast::{BinaryOp, ExprKind, Expression, Node, UnaryOp};
use stencil_parser::Document;

use crate::{format_number, js_string, CodegenError, FILTERS};

/// The Stencil runtime: value coercion, attribute access, filters, escaping.
const RUNTIME: &str = r#"const stencil = (() => {
  class Safe {
    constructor(s) { this.s = s; }
    toString() { return this.s; }
  }
  function str(v) {
    if (v === null || v === undefined || v === false) return '';
    if (v === true) return '1';
    if (v instanceof Safe) return v.s;
    if (typeof v === 'object') return JSON.stringify(v);
    return String(v);
  }
  function test(v) {
    if (Array.isArray(v)) return v.length > 0;
    if (v && typeof v === 'object' && !(v instanceof Safe)) return Object.keys(v).length > 0;
    return !!v && str(v) !== '0';
  }
  function escape(v) {
    return str(v).replace(/[&<>"']/g, c => ({
      '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#039;'
    })[c]);
  }
  function print(v, autoescape) {
    return autoescape && !(v instanceof Safe) ? escape(v) : str(v);
  }
  function attr(o, k) {
    if (o === null || o === undefined) return null;
    const v = o[k];
    return v === undefined ? null : v;
  }
  function iterate(v) {
    if (Array.isArray(v)) return v.map((item, i) => [i, item]);
    if (v && typeof v === 'object') return Object.entries(v);
    return [];
  }
  function loop(i, length) {
    return { index: i + 1, index0: i, first: i === 0, last: i === length - 1, length };
  }
  function contains(haystack, needle) {
    if (Array.isArray(haystack)) return haystack.some(v => v == needle);
    if (typeof haystack === 'string') return haystack.includes(str(needle));
    if (haystack && typeof haystack === 'object') return str(needle) in haystack;
    return false;
  }
  function length(v) {
    if (Array.isArray(v) || typeof v === 'string') return v.length;
    if (v && typeof v === 'object') return Object.keys(v).length;
    return str(v).length;
  }
  function empty(v) {
    return v === null || v === undefined || v === '' || (Array.isArray(v) && v.length === 0);
  }
  const filters = {
    upper: v => str(v).toUpperCase(),
    lower: v => str(v).toLowerCase(),
    trim: v => str(v).trim(),
    length,
    join: (v, sep = '') => iterate(v).map(([, item]) => str(item)).join(str(sep)),
    default: (v, d = '') => empty(v) ? d : v,
    escape: v => v instanceof Safe ? v : new Safe(escape(v)),
    e: v => v instanceof Safe ? v : new Safe(escape(v)),
    raw: v => new Safe(str(v)),
  };
  function filter(name, v, args) {
    return filters[name](v, ...args);
  }
  return { str, test, print, attr, iterate, loop, contains, filter };
})();"#;

/// A node that can write itself into a [`Compiler`].
pub trait Compile {
    fn compile(&self, compiler: &mut Compiler) -> Result<(), CodegenError>;
}

/// Source compiler.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    debug: bool,
    autoescape: bool,
    source: String,
    indentation: usize,
    /// Depth of the innermost scope object (`ctxN`).
    scope: usize,
}

impl Compiler {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            autoescape: true,
            ..Self::default()
        }
    }

    pub fn with_autoescape(mut self, autoescape: bool) -> Self {
        self.autoescape = autoescape;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compile a document into a complete module.
    pub fn compile(mut self, doc: &Document) -> Result<String, CodegenError> {
        self.raw(RUNTIME).raw("\n\n");
        self.raw(&format!("// {}\n", single_line(&doc.name)));
        self.write("export function render(context, runtime = stencil) {\n")
            .indent()
            .write("let out = '';\n")
            .write("const ctx0 = context ?? {};\n");

        for node in &doc.nodes {
            node.compile(&mut self)?;
        }

        self.write("return out;\n").outdent().write("}\n");
        Ok(self.source)
    }

    /// Append a string at the current indentation.
    pub fn write(&mut self, s: &str) -> &mut Self {
        self.source.push_str(&"  ".repeat(self.indentation));
        self.source.push_str(s);
        self
    }

    /// Append a string as is.
    pub fn raw(&mut self, s: &str) -> &mut Self {
        self.source.push_str(s);
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.indentation += 1;
        self
    }

    pub fn outdent(&mut self) -> &mut Self {
        self.indentation = self.indentation.saturating_sub(1);
        self
    }

    fn scope_var(&self) -> String {
        format!("ctx{}", self.scope)
    }

    fn compile_body(&mut self, nodes: &[Node]) -> Result<(), CodegenError> {
        for node in nodes {
            node.compile(self)?;
        }
        Ok(())
    }

    // =========================================================================
    // Expression → JavaScript conversion
    // =========================================================================

    pub fn expr_to_js(&self, expr: &Expression) -> Result<String, CodegenError> {
        let js = match &expr.kind {
            ExprKind::Null => "null".into(),
            ExprKind::Boolean(b) => b.to_string(),
            ExprKind::Number(n) => format_number(*n),
            ExprKind::String(s) => js_string(s),
            ExprKind::Name(name) => format!("runtime.attr({}, {})", self.scope_var(), js_string(name)),
            ExprKind::Array(items) => {
                let parts = items
                    .iter()
                    .map(|item| self.expr_to_js(item))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("[{}]", parts.join(", "))
            }
            ExprKind::GetAttr { object, attribute } => format!(
                "runtime.attr({}, {})",
                self.expr_to_js(object)?,
                js_string(attribute)
            ),
            ExprKind::GetItem { object, index } => format!(
                "runtime.attr({}, {})",
                self.expr_to_js(object)?,
                self.expr_to_js(index)?
            ),
            ExprKind::Unary { op, operand } => {
                let operand = self.expr_to_js(operand)?;
                match op {
                    UnaryOp::Not => format!("!runtime.test({operand})"),
                    UnaryOp::Neg => format!("-({operand})"),
                    UnaryOp::Pos => format!("+({operand})"),
                }
            }
            ExprKind::Binary { left, op, right } => {
                let left = self.expr_to_js(left)?;
                let right = self.expr_to_js(right)?;
                binary_to_js(*op, &left, &right)
            }
            ExprKind::Filter { input, name, args } => {
                if !FILTERS.contains(&name.as_str()) {
                    return Err(CodegenError::new(format!(
                        "Unknown \"{name}\" filter at line {}.",
                        expr.line
                    )));
                }
                let args = args
                    .iter()
                    .map(|arg| self.expr_to_js(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                format!(
                    "runtime.filter({}, {}, [{}])",
                    js_string(name),
                    self.expr_to_js(input)?,
                    args.join(", ")
                )
            }
        };
        Ok(js)
    }
}

fn binary_to_js(op: BinaryOp, left: &str, right: &str) -> String {
    let symbol = match op {
        BinaryOp::Or => return format!("(runtime.test({left}) || runtime.test({right}))"),
        BinaryOp::And => return format!("(runtime.test({left}) && runtime.test({right}))"),
        BinaryOp::In => return format!("runtime.contains({right}, {left})"),
        BinaryOp::NotIn => return format!("!runtime.contains({right}, {left})"),
        BinaryOp::Concat => return format!("(runtime.str({left}) + runtime.str({right}))"),
        BinaryOp::FloorDiv => return format!("Math.floor({left} / {right})"),
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::LtEq => "<=",
        BinaryOp::GtEq => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    };
    format!("({left} {symbol} {right})")
}

impl Compile for Node {
    fn compile(&self, compiler: &mut Compiler) -> Result<(), CodegenError> {
        match self {
            Node::Text { text, .. } => {
                compiler.write(&format!("out += {};\n", js_string(text)));
            }
            Node::Print { expr, .. } => {
                let value = compiler.expr_to_js(expr)?;
                let autoescape = compiler.autoescape;
                compiler.write(&format!("out += runtime.print({value}, {autoescape});\n"));
            }
            Node::If(node) => {
                for (i, branch) in node.branches.iter().enumerate() {
                    let condition = compiler.expr_to_js(&branch.condition)?;
                    if i == 0 {
                        compiler.write(&format!("if (runtime.test({condition})) {{\n"));
                    } else {
                        compiler
                            .outdent()
                            .write(&format!("}} else if (runtime.test({condition})) {{\n"));
                    }
                    compiler.indent();
                    compiler.compile_body(&branch.body)?;
                }
                if let Some(body) = &node.else_body {
                    compiler.outdent().write("} else {\n").indent();
                    compiler.compile_body(body)?;
                }
                compiler.outdent().write("}\n");
            }
            Node::For(node) => {
                let iterable = compiler.expr_to_js(&node.iterable)?;
                let parent = compiler.scope_var();
                let items = format!("items{}", compiler.scope + 1);

                compiler
                    .write("{\n")
                    .indent()
                    .write(&format!("const {items} = runtime.iterate({iterable});\n"));

                if let Some(body) = &node.else_body {
                    compiler
                        .write(&format!("if ({items}.length === 0) {{\n"))
                        .indent();
                    compiler.compile_body(body)?;
                    compiler.outdent().write("}\n");
                }

                compiler.scope += 1;
                let scope = compiler.scope_var();
                let key = node
                    .key
                    .as_deref()
                    .map(|key| format!("{}: key, ", js_string(key)))
                    .unwrap_or_default();
                compiler
                    .write(&format!(
                        "for (const [i, [key, value]] of {items}.entries()) {{\n"
                    ))
                    .indent()
                    .write(&format!(
                        "const {scope} = Object.assign(Object.create({parent}), {{ {key}{}: value, loop: runtime.loop(i, {items}.length) }});\n",
                        js_string(&node.target)
                    ));
                compiler.compile_body(&node.body)?;
                compiler.scope -= 1;
                compiler.outdent().write("}\n").outdent().write("}\n");
            }
            Node::Block(node) => {
                compiler.write(&format!("// block {}\n", node.name));
                compiler.compile_body(&node.body)?;
                compiler.write(&format!("// endblock {}\n", node.name));
            }
            Node::Comment(node) => node.compile(compiler)?,
        }
        Ok(())
    }
}

/// `name` with JS line terminators replaced, safe inside a `//` comment.
fn single_line(name: &str) -> String {
    name.replace(['\n', '\r', '\u{2028}', '\u{2029}'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stencil_lexer::{Lexer, LexerOptions, Source, Tokenize};
    use stencil_parser::{Parser, TagRegistry};

    fn parse(source: &str) -> Document {
        let stream = Lexer::new(LexerOptions::default())
            .unwrap()
            .tokenize(&Source::anonymous(source))
            .unwrap();
        Parser::parse(stream, &TagRegistry::with_builtins()).unwrap()
    }

    fn compile(source: &str) -> String {
        Compiler::new(false).compile(&parse(source)).unwrap()
    }

    fn expr(source: &str) -> String {
        match &parse(&format!("{{{{ {source} }}}}")).nodes[0] {
            Node::Print { expr, .. } => Compiler::new(false).expr_to_js(expr).unwrap(),
            other => panic!("Expected print, got {other:?}"),
        }
    }

    // =========================================================================
    // Module shape
    // =========================================================================

    #[test]
    fn test_empty_document() {
        let js = compile("");
        assert!(js.starts_with("const stencil = (() => {"));
        assert!(js.contains("// template\n"));
        assert!(js.ends_with(
            "export function render(context, runtime = stencil) {\n  let out = '';\n  const ctx0 = context ?? {};\n  return out;\n}\n"
        ));
    }

    #[test]
    fn test_template_name_stays_on_one_line() {
        let doc = Document {
            name: "evil\nalert(1);\r\u{2028}.html".into(),
            nodes: Vec::new(),
        };
        let js = Compiler::new(false).compile(&doc).unwrap();
        assert!(js.contains("// evil alert(1);  .html\nexport function render("));
        assert!(!js.contains("\nalert(1);"));
    }

    #[test]
    fn test_text() {
        assert!(compile("Hello\nworld").contains("  out += 'Hello\\nworld';\n"));
    }

    #[test]
    fn test_print_autoescape() {
        assert!(compile("{{ name }}").contains("out += runtime.print(runtime.attr(ctx0, 'name'), true);"));

        let doc = parse("{{ name }}");
        let js = Compiler::new(false).with_autoescape(false).compile(&doc).unwrap();
        assert!(js.contains("runtime.print(runtime.attr(ctx0, 'name'), false)"));
    }

    // =========================================================================
    // Control nodes
    // =========================================================================

    #[test]
    fn test_if_chain() {
        let js = compile("{% if a %}A{% elseif b %}B{% else %}C{% endif %}");
        assert!(js.contains(
            "  if (runtime.test(runtime.attr(ctx0, 'a'))) {\n    out += 'A';\n  } else if (runtime.test(runtime.attr(ctx0, 'b'))) {\n    out += 'B';\n  } else {\n    out += 'C';\n  }\n"
        ));
    }

    #[test]
    fn test_for_scopes() {
        let js = compile("{% for k, v in items %}{{ v }}{% else %}none{% endfor %}");
        assert!(js.contains("const items1 = runtime.iterate(runtime.attr(ctx0, 'items'));"));
        assert!(js.contains("if (items1.length === 0) {"));
        assert!(js.contains(
            "const ctx1 = Object.assign(Object.create(ctx0), { 'k': key, 'v': value, loop: runtime.loop(i, items1.length) });"
        ));
        assert!(js.contains("runtime.print(runtime.attr(ctx1, 'v'), true)"));
    }

    #[test]
    fn test_nested_for_scopes() {
        let js = compile("{% for a in x %}{% for b in a %}{{ b }}{% endfor %}{{ a }}{% endfor %}");
        assert!(js.contains("Object.create(ctx1)"));
        assert!(js.contains("runtime.attr(ctx2, 'b')"));
        assert!(js.contains("runtime.attr(ctx1, 'a'), true"));
    }

    #[test]
    fn test_block_markers() {
        let js = compile("{% block content %}x{% endblock %}");
        assert!(js.contains("  // block content\n  out += 'x';\n  // endblock content\n"));
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_expr_literals() {
        assert_eq!(expr("42"), "42");
        assert_eq!(expr(r"'it\'s'"), "'it\\'s'");
        assert_eq!(expr("[1, true, null]"), "[1, true, null]");
    }

    #[test]
    fn test_expr_operators() {
        assert_eq!(expr("a + 1"), "(runtime.attr(ctx0, 'a') + 1)");
        assert_eq!(
            expr("'a' ~ b"),
            "(runtime.str('a') + runtime.str(runtime.attr(ctx0, 'b')))"
        );
        assert_eq!(expr("7 // 2"), "Math.floor(7 / 2)");
        assert_eq!(expr("not a"), "!runtime.test(runtime.attr(ctx0, 'a'))");
        assert_eq!(expr("1 in xs"), "runtime.contains(runtime.attr(ctx0, 'xs'), 1)");
    }

    #[test]
    fn test_expr_attribute_and_filter() {
        assert_eq!(
            expr("user.name|upper"),
            "runtime.filter('upper', runtime.attr(runtime.attr(ctx0, 'user'), 'name'), [])"
        );
        assert_eq!(
            expr("tags|join(', ')"),
            "runtime.filter('join', runtime.attr(ctx0, 'tags'), [', '])"
        );
    }

    #[test]
    fn test_unknown_filter() {
        let err = Compiler::new(false)
            .compile(&parse("\n{{ a|nope }}"))
            .unwrap_err();
        assert_eq!(err.message, "Unknown \"nope\" filter at line 2.");
    }
}
