//! Stencil Code Generator
//!
//! Two back ends over the same [`Document`](stencil_parser::Document):
//!
//! - [`Compiler`] turns a document into a JavaScript module exporting
//!   `render(context, runtime)`. In debug mode, exposed comments are kept
//!   as `/* ... */` blocks in the output.
//! - [`render()`] interprets a document directly against a JSON context.
//!
//! ```text
//! Document AST → Compiler::compile() → JS module
//! Document AST → render(context)     → String
//! ```

pub mod comment;
pub mod js;
pub mod render;

pub use js::{Compile, Compiler};
pub use render::{render, RenderError, RenderOptions};

/// Filters known to both back ends.
pub const FILTERS: &[&str] = &[
    "upper", "lower", "trim", "length", "join", "default", "escape", "e", "raw",
];

/// Code generation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Codegen error: {message}")]
pub struct CodegenError {
    pub message: String,
}

impl CodegenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Format a number, removing `.0` for integers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Quote a string as a single-quoted JavaScript literal.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(3.5), "3.5");
    }

    #[test]
    fn test_js_string() {
        assert_eq!(js_string("it's\n"), "'it\\'s\\n'");
        assert_eq!(js_string(""), "''");
        assert_eq!(js_string("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }
}
