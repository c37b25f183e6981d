/// Operators recognised inside `{{ }}` and `{% %}`.
pub const DEFAULT_OPERATORS: &[&str] = &[
    "not", "or", "and", "==", "!=", "<", ">", ">=", "<=", "not in", "in", "~", "+", "-", "*",
    "/", "//", "%", "**",
];

/// Delimiters and operator table for a lexer instance.
///
/// Every field has a default, so a partial JSON object is enough to
/// override a single delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct LexerOptions {
    pub tag_comment: (String, String),
    pub tag_block: (String, String),
    pub tag_variable: (String, String),
    pub whitespace_trim: char,
    pub whitespace_line_trim: char,
    pub interpolation: (String, String),
    pub operators: Vec<String>,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            tag_comment: ("{#".into(), "#}".into()),
            tag_block: ("{%".into(), "%}".into()),
            tag_variable: ("{{".into(), "}}".into()),
            whitespace_trim: '-',
            whitespace_line_trim: '~',
            interpolation: ("#{".into(), "}".into()),
            operators: DEFAULT_OPERATORS.iter().map(|op| op.to_string()).collect(),
        }
    }
}
