//! Abstract Syntax Tree for Stencil templates.
//!
//! Contains document-level nodes (text, print, control tags, comments) and
//! the expression nodes used inside `{{ }}` and tag arguments.

use crate::ParseError;

// ---------------------------------------------------------------------------
// Document-level AST
// ---------------------------------------------------------------------------

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: String,
    pub nodes: Vec<Node>,
}

impl Document {
    /// Every comment node, depth first in document order.
    pub fn comments(&self) -> Vec<&CommentNode> {
        fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a CommentNode>) {
            for node in nodes {
                match node {
                    Node::Comment(comment) => out.push(comment),
                    Node::If(node) => {
                        for branch in &node.branches {
                            walk(&branch.body, out);
                        }
                        if let Some(body) = &node.else_body {
                            walk(body, out);
                        }
                    }
                    Node::For(node) => {
                        walk(&node.body, out);
                        if let Some(body) = &node.else_body {
                            walk(body, out);
                        }
                    }
                    Node::Block(node) => walk(&node.body, out),
                    Node::Text { .. } | Node::Print { .. } => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.nodes, &mut out);
        out
    }
}

/// A node in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal markup.
    Text { text: String, line: usize },

    /// `{{ expr }}`
    Print { expr: Expression, line: usize },

    /// `{% if %}` with its `elseif` / `else` branches.
    If(IfNode),

    /// `{% for %}`
    For(ForNode),

    /// `{% block name %}`
    Block(BlockNode),

    /// A lexed `{# #}` comment or an explicit `{% comment "..." %}` tag.
    Comment(CommentNode),
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Node::Text { line, .. } | Node::Print { line, .. } => *line,
            Node::If(node) => node.line,
            Node::For(node) => node.line,
            Node::Block(node) => node.line,
            Node::Comment(node) => node.line(),
        }
    }

    /// Append a child to a container node.
    ///
    /// Leaf nodes reject children with [`ParseError::Logic`].
    pub fn push_child(&mut self, child: Node) -> Result<(), ParseError> {
        let body = match self {
            Node::Block(node) => &mut node.body,
            Node::For(node) => node.else_body.as_mut().unwrap_or(&mut node.body),
            Node::If(node) => match (&mut node.else_body, node.branches.last_mut()) {
                (Some(body), _) => body,
                (None, Some(branch)) => &mut branch.body,
                (None, None) => return Err(ParseError::Logic("IfNode has no branch.".into())),
            },
            Node::Text { .. } => {
                return Err(ParseError::Logic("TextNode cannot have children.".into()))
            }
            Node::Print { .. } => {
                return Err(ParseError::Logic("PrintNode cannot have children.".into()))
            }
            Node::Comment(_) => {
                return Err(ParseError::Logic("CommentNode cannot have children.".into()))
            }
        };
        body.push(child);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Vec<Node>>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Expression,
    pub body: Vec<Node>,
}

/// `{% for [key,] target in iterable %}`
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub key: Option<String>,
    pub target: String,
    pub iterable: Expression,
    pub body: Vec<Node>,
    /// Rendered when the iterable is empty.
    pub else_body: Option<Vec<Node>>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub name: String,
    pub body: Vec<Node>,
    pub line: usize,
}

/// A comment in the template source.
///
/// `exposed` is set only for the literal-string tag form
/// (`{% comment "..." %}`); those comments are written to compiled output
/// in debug mode. Lexed `{# #}` comments are never exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    text: String,
    exposed: bool,
    line: usize,
}

impl CommentNode {
    pub fn new(text: impl Into<String>, exposed: bool, line: usize) -> Self {
        Self {
            text: text.into(),
            exposed,
            line,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn exposed(&self) -> bool {
        self.exposed
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

// ---------------------------------------------------------------------------
// Expression AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub line: usize,
}

impl Expression {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Name(String),
    Array(Vec<Expression>),
    /// `object.attribute`
    GetAttr {
        object: Box<Expression>,
        attribute: String,
    },
    /// `object[index]`
    GetItem {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    /// `input|name(args)`
    Filter {
        input: Box<Expression>,
        name: String,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

impl UnaryOp {
    pub fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "not" => Some(UnaryOp::Not),
            "-" => Some(UnaryOp::Neg),
            "+" => Some(UnaryOp::Pos),
            _ => None,
        }
    }

    pub fn precedence(self) -> u16 {
        match self {
            UnaryOp::Not => 50,
            UnaryOp::Neg | UnaryOp::Pos => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    NotIn,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn from_operator(operator: &str) -> Option<Self> {
        let op = match operator {
            "or" => BinaryOp::Or,
            "and" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::LtEq,
            ">=" => BinaryOp::GtEq,
            "in" => BinaryOp::In,
            "not in" => BinaryOp::NotIn,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "~" => BinaryOp::Concat,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    pub fn precedence(self) -> u16 {
        match self {
            BinaryOp::Or => 10,
            BinaryOp::And => 15,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::LtEq
            | BinaryOp::GtEq
            | BinaryOp::In
            | BinaryOp::NotIn => 20,
            BinaryOp::Add | BinaryOp::Sub => 30,
            BinaryOp::Concat => 40,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => 60,
            BinaryOp::Pow => 200,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }
}
