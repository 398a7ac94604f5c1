use crate::diagnostics::Position;

/// One parsed template construct, annotated with the source position where
/// it began.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self { kind, position }
    }

    /// Short tag name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Block(_) => "block",
            NodeKind::Format(_) => "format",
            NodeKind::Buffer(_) => "buffer",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::Literal(_) => "literal",
            NodeKind::Call { .. } => "call",
            NodeKind::Pipe { .. } => "pipe",
            NodeKind::Fn { .. } => "fn",
            NodeKind::Raw(_) => "raw",
            NodeKind::Escape(_) => "escape",
            NodeKind::Map(_) => "map",
            NodeKind::Array(_) => "array",
            NodeKind::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Sequence of tags and text runs.
    Block(Vec<Node>),
    /// A line boundary plus trailing horizontal whitespace between tags.
    Format(String),
    /// A run of plain template text.
    Buffer(String),
    Identifier(Ident),
    Literal(Literal),
    Call {
        callee: Box<Node>,
        params: Vec<Node>,
    },
    /// `{start|stage|stage}`; stages apply left-to-right in source order,
    /// innermost-first in evaluation.
    Pipe {
        start: Box<Node>,
        stages: Vec<Node>,
    },
    Fn {
        params: Option<Vec<String>>,
        body: Box<Node>,
    },
    /// Verbatim text injected with no escaping.
    Raw(String),
    Escape(EscapeKey),
    Map(Vec<(String, Node)>),
    Array(Vec<Node>),
    /// The empty tag `{}`.
    Empty,
}

/// `ns::key`, `ns::.` (namespace only), or a bare dotted key path.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub namespace: Option<String>,
    pub key: Option<String>,
}

impl Ident {
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            namespace: None,
            key: Some(key.into()),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.namespace, &self.key) {
            (Some(ns), Some(key)) => format!("{ns}::{key}"),
            (Some(ns), None) => format!("{ns}::."),
            (None, Some(key)) => key.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKey {
    RightBrace,
    LeftBrace,
    Space,
    Newline,
    CarriageReturn,
}

impl EscapeKey {
    /// The single character constant the tag stands for.
    pub fn text(self) -> &'static str {
        match self {
            EscapeKey::RightBrace => "}",
            EscapeKey::LeftBrace => "{",
            EscapeKey::Space => " ",
            EscapeKey::Newline => "\n",
            EscapeKey::CarriageReturn => "\r",
        }
    }
}
