use thiserror::Error;

use crate::diagnostics::Position;

/// Parse failure at the furthest position the parser reached, with the
/// union of everything that could have matched there.
#[derive(Debug, Clone, Error)]
#[error("{message} at {position}")]
pub struct SyntaxError {
    pub message: String,
    pub expected: Vec<String>,
    pub found: Option<String>,
    pub position: Position,
}

impl SyntaxError {
    pub(crate) fn new(
        mut expected: Vec<String>,
        found: Option<String>,
        position: Position,
    ) -> Self {
        expected.sort();
        expected.dedup();
        let expected_desc = match expected.len() {
            0 => "anything".to_string(),
            1 => expected[0].clone(),
            n => format!("{} or {}", expected[..n - 1].join(", "), expected[n - 1]),
        };
        let found_desc = match &found {
            Some(text) => format!("\"{text}\""),
            None => "end of input".to_string(),
        };
        let message = format!("Expected {expected_desc} but {found_desc} found.");
        Self {
            message,
            expected,
            found,
            position,
        }
    }
}

/// Semantic failure while turning an AST into an executable template.
#[derive(Debug, Clone, Error)]
#[error("{message} [{template}:{position}]")]
pub struct CompileError {
    pub template: String,
    pub message: String,
    pub position: Position,
}

impl CompileError {
    pub(crate) fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            template: String::new(),
            message: message.into(),
            position,
        }
    }

    pub(crate) fn has_position(&self) -> bool {
        self.position.line != 0
    }

    pub(crate) fn at(mut self, position: Position) -> Self {
        if !self.has_position() {
            self.position = position;
        }
        self
    }

    pub(crate) fn in_template(mut self, template: &str) -> Self {
        if self.template.is_empty() {
            self.template = template.to_string();
        }
        self
    }
}

/// Render-time failure. The whole render fails with no partial output.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("{0}")]
    Message(String),
    #[error("pending value was dropped before completion")]
    Dropped,
}

impl RenderError {
    pub fn msg(message: impl Into<String>) -> Self {
        RenderError::Message(message.into())
    }
}

/// Any failure producing an executable template from source text.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{template}: {source}")]
    Syntax {
        template: String,
        source: SyntaxError,
    },
    #[error(transparent)]
    Compile(#[from] CompileError),
}
