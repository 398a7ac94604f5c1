use std::collections::HashSet;

/// Lexical scope tracking for the compiler. A frame is pushed per block;
/// names enter the frame when their `def` is compiled, so a reference that
/// precedes its definition in the same block resolves as a free lookup.
pub(crate) struct ScopeStack {
    frames: Vec<HashSet<String>>,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub(crate) fn push(&mut self, params: &[String]) {
        let mut frame = HashSet::new();
        for param in params {
            frame.insert(param.clone());
        }
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Bind a name in the innermost frame. Returns false when the name is
    /// already bound there; shadowing an outer frame is allowed.
    pub(crate) fn declare(&mut self, name: &str) -> bool {
        match self.frames.last_mut() {
            Some(frame) => frame.insert(name.to_string()),
            None => false,
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| frame.contains(name))
    }
}
