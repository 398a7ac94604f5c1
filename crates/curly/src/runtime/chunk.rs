use std::sync::{Arc, Mutex};

use crate::error::RenderError;

use super::pending::{Pending, PendingHandle};
use super::values::{format_value, Value};

/// Ordered output buffer for one block. Ready values append to a tail
/// string; a pending value reserves a slot at its write position and the
/// buffer fills it whenever the value arrives, so output order always
/// matches write order.
pub struct Chunk {
    state: Arc<Mutex<ChunkState>>,
}

struct ChunkState {
    tail: String,
    segments: Vec<Option<String>>,
    outstanding: usize,
    is_async: bool,
    error: Option<RenderError>,
    finalized: Option<PendingHandle>,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChunkState {
                tail: String::new(),
                segments: Vec::new(),
                outstanding: 0,
                is_async: false,
                error: None,
                finalized: None,
            })),
        }
    }

    pub fn write_text(&self, text: &str) {
        lock(&self.state).tail.push_str(text);
    }

    pub fn write(&self, value: Value) {
        match value {
            Value::Null => {}
            Value::Pending(pending) => {
                let index = {
                    let mut state = lock(&self.state);
                    flush_tail(&mut state);
                    state.segments.push(None);
                    state.outstanding += 1;
                    state.is_async = true;
                    state.segments.len() - 1
                };
                let shared = self.state.clone();
                pending.subscribe(move |outcome| fill(shared, index, outcome));
            }
            other => {
                let text = format_value(&other);
                lock(&self.state).tail.push_str(&text);
            }
        }
    }

    /// Consume the buffer. Text when everything was ready, otherwise a
    /// pending that completes when the last slot fills. A failed slot
    /// fails the whole output.
    pub fn into_output(self) -> Value {
        let mut state = lock(&self.state);
        if !state.is_async {
            return Value::Text(std::mem::take(&mut state.tail));
        }
        flush_tail(&mut state);
        if let Some(error) = state.error.clone() {
            return Value::Pending(Pending::failed(error));
        }
        if state.outstanding == 0 {
            let text = concat(&mut state);
            return Value::Text(text);
        }
        let (pending, handle) = Pending::deferred();
        state.finalized = Some(handle);
        Value::Pending(pending)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

fn fill(state: Arc<Mutex<ChunkState>>, index: usize, outcome: Result<Value, RenderError>) {
    match outcome {
        // A pending that resolves to another pending keeps the same slot.
        Ok(Value::Pending(inner)) => {
            let shared = state.clone();
            inner.subscribe(move |outcome| fill(shared, index, outcome));
        }
        Ok(value) => {
            let done = {
                let mut guard = lock(&state);
                guard.segments[index] = Some(format_value(&value));
                guard.outstanding -= 1;
                if guard.outstanding == 0 && guard.error.is_none() {
                    guard.finalized.take().map(|handle| {
                        let text = concat(&mut guard);
                        (handle, text)
                    })
                } else {
                    None
                }
            };
            if let Some((handle, text)) = done {
                handle.complete(Value::Text(text));
            }
        }
        Err(error) => {
            let handle = {
                let mut guard = lock(&state);
                guard.outstanding -= 1;
                if guard.error.is_none() {
                    guard.error = Some(error.clone());
                }
                guard.finalized.take()
            };
            if let Some(handle) = handle {
                handle.fail(error);
            }
        }
    }
}

fn flush_tail(state: &mut ChunkState) {
    if !state.tail.is_empty() {
        let text = std::mem::take(&mut state.tail);
        state.segments.push(Some(text));
    }
}

fn concat(state: &mut ChunkState) -> String {
    state
        .segments
        .drain(..)
        .map(|segment| segment.unwrap_or_default())
        .collect()
}

fn lock(state: &Mutex<ChunkState>) -> std::sync::MutexGuard<'_, ChunkState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
