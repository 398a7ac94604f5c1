use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::error::RenderError;

use super::values::Value;

type Outcome = Result<Value, RenderError>;
type Continuation = Box<dyn FnOnce(Outcome) + Send>;

enum State {
    Waiting(Vec<Continuation>),
    Done(Outcome),
}

/// A value that completes later, possibly from another thread. Cloning
/// shares the underlying slot; every subscriber sees the same outcome.
#[derive(Clone)]
pub struct Pending {
    state: Arc<Mutex<State>>,
}

/// Write side of a [`Pending`]. Not cloneable: exactly one completion.
/// Dropping an unfinished handle fails the pending so nothing waits
/// forever.
pub struct PendingHandle {
    state: Arc<Mutex<State>>,
    finished: bool,
}

impl Pending {
    pub fn deferred() -> (Pending, PendingHandle) {
        let state = Arc::new(Mutex::new(State::Waiting(Vec::new())));
        (
            Pending {
                state: state.clone(),
            },
            PendingHandle {
                state,
                finished: false,
            },
        )
    }

    pub fn ready(value: Value) -> Pending {
        Pending {
            state: Arc::new(Mutex::new(State::Done(Ok(value)))),
        }
    }

    pub fn failed(error: RenderError) -> Pending {
        Pending {
            state: Arc::new(Mutex::new(State::Done(Err(error)))),
        }
    }

    /// Run `f` with the outcome, now if already done or later when the
    /// handle completes.
    pub fn subscribe(&self, f: impl FnOnce(Outcome) + Send + 'static) {
        let mut state = lock(&self.state);
        match &mut *state {
            State::Waiting(continuations) => continuations.push(Box::new(f)),
            State::Done(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                f(outcome);
            }
        }
    }

    /// A new pending holding `f` of this one's value. Failures pass
    /// through untouched.
    pub fn map(&self, f: impl FnOnce(Value) -> Value + Send + 'static) -> Pending {
        let (out, handle) = Pending::deferred();
        self.subscribe(move |outcome| match outcome {
            Ok(value) => handle.complete(f(value)),
            Err(error) => handle.fail(error),
        });
        out
    }

    /// Block the current thread until the outcome arrives.
    pub fn wait(&self) -> Outcome {
        if let Some(outcome) = self.try_get() {
            return outcome;
        }
        let (tx, rx) = mpsc::channel();
        self.subscribe(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.recv().unwrap_or(Err(RenderError::Dropped))
    }

    pub fn try_get(&self) -> Option<Outcome> {
        match &*lock(&self.state) {
            State::Waiting(_) => None,
            State::Done(outcome) => Some(outcome.clone()),
        }
    }
}

impl PendingHandle {
    pub fn complete(mut self, value: Value) {
        self.finish(Ok(value));
    }

    pub fn fail(mut self, error: RenderError) {
        self.finish(Err(error));
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        let continuations = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut *state, State::Done(outcome.clone())) {
                State::Waiting(continuations) => continuations,
                // Already done; keep the first outcome.
                done @ State::Done(_) => {
                    *state = done;
                    Vec::new()
                }
            }
        };
        // Continuations run outside the lock; they may subscribe again.
        for continuation in continuations {
            continuation(outcome.clone());
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(RenderError::Dropped));
        }
    }
}

fn lock(state: &Mutex<State>) -> std::sync::MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_get() {
            Some(Ok(_)) => write!(f, "Pending(done)"),
            Some(Err(_)) => write!(f, "Pending(failed)"),
            None => write!(f, "Pending(waiting)"),
        }
    }
}
