use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::values::Value;

/// Chained binding frames. Closures capture their frame by reference, so
/// a binding added after capture is still visible to the closure.
pub struct Env {
    parent: Option<Arc<Env>>,
    values: Mutex<HashMap<String, Value>>,
}

impl Env {
    pub fn root() -> Arc<Env> {
        Arc::new(Env {
            parent: None,
            values: Mutex::new(HashMap::new()),
        })
    }

    pub fn child(parent: &Arc<Env>) -> Arc<Env> {
        Arc::new(Env {
            parent: Some(parent.clone()),
            values: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Ok(values) = self.values.lock() {
            if let Some(value) = values.get(name) {
                return Some(value.clone());
            }
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(name.into(), value);
        }
    }
}
