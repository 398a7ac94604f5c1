use std::sync::Arc;

use crate::error::RenderError;
use crate::ir::Intrinsic;

use super::chunk::Chunk;
use super::pending::Pending;
use super::values::{format_value, Value};
use super::{member, Renderer};

/// Dispatch one built-in call. Arguments beyond the arity are ignored and
/// missing ones read as null, the same leniency user functions get.
pub(crate) fn call_intrinsic(
    renderer: &Arc<Renderer>,
    intrinsic: Intrinsic,
    args: Vec<Value>,
) -> Result<Value, RenderError> {
    match intrinsic {
        Intrinsic::If => branch_if(renderer, args),
        Intrinsic::Each => each(renderer, args),
        Intrinsic::IsEmpty => {
            let (value,) = take1(args);
            Ok(Value::Bool(is_empty(&value)))
        }
        Intrinsic::IsNotEmpty => {
            let (value,) = take1(args);
            Ok(Value::Bool(!is_empty(&value)))
        }
        Intrinsic::Get => {
            let (object, key) = take2(args);
            Ok(get(object, key))
        }
        Intrinsic::Eq => {
            let (a, b) = take2(args);
            Ok(Value::Bool(values_equal(&a, &b)))
        }
        Intrinsic::Neq => {
            let (a, b) = take2(args);
            Ok(Value::Bool(!values_equal(&a, &b)))
        }
        Intrinsic::Lt => Ok(ordered(args, |o| o == Order::Less)),
        Intrinsic::Gt => Ok(ordered(args, |o| o == Order::Greater)),
        Intrinsic::Lte => Ok(ordered(args, |o| o != Order::Greater && o != Order::None)),
        Intrinsic::Gte => Ok(ordered(args, |o| o != Order::Less && o != Order::None)),
        Intrinsic::CmpAnd => {
            let (a, b) = take2(args);
            Ok(if a.truthy() { b } else { a })
        }
        Intrinsic::CmpOr => {
            let (a, b) = take2(args);
            Ok(if a.truthy() { a } else { b })
        }
        Intrinsic::Not => {
            let (value,) = take1(args);
            Ok(Value::Bool(!value.truthy()))
        }
        Intrinsic::Add => {
            let (a, b) = take2(args);
            Ok(add(a, b))
        }
        Intrinsic::Sub => Ok(int_preserving(args, i64::wrapping_sub, |x, y| x - y)),
        Intrinsic::Mul => Ok(int_preserving(args, i64::wrapping_mul, |x, y| x * y)),
        Intrinsic::Div => {
            let (a, b) = take2(args);
            Ok(Value::Float(to_number(&a) / to_number(&b)))
        }
        Intrinsic::Mod => {
            let (a, b) = take2(args);
            match (&a, &b) {
                (Value::Int(x), Value::Int(y)) if *y != 0 => Ok(Value::Int(x.wrapping_rem(*y))),
                _ => Ok(Value::Float(to_number(&a) % to_number(&b))),
            }
        }
        Intrinsic::EscapeHtml | Intrinsic::EscapeJs | Intrinsic::EscapeJson => {
            let (value,) = take1(args);
            Ok(apply_escape(intrinsic, value))
        }
    }
}

fn take1(args: Vec<Value>) -> (Value,) {
    let mut args = args.into_iter();
    (args.next().unwrap_or(Value::Null),)
}

fn take2(args: Vec<Value>) -> (Value, Value) {
    let mut args = args.into_iter();
    (
        args.next().unwrap_or(Value::Null),
        args.next().unwrap_or(Value::Null),
    )
}

fn take3(args: Vec<Value>) -> (Value, Value, Value) {
    let mut args = args.into_iter();
    (
        args.next().unwrap_or(Value::Null),
        args.next().unwrap_or(Value::Null),
        args.next().unwrap_or(Value::Null),
    )
}

/// Re-invoke an intrinsic once its first argument resolves, so `if` and
/// `each` accept a pending condition or collection without the template
/// knowing.
fn chain_first(
    renderer: &Arc<Renderer>,
    intrinsic: Intrinsic,
    pending: Pending,
    rest: Vec<Value>,
) -> Value {
    let (out, handle) = Pending::deferred();
    let renderer = renderer.clone();
    pending.subscribe(move |outcome| match outcome {
        Ok(value) => {
            let mut args = vec![value];
            args.extend(rest);
            match call_intrinsic(&renderer, intrinsic, args) {
                Ok(result) => handle.complete(result),
                Err(error) => handle.fail(error),
            }
        }
        Err(error) => handle.fail(error),
    });
    Value::Pending(out)
}

fn branch_if(renderer: &Arc<Renderer>, args: Vec<Value>) -> Result<Value, RenderError> {
    let (condition, then_branch, else_branch) = take3(args);
    if let Value::Pending(pending) = condition {
        return Ok(chain_first(
            renderer,
            Intrinsic::If,
            pending,
            vec![then_branch, else_branch],
        ));
    }
    let branch = if condition.truthy() {
        then_branch
    } else {
        else_branch
    };
    run_branch(renderer, branch, Vec::new())
}

fn each(renderer: &Arc<Renderer>, args: Vec<Value>) -> Result<Value, RenderError> {
    let (collection, then_branch, else_branch) = take3(args);
    if let Value::Pending(pending) = collection {
        return Ok(chain_first(
            renderer,
            Intrinsic::Each,
            pending,
            vec![then_branch, else_branch],
        ));
    }

    let items: Vec<Value> = match &collection {
        Value::Array(items) => items.iter().cloned().collect(),
        Value::Text(text) => text.chars().map(|c| Value::Text(c.to_string())).collect(),
        _ => Vec::new(),
    };
    if items.is_empty() {
        return run_branch(renderer, else_branch, Vec::new());
    }

    let chunk = Chunk::new();
    for (index, item) in items.into_iter().enumerate() {
        let value = if then_branch.is_callable() {
            renderer.apply(then_branch.clone(), vec![item, Value::Int(index as i64)])?
        } else {
            then_branch.clone()
        };
        chunk.write(value);
    }
    Ok(chunk.into_output())
}

/// A branch is either a function to invoke or a value to use directly.
fn run_branch(
    renderer: &Arc<Renderer>,
    branch: Value,
    args: Vec<Value>,
) -> Result<Value, RenderError> {
    if branch.is_callable() {
        renderer.apply(branch, args)
    } else {
        Ok(branch)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        // Numbers are never empty, zero included.
        Value::Int(_) | Value::Float(_) => false,
        Value::Array(items) => items.is_empty(),
        other => !other.truthy(),
    }
}

fn get(object: Value, key: Value) -> Value {
    let key_text = match &key {
        Value::Null => String::new(),
        other => format_value(other),
    };
    if key_text.is_empty() {
        return object;
    }
    member(&object, &key_text)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Arc::ptr_eq(x, y),
        (Value::Closure(x), Value::Closure(y)) => Arc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        _ => false,
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Order {
    Less,
    Equal,
    Greater,
    /// The operands have no defined ordering.
    None,
}

fn ordered(args: Vec<Value>, test: impl Fn(Order) -> bool) -> Value {
    let (a, b) = take2(args);
    let order = match (number(&a), number(&b)) {
        (Some(x), Some(y)) => {
            if x < y {
                Order::Less
            } else if x > y {
                Order::Greater
            } else if x == y {
                Order::Equal
            } else {
                Order::None
            }
        }
        _ => match (&a, &b) {
            (Value::Text(x), Value::Text(y)) => match x.cmp(y) {
                std::cmp::Ordering::Less => Order::Less,
                std::cmp::Ordering::Equal => Order::Equal,
                std::cmp::Ordering::Greater => Order::Greater,
            },
            _ => Order::None,
        },
    };
    Value::Bool(test(order))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn add(a: Value, b: Value) -> Value {
    if matches!(a, Value::Text(_)) || matches!(b, Value::Text(_)) {
        return Value::Text(format!("{}{}", format_value(&a), format_value(&b)));
    }
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(*y)),
        _ => Value::Float(to_number(&a) + to_number(&b)),
    }
}

fn int_preserving(
    args: Vec<Value>,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Value {
    let (a, b) = take2(args);
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
        _ => Value::Float(float_op(to_number(&a), to_number(&b))),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Escapers pass non-text through untouched and chase pendings, so a late
/// value still gets escaped before it lands in the output.
fn apply_escape(intrinsic: Intrinsic, value: Value) -> Value {
    match value {
        Value::Pending(pending) => {
            Value::Pending(pending.map(move |resolved| apply_escape(intrinsic, resolved)))
        }
        Value::Text(text) => Value::Text(match intrinsic {
            Intrinsic::EscapeJs => escape_js(text),
            Intrinsic::EscapeJson => escape_json(text),
            _ => escape_html(text),
        }),
        other => other,
    }
}

fn escape_html(text: String) -> String {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return text;
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_js(text: String) -> String {
    if !text.contains([
        '\\', '/', '\r', '\n', '\u{c}', '\t', '\'', '"', '\u{2028}', '\u{2029}',
    ]) {
        return text;
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\t' => out.push_str("\\t"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

fn escape_json(text: String) -> String {
    if !text.contains(['"', '<', '\u{2028}', '\u{2029}']) {
        return text;
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003c"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}
