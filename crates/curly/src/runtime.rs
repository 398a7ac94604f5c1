pub mod chunk;
pub mod pending;
pub mod values;

mod builtins;
pub(crate) mod environment;


use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::Literal;
use crate::error::RenderError;
use crate::ir::{Block, Expr, Instr, Intrinsic, Namespace};

use self::chunk::Chunk;
use self::environment::Env;
use self::pending::Pending;
use self::values::{format_value, ClosureValue, Value};

/// Services a render may call back into: named helpers for free lookups
/// and sub-template rendering for includes.
pub trait TemplateHost: Send + Sync {
    fn helper(&self, _name: &str) -> Option<Value> {
        None
    }

    fn render_include(
        &self,
        name: &str,
        _data: Value,
        _context: Value,
    ) -> Result<Value, RenderError> {
        Err(RenderError::msg(format!(
            "no template registered for include: {name}"
        )))
    }
}

/// Builds the value exposed as `viewmodel::` for one render.
pub trait ViewModelFactory: Send + Sync {
    fn instantiate(&self, data: &Value, strings: &Value, context: &Value) -> Value;
}

struct NullHost;

impl TemplateHost for NullHost {}

/// A compiled template, independent of any host. `lookups` and
/// `intrinsics` record the free roots and built-ins the body references,
/// in first-use order.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub body: Arc<Block>,
    pub lookups: Vec<String>,
    pub intrinsics: Vec<Intrinsic>,
}

impl Template {
    pub fn bind(
        self,
        host: Arc<dyn TemplateHost>,
        viewmodel: Option<Arc<dyn ViewModelFactory>>,
    ) -> BoundTemplate {
        BoundTemplate {
            template: self,
            host,
            viewmodel,
        }
    }

    /// Render with data only, no host services.
    pub fn render(&self, data: Value) -> Result<Rendered, RenderError> {
        self.clone()
            .bind(Arc::new(NullHost), None)
            .render(data, Value::Null, Value::Null)
    }
}

pub struct BoundTemplate {
    template: Template,
    host: Arc<dyn TemplateHost>,
    viewmodel: Option<Arc<dyn ViewModelFactory>>,
}

impl BoundTemplate {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn render(
        &self,
        data: Value,
        strings: Value,
        context: Value,
    ) -> Result<Rendered, RenderError> {
        let viewmodel = match &self.viewmodel {
            Some(factory) => factory.instantiate(&data, &strings, &context),
            None => Value::Null,
        };

        // Free roots resolve once per render, before anything runs.
        let mut lookups = HashMap::new();
        for root in &self.template.lookups {
            let value = resolve_lookup(
                root,
                &viewmodel,
                &data,
                self.host.as_ref(),
                &strings,
                &context,
            );
            lookups.insert(root.clone(), value);
        }

        let renderer = Arc::new(Renderer {
            host: self.host.clone(),
            viewmodel,
            data,
            strings,
            context,
            lookups,
        });
        let output = renderer.run_block(&self.template.body, &Env::root())?;
        Ok(match output {
            Value::Pending(pending) => Rendered::Pending(pending),
            other => Rendered::Ready(format_value(&other)),
        })
    }
}

/// First non-null wins across the sources, in fixed priority order.
fn resolve_lookup(
    root: &str,
    viewmodel: &Value,
    data: &Value,
    host: &dyn TemplateHost,
    strings: &Value,
    context: &Value,
) -> Value {
    for source in [viewmodel, data] {
        let value = member(source, root);
        if !matches!(value, Value::Null) {
            return value;
        }
    }
    if let Some(value) = host.helper(root) {
        if !matches!(value, Value::Null) {
            return value;
        }
    }
    for source in [strings, context] {
        let value = member(source, root);
        if !matches!(value, Value::Null) {
            return value;
        }
    }
    Value::Null
}

/// Render result. `Pending` appears only when some written value was
/// itself pending; it completes with the final text.
pub enum Rendered {
    Ready(String),
    Pending(Pending),
}

impl Rendered {
    pub fn ready(&self) -> Option<&str> {
        match self {
            Rendered::Ready(text) => Some(text),
            Rendered::Pending(_) => None,
        }
    }

    /// Block the current thread until the final text is available.
    pub fn wait(self) -> Result<String, RenderError> {
        match self {
            Rendered::Ready(text) => Ok(text),
            Rendered::Pending(pending) => {
                let mut pending = pending;
                loop {
                    match pending.wait()? {
                        Value::Pending(next) => pending = next,
                        value => return Ok(format_value(&value)),
                    }
                }
            }
        }
    }
}

pub(crate) struct Renderer {
    host: Arc<dyn TemplateHost>,
    viewmodel: Value,
    data: Value,
    strings: Value,
    context: Value,
    lookups: HashMap<String, Value>,
}

impl Renderer {
    fn run_block(self: &Arc<Self>, block: &Block, env: &Arc<Env>) -> Result<Value, RenderError> {
        // Declarations bind before any output, in source order, into the
        // same frame closures capture.
        for (name, expr) in &block.decls {
            let value = self.eval(expr, env)?;
            env.define(name.clone(), value);
        }

        let chunk = Chunk::new();
        for instr in &block.instrs {
            match instr {
                Instr::Text(text) => chunk.write_text(text),
                Instr::Write(expr) => chunk.write(self.eval(expr, env)?),
            }
        }
        Ok(chunk.into_output())
    }

    fn eval(self: &Arc<Self>, expr: &Expr, env: &Arc<Env>) -> Result<Value, RenderError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Local { name, path } => {
                let base = env.get(name).unwrap_or(Value::Null);
                Ok(walk(base, path))
            }
            Expr::Lookup { root, path } => {
                let base = self.lookups.get(root).cloned().unwrap_or(Value::Null);
                Ok(walk(base, path))
            }
            Expr::Namespace { ns, path } => Ok(self.namespace_value(*ns, path)),
            Expr::Intrinsic(intrinsic) => Ok(Value::Builtin(*intrinsic)),
            Expr::Fn { params, body } => Ok(Value::Closure(Arc::new(ClosureValue {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }))),
            Expr::Map(entries) => {
                let mut map = HashMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::map(map))
            }
            Expr::Array(items) => {
                let mut array = Vec::with_capacity(items.len());
                for item in items {
                    array.push(self.eval(item, env)?);
                }
                Ok(Value::array(array))
            }
            Expr::Deref(inner) => {
                let value = self.eval(inner, env)?;
                if value.is_callable() {
                    self.apply(value, Vec::new())
                } else {
                    Ok(value)
                }
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, env)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg, env)?);
                }
                self.apply(callee, evaluated)
            }
            Expr::Include { name, data } => {
                let name_value = self.eval(name, env)?;
                let name_text = match &name_value {
                    Value::Pending(_) => {
                        return Err(RenderError::msg(
                            "include template name must be available before the include runs",
                        ))
                    }
                    other => format_value(other),
                };
                let data_value = match data {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                self.host
                    .render_include(&name_text, data_value, self.context.clone())
            }
        }
    }

    fn namespace_value(&self, ns: Namespace, path: &[String]) -> Value {
        let base = match ns {
            Namespace::Data => self.data.clone(),
            Namespace::Strings => self.strings.clone(),
            Namespace::Ctx => self.context.clone(),
            Namespace::ViewModel => self.viewmodel.clone(),
            Namespace::Helper => {
                // Helpers have no whole-object form; the first segment
                // selects the helper, the rest walks into its value.
                let Some((first, rest)) = path.split_first() else {
                    return Value::Null;
                };
                let base = self.host.helper(first).unwrap_or(Value::Null);
                return walk(base, rest);
            }
        };
        walk(base, path)
    }

    pub(crate) fn apply(
        self: &Arc<Self>,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, RenderError> {
        match callee {
            Value::Closure(closure) => {
                let env = Env::child(&closure.env);
                for (index, param) in closure.params.iter().enumerate() {
                    let value = args.get(index).cloned().unwrap_or(Value::Null);
                    env.define(param.clone(), value);
                }
                self.run_block(&closure.body, &env)
            }
            Value::Builtin(intrinsic) => builtins::call_intrinsic(self, intrinsic, args),
            other => Err(RenderError::msg(format!(
                "cannot call a non-function value ({})",
                describe(&other)
            ))),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Str(s) => Value::Text(s.clone()),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

/// Apply a dotted path to a value. Hitting a pending value defers the
/// rest of the walk onto it.
pub(crate) fn walk(value: Value, path: &[String]) -> Value {
    let mut value = value;
    for (index, segment) in path.iter().enumerate() {
        if let Value::Pending(pending) = value {
            let rest: Vec<String> = path[index..].to_vec();
            return Value::Pending(pending.map(move |resolved| walk(resolved, &rest)));
        }
        value = member(&value, segment);
    }
    value
}

pub(crate) fn member(value: &Value, segment: &str) -> Value {
    match value {
        Value::Map(entries) => entries.get(segment).cloned().unwrap_or(Value::Null),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .unwrap_or(Value::Null),
        Value::Text(text) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| text.chars().nth(index))
            .map(|c| Value::Text(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Pending(pending) => {
            let segment = segment.to_string();
            Value::Pending(pending.map(move |resolved| member(&resolved, &segment)))
        }
        _ => Value::Null,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) | Value::Float(_) => "number",
        Value::Text(_) => "text",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Closure(_) | Value::Builtin(_) => "function",
        Value::Pending(_) => "pending value",
    }
}
