use std::sync::Arc;

use crate::ast::{Ident, Literal, Node, NodeKind};
use crate::diagnostics::Position;
use crate::error::{CompileError, Error};
use crate::ir::{Block, Expr, Instr, Intrinsic, Namespace};
use crate::parser;
use crate::runtime::Template;
use crate::scope::ScopeStack;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Keep a line break where the source had one between tags. Off by
    /// default: inter-tag whitespace is formatting, not output.
    pub keep_whitespace: bool,
    /// Escaper applied to call results. `None` selects `escapeHtml`;
    /// an empty string disables escaping entirely.
    pub default_escape: Option<String>,
}

/// Compile template source into an executable template.
pub fn compile(name: &str, source: &str, options: &CompileOptions) -> Result<Template, Error> {
    let ast = parser::parse(source).map_err(|source| Error::Syntax {
        template: name.to_string(),
        source,
    })?;
    compile_ast(name, &ast, options)
}

/// Compile an already-parsed tree.
pub fn compile_ast(name: &str, ast: &Node, options: &CompileOptions) -> Result<Template, Error> {
    let mut compiler = Compiler::new(options).map_err(|e| e.in_template(name))?;
    let nodes = match &ast.kind {
        NodeKind::Block(nodes) => nodes,
        _ => {
            return Err(Error::Compile(
                err("template root must be a block").in_template(name),
            ))
        }
    };
    let body = compiler
        .block(nodes, &[], false)
        .map_err(|e| e.in_template(name))?;

    Ok(Template {
        name: name.to_string(),
        body: Arc::new(body),
        lookups: compiler.lookups,
        intrinsics: compiler.intrinsics,
    })
}

fn err(message: impl Into<String>) -> CompileError {
    CompileError::new(message, Position::new(0, 0))
}

enum Stmt {
    /// A `def` binding, hoisted to the top of the block.
    Decl(String, Expr),
    /// Literal text, merged with neighboring text runs.
    Text(String),
    Write(Expr),
    Nothing,
}

struct Compiler {
    keep_whitespace: bool,
    /// Resolved escaper expression, or None when escaping is disabled.
    default_escaper: Option<Expr>,
    scopes: ScopeStack,
    lookups: Vec<String>,
    intrinsics: Vec<Intrinsic>,
}

impl Compiler {
    fn new(options: &CompileOptions) -> Result<Self, CompileError> {
        let mut compiler = Self {
            keep_whitespace: options.keep_whitespace,
            default_escaper: None,
            scopes: ScopeStack::new(),
            lookups: Vec::new(),
            intrinsics: Vec::new(),
        };
        let escape = options.default_escape.as_deref().unwrap_or("escapeHtml");
        compiler.set_default_escape(escape)?;
        Ok(compiler)
    }

    fn set_default_escape(&mut self, name: &str) -> Result<(), CompileError> {
        if name.is_empty() {
            self.default_escaper = None;
            return Ok(());
        }
        let ident = match name.split_once("::") {
            Some((ns, key)) => Ident {
                namespace: Some(ns.to_string()),
                key: if key == "." {
                    None
                } else {
                    Some(key.to_string())
                },
            },
            None => Ident::bare(name),
        };
        let (escaper, _) = self.resolve_ident(&ident)?;
        self.default_escaper = Some(escaper);
        Ok(())
    }

    fn block(
        &mut self,
        nodes: &[Node],
        params: &[String],
        disable_escape: bool,
    ) -> Result<Block, CompileError> {
        self.scopes.push(params);

        let mut decls = Vec::new();
        let mut instrs = Vec::new();
        let mut pending = String::new();

        for node in nodes {
            match &node.kind {
                NodeKind::Format(_) => {
                    if self.keep_whitespace {
                        pending.push('\n');
                    }
                }
                NodeKind::Buffer(text) => pending.push_str(text),
                _ => match self.statement(node, disable_escape)? {
                    Stmt::Decl(name, value) => decls.push((name, value)),
                    Stmt::Text(text) => pending.push_str(&text),
                    Stmt::Write(expr) => {
                        flush(&mut pending, &mut instrs);
                        instrs.push(Instr::Write(expr));
                    }
                    Stmt::Nothing => {}
                },
            }
        }
        flush(&mut pending, &mut instrs);

        self.scopes.pop();
        Ok(Block { decls, instrs })
    }

    fn statement(&mut self, node: &Node, disable_escape: bool) -> Result<Stmt, CompileError> {
        let stmt = match &node.kind {
            NodeKind::Raw(text) => Stmt::Text(text.clone()),
            NodeKind::Escape(key) => Stmt::Text(key.text().to_string()),
            NodeKind::Call { callee, params } => match directive_name(callee) {
                Some("def") => {
                    let (name, value) = self.def_directive(params, disable_escape)?;
                    Stmt::Decl(name, value)
                }
                Some("pragma") => {
                    self.pragma_directive(params)?;
                    Stmt::Nothing
                }
                _ => Stmt::Write(self.expr(node, disable_escape)?),
            },
            _ => Stmt::Write(self.expr(node, disable_escape)?),
        };
        Ok(stmt)
    }

    fn expr(&mut self, node: &Node, disable_escape: bool) -> Result<Expr, CompileError> {
        self.expr_inner(node, disable_escape)
            .map_err(|e| e.at(node.position))
    }

    fn expr_inner(&mut self, node: &Node, disable_escape: bool) -> Result<Expr, CompileError> {
        match &node.kind {
            NodeKind::Identifier(ident) => Ok(self.resolve_ident(ident)?.0),
            NodeKind::Literal(literal) => Ok(Expr::Literal(literal.clone())),
            NodeKind::Empty => Ok(Expr::Null),
            NodeKind::Raw(text) => Ok(Expr::Literal(Literal::Str(text.clone()))),
            NodeKind::Escape(key) => Ok(Expr::Literal(Literal::Str(key.text().to_string()))),
            NodeKind::Map(entries) => {
                let mut compiled = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    compiled.push((key.clone(), self.expr(value, disable_escape)?));
                }
                Ok(Expr::Map(compiled))
            }
            NodeKind::Array(items) => {
                let mut compiled = Vec::with_capacity(items.len());
                for item in items {
                    compiled.push(self.expr(item, disable_escape)?);
                }
                Ok(Expr::Array(compiled))
            }
            NodeKind::Fn { params, body } => self.fn_expr(params, body, disable_escape),
            NodeKind::Pipe { start, stages } => self.pipe(start, stages, disable_escape),
            NodeKind::Call { callee, params } => self.call(callee, params, disable_escape),
            _ => Err(err(format!(
                "expected an expression but found a {}",
                node.kind_name()
            ))),
        }
    }

    fn fn_expr(
        &mut self,
        params: &Option<Vec<String>>,
        body: &Node,
        disable_escape: bool,
    ) -> Result<Expr, CompileError> {
        let params = params.clone().unwrap_or_default();
        let nodes = match &body.kind {
            NodeKind::Block(nodes) => nodes,
            _ => return Err(err("function must contain a block")),
        };
        let block = self.block(nodes, &params, disable_escape)?;
        Ok(Expr::Fn {
            params,
            body: Arc::new(block),
        })
    }

    /// `{start|f|g}` evaluates as `g(f(start))`. The start is invoked first
    /// when it names a callable. Pipe results are never escaped.
    fn pipe(
        &mut self,
        start: &Node,
        stages: &[Node],
        disable_escape: bool,
    ) -> Result<Expr, CompileError> {
        let mut acc = match &start.kind {
            NodeKind::Literal(_) | NodeKind::Map(_) | NodeKind::Array(_) => {
                self.expr(start, disable_escape)?
            }
            _ => Expr::Deref(Box::new(self.expr(start, disable_escape)?)),
        };
        for stage in stages {
            let callee = self.expr(stage, disable_escape)?;
            acc = Expr::Call {
                callee: Box::new(callee),
                args: vec![acc],
            };
        }
        Ok(acc)
    }

    fn call(
        &mut self,
        callee: &Node,
        params: &[Node],
        disable_escape: bool,
    ) -> Result<Expr, CompileError> {
        match directive_name(callee) {
            Some("def") => return Err(err("def is only allowed directly inside a block")),
            Some("pragma") => return Err(err("pragma is only allowed directly inside a block")),
            Some("safe") => {
                if params.len() != 1 {
                    return Err(err("safe must be called with 1 parameter"));
                }
                return self.expr(&params[0], true);
            }
            Some("include") => return self.include(params, disable_escape),
            _ => {}
        }

        let (callee_expr, protect) = match &callee.kind {
            NodeKind::Fn { .. } => (self.expr(callee, disable_escape)?, false),
            NodeKind::Identifier(ident) => self.resolve_ident(ident).map_err(|e| e.at(callee.position))?,
            _ => {
                return Err(err(format!(
                    "expected a callable but found a {}",
                    callee.kind_name()
                )))
            }
        };

        let mut out = if params.is_empty() {
            // Bare reference: invoke only if the value turns out callable.
            Expr::Deref(Box::new(callee_expr))
        } else {
            let mut args = Vec::with_capacity(params.len());
            for param in params {
                args.push(self.expr(param, disable_escape)?);
            }
            Expr::Call {
                callee: Box::new(callee_expr),
                args,
            }
        };

        if protect && !disable_escape {
            if let Some(escaper) = &self.default_escaper {
                out = Expr::Call {
                    callee: Box::new(escaper.clone()),
                    args: vec![out],
                };
            }
        }
        Ok(out)
    }

    fn include(&mut self, params: &[Node], disable_escape: bool) -> Result<Expr, CompileError> {
        if params.is_empty() || params.len() > 2 {
            return Err(err(
                "include must be called with 1 or 2 parameters: template name and optional data",
            ));
        }
        let name = self.expr(&params[0], disable_escape)?;
        let data = match params.get(1) {
            Some(param) => Some(Box::new(self.expr(param, disable_escape)?)),
            None => None,
        };
        Ok(Expr::Include {
            name: Box::new(name),
            data,
        })
    }

    fn def_directive(
        &mut self,
        params: &[Node],
        disable_escape: bool,
    ) -> Result<(String, Expr), CompileError> {
        if params.len() != 2 {
            return Err(err(
                "def must be called with 2 parameters: the identifier to define and a value to bind",
            )
            .at(params.first().map(|p| p.position).unwrap_or(Position::new(0, 0))));
        }
        let key = match &params[0].kind {
            NodeKind::Identifier(Ident {
                namespace: None,
                key: Some(key),
            }) if !key.contains('.') => key.clone(),
            NodeKind::Identifier(_) => {
                return Err(err("def identifier must be a plain un-namespaced name")
                    .at(params[0].position))
            }
            _ => {
                return Err(
                    err("def first parameter must be an identifier").at(params[0].position)
                )
            }
        };
        let value = self.expr(&params[1], disable_escape)?;
        if !self.scopes.declare(&key) {
            return Err(err(format!(
                "{key} is already defined in this scope and cannot be redefined"
            ))
            .at(params[0].position));
        }
        Ok((key, value))
    }

    fn pragma_directive(&mut self, params: &[Node]) -> Result<(), CompileError> {
        if params.len() != 2 {
            return Err(err("pragma must be called with 2 parameters")
                .at(params.first().map(|p| p.position).unwrap_or(Position::new(0, 0))));
        }
        let key = match &params[0].kind {
            NodeKind::Identifier(Ident {
                namespace: None,
                key: Some(key),
            }) => key.as_str(),
            _ => {
                return Err(err("pragma first parameter must be a plain option name")
                    .at(params[0].position))
            }
        };
        let value = match &params[1].kind {
            NodeKind::Literal(literal) => literal,
            _ => {
                return Err(
                    err("pragma second parameter must be a literal").at(params[1].position)
                )
            }
        };

        match key {
            "keepWhitespace" => {
                self.keep_whitespace = match value {
                    Literal::Bool(b) => *b,
                    Literal::Str(s) => s == "true",
                    Literal::Int(n) => *n != 0,
                    Literal::Float(f) => *f != 0.0,
                };
                Ok(())
            }
            "defaultEscape" => match value {
                Literal::Str(name) => self
                    .set_default_escape(name)
                    .map_err(|e| e.at(params[1].position)),
                _ => Err(err("defaultEscape pragma expects a string value")
                    .at(params[1].position)),
            },
            _ => Err(err(format!(
                "invalid pragma {key}, valid pragmas: keepWhitespace, defaultEscape"
            ))
            .at(params[0].position)),
        }
    }

    /// Resolution order: namespace access, built-in name, scope binding,
    /// free lookup. Returns the expression and whether a call through it
    /// should receive the default escaper.
    fn resolve_ident(&mut self, ident: &Ident) -> Result<(Expr, bool), CompileError> {
        if let Some(ns_name) = &ident.namespace {
            let ns = Namespace::from_name(ns_name).ok_or_else(|| {
                err(format!(
                    "unknown namespace {ns_name}, valid namespaces: data, strings, ctx, viewmodel, helper"
                ))
            })?;
            let path = match &ident.key {
                Some(key) => key.split('.').map(str::to_string).collect(),
                None => Vec::new(),
            };
            return Ok((Expr::Namespace { ns, path }, true));
        }

        let key = ident.key.as_deref().unwrap_or("");
        if let Some(intrinsic) = Intrinsic::from_name(key) {
            if !self.intrinsics.contains(&intrinsic) {
                self.intrinsics.push(intrinsic);
            }
            return Ok((Expr::Intrinsic(intrinsic), false));
        }

        let mut parts = key.split('.').map(str::to_string);
        let root = parts.next().unwrap_or_default();
        let path: Vec<String> = parts.collect();

        if self.scopes.contains(&root) {
            Ok((Expr::Local { name: root, path }, true))
        } else {
            if !self.lookups.contains(&root) {
                self.lookups.push(root.clone());
            }
            Ok((Expr::Lookup { root, path }, true))
        }
    }
}

fn flush(pending: &mut String, instrs: &mut Vec<Instr>) {
    if !pending.is_empty() {
        instrs.push(Instr::Text(std::mem::take(pending)));
    }
}

/// Bare, undotted callee name; directives hang off these and are matched
/// before any scope binding.
fn directive_name(callee: &Node) -> Option<&str> {
    match &callee.kind {
        NodeKind::Identifier(Ident {
            namespace: None,
            key: Some(key),
        }) if !key.contains('.') => Some(key.as_str()),
        _ => None,
    }
}
