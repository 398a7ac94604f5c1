use std::sync::Arc;

use crate::ast::Literal;

/// Executable form of a template block. Declarations are hoisted: every
/// `def` in the block is bound before any instruction runs, in source
/// order.
#[derive(Debug, Clone)]
pub struct Block {
    pub decls: Vec<(String, Expr)>,
    pub instrs: Vec<Instr>,
}

#[derive(Debug, Clone)]
pub enum Instr {
    /// Literal text, adjacent runs already coalesced.
    Text(String),
    /// Evaluate and append to the output buffer.
    Write(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Literal(Literal),
    /// A name bound in an enclosing block (`def` or function parameter),
    /// with any remaining dotted path applied to it.
    Local { name: String, path: Vec<String> },
    /// A free root resolved once per render across the lookup sources.
    Lookup { root: String, path: Vec<String> },
    Namespace { ns: Namespace, path: Vec<String> },
    Intrinsic(Intrinsic),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// Invoke the value when it is callable, otherwise pass it through.
    Deref(Box<Expr>),
    Fn { params: Vec<String>, body: Arc<Block> },
    Map(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    /// Sub-template render. The current context is forwarded at
    /// evaluation time and the result is never escaped.
    Include {
        name: Box<Expr>,
        data: Option<Box<Expr>>,
    },
}

/// The five value sources addressable with `ns::key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Data,
    Strings,
    Ctx,
    ViewModel,
    Helper,
}

impl Namespace {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "data" => Some(Namespace::Data),
            "strings" => Some(Namespace::Strings),
            "ctx" => Some(Namespace::Ctx),
            "viewmodel" => Some(Namespace::ViewModel),
            "helper" => Some(Namespace::Helper),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Namespace::Data => "data",
            Namespace::Strings => "strings",
            Namespace::Ctx => "ctx",
            Namespace::ViewModel => "viewmodel",
            Namespace::Helper => "helper",
        }
    }
}

/// Built-in functions addressable by bare name. Bare identifiers resolve
/// here before any scope or lookup, so these names cannot be shadowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    If,
    Each,
    IsEmpty,
    IsNotEmpty,
    Get,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    CmpAnd,
    CmpOr,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    EscapeHtml,
    EscapeJs,
    EscapeJson,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Intrinsic::If),
            "each" => Some(Intrinsic::Each),
            "isEmpty" => Some(Intrinsic::IsEmpty),
            "isNotEmpty" => Some(Intrinsic::IsNotEmpty),
            "get" => Some(Intrinsic::Get),
            "eq" => Some(Intrinsic::Eq),
            "neq" => Some(Intrinsic::Neq),
            "lt" => Some(Intrinsic::Lt),
            "gt" => Some(Intrinsic::Gt),
            "lte" => Some(Intrinsic::Lte),
            "gte" => Some(Intrinsic::Gte),
            "cmpand" => Some(Intrinsic::CmpAnd),
            "cmpor" => Some(Intrinsic::CmpOr),
            "not" => Some(Intrinsic::Not),
            "add" => Some(Intrinsic::Add),
            "sub" => Some(Intrinsic::Sub),
            "mul" => Some(Intrinsic::Mul),
            "div" => Some(Intrinsic::Div),
            "mod" => Some(Intrinsic::Mod),
            "escapeHtml" => Some(Intrinsic::EscapeHtml),
            "escapeJs" => Some(Intrinsic::EscapeJs),
            "escapeJson" => Some(Intrinsic::EscapeJson),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::If => "if",
            Intrinsic::Each => "each",
            Intrinsic::IsEmpty => "isEmpty",
            Intrinsic::IsNotEmpty => "isNotEmpty",
            Intrinsic::Get => "get",
            Intrinsic::Eq => "eq",
            Intrinsic::Neq => "neq",
            Intrinsic::Lt => "lt",
            Intrinsic::Gt => "gt",
            Intrinsic::Lte => "lte",
            Intrinsic::Gte => "gte",
            Intrinsic::CmpAnd => "cmpand",
            Intrinsic::CmpOr => "cmpor",
            Intrinsic::Not => "not",
            Intrinsic::Add => "add",
            Intrinsic::Sub => "sub",
            Intrinsic::Mul => "mul",
            Intrinsic::Div => "div",
            Intrinsic::Mod => "mod",
            Intrinsic::EscapeHtml => "escapeHtml",
            Intrinsic::EscapeJs => "escapeJs",
            Intrinsic::EscapeJson => "escapeJson",
        }
    }
}
