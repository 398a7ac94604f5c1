//! Brace-tag templating. Every dynamic region of a template is a `{...}`
//! tag; everything else is literal text. Source compiles to an executable
//! template that renders against a data value, optional localized strings,
//! and a render context. Rendering is synchronous when every input is
//! ready and turns into a pending result when a host value arrives later,
//! without the template having to care which happened.
//!
//! ```
//! use curly::{compile, CompileOptions, Value};
//!
//! let template = compile("greet", "Hello {name}!", &CompileOptions::default()).unwrap();
//! let data = Value::from(serde_json::json!({ "name": "world" }));
//! let output = template.render(data).unwrap().wait().unwrap();
//! assert_eq!(output, "Hello world!");
//! ```

pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod parser;
pub mod runtime;

mod scope;

pub use compiler::{compile, compile_ast, CompileOptions};
pub use error::{CompileError, Error, RenderError, SyntaxError};
pub use runtime::values::{format_value, Value};
pub use runtime::{BoundTemplate, Rendered, Template, TemplateHost, ViewModelFactory};
