use std::collections::HashMap;
use std::sync::Arc;

use curly::runtime::pending::Pending;
use curly::{
    compile, CompileOptions, RenderError, Rendered, TemplateHost, Value, ViewModelFactory,
};

/// Host backing a small template set, the way an application would wire
/// includes and helpers together.
struct PageHost {
    templates: HashMap<String, String>,
}

impl PageHost {
    fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "header".to_string(),
            "<h1>{title}</h1>".to_string(),
        );
        templates.insert(
            "row".to_string(),
            "<li>{label}</li>".to_string(),
        );
        Self { templates }
    }
}

impl TemplateHost for PageHost {
    fn helper(&self, name: &str) -> Option<Value> {
        (name == "siteName").then(|| Value::text("Curly"))
    }

    fn render_include(
        &self,
        name: &str,
        data: Value,
        context: Value,
    ) -> Result<Value, RenderError> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| RenderError::msg(format!("unknown template {name}")))?;
        let template = compile(name, source, &CompileOptions::default())
            .map_err(|e| RenderError::msg(e.to_string()))?;
        match template
            .bind(Arc::new(PageHost::new()), None)
            .render(data, Value::Null, context)?
        {
            Rendered::Ready(text) => Ok(Value::Text(text)),
            Rendered::Pending(pending) => Ok(Value::Pending(pending)),
        }
    }
}

#[test]
fn full_page_renders_with_includes_loops_and_strings() {
    let source = "\
{include \"header\" data::page}\
<ul>{each items {fn (item)\
{include \"row\" item}\
}}</ul>\
<p>{strings::footer} - {siteName}</p>";

    let template = compile("page", source, &CompileOptions::default()).expect("compile");
    let bound = template.bind(Arc::new(PageHost::new()), None);

    let data = Value::from(serde_json::json!({
        "page": { "title": "Inbox <unread>" },
        "items": [ { "label": "one" }, { "label": "two" } ],
    }));
    let strings = Value::from(serde_json::json!({ "footer": "All done" }));

    let output = bound
        .render(data, strings, Value::Null)
        .expect("render")
        .wait()
        .expect("wait");

    assert_eq!(
        output,
        "<h1>Inbox &lt;unread&gt;</h1>\
         <ul><li>one</li><li>two</li></ul>\
         <p>All done - Curly</p>"
    );
}

#[test]
fn multiline_templates_fold_formatting_whitespace() {
    let source = "Dear {name},\n    thanks for {count} orders.";
    let template = compile("letter", source, &CompileOptions::default()).expect("compile");
    let output = template
        .render(Value::from(serde_json::json!({ "name": "Ada", "count": 3 })))
        .expect("render")
        .wait()
        .expect("wait");
    assert_eq!(output, "Dear Ada,thanks for 3 orders.");
}

#[test]
fn keep_whitespace_pragma_preserves_line_breaks() {
    let source = "{pragma keepWhitespace true}Dear {name},\n    thanks.";
    let template = compile("letter", source, &CompileOptions::default()).expect("compile");
    let output = template
        .render(Value::from(serde_json::json!({ "name": "Ada" })))
        .expect("render")
        .wait()
        .expect("wait");
    assert_eq!(output, "Dear Ada,\nthanks.");
}

struct FeedHost {
    entries: Pending,
}

impl TemplateHost for FeedHost {
    fn helper(&self, name: &str) -> Option<Value> {
        (name == "entries").then(|| Value::Pending(self.entries.clone()))
    }
}

#[test]
fn render_completes_when_late_data_arrives() {
    let source = "<ul>{each entries {fn (e)<li>{e}</li>}}</ul>";
    let template = compile("feed", source, &CompileOptions::default()).expect("compile");

    let (entries, handle) = Pending::deferred();
    let bound = template.bind(Arc::new(FeedHost { entries }), None);
    let rendered = bound
        .render(Value::Null, Value::Null, Value::Null)
        .expect("render");
    assert!(rendered.ready().is_none(), "output should still be pending");

    handle.complete(Value::array(vec![Value::text("a"), Value::text("b")]));
    assert_eq!(
        rendered.wait().expect("wait"),
        "<ul><li>a</li><li>b</li></ul>"
    );
}

struct UserViewModel;

impl ViewModelFactory for UserViewModel {
    fn instantiate(&self, data: &Value, _strings: &Value, _context: &Value) -> Value {
        let mut map = HashMap::new();
        map.insert("shout".to_string(), data.clone());
        Value::map(map)
    }
}

#[test]
fn viewmodel_namespace_reaches_factory_values() {
    let template = compile("vm", "{viewmodel::shout.name}!", &CompileOptions::default())
        .expect("compile");
    let bound = template.bind(Arc::new(PageHost::new()), Some(Arc::new(UserViewModel)));
    let output = bound
        .render(
            Value::from(serde_json::json!({ "name": "hey" })),
            Value::Null,
            Value::Null,
        )
        .expect("render")
        .wait()
        .expect("wait");
    assert_eq!(output, "hey!");
}
