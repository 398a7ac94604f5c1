use super::{compile, CompileOptions};
use crate::error::Error;
use crate::ir::{Expr, Instr, Intrinsic};
use crate::runtime::Template;

fn compiled(source: &str) -> Template {
    compile("test", source, &CompileOptions::default()).expect("compile")
}

fn compile_err(source: &str) -> crate::error::CompileError {
    match compile("test", source, &CompileOptions::default()) {
        Err(Error::Compile(err)) => err,
        Err(other) => panic!("expected compile error, got {other:?}"),
        Ok(_) => panic!("expected compile error, got a template"),
    }
}

#[test]
fn adjacent_text_runs_coalesce_into_one_instruction() {
    let template = compiled("a{~n}b{`<raw>`}c");
    assert_eq!(template.body.instrs.len(), 1);
    assert!(matches!(&template.body.instrs[0], Instr::Text(t) if t == "a\nb<raw>c"));
}

#[test]
fn whitespace_between_tags_is_dropped_by_default() {
    let template = compiled("a\n   b");
    assert!(matches!(&template.body.instrs[0], Instr::Text(t) if t == "ab"));
}

#[test]
fn keep_whitespace_emits_one_line_break_per_boundary() {
    let options = CompileOptions {
        keep_whitespace: true,
        ..Default::default()
    };
    let template = compile("test", "a\n   b", &options).expect("compile");
    assert!(matches!(&template.body.instrs[0], Instr::Text(t) if t == "a\nb"));
}

#[test]
fn bare_reference_gets_deref_and_html_escaping() {
    let template = compiled("{name}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { callee, args }) => {
            assert!(matches!(**callee, Expr::Intrinsic(Intrinsic::EscapeHtml)));
            assert!(matches!(&args[0], Expr::Deref(inner)
                if matches!(&**inner, Expr::Lookup { root, .. } if root == "name")));
        }
        other => panic!("expected escaped write, got {other:?}"),
    }
    assert_eq!(template.lookups, vec!["name".to_string()]);
    assert!(template.intrinsics.contains(&Intrinsic::EscapeHtml));
}

#[test]
fn safe_compiles_its_argument_without_escaping() {
    let template = compiled("{safe {name}}");
    assert!(matches!(
        &template.body.instrs[0],
        Instr::Write(Expr::Deref(_))
    ));
}

#[test]
fn empty_default_escape_disables_escaping() {
    let options = CompileOptions {
        default_escape: Some(String::new()),
        ..Default::default()
    };
    let template = compile("test", "{name}", &options).expect("compile");
    assert!(matches!(
        &template.body.instrs[0],
        Instr::Write(Expr::Deref(_))
    ));
}

#[test]
fn default_escape_pragma_switches_the_escaper_mid_template() {
    let template = compiled("{pragma defaultEscape \"escapeJs\"}{name}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { callee, .. }) => {
            assert!(matches!(**callee, Expr::Intrinsic(Intrinsic::EscapeJs)));
        }
        other => panic!("expected escaped write, got {other:?}"),
    }
}

#[test]
fn keep_whitespace_pragma_applies_from_that_point() {
    let template = compiled("{pragma keepWhitespace true}a\nb");
    assert!(matches!(&template.body.instrs[0], Instr::Text(t) if t == "a\nb"));
}

#[test]
fn intrinsic_calls_are_not_escaped() {
    let template = compiled("{eq a b}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { callee, args }) => {
            assert!(matches!(**callee, Expr::Intrinsic(Intrinsic::Eq)));
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected plain call, got {other:?}"),
    }
}

#[test]
fn pipes_are_not_escaped() {
    let template = compiled("{name|upper}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { callee, args }) => {
            assert!(matches!(&**callee, Expr::Lookup { root, .. } if root == "upper"));
            assert!(matches!(&args[0], Expr::Deref(_)));
        }
        other => panic!("expected pipe call, got {other:?}"),
    }
    assert_eq!(template.lookups, vec!["name".to_string(), "upper".to_string()]);
}

#[test]
fn defs_hoist_above_output_but_bind_in_source_order() {
    let template = compiled("{def greeting \"hi\"}{greeting}");
    assert_eq!(template.body.decls.len(), 1);
    assert_eq!(template.body.decls[0].0, "greeting");
    // bound names resolve locally, not through the lookup table
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { args, .. }) => {
            assert!(matches!(&args[0], Expr::Deref(inner)
                if matches!(&**inner, Expr::Local { name, .. } if name == "greeting")));
        }
        other => panic!("expected escaped local write, got {other:?}"),
    }
    assert!(template.lookups.is_empty());
}

#[test]
fn reference_before_def_in_the_same_block_is_a_free_lookup() {
    let template = compiled("{greeting}{def greeting \"hi\"}");
    assert_eq!(template.lookups, vec!["greeting".to_string()]);
}

#[test]
fn duplicate_def_in_one_scope_is_rejected() {
    let err = compile_err("{def x 1}{def x 2}");
    assert!(err.message.contains("already defined"));
}

#[test]
fn def_may_shadow_an_outer_scope() {
    compiled("{def x 1}{fn {def x 2}{x}}");
}

#[test]
fn def_rejects_dotted_and_namespaced_names() {
    assert!(compile_err("{def a.b 1}").message.contains("plain"));
    assert!(compile_err("{def data::a 1}").message.contains("plain"));
}

#[test]
fn def_requires_exactly_two_parameters() {
    let err = compile_err("{def x}");
    assert!(err.message.contains("2 parameters"));
}

#[test]
fn unknown_pragma_is_rejected() {
    let err = compile_err("{pragma frobnicate true}");
    assert!(err.message.contains("invalid pragma"));
}

#[test]
fn include_compiles_with_optional_data() {
    let template = compiled("{include \"partial\" data::user}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Include { name, data }) => {
            assert!(matches!(&**name, Expr::Literal(_)));
            assert!(data.is_some());
        }
        other => panic!("expected include, got {other:?}"),
    }
}

#[test]
fn include_is_never_escaped() {
    let template = compiled("{include \"partial\"}");
    assert!(matches!(
        &template.body.instrs[0],
        Instr::Write(Expr::Include { data: None, .. })
    ));
}

#[test]
fn include_arity_is_checked() {
    let err = compile_err("{include \"a\" b c}");
    assert!(err.message.contains("1 or 2 parameters"));
}

#[test]
fn unknown_namespace_is_rejected_with_a_position() {
    let err = compile_err("line\n{foo::bar}");
    assert!(err.message.contains("unknown namespace"));
    assert_eq!(err.position.line, 2);
    assert_eq!(err.template, "test");
}

#[test]
fn fn_parameters_resolve_as_locals_inside_the_body() {
    let template = compiled("{each items {fn (item){item}}}");
    match &template.body.instrs[0] {
        Instr::Write(Expr::Call { callee, args }) => {
            assert!(matches!(**callee, Expr::Intrinsic(Intrinsic::Each)));
            assert!(matches!(&args[1], Expr::Fn { params, .. } if params == &["item".to_string()]));
        }
        other => panic!("expected each call, got {other:?}"),
    }
    assert_eq!(template.lookups, vec!["items".to_string()]);
}

#[test]
fn syntax_errors_carry_the_template_name() {
    match compile("broken", "{", &CompileOptions::default()) {
        Err(Error::Syntax { template, source }) => {
            assert_eq!(template, "broken");
            assert!(source.message.contains("end of input"));
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}
