use super::parse;
use crate::ast::{EscapeKey, Literal, Node, NodeKind};

fn block_nodes(node: &Node) -> &[Node] {
    match &node.kind {
        NodeKind::Block(nodes) => nodes,
        other => panic!("expected block, got {other:?}"),
    }
}

fn ident_name(node: &Node) -> String {
    match &node.kind {
        NodeKind::Identifier(ident) => ident.display_name(),
        other => panic!("expected identifier, got {other:?}"),
    }
}

#[test]
fn plain_text_is_a_single_buffer() {
    let ast = parse("hello world!").expect("parse");
    let nodes = block_nodes(&ast);
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0].kind, NodeKind::Buffer(text) if text == "hello world!"));
}

#[test]
fn line_breaks_become_format_nodes() {
    let ast = parse("a\n  b").expect("parse");
    let nodes = block_nodes(&ast);
    assert_eq!(nodes.len(), 3);
    assert!(matches!(&nodes[0].kind, NodeKind::Buffer(t) if t == "a"));
    assert!(matches!(&nodes[1].kind, NodeKind::Format(t) if t == "\n  "));
    assert!(matches!(&nodes[2].kind, NodeKind::Buffer(t) if t == "b"));
}

#[test]
fn bare_reference_parses_as_zero_param_call() {
    let ast = parse("{name}").expect("parse");
    let nodes = block_nodes(&ast);
    match &nodes[0].kind {
        NodeKind::Call { callee, params } => {
            assert_eq!(ident_name(callee), "name");
            assert!(params.is_empty());
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn namespaced_identifiers_keep_namespace_and_path() {
    let ast = parse("{data::user.name}{ctx::.}").expect("parse");
    let nodes = block_nodes(&ast);
    match &nodes[0].kind {
        NodeKind::Call { callee, .. } => assert_eq!(ident_name(callee), "data::user.name"),
        other => panic!("expected call, got {other:?}"),
    }
    match &nodes[1].kind {
        NodeKind::Call { callee, .. } => assert_eq!(ident_name(callee), "ctx::."),
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn call_parameters_accept_literals_and_identifiers() {
    let ast = parse(r#"{format date "YYYY" 42 -3 2.5 true}"#).expect("parse");
    let nodes = block_nodes(&ast);
    match &nodes[0].kind {
        NodeKind::Call { callee, params } => {
            assert_eq!(ident_name(callee), "format");
            assert_eq!(params.len(), 6);
            assert!(matches!(&params[0].kind, NodeKind::Identifier(_)));
            assert!(matches!(&params[1].kind, NodeKind::Literal(Literal::Str(s)) if s == "YYYY"));
            assert!(matches!(&params[2].kind, NodeKind::Literal(Literal::Int(42))));
            assert!(matches!(&params[3].kind, NodeKind::Literal(Literal::Int(-3))));
            assert!(matches!(&params[4].kind, NodeKind::Literal(Literal::Float(f)) if *f == 2.5));
            assert!(matches!(&params[5].kind, NodeKind::Literal(Literal::Bool(true))));
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn operator_callables_alias_to_builtin_names() {
    for (source, expected) in [
        ("{== a b}", "eq"),
        ("{!= a b}", "neq"),
        ("{<= a b}", "lte"),
        ("{< a b}", "lt"),
        ("{and a b}", "cmpand"),
        ("{or a b}", "cmpor"),
        ("{not a}", "not"),
        ("{+ a b}", "add"),
        ("{% a b}", "mod"),
    ] {
        let ast = parse(source).expect(source);
        match &block_nodes(&ast)[0].kind {
            NodeKind::Call { callee, .. } => assert_eq!(ident_name(callee), expected, "{source}"),
            other => panic!("expected call for {source}, got {other:?}"),
        }
    }
}

#[test]
fn pipe_collects_stages_in_order() {
    let ast = parse("{name|upper|trim}").expect("parse");
    match &block_nodes(&ast)[0].kind {
        NodeKind::Pipe { start, stages } => {
            assert_eq!(ident_name(start), "name");
            assert_eq!(stages.len(), 2);
            assert_eq!(ident_name(&stages[0]), "upper");
            assert_eq!(ident_name(&stages[1]), "trim");
        }
        other => panic!("expected pipe, got {other:?}"),
    }
}

#[test]
fn pipe_rejects_whitespace_after_the_bar() {
    assert!(parse("{name| upper}").is_err());
}

#[test]
fn pipe_start_may_be_a_literal() {
    let ast = parse(r#"{"text"|upper}"#).expect("parse");
    match &block_nodes(&ast)[0].kind {
        NodeKind::Pipe { start, .. } => {
            assert!(matches!(&start.kind, NodeKind::Literal(Literal::Str(s)) if s == "text"));
        }
        other => panic!("expected pipe, got {other:?}"),
    }
}

#[test]
fn fn_tag_binds_parameters_and_body() {
    let ast = parse("{fn (a b)Hi {a}}").expect("parse");
    match &block_nodes(&ast)[0].kind {
        NodeKind::Fn { params, body } => {
            assert_eq!(params.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
            let inner = block_nodes(body);
            assert!(matches!(&inner[0].kind, NodeKind::Buffer(t) if t == "Hi "));
            assert!(matches!(&inner[1].kind, NodeKind::Call { .. }));
        }
        other => panic!("expected fn, got {other:?}"),
    }
}

#[test]
fn fn_tag_parameters_are_optional() {
    let ast = parse("{fn text}").expect("parse");
    match &block_nodes(&ast)[0].kind {
        NodeKind::Fn { params, body } => {
            assert!(params.is_none());
            assert!(matches!(&block_nodes(body)[0].kind, NodeKind::Buffer(t) if t == "text"));
        }
        other => panic!("expected fn, got {other:?}"),
    }
}

#[test]
fn raw_tag_keeps_content_verbatim() {
    let ast = parse("{`<b>&{}</b>`}").expect("parse");
    assert!(
        matches!(&block_nodes(&ast)[0].kind, NodeKind::Raw(t) if t == "<b>&{}</b>")
    );
}

#[test]
fn escape_tags_map_to_their_characters() {
    let ast = parse("{~lb}{~rb}{~s}{~n}{~r}").expect("parse");
    let keys: Vec<EscapeKey> = block_nodes(&ast)
        .iter()
        .map(|n| match &n.kind {
            NodeKind::Escape(key) => *key,
            other => panic!("expected escape, got {other:?}"),
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            EscapeKey::LeftBrace,
            EscapeKey::RightBrace,
            EscapeKey::Space,
            EscapeKey::Newline,
            EscapeKey::CarriageReturn,
        ]
    );
}

#[test]
fn empty_tag_parses() {
    let ast = parse("{}").expect("parse");
    assert!(matches!(&block_nodes(&ast)[0].kind, NodeKind::Empty));
}

#[test]
fn comments_disappear_from_the_tree() {
    let ast = parse("a{* note with {tags} inside *}b").expect("parse");
    let nodes = block_nodes(&ast);
    assert_eq!(nodes.len(), 2);
    assert!(matches!(&nodes[0].kind, NodeKind::Buffer(t) if t == "a"));
    assert!(matches!(&nodes[1].kind, NodeKind::Buffer(t) if t == "b"));
}

#[test]
fn maps_and_arrays_parse_in_parameter_position() {
    let ast = parse(r#"{set (:a 1 :b "x") (1 2) (:) ()}"#).expect("parse");
    match &block_nodes(&ast)[0].kind {
        NodeKind::Call { params, .. } => {
            assert_eq!(params.len(), 4);
            match &params[0].kind {
                NodeKind::Map(entries) => {
                    assert_eq!(entries.len(), 2);
                    assert_eq!(entries[0].0, "a");
                    assert_eq!(entries[1].0, "b");
                }
                other => panic!("expected map, got {other:?}"),
            }
            assert!(matches!(&params[1].kind, NodeKind::Array(items) if items.len() == 2));
            assert!(matches!(&params[2].kind, NodeKind::Map(entries) if entries.is_empty()));
            assert!(matches!(&params[3].kind, NodeKind::Array(items) if items.is_empty()));
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn string_literals_do_not_span_lines() {
    assert!(parse("{f \"a\nb\"}").is_err());
}

#[test]
fn unterminated_comment_is_an_error() {
    assert!(parse("{* never closed").is_err());
}

#[test]
fn errors_report_position_and_found_character() {
    let err = parse("line1\n{bad!}").expect_err("should fail");
    assert_eq!(err.position.line, 2);
    assert_eq!(err.position.column, 5);
    assert_eq!(err.found.as_deref(), Some("!"));
    assert!(err.message.starts_with("Expected "));
    assert!(err.message.ends_with("but \"!\" found."));
}

#[test]
fn errors_at_end_of_input_say_so() {
    let err = parse("{").expect_err("should fail");
    assert!(err.found.is_none());
    assert!(err.message.contains("end of input found"));
}

#[test]
fn crlf_counts_as_one_line_break() {
    let err = parse("a\r\nb{!}").expect_err("should fail");
    assert_eq!(err.position.line, 2);
    assert_eq!(err.position.column, 3);
}
