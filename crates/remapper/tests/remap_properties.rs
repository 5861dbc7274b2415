use std::sync::Arc;

use remapper::{
    EvalValue, RemapContext, RemapEnv, RemapErrorKind, evaluate, parse_remapper,
    parse_remapper_yaml, remap,
};
use serde_json::{Value as JsonValue, json};

fn ctx(root: JsonValue) -> RemapContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    RemapContext::new(root, Arc::new(RemapEnv::default()))
}

fn run(yaml: &str, input: JsonValue) -> Option<JsonValue> {
    let remapper = parse_remapper_yaml(yaml).expect("failed to parse remapper");
    remap(&remapper, &input, &ctx(input.clone())).expect("remap failed")
}

#[test]
fn literal_is_identity_for_any_input() {
    for literal in [
        json!("text"),
        json!(12.5),
        json!(true),
        json!(null),
        json!({"a": 1, "b": 2}),
        json!([1, 2]),
        json!([[1, 2], {"a": [3]}]),
        json!([]),
    ] {
        let remapper = parse_remapper(&literal).unwrap();
        for input in [json!(null), json!({"a": 9}), json!([1, 2, 3])] {
            assert_eq!(
                remap(&remapper, &input, &ctx(input.clone())).unwrap(),
                Some(literal.clone())
            );
        }
    }
}

#[test]
fn pipeline_feeds_each_step_and_appends_history() {
    let a = parse_remapper(&json!({"prop": "a"})).unwrap();
    let b = parse_remapper(&json!({"object.from": {"before": {"history": 0}, "now": {"prop": "b"}}}))
        .unwrap();
    let pipeline = parse_remapper(&json!([{"prop": "a"}, {"object.from": {"before": {"history": 0}, "now": {"prop": "b"}}}]))
        .unwrap();
    let input = json!({"a": {"b": 5}});
    let base = ctx(input.clone());

    let whole = evaluate(&pipeline, EvalValue::Value(input.clone()), &base).unwrap();
    let step = evaluate(&a, EvalValue::Value(input.clone()), &base).unwrap();
    let composed = evaluate(&b, step, &base.with_history(EvalValue::Value(input.clone()))).unwrap();

    assert_eq!(whole, composed);
    assert_eq!(whole, EvalValue::Value(json!({"before": {"a": {"b": 5}}, "now": 5})));
}

#[test]
fn later_pipeline_steps_see_every_earlier_value() {
    let yaml = r#"
- prop: order
- prop: lines
- object.from:
    input:
      history: 0
    order:
      history: 1
    lines:
      history: 2
    count:
      prop: length
"#;
    let input = json!({"order": {"id": 9, "lines": {"length": 2}}});
    assert_eq!(
        run(yaml, input.clone()),
        Some(json!({
            "input": input,
            "order": {"id": 9, "lines": {"length": 2}},
            "lines": {"length": 2},
            "count": 2,
        }))
    );
}

#[test]
fn prop_reads_paths_and_missing_is_undefined() {
    assert_eq!(run("prop: a.b", json!({"a": {"b": 5}})), Some(json!(5)));
    assert_eq!(run("prop: a.c", json!({"a": {"b": 5}})), None);
    assert_eq!(run("prop: 'items[1].id'", json!({"items": [{"id": 1}, {"id": 2}]})), Some(json!(2)));
}

#[test]
fn object_from_keeps_declaration_order() {
    let yaml = r#"
object.from:
  x:
    prop: a
  y: 1
"#;
    let output = run(yaml, json!({"a": 10})).unwrap();
    assert_eq!(output, json!({"x": 10, "y": 1}));
    let keys: Vec<&str> = output.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["x", "y"]);
}

#[test]
fn array_map_preserves_element_order() {
    assert_eq!(
        run("array.map: { prop: n }", json!([{"n": 1}, {"n": 2}])),
        Some(json!([1, 2]))
    );
}

#[test]
fn array_operations_handle_large_inputs() {
    let items: Vec<JsonValue> = (0..50_000).map(|n| json!({"n": n, "k": n % 7})).collect();
    let input = JsonValue::Array(items);

    let mapped = run("array.map: { prop: n }", input.clone()).unwrap();
    let mapped = mapped.as_array().unwrap();
    assert_eq!(mapped.len(), 50_000);
    assert_eq!(mapped[49_999], json!(49_999));

    let unique = run("array.unique: { prop: k }", input).unwrap();
    assert_eq!(unique.as_array().map(Vec::len), Some(7));
}

#[test]
fn equals_compares_structurally() {
    assert_eq!(run("equals: [{ prop: a }, 5]", json!({"a": 5})), Some(json!(true)));
    assert_eq!(
        run("equals: [[1, 2], [1, 2]]", json!(null)),
        Some(json!(true))
    );
    assert_eq!(
        run("equals: [[1, 2], [3, 2]]", json!(null)),
        Some(json!(false))
    );
    assert_eq!(run("equals: [[1, 2], [1, 2, 3]]", json!(null)), Some(json!(false)));
    assert_eq!(
        run(
            "equals: [{ static: { a: [1, { b: 2 }] } }, { prop: v }]",
            json!({"v": {"a": [1, {"b": 2}]}})
        ),
        Some(json!(true))
    );
}

#[test]
fn if_selects_branch_by_condition() {
    let yaml = r#"
if:
  condition:
    equals:
      - prop: a
      - 1
  then: "yes"
  else: "no"
"#;
    assert_eq!(run(yaml, json!({"a": 1})), Some(json!("yes")));
    assert_eq!(run(yaml, json!({"a": 2})), Some(json!("no")));
}

#[test]
fn history_tag_form_reads_earlier_values() {
    let yaml = r#"
- prop: user
- history.0: true
"#;
    assert_eq!(run(yaml, json!({"user": "x"})), Some(json!({"user": "x"})));
}

#[test]
fn evaluation_is_idempotent() {
    let yaml = r#"
- array.filter: { gt: [{ prop: score }, 50] }
- array.map:
    object.from:
      name: { prop: name }
      rank: { array: index }
"#;
    let input = json!([
        {"name": "a", "score": 70},
        {"name": "b", "score": 20},
        {"name": "c", "score": 90}
    ]);
    let first = run(yaml, input.clone());
    let second = run(yaml, input);
    assert_eq!(first, second);
    assert_eq!(
        first,
        Some(json!([{"name": "a", "rank": 0}, {"name": "c", "rank": 1}]))
    );
}

#[test]
fn definition_errors_surface_with_location() {
    let err = parse_remapper_yaml(
        r#"
- prop: a
- object.from:
    x:
      string.cases: upper
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind, RemapErrorKind::UnknownOperation);
    assert_eq!(err.path.as_deref(), Some("$[1].object.from.x"));

    let err = parse_remapper_yaml("prop: [").unwrap_err();
    assert_eq!(err.kind, RemapErrorKind::InvalidDefinition);
}

#[test]
fn data_errors_are_absorbed() {
    assert_eq!(run("[{ prop: n }, { number.parse: null }]", json!({"n": "x"})), None);
    assert_eq!(run("[{ prop: d }, { date.parse: null }]", json!({"d": 3.5e20})), None);
    assert_eq!(run("array.map: { prop: a }", json!("not an array")), None);
    assert_eq!(run("string.case: upper", json!(5)), None);
}

#[test]
fn remappers_deserialize_inside_larger_structures() {
    #[derive(serde::Deserialize)]
    struct Field {
        name: String,
        value: remapper::Remapper,
    }
    let field: Field = serde_yaml::from_str("name: total\nvalue:\n  prop: amount\n").unwrap();
    assert_eq!(field.name, "total");
    assert_eq!(
        remap(&field.value, &json!({"amount": 3}), &ctx(json!(null))).unwrap(),
        Some(json!(3))
    );
}
