use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remapper::{MessageCatalog, RemapContext, RemapEnv};
use remapper_action::{
    ActionConfig, ActionDefinition, ActionError, ActionHandler, ActionRunner, ActionState,
    parse_action_yaml,
};
use serde_json::{Value as JsonValue, json};

fn ctx() -> RemapContext {
    ctx_with(MessageCatalog::new())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ctx_with(catalog: MessageCatalog) -> RemapContext {
    init_tracing();
    let env = RemapEnv::new("en", Arc::new(catalog));
    RemapContext::new(json!({"source": "test"}), Arc::new(env))
}

fn action(yaml: &str) -> ActionDefinition {
    parse_action_yaml(yaml).expect("failed to parse action")
}

/// Echoes its input together with the action's params and the history seen.
struct Echo;

#[async_trait]
impl ActionHandler for Echo {
    async fn execute(
        &self,
        action: &ActionDefinition,
        input: JsonValue,
        ctx: &RemapContext,
    ) -> anyhow::Result<JsonValue> {
        Ok(json!({
            "input": input,
            "params": action.params,
            "historyLength": ctx.history().len(),
        }))
    }
}

struct Failing;

#[async_trait]
impl ActionHandler for Failing {
    async fn execute(
        &self,
        _action: &ActionDefinition,
        _input: JsonValue,
        _ctx: &RemapContext,
    ) -> anyhow::Result<JsonValue> {
        anyhow::bail!("upstream returned 503")
    }
}

/// Sleeps for `input.delay` milliseconds, then returns `input.id`.
struct Delay;

#[async_trait]
impl ActionHandler for Delay {
    async fn execute(
        &self,
        _action: &ActionDefinition,
        input: JsonValue,
        _ctx: &RemapContext,
    ) -> anyhow::Result<JsonValue> {
        let delay = input["delay"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(input["id"].clone())
    }
}

#[tokio::test]
async fn follow_up_action_sees_pre_remap_value_in_history() {
    let chain = action(
        r#"
type: noop
remapAfter:
  prop: id
onSuccess:
  type: noop
  remapBefore:
    history.0: true
"#,
    );
    let input = json!({"id": 7, "name": "widget"});
    let outcome = ActionRunner::default().run(&chain, input.clone(), &ctx()).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.value, Some(input));
}

#[tokio::test]
async fn history_holds_incoming_data_not_remapped_or_handler_values() {
    let runner = ActionRunner::default().with_handler("echo", Arc::new(Echo));
    let chain = action(
        r#"
type: echo
remapBefore:
  object.from:
    orderId:
      prop: id
remapAfter:
  prop: input
onSuccess:
  type: noop
  remapBefore:
    object.from:
      seen:
        history: 0
      incoming:
        history: 1
"#,
    );
    let input = json!({"id": 7, "name": "widget"});
    let output = runner
        .run(&chain, input.clone(), &ctx())
        .await
        .into_result()
        .unwrap();

    let final_of_first = json!({"orderId": 7});
    assert_eq!(output, json!({"seen": input, "incoming": final_of_first}));
    assert_ne!(output["seen"], final_of_first);
    assert!(output["seen"].get("input").is_none());
}

#[tokio::test]
async fn registered_handler_receives_remapped_input_and_params() {
    let runner = ActionRunner::default().with_handler("echo", Arc::new(Echo));
    let chain = action(
        r#"
type: echo
url: https://api.example.com/orders
remapBefore:
  object.from:
    orderId:
      prop: id
remapAfter:
  prop: input
"#,
    );
    let outcome = runner.run(&chain, json!({"id": 42}), &ctx()).await;
    assert_eq!(outcome.into_result().unwrap(), json!({"orderId": 42}));

    let raw = runner
        .run(&ActionDefinition::new("echo").with_param("method", json!("GET")), json!(1), &ctx())
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        raw,
        json!({"input": 1, "params": {"method": "GET"}, "historyLength": 1})
    );
}

#[tokio::test]
async fn unregistered_type_fails_the_chain() {
    let outcome = ActionRunner::default()
        .run(&action("type: email\nto: ops@example.com\n"), json!({}), &ctx())
        .await;
    assert_eq!(outcome.state, ActionState::Failed);
    assert_eq!(outcome.trace.last().map(|node| node.state), Some(ActionState::Failed));
    assert!(matches!(outcome.error, Some(ActionError::UnknownType(ref t)) if t == "email"));
}

#[tokio::test]
async fn on_error_receives_the_error_as_input() {
    let chain = action(
        r#"
type: throw
onError:
  type: noop
"#,
    );
    let outcome = ActionRunner::default().run(&chain, json!("out of stock"), &ctx()).await;
    assert!(outcome.is_success());
    assert_eq!(
        outcome.value,
        Some(json!({"error": {"kind": "Thrown", "message": "out of stock", "action": "throw"}}))
    );
    assert_eq!(outcome.states_at(0).last(), Some(&ActionState::Failed));
    assert_eq!(outcome.states_at(1).last(), Some(&ActionState::Succeeded));
}

#[tokio::test]
async fn handler_errors_are_wrapped_and_routed() {
    let runner = ActionRunner::default().with_handler("fetch", Arc::new(Failing));
    let bare = runner.run(&ActionDefinition::new("fetch"), json!(null), &ctx()).await;
    let err = bare.error.expect("expected a failure");
    assert_eq!(err.kind(), "Handler");
    assert_eq!(err.to_string(), "action 'fetch' failed: upstream returned 503");

    let chain = action(
        r#"
type: fetch
onError:
  type: noop
  remapBefore:
    prop: error.message
"#,
    );
    let routed = runner.run(&chain, json!(null), &ctx()).await;
    assert_eq!(
        routed.into_result().unwrap(),
        json!("action 'fetch' failed: upstream returned 503")
    );
}

#[tokio::test]
async fn remap_failures_at_runtime_go_to_on_error() {
    let catalog = MessageCatalog::new().with_message("en", "bad", "{count, plural, one{x}}");
    let chain = action(
        r#"
type: noop
remapBefore:
  translate: bad
onError:
  type: noop
  remapBefore:
    object.from:
      kind:
        prop: error.kind
      failed:
        prop: error.action
"#,
    );
    let outcome = ActionRunner::default()
        .run(&chain, json!({"count": 1}), &ctx_with(catalog))
        .await;
    assert_eq!(outcome.into_result().unwrap(), json!({"kind": "Remap", "failed": "noop"}));
}

#[tokio::test]
async fn each_runs_children_with_iteration_scope() {
    let chain = action(
        r#"
type: each
do:
  type: noop
  remapBefore:
    object.from:
      index:
        array: index
      length:
        array: length
      value:
        history.0: true
      element:
        history: 1
      beyond:
        history: 2
"#,
    );
    let outcome = ActionRunner::default().run(&chain, json!(["a", "b"]), &ctx()).await;
    assert_eq!(
        outcome.into_result().unwrap(),
        json!([
            {"index": 0, "length": 2, "value": ["a", "b"], "element": "a"},
            {"index": 1, "length": 2, "value": ["a", "b"], "element": "b"},
        ])
    );
}

#[tokio::test(start_paused = true)]
async fn each_keeps_element_order_in_parallel_and_sequence() {
    let runner = ActionRunner::default().with_handler("delay", Arc::new(Delay));
    let items = json!([
        {"id": "slow", "delay": 30},
        {"id": "medium", "delay": 20},
        {"id": "fast", "delay": 10},
    ]);
    for parallel in [true, false] {
        let chain = ActionDefinition::new("each")
            .with_param("do", json!({"type": "delay"}))
            .with_param("parallel", json!(parallel));
        let outcome = runner.run(&chain, items.clone(), &ctx()).await;
        assert_eq!(outcome.into_result().unwrap(), json!(["slow", "medium", "fast"]));
    }
}

#[tokio::test]
async fn each_rejects_non_array_input() {
    let chain = action("type: each\ndo:\n  type: noop\n");
    let outcome = ActionRunner::default().run(&chain, json!({"not": "a list"}), &ctx()).await;
    assert_eq!(outcome.error.map(|err| err.kind()), Some("InvalidParams"));
}

#[tokio::test]
async fn condition_dispatches_then_or_else() {
    let chain = action(
        r#"
type: condition
if:
  prop: paid
then:
  type: static
  value: ship
else:
  type: static
  value: hold
"#,
    );
    let runner = ActionRunner::default();
    let paid = runner.run(&chain, json!({"paid": true}), &ctx()).await;
    let unpaid = runner.run(&chain, json!({"paid": false}), &ctx()).await;
    assert_eq!(paid.value, Some(json!("ship")));
    assert_eq!(unpaid.value, Some(json!("hold")));

    let no_else = action("type: condition\nif:\n  prop: paid\nthen:\n  type: static\n  value: ship\n");
    let passed = runner.run(&no_else, json!({"paid": false}), &ctx()).await;
    assert_eq!(passed.value, Some(json!({"paid": false})));
}

#[tokio::test]
async fn chains_deeper_than_the_limit_fail() {
    let runner = ActionRunner::new(ActionConfig {
        max_chain_depth: 2,
        ..ActionConfig::default()
    });
    let chain = action(
        r#"
type: noop
onSuccess:
  type: noop
  onSuccess:
    type: noop
    onSuccess:
      type: noop
"#,
    );
    let outcome = runner.run(&chain, json!(1), &ctx()).await;
    assert!(matches!(outcome.error, Some(ActionError::ChainTooDeep(2))));
    assert_eq!(outcome.states_at(3), vec![ActionState::Failed]);
}

#[tokio::test]
async fn noop_walks_every_state_in_order() {
    let outcome = ActionRunner::default().run(&action("type: noop"), json!("x"), &ctx()).await;
    assert_eq!(
        outcome.states_at(0),
        vec![
            ActionState::Pending,
            ActionState::RemappingBefore,
            ActionState::Executing,
            ActionState::RemappingAfter,
            ActionState::Succeeded,
        ]
    );
    assert!(outcome.trace.iter().all(|node| node.action == "noop"));
    let report = outcome.to_json();
    assert_eq!(report["status"], json!("succeeded"));
    assert_eq!(report["nodes"].as_array().map(Vec::len), Some(5));
    assert!(!outcome.trace_id.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_handlers_time_out() {
    let runner = ActionRunner::new(ActionConfig {
        handler_timeout_ms: Some(50),
        ..ActionConfig::default()
    })
    .with_handler("delay", Arc::new(Delay));

    let slow = runner
        .run(&ActionDefinition::new("delay"), json!({"id": 1, "delay": 500}), &ctx())
        .await;
    assert!(matches!(
        slow.error,
        Some(ActionError::Timeout { ref action, after_ms: 50 }) if action == "delay"
    ));

    let quick = runner
        .run(&ActionDefinition::new("delay"), json!({"id": 2, "delay": 5}), &ctx())
        .await;
    assert_eq!(quick.into_result().unwrap(), json!(2));
}
