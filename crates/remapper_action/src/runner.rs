//! Action chain state machine.
//!
//! Each action moves through
//! `pending -> remapping-before -> executing -> remapping-after` and ends in
//! `succeeded` or `failed`. The context is extended with the action's
//! incoming data on entering `remapping-before`; that extended context is
//! what `remapAfter`, the handler and any follow-up action see.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, join_all};
use remapper::{ArrayScope, EvalValue, RemapContext, Remapper, evaluate};
use serde_json::Value as JsonValue;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::ActionConfig;
use crate::error::ActionError;
use crate::handler::ActionHandler;
use crate::model::{ActionDefinition, BuiltinAction};
use crate::trace::{ActionOutcome, ActionState, TraceNode};

type ChainResult = (Result<JsonValue, ActionError>, Vec<TraceNode>);

pub struct ActionRunner {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    config: ActionConfig,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new(ActionConfig::default())
    }
}

impl ActionRunner {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register the handler for `action_type`, replacing any previous one.
    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let action_type = action_type.into();
        debug!(action = %action_type, "registered action handler");
        self.handlers.insert(action_type, handler);
    }

    pub fn with_handler(
        mut self,
        action_type: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        self.register(action_type, handler);
        self
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Run `action` and everything it chains into.
    pub async fn run(
        &self,
        action: &ActionDefinition,
        input: JsonValue,
        ctx: &RemapContext,
    ) -> ActionOutcome {
        let trace_id = Uuid::new_v4().to_string();
        let span = info_span!("action_chain", trace_id = %trace_id, action = %action.action_type);
        let (result, trace) = self
            .run_chain(action, input, ctx.clone(), 0)
            .instrument(span)
            .await;
        match &result {
            Ok(_) => info!(trace_id = %trace_id, nodes = trace.len(), "action chain succeeded"),
            Err(err) => info!(trace_id = %trace_id, error = %err, "action chain failed"),
        }
        ActionOutcome::new(trace_id, result, trace)
    }

    fn run_chain<'a>(
        &'a self,
        action: &'a ActionDefinition,
        input: JsonValue,
        ctx: RemapContext,
        depth: usize,
    ) -> BoxFuture<'a, ChainResult> {
        async move {
            let mut nodes = Vec::new();
            let result = self.run_action(action, input, ctx, depth, &mut nodes).await;
            (result, nodes)
        }
        .boxed()
    }

    async fn run_action(
        &self,
        action: &ActionDefinition,
        input: JsonValue,
        ctx: RemapContext,
        depth: usize,
        nodes: &mut Vec<TraceNode>,
    ) -> Result<JsonValue, ActionError> {
        let name = action.action_type.as_str();
        if depth > self.config.max_chain_depth {
            let err = ActionError::ChainTooDeep(self.config.max_chain_depth);
            record(nodes, depth, name, ActionState::Failed, None, Some(&err));
            return Err(err);
        }
        record(nodes, depth, name, ActionState::Pending, Some(&input), None);

        let extended = ctx.with_history(EvalValue::Value(input.clone()));
        match self.attempt(action, input, &extended, depth, nodes).await {
            Ok(value) => {
                record(nodes, depth, name, ActionState::Succeeded, Some(&value), None);
                match &action.on_success {
                    Some(next) => {
                        debug!(from = name, to = %next.action_type, depth, "following onSuccess");
                        self.follow(next, value, extended, depth, nodes).await
                    }
                    None => Ok(value),
                }
            }
            Err(err) => {
                record(nodes, depth, name, ActionState::Failed, None, Some(&err));
                match &action.on_error {
                    Some(next) => {
                        warn!(action = name, error = %err, to = %next.action_type, "routing failure to onError");
                        self.follow(next, err.to_input(name), extended, depth, nodes)
                            .await
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn follow(
        &self,
        next: &ActionDefinition,
        input: JsonValue,
        ctx: RemapContext,
        depth: usize,
        nodes: &mut Vec<TraceNode>,
    ) -> Result<JsonValue, ActionError> {
        let (result, child) = self.run_chain(next, input, ctx, depth + 1).await;
        nodes.extend(child);
        result
    }

    /// The non-terminal stages of one action.
    async fn attempt(
        &self,
        action: &ActionDefinition,
        input: JsonValue,
        ctx: &RemapContext,
        depth: usize,
        nodes: &mut Vec<TraceNode>,
    ) -> Result<JsonValue, ActionError> {
        let name = action.action_type.as_str();

        record(nodes, depth, name, ActionState::RemappingBefore, Some(&input), None);
        let data = match &action.remap_before {
            Some(remapper) => apply_remap("remapBefore", remapper, input, ctx)?,
            None => input,
        };

        record(nodes, depth, name, ActionState::Executing, Some(&data), None);
        let result = self.execute(action, data, ctx, depth, nodes).await?;

        record(nodes, depth, name, ActionState::RemappingAfter, Some(&result), None);
        match &action.remap_after {
            Some(remapper) => apply_remap("remapAfter", remapper, result, ctx),
            None => Ok(result),
        }
    }

    async fn execute(
        &self,
        action: &ActionDefinition,
        data: JsonValue,
        ctx: &RemapContext,
        depth: usize,
        nodes: &mut Vec<TraceNode>,
    ) -> Result<JsonValue, ActionError> {
        let Some(builtin) = action.builtin()? else {
            return self.dispatch(action, data, ctx).await;
        };
        match builtin {
            BuiltinAction::Noop => Ok(data),
            BuiltinAction::Static(value) => Ok(value),
            BuiltinAction::Throw => Err(ActionError::Thrown { payload: data }),
            BuiltinAction::Condition {
                condition,
                then_action,
                else_action,
            } => {
                let chosen = evaluate(&condition, EvalValue::Value(data.clone()), ctx)
                    .map_err(|err| ActionError::remap("condition", err))?
                    .is_truthy();
                let branch = if chosen { then_action } else { else_action };
                debug!(action = %action.action_type, chosen, "condition evaluated");
                match branch {
                    Some(branch) => self.follow(&branch, data, ctx.clone(), depth, nodes).await,
                    None => Ok(data),
                }
            }
            BuiltinAction::Each { action: body, parallel } => {
                let JsonValue::Array(items) = data else {
                    return Err(ActionError::invalid_params(
                        &action.action_type,
                        "input must be an array",
                    ));
                };
                self.run_each(&body, items, parallel, ctx, depth, nodes).await
            }
        }
    }

    async fn run_each(
        &self,
        body: &ActionDefinition,
        items: Vec<JsonValue>,
        parallel: bool,
        ctx: &RemapContext,
        depth: usize,
        nodes: &mut Vec<TraceNode>,
    ) -> Result<JsonValue, ActionError> {
        let length = items.len();
        // Each child appends its element to history on entering
        // remapping-before; the index travels in the iteration scope and is
        // read with `array: index`, so history positions stay one per hop.
        let children = items.into_iter().enumerate().map(|(index, item)| {
            let child_ctx = ctx.with_array_scope(ArrayScope {
                index,
                length,
                item: Arc::new(item.clone()),
            });
            self.run_chain(body, item, child_ctx, depth + 1)
        });

        let finished: Vec<ChainResult> = if parallel {
            join_all(children).await
        } else {
            let mut finished = Vec::with_capacity(length);
            for child in children {
                finished.push(child.await);
            }
            finished
        };

        let mut values = Vec::with_capacity(length);
        let mut first_error = None;
        for (result, child_nodes) in finished {
            nodes.extend(child_nodes);
            match result {
                Ok(value) => values.push(value),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(JsonValue::Array(values)),
        }
    }

    async fn dispatch(
        &self,
        action: &ActionDefinition,
        data: JsonValue,
        ctx: &RemapContext,
    ) -> Result<JsonValue, ActionError> {
        let name = action.action_type.as_str();
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ActionError::UnknownType(name.to_string()))?;
        let execution = handler.execute(action, data, ctx);
        let result = match self.config.handler_timeout_ms {
            Some(after_ms) => tokio::time::timeout(Duration::from_millis(after_ms), execution)
                .await
                .map_err(|_| ActionError::Timeout {
                    action: name.to_string(),
                    after_ms,
                })?,
            None => execution.await,
        };
        result.map_err(|source| ActionError::Handler {
            action: name.to_string(),
            source,
        })
    }
}

fn apply_remap(
    stage: &'static str,
    remapper: &Remapper,
    value: JsonValue,
    ctx: &RemapContext,
) -> Result<JsonValue, ActionError> {
    evaluate(remapper, EvalValue::Value(value), ctx)
        .map(EvalValue::into_json_or_null)
        .map_err(|err| ActionError::remap(stage, err))
}

fn record(
    nodes: &mut Vec<TraceNode>,
    depth: usize,
    action: &str,
    state: ActionState,
    value: Option<&JsonValue>,
    error: Option<&ActionError>,
) {
    debug!(action, depth, state = state.as_str(), "action transition");
    nodes.push(TraceNode {
        depth,
        action: action.to_string(),
        state,
        value: value.cloned(),
        error: error.map(ToString::to_string),
    });
}
