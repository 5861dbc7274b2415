use chrono::Utc;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::error::ActionError;

/// Lifecycle of one action in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    Pending,
    RemappingBefore,
    Executing,
    RemappingAfter,
    Succeeded,
    Failed,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Pending => "pending",
            ActionState::RemappingBefore => "remapping-before",
            ActionState::Executing => "executing",
            ActionState::RemappingAfter => "remapping-after",
            ActionState::Succeeded => "succeeded",
            ActionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Succeeded | ActionState::Failed)
    }
}

/// One state transition.
///
/// `value` is the data the action holds on entering `state`: the incoming
/// data for `pending`/`remapping-before`, the remapped input for
/// `executing`, the raw result for `remapping-after` and the final value for
/// `succeeded`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceNode {
    pub depth: usize,
    pub action: String,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ActionOutcome {
    pub trace_id: String,
    /// `Succeeded` or `Failed`.
    pub state: ActionState,
    pub value: Option<JsonValue>,
    pub error: Option<ActionError>,
    pub trace: Vec<TraceNode>,
}

impl ActionOutcome {
    pub(crate) fn new(
        trace_id: String,
        result: Result<JsonValue, ActionError>,
        trace: Vec<TraceNode>,
    ) -> Self {
        let (state, value, error) = match result {
            Ok(value) => (ActionState::Succeeded, Some(value), None),
            Err(err) => (ActionState::Failed, None, Some(err)),
        };
        Self {
            trace_id,
            state,
            value,
            error,
            trace,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == ActionState::Succeeded
    }

    pub fn into_result(self) -> Result<JsonValue, ActionError> {
        match (self.value, self.error) {
            (_, Some(err)) => Err(err),
            (Some(value), None) => Ok(value),
            (None, None) => Ok(JsonValue::Null),
        }
    }

    /// States visited by actions at `depth`, in order.
    pub fn states_at(&self, depth: usize) -> Vec<ActionState> {
        self.trace
            .iter()
            .filter(|node| node.depth == depth)
            .map(|node| node.state)
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "trace_id": self.trace_id,
            "timestamp": Utc::now().to_rfc3339(),
            "status": self.state,
            "output": self.value,
            "error": self.error.as_ref().map(|err| json!({
                "kind": err.kind(),
                "message": err.to_string(),
            })),
            "nodes": self.trace,
        })
    }
}
