use remapper::RemapError;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{stage} failed: {source}")]
    Remap {
        stage: &'static str,
        #[source]
        source: RemapError,
    },
    #[error("action '{action}' failed: {source}")]
    Handler {
        action: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("action '{action}' timed out after {after_ms}ms")]
    Timeout { action: String, after_ms: u64 },
    #[error("no handler registered for action type '{0}'")]
    UnknownType(String),
    #[error("invalid parameters for action '{action}': {message}")]
    InvalidParams { action: String, message: String },
    #[error("{}", thrown_message(.payload))]
    Thrown { payload: JsonValue },
    #[error("action chain exceeded the maximum depth of {0}")]
    ChainTooDeep(usize),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn thrown_message(payload: &JsonValue) -> String {
    match payload {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "action threw".to_string(),
        other => other.to_string(),
    }
}

impl ActionError {
    pub fn remap(stage: &'static str, source: RemapError) -> Self {
        ActionError::Remap { stage, source }
    }

    pub fn invalid_params(action: &str, message: impl Into<String>) -> Self {
        ActionError::InvalidParams {
            action: action.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Remap { .. } => "Remap",
            ActionError::Handler { .. } => "Handler",
            ActionError::Timeout { .. } => "Timeout",
            ActionError::UnknownType(_) => "UnknownType",
            ActionError::InvalidParams { .. } => "InvalidParams",
            ActionError::Thrown { .. } => "Thrown",
            ActionError::ChainTooDeep(_) => "ChainTooDeep",
            ActionError::Yaml(_) => "Yaml",
        }
    }

    /// Input handed to an `onError` action.
    pub fn to_input(&self, action: &str) -> JsonValue {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "action": action,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper::RemapErrorKind;

    #[test]
    fn error_input_carries_kind_message_and_action() {
        let err = ActionError::Thrown {
            payload: json!("out of stock"),
        };
        assert_eq!(
            err.to_input("order.place"),
            json!({"error": {"kind": "Thrown", "message": "out of stock", "action": "order.place"}})
        );
    }

    #[test]
    fn remap_errors_name_their_stage() {
        let err = ActionError::remap(
            "remapBefore",
            RemapError::new(RemapErrorKind::InvalidTemplate, "bad template"),
        );
        assert_eq!(err.to_string(), "remapBefore failed: bad template");
        assert_eq!(err.kind(), "Remap");
    }

    #[test]
    fn handler_errors_keep_their_source() {
        let err = ActionError::Handler {
            action: "email".to_string(),
            source: anyhow::anyhow!("smtp unavailable"),
        };
        assert_eq!(err.to_string(), "action 'email' failed: smtp unavailable");
        assert!(std::error::Error::source(&err).is_some());
    }
}
