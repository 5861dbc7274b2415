//! Action definitions.
//!
//! ```yaml
//! type: request
//! url: https://api.example.com/orders
//! remapBefore:
//!   object.from:
//!     id: { prop: orderId }
//! remapAfter: { prop: data }
//! onSuccess:
//!   type: noop
//! onError:
//!   type: static
//!   value: failed
//! ```
//!
//! Every key other than the ones named on [`ActionDefinition`] is a
//! type-specific parameter and lands in `params`.

use remapper::Remapper;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::ActionError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub remap_before: Option<Remapper>,
    #[serde(default)]
    pub remap_after: Option<Remapper>,
    #[serde(default)]
    pub on_success: Option<Box<ActionDefinition>>,
    #[serde(default)]
    pub on_error: Option<Box<ActionDefinition>>,
    #[serde(flatten)]
    pub params: JsonMap<String, JsonValue>,
}

/// Action types executed by the runner itself.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinAction {
    /// Returns its input.
    Noop,
    /// Returns `value`.
    Static(JsonValue),
    /// Fails with the input as payload.
    Throw,
    Condition {
        condition: Remapper,
        then_action: Option<Box<ActionDefinition>>,
        else_action: Option<Box<ActionDefinition>>,
    },
    Each {
        action: Box<ActionDefinition>,
        parallel: bool,
    },
}

#[derive(Deserialize)]
struct StaticParams {
    #[serde(default)]
    value: JsonValue,
}

#[derive(Deserialize)]
struct ConditionParams {
    #[serde(rename = "if")]
    condition: Remapper,
    #[serde(default)]
    then: Option<Box<ActionDefinition>>,
    #[serde(default, rename = "else")]
    otherwise: Option<Box<ActionDefinition>>,
}

#[derive(Deserialize)]
struct EachParams {
    #[serde(rename = "do")]
    action: Box<ActionDefinition>,
    #[serde(default)]
    parallel: bool,
}

impl ActionDefinition {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            remap_before: None,
            remap_after: None,
            on_success: None,
            on_error: None,
            params: JsonMap::new(),
        }
    }

    pub fn with_remap_before(mut self, remapper: Remapper) -> Self {
        self.remap_before = Some(remapper);
        self
    }

    pub fn with_remap_after(mut self, remapper: Remapper) -> Self {
        self.remap_after = Some(remapper);
        self
    }

    pub fn with_on_success(mut self, action: ActionDefinition) -> Self {
        self.on_success = Some(Box::new(action));
        self
    }

    pub fn with_on_error(mut self, action: ActionDefinition) -> Self {
        self.on_error = Some(Box::new(action));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&JsonValue> {
        self.params.get(key)
    }

    /// The built-in behaviour of this action, or `None` for handler types.
    pub fn builtin(&self) -> Result<Option<BuiltinAction>, ActionError> {
        let builtin = match self.action_type.as_str() {
            "noop" => BuiltinAction::Noop,
            "static" => BuiltinAction::Static(self.parse_params::<StaticParams>()?.value),
            "throw" => BuiltinAction::Throw,
            "condition" => {
                let params: ConditionParams = self.parse_params()?;
                BuiltinAction::Condition {
                    condition: params.condition,
                    then_action: params.then,
                    else_action: params.otherwise,
                }
            }
            "each" => {
                let params: EachParams = self.parse_params()?;
                BuiltinAction::Each {
                    action: params.action,
                    parallel: params.parallel,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(builtin))
    }

    fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, ActionError> {
        serde_json::from_value(JsonValue::Object(self.params.clone()))
            .map_err(|err| ActionError::invalid_params(&self.action_type, err.to_string()))
    }

    /// Check built-in parameters throughout the chain, including nested
    /// `condition` branches and `each` bodies.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self.builtin()? {
            Some(BuiltinAction::Condition {
                then_action,
                else_action,
                ..
            }) => {
                for branch in then_action.iter().chain(else_action.iter()) {
                    branch.validate()?;
                }
            }
            Some(BuiltinAction::Each { action, .. }) => action.validate()?,
            _ => {}
        }
        for next in self.on_success.iter().chain(self.on_error.iter()) {
            next.validate()?;
        }
        Ok(())
    }
}

/// Parse and validate an action chain written in YAML (or JSON).
pub fn parse_action_yaml(yaml: &str) -> Result<ActionDefinition, ActionError> {
    let action: ActionDefinition = serde_yaml::from_str(yaml)?;
    action.validate()?;
    Ok(action)
}
