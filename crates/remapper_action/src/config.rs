use serde::Deserialize;

use crate::error::ActionError;

fn default_max_chain_depth() -> usize {
    64
}

/// Runner limits, loadable from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    /// Longest `onSuccess`/`onError`/nested chain before failing.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    /// Per-handler time limit; built-in actions are not limited.
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            handler_timeout_ms: None,
        }
    }
}

impl ActionConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ActionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
