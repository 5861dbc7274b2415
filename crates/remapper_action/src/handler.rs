use async_trait::async_trait;
use remapper::RemapContext;
use serde_json::Value as JsonValue;

use crate::model::ActionDefinition;

/// Executes one action type outside the engine (requests, resource
/// mutations, notifications).
///
/// `input` has already been through `remapBefore`; the returned value goes
/// through `remapAfter`. `ctx` carries the chain's history including this
/// action's incoming data.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        action: &ActionDefinition,
        input: JsonValue,
        ctx: &RemapContext,
    ) -> anyhow::Result<JsonValue>;
}
