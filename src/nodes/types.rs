//! Generator capability trait.

use serde_json::{Map, Value};

use super::inputs::ConnectedInputs;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::workflow::{GeneratorData, GeneratorKind, Node};

/// Per-kind behavior of a generator node.
///
/// Implementations turn a node's own settings plus its connected inputs into
/// the request payload for the back-end, rejecting nodes that lack the
/// inputs their kind needs.
pub trait Generator: Send + Sync {
    /// The kind this capability handles.
    fn kind(&self) -> GeneratorKind;

    /// Build the submit payload.
    ///
    /// # Errors
    /// `Error::Validation` when required inputs are missing.
    fn submit_params(&self, node: &Node, inputs: &ConnectedInputs) -> Result<Value>;

    /// Poll budget for this kind.
    fn max_poll_attempts(&self, config: &EngineConfig) -> u32 {
        config.max_attempts(self.kind())
    }

    /// Get a description of this generator kind.
    fn description(&self) -> &str {
        "A generator node"
    }
}

/// Start a payload from the node's model and settings.
///
/// Settings are copied first so the fields derived from inputs win on
/// conflicts.
pub(crate) fn base_params(node: &Node) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(data) = node.kind.generator_data() {
        for (key, value) in &data.settings {
            params.insert(key.clone(), value.clone());
        }
        if let Some(model) = model_of(data) {
            params.insert("model".to_string(), Value::String(model.to_string()));
        }
    }
    params
}

fn model_of(data: &GeneratorData) -> Option<&str> {
    data.model.as_deref().filter(|m| !m.is_empty())
}

pub(crate) fn missing_inputs(node: &Node, message: &str) -> Error {
    Error::Validation {
        node_id: node.id.clone(),
        message: message.to_string(),
    }
}

/// Reject nodes with nothing connected at all.
pub(crate) fn ensure_any_input(node: &Node, inputs: &ConnectedInputs) -> Result<()> {
    if inputs.is_empty() {
        return Err(missing_inputs(
            node,
            "no prompt, reference, or generated input is connected",
        ));
    }
    Ok(())
}
