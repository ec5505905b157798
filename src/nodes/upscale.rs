//! Upscale generator.

use serde_json::{json, Value};

use super::inputs::ConnectedInputs;
use super::types::{base_params, ensure_any_input, missing_inputs, Generator};
use crate::error::Result;
use crate::workflow::{GeneratorKind, Node};

pub struct UpscaleGenerator;

impl UpscaleGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UpscaleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for UpscaleGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Upscale
    }

    fn submit_params(&self, node: &Node, inputs: &ConnectedInputs) -> Result<Value> {
        ensure_any_input(node, inputs)?;
        let image = inputs
            .image_sources()
            .next()
            .ok_or_else(|| missing_inputs(node, "upscaling needs an image"))?;

        let mut params = base_params(node);
        params.insert("image".into(), json!(image));
        if let Some(prompt) = &inputs.prompt {
            params.insert("prompt".into(), json!(prompt));
        }

        Ok(Value::Object(params))
    }

    fn description(&self) -> &str {
        "Upscale a generated or reference image"
    }
}
