//! Image generator - text-to-image and image-to-image.

use serde_json::{json, Value};

use super::inputs::ConnectedInputs;
use super::types::{base_params, ensure_any_input, missing_inputs, Generator};
use crate::error::Result;
use crate::workflow::{GeneratorKind, Node};

pub struct ImageGenerator;

impl ImageGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for ImageGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Image
    }

    fn submit_params(&self, node: &Node, inputs: &ConnectedInputs) -> Result<Value> {
        ensure_any_input(node, inputs)?;
        if !inputs.has_prompt() && !inputs.has_image() {
            return Err(missing_inputs(node, "image generation needs a prompt or an image"));
        }

        let mut params = base_params(node);
        if let Some(prompt) = &inputs.prompt {
            params.insert("prompt".into(), json!(prompt));
        }
        if let Some(negative) = &inputs.negative_prompt {
            params.insert("negative_prompt".into(), json!(negative));
        }

        let images: Vec<&String> = inputs.image_sources().collect();
        if !images.is_empty() {
            params.insert("reference_images".into(), json!(images));
        }

        Ok(Value::Object(params))
    }

    fn description(&self) -> &str {
        "Generate an image from a prompt and optional reference images"
    }
}
