//! Video generator - text-to-video, image-to-video, and transitions.

use serde_json::{json, Value};

use super::inputs::ConnectedInputs;
use super::types::{base_params, ensure_any_input, missing_inputs, Generator};
use crate::error::Result;
use crate::workflow::{GeneratorKind, Node};

pub struct VideoGenerator;

impl VideoGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VideoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for VideoGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Video
    }

    fn submit_params(&self, node: &Node, inputs: &ConnectedInputs) -> Result<Value> {
        ensure_any_input(node, inputs)?;
        if !inputs.has_prompt() && !inputs.has_image() {
            return Err(missing_inputs(node, "video generation needs a prompt or an image"));
        }

        let mut params = base_params(node);
        if let Some(prompt) = &inputs.prompt {
            params.insert("prompt".into(), json!(prompt));
        }
        if let Some(negative) = &inputs.negative_prompt {
            params.insert("negative_prompt".into(), json!(negative));
        }

        if inputs.is_transition() {
            params.insert("first_frame".into(), json!(inputs.before_images[0]));
            params.insert("last_frame".into(), json!(inputs.after_images[0]));
        } else if let Some(image) = inputs.image_sources().next() {
            params.insert("image".into(), json!(image));
        }

        Ok(Value::Object(params))
    }

    fn description(&self) -> &str {
        "Generate a video from a prompt, a start image, or a before/after pair"
    }
}
