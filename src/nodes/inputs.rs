//! Input aggregation for generator nodes.
//!
//! Only direct predecessors are consulted. A prompt two hops away is not
//! visible to a video node behind an image node; the image node's own
//! output is what flows forward.

use serde::Serialize;

use crate::engine::NodeStateStore;
use crate::workflow::{GeneratorKind, Graph, NodeKind, ReferenceRole};

const PROMPT_SEPARATOR: &str = ". ";

/// Data gathered from a node's immediate predecessors, grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectedInputs {
    /// Prompt texts joined in predecessor order
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,

    /// User-supplied reference images
    pub reference_images: Vec<String>,

    /// Outputs of upstream image and upscale generators
    pub generated_images: Vec<String>,

    /// Outputs of upstream video generators
    pub generated_videos: Vec<String>,

    /// Subsets of `reference_images` tagged for transitions
    pub before_images: Vec<String>,
    pub after_images: Vec<String>,
}

impl ConnectedInputs {
    pub fn has_prompt(&self) -> bool {
        self.prompt.is_some()
    }

    /// Generated images first, then references.
    pub fn image_sources(&self) -> impl Iterator<Item = &String> {
        self.generated_images
            .iter()
            .chain(self.reference_images.iter())
    }

    pub fn has_image(&self) -> bool {
        self.image_sources().next().is_some()
    }

    pub fn is_transition(&self) -> bool {
        !self.before_images.is_empty() && !self.after_images.is_empty()
    }

    /// Nothing usable reached the node.
    pub fn is_empty(&self) -> bool {
        !self.has_prompt() && !self.has_image() && self.generated_videos.is_empty()
    }
}

/// Collect the inputs feeding `node_id`.
///
/// Prior generator outputs are read from `states`, so outputs produced
/// earlier in the same run are visible. Reading has no side effects.
pub fn connected_inputs(graph: &Graph, states: &NodeStateStore, node_id: &str) -> ConnectedInputs {
    let mut prompts: Vec<&str> = Vec::new();
    let mut negatives: Vec<&str> = Vec::new();
    let mut inputs = ConnectedInputs::default();

    for pred in graph.predecessors(node_id) {
        match &pred.kind {
            NodeKind::Prompt(data) => {
                let text = data.text.trim();
                if !text.is_empty() {
                    prompts.push(text);
                }
                if let Some(negative) = data.negative_prompt.as_deref().map(str::trim) {
                    if !negative.is_empty() {
                        negatives.push(negative);
                    }
                }
            }
            NodeKind::Reference(data) => {
                let Some(image_ref) = data.image_ref.as_ref().filter(|r| !r.is_empty()) else {
                    continue;
                };
                inputs.reference_images.push(image_ref.clone());
                match data.role {
                    Some(ReferenceRole::Before) => inputs.before_images.push(image_ref.clone()),
                    Some(ReferenceRole::After) => inputs.after_images.push(image_ref.clone()),
                    None => {}
                }
            }
            NodeKind::Image(_) | NodeKind::Video(_) | NodeKind::Upscale(_) => {
                let Some(output) = states.output_ref(&pred.id) else {
                    continue;
                };
                match pred.kind.generator_kind() {
                    Some(GeneratorKind::Video) => inputs.generated_videos.push(output),
                    _ => inputs.generated_images.push(output),
                }
            }
            NodeKind::Output(_) => {}
        }
    }

    if !prompts.is_empty() {
        inputs.prompt = Some(prompts.join(PROMPT_SEPARATOR));
    }
    if !negatives.is_empty() {
        inputs.negative_prompt = Some(negatives.join(PROMPT_SEPARATOR));
    }

    inputs
}
