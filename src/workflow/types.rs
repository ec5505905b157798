//! Graph model type definitions.
//!
//! A [`Graph`] is a snapshot of the canvas taken at the moment a run is
//! requested. The engine never mutates it; live generator state is tracked
//! separately by the engine's node state store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier of a node within a graph.
pub type NodeId = String;

/// A complete workflow graph.
///
/// # Example JSON
///
/// ```json
/// {
///   "nodes": [
///     { "id": "p", "type": "prompt", "text": "a lighthouse at dusk" },
///     { "id": "img", "type": "image", "model": "flux-dev" }
///   ],
///   "edges": [
///     { "id": "e1", "source": "p", "target": "img" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID within this graph
    pub id: NodeId,

    /// Kind-specific payload, tagged by `type`
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Directed edge: the source's output feeds the target's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

/// Node payload by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Text prompt
    Prompt(PromptData),
    /// Reference image supplied by the user
    Reference(ReferenceData),
    /// Image generator
    Image(GeneratorData),
    /// Video generator
    Video(GeneratorData),
    /// Upscaler
    Upscale(GeneratorData),
    /// Terminal display node, never run
    Output(OutputData),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptData {
    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// URL or storage key of the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Role in transition workflows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ReferenceRole>,
}

/// Which end of a transition a reference image anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    Before,
    After,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorData {
    /// Provider model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Free-form provider settings (aspect ratio, seed, duration, ...)
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,

    /// Runtime state as last seen on the canvas
    #[serde(default)]
    pub state: GeneratorState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Live state of a generator node.
///
/// While `is_running` is set, `output_ref` and `last_error` are both empty.
/// A terminal transition sets exactly one of them and clears `is_running`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorState {
    #[serde(default)]
    pub is_running: bool,

    /// 0..=100
    #[serde(default)]
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
}

/// Generator flavours; each has its own submit/poll endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Image,
    Video,
    Upscale,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Upscale => "upscale",
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeKind {
    /// The generator flavour, if this node submits jobs.
    pub fn generator_kind(&self) -> Option<GeneratorKind> {
        match self {
            Self::Image(_) => Some(GeneratorKind::Image),
            Self::Video(_) => Some(GeneratorKind::Video),
            Self::Upscale(_) => Some(GeneratorKind::Upscale),
            Self::Prompt(_) | Self::Reference(_) | Self::Output(_) => None,
        }
    }

    pub fn generator_data(&self) -> Option<&GeneratorData> {
        match self {
            Self::Image(data) | Self::Video(data) | Self::Upscale(data) => Some(data),
            _ => None,
        }
    }

    /// Short type name (matches the serialized `type` tag).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "prompt",
            Self::Reference(_) => "reference",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Upscale(_) => "upscale",
            Self::Output(_) => "output",
        }
    }
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn prompt(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Prompt(PromptData {
                text: text.into(),
                negative_prompt: None,
            }),
        )
    }

    pub fn reference(id: impl Into<NodeId>, image_ref: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Reference(ReferenceData {
                image_ref: Some(image_ref.into()),
                role: None,
            }),
        )
    }

    pub fn generator(id: impl Into<NodeId>, kind: GeneratorKind) -> Self {
        let data = GeneratorData::default();
        let kind = match kind {
            GeneratorKind::Image => NodeKind::Image(data),
            GeneratorKind::Video => NodeKind::Video(data),
            GeneratorKind::Upscale => NodeKind::Upscale(data),
        };
        Self::new(id, kind)
    }

    pub fn is_generator(&self) -> bool {
        self.kind.generator_kind().is_some()
    }
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
        }
    }
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Direct predecessors of a node, in edge order, without duplicates.
    pub fn predecessors(&self, id: &str) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| e.target == id && seen.insert(e.source.as_str()))
            .filter_map(|e| self.get_node(&e.source))
            .collect()
    }

    /// Direct successors of a node, in edge order, without duplicates.
    pub fn successors(&self, id: &str) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| e.source == id && seen.insert(e.target.as_str()))
            .filter_map(|e| self.get_node(&e.target))
            .collect()
    }

    /// IDs of all generator nodes, in node order.
    pub fn generator_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.is_generator())
            .map(|n| n.id.as_str())
            .collect()
    }
}
