//! Generator registry - maps generator kinds to their capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::inputs::ConnectedInputs;
use super::types::Generator;
use super::{ImageGenerator, UpscaleGenerator, VideoGenerator};
use crate::error::{Error, Result};
use crate::workflow::{GeneratorKind, Node};

/// Registry of generator capabilities.
#[derive(Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<GeneratorKind, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    /// Create a new registry with the built-in generators.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(ImageGenerator::new()));
        registry.register(Arc::new(VideoGenerator::new()));
        registry.register(Arc::new(UpscaleGenerator::new()));

        registry
    }

    /// Create an empty registry (for testing).
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// Register a generator, replacing any previous one for the same kind.
    pub fn register(&mut self, generator: Arc<dyn Generator>) {
        self.generators.insert(generator.kind(), generator);
    }

    pub fn get(&self, kind: GeneratorKind) -> Option<Arc<dyn Generator>> {
        self.generators.get(&kind).cloned()
    }

    pub fn has(&self, kind: GeneratorKind) -> bool {
        self.generators.contains_key(&kind)
    }

    /// Find the capability that runs `node`.
    ///
    /// # Errors
    /// `Error::Validation` for non-generator nodes and unregistered kinds.
    pub fn resolve(&self, node: &Node) -> Result<Arc<dyn Generator>> {
        let kind = node.kind.generator_kind().ok_or_else(|| Error::Validation {
            node_id: node.id.clone(),
            message: format!("'{}' nodes are not runnable", node.kind.type_name()),
        })?;
        self.get(kind).ok_or_else(|| Error::Validation {
            node_id: node.id.clone(),
            message: format!("No generator registered for kind '{}'", kind),
        })
    }

    /// Build the submit payload for a generator node.
    pub fn submit_params(&self, node: &Node, inputs: &ConnectedInputs) -> Result<Value> {
        self.resolve(node)?.submit_params(node, inputs)
    }

    /// Get descriptions of all registered generators.
    pub fn descriptions(&self) -> Vec<(GeneratorKind, &str)> {
        let mut list: Vec<(GeneratorKind, &str)> = self
            .generators
            .iter()
            .map(|(kind, generator)| (*kind, generator.description()))
            .collect();
        list.sort_by_key(|(kind, _)| kind.as_str());
        list
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
