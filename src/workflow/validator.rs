//! Structural graph validation.

use std::collections::HashSet;

use super::types::Graph;
use crate::error::{Error, Result};

/// Validate a graph snapshot.
///
/// Checks for:
/// - Non-empty, unique node IDs
/// - Edges referencing existing nodes
/// - No self-loops
///
/// Cycles spanning more than one node are left to the resolver, which
/// reports them with a concrete path.
pub fn validate_graph(graph: &Graph) -> Result<()> {
    let mut ids = HashSet::new();
    for node in &graph.nodes {
        if node.id.is_empty() {
            return Err(Error::Graph("Node ID cannot be empty".into()));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(Error::Graph(format!("Duplicate node ID: {}", node.id)));
        }
    }

    for edge in &graph.edges {
        if edge.source == edge.target {
            return Err(Error::Graph(format!(
                "Edge '{}' is a self-loop on node '{}'",
                edge.id, edge.source
            )));
        }
        if !ids.contains(edge.source.as_str()) {
            return Err(Error::Graph(format!(
                "Edge '{}' references non-existent source node '{}'",
                edge.id, edge.source
            )));
        }
        if !ids.contains(edge.target.as_str()) {
            return Err(Error::Graph(format!(
                "Edge '{}' references non-existent target node '{}'",
                edge.id, edge.target
            )));
        }
    }

    Ok(())
}
