//! Live generator node state.
//!
//! The store is seeded from the graph snapshot and then owned by the engine
//! for the duration of a run. Observers read it, or register a listener that
//! fires after every update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::workflow::{GeneratorState, Graph};

/// Callback invoked after a node's state changes.
pub type StateListener = Arc<dyn Fn(&str, &GeneratorState) + Send + Sync>;

/// Thread-safe map of generator node ID to its live state.
#[derive(Clone, Default)]
pub struct NodeStateStore {
    states: Arc<RwLock<HashMap<String, GeneratorState>>>,
    listener: Option<StateListener>,
}

impl NodeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the generator nodes of a graph.
    pub fn from_graph(graph: &Graph) -> Self {
        let states = graph
            .nodes
            .iter()
            .filter_map(|n| {
                n.kind
                    .generator_data()
                    .map(|data| (n.id.clone(), data.state.clone()))
            })
            .collect();

        Self {
            states: Arc::new(RwLock::new(states)),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn get(&self, node_id: &str) -> Option<GeneratorState> {
        self.states.read().get(node_id).cloned()
    }

    /// Last successful output of a node, if any.
    pub fn output_ref(&self, node_id: &str) -> Option<String> {
        self.states
            .read()
            .get(node_id)
            .and_then(|s| s.output_ref.clone())
    }

    pub fn snapshot(&self) -> HashMap<String, GeneratorState> {
        self.states.read().clone()
    }

    /// Apply a mutation and notify the listener.
    pub fn update<F>(&self, node_id: &str, f: F)
    where
        F: FnOnce(&mut GeneratorState),
    {
        let updated = {
            let mut states = self.states.write();
            let state = states.entry(node_id.to_string()).or_default();
            f(state);
            state.clone()
        };

        if let Some(listener) = &self.listener {
            listener(node_id, &updated);
        }
    }

    /// Enter the running state for a fresh job.
    pub fn begin(&self, node_id: &str) {
        self.update(node_id, |s| {
            s.is_running = true;
            s.progress = 0;
            s.output_ref = None;
            s.last_error = None;
            s.external_job_id = None;
        });
    }

    pub fn set_job_id(&self, node_id: &str, job_id: &str) {
        self.update(node_id, |s| s.external_job_id = Some(job_id.to_string()));
    }

    /// Raise progress; never lowers it and never reaches 100 before success.
    pub fn advance(&self, node_id: &str, progress: u8) {
        self.update(node_id, |s| s.progress = s.progress.max(progress.min(99)));
    }

    pub fn succeed(&self, node_id: &str, output_ref: &str) {
        self.update(node_id, |s| {
            s.is_running = false;
            s.progress = 100;
            s.output_ref = Some(output_ref.to_string());
            s.last_error = None;
        });
    }

    pub fn fail(&self, node_id: &str, error: &str) {
        self.update(node_id, |s| {
            s.is_running = false;
            s.output_ref = None;
            s.last_error = Some(error.to_string());
        });
    }
}

impl std::fmt::Debug for NodeStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateStore")
            .field("states", &*self.states.read())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
