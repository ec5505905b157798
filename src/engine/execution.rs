//! Workflow run record.
//!
//! A `WorkflowExecution` is created by the scheduler at the start of a run and
//! is frozen once its status becomes terminal: later mutations are no-ops.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::NodeId;

/// Whole-run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Per-node status within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Whether the node has reached a final outcome.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl NodeResult {
    fn settle(&mut self, status: NodeStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0));
    }
}

/// The scheduler's record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub status: ExecutionStatus,
    pub execution_order: Vec<NodeId>,
    pub completed_nodes: Vec<NodeId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<NodeId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<NodeId>,

    pub node_results: BTreeMap<NodeId, NodeResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Start a run over `order`, every node pending.
    pub fn new(order: Vec<NodeId>) -> Self {
        let node_results = order
            .iter()
            .map(|id| (id.clone(), NodeResult::default()))
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Running,
            execution_order: order,
            completed_nodes: Vec::new(),
            current_node: None,
            failed_node: None,
            node_results,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.node_results.get(node_id)
    }

    /// Number of nodes that ended `failed`.
    pub fn failed_count(&self) -> usize {
        self.node_results
            .values()
            .filter(|r| r.status == NodeStatus::Failed)
            .count()
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut NodeResult> {
        if self.is_terminal() {
            return None;
        }
        self.node_results.get_mut(node_id)
    }

    pub fn set_current(&mut self, node_id: Option<&str>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.current_node = node_id.map(str::to_string);
        true
    }

    pub fn mark_running(&mut self, node_id: &str) -> bool {
        match self.node_mut(node_id) {
            Some(result) => {
                result.status = NodeStatus::Running;
                result.started_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn mark_success(&mut self, node_id: &str, output_ref: &str) -> bool {
        let Some(result) = self.node_mut(node_id) else {
            return false;
        };
        result.output_ref = Some(output_ref.to_string());
        result.error = None;
        result.settle(NodeStatus::Success);
        self.completed_nodes.push(node_id.to_string());
        true
    }

    pub fn mark_failed(&mut self, node_id: &str, error: &str) -> bool {
        match self.node_mut(node_id) {
            Some(result) => {
                result.error = Some(error.to_string());
                result.settle(NodeStatus::Failed);
                true
            }
            None => false,
        }
    }

    pub fn mark_skipped(&mut self, node_id: &str, reason: &str) -> bool {
        match self.node_mut(node_id) {
            Some(result) => {
                result.error = Some(reason.to_string());
                result.settle(NodeStatus::Skipped);
                true
            }
            None => false,
        }
    }

    /// Finish successfully. Returns false if already terminal.
    pub fn complete(&mut self) -> bool {
        let failed = self.failed_count();
        let total = self.execution_order.len();
        let summary = (failed > 0).then(|| format!("{} of {} nodes failed", failed, total));
        self.finish(ExecutionStatus::Completed, summary)
    }

    /// Abort the run on a node failure.
    pub fn fail(&mut self, node_id: &str, error: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.failed_node = Some(node_id.to_string());
        self.finish(
            ExecutionStatus::Failed,
            Some(format!("Node '{}' failed: {}", node_id, error)),
        )
    }

    /// Cancel the run. Nodes still running are recorded as skipped; pending
    /// nodes stay pending.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        for result in self.node_results.values_mut() {
            if result.status == NodeStatus::Running {
                result.error = Some("cancelled".to_string());
                result.settle(NodeStatus::Skipped);
            }
        }
        self.finish(
            ExecutionStatus::Cancelled,
            Some("Execution cancelled".to_string()),
        )
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.current_node = None;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }
}
