//! Workflow scheduler.
//!
//! Resolves a graph into an order of generator nodes, then drives each node
//! through the job driver, either one at a time or layer by layer with a
//! join barrier between layers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};

use super::execution::{NodeStatus, WorkflowExecution};
use super::job_driver::JobDriver;
use super::state::{NodeStateStore, StateListener};
use crate::backend::GenerationBackend;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::nodes::{connected_inputs, Generator, GeneratorRegistry};
use crate::workflow::{runnable_layers, validate_graph, Graph, NodeId};

/// Observer of run-record changes. Receives a snapshot.
pub type ProgressCallback = Arc<dyn Fn(&WorkflowExecution) + Send + Sync>;

/// Options for one run.
#[derive(Clone)]
pub struct ScheduleOptions {
    /// Run independent nodes of a layer concurrently.
    pub parallel: bool,

    /// Abort the run on the first node failure.
    pub stop_on_error: bool,

    /// Resume from this generator node (inclusive).
    pub start_node: Option<NodeId>,

    pub on_progress: Option<ProgressCallback>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            stop_on_error: false,
            start_node: None,
            on_progress: None,
        }
    }
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sequential(self) -> Self {
        self.parallel(false)
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn start_from(mut self, node_id: impl Into<NodeId>) -> Self {
        self.start_node = Some(node_id.into());
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn mode(&self) -> &'static str {
        if self.parallel {
            "parallel"
        } else {
            "sequential"
        }
    }
}

impl std::fmt::Debug for ScheduleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleOptions")
            .field("parallel", &self.parallel)
            .field("stop_on_error", &self.stop_on_error)
            .field("start_node", &self.start_node)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Run record plus its observer. All mutations go through `mutate`.
#[derive(Clone)]
struct SharedRecord {
    execution: Arc<Mutex<WorkflowExecution>>,
    on_progress: Option<ProgressCallback>,
}

impl SharedRecord {
    fn new(execution: WorkflowExecution, on_progress: Option<ProgressCallback>) -> Self {
        Self {
            execution: Arc::new(Mutex::new(execution)),
            on_progress,
        }
    }

    /// Apply `f`; the observer is called with a snapshot when it reports a change.
    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut WorkflowExecution) -> bool,
    {
        let snapshot = {
            let mut execution = self.execution.lock();
            if !f(&mut execution) {
                return false;
            }
            self.on_progress.as_ref().map(|_| execution.clone())
        };

        if let (Some(callback), Some(snapshot)) = (&self.on_progress, snapshot) {
            callback(&snapshot);
        }
        true
    }

    fn notify(&self) {
        self.mutate(|_| true);
    }

    fn snapshot(&self) -> WorkflowExecution {
        self.execution.lock().clone()
    }
}

struct ActiveRun {
    id: String,
    token: CancellationToken,
    record: SharedRecord,
}

/// Releases the single-flight slot when a run ends, however it ends.
struct ActiveGuard {
    active: Arc<Mutex<Option<ActiveRun>>>,
    id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.id == self.id) {
            *active = None;
        }
        metrics::dec_active_executions();
    }
}

/// Everything a node task needs. Shared across the tasks of a layer.
struct RunContext {
    graph: Graph,
    store: NodeStateStore,
    driver: JobDriver,
    registry: Arc<GeneratorRegistry>,
    config: EngineConfig,
    token: CancellationToken,
    record: SharedRecord,
}

impl RunContext {
    async fn run_node(&self, node_id: &str) -> Result<String> {
        self.record.mutate(|e| e.mark_running(node_id));

        let (generator, params) = match self.prepare(node_id) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.store.fail(node_id, &e.to_string());
                return Err(e);
            }
        };

        self.driver
            .run_job(
                node_id,
                generator.kind(),
                &params,
                generator.max_poll_attempts(&self.config),
                &self.store,
                &self.token,
            )
            .await
    }

    fn prepare(&self, node_id: &str) -> Result<(Arc<dyn Generator>, Value)> {
        let node = self
            .graph
            .get_node(node_id)
            .ok_or_else(|| Error::Graph(format!("Node '{}' not found", node_id)))?;
        let generator = self.registry.resolve(node)?;
        let inputs = connected_inputs(&self.graph, &self.store, node_id);
        let params = generator.submit_params(node, &inputs)?;
        Ok((generator, params))
    }

    /// Record a node's outcome. Returns the error message of a failure.
    fn settle(&self, node_id: &str, outcome: Result<String>) -> Option<String> {
        match outcome {
            Ok(output_ref) => {
                self.record.mutate(|e| e.mark_success(node_id, &output_ref));
                None
            }
            Err(Error::Cancelled) => {
                self.record.mutate(|e| e.mark_skipped(node_id, "cancelled"));
                None
            }
            Err(err) => {
                let message = err.to_string();
                self.record.mutate(|e| e.mark_failed(node_id, &message));
                Some(message)
            }
        }
    }
}

/// Drives workflow runs against a generation back-end.
pub struct Scheduler {
    driver: JobDriver,
    registry: Arc<GeneratorRegistry>,
    config: EngineConfig,
    state_listener: Option<StateListener>,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl Scheduler {
    /// Create a scheduler with the built-in generators.
    pub fn new(backend: Arc<dyn GenerationBackend>, config: EngineConfig) -> Self {
        Self {
            driver: JobDriver::new(backend, config.poll_interval()),
            registry: Arc::new(GeneratorRegistry::new()),
            config,
            state_listener: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Observe live generator state (progress, job ids, outputs).
    pub fn with_state_listener(mut self, listener: StateListener) -> Self {
        self.state_listener = Some(listener);
        self
    }

    /// Whether a run currently holds the single-flight slot.
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Snapshot of the active run, if any.
    pub fn current_execution(&self) -> Option<WorkflowExecution> {
        self.active.lock().as_ref().map(|run| run.record.snapshot())
    }

    /// Generator node IDs a run would execute, in order.
    ///
    /// # Errors
    /// `CycleDetected`, `Graph`, `InvalidStartNode`, or `NoRunnableNodes`.
    pub fn plan(&self, graph: &Graph, start_node: Option<&str>) -> Result<Vec<NodeId>> {
        let sorted = graph.topo_sort();
        if sorted.has_cycle {
            return Err(Error::CycleDetected {
                path: sorted.cycle_path.unwrap_or_default(),
            });
        }
        validate_graph(graph)?;

        let mut order: Vec<NodeId> = sorted
            .order
            .into_iter()
            .filter(|id| graph.get_node(id).is_some_and(|n| n.is_generator()))
            .collect();

        if let Some(start) = start_node {
            let position = order
                .iter()
                .position(|id| id == start)
                .ok_or_else(|| Error::InvalidStartNode(start.to_string()))?;
            order.drain(..position);
        }

        if order.is_empty() {
            return Err(Error::NoRunnableNodes);
        }
        Ok(order)
    }

    /// Execute a workflow graph.
    ///
    /// Pre-flight failures return `Err` before any job is submitted. Node
    /// failures never do; they are recorded in the returned execution.
    #[instrument(
        name = "workflow.execute",
        skip(self, graph, options),
        fields(
            nodes = graph.nodes.len(),
            mode = %options.mode(),
            stop_on_error = options.stop_on_error,
            execution_id = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        graph: &Graph,
        options: ScheduleOptions,
    ) -> Result<WorkflowExecution> {
        let order = self.plan(graph, options.start_node.as_deref())?;

        let token = CancellationToken::new();
        let record = SharedRecord::new(
            WorkflowExecution::new(order.clone()),
            options.on_progress.clone(),
        );
        let execution_id = record.snapshot().id;
        let _guard = self.claim(&execution_id, &token, &record)?;
        Span::current().record("execution_id", execution_id.as_str());

        let started = Instant::now();
        info!(
            "Starting execution {} ({} nodes, {})",
            execution_id,
            order.len(),
            options.mode()
        );
        record.notify();

        let mut store = NodeStateStore::from_graph(graph);
        if let Some(listener) = &self.state_listener {
            store = store.with_listener(listener.clone());
        }

        let ctx = Arc::new(RunContext {
            graph: graph.clone(),
            store,
            driver: self.driver.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            token: token.clone(),
            record: record.clone(),
        });

        if options.parallel {
            let runnable: HashSet<&str> = order.iter().map(String::as_str).collect();
            let layers = runnable_layers(&graph.nodes, &graph.edges, &runnable);
            run_layers(&ctx, &layers, options.stop_on_error).await;
        } else {
            run_sequential(&ctx, &order, options.stop_on_error).await;
        }

        if token.is_cancelled() {
            record.mutate(|e| e.cancel());
        } else {
            record.mutate(|e| e.complete());
        }

        let execution = record.snapshot();
        metrics::record_workflow_execution(&execution.status.to_string(), options.mode());
        metrics::record_workflow_duration(started.elapsed());

        match &execution.error {
            Some(err) => info!("Execution {} {}: {}", execution.id, execution.status, err),
            None => info!("Execution {} {}", execution.id, execution.status),
        }

        Ok(execution)
    }

    /// Cancel the active run.
    ///
    /// The record turns `cancelled` immediately; in-flight jobs stop at their
    /// next sleep or request. Returns false if nothing was running.
    pub fn cancel(&self) -> bool {
        let Some(run) = self.active.lock().take() else {
            return false;
        };

        let cancelled = run.record.mutate(|e| e.cancel());
        run.token.cancel();
        if cancelled {
            info!("Execution {} cancelled", run.id);
        }
        cancelled
    }

    fn claim(
        &self,
        execution_id: &str,
        token: &CancellationToken,
        record: &SharedRecord,
    ) -> Result<ActiveGuard> {
        let mut active = self.active.lock();
        if let Some(run) = active.as_ref() {
            warn!("Rejecting new run while execution {} is active", run.id);
            return Err(Error::AlreadyRunning(run.id.clone()));
        }

        *active = Some(ActiveRun {
            id: execution_id.to_string(),
            token: token.clone(),
            record: record.clone(),
        });
        metrics::inc_active_executions();

        Ok(ActiveGuard {
            active: self.active.clone(),
            id: execution_id.to_string(),
        })
    }
}

async fn run_sequential(ctx: &Arc<RunContext>, order: &[NodeId], stop_on_error: bool) {
    for node_id in order {
        if ctx.token.is_cancelled() {
            return;
        }

        ctx.record.mutate(|e| e.set_current(Some(node_id)));
        let outcome = ctx.run_node(node_id).await;

        if let Some(message) = ctx.settle(node_id, outcome) {
            if stop_on_error {
                ctx.record.mutate(|e| e.fail(node_id, &message));
                return;
            }
        }
    }
}

async fn run_layers(ctx: &Arc<RunContext>, layers: &[Vec<NodeId>], stop_on_error: bool) {
    for (index, layer) in layers.iter().enumerate() {
        if ctx.token.is_cancelled() {
            return;
        }
        debug!("Running layer {}: {}", index, layer.join(", "));

        let mut join_set = JoinSet::new();
        for node_id in layer {
            let ctx = ctx.clone();
            let node_id = node_id.clone();
            join_set.spawn(async move {
                let outcome = ctx.run_node(&node_id).await;
                (node_id, outcome)
            });
        }

        let mut failures: HashMap<NodeId, String> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((node_id, outcome)) => {
                    if let Some(message) = ctx.settle(&node_id, outcome) {
                        failures.insert(node_id, message);
                    }
                }
                Err(e) => error!("Node task in layer {} aborted: {}", index, e),
            }
        }

        // A task that died without reporting still counts as a failure.
        let snapshot = ctx.record.snapshot();
        for node_id in layer {
            let settled = snapshot
                .result(node_id)
                .is_some_and(|r| r.status.is_settled() || r.status == NodeStatus::Pending);
            if !settled && !failures.contains_key(node_id) && !snapshot.is_terminal() {
                let message = "node task aborted".to_string();
                ctx.record.mutate(|e| e.mark_failed(node_id, &message));
                failures.insert(node_id.clone(), message);
            }
        }

        if stop_on_error {
            if let Some(first) = layer.iter().find(|id| failures.contains_key(*id)) {
                let message = &failures[first];
                ctx.record.mutate(|e| e.fail(first, message));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::backend::JobPoll;
    use crate::engine::ExecutionStatus;
    use crate::workflow::{Edge, GeneratorData, GeneratorKind, Node, NodeKind};
    use serde_json::json;
    use std::time::Duration;

    fn config() -> EngineConfig {
        EngineConfig {
            poll_interval_ms: 1,
            image_max_attempts: 20,
            video_max_attempts: 20,
            upscale_max_attempts: 20,
        }
    }

    /// Generator node whose jobs the scripted backend knows by its ID.
    fn tagged(id: &str, kind: GeneratorKind) -> Node {
        let mut data = GeneratorData::default();
        data.settings.insert("tag".into(), json!(id));
        let kind = match kind {
            GeneratorKind::Image => NodeKind::Image(data),
            GeneratorKind::Video => NodeKind::Video(data),
            GeneratorKind::Upscale => NodeKind::Upscale(data),
        };
        Node::new(id, kind)
    }

    fn image(id: &str) -> Node {
        tagged(id, GeneratorKind::Image)
    }

    fn graph(nodes: Vec<Node>, pairs: &[(&str, &str)]) -> Graph {
        let edges = pairs.iter().map(|(s, t)| Edge::new(*s, *t)).collect();
        Graph::new(nodes, edges)
    }

    fn scheduler(backend: Arc<ScriptedBackend>) -> Scheduler {
        Scheduler::new(backend, config())
    }

    /// P feeds F and G; W depends on G only.
    fn split_graph() -> Graph {
        graph(
            vec![Node::prompt("P", "castle"), image("F"), image("G"), image("W")],
            &[("P", "F"), ("P", "G"), ("G", "W")],
        )
    }

    #[tokio::test]
    async fn test_single_image_completes() {
        let backend = Arc::new(ScriptedBackend::new());
        let g = graph(vec![Node::prompt("P", "a fox"), image("I")], &[("P", "I")]);

        let exec = scheduler(backend.clone())
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();

        assert_eq!(exec.execution_order, vec!["I"]);
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert!(exec.error.is_none());
        let result = exec.result("I").unwrap();
        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(result.output_ref.as_deref(), Some("I.png"));
        assert_eq!(backend.submitted(), vec!["I"]);
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_submission() {
        let backend = Arc::new(ScriptedBackend::new());
        let g = graph(vec![image("A"), image("B")], &[("A", "B"), ("B", "A")]);

        let err = scheduler(backend.clone())
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap_err();

        match err {
            Error::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("expected cycle, got {}", other),
        }
        assert!(backend.events().is_empty());
    }

    #[tokio::test]
    async fn test_layers_fan_out_and_join() {
        let backend = Arc::new(ScriptedBackend::new());
        let g = graph(
            vec![
                Node::prompt("P", "lake at dawn"),
                image("I1"),
                image("I2"),
                tagged("V", GeneratorKind::Video),
            ],
            &[("P", "I1"), ("P", "I2"), ("I1", "V"), ("I2", "V")],
        );

        let exec = scheduler(backend.clone())
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.execution_order, vec!["I1", "I2", "V"]);

        let pos = |e: &str| backend.position(e).unwrap();
        let last_submit = pos("submit:I1").max(pos("submit:I2"));
        let first_settle = pos("settle:I1").min(pos("settle:I2"));
        let last_settle = pos("settle:I1").max(pos("settle:I2"));
        assert!(last_submit < first_settle);
        assert!(pos("submit:V") > last_settle);
    }

    #[tokio::test]
    async fn test_chained_output_feeds_next_layer() {
        // V has no prompt of its own; it only sees I's output.
        let backend = Arc::new(ScriptedBackend::new());
        let g = graph(
            vec![Node::prompt("P", "a fox"), image("I"), tagged("V", GeneratorKind::Video)],
            &[("P", "I"), ("I", "V")],
        );

        let exec = scheduler(backend)
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();
        assert_eq!(exec.result("V").unwrap().status, NodeStatus::Success);
        assert_eq!(exec.completed_nodes, vec!["I", "V"]);
    }

    #[tokio::test]
    async fn test_stop_on_error_parallel() {
        let backend = Arc::new(
            ScriptedBackend::new().script("F", vec![JobPoll::failed("provider error")]),
        );

        let exec = scheduler(backend.clone())
            .execute(&split_graph(), ScheduleOptions::new().stop_on_error(true))
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.failed_node.as_deref(), Some("F"));
        assert!(exec.error.as_deref().unwrap().contains("provider error"));
        // The layer barrier still records the sibling.
        assert_eq!(exec.result("G").unwrap().status, NodeStatus::Success);
        assert_eq!(exec.result("W").unwrap().status, NodeStatus::Pending);
        assert!(!backend.submitted().contains(&"W".to_string()));
    }

    #[tokio::test]
    async fn test_continue_on_error_parallel() {
        let backend = Arc::new(
            ScriptedBackend::new().script("F", vec![JobPoll::failed("provider error")]),
        );

        let exec = scheduler(backend.clone())
            .execute(&split_graph(), ScheduleOptions::new())
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.result("F").unwrap().status, NodeStatus::Failed);
        assert_eq!(exec.result("W").unwrap().status, NodeStatus::Success);
        assert!(exec.failed_node.is_none());
        assert_eq!(exec.error.as_deref(), Some("1 of 3 nodes failed"));
        assert!(backend.submitted().contains(&"W".to_string()));
    }

    #[tokio::test]
    async fn test_stop_on_error_sequential() {
        let backend = Arc::new(ScriptedBackend::new().reject("F"));
        let currents = Arc::new(Mutex::new(Vec::new()));
        let sink = currents.clone();

        let options = ScheduleOptions::new()
            .sequential()
            .stop_on_error(true)
            .on_progress(Arc::new(move |e: &WorkflowExecution| {
                sink.lock().push(e.current_node.clone());
            }));

        let exec = scheduler(backend.clone())
            .execute(&split_graph(), options)
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.failed_node.as_deref(), Some("F"));
        assert_eq!(backend.submitted(), vec!["F"]);
        assert!(currents.lock().contains(&Some("F".to_string())));
        assert!(exec.current_node.is_none());
    }

    #[tokio::test]
    async fn test_validation_failure_is_node_local() {
        // X has no inputs at all.
        let backend = Arc::new(ScriptedBackend::new());
        let g = graph(
            vec![Node::prompt("P", "x"), image("I"), image("X")],
            &[("P", "I")],
        );

        let exec = scheduler(backend.clone())
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Completed);
        let x = exec.result("X").unwrap();
        assert_eq!(x.status, NodeStatus::Failed);
        assert!(x.error.as_deref().unwrap().contains("no prompt, reference, or generated input"));
        assert_eq!(exec.result("I").unwrap().status, NodeStatus::Success);
        assert_eq!(backend.submitted(), vec!["I"]);
    }

    #[tokio::test]
    async fn test_downstream_of_failed_node_has_no_input() {
        let backend = Arc::new(ScriptedBackend::new().reject("I"));
        let g = graph(
            vec![Node::prompt("P", "x"), image("I"), tagged("U", GeneratorKind::Upscale)],
            &[("P", "I"), ("I", "U")],
        );

        let exec = scheduler(backend)
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();
        assert_eq!(exec.result("U").unwrap().status, NodeStatus::Failed);
        assert_eq!(exec.failed_count(), 2);
    }

    #[tokio::test]
    async fn test_start_node_runs_suffix() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut first = image("I");
        if let NodeKind::Image(data) = &mut first.kind {
            data.state.output_ref = Some("earlier.png".into());
        }
        let g = graph(
            vec![Node::prompt("P", "x"), first, tagged("V", GeneratorKind::Video)],
            &[("P", "I"), ("I", "V")],
        );

        let exec = scheduler(backend.clone())
            .execute(&g, ScheduleOptions::new().start_from("V"))
            .await
            .unwrap();
        assert_eq!(exec.execution_order, vec!["V"]);
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(backend.submitted(), vec!["V"]);
    }

    #[tokio::test]
    async fn test_preflight_errors() {
        let backend = Arc::new(ScriptedBackend::new());
        let s = scheduler(backend.clone());

        let g = graph(vec![Node::prompt("P", "x"), image("I")], &[("P", "I")]);
        let err = s
            .execute(&g, ScheduleOptions::new().start_from("P"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_START_NODE");

        let inputs_only = graph(vec![Node::prompt("P", "x")], &[]);
        let err = s.execute(&inputs_only, ScheduleOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), "NO_RUNNABLE_NODES");

        let dangling = graph(vec![image("I")], &[("ghost", "I")]);
        let err = s.execute(&dangling, ScheduleOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), "GRAPH_ERROR");

        assert!(backend.events().is_empty());
        assert!(!s.is_running());
    }

    #[tokio::test]
    async fn test_progress_snapshots() {
        let backend = Arc::new(ScriptedBackend::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let g = graph(vec![Node::prompt("P", "x"), image("I")], &[("P", "I")]);
        scheduler(backend)
            .execute(
                &g,
                ScheduleOptions::new().on_progress(Arc::new(move |e: &WorkflowExecution| {
                    sink.lock().push((e.status, e.result("I").unwrap().status));
                })),
            )
            .await
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], (ExecutionStatus::Running, NodeStatus::Pending));
        assert!(seen.contains(&(ExecutionStatus::Running, NodeStatus::Running)));
        assert_eq!(*seen.last().unwrap(), (ExecutionStatus::Completed, NodeStatus::Success));
    }

    #[tokio::test]
    async fn test_single_flight_and_cancel() {
        let backend =
            Arc::new(ScriptedBackend::new().script("V", vec![JobPoll::processing()]));
        let g = graph(
            vec![Node::prompt("P", "x"), tagged("V", GeneratorKind::Video), image("after")],
            &[("P", "V"), ("V", "after")],
        );
        let s = Arc::new(Scheduler::new(
            backend.clone(),
            EngineConfig {
                video_max_attempts: 100_000,
                ..config()
            },
        ));

        let runner = s.clone();
        let run_graph = g.clone();
        let handle =
            tokio::spawn(async move { runner.execute(&run_graph, ScheduleOptions::new()).await });

        while backend.submitted().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(s.is_running());
        assert_eq!(
            s.current_execution().unwrap().status,
            ExecutionStatus::Running
        );

        let err = s.execute(&g, ScheduleOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_RUNNING");

        assert!(s.cancel());
        assert!(!s.cancel());

        let exec = handle.await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert!(exec.completed_at.is_some());
        assert_eq!(exec.result("V").unwrap().status, NodeStatus::Skipped);
        assert_eq!(exec.result("after").unwrap().status, NodeStatus::Pending);
        assert_eq!(backend.submitted(), vec!["V"]);
        assert!(!s.is_running());
    }

    #[tokio::test]
    async fn test_state_listener_sees_job_progress() {
        let backend = Arc::new(ScriptedBackend::new().script(
            "I",
            vec![JobPoll::processing(), JobPoll::processing(), JobPoll::succeeded("I.png")],
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let s = scheduler(backend).with_state_listener(Arc::new(move |id, state| {
            sink.lock().push((id.to_string(), state.progress));
        }));
        let g = graph(vec![Node::prompt("P", "x"), image("I")], &[("P", "I")]);
        s.execute(&g, ScheduleOptions::new()).await.unwrap();

        let progress: Vec<u8> = seen.lock().iter().map(|(_, p)| *p).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
    }

    /// Upscaler that needs no inputs and gets a single poll.
    struct SinglePollUpscaler;

    impl Generator for SinglePollUpscaler {
        fn kind(&self) -> GeneratorKind {
            GeneratorKind::Upscale
        }

        fn submit_params(
            &self,
            node: &Node,
            _inputs: &crate::nodes::ConnectedInputs,
        ) -> Result<Value> {
            Ok(json!({ "tag": format!("custom-{}", node.id), "scale": 4 }))
        }

        fn max_poll_attempts(&self, _config: &EngineConfig) -> u32 {
            1
        }
    }

    #[tokio::test]
    async fn test_custom_registry_replaces_builtin() {
        let backend = Arc::new(
            ScriptedBackend::new().script("custom-slow", vec![JobPoll::processing()]),
        );
        let mut registry = GeneratorRegistry::new();
        registry.register(Arc::new(SinglePollUpscaler));

        // Neither node has inputs, which the built-in upscaler would reject.
        let g = graph(
            vec![
                tagged("U", GeneratorKind::Upscale),
                tagged("slow", GeneratorKind::Upscale),
            ],
            &[],
        );
        let exec = scheduler(backend.clone())
            .with_registry(registry)
            .execute(&g, ScheduleOptions::new())
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(
            exec.result("U").unwrap().output_ref.as_deref(),
            Some("custom-U.png")
        );
        let slow = exec.result("slow").unwrap();
        assert_eq!(slow.status, NodeStatus::Failed);
        assert!(slow.error.as_deref().unwrap().contains("1 poll"));

        let mut submitted = backend.submitted();
        submitted.sort();
        assert_eq!(submitted, vec!["custom-U", "custom-slow"]);
    }
}
