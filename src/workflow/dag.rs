//! Dependency resolution over a graph snapshot.
//!
//! Provides Kahn-ordered topological sorting with cycle recovery, layered
//! scheduling for parallel execution, and upstream/downstream reachability.
//!
//! Ordering is deterministic: FIFO by release time, then node order. Roots
//! are queued in node-list order, and nodes freed by the same predecessor are
//! appended in node-list order. A node released later runs after every node
//! already queued, even if it comes earlier in the node list. Edges
//! that reference unknown nodes are ignored here; [`super::validate_graph`]
//! rejects them up front.

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{Edge, Graph, Node, NodeId};

/// Result of a topological sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoSort {
    /// Node IDs with every edge source before its target. Incomplete when a
    /// cycle exists.
    pub order: Vec<NodeId>,

    pub has_cycle: bool,

    /// One concrete cycle; first and last element are the same node.
    pub cycle_path: Option<Vec<NodeId>>,
}

/// Index-based adjacency, successor lists sorted by node position.
struct Adjacency {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl Adjacency {
    fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

        for edge in edges {
            let (Some(&s), Some(&t)) = (
                index.get(edge.source.as_str()),
                index.get(edge.target.as_str()),
            ) else {
                continue;
            };
            // Parallel edges collapse into one dependency.
            if !successors[s].contains(&t) {
                successors[s].push(t);
                predecessors[t].push(s);
            }
        }

        for list in successors.iter_mut().chain(predecessors.iter_mut()) {
            list.sort_unstable();
        }

        Self {
            successors,
            predecessors,
        }
    }
}

/// Topologically sort nodes using Kahn's algorithm.
pub fn topo_sort(nodes: &[Node], edges: &[Edge]) -> TopoSort {
    let adj = Adjacency::build(nodes, edges);

    let mut in_degree: Vec<usize> = adj.predecessors.iter().map(|p| p.len()).collect();
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = vec![false; nodes.len()];

    while let Some(current) = queue.pop_front() {
        visited[current] = true;
        order.push(nodes[current].id.clone());

        for &next in &adj.successors[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() == nodes.len() {
        return TopoSort {
            order,
            has_cycle: false,
            cycle_path: None,
        };
    }

    let cycle_path = find_cycle(&adj, &visited).map(|path| {
        path.into_iter()
            .map(|i| nodes[i].id.clone())
            .collect::<Vec<_>>()
    });

    TopoSort {
        order,
        has_cycle: true,
        cycle_path,
    }
}

/// Recover one cycle among the nodes Kahn's pass could not emit.
fn find_cycle(adj: &Adjacency, sorted: &[bool]) -> Option<Vec<usize>> {
    fn dfs(
        node: usize,
        adj: &Adjacency,
        sorted: &[bool],
        visited: &mut [bool],
        stack: &mut Vec<usize>,
        on_stack: &mut [bool],
    ) -> Option<Vec<usize>> {
        visited[node] = true;
        on_stack[node] = true;
        stack.push(node);

        for &next in &adj.successors[node] {
            if sorted[next] {
                continue;
            }
            if on_stack[next] {
                let start = stack.iter().position(|&n| n == next)?;
                let mut path = stack[start..].to_vec();
                path.push(next);
                return Some(path);
            }
            if !visited[next] {
                if let Some(path) = dfs(next, adj, sorted, visited, stack, on_stack) {
                    return Some(path);
                }
            }
        }

        stack.pop();
        on_stack[node] = false;
        None
    }

    let n = sorted.len();
    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();

    for start in 0..n {
        if sorted[start] || visited[start] {
            continue;
        }
        if let Some(path) = dfs(start, adj, sorted, &mut visited, &mut stack, &mut on_stack) {
            return Some(path);
        }
    }

    None
}

/// Group nodes into execution layers.
///
/// A node's layer is one more than the deepest layer among its
/// predecessors; roots are layer 0. Returns an empty list for cyclic graphs.
pub fn execution_layers(nodes: &[Node], edges: &[Edge]) -> Vec<Vec<NodeId>> {
    assign_layers(nodes, edges, |_| true)
}

/// Layers of the `runnable` subset only.
///
/// Dependencies that pass through non-runnable nodes (prompts, references,
/// nodes before a resume point) still order the runnable ones, but those
/// nodes do not occupy a layer of their own. Empty layers never appear.
pub fn runnable_layers(
    nodes: &[Node],
    edges: &[Edge],
    runnable: &HashSet<&str>,
) -> Vec<Vec<NodeId>> {
    assign_layers(nodes, edges, |id| runnable.contains(id))
}

fn assign_layers<F>(nodes: &[Node], edges: &[Edge], counts: F) -> Vec<Vec<NodeId>>
where
    F: Fn(&str) -> bool,
{
    let sorted = topo_sort(nodes, edges);
    if sorted.has_cycle {
        return Vec::new();
    }

    let adj = Adjacency::build(nodes, edges);
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let weight: Vec<usize> = nodes.iter().map(|n| usize::from(counts(&n.id))).collect();

    let mut layer_of = vec![0usize; nodes.len()];
    let mut layers: Vec<Vec<NodeId>> = Vec::new();

    for id in &sorted.order {
        let i = index[id.as_str()];
        let layer = adj.predecessors[i]
            .iter()
            .map(|&p| layer_of[p] + weight[p])
            .max()
            .unwrap_or(0);
        layer_of[i] = layer;

        if weight[i] == 0 {
            continue;
        }
        if layers.len() <= layer {
            layers.resize_with(layer + 1, Vec::new);
        }
        layers[layer].push(id.clone());
    }

    layers.retain(|layer| !layer.is_empty());
    layers
}

/// All nodes the given node transitively depends on (breadth-first).
pub fn upstream_nodes(node_id: &str, edges: &[Edge]) -> Vec<NodeId> {
    traverse(node_id, edges, |e| (&e.target, &e.source))
}

/// All nodes that transitively depend on the given node (breadth-first).
pub fn downstream_nodes(node_id: &str, edges: &[Edge]) -> Vec<NodeId> {
    traverse(node_id, edges, |e| (&e.source, &e.target))
}

fn traverse<F>(start: &str, edges: &[Edge], direction: F) -> Vec<NodeId>
where
    F: Fn(&Edge) -> (&NodeId, &NodeId),
{
    let mut result = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    seen.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for edge in edges {
            let (from, to) = direction(edge);
            if from == current && seen.insert(to.as_str()) {
                result.push(to.clone());
                queue.push_back(to.as_str());
            }
        }
    }

    result
}

impl Graph {
    pub fn topo_sort(&self) -> TopoSort {
        topo_sort(&self.nodes, &self.edges)
    }

    pub fn execution_layers(&self) -> Vec<Vec<NodeId>> {
        execution_layers(&self.nodes, &self.edges)
    }

    pub fn upstream_nodes(&self, node_id: &str) -> Vec<NodeId> {
        upstream_nodes(node_id, &self.edges)
    }

    pub fn downstream_nodes(&self, node_id: &str) -> Vec<NodeId> {
        downstream_nodes(node_id, &self.edges)
    }
}

/// Render a plan of the graph's layers.
pub fn render_layers(graph: &Graph) -> String {
    let sorted = graph.topo_sort();
    if let Some(path) = &sorted.cycle_path {
        return format!("cycle: {}", path.join(" -> "));
    }

    let mut lines = Vec::new();
    for (i, layer) in graph.execution_layers().iter().enumerate() {
        let entries: Vec<String> = layer
            .iter()
            .map(|id| {
                let kind = graph
                    .get_node(id)
                    .map(|n| n.kind.type_name())
                    .unwrap_or("?");
                format!("{} [{}]", id, kind)
            })
            .collect();
        lines.push(format!("layer {}: {}", i, entries.join(", ")));
    }

    lines.join("\n")
}
