//! Workflow graph model, parsing, validation, and dependency resolution.
//!
//! A workflow is a canvas graph of:
//! - Input nodes: prompts and reference images
//! - Generator nodes: image, video, and upscale jobs
//! - Output nodes: display sinks

mod dag;
mod parser;
mod types;
mod validator;

pub use dag::{
    downstream_nodes, execution_layers, render_layers, runnable_layers, topo_sort, upstream_nodes,
    TopoSort,
};
pub use parser::{parse_graph, parse_graph_file, parse_graph_yaml};
pub use types::*;
pub use validator::validate_graph;
