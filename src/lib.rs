//! flowcanvas - workflow execution engine for AI image/video node graphs.
//!
//! A canvas graph wires prompt and reference nodes into generator nodes
//! (image, video, upscale). The engine orders the graph, rejects cycles, and
//! drives every generator through a submit/poll job against a back-end,
//! running independent nodes concurrently.
//!
//! ## Example
//!
//! ```yaml
//! nodes:
//!   - id: prompt
//!     type: prompt
//!     text: "a lighthouse at dusk, volumetric fog"
//!
//!   - id: still
//!     type: image
//!     model: flux-dev
//!     settings:
//!       aspect_ratio: "16:9"
//!
//!   - id: clip
//!     type: video
//!     settings:
//!       duration: 5
//!
//! edges:
//!   - { source: prompt, target: still }
//!   - { source: still, target: clip }
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod nodes;
pub mod shutdown;
pub mod telemetry;
pub mod workflow;

pub use error::{Error, Result};
