//! Execution engine for workflow graphs.

mod execution;
mod job_driver;
mod scheduler;
mod state;

pub use execution::{ExecutionStatus, NodeResult, NodeStatus, WorkflowExecution};
pub use job_driver::{progress_estimate, JobDriver, MAX_POLLING_PROGRESS};
pub use scheduler::{ProgressCallback, ScheduleOptions, Scheduler};
pub use state::{NodeStateStore, StateListener};
