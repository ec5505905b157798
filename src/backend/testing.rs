//! Scripted in-memory backend for engine tests.
//!
//! Jobs are keyed by the `tag` param (set through a node's `settings`), so a
//! test can script each node independently. Untagged or unscripted jobs
//! succeed on the first poll with `<tag>.png`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{GenerationBackend, JobPoll, SubmittedJob};
use crate::error::{Error, Result};
use crate::workflow::GeneratorKind;

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Vec<JobPoll>>>,
    cursors: Mutex<HashMap<String, usize>>,
    rejected: HashSet<String>,
    events: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the poll responses of a job; the last one repeats.
    pub fn script(self, tag: &str, polls: Vec<JobPoll>) -> Self {
        self.scripts.lock().insert(tag.to_string(), polls);
        self
    }

    /// Make submission of a job fail.
    pub fn reject(mut self, tag: &str) -> Self {
        self.rejected.insert(tag.to_string());
        self
    }

    /// Ordered log of `submit:<tag>`, `poll:<tag>` and `settle:<tag>` events.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("submit:").map(str::to_string))
            .collect()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn submit_job(&self, _kind: GeneratorKind, params: &Value) -> Result<SubmittedJob> {
        let tag = params
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("job")
            .to_string();
        self.events.lock().push(format!("submit:{}", tag));

        if self.rejected.contains(&tag) {
            return Err(Error::Submission(format!("provider rejected {}", tag)));
        }
        Ok(SubmittedJob {
            external_job_id: tag,
        })
    }

    async fn poll_job(&self, external_job_id: &str) -> Result<JobPoll> {
        self.events.lock().push(format!("poll:{}", external_job_id));

        let poll = {
            let scripts = self.scripts.lock();
            match scripts.get(external_job_id) {
                Some(polls) if !polls.is_empty() => {
                    let mut cursors = self.cursors.lock();
                    let cursor = cursors.entry(external_job_id.to_string()).or_insert(0);
                    let poll = polls[(*cursor).min(polls.len() - 1)].clone();
                    *cursor += 1;
                    poll
                }
                _ => JobPoll::succeeded(format!("{}.png", external_job_id)),
            }
        };

        if poll.status.is_terminal() {
            self.events.lock().push(format!("settle:{}", external_job_id));
        }
        Ok(poll)
    }
}
