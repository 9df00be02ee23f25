//! Normalized job status.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// State of a job as reported by any scheduler.
///
/// ```text
///   submit() ──→ Queued ──→ Running ──→ Completed
///                 │  ↑         │  ↑
///                 ↓  │         ↓  │
///             QueuedHeld    Suspended
/// ```
///
/// A scheduler that no longer knows a job reports it as `Completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The scheduler reported something this layer cannot classify.
    #[default]
    Undetermined,
    /// Waiting in a queue.
    Queued,
    /// Waiting in a queue with a hold applied.
    QueuedHeld,
    /// Held outside of a queue.
    Held,
    /// Running.
    Running,
    /// Started, then suspended.
    Suspended,
    /// Finished, successfully or not.
    Completed,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed)
    }

    /// Check if the job occupies or waits for resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Queued
                | JobState::QueuedHeld
                | JobState::Held
                | JobState::Running
                | JobState::Suspended
        )
    }

    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Undetermined => "undetermined",
            JobState::Queued => "queued",
            JobState::QueuedHeld => "queued_held",
            JobState::Held => "held",
            JobState::Running => "running",
            JobState::Suspended => "suspended",
            JobState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A node allocated to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Host name.
    pub name: String,
    /// Processors/slots used on that host.
    pub procs: u32,
}

/// Normalized information about one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Scheduler job id.
    pub id: String,
    /// Current state.
    pub status: JobState,
    /// Job name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Owning user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_owner: Option<String>,
    /// Queue the job is in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    /// Host the job was submitted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_host: Option<String>,
    /// Nodes the job runs on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocated_nodes: Vec<NodeInfo>,
    /// When the job was submitted (scheduler local time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<NaiveDateTime>,
    /// When the job started running (scheduler local time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_time: Option<NaiveDateTime>,
    /// Wall clock seconds used so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallclock_time: Option<i64>,
    /// CPU seconds used so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_time: Option<i64>,
    /// Raw scheduler attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub native: BTreeMap<String, String>,
}

impl JobInfo {
    /// Create job info with the given id and state.
    pub fn new(id: impl Into<String>, status: JobState) -> Self {
        Self {
            id: id.into(),
            status,
            ..Self::default()
        }
    }

    /// Info for a job the scheduler no longer knows about.
    pub fn completed(id: impl Into<String>) -> Self {
        Self::new(id, JobState::Completed)
    }

    /// Total processors across allocated nodes.
    pub fn procs(&self) -> u32 {
        self.allocated_nodes.iter().fold(0u32, |acc, n| acc.saturating_add(n.procs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Undetermined.is_terminal());
    }

    #[test]
    fn test_job_state_active() {
        assert!(JobState::Queued.is_active());
        assert!(JobState::QueuedHeld.is_active());
        assert!(JobState::Suspended.is_active());
        assert!(!JobState::Completed.is_active());
        assert!(!JobState::Undetermined.is_active());
    }

    #[test]
    fn test_job_state_serde_names() {
        let json = serde_json::to_string(&JobState::QueuedHeld).unwrap();
        assert_eq!(json, "\"queued_held\"");
        assert_eq!(JobState::QueuedHeld.to_string(), "queued_held");
    }

    #[test]
    fn test_procs_sums_nodes() {
        let mut info = JobInfo::new("1", JobState::Running);
        info.allocated_nodes = vec![
            NodeInfo { name: "n1".into(), procs: 4 },
            NodeInfo { name: "n2".into(), procs: 8 },
        ];
        assert_eq!(info.procs(), 12);
        assert_eq!(JobInfo::completed("2").status, JobState::Completed);
    }
}
