//! Batch script description.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A batch script plus the scheduler-neutral options to submit it with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Script body.
    pub content: String,
    /// Job name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Queue to submit to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    /// Account charged for the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounting_id: Option<String>,
    /// Working directory of the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    /// Wall time limit in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_time: Option<u64>,
    /// Standard output path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Standard error path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_path: Option<PathBuf>,
    /// Addresses notified about the job.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email: Vec<String>,
    /// Notify when the job starts.
    #[serde(default)]
    pub email_on_started: bool,
    /// Notify when the job terminates.
    #[serde(default)]
    pub email_on_terminated: bool,
    /// Environment exported to the job.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub job_environment: BTreeMap<String, String>,
    /// Extra scheduler-specific arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub native: Vec<String>,
}

impl Script {
    /// Create a script from its body.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Set the job name.
    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = Some(queue.into());
        self
    }

    /// Set the accounting id.
    pub fn with_accounting_id(mut self, account: impl Into<String>) -> Self {
        self.accounting_id = Some(account.into());
        self
    }

    /// Set the working directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Set the wall time limit in seconds.
    pub fn with_wall_time(mut self, seconds: u64) -> Self {
        self.wall_time = Some(seconds);
        self
    }

    /// Set the output path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the error path.
    pub fn with_error_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    /// Add a notification address.
    pub fn with_email(mut self, address: impl Into<String>) -> Self {
        self.email.push(address.into());
        self
    }

    /// Export an environment variable to the job.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job_environment.insert(key.into(), value.into());
        self
    }

    /// Add a scheduler-specific argument.
    pub fn with_native(mut self, arg: impl Into<String>) -> Self {
        self.native.push(arg.into());
        self
    }
}

/// Format seconds as `HH:MM:SS`, hours unbounded.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Parse `[[HH:]MM:]SS` into seconds.
///
/// Every segment must be plain digits. More than three segments, or a value
/// too large for `i64`, yields `None`.
pub fn parse_hms(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || text.split(':').count() > 3 {
        return None;
    }
    text.split(':').try_fold(0i64, |acc, part| {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let part: i64 = part.parse().ok()?;
        acc.checked_mul(60)?.checked_add(part)
    })
}
