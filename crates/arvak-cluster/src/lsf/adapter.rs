//! LSF adapter for job submission and tracking.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::batch::Batch;
use super::helper;
use super::parser::BjobsRecord;
use crate::config::AdapterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::job::{JobAdapter, JobInfo, JobState, NodeInfo, Script};

/// Configuration for the LSF adapter. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsfConfig {
    /// Directory holding the LSF binaries.
    #[serde(default)]
    pub bindir: Option<PathBuf>,
    /// `LSF_LIBDIR`.
    #[serde(default)]
    pub libdir: Option<PathBuf>,
    /// `LSF_ENVDIR`.
    #[serde(default)]
    pub envdir: Option<PathBuf>,
    /// `LSF_SERVERDIR`.
    #[serde(default)]
    pub serverdir: Option<PathBuf>,
    /// Cluster to list jobs from.
    #[serde(default)]
    pub cluster: Option<String>,
}

impl LsfConfig {
    /// Command-line handle for this configuration.
    pub fn batch(&self) -> Batch {
        let mut batch = Batch::new();
        if let Some(dir) = &self.bindir {
            batch = batch.with_bindir(dir);
        }
        if let Some(dir) = &self.libdir {
            batch = batch.with_libdir(dir);
        }
        if let Some(dir) = &self.envdir {
            batch = batch.with_envdir(dir);
        }
        if let Some(dir) = &self.serverdir {
            batch = batch.with_serverdir(dir);
        }
        if let Some(cluster) = &self.cluster {
            batch = batch.with_cluster(cluster);
        }
        batch
    }
}

/// Map an LSF `STAT` value.
pub fn parse_lsf_state(stat: &str) -> JobState {
    match stat {
        "PEND" | "WAIT" | "PROV" => JobState::Queued,
        "PSUSP" => JobState::QueuedHeld,
        "USUSP" | "SSUSP" => JobState::Suspended,
        "RUN" => JobState::Running,
        "DONE" | "EXIT" => JobState::Completed,
        _ => JobState::Undetermined,
    }
}

fn present(value: &str) -> Option<String> {
    (!value.is_empty() && value != "-").then(|| value.to_string())
}

/// Adapter for LSF clusters.
#[derive(Debug, Clone)]
pub struct LsfAdapter {
    batch: Batch,
}

impl LsfAdapter {
    /// Build the adapter from a job configuration.
    pub fn from_config(config: &AdapterConfig) -> ClusterResult<Self> {
        let config: LsfConfig = config.decode()?;
        Ok(Self::new(config.batch()))
    }

    /// Create the adapter around a command-line handle.
    pub fn new(batch: Batch) -> Self {
        Self { batch }
    }

    /// The underlying command-line handle.
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// `bsub` arguments for a script.
    pub fn bsub_args(script: &Script) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        if let Some(name) = &script.job_name {
            push("-J", name.clone());
        }
        if let Some(queue) = &script.queue_name {
            push("-q", queue.clone());
        }
        if let Some(project) = &script.accounting_id {
            push("-P", project.clone());
        }
        if let Some(dir) = &script.workdir {
            push("-cwd", dir.display().to_string());
        }
        if let Some(seconds) = script.wall_time {
            // -W takes minutes; never cut the requested limit
            push("-W", seconds.div_ceil(60).to_string());
        }
        if let Some(path) = &script.output_path {
            push("-o", path.display().to_string());
        }
        if let Some(path) = &script.error_path {
            push("-e", path.display().to_string());
        }
        if !script.email.is_empty() {
            push("-u", script.email.join(","));
        }
        if !script.job_environment.is_empty() {
            let vars: Vec<String> = script
                .job_environment
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            push("-env", format!("all,{}", vars.join(",")));
        }

        if script.email_on_started {
            args.push("-B".to_string());
        }
        if script.email_on_terminated {
            args.push("-N".to_string());
        }
        args.extend(script.native.iter().cloned());
        args
    }

    /// Build [`JobInfo`] from a `bjobs` row, relative to `now`.
    pub fn job_info(record: &BjobsRecord, now: NaiveDateTime) -> JobInfo {
        let mut info = JobInfo::new(record.id.as_str(), parse_lsf_state(&record.status));

        info.job_name = present(&record.name);
        info.job_owner = present(&record.user);
        info.queue_name = present(&record.queue);
        info.submit_host = present(&record.from_host);
        if record.exec_host != "-" {
            info.allocated_nodes = helper::parse_exec_host(&record.exec_host)
                .into_iter()
                .map(|h| NodeInfo {
                    name: h.host,
                    procs: h.slots,
                })
                .collect();
        }

        // Malformed times are dropped, never fatal.
        let time = |text: &str| helper::parse_past_time_at(text, now, true).ok().flatten();
        let start = time(&record.start_time);
        let finish = time(&record.finish_time);
        info.submission_time = time(&record.submit_time);
        info.dispatch_time = start;
        info.wallclock_time = helper::estimate_runtime(now, start, finish).map(|d| d.num_seconds());
        info.cpu_time = helper::parse_cpu_used(&record.cpu_used);
        info.native = record
            .fields()
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        info
    }
}

fn already_gone(err: &ClusterError) -> bool {
    matches!(
        err,
        ClusterError::CommandError { message, .. }
            if message.contains("is not found") || message.contains("already finished")
    )
}

#[async_trait]
impl JobAdapter for LsfAdapter {
    fn name(&self) -> &str {
        "lsf"
    }

    async fn submit(&self, script: &Script) -> ClusterResult<String> {
        let id = self
            .batch
            .submit_string(&script.content, &Self::bsub_args(script))
            .await?;
        info!("Submitted LSF job {}", id);
        Ok(id)
    }

    async fn info_all(&self) -> ClusterResult<Vec<JobInfo>> {
        let now = Local::now().naive_local();
        Ok(self
            .batch
            .get_jobs()
            .await?
            .iter()
            .map(|r| Self::job_info(r, now))
            .collect())
    }

    async fn info(&self, id: &str) -> ClusterResult<JobInfo> {
        let now = Local::now().naive_local();
        match self.batch.get_job(id).await?.first() {
            Some(record) => Ok(Self::job_info(record, now)),
            None => {
                debug!("LSF job {} not found, reporting completed", id);
                Ok(JobInfo::completed(id))
            }
        }
    }

    async fn hold(&self, id: &str) -> ClusterResult<()> {
        match self.batch.stop_job(id).await {
            Err(e) if already_gone(&e) => Ok(()),
            other => other,
        }
    }

    async fn release(&self, id: &str) -> ClusterResult<()> {
        match self.batch.resume_job(id).await {
            Err(e) if already_gone(&e) => Ok(()),
            other => other,
        }
    }

    async fn delete(&self, id: &str) -> ClusterResult<()> {
        match self.batch.kill_job(id).await {
            Err(e) if already_gone(&e) => Ok(()),
            other => other,
        }
    }
}
