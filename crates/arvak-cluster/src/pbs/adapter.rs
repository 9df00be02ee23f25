//! Torque adapter for job submission and tracking.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::batch::{Batch, SubmitOptions};
use super::native::{HoldType, PBSE_UNKJOBID};
use super::status;
#[cfg(feature = "native-torque")]
use crate::config::AdapterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::job::{JobAdapter, JobInfo, Script, format_hms};

/// Configuration for the Torque adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorqueConfig {
    /// Batch server host.
    pub host: String,

    /// Torque client library directory (holds `libtorque.so`).
    #[serde(default)]
    pub lib: PathBuf,

    /// Torque client binary directory (holds `qsub`).
    #[serde(default)]
    pub bin: PathBuf,

    /// Submit through `qsub` rather than the client library.
    #[serde(default = "default_submit_with_qsub")]
    pub submit_with_qsub: bool,
}

fn default_submit_with_qsub() -> bool {
    true
}

impl TorqueConfig {
    /// Create a configuration for the given batch server.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            lib: PathBuf::new(),
            bin: PathBuf::new(),
            submit_with_qsub: true,
        }
    }
}

/// Adapter for Torque batch servers.
#[derive(Debug, Clone)]
pub struct TorqueAdapter {
    batch: Batch,
    submit_with_qsub: bool,
}

impl TorqueAdapter {
    /// Build the adapter from a job configuration.
    #[cfg(feature = "native-torque")]
    pub fn from_config(config: &AdapterConfig) -> ClusterResult<Self> {
        let config: TorqueConfig = config.decode()?;
        if config.host.trim().is_empty() {
            return Err(ClusterError::Config(
                "torque adapter requires a non-empty host".to_string(),
            ));
        }
        let batch = Batch::new(config.host, config.lib, config.bin);
        Ok(Self::with_batch(batch, config.submit_with_qsub))
    }

    /// Create the adapter around an existing batch server handle.
    pub fn with_batch(batch: Batch, submit_with_qsub: bool) -> Self {
        Self {
            batch,
            submit_with_qsub,
        }
    }

    /// The underlying batch server handle.
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Translate a script into Torque submission options.
    ///
    /// `native` entries of the form `key=value` become extra headers.
    pub fn submit_options(&self, script: &Script) -> SubmitOptions {
        let mut headers = BTreeMap::new();
        if let Some(name) = &script.job_name {
            headers.insert("Job_Name".to_string(), name.clone());
        }
        if let Some(account) = &script.accounting_id {
            headers.insert("Account_Name".to_string(), account.clone());
        }
        if let Some(dir) = &script.workdir {
            headers.insert("init_work_dir".to_string(), dir.display().to_string());
        }
        if let Some(path) = &script.output_path {
            headers.insert("Output_Path".to_string(), path.display().to_string());
        }
        match &script.error_path {
            Some(path) => {
                headers.insert("Error_Path".to_string(), path.display().to_string());
            }
            None => {
                headers.insert("Join_Path".to_string(), "oe".to_string());
            }
        }
        if !script.email.is_empty() {
            headers.insert("Mail_Users".to_string(), script.email.join(","));
        }
        let mut mail_points = String::new();
        if script.email_on_started {
            mail_points.push('b');
        }
        if script.email_on_terminated {
            mail_points.push('e');
        }
        if !mail_points.is_empty() {
            headers.insert("Mail_Points".to_string(), mail_points);
        }
        for arg in &script.native {
            if let Some((key, value)) = arg.split_once('=') {
                headers.insert(key.to_string(), value.to_string());
            }
        }

        let mut resources = BTreeMap::new();
        if let Some(seconds) = script.wall_time {
            resources.insert("walltime".to_string(), format_hms(seconds));
        }

        SubmitOptions {
            queue: script.queue_name.clone(),
            headers,
            resources,
            envvars: script.job_environment.clone(),
            qsub: self.submit_with_qsub,
        }
    }
}

/// A job the server no longer knows about has finished.
fn is_unknown_job(err: &ClusterError) -> bool {
    matches!(err, ClusterError::NativeProtocol { code, .. } if *code == PBSE_UNKJOBID)
}

#[async_trait]
impl JobAdapter for TorqueAdapter {
    fn name(&self) -> &str {
        "torque"
    }

    async fn submit(&self, script: &Script) -> ClusterResult<String> {
        let options = self.submit_options(script);
        let id = self.batch.submit_string(&script.content, &options).await?;
        info!("Submitted job {} to {}", id, self.batch.host());
        Ok(id)
    }

    async fn info_all(&self) -> ClusterResult<Vec<JobInfo>> {
        let jobs = self.batch.get_jobs("", &[]).await?;
        Ok(jobs
            .iter()
            .map(|(id, attributes)| status::job_info(id, attributes))
            .collect())
    }

    async fn info(&self, id: &str) -> ClusterResult<JobInfo> {
        match self.batch.get_job(id, &[]).await {
            Ok(jobs) => Ok(match jobs.get(id).or_else(|| jobs.values().next()) {
                Some(attributes) => status::job_info(id, attributes),
                None => JobInfo::completed(id),
            }),
            Err(e) if is_unknown_job(&e) => {
                debug!("Job {} unknown to {}, reporting completed", id, self.batch.host());
                Ok(JobInfo::completed(id))
            }
            Err(e) => Err(e),
        }
    }

    async fn hold(&self, id: &str) -> ClusterResult<()> {
        match self.batch.hold_job(id, HoldType::User).await {
            Err(e) if is_unknown_job(&e) => Ok(()),
            other => other,
        }
    }

    async fn release(&self, id: &str) -> ClusterResult<()> {
        match self.batch.release_job(id, HoldType::User).await {
            Err(e) if is_unknown_job(&e) => Ok(()),
            other => other,
        }
    }

    async fn delete(&self, id: &str) -> ClusterResult<()> {
        match self.batch.delete_job(id).await {
            Err(e) if is_unknown_job(&e) => Ok(()),
            other => other,
        }
    }
}
