//! Communication with an LSF cluster through its command-line tools.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::parser::{self, BjobsRecord};
use crate::error::{ClusterError, ClusterResult};

/// An LSF installation and, optionally, the cluster to query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Batch {
    bindir: Option<PathBuf>,
    libdir: Option<PathBuf>,
    envdir: Option<PathBuf>,
    serverdir: Option<PathBuf>,
    cluster: Option<String>,
}

impl Batch {
    /// LSF binaries found on `PATH`, default environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding `bjobs`, `bsub`, ...
    pub fn with_bindir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bindir = Some(dir.into());
        self
    }

    /// Value for `LSF_LIBDIR`.
    pub fn with_libdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.libdir = Some(dir.into());
        self
    }

    /// Value for `LSF_ENVDIR`.
    pub fn with_envdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.envdir = Some(dir.into());
        self
    }

    /// Value for `LSF_SERVERDIR`.
    pub fn with_serverdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.serverdir = Some(dir.into());
        self
    }

    /// Restrict job listings to one cluster of a multicluster setup.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Binary directory, if configured.
    pub fn bindir(&self) -> Option<&Path> {
        self.bindir.as_deref()
    }

    /// Cluster name, if configured.
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// `LSF_*` variables passed to every command.
    pub fn env(&self) -> Vec<(&'static str, &Path)> {
        [
            ("LSF_BINDIR", &self.bindir),
            ("LSF_LIBDIR", &self.libdir),
            ("LSF_ENVDIR", &self.envdir),
            ("LSF_SERVERDIR", &self.serverdir),
        ]
        .into_iter()
        .filter_map(|(key, dir)| dir.as_deref().map(|d| (key, d)))
        .collect()
    }

    fn command_path(&self, cmd: &str) -> PathBuf {
        match &self.bindir {
            Some(dir) => dir.join(cmd),
            None => PathBuf::from(cmd),
        }
    }

    async fn run(&self, cmd: &str, args: &[String], stdin: Option<&str>) -> ClusterResult<Output> {
        let path = self.command_path(cmd);
        debug!("Running {} {:?}", path.display(), args);

        let mut child = Command::new(&path)
            .args(args)
            .envs(self.env())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClusterError::CommandError {
                command: cmd.to_string(),
                message: e.to_string(),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }

        Ok(child.wait_with_output().await?)
    }

    /// Run `cmd`, returning stdout. Non-zero exit is a
    /// [`ClusterError::CommandError`] carrying stderr.
    async fn call(&self, cmd: &str, args: &[String]) -> ClusterResult<String> {
        let output = self.run(cmd, args, None).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ClusterError::CommandError {
                command: cmd.to_string(),
                message: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }

    async fn bjobs(&self, args: Vec<String>) -> ClusterResult<Vec<BjobsRecord>> {
        match self.call("bjobs", &args).await {
            Ok(stdout) => parser::parse_bjobs_output(&stdout),
            Err(ClusterError::CommandError { message, .. })
                if parser::is_no_jobs_message(&message) =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Every job of every user, finished ones included.
    pub async fn get_jobs(&self) -> ClusterResult<Vec<BjobsRecord>> {
        let mut args: Vec<String> = ["-u", "all", "-a", "-w", "-W"]
            .into_iter()
            .map(String::from)
            .collect();
        if let Some(cluster) = &self.cluster {
            args.push("-m".to_string());
            args.push(cluster.clone());
        }
        self.bjobs(args).await
    }

    /// One job; empty if LSF does not know it.
    pub async fn get_job(&self, id: &str) -> ClusterResult<Vec<BjobsRecord>> {
        let args = ["-a", "-w", "-W", id].into_iter().map(String::from).collect();
        self.bjobs(args).await
    }

    /// Submit a script on stdin with extra `bsub` arguments, returning the
    /// job id.
    pub async fn submit_string(&self, script: &str, args: &[String]) -> ClusterResult<String> {
        let output = self.run("bsub", args, Some(script)).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::SubmissionFailure(stderr.trim().to_string()));
        }
        parser::parse_bsub_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Suspend a job (`bstop`).
    pub async fn stop_job(&self, id: &str) -> ClusterResult<()> {
        self.call("bstop", &[id.to_string()]).await.map(|_| ())
    }

    /// Resume a suspended job (`bresume`).
    pub async fn resume_job(&self, id: &str) -> ClusterResult<()> {
        self.call("bresume", &[id.to_string()]).await.map(|_| ())
    }

    /// Kill a job (`bkill`).
    pub async fn kill_job(&self, id: &str) -> ClusterResult<()> {
        self.call("bkill", &[id.to_string()]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_only_configured_dirs() {
        let batch = Batch::new()
            .with_bindir("/opt/lsf/bin")
            .with_envdir("/opt/lsf/conf");
        let env = batch.env();

        assert_eq!(
            env,
            vec![
                ("LSF_BINDIR", Path::new("/opt/lsf/bin")),
                ("LSF_ENVDIR", Path::new("/opt/lsf/conf")),
            ]
        );
        assert!(Batch::new().env().is_empty());
    }

    #[test]
    fn test_command_path() {
        assert_eq!(Batch::new().command_path("bjobs"), PathBuf::from("bjobs"));
        assert_eq!(
            Batch::new().with_bindir("/opt/lsf/bin").command_path("bsub"),
            PathBuf::from("/opt/lsf/bin/bsub")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_command_error() {
        let batch = Batch::new().with_bindir("/nonexistent/lsf/bin");
        let err = batch.get_jobs().await.unwrap_err();
        assert!(matches!(err, ClusterError::CommandError { ref command, .. } if command == "bjobs"));
    }

    #[test]
    fn test_equality_over_configuration() {
        assert_eq!(
            Batch::new().with_cluster("c1"),
            Batch::new().with_cluster("c1")
        );
        assert_ne!(Batch::new(), Batch::new().with_cluster("c1"));
    }
}
