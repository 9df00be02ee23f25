//! Communication with a Torque batch server.
//!
//! Every operation opens its own session through [`Batch::connect`]; sessions
//! are never shared between operations. Native calls block, so the async
//! methods run them on tokio's blocking pool.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, warn};

use super::native::{
    ATTR_RESOURCE_LIST, ATTR_VARIABLE_LIST, Attribute, ConnectionId, HoldType, PBSE_NONE,
    StatScope, StatusMap, TorqueApi,
};
use super::qsub;
use crate::error::{ClusterError, ClusterResult};

/// Options for [`Batch::submit_script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Destination queue; `None` uses the server default.
    pub queue: Option<String>,
    /// PBS header attributes, e.g. `Job_Name`.
    pub headers: BTreeMap<String, String>,
    /// Entries of the `Resource_List` attribute, e.g. `nodes`.
    pub resources: BTreeMap<String, String>,
    /// Environment exported to the job.
    pub envvars: BTreeMap<String, String>,
    /// Submit through the `qsub` binary instead of the client library.
    pub qsub: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            queue: None,
            headers: BTreeMap::new(),
            resources: BTreeMap::new(),
            envvars: BTreeMap::new(),
            qsub: true,
        }
    }
}

impl SubmitOptions {
    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Add a header attribute.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a resource request.
    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }

    /// Export an environment variable.
    pub fn with_envvar(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envvars.insert(key.into(), value.into());
        self
    }

    /// Choose between the `qsub` binary (`true`) and the client library.
    pub fn with_qsub(mut self, qsub: bool) -> Self {
        self.qsub = qsub;
        self
    }

    /// Native attribute list for library submission.
    pub fn attributes(&self) -> Vec<Attribute> {
        let mut attributes: Vec<Attribute> = self
            .headers
            .iter()
            .map(|(k, v)| Attribute::new(k.as_str(), v.as_str()))
            .collect();
        attributes.extend(
            self.resources
                .iter()
                .map(|(k, v)| Attribute::resource(ATTR_RESOURCE_LIST, k.as_str(), v.as_str())),
        );
        if !self.envvars.is_empty() {
            attributes.push(Attribute::new(
                ATTR_VARIABLE_LIST,
                qsub::join_envvars(&self.envvars),
            ));
        }
        attributes
    }
}

/// Closes a session when dropped, including during unwinding.
struct Session<'a> {
    native: &'a dyn TorqueApi,
    cid: ConnectionId,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.native.disconnect(self.cid) {
            warn!("Failed to close batch server session {}: {}", self.cid, e);
        }
    }
}

/// A Torque batch server plus the client installation used to reach it.
///
/// Equality and hashing consider `host`, `lib` and `bin` only.
#[derive(Clone)]
pub struct Batch {
    host: String,
    lib: PathBuf,
    bin: PathBuf,
    native: Arc<dyn TorqueApi>,
}

impl Batch {
    /// Create a batch server handle using `<lib>/libtorque.so`.
    #[cfg(feature = "native-torque")]
    pub fn new(host: impl Into<String>, lib: impl Into<PathBuf>, bin: impl Into<PathBuf>) -> Self {
        let lib = lib.into();
        let native = Arc::new(super::ffi::LibTorque::new(&lib));
        Self::with_api(host, lib, bin, native)
    }

    /// Create a batch server handle on top of an explicit client library
    /// implementation.
    pub fn with_api(
        host: impl Into<String>,
        lib: impl Into<PathBuf>,
        bin: impl Into<PathBuf>,
        native: Arc<dyn TorqueApi>,
    ) -> Self {
        Self {
            host: host.into(),
            lib: lib.into(),
            bin: bin.into(),
            native,
        }
    }

    /// Batch server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Torque client library directory.
    pub fn lib(&self) -> &Path {
        &self.lib
    }

    /// Torque client binary directory.
    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Run `f` inside a session with the batch server.
    ///
    /// The session is closed whether `f` succeeds, fails or panics. An error
    /// from `f` is returned as is; only when `f` succeeds is the library's
    /// error code checked, after the session has been closed.
    pub fn connect<T>(&self, f: impl FnOnce(ConnectionId) -> ClusterResult<T>) -> ClusterResult<T> {
        let cid = self.native.connect(&self.host)?;
        if cid < 0 {
            let code = cid.saturating_abs();
            return Err(ClusterError::ConnectionFailure {
                code,
                message: self.native.strerror(code),
            });
        }
        debug!("Opened session {} to {}", cid, self.host);

        let value = {
            let _session = Session {
                native: self.native.as_ref(),
                cid,
            };
            f(cid)?
        };

        let code = self.native.errno();
        if code != PBSE_NONE {
            return Err(ClusterError::NativeProtocol {
                code,
                message: self.native.strerror(code),
            });
        }
        Ok(value)
    }

    async fn blocking<T, F>(&self, f: F) -> ClusterResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Batch) -> ClusterResult<T> + Send + 'static,
    {
        let batch = self.clone();
        tokio::task::spawn_blocking(move || f(&batch)).await?
    }

    async fn stat(&self, scope: StatScope, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        let id = id.to_string();
        let filters = filters.to_vec();
        self.blocking(move |batch| {
            batch.connect(|cid| batch.native.stat(cid, scope, &id, &filters))
        })
        .await
    }

    /// Status of the batch server, keyed by server name.
    pub async fn get_status(&self, filters: &[String]) -> ClusterResult<StatusMap> {
        self.stat(StatScope::Server, "", filters).await
    }

    /// Status of queues; an empty `id` selects all of them.
    pub async fn get_queues(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.stat(StatScope::Queue, id, filters).await
    }

    /// Status of one queue.
    pub async fn get_queue(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.get_queues(id, filters).await
    }

    /// Status of nodes; an empty `id` selects all of them.
    pub async fn get_nodes(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.stat(StatScope::Node, id, filters).await
    }

    /// Status of one node.
    pub async fn get_node(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.get_nodes(id, filters).await
    }

    /// Status of jobs; an empty `id` selects all of them.
    pub async fn get_jobs(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.stat(StatScope::Job, id, filters).await
    }

    /// Status of one job.
    pub async fn get_job(&self, id: &str, filters: &[String]) -> ClusterResult<StatusMap> {
        self.get_jobs(id, filters).await
    }

    /// Place a hold on a job.
    pub async fn hold_job(&self, id: &str, hold: HoldType) -> ClusterResult<()> {
        let id = id.to_string();
        self.blocking(move |batch| batch.connect(|cid| batch.native.hold(cid, &id, hold)))
            .await
    }

    /// Release a hold on a job.
    pub async fn release_job(&self, id: &str, hold: HoldType) -> ClusterResult<()> {
        let id = id.to_string();
        self.blocking(move |batch| batch.connect(|cid| batch.native.release(cid, &id, hold)))
            .await
    }

    /// Delete a job.
    pub async fn delete_job(&self, id: &str) -> ClusterResult<()> {
        let id = id.to_string();
        self.blocking(move |batch| batch.connect(|cid| batch.native.delete(cid, &id)))
            .await
    }

    /// Submit the script at `script`, returning the new job id.
    pub async fn submit_script(&self, script: &Path, options: &SubmitOptions) -> ClusterResult<String> {
        if options.qsub {
            self.qsub_submit(script, options).await
        } else {
            self.pbs_submit(script, options).await
        }
    }

    /// Submit a script given as text. The temporary file is removed afterwards.
    pub async fn submit_string(&self, script: &str, options: &SubmitOptions) -> ClusterResult<String> {
        let file = tempfile::Builder::new().prefix("qsub.").tempfile()?;
        tokio::fs::write(file.path(), script).await?;
        self.submit_script(file.path(), options).await
    }

    async fn pbs_submit(&self, script: &Path, options: &SubmitOptions) -> ClusterResult<String> {
        let attributes = options.attributes();
        let script = script.to_string_lossy().into_owned();
        let queue = options.queue.clone().unwrap_or_default();

        let id = self
            .blocking(move |batch| {
                batch.connect(|cid| batch.native.submit(cid, &attributes, &script, &queue))
            })
            .await?;

        id.ok_or_else(|| {
            ClusterError::SubmissionFailure("batch server returned no job id".to_string())
        })
    }

    async fn qsub_submit(&self, script: &Path, options: &SubmitOptions) -> ClusterResult<String> {
        let args = qsub::qsub_args(
            options.queue.as_deref().unwrap_or_default(),
            &options.headers,
            &options.resources,
            &options.envvars,
            script,
        );
        let inherited = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
        let cmd = self.bin.join("qsub");
        debug!("Running {} {:?}", cmd.display(), args);

        let output = Command::new(&cmd)
            .args(&args)
            .env("PBS_DEFAULT", &self.host)
            .env("LD_LIBRARY_PATH", format!("{}:{}", self.lib.display(), inherited))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ClusterError::CommandError {
                command: cmd.display().to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::SubmissionFailure(stderr.trim_end().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        super::status::parse_qsub_output(&stdout)
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.lib == other.lib && self.bin == other.bin
    }
}

impl Eq for Batch {}

impl Hash for Batch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.lib.hash(state);
        self.bin.hash(state);
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("host", &self.host)
            .field("lib", &self.lib)
            .field("bin", &self.bin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::pbs::fake::FakeTorque;
    use crate::pbs::native::{AttributeValue, PBSE_UNKJOBID, StatusAttributes};

    fn batch(fake: &Arc<FakeTorque>) -> Batch {
        Batch::with_api("oak-batch", "/opt/torque/lib", "/opt/torque/bin", fake.clone())
    }

    #[test]
    fn test_connect_closes_session_on_success() {
        let fake = Arc::new(FakeTorque::new());
        let value = batch(&fake).connect(|cid| Ok(cid * 2)).unwrap();

        assert_eq!(value, 6);
        assert_eq!(fake.calls(), vec!["connect oak-batch", "disconnect 3"]);
    }

    #[test]
    fn test_connect_closes_session_when_block_fails() {
        let fake = Arc::new(FakeTorque::new().with_errno(15033));
        let err = batch(&fake)
            .connect(|_| -> ClusterResult<()> { Err(ClusterError::Parse("boom".into())) })
            .unwrap_err();

        // The block's own error wins over the residual library error.
        assert!(matches!(err, ClusterError::Parse(ref m) if m == "boom"));
        assert_eq!(fake.count("disconnect"), 1);
    }

    #[test]
    fn test_connect_closes_session_when_block_panics() {
        let fake = Arc::new(FakeTorque::new());
        let b = batch(&fake);
        let result = catch_unwind(AssertUnwindSafe(|| {
            b.connect(|_| -> ClusterResult<()> { panic!("block panicked") })
        }));

        assert!(result.is_err());
        assert_eq!(fake.count("disconnect"), 1);
    }

    #[test]
    fn test_negative_connection_id() {
        let fake = Arc::new(FakeTorque::new().with_connect_result(-15033));
        let err = batch(&fake).connect(|_| Ok(())).unwrap_err();

        match err {
            ClusterError::ConnectionFailure { code, message } => {
                assert_eq!(code, 15033);
                assert_eq!(message, "No permission");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fake.count("disconnect"), 0);
    }

    #[test]
    fn test_errno_checked_after_release() {
        let fake = Arc::new(FakeTorque::new().with_errno(15033));
        let b = batch(&fake);
        let err = b.connect(|cid| b.native.delete(cid, "1")).unwrap_err();

        assert!(matches!(err, ClusterError::NativeProtocol { code: 15033, .. }));
        assert_eq!(fake.calls().last().map(String::as_str), Some("disconnect 3"));
    }

    #[tokio::test]
    async fn test_get_job_unknown_is_protocol_error() {
        let fake = Arc::new(FakeTorque::new());
        let err = batch(&fake).get_job("99.oak-batch", &[]).await.unwrap_err();

        assert!(matches!(err, ClusterError::NativeProtocol { code, .. } if code == PBSE_UNKJOBID));
        assert_eq!(fake.count("disconnect"), 1);
    }

    #[tokio::test]
    async fn test_get_jobs_passes_filters() {
        let mut attributes = StatusAttributes::new();
        attributes.insert("job_state".into(), AttributeValue::Text("R".into()));
        let fake = Arc::new(FakeTorque::new().with_job("1.oak-batch", attributes));

        let jobs = batch(&fake)
            .get_jobs("", &["job_state".to_string(), "queue".to_string()])
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs["1.oak-batch"]["job_state"].as_text(), Some("R"));
        assert!(fake.calls().contains(&"stat Job  [job_state,queue]".to_string()));
    }

    #[tokio::test]
    async fn test_hold_and_release_pass_type() {
        let fake = Arc::new(FakeTorque::new());
        let b = batch(&fake);
        b.hold_job("1", HoldType::Operator).await.unwrap();
        b.release_job("1", HoldType::default()).await.unwrap();

        let calls = fake.calls();
        assert!(calls.contains(&"hold 1 o".to_string()));
        assert!(calls.contains(&"release 1 u".to_string()));
        assert_eq!(fake.count("disconnect"), 2);
    }

    #[tokio::test]
    async fn test_library_submission_attributes() {
        let fake = Arc::new(FakeTorque::new().with_submit_id(Some("42.oak-batch")));
        let options = SubmitOptions::default()
            .with_qsub(false)
            .with_queue("batch")
            .with_header("Job_Name", "x")
            .with_resource("nodes", "2:ppn=4")
            .with_envvar("A", "1")
            .with_envvar("B", "2");

        let id = batch(&fake)
            .submit_script(Path::new("/tmp/job.sh"), &options)
            .await
            .unwrap();

        assert_eq!(id, "42.oak-batch");
        assert!(fake.calls().contains(
            &"submit /tmp/job.sh batch [Job_Name=x;Resource_List.nodes=2:ppn=4;Variable_List=A=1,B=2]"
                .to_string()
        ));
    }

    #[tokio::test]
    async fn test_library_submission_without_id() {
        let fake = Arc::new(FakeTorque::new().with_submit_id(None));
        let options = SubmitOptions::default().with_qsub(false);
        let err = batch(&fake)
            .submit_string("#!/bin/bash\n", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::SubmissionFailure(_)));
    }

    #[test]
    fn test_attributes_skip_empty_collections() {
        let attributes = SubmitOptions::default().with_header("Job_Name", "x").attributes();
        assert_eq!(attributes, vec![Attribute::new("Job_Name", "x")]);
    }

    #[test]
    fn test_equality_ignores_native_layer() {
        let a = batch(&Arc::new(FakeTorque::new()));
        let b = batch(&Arc::new(FakeTorque::new().with_errno(1)));
        let c = Batch::with_api("other", "/opt/torque/lib", "/opt/torque/bin", Arc::new(FakeTorque::new()));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_qsub_binary_submission() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let qsub = bin.path().join("qsub");
        std::fs::write(
            &qsub,
            "#!/bin/sh\necho \"$PBS_DEFAULT:$LD_LIBRARY_PATH\" >&2\nfor last; do :; done\n[ -f \"$last\" ] || exit 2\necho \"7.$PBS_DEFAULT\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&qsub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fake = Arc::new(FakeTorque::new());
        let b = Batch::with_api("oak-batch", "/opt/torque/lib", bin.path(), fake.clone());
        let id = b
            .submit_string("#!/bin/bash\nhostname\n", &SubmitOptions::default().with_queue("batch"))
            .await
            .unwrap();

        assert_eq!(id, "7.oak-batch");
        assert!(fake.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_qsub_binary_failure_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let qsub = bin.path().join("qsub");
        std::fs::write(&qsub, "#!/bin/sh\necho 'qsub: Unknown queue' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&qsub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let b = Batch::with_api("oak-batch", "", bin.path(), Arc::new(FakeTorque::new()));
        let err = b
            .submit_string("#!/bin/bash\n", &SubmitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::SubmissionFailure(ref m) if m == "qsub: Unknown queue"));
    }
}
