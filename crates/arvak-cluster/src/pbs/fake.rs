//! In-memory [`TorqueApi`] used by tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use super::native::{
    Attribute, ConnectionId, HoldType, PBSE_NONE, PBSE_UNKJOBID, StatScope, StatusAttributes,
    StatusMap, TorqueApi,
};
use crate::error::ClusterResult;

pub(crate) struct FakeTorque {
    connect_result: ConnectionId,
    op_errno: i32,
    jobs: StatusMap,
    submit_id: Option<String>,
    errno: AtomicI32,
    calls: Mutex<Vec<String>>,
}

impl FakeTorque {
    pub(crate) fn new() -> Self {
        Self {
            connect_result: 3,
            op_errno: PBSE_NONE,
            jobs: StatusMap::new(),
            submit_id: Some("1.torque".to_string()),
            errno: AtomicI32::new(PBSE_NONE),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_connect_result(mut self, cid: ConnectionId) -> Self {
        self.connect_result = cid;
        self
    }

    /// Every operation leaves this code in `errno`.
    pub(crate) fn with_errno(mut self, code: i32) -> Self {
        self.op_errno = code;
        self
    }

    pub(crate) fn with_job(mut self, id: &str, attributes: StatusAttributes) -> Self {
        self.jobs.insert(id.to_string(), attributes);
        self
    }

    pub(crate) fn with_submit_id(mut self, id: Option<&str>) -> Self {
        self.submit_id = id.map(str::to_string);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn finish_op(&self) {
        self.errno.store(self.op_errno, Ordering::SeqCst);
    }
}

impl TorqueApi for FakeTorque {
    fn connect(&self, host: &str) -> ClusterResult<ConnectionId> {
        self.record(format!("connect {host}"));
        self.errno.store(PBSE_NONE, Ordering::SeqCst);
        Ok(self.connect_result)
    }

    fn disconnect(&self, cid: ConnectionId) -> ClusterResult<()> {
        self.record(format!("disconnect {cid}"));
        Ok(())
    }

    fn stat(
        &self,
        _cid: ConnectionId,
        scope: StatScope,
        id: &str,
        filters: &[String],
    ) -> ClusterResult<StatusMap> {
        self.record(format!("stat {scope:?} {id} [{}]", filters.join(",")));
        self.finish_op();
        if scope != StatScope::Job {
            return Ok(StatusMap::new());
        }
        if id.is_empty() {
            return Ok(self.jobs.clone());
        }
        match self.jobs.get(id) {
            Some(attributes) => Ok(StatusMap::from([(id.to_string(), attributes.clone())])),
            None => {
                self.errno.store(PBSE_UNKJOBID, Ordering::SeqCst);
                Ok(StatusMap::new())
            }
        }
    }

    fn submit(
        &self,
        _cid: ConnectionId,
        attributes: &[Attribute],
        script: &str,
        queue: &str,
    ) -> ClusterResult<Option<String>> {
        let attributes: Vec<String> = attributes
            .iter()
            .map(|a| match &a.resource {
                Some(r) => format!("{}.{}={}", a.name, r, a.value),
                None => format!("{}={}", a.name, a.value),
            })
            .collect();
        self.record(format!("submit {script} {queue} [{}]", attributes.join(";")));
        self.finish_op();
        Ok(self.submit_id.clone())
    }

    fn hold(&self, _cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()> {
        self.record(format!("hold {id} {}", hold.as_str()));
        self.finish_op();
        Ok(())
    }

    fn release(&self, _cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()> {
        self.record(format!("release {id} {}", hold.as_str()));
        self.finish_op();
        Ok(())
    }

    fn delete(&self, _cid: ConnectionId, id: &str) -> ClusterResult<()> {
        self.record(format!("delete {id}"));
        self.finish_op();
        Ok(())
    }

    fn errno(&self) -> i32 {
        self.errno.load(Ordering::SeqCst)
    }

    fn strerror(&self, code: i32) -> String {
        match code {
            PBSE_UNKJOBID => "Unknown Job Id".to_string(),
            15033 => "No permission".to_string(),
            _ => format!("error {code}"),
        }
    }
}
