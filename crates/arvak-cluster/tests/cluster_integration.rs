//! Cluster Integration Tests
//!
//! These tests load cluster definitions from YAML, gate features through ACLs
//! and drive job adapters end to end. Schedulers are replaced by an in-memory
//! mock adapter so no batch system is needed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arvak_cluster::config::load_cluster_configs;
use arvak_cluster::{
    AclAdapter, AclFactory, AdapterConfig, Cluster, ClusterConfig, ClusterError, ClusterResult,
    Clusters, FeatureConfig, JobAdapter, JobFactory, JobInfo, JobState, Script,
};
use async_trait::async_trait;
use serde::Deserialize;

/// ACL whose answer comes straight from configuration.
struct FixedAcl(bool);

#[derive(Deserialize)]
struct FixedAclConfig {
    allow: bool,
}

impl AclAdapter for FixedAcl {
    fn allow(&self) -> bool {
        self.0
    }
}

/// Scheduler kept in memory.
#[derive(Default)]
struct MockScheduler {
    jobs: Mutex<BTreeMap<String, JobState>>,
}

#[async_trait]
impl JobAdapter for MockScheduler {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, _script: &Script) -> ClusterResult<String> {
        let mut jobs = self.jobs.lock().unwrap();
        let id = format!("{}.mock", jobs.len() + 1);
        jobs.insert(id.clone(), JobState::Queued);
        Ok(id)
    }

    async fn info_all(&self) -> ClusterResult<Vec<JobInfo>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, state)| JobInfo::new(id.as_str(), *state))
            .collect())
    }

    async fn info(&self, id: &str) -> ClusterResult<JobInfo> {
        Ok(match self.jobs.lock().unwrap().get(id) {
            Some(state) => JobInfo::new(id, *state),
            None => JobInfo::completed(id),
        })
    }

    async fn hold(&self, id: &str) -> ClusterResult<()> {
        self.set(id, JobState::QueuedHeld)
    }

    async fn release(&self, id: &str) -> ClusterResult<()> {
        self.set(id, JobState::Queued)
    }

    async fn delete(&self, id: &str) -> ClusterResult<()> {
        self.jobs.lock().unwrap().remove(id);
        Ok(())
    }
}

impl MockScheduler {
    fn set(&self, id: &str, state: JobState) -> ClusterResult<()> {
        match self.jobs.lock().unwrap().get_mut(id) {
            Some(s) => {
                *s = state;
                Ok(())
            }
            None => Err(ClusterError::JobNotFound(id.to_string())),
        }
    }
}

fn acl_factory() -> Arc<AclFactory> {
    let mut factory = AclFactory::new("acl");
    factory.register_factory("fixed", |config: &AdapterConfig| {
        let config: FixedAclConfig = config.decode()?;
        Ok(Box::new(FixedAcl(config.allow)) as Box<dyn AclAdapter>)
    });
    Arc::new(factory)
}

fn job_factory(scheduler: Arc<MockScheduler>) -> Arc<JobFactory> {
    struct Shared(Arc<MockScheduler>);

    #[async_trait]
    impl JobAdapter for Shared {
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn submit(&self, script: &Script) -> ClusterResult<String> {
            self.0.submit(script).await
        }
        async fn info_all(&self) -> ClusterResult<Vec<JobInfo>> {
            self.0.info_all().await
        }
        async fn info(&self, id: &str) -> ClusterResult<JobInfo> {
            self.0.info(id).await
        }
        async fn hold(&self, id: &str) -> ClusterResult<()> {
            self.0.hold(id).await
        }
        async fn release(&self, id: &str) -> ClusterResult<()> {
            self.0.release(id).await
        }
        async fn delete(&self, id: &str) -> ClusterResult<()> {
            self.0.delete(id).await
        }
    }

    let mut factory = JobFactory::new("job");
    factory.register_factory("mock", move |_config: &AdapterConfig| {
        Ok(Box::new(Shared(scheduler.clone())) as Box<dyn JobAdapter>)
    });
    Arc::new(factory)
}

const OPEN: &str = r#"
metadata:
  title: Open Cluster
login:
  host: open.example.edu
job:
  adapter: mock
"#;

const JOB_DENIED: &str = r#"
login:
  host: locked.example.edu
job:
  adapter: mock
  acls:
    - adapter: fixed
      allow: false
"#;

const CLOSED: &str = r#"
job:
  adapter: mock
acls:
  - adapter: fixed
    allow: true
  - adapter: fixed
    allow: false
"#;

fn load(scheduler: Arc<MockScheduler>) -> Clusters {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("open.yml"), OPEN).unwrap();
    std::fs::write(dir.path().join("locked.yaml"), JOB_DENIED).unwrap();
    std::fs::write(dir.path().join("closed.yml"), CLOSED).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a cluster").unwrap();

    let configs = load_cluster_configs(dir.path()).unwrap();
    Clusters::from_configs(configs, acl_factory(), job_factory(scheduler)).unwrap()
}

#[test]
fn test_load_directory() {
    let clusters = load(Arc::new(MockScheduler::default()));

    assert_eq!(clusters.len(), 3);
    let ids: Vec<&str> = clusters.iter().map(Cluster::id).collect();
    assert_eq!(ids, vec!["closed", "locked", "open"]);
    assert_eq!(clusters.get("open").unwrap().title(), "Open Cluster");
    assert_eq!(clusters.get("locked").unwrap().title(), "locked");
}

#[test]
fn test_acl_gating() {
    let clusters = load(Arc::new(MockScheduler::default()));

    let open = clusters.get("open").unwrap();
    assert!(open.allow().unwrap());
    assert!(open.login_allow().unwrap());
    assert!(open.job_allow().unwrap());

    let locked = clusters.get("locked").unwrap();
    assert!(locked.allow().unwrap());
    assert!(locked.login_allow().unwrap());
    assert!(!locked.job_allow().unwrap());

    let closed = clusters.get("closed").unwrap();
    assert!(!closed.allow().unwrap());
    assert!(!closed.login_allow().unwrap());
    assert!(!closed.job_allow().unwrap());

    let allowed: Vec<&str> = clusters.allowed().unwrap().into_iter().map(Cluster::id).collect();
    assert_eq!(allowed, vec!["locked", "open"]);
}

#[tokio::test]
async fn test_job_lifecycle_through_cluster() {
    let scheduler = Arc::new(MockScheduler::default());
    let clusters = load(scheduler.clone());
    let cluster = clusters.get("open").unwrap();
    assert!(cluster.job_allow().unwrap());

    let adapter = cluster.job_adapter().unwrap();
    let id = adapter
        .submit(&Script::new("#!/bin/bash\nhostname\n").with_job_name("hello"))
        .await
        .unwrap();
    assert_eq!(adapter.status(&id).await.unwrap(), JobState::Queued);

    adapter.hold(&id).await.unwrap();
    // A freshly built adapter sees the same scheduler state.
    let again = cluster.job_adapter().unwrap();
    assert_eq!(again.status(&id).await.unwrap(), JobState::QueuedHeld);

    again.release(&id).await.unwrap();
    assert_eq!(again.info_all().await.unwrap().len(), 1);

    again.delete(&id).await.unwrap();
    assert_eq!(again.status(&id).await.unwrap(), JobState::Completed);
    assert!(scheduler.jobs.lock().unwrap().is_empty());
}

#[test]
fn test_unknown_acl_adapter_is_an_error() {
    let config = ClusterConfig::new("bad").with_acl(AdapterConfig::new("ldap"));
    let cluster = Cluster::with_factories(
        config,
        acl_factory(),
        job_factory(Arc::new(MockScheduler::default())),
    )
    .unwrap();

    assert!(matches!(cluster.allow(), Err(ClusterError::AdapterNotFound(_))));
}

#[test]
fn test_missing_acl_discriminator_is_an_error() {
    let mut acl = AdapterConfig::new("fixed").with_option("allow", true);
    acl.adapter = None;
    let config = ClusterConfig::new("bad").with_job(FeatureConfig::new("mock").with_acl(acl));
    let cluster = Cluster::with_factories(
        config,
        acl_factory(),
        job_factory(Arc::new(MockScheduler::default())),
    )
    .unwrap();

    assert!(matches!(cluster.job_allow(), Err(ClusterError::AdapterNotSpecified(_))));
}

#[test]
fn test_round_trip_through_yaml() {
    let clusters = load(Arc::new(MockScheduler::default()));
    for cluster in clusters.iter() {
        let yaml = serde_yaml_ng::to_string(&cluster.to_config()).unwrap();
        let rebuilt = Cluster::with_factories(
            ClusterConfig::from_yaml_str(&yaml, None).unwrap(),
            acl_factory(),
            job_factory(Arc::new(MockScheduler::default())),
        )
        .unwrap();

        assert_eq!(&rebuilt, cluster);
        assert_eq!(rebuilt.to_config(), cluster.to_config());
    }
}

#[test]
fn test_builtin_lsf_adapter_from_yaml() {
    let config = ClusterConfig::from_yaml_str(
        "job:\n  adapter: lsf\n  bindir: /opt/lsf/bin\n  cluster: c1\n",
        Some("lsf"),
    )
    .unwrap();
    let cluster = Cluster::new(config).unwrap();

    assert!(cluster.job_allow().unwrap());
    assert_eq!(cluster.job_adapter().unwrap().name(), "lsf");
}
