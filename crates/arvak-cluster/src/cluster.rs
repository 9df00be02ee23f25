//! The cluster aggregate.
//!
//! A [`Cluster`] bundles one cluster's configuration and answers which of its
//! features the current user may use. Nothing is cached: every predicate and
//! accessor builds fresh adapters from the stored configuration, so a
//! configuration change means constructing a new `Cluster`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::acl::{self, AclAdapter, AclFactory};
use crate::config::{AdapterConfig, ClusterConfig, FeatureConfig, load_cluster_configs};
use crate::error::{ClusterError, ClusterResult};
use crate::job::{JobAdapter, JobFactory};

/// One cluster and its features.
#[derive(Clone)]
pub struct Cluster {
    config: ClusterConfig,
    acl_factory: Arc<AclFactory>,
    job_factory: Arc<JobFactory>,
}

impl Cluster {
    /// Create a cluster using the built-in ACL and job adapters.
    pub fn new(config: ClusterConfig) -> ClusterResult<Self> {
        Self::with_factories(
            config,
            Arc::new(AclFactory::with_builtins()),
            Arc::new(JobFactory::with_builtins()),
        )
    }

    /// Create a cluster resolving adapters through the given factories.
    pub fn with_factories(
        config: ClusterConfig,
        acl_factory: Arc<AclFactory>,
        job_factory: Arc<JobFactory>,
    ) -> ClusterResult<Self> {
        if config.id.trim().is_empty() {
            return Err(ClusterError::Config(
                "No id specified. Missing argument: id".into(),
            ));
        }

        Ok(Self {
            config,
            acl_factory,
            job_factory,
        })
    }

    /// The unique cluster id.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Descriptive metadata.
    pub fn metadata_config(&self) -> &Map<String, Value> {
        &self.config.metadata
    }

    /// The human-readable title, falling back to the id.
    pub fn title(&self) -> &str {
        self.config
            .metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.id)
    }

    /// Login configuration.
    pub fn login_config(&self) -> &Map<String, Value> {
        &self.config.login
    }

    /// The login host, if configured.
    pub fn login_host(&self) -> Option<&str> {
        self.config.login.get("host").and_then(Value::as_str)
    }

    /// Job adapter configuration.
    pub fn job_config(&self) -> &FeatureConfig {
        &self.config.job
    }

    /// Cluster-wide ACL configuration.
    pub fn acls_config(&self) -> &[AdapterConfig] {
        &self.config.acls
    }

    /// All custom feature configurations.
    pub fn custom_configs(&self) -> &BTreeMap<String, FeatureConfig> {
        &self.config.custom
    }

    /// Configuration of one custom feature; empty if it is not configured.
    pub fn custom_config(&self, feature: &str) -> FeatureConfig {
        self.config.custom.get(feature).cloned().unwrap_or_default()
    }

    /// Build the cluster-wide ACL adapters.
    pub fn acls(&self) -> ClusterResult<Vec<Box<dyn AclAdapter>>> {
        self.config
            .acls
            .iter()
            .map(|config| self.acl_factory.build(config))
            .collect()
    }

    /// Whether the cluster may be used at all.
    pub fn allow(&self) -> ClusterResult<bool> {
        acl::all_allow(&self.acl_factory, &self.config.acls)
    }

    /// Whether the login feature may be used.
    pub fn login_allow(&self) -> ClusterResult<bool> {
        Ok(self.allow()? && !self.config.login.is_empty())
    }

    /// Whether the job feature may be used.
    pub fn job_allow(&self) -> ClusterResult<bool> {
        self.feature_allow(&self.config.job)
    }

    /// Whether a custom feature may be used.
    pub fn custom_allow(&self, feature: &str) -> ClusterResult<bool> {
        self.feature_allow(&self.custom_config(feature))
    }

    fn feature_allow(&self, feature: &FeatureConfig) -> ClusterResult<bool> {
        if !self.allow()? || feature.is_empty() {
            return Ok(false);
        }
        acl::all_allow(&self.acl_factory, &feature.acls)
    }

    /// Build a job adapter from the job configuration.
    pub fn job_adapter(&self) -> ClusterResult<Box<dyn JobAdapter>> {
        debug!(
            "Building job adapter {:?} for cluster {}",
            self.config.job.adapter, self.config.id
        );
        self.job_factory.build(&self.config.job.adapter_config())
    }

    /// The complete configuration this cluster was built from.
    pub fn to_config(&self) -> ClusterConfig {
        self.config.clone()
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.config.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Clusters compare by id only; compare [`Cluster::to_config`] for full
/// structural equality.
impl PartialEq for Cluster {
    fn eq(&self, other: &Self) -> bool {
        self.config.id == other.config.id
    }
}

impl Eq for Cluster {}

impl PartialEq<str> for Cluster {
    fn eq(&self, other: &str) -> bool {
        self.config.id == other
    }
}

impl PartialEq<&str> for Cluster {
    fn eq(&self, other: &&str) -> bool {
        self.config.id == *other
    }
}

impl std::hash::Hash for Cluster {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.config.id.hash(state);
    }
}

/// A set of clusters keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Clusters {
    clusters: BTreeMap<String, Cluster>,
}

impl Clusters {
    /// Build a set from configurations. Duplicate ids are rejected.
    pub fn from_configs(
        configs: impl IntoIterator<Item = ClusterConfig>,
        acl_factory: Arc<AclFactory>,
        job_factory: Arc<JobFactory>,
    ) -> ClusterResult<Self> {
        let mut clusters = BTreeMap::new();
        for config in configs {
            let cluster =
                Cluster::with_factories(config, acl_factory.clone(), job_factory.clone())?;
            if clusters.contains_key(cluster.id()) {
                return Err(ClusterError::Config(format!(
                    "duplicate cluster id: {}",
                    cluster.id()
                )));
            }
            clusters.insert(cluster.id().to_string(), cluster);
        }
        Ok(Self { clusters })
    }

    /// Load clusters from a directory or file with the built-in adapters.
    pub fn load(path: &Path) -> ClusterResult<Self> {
        Self::from_configs(
            load_cluster_configs(path)?,
            Arc::new(AclFactory::with_builtins()),
            Arc::new(JobFactory::with_builtins()),
        )
    }

    /// Look up a cluster by id.
    pub fn get(&self, id: &str) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    /// Iterate over clusters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Clusters whose cluster-wide ACLs allow access.
    pub fn allowed(&self) -> ClusterResult<Vec<&Cluster>> {
        let mut allowed = Vec::new();
        for cluster in self.clusters.values() {
            if cluster.allow()? {
                allowed.push(cluster);
            }
        }
        Ok(allowed)
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
