//! Cluster configuration.
//!
//! Configuration arrives as loosely structured YAML. It is decoded once into
//! the structs below; adapter-specific options stay as a JSON map until the
//! adapter that owns them decodes them into its own typed config with
//! [`AdapterConfig::decode`].
//!
//! ```yaml
//! # clusters.d/owens.yml
//! metadata:
//!   title: Owens
//! login:
//!   host: owens.example.edu
//! job:
//!   adapter: torque
//!   host: owens-batch.example.edu
//!   lib: /opt/torque/lib64
//!   bin: /opt/torque/bin
//!   acls:
//!     - adapter: group
//!       groups: [hpcusers]
//! acls:
//!   - adapter: group
//!     groups: [banned]
//!     type: blacklist
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

/// Configuration for a single pluggable adapter (ACL or job).
///
/// `adapter` names the implementation; everything else is handed to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Registered adapter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Adapter-specific options.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl AdapterConfig {
    /// Create a configuration for the named adapter.
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
            options: Map::new(),
        }
    }

    /// Add an adapter option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Decode the adapter options into a typed configuration.
    pub fn decode<T: DeserializeOwned>(&self) -> ClusterResult<T> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|e| {
            ClusterError::Config(format!(
                "invalid options for '{}' adapter: {e}",
                self.adapter.as_deref().unwrap_or("unnamed")
            ))
        })
    }
}

/// Configuration of a cluster feature (the job feature or a custom one).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Adapter backing this feature, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// ACLs that must all allow before the feature is usable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<AdapterConfig>,
    /// Feature-specific options.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl FeatureConfig {
    /// Create a feature configuration backed by the named adapter.
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
            ..Self::default()
        }
    }

    /// Add a feature option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Add an ACL to the feature.
    pub fn with_acl(mut self, acl: AdapterConfig) -> Self {
        self.acls.push(acl);
        self
    }

    /// Whether nothing at all is configured.
    pub fn is_empty(&self) -> bool {
        self.adapter.is_none() && self.acls.is_empty() && self.options.is_empty()
    }

    /// The adapter portion of this feature (discriminator plus options).
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            adapter: self.adapter.clone(),
            options: self.options.clone(),
        }
    }
}

/// Complete description of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique cluster id.
    pub id: String,
    /// Free-form descriptive metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Login host configuration.
    #[serde(default)]
    pub login: Map<String, Value>,
    /// Job adapter configuration.
    #[serde(default)]
    pub job: FeatureConfig,
    /// Custom features keyed by name.
    #[serde(default)]
    pub custom: BTreeMap<String, FeatureConfig>,
    /// Cluster-wide ACLs.
    #[serde(default)]
    pub acls: Vec<AdapterConfig>,
}

impl ClusterConfig {
    /// Create an otherwise empty configuration with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the job feature.
    pub fn with_job(mut self, job: FeatureConfig) -> Self {
        self.job = job;
        self
    }

    /// Set a login option.
    pub fn with_login(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.login.insert(key.into(), value.into());
        self
    }

    /// Set a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a custom feature.
    pub fn with_custom(mut self, feature: impl Into<String>, config: FeatureConfig) -> Self {
        self.custom.insert(feature.into(), config);
        self
    }

    /// Add a cluster-wide ACL.
    pub fn with_acl(mut self, acl: AdapterConfig) -> Self {
        self.acls.push(acl);
        self
    }

    /// Parse a single cluster from YAML.
    ///
    /// `default_id` is used when the document carries no `id` of its own.
    pub fn from_yaml_str(source: &str, default_id: Option<&str>) -> ClusterResult<Self> {
        let mut value: serde_yaml_ng::Value = serde_yaml_ng::from_str(source)?;
        if value.is_null() {
            value = serde_yaml_ng::Value::Mapping(serde_yaml_ng::Mapping::new());
        }
        insert_default_id(&mut value, default_id)?;
        Ok(serde_yaml_ng::from_value(value)?)
    }
}

fn insert_default_id(value: &mut serde_yaml_ng::Value, default_id: Option<&str>) -> ClusterResult<()> {
    let mapping = value
        .as_mapping_mut()
        .ok_or_else(|| ClusterError::Config("cluster configuration must be a mapping".into()))?;

    let key = serde_yaml_ng::Value::String("id".into());
    if !mapping.contains_key(&key) {
        if let Some(id) = default_id {
            mapping.insert(key, serde_yaml_ng::Value::String(id.to_string()));
        }
    }
    Ok(())
}

/// Load cluster configurations from a path.
///
/// A directory is read as one cluster per `*.yml`/`*.yaml` file, the file
/// stem serving as the default id. A single file maps cluster ids to their
/// configurations. A path that does not exist yields no clusters.
pub fn load_cluster_configs(path: &Path) -> ClusterResult<Vec<ClusterConfig>> {
    if !path.exists() {
        debug!("Cluster configuration path does not exist: {}", path.display());
        return Ok(Vec::new());
    }

    if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yml") | Some("yaml")
                    )
            })
            .collect();
        files.sort();

        let mut configs = Vec::with_capacity(files.len());
        for file in files {
            let stem = file.file_stem().and_then(|s| s.to_str());
            let source = std::fs::read_to_string(&file)?;
            let config = ClusterConfig::from_yaml_str(&source, stem).map_err(|e| {
                ClusterError::Config(format!("{}: {e}", file.display()))
            })?;
            debug!("Loaded cluster '{}' from {}", config.id, file.display());
            configs.push(config);
        }
        return Ok(configs);
    }

    let source = std::fs::read_to_string(path)?;
    let documents: BTreeMap<String, serde_yaml_ng::Value> = serde_yaml_ng::from_str(&source)?;
    let mut configs = Vec::with_capacity(documents.len());
    for (id, mut value) in documents {
        if value.is_null() {
            value = serde_yaml_ng::Value::Mapping(serde_yaml_ng::Mapping::new());
        }
        insert_default_id(&mut value, Some(&id))?;
        configs.push(serde_yaml_ng::from_value(value)?);
    }
    Ok(configs)
}
