//! Access control adapters.
//!
//! An ACL adapter answers one question: is the current user allowed? ACLs are
//! built from configuration on every evaluation by the [`AclFactory`], and a
//! list of them combines with logical AND.

mod group;

pub use group::{GroupAcl, GroupAclConfig, ListKind};

use crate::config::AdapterConfig;
use crate::error::ClusterResult;
use crate::registry::AdapterRegistry;

/// A single authorization predicate built from configuration.
pub trait AclAdapter: Send + Sync {
    /// Whether access is allowed.
    fn allow(&self) -> bool;
}

/// Registry resolving ACL configurations to adapters.
pub type AclFactory = AdapterRegistry<dyn AclAdapter>;

impl AdapterRegistry<dyn AclAdapter> {
    /// Create a factory with all built-in ACL adapters registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("acl");

        #[cfg(unix)]
        registry.register_factory("group", |config| {
            Ok(Box::new(GroupAcl::from_config(config)?) as Box<dyn AclAdapter>)
        });
        #[cfg(not(unix))]
        registry.register_unavailable("group", "group membership lookup requires a unix host");

        registry
    }
}

impl Default for AdapterRegistry<dyn AclAdapter> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Build every ACL in `configs` and check that all of them allow.
///
/// Every configuration is built before any is evaluated, so a broken entry
/// anywhere in the list is reported rather than hidden behind an earlier
/// denial.
pub fn all_allow(factory: &AclFactory, configs: &[AdapterConfig]) -> ClusterResult<bool> {
    let acls = configs
        .iter()
        .map(|config| factory.build(config))
        .collect::<ClusterResult<Vec<_>>>()?;
    Ok(acls.iter().all(|acl| acl.allow()))
}
