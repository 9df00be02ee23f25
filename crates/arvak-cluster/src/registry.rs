//! Adapter registries.
//!
//! An [`AdapterRegistry`] maps the `adapter` discriminator of an
//! [`AdapterConfig`] to a builder producing a trait object. The same registry
//! type backs both the ACL factory and the job factory.
//!
//! The set of adapters is closed at compile time. An adapter whose
//! implementation was compiled out (or whose dependency is otherwise
//! unusable) can still be registered as *unavailable*, so that configuring
//! it reports an [`AdapterLoadFailure`](ClusterError::AdapterLoadFailure)
//! instead of looking like a typo.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::AdapterConfig;
use crate::error::{ClusterError, ClusterResult};

/// Builder function type for registered adapters.
type Builder<A> = Box<dyn Fn(&AdapterConfig) -> ClusterResult<Box<A>> + Send + Sync>;

enum Entry<A: ?Sized> {
    Builtin(Builder<A>),
    Unavailable(String),
}

/// Registry of adapter builders keyed by name.
pub struct AdapterRegistry<A: ?Sized> {
    /// What kind of adapter this registry builds ("acl", "job").
    kind: &'static str,
    entries: FxHashMap<String, Entry<A>>,
}

impl<A: ?Sized> AdapterRegistry<A> {
    /// Create a new empty registry.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: FxHashMap::default(),
        }
    }

    /// The kind of adapter this registry builds.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register an adapter builder.
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&AdapterConfig) -> ClusterResult<Box<A>> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!("Registering {} adapter: {}", self.kind, name);
        self.entries.insert(name, Entry::Builtin(Box::new(factory)));
    }

    /// Register a known adapter that cannot be built in this build.
    pub fn register_unavailable(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        let name = name.into();
        debug!("Registering unavailable {} adapter: {}", self.kind, name);
        self.entries.insert(name, Entry::Unavailable(reason.into()));
    }

    /// Build an adapter from its configuration.
    pub fn build(&self, config: &AdapterConfig) -> ClusterResult<Box<A>> {
        let name = config.adapter.as_deref().ok_or_else(|| {
            ClusterError::AdapterNotSpecified(format!(
                "{} configuration does not specify adapter",
                self.kind
            ))
        })?;

        match self.entries.get(name) {
            Some(Entry::Builtin(factory)) => factory(config),
            Some(Entry::Unavailable(reason)) => Err(ClusterError::AdapterLoadFailure {
                adapter: name.to_string(),
                reason: format!("specified for {} adapter, but {reason}", self.kind),
            }),
            None => Err(ClusterError::AdapterNotFound(format!(
                "{} configuration specifies nonexistent {name} adapter",
                self.kind
            ))),
        }
    }

    /// List all buildable adapter names.
    pub fn available_adapters(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Builtin(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Known adapters that cannot be built, with the reason.
    pub fn unavailable_adapters(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                Entry::Unavailable(reason) => Some((name.clone(), reason.clone())),
                Entry::Builtin(_) => None,
            })
            .collect();
        entries.sort();
        entries
    }

    /// Check if an adapter is buildable by name.
    pub fn has_adapter(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Entry::Builtin(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Fixed(String);

    impl Named for Fixed {
        fn name(&self) -> String {
            self.0.clone()
        }
    }

    fn registry() -> AdapterRegistry<dyn Named> {
        let mut registry: AdapterRegistry<dyn Named> = AdapterRegistry::new("test");
        registry.register_factory("fixed", |config| {
            let label = config
                .options
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or("default")
                .to_string();
            Ok(Box::new(Fixed(label)) as Box<dyn Named>)
        });
        registry
    }

    #[test]
    fn test_empty_registry() {
        let registry: AdapterRegistry<dyn Named> = AdapterRegistry::new("test");
        assert!(registry.available_adapters().is_empty());
        assert!(!registry.has_adapter("fixed"));
    }

    #[test]
    fn test_build_passes_full_config() {
        let adapter = registry()
            .build(&AdapterConfig::new("fixed").with_option("label", "hello"))
            .unwrap();
        assert_eq!(adapter.name(), "hello");
    }

    #[test]
    fn test_build_without_adapter() {
        let err = registry().build(&AdapterConfig::default()).err().unwrap();
        assert!(matches!(err, ClusterError::AdapterNotSpecified(_)));
        assert!(err.to_string().contains("test configuration does not specify adapter"));
    }

    #[test]
    fn test_build_unknown_adapter() {
        let err = registry().build(&AdapterConfig::new("ldap")).err().unwrap();
        assert!(matches!(err, ClusterError::AdapterNotFound(_)));
        assert!(err.to_string().contains("nonexistent ldap adapter"));
    }

    #[test]
    fn test_build_unavailable_adapter() {
        let mut registry = registry();
        registry.register_unavailable("native", "it was compiled out");

        let err = registry.build(&AdapterConfig::new("native")).err().unwrap();
        assert!(matches!(err, ClusterError::AdapterLoadFailure { .. }));
        assert!(!registry.has_adapter("native"));
        assert_eq!(registry.available_adapters(), vec!["fixed"]);
        assert_eq!(
            registry.unavailable_adapters(),
            vec![("native".to_string(), "it was compiled out".to_string())]
        );
    }

    #[test]
    fn test_available_adapters_sorted() {
        let mut registry = registry();
        registry.register_factory("alpha", |_| Ok(Box::new(Fixed("a".into())) as Box<dyn Named>));
        assert_eq!(registry.available_adapters(), vec!["alpha", "fixed"]);
    }
}
