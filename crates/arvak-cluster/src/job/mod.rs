//! The uniform job-control contract.
//!
//! Every scheduler family implements [`JobAdapter`]:
//!
//! | Method | Returns |
//! |--------|---------|
//! | `name()` | adapter name |
//! | `submit()` | scheduler job id |
//! | `info_all()` | every job the scheduler reports |
//! | `info()` | one job |
//! | `status()` | state of one job (provided) |
//! | `hold()` / `release()` | `()` |
//! | `delete()` | `()` |
//!
//! Adapters hold no job state; every query goes back to the scheduler.

mod info;
mod script;

pub use info::{JobInfo, JobState, NodeInfo};
pub use script::{Script, format_hms, parse_hms};

use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::registry::AdapterRegistry;

/// Trait for batch scheduler adapters.
#[async_trait]
pub trait JobAdapter: Send + Sync {
    /// Registered adapter name.
    fn name(&self) -> &str;

    /// Submit a script, returning the scheduler job id.
    async fn submit(&self, script: &Script) -> ClusterResult<String>;

    /// Information about every job on the scheduler.
    async fn info_all(&self) -> ClusterResult<Vec<JobInfo>>;

    /// Information about one job.
    async fn info(&self, id: &str) -> ClusterResult<JobInfo>;

    /// State of one job.
    async fn status(&self, id: &str) -> ClusterResult<JobState> {
        Ok(self.info(id).await?.status)
    }

    /// Put a job on hold.
    async fn hold(&self, id: &str) -> ClusterResult<()>;

    /// Release a held job.
    async fn release(&self, id: &str) -> ClusterResult<()>;

    /// Remove a job from the scheduler.
    async fn delete(&self, id: &str) -> ClusterResult<()>;
}

/// Registry resolving job configurations to adapters.
pub type JobFactory = AdapterRegistry<dyn JobAdapter>;

impl AdapterRegistry<dyn JobAdapter> {
    /// Create a factory with all built-in job adapters registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("job");

        #[cfg(feature = "native-torque")]
        registry.register_factory("torque", |config| {
            Ok(Box::new(crate::pbs::TorqueAdapter::from_config(config)?) as Box<dyn JobAdapter>)
        });
        #[cfg(not(feature = "native-torque"))]
        registry.register_unavailable(
            "torque",
            "this build does not include the `native-torque` feature",
        );

        registry.register_factory("lsf", |config| {
            Ok(Box::new(crate::lsf::LsfAdapter::from_config(config)?) as Box<dyn JobAdapter>)
        });

        registry
    }
}

impl Default for AdapterRegistry<dyn JobAdapter> {
    fn default() -> Self {
        Self::with_builtins()
    }
}
