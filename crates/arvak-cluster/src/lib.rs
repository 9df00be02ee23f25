//! Arvak Cluster Access
//!
//! This crate describes HPC clusters from configuration and gives uniform,
//! access-controlled entry points to their batch schedulers.
//!
//! # Overview
//!
//! - A [`Cluster`] holds one cluster's configuration: metadata, login node,
//!   job scheduler, custom features and access control lists.
//! - [`AclAdapter`]s decide whether the current user may use the cluster or
//!   one of its features. Lists of ACLs combine with logical AND; an empty
//!   list allows everything.
//! - [`JobAdapter`]s submit, query, hold, release and delete jobs on one
//!   scheduler family.
//! - Adapters are looked up by the `adapter` key of their configuration in an
//!   [`AdapterRegistry`] ([`AclFactory`], [`JobFactory`]).
//!
//! # Supported Adapters
//!
//! | Kind | Name | Module | Notes |
//! |------|------|--------|-------|
//! | ACL | `group` | [`acl`] | Unix group white/blacklist |
//! | Job | `torque` | [`pbs`] | `libtorque` + `qsub`, feature `native-torque` |
//! | Job | `lsf` | [`lsf`] | `bjobs`/`bsub`/`bkill` command-line tools |
//!
//! # Example
//!
//! ```ignore
//! use arvak_cluster::{Cluster, ClusterConfig, FeatureConfig, Script};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClusterConfig::new("owens").with_job(
//!         FeatureConfig::new("torque").with_option("host", "owens-batch.osc.edu"),
//!     );
//!     let cluster = Cluster::new(config)?;
//!
//!     if cluster.job_allow()? {
//!         let adapter = cluster.job_adapter()?;
//!         let id = adapter.submit(&Script::new("#!/bin/bash\nhostname\n")).await?;
//!         println!("{}: {}", id, adapter.status(&id).await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod cluster;
pub mod config;
pub mod error;
pub mod job;
pub mod lsf;
pub mod pbs;
pub mod registry;

pub use acl::{AclAdapter, AclFactory, GroupAcl, GroupAclConfig, ListKind};
pub use cluster::{Cluster, Clusters};
pub use config::{AdapterConfig, ClusterConfig, FeatureConfig};
pub use error::{ClusterError, ClusterResult};
pub use job::{
    JobAdapter, JobFactory, JobInfo, JobState, NodeInfo, Script, format_hms, parse_hms,
};
pub use lsf::{LsfAdapter, LsfConfig};
pub use pbs::{Batch, HoldType, SubmitOptions, TorqueAdapter, TorqueConfig};
pub use registry::AdapterRegistry;
