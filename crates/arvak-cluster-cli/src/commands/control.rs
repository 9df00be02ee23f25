//! Hold, release and delete commands.

use std::path::Path;

use anyhow::Result;
use console::style;

use arvak_cluster::JobAdapter;

use super::common::{job_cluster, load_clusters};

/// Job control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold,
    Release,
    Delete,
}

impl Action {
    fn past_tense(self) -> &'static str {
        match self {
            Action::Hold => "held",
            Action::Release => "released",
            Action::Delete => "deleted",
        }
    }

    async fn apply(self, adapter: &dyn JobAdapter, id: &str) -> arvak_cluster::ClusterResult<()> {
        match self {
            Action::Hold => adapter.hold(id).await,
            Action::Release => adapter.release(id).await,
            Action::Delete => adapter.delete(id).await,
        }
    }
}

/// Execute a job control command.
pub async fn execute(
    config: Option<&Path>,
    cluster_id: &str,
    job_id: &str,
    action: Action,
) -> Result<()> {
    let clusters = load_clusters(config)?;
    let adapter = job_cluster(&clusters, cluster_id)?.job_adapter()?;

    action.apply(adapter.as_ref(), job_id).await?;
    println!(
        "{} Job {} {}",
        style("✓").green().bold(),
        style(job_id).bold(),
        action.past_tense()
    );

    Ok(())
}
