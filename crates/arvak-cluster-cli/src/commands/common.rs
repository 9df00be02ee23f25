//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use arvak_cluster::{Cluster, Clusters, JobState};

/// Cluster configuration location: `--config` / `ARVAK_CLUSTERS`, else
/// `~/.arvak/clusters.d`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".arvak").join("clusters.d"))
}

/// Load every configured cluster.
pub fn load_clusters(explicit: Option<&Path>) -> Result<Clusters> {
    let path = config_path(explicit)?;
    if !path.exists() {
        anyhow::bail!(
            "Cluster configuration not found: {} (use --config or ARVAK_CLUSTERS)",
            path.display()
        );
    }
    tracing::debug!("Loading clusters from {}", path.display());
    Clusters::load(&path)
        .with_context(|| format!("Failed to load clusters from {}", path.display()))
}

/// Look up a cluster whose job feature the current user may use.
pub fn job_cluster<'a>(clusters: &'a Clusters, id: &str) -> Result<&'a Cluster> {
    let cluster = clusters
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("Unknown cluster: '{id}'"))?;
    if !cluster.job_allow()? {
        anyhow::bail!("Job submission is not allowed on cluster '{id}'");
    }
    Ok(cluster)
}

/// Job state with a color matching its phase.
pub fn styled_state(state: JobState) -> console::StyledObject<&'static str> {
    let name = state.name();
    match state {
        JobState::Completed => style(name).green(),
        JobState::Queued | JobState::QueuedHeld | JobState::Held => style(name).yellow(),
        JobState::Suspended | JobState::Undetermined => style(name).red(),
        JobState::Running => style(name).cyan(),
    }
}
