//! Clusters command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use super::common::load_clusters;

fn mark(allowed: bool) -> console::StyledObject<&'static str> {
    if allowed {
        style("●").green()
    } else {
        style("○").dim()
    }
}

/// Execute the clusters command.
pub fn execute(config: Option<&Path>) -> Result<()> {
    let clusters = load_clusters(config)?;

    if clusters.is_empty() {
        println!("No clusters configured.");
        return Ok(());
    }

    println!(
        "{} {} cluster(s):\n",
        style("Arvak").cyan().bold(),
        clusters.len()
    );

    for cluster in clusters.iter() {
        let allowed = cluster.allow()?;
        println!(
            "  {} {} ({})",
            mark(allowed),
            style(cluster.id()).bold(),
            cluster.title()
        );
        if let Some(host) = cluster.login_host() {
            println!("    {} login: {}", mark(cluster.login_allow()?), host);
        }
        if let Some(adapter) = cluster.job_config().adapter.as_deref() {
            println!("    {} jobs:  {}", mark(cluster.job_allow()?), adapter);
        }
        for feature in cluster.custom_configs().keys() {
            println!(
                "    {} {}",
                mark(cluster.custom_allow(feature)?),
                feature
            );
        }
        println!();
    }

    Ok(())
}
