//! Submit command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use arvak_cluster::{Script, parse_hms};

use super::common::{job_cluster, load_clusters};

/// Build a [`Script`] from a file and command-line overrides.
pub fn build_script(
    content: String,
    queue: Option<&str>,
    name: Option<&str>,
    account: Option<&str>,
    time: Option<&str>,
) -> Result<Script> {
    let mut script = Script::new(content);
    if let Some(queue) = queue {
        script = script.with_queue(queue);
    }
    if let Some(name) = name {
        script = script.with_job_name(name);
    }
    if let Some(account) = account {
        script = script.with_accounting_id(account);
    }
    if let Some(time) = time {
        let seconds = parse_hms(time)
            .filter(|s| *s > 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid wall time '{time}', expected HH:MM:SS"))?;
        script = script.with_wall_time(seconds as u64);
    }
    Ok(script)
}

/// Execute the submit command.
pub async fn execute(
    config: Option<&Path>,
    cluster_id: &str,
    path: &Path,
    queue: Option<&str>,
    name: Option<&str>,
    account: Option<&str>,
    time: Option<&str>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    let script = build_script(content, queue, name, account, time)?;

    let clusters = load_clusters(config)?;
    let adapter = job_cluster(&clusters, cluster_id)?.job_adapter()?;

    println!(
        "{} Submitting {} to {} ({})",
        style("→").cyan().bold(),
        style(path.display()).bold(),
        style(cluster_id).bold(),
        adapter.name()
    );
    let id = adapter.submit(&script).await?;
    println!("{} Job submitted: {}", style("✓").green().bold(), style(&id).bold());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_script_overrides() {
        let script = build_script(
            "#!/bin/bash\nhostname\n".to_string(),
            Some("batch"),
            Some("hello"),
            Some("PAS0001"),
            Some("1:30:00"),
        )
        .unwrap();

        assert_eq!(script.queue_name.as_deref(), Some("batch"));
        assert_eq!(script.job_name.as_deref(), Some("hello"));
        assert_eq!(script.accounting_id.as_deref(), Some("PAS0001"));
        assert_eq!(script.wall_time, Some(5400));
    }

    #[test]
    fn test_build_script_rejects_bad_time() {
        assert!(build_script(String::new(), None, None, None, Some("soon")).is_err());
        assert!(build_script(String::new(), None, None, None, Some("0")).is_err());
    }

    #[test]
    fn test_build_script_defaults() {
        let script = build_script("hostname".to_string(), None, None, None, None).unwrap();
        assert_eq!(script.content, "hostname");
        assert_eq!(script.queue_name, None);
        assert_eq!(script.wall_time, None);
    }
}
