//! Info command implementation.
//!
//! Query one job, or every job, from a cluster's scheduler.

use std::path::Path;

use anyhow::Result;
use console::style;

use arvak_cluster::{JobInfo, format_hms};

use super::common::{job_cluster, load_clusters, styled_state};

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn print_job(info: &JobInfo) {
    println!(
        "{} Job {}: {}",
        style("→").cyan().bold(),
        style(&info.id).bold(),
        styled_state(info.status).bold()
    );
    println!("  Name:      {}", or_dash(info.job_name.as_deref()));
    println!("  Owner:     {}", or_dash(info.job_owner.as_deref()));
    println!("  Queue:     {}", or_dash(info.queue_name.as_deref()));
    if let Some(submitted) = info.submission_time {
        println!("  Submitted: {}", submitted.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(started) = info.dispatch_time {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(seconds) = info.wallclock_time {
        println!("  Wall time: {}", format_hms(seconds.max(0) as u64));
    }
    if let Some(seconds) = info.cpu_time {
        println!("  CPU time:  {}", format_hms(seconds.max(0) as u64));
    }
    if !info.allocated_nodes.is_empty() {
        let nodes: Vec<String> = info
            .allocated_nodes
            .iter()
            .map(|n| format!("{}/{}", n.name, n.procs))
            .collect();
        println!("  Nodes:     {} ({} procs)", nodes.join(" "), info.procs());
    }
}

fn print_table(jobs: &[JobInfo]) {
    println!("{} {} job(s):\n", style("→").cyan().bold(), jobs.len());
    println!(
        "  {:<24}  {:<20}  {:<12}  {:<12}  {}",
        style("JOB ID").bold(),
        style("NAME").bold(),
        style("OWNER").bold(),
        style("QUEUE").bold(),
        style("STATUS").bold()
    );
    println!("  {}", "-".repeat(84));

    for job in jobs {
        println!(
            "  {:<24}  {:<20}  {:<12}  {:<12}  {}",
            style(&job.id).dim(),
            or_dash(job.job_name.as_deref()),
            or_dash(job.job_owner.as_deref()),
            or_dash(job.queue_name.as_deref()),
            styled_state(job.status)
        );
    }
}

/// Execute the info command.
pub async fn execute(
    config: Option<&Path>,
    cluster_id: &str,
    job_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let clusters = load_clusters(config)?;
    let adapter = job_cluster(&clusters, cluster_id)?.job_adapter()?;

    match job_id {
        Some(id) => {
            let info = adapter.info(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_job(&info);
            }
        }
        None => {
            let jobs = adapter.info_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                print_table(&jobs);
            }
        }
    }

    Ok(())
}
