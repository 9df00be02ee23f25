//! Conversion of Torque status attributes into [`JobInfo`].

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, TimeZone};

use super::native::{AttributeValue, StatusAttributes};
use crate::error::{ClusterError, ClusterResult};
use crate::job::{JobInfo, JobState, NodeInfo, parse_hms};

/// Extract the job id from `qsub` output.
///
/// Torque prints `<number>.<server>`; some installations print only the
/// number.
pub fn parse_qsub_output(output: &str) -> ClusterResult<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ClusterError::SubmissionFailure(
            "qsub did not print a job id".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Map a Torque `job_state` code.
///
/// - Q: queued
/// - H: held
/// - T: being moved
/// - W: waiting for its execution time
/// - R: running
/// - E: exiting after having run
/// - S: suspended
/// - C: completed
pub fn parse_pbs_state(state: &str) -> JobState {
    match state.trim() {
        "Q" | "W" => JobState::Queued,
        "H" | "T" => JobState::QueuedHeld,
        "R" | "E" => JobState::Running,
        "S" => JobState::Suspended,
        "C" => JobState::Completed,
        _ => JobState::Undetermined,
    }
}

/// Parse `exec_host`, e.g. `n0001/0+n0001/1+n0002/0-3`, into nodes in order
/// of first appearance.
pub fn parse_exec_host(text: &str) -> Vec<NodeInfo> {
    let mut nodes: Vec<NodeInfo> = Vec::new();

    for part in text.split('+').map(str::trim).filter(|p| !p.is_empty()) {
        let (host, slots) = match part.split_once('/') {
            Some((host, spec)) => (host, count_slots(spec)),
            None => (part, 1),
        };

        match nodes.iter_mut().find(|n| n.name == host) {
            Some(node) => node.procs = node.procs.saturating_add(slots),
            None => nodes.push(NodeInfo {
                name: host.to_string(),
                procs: slots,
            }),
        }
    }

    nodes
}

/// Count slots in `0`, `0-3` or `0,2,5-6`.
fn count_slots(spec: &str) -> u32 {
    spec.split(',')
        .map(|range| match range.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                (Ok(lo), Ok(hi)) if hi >= lo => (hi - lo).saturating_add(1),
                _ => 1,
            },
            None => 1,
        })
        .fold(0u32, u32::saturating_add)
}

/// Parse a Torque timestamp: epoch seconds from the library, or the
/// `Tue Mar  3 10:00:00 2020` form `qstat -f` prints.
pub fn parse_pbs_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Local
            .timestamp_opt(secs, 0)
            .single()
            .map(|t| t.naive_local());
    }
    NaiveDateTime::parse_from_str(text, "%a %b %e %H:%M:%S %Y").ok()
}

fn text<'a>(attributes: &'a StatusAttributes, name: &str) -> Option<&'a str> {
    attributes
        .get(name)
        .and_then(AttributeValue::as_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn resource<'a>(attributes: &'a StatusAttributes, name: &str, key: &str) -> Option<&'a str> {
    attributes.get(name).and_then(|v| v.resource(key))
}

/// Flatten status attributes into `name` / `name.resource` keys.
pub fn flatten(attributes: &StatusAttributes) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in attributes {
        match value {
            AttributeValue::Text(v) => {
                out.insert(name.clone(), v.clone());
            }
            AttributeValue::Resources(map) => {
                for (key, v) in map {
                    out.insert(format!("{name}.{key}"), v.clone());
                }
            }
        }
    }
    out
}

/// Build [`JobInfo`] from one job's status attributes.
///
/// Optional fields that fail to decode are left empty.
pub fn job_info(id: &str, attributes: &StatusAttributes) -> JobInfo {
    let mut info = JobInfo::new(
        id,
        text(attributes, "job_state")
            .map(parse_pbs_state)
            .unwrap_or_default(),
    );

    info.job_name = text(attributes, "Job_Name").map(str::to_string);
    info.queue_name = text(attributes, "queue").map(str::to_string);

    if let Some(owner) = text(attributes, "Job_Owner") {
        let (user, host) = match owner.split_once('@') {
            Some((user, host)) => (user, Some(host)),
            None => (owner, None),
        };
        info.job_owner = Some(user.to_string());
        info.submit_host = host.map(str::to_string);
    }
    if let Some(host) = text(attributes, "submit_host") {
        info.submit_host = Some(host.to_string());
    }

    info.allocated_nodes = text(attributes, "exec_host")
        .map(parse_exec_host)
        .unwrap_or_default();
    info.submission_time = text(attributes, "qtime").and_then(parse_pbs_time);
    info.dispatch_time = text(attributes, "start_time").and_then(parse_pbs_time);
    info.wallclock_time = resource(attributes, "resources_used", "walltime").and_then(parse_hms);
    info.cpu_time = resource(attributes, "resources_used", "cput").and_then(parse_hms);
    info.native = flatten(attributes);

    info
}
