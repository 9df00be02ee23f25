//! `qsub` command-line construction.

use std::collections::BTreeMap;
use std::path::Path;

/// Map one PBS header attribute to its `qsub` arguments.
///
/// Headers without a dedicated flag use the generic `-W key=value` form.
pub fn header_args(key: &str, value: &str) -> Vec<String> {
    let flag = match key {
        "Execution_Time" => "-a",
        "Checkpoint" => "-c",
        "Error_Path" => "-e",
        "fault_tolerant" => return vec!["-f".to_string()],
        "Hold_Types" => return vec!["-h".to_string()],
        "Join_Path" => "-j",
        "Keep_Files" => "-k",
        "Mail_Points" => "-m",
        "Output_Path" => "-o",
        "Priority" => "-p",
        "Rerunable" => "-r",
        "job_array_request" => "-t",
        "User_List" => "-u",
        "Account_Name" => "-A",
        "Mail_Users" => "-M",
        "Job_Name" => "-N",
        "Shell_Path_List" => "-S",
        "job_arguments" => "-F",
        "init_work_dir" => "-d",
        // Moab resource manager extension
        "reservation_id" => return vec!["-W".to_string(), format!("x=advres:{value}")],
        _ => return vec!["-W".to_string(), format!("{key}={value}")],
    };
    vec![flag.to_string(), value.to_string()]
}

/// Join environment variables as `k=v,k=v`.
pub fn join_envvars(envvars: &BTreeMap<String, String>) -> String {
    envvars
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the full `qsub` argument vector. The script path is always last.
pub fn qsub_args(
    queue: &str,
    headers: &BTreeMap<String, String>,
    resources: &BTreeMap<String, String>,
    envvars: &BTreeMap<String, String>,
    script: &Path,
) -> Vec<String> {
    let mut args = Vec::new();

    if !queue.is_empty() {
        args.push("-q".to_string());
        args.push(queue.to_string());
    }

    for (key, value) in headers {
        args.extend(header_args(key, value));
    }

    for (key, value) in resources {
        args.push("-l".to_string());
        args.push(format!("{key}={value}"));
    }

    if !envvars.is_empty() {
        args.push("-v".to_string());
        args.push(join_envvars(envvars));
    }

    args.push(script.to_string_lossy().into_owned());
    args
}
