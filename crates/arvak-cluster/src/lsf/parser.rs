//! Parsers for LSF command output.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Columns `bjobs -w -W` prints, in order.
pub const BJOBS_COLUMNS: [&str; 15] = [
    "JOBID",
    "USER",
    "STAT",
    "QUEUE",
    "FROM_HOST",
    "EXEC_HOST",
    "JOB_NAME",
    "SUBMIT_TIME",
    "PROJ_NAME",
    "CPU_USED",
    "MEM",
    "SWAP",
    "PIDS",
    "START_TIME",
    "FINISH_TIME",
];

/// One row of `bjobs -w -W` output. Fields hold the raw text, `-` included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BjobsRecord {
    pub id: String,
    pub user: String,
    pub status: String,
    pub queue: String,
    pub from_host: String,
    pub exec_host: String,
    pub name: String,
    pub submit_time: String,
    pub project: String,
    pub cpu_used: String,
    pub mem: String,
    pub swap: String,
    pub pids: String,
    pub start_time: String,
    pub finish_time: String,
}

impl BjobsRecord {
    /// Fields as `(COLUMN, value)` pairs.
    pub fn fields(&self) -> [(&'static str, &str); 15] {
        [
            ("JOBID", self.id.as_str()),
            ("USER", self.user.as_str()),
            ("STAT", self.status.as_str()),
            ("QUEUE", self.queue.as_str()),
            ("FROM_HOST", self.from_host.as_str()),
            ("EXEC_HOST", self.exec_host.as_str()),
            ("JOB_NAME", self.name.as_str()),
            ("SUBMIT_TIME", self.submit_time.as_str()),
            ("PROJ_NAME", self.project.as_str()),
            ("CPU_USED", self.cpu_used.as_str()),
            ("MEM", self.mem.as_str()),
            ("SWAP", self.swap.as_str()),
            ("PIDS", self.pids.as_str()),
            ("START_TIME", self.start_time.as_str()),
            ("FINISH_TIME", self.finish_time.as_str()),
        ]
    }
}

/// Whether `bjobs` output means "nothing matched" rather than an error.
pub fn is_no_jobs_message(output: &str) -> bool {
    output.contains("No job found") || output.contains("is not found")
}

/// Parse `bjobs -w -W` output.
///
/// The header row names the columns. `JOB_NAME` is the only column that may
/// contain spaces, so surplus fields in a data row are folded into it.
///
/// ```text
/// JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME  PROJ_NAME CPU_USED MEM SWAP PIDS START_TIME FINISH_TIME
/// 542935  bob     RUN   short      c001        4*c012:8*c013 my job   03/31-14:46:42 default 000:48:18.39 2 0 123 03/31-14:46:44 -
/// ```
pub fn parse_bjobs_output(output: &str) -> ClusterResult<Vec<BjobsRecord>> {
    if output.trim().is_empty() || is_no_jobs_message(output) {
        return Ok(Vec::new());
    }

    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = match lines.next() {
        Some(line) => line.split_whitespace().collect(),
        None => return Ok(Vec::new()),
    };

    let index: FxHashMap<&str, usize> = header.iter().enumerate().map(|(i, c)| (*c, i)).collect();
    let missing: Vec<&str> = BJOBS_COLUMNS
        .iter()
        .copied()
        .filter(|c| !index.contains_key(c))
        .collect();
    if !missing.is_empty() {
        return Err(ClusterError::Parse(format!(
            "bjobs output in unexpected format, missing columns {missing:?} in {header:?}"
        )));
    }
    let name_col = index["JOB_NAME"];

    Ok(lines
        .map(|line| {
            let values = fold_job_name(line.split_whitespace().collect(), header.len(), name_col);
            let get = |column: &str| -> String {
                values
                    .get(index[column])
                    .cloned()
                    .unwrap_or_else(|| "-".to_string())
            };
            BjobsRecord {
                id: get("JOBID"),
                user: get("USER"),
                status: get("STAT"),
                queue: get("QUEUE"),
                from_host: get("FROM_HOST"),
                exec_host: get("EXEC_HOST"),
                name: get("JOB_NAME"),
                submit_time: get("SUBMIT_TIME"),
                project: get("PROJ_NAME"),
                cpu_used: get("CPU_USED"),
                mem: get("MEM"),
                swap: get("SWAP"),
                pids: get("PIDS"),
                start_time: get("START_TIME"),
                finish_time: get("FINISH_TIME"),
            }
        })
        .collect())
}

fn fold_job_name(fields: Vec<&str>, columns: usize, name_col: usize) -> Vec<String> {
    if fields.len() <= columns {
        return fields.into_iter().map(str::to_string).collect();
    }

    let surplus = fields.len() - columns;
    let mut values: Vec<String> = fields[..name_col].iter().map(|s| s.to_string()).collect();
    values.push(fields[name_col..=name_col + surplus].join(" "));
    values.extend(fields[name_col + surplus + 1..].iter().map(|s| s.to_string()));
    values
}

/// Extract the job id from `bsub` output, e.g.
/// `Job <542935> is submitted to queue <short>.`
pub fn parse_bsub_output(output: &str) -> ClusterResult<String> {
    output
        .lines()
        .find_map(|line| {
            let rest = line.trim().strip_prefix("Job <")?;
            let (id, _) = rest.split_once('>')?;
            (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_string())
        })
        .ok_or_else(|| {
            ClusterError::SubmissionFailure(format!(
                "unexpected bsub output: {}",
                output.trim()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME  PROJ_NAME CPU_USED MEM SWAP PIDS START_TIME FINISH_TIME";

    #[test]
    fn test_parse_bjobs_output() {
        let output = format!(
            "{HEADER}\n\
             542935  bob     RUN   short      c001        4*c012:8*c013 solver 03/31-14:46:42 default 000:48:18.39 2 0 123 03/31-14:46:44 -\n\
             542936  sally   PEND  normal     c002        -           sweep 04/01-09:00:00 default 000:00:00.00 0 0 - - -\n"
        );
        let records = parse_bjobs_output(&output).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "542935");
        assert_eq!(records[0].status, "RUN");
        assert_eq!(records[0].exec_host, "4*c012:8*c013");
        assert_eq!(records[0].cpu_used, "000:48:18.39");
        assert_eq!(records[0].finish_time, "-");
        assert_eq!(records[1].user, "sally");
        assert_eq!(records[1].start_time, "-");
    }

    #[test]
    fn test_job_name_with_spaces() {
        let output = format!(
            "{HEADER}\n\
             7 bob RUN short c001 c012 my long job 03/31-14:46:42 default 000:00:01.00 1 0 9 03/31-14:46:44 -\n"
        );
        let records = parse_bjobs_output(&output).unwrap();

        assert_eq!(records[0].name, "my long job");
        assert_eq!(records[0].submit_time, "03/31-14:46:42");
        assert_eq!(records[0].finish_time, "-");
    }

    #[test]
    fn test_no_jobs() {
        assert!(parse_bjobs_output("No job found\n").unwrap().is_empty());
        assert!(parse_bjobs_output("Job <12> is not found\n").unwrap().is_empty());
        assert!(parse_bjobs_output("").unwrap().is_empty());
        assert!(parse_bjobs_output(HEADER).unwrap().is_empty());
    }

    #[test]
    fn test_unexpected_columns() {
        let err = parse_bjobs_output("JOBID USER STAT\n1 bob RUN\n").unwrap_err();
        assert!(matches!(err, ClusterError::Parse(_)));
    }

    #[test]
    fn test_parse_bsub_output() {
        assert_eq!(
            parse_bsub_output("Job <542935> is submitted to queue <short>.\n").unwrap(),
            "542935"
        );
        assert_eq!(
            parse_bsub_output("Warning: foo\nJob <1> is submitted to default queue <normal>.\n")
                .unwrap(),
            "1"
        );
        assert!(parse_bsub_output("Request aborted by esub.").is_err());
    }
}
