//! Decoders for the text fields `bjobs` prints.
//!
//! Except for [`parse_past_time`], decoders degrade to `None` or empty
//! rather than fail: one odd field must not void a whole status listing.

use chrono::{Datelike, Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ClusterError, ClusterResult};

/// One host entry of `EXEC_HOST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecHost {
    /// Host name.
    pub host: String,
    /// Execution slots on that host.
    pub slots: u32,
}

/// Parse a past `MM/DD-HH:MM[:SS]` timestamp relative to the current time.
///
/// See [`parse_past_time_at`].
pub fn parse_past_time(text: &str, ignore_errors: bool) -> ClusterResult<Option<NaiveDateTime>> {
    parse_past_time_at(text, Local::now().naive_local(), ignore_errors)
}

/// Parse a past `MM/DD-HH:MM[:SS]` timestamp relative to `now`.
///
/// `bjobs` omits the year. The year of `now` is assumed unless the month
/// is later than the month of `now`, in which case the previous year is
/// used. This is a heuristic: it is only meaningful for times known to lie
/// in the past (submit, start and finish times), and it picks the wrong
/// year for a timestamp more than about eleven months old. Never use it for
/// estimates that lie in the future.
///
/// Empty input and the `-` placeholder yield `None`. Malformed input is a
/// [`ClusterError::Parse`] unless `ignore_errors` is set.
pub fn parse_past_time_at(
    text: &str,
    now: NaiveDateTime,
    ignore_errors: bool,
) -> ClusterResult<Option<NaiveDateTime>> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }

    match decode_past_time(text, now) {
        Some(time) => Ok(Some(time)),
        None if ignore_errors => {
            warn!("Ignoring malformed time '{}'", text);
            Ok(None)
        }
        None => Err(ClusterError::Parse(format!(
            "invalid time '{text}' (expected MM/DD-HH:MM[:SS])"
        ))),
    }
}

fn decode_past_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let month: u32 = text.split_once('/')?.0.parse().ok()?;
    let year = if month > now.month() {
        now.year() - 1
    } else {
        now.year()
    };
    let text = format!("{year}/{text}");
    NaiveDateTime::parse_from_str(&text, "%Y/%m/%d-%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y/%m/%d-%H:%M"))
        .ok()
}

/// Parse `EXEC_HOST` notation, e.g. `4*c012:8*c013` or `c012`.
///
/// A missing multiplier means one slot. An entry whose multiplier is zero
/// or does not fit a `u32` is dropped.
pub fn parse_exec_host(text: &str) -> Vec<ExecHost> {
    text.split(':')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (host, slots) = match part.split_once('*') {
                Some((count, host))
                    if !count.is_empty()
                        && !host.is_empty()
                        && count.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    match count.parse::<u32>() {
                        Ok(slots) if slots > 0 => (host, slots),
                        _ => {
                            warn!("Dropping exec host entry with bad slot count '{}'", part);
                            return None;
                        }
                    }
                }
                _ => (part, 1),
            };
            Some(ExecHost {
                host: host.to_string(),
                slots,
            })
        })
        .collect()
}

/// Estimate how long a job has been running.
///
/// `None` if it never started; otherwise `finish_time` (or `current_time`
/// while still running) minus `start_time`. Time spent suspended is counted,
/// so this is an upper bound.
pub fn estimate_runtime(
    current_time: NaiveDateTime,
    start_time: Option<NaiveDateTime>,
    finish_time: Option<NaiveDateTime>,
) -> Option<TimeDelta> {
    let start = start_time?;
    Some(finish_time.unwrap_or(current_time) - start)
}

/// Parse `CPU_USED`, printed as `HHH:MM:SS.ff`, into whole seconds.
///
/// The fraction is discarded whatever it holds; LSF 8.3 has been seen to
/// print values such as `50769:48:00.-48`.
pub fn parse_cpu_used(text: &str) -> Option<i64> {
    let (hms, _fraction) = text.trim().split_once('.')?;
    let mut parts = hms.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let field = |p: &str| -> Option<i64> {
        if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        p.parse().ok()
    };
    field(h)?
        .checked_mul(3600)?
        .checked_add(field(m)?.checked_mul(60)?)?
        .checked_add(field(s)?)
}
