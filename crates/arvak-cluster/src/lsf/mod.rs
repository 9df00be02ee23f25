//! IBM Spectrum LSF support through the `b*` command-line tools.

mod adapter;
mod batch;
pub mod helper;
pub mod parser;

pub use adapter::{LsfAdapter, LsfConfig, parse_lsf_state};
pub use batch::Batch;
pub use helper::{
    ExecHost, estimate_runtime, parse_cpu_used, parse_exec_host, parse_past_time,
    parse_past_time_at,
};
pub use parser::BjobsRecord;
