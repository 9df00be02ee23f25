//! CLI command implementations.

pub mod adapters;
pub mod clusters;
pub mod common;
pub mod control;
pub mod info;
pub mod submit;
