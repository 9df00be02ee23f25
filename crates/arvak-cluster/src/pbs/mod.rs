//! Torque (PBS) batch server support.
//!
//! [`Batch`] talks to one batch server through the Torque client library or
//! the `qsub` binary; [`TorqueAdapter`] puts the uniform job contract on top.

mod adapter;
mod batch;
#[cfg(test)]
mod fake;
#[cfg(feature = "native-torque")]
mod ffi;
mod native;
pub mod qsub;
pub mod status;

pub use adapter::{TorqueAdapter, TorqueConfig};
pub use batch::{Batch, SubmitOptions};
#[cfg(feature = "native-torque")]
pub use ffi::LibTorque;
pub use native::{
    ATTR_RESOURCE_LIST, ATTR_VARIABLE_LIST, Attribute, AttributeValue, ConnectionId, HoldType,
    PBSE_NONE, PBSE_UNKJOBID, StatScope, StatusAttributes, StatusMap, TorqueApi, insert_attribute,
};
