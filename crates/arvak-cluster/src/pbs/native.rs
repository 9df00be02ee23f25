//! The native Torque client seam.
//!
//! [`TorqueApi`] is the narrow interface [`Batch`](super::Batch) needs from
//! the Torque client library. The production implementation loads
//! `libtorque.so` at runtime ([`LibTorque`](super::LibTorque)); tests plug in
//! a fake.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// Native session handle. Negative values returned by `connect` are error
/// codes.
pub type ConnectionId = i32;

/// No error.
pub const PBSE_NONE: i32 = 0;

/// Unknown job id.
pub const PBSE_UNKJOBID: i32 = 15001;

/// Attribute carrying the resource list of a job.
pub const ATTR_RESOURCE_LIST: &str = "Resource_List";

/// Attribute carrying the exported environment of a job.
pub const ATTR_VARIABLE_LIST: &str = "Variable_List";

/// Which kind of object a status query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatScope {
    /// The batch server itself.
    Server,
    /// Queues.
    Queue,
    /// Compute nodes.
    Node,
    /// Jobs.
    Job,
}

/// Who may place or remove a hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldType {
    /// Job owner, batch operator and batch administrator.
    #[default]
    #[serde(rename = "u")]
    User,
    /// Batch operator and batch administrator.
    #[serde(rename = "o")]
    Operator,
    /// Batch administrator only.
    #[serde(rename = "s")]
    System,
}

impl HoldType {
    /// Native single-letter code.
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldType::User => "u",
            HoldType::Operator => "o",
            HoldType::System => "s",
        }
    }
}

impl std::str::FromStr for HoldType {
    type Err = crate::error::ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u" => Ok(HoldType::User),
            "o" => Ok(HoldType::Operator),
            "s" => Ok(HoldType::System),
            other => Err(crate::error::ClusterError::Parse(format!(
                "unknown hold type '{other}' (expected u, o or s)"
            ))),
        }
    }
}

/// One entry of a native attribute list (`attropl`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, e.g. `Job_Name` or `Resource_List`.
    pub name: String,
    /// Resource name for resource-qualified attributes.
    pub resource: Option<String>,
    /// Attribute value.
    pub value: String,
}

impl Attribute {
    /// A plain attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: None,
            value: value.into(),
        }
    }

    /// A resource-qualified attribute.
    pub fn resource(
        name: impl Into<String>,
        resource: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: Some(resource.into()),
            value: value.into(),
        }
    }
}

/// Value of one status attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Plain value.
    Text(String),
    /// Resource-qualified values keyed by resource name.
    Resources(BTreeMap<String, String>),
}

impl AttributeValue {
    /// The plain value, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Resources(_) => None,
        }
    }

    /// A resource value, if this is a resource map containing it.
    pub fn resource(&self, name: &str) -> Option<&str> {
        match self {
            AttributeValue::Resources(map) => map.get(name).map(String::as_str),
            AttributeValue::Text(_) => None,
        }
    }
}

/// Attributes of one server, queue, node or job.
pub type StatusAttributes = BTreeMap<String, AttributeValue>;

/// Status query result keyed by native object name.
pub type StatusMap = BTreeMap<String, StatusAttributes>;

/// Insert one native `(name, resource, value)` triple into an attribute map,
/// nesting resource-qualified values under their attribute name.
pub fn insert_attribute(
    attributes: &mut StatusAttributes,
    name: &str,
    resource: Option<&str>,
    value: &str,
) {
    match resource {
        None => {
            attributes.insert(name.to_string(), AttributeValue::Text(value.to_string()));
        }
        Some(resource) => {
            let entry = attributes
                .entry(name.to_string())
                .or_insert_with(|| AttributeValue::Resources(BTreeMap::new()));
            if let AttributeValue::Text(_) = entry {
                *entry = AttributeValue::Resources(BTreeMap::new());
            }
            if let AttributeValue::Resources(map) = entry {
                map.insert(resource.to_string(), value.to_string());
            }
        }
    }
}

/// Operations of the Torque client library.
///
/// Calls mirror the C API one to one. Errors returned here are problems with
/// the library itself (e.g. it could not be loaded); errors reported by the
/// batch server surface through [`errno`](TorqueApi::errno) after the call.
pub trait TorqueApi: Send + Sync {
    /// Open a session. Negative return values are error codes.
    fn connect(&self, host: &str) -> ClusterResult<ConnectionId>;

    /// Close a session.
    fn disconnect(&self, cid: ConnectionId) -> ClusterResult<()>;

    /// Query status of server, queues, nodes or jobs. An empty `id` selects
    /// everything; empty `filters` returns all attributes. The native result
    /// buffer is released before returning.
    fn stat(
        &self,
        cid: ConnectionId,
        scope: StatScope,
        id: &str,
        filters: &[String],
    ) -> ClusterResult<StatusMap>;

    /// Submit a script. `None` means the server refused; see `errno`.
    fn submit(
        &self,
        cid: ConnectionId,
        attributes: &[Attribute],
        script: &str,
        queue: &str,
    ) -> ClusterResult<Option<String>>;

    /// Place a hold on a job.
    fn hold(&self, cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()>;

    /// Release a hold on a job.
    fn release(&self, cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()>;

    /// Delete a job.
    fn delete(&self, cid: ConnectionId, id: &str) -> ClusterResult<()>;

    /// Error code of the most recent call, [`PBSE_NONE`] if none.
    fn errno(&self) -> i32;

    /// Message for an error code.
    fn strerror(&self, code: i32) -> String;
}
