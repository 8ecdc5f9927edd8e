//! Read-mostly copies of the management objects a decommission works from.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TargetOs;

/// Nodes carrying this label (value `true`) are never deleted from the control plane.
pub const UNMANAGED_LABEL: &str = "vacate.io/unmanaged";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Taint {
    pub key: String,
    pub value: Option<String>,
    pub effect: String,
}

/// A cluster node as tracked by the management plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeRecord {
    /// Name of the management object.
    pub name: String,
    /// Owning cluster; the management object lives in the namespace of the same name.
    pub cluster: String,
    /// Name of the node object inside the cluster (also its hostname label).
    pub node_name: String,
    pub requested_hostname: String,
    pub pool: Option<String>,
    /// Labels reported by the node inside the cluster.
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
    pub drain_input: Option<DrainRequest>,
    pub finalizers: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl NodeRecord {
    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        if !self.requested_hostname.is_empty() { &self.requested_hostname }
        else if !self.node_name.is_empty() { &self.node_name }
        else { &self.name }
    }

    pub fn target_os(&self) -> TargetOs { TargetOs::from_labels(&self.labels) }

    /// Whether the cluster-side node object is left alone on removal.
    pub fn is_unmanaged(&self) -> bool {
        self.labels.get(UNMANAGED_LABEL).map(|v| v == "true").unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRecord {
    pub name: String,
    pub prefix_path: Option<String>,
    pub windows_prefix_path: Option<String>,
    /// Cluster-wide drain policy for nodes that do not belong to a pool.
    pub drain_before_delete: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePool {
    pub name: String,
    pub drain_before_delete: bool,
}

/// Parameters for one drain attempt. Seconds on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainRequest {
    pub force: bool,
    pub delete_local_data: bool,
    pub grace_period: u32,
    pub timeout: u32,
}

impl Default for DrainRequest {
    fn default() -> Self {
        Self { force: true, delete_local_data: true, grace_period: 60, timeout: 60 }
    }
}

impl DrainRequest {
    /// Node override when present, defaults otherwise.
    pub fn for_node(node: &NodeRecord) -> Self {
        node.drain_input.clone().unwrap_or_default()
    }

    pub fn grace_period(&self) -> Duration { Duration::from_secs(u64::from(self.grace_period)) }

    pub fn timeout(&self) -> Duration { Duration::from_secs(u64::from(self.timeout.max(1))) }
}

/// Drain is required when the node's pool asks for it, or, for pool-less nodes, when the cluster does.
pub fn drain_before_delete(node: &NodeRecord, cluster: &ClusterRecord, pool: Option<&NodePool>) -> bool {
    match (node.pool.as_deref(), pool) {
        (Some(_), Some(pool)) => pool.drain_before_delete,
        _ => cluster.drain_before_delete,
    }
}
