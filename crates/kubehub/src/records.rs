//! Conversions between management-plane `DynamicObject`s and core records.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use kube::core::DynamicObject;
use serde::Deserialize;
use vacate_core::marker::{is_reserved_annotation, is_reserved_finalizer};
use vacate_core::{ClusterRecord, DrainRequest, NodePool, NodeRecord, Taint};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NodeSpecWire {
    requested_hostname: String,
    node_pool_name: Option<String>,
    node_drain_input: Option<DrainRequest>,
    taints: Vec<Taint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NodeStatusWire {
    node_name: String,
    node_labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ClusterSpecWire {
    prefix_path: Option<String>,
    windows_prefix_path: Option<String>,
    drain_before_delete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NodePoolSpecWire {
    drain_before_delete: bool,
}

fn section<T: for<'de> Deserialize<'de> + Default>(obj: &DynamicObject, key: &str) -> Result<T> {
    match obj.data.get(key) {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone()).with_context(|| format!("decoding .{}", key)),
        _ => Ok(T::default()),
    }
}

pub fn node_from_dynamic(obj: &DynamicObject) -> Result<NodeRecord> {
    let meta = &obj.metadata;
    let name = meta.name.clone().ok_or_else(|| anyhow!("node object missing metadata.name"))?;
    let spec: NodeSpecWire = section(obj, "spec")?;
    let status: NodeStatusWire = section(obj, "status")?;
    Ok(NodeRecord {
        name,
        cluster: meta.namespace.clone().unwrap_or_default(),
        node_name: status.node_name,
        requested_hostname: spec.requested_hostname,
        pool: spec.node_pool_name.filter(|p| !p.is_empty()),
        labels: status.node_labels,
        taints: spec.taints,
        drain_input: spec.node_drain_input,
        finalizers: meta.finalizers.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        resource_version: meta.resource_version.clone(),
    })
}

pub fn cluster_from_dynamic(obj: &DynamicObject) -> Result<ClusterRecord> {
    let spec: ClusterSpecWire = section(obj, "spec")?;
    Ok(ClusterRecord {
        name: obj.metadata.name.clone().unwrap_or_default(),
        prefix_path: spec.prefix_path,
        windows_prefix_path: spec.windows_prefix_path,
        drain_before_delete: spec.drain_before_delete,
    })
}

pub fn pool_from_dynamic(obj: &DynamicObject) -> Result<NodePool> {
    let spec: NodePoolSpecWire = section(obj, "spec")?;
    Ok(NodePool { name: obj.metadata.name.clone().unwrap_or_default(), drain_before_delete: spec.drain_before_delete })
}

/// Copy the record's removal markers onto a freshly fetched object.
///
/// Reserved finalizers and annotations are replaced by the record's; every
/// other entry is taken from the fetched copy, so writes by other controllers
/// since the record was read survive.
pub fn apply_markers(obj: &mut DynamicObject, node: &NodeRecord) {
    let mut finalizers: Vec<String> = obj.metadata.finalizers.take().unwrap_or_default();
    finalizers.retain(|f| !is_reserved_finalizer(f));
    finalizers.extend(node.finalizers.iter().filter(|f| is_reserved_finalizer(f)).cloned());

    let mut annotations: BTreeMap<String, String> = obj.metadata.annotations.take().unwrap_or_default();
    annotations.retain(|k, _| !is_reserved_annotation(k));
    annotations.extend(node.annotations.iter().filter(|(k, _)| is_reserved_annotation(k)).map(|(k, v)| (k.clone(), v.clone())));

    obj.metadata.finalizers = if finalizers.is_empty() { None } else { Some(finalizers) };
    obj.metadata.annotations = if annotations.is_empty() { None } else { Some(annotations) };
}
