//! Decommission markers kept in a node's finalizers and annotations.
//!
//! A removal workflow owns exactly one finalizer under [`FINALIZER_PREFIX`] and one
//! annotation under [`ANNOTATION_PREFIX`] while it is "requested". Completion swaps
//! all of them for the single [`CLEANUP_DONE_ANNOTATION`]. Transitions only move
//! forward: a completed node is never marked requested again.

use tracing::debug;

use crate::node::NodeRecord;

pub const FINALIZER_PREFIX: &str = "clusterscoped.vacate.io/node-remove_";
pub const ANNOTATION_PREFIX: &str = "lifecycle.vacate.io/create.node-remove_";
pub const CLEANUP_DONE_ANNOTATION: &str = "nodes.vacate.io/node-remove-cleanup";
/// Single-annotation marker written by older controllers.
pub const LEGACY_CLEANUP_ANNOTATION: &str = "vacate.io/user-node-remove-cleanup";

pub const REQUESTED_VALUE: &str = "requested";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Absent,
    Requested,
    Completed,
}

pub fn state(node: &NodeRecord) -> MarkerState {
    if node.annotations.get(CLEANUP_DONE_ANNOTATION).map(|v| v == "true").unwrap_or(false) {
        MarkerState::Completed
    } else if node.finalizers.iter().any(|f| f.starts_with(FINALIZER_PREFIX))
        || node.annotations.keys().any(|k| k.starts_with(ANNOTATION_PREFIX))
    {
        MarkerState::Requested
    } else {
        MarkerState::Absent
    }
}

/// Finalizers owned by the removal workflow.
pub fn is_reserved_finalizer(finalizer: &str) -> bool { finalizer.starts_with(FINALIZER_PREFIX) }

/// Annotations owned by the removal workflow, the legacy single marker included.
pub fn is_reserved_annotation(key: &str) -> bool {
    key.starts_with(ANNOTATION_PREFIX) || key == CLEANUP_DONE_ANNOTATION || key == LEGACY_CLEANUP_ANNOTATION
}

pub fn finalizer_for(cluster: &str) -> String { format!("{}{}", FINALIZER_PREFIX, cluster) }

pub fn annotation_for(cluster: &str) -> String { format!("{}{}", ANNOTATION_PREFIX, cluster) }

pub fn remove_finalizers_with_prefix(finalizers: &mut Vec<String>, prefix: &str) {
    finalizers.retain(|f| {
        let keep = !f.starts_with(prefix);
        if !keep { debug!(finalizer = %f, prefix, "removing finalizer"); }
        keep
    });
}

pub fn remove_annotations_with_prefix(annotations: &mut std::collections::BTreeMap<String, String>, prefix: &str) {
    annotations.retain(|k, _| {
        let keep = !k.starts_with(prefix);
        if !keep { debug!(annotation = %k, prefix, "removing annotation"); }
        keep
    });
}

/// Reset the node to a single "removal requested" marker.
///
/// Returns `false` when nothing changed, including when the node already reached
/// [`MarkerState::Completed`].
pub fn mark_requested(node: &mut NodeRecord) -> bool {
    if state(node) == MarkerState::Completed { return false; }
    let before = (node.finalizers.clone(), node.annotations.clone());

    remove_finalizers_with_prefix(&mut node.finalizers, FINALIZER_PREFIX);
    remove_annotations_with_prefix(&mut node.annotations, ANNOTATION_PREFIX);
    node.finalizers.push(finalizer_for(&node.cluster));
    node.annotations.insert(annotation_for(&node.cluster), REQUESTED_VALUE.to_string());

    before != (node.finalizers.clone(), node.annotations.clone())
}

/// Replace every reserved finalizer and annotation with the "cleanup done" marker.
pub fn mark_completed(node: &mut NodeRecord) -> bool {
    let before = (node.finalizers.clone(), node.annotations.clone());

    remove_finalizers_with_prefix(&mut node.finalizers, FINALIZER_PREFIX);
    remove_annotations_with_prefix(&mut node.annotations, ANNOTATION_PREFIX);
    node.annotations.remove(LEGACY_CLEANUP_ANNOTATION);
    node.annotations.insert(CLEANUP_DONE_ANNOTATION.to_string(), "true".to_string());

    before != (node.finalizers.clone(), node.annotations.clone())
}
