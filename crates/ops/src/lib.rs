//! Vacate Ops: node decommission workflow over the control plane and downstream clusters.
//!
//! The workflow itself (drain, dispatch, await, finalize) only talks to the
//! collaborator traits below; [`adapters`] holds the kube-rs implementations.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod dispatch;
pub mod drain;
pub mod lifecycle;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use vacate_core::{ClusterRecord, DrainRequest, NodePool, NodeRecord, VacateResult};
use vacate_kubehub::{CleanupJobSpec, CleanupJobStatus, JobHandle};

pub use adapters::{EvictionDrain, KubeClusterClient, KubeConnector, KubeControlPlane};
pub use dispatch::{CleanupJobDispatcher, JobCompletionWatcher};
pub use drain::{DrainCoordinator, DrainOutcome};
pub use lifecycle::{DecommissionReport, NodeDeletion, NodeLifecycleOrchestrator, NODE_DELETE_DEADLINE};

/// Management plane holding node, cluster and pool records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_cluster(&self, name: &str) -> VacateResult<ClusterRecord>;
    async fn get_node_pool(&self, cluster: &str, name: &str) -> VacateResult<NodePool>;
    async fn get_node(&self, cluster: &str, name: &str) -> VacateResult<NodeRecord>;
    /// Write the node's finalizers and annotations onto the latest stored copy.
    async fn update_node(&self, node: &NodeRecord) -> VacateResult<NodeRecord>;
}

/// Downstream cluster the node belongs to.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// First job in `namespace` matching the label `selector`.
    async fn find_job(&self, namespace: &str, selector: &str) -> VacateResult<Option<JobHandle>>;
    async fn create_job(&self, spec: &CleanupJobSpec) -> VacateResult<JobHandle>;
    async fn job_status(&self, job: &JobHandle) -> VacateResult<CleanupJobStatus>;
    async fn delete_node(&self, name: &str) -> VacateResult<()>;
}

/// Evicts workloads from a node; returns human-readable output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DrainTool: Send + Sync {
    async fn drain(&self, node: &str, req: &DrainRequest) -> VacateResult<String>;
}

/// Connection to one downstream cluster.
#[derive(Clone)]
pub struct ClusterSession {
    pub client: Arc<dyn ClusterClient>,
    pub drain: Arc<dyn DrainTool>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// `NotFound` when the cluster can no longer be reached by name.
    async fn connect(&self, cluster: &str) -> VacateResult<ClusterSession>;
}
