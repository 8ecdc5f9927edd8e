//! Vacate kubehub: cluster connections and kube object plumbing.

#![forbid(unsafe_code)]

pub mod job;
pub mod records;

use anyhow::{anyhow, Context, Result};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, GroupVersionKind},
    Client, Config,
};
use tracing::{debug, info};
use vacate_core::VacateError;

pub use job::{render_cleanup_job, CleanupJobSpec, CleanupJobStatus, HostMount, JobHandle};
pub use records::{apply_markers, cluster_from_dynamic, node_from_dynamic, pool_from_dynamic};

/// Management-plane kinds, as `group/version/Kind` keys.
pub const NODE_GVK: &str = "management.vacate.io/v1/Node";
pub const CLUSTER_GVK: &str = "management.vacate.io/v1/Cluster";
pub const NODE_POOL_GVK: &str = "management.vacate.io/v1/NodePool";

pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind { group: String::new(), version: version.to_string(), kind: kind.to_string() }),
        [group, version, kind] => Ok(GroupVersionKind { group: (*group).to_string(), version: (*version).to_string(), kind: (*kind).to_string() }),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

/// `ApiResource` for a management kind key, plural derived from the kind.
pub fn api_resource(key: &str) -> Result<ApiResource> {
    let gvk = parse_gvk_key(key)?;
    Ok(ApiResource::from_gvk(&gvk))
}

/// Client for the management plane (current kubeconfig context or in-cluster).
pub async fn management_client() -> Result<Client> {
    Client::try_default().await.context("building management client")
}

/// Client for a downstream cluster, selected by the kubeconfig context named after it.
///
/// A missing context maps to [`VacateError::NotFound`]: the cluster is gone and
/// there is nothing left to clean on it.
pub async fn cluster_client(cluster: &str) -> Result<Client, VacateError> {
    let kubeconfig = Kubeconfig::read().map_err(|e| VacateError::Config(format!("reading kubeconfig: {}", e)))?;
    if !kubeconfig.contexts.iter().any(|c| c.name == cluster) {
        debug!(cluster, "no kubeconfig context for cluster");
        return Err(VacateError::NotFound(format!("cluster {}", cluster)));
    }
    let opts = KubeConfigOptions { context: Some(cluster.to_string()), ..Default::default() };
    let config = Config::from_custom_kubeconfig(kubeconfig, &opts)
        .await
        .map_err(|e| VacateError::Config(format!("kubeconfig context {}: {}", cluster, e)))?;
    let client = Client::try_from(config).map_err(map_kube_err)?;
    info!(cluster, "connected to cluster");
    Ok(client)
}

pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

/// Classify a kube error into the decommission taxonomy.
pub fn map_kube_err(e: kube::Error) -> VacateError {
    match &e {
        kube::Error::Api(ae) if ae.code == 404 => VacateError::NotFound(ae.message.clone()),
        kube::Error::Api(ae) if ae.code == 408 || ae.code == 504 => VacateError::Timeout(ae.message.clone()),
        _ => VacateError::Remote(e.to_string()),
    }
}
