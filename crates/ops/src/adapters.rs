//! kube-rs implementations of the collaborator traits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::Client;
use tracing::{debug, info, warn};
use vacate_core::{ClusterRecord, DrainRequest, NodePool, NodeRecord, VacateError, VacateResult};
use vacate_kubehub::{
    api_resource, apply_markers, cluster_from_dynamic, map_kube_err, node_from_dynamic, pool_from_dynamic, render_cleanup_job,
    CleanupJobSpec, CleanupJobStatus, JobHandle, CLUSTER_GVK, NODE_GVK, NODE_POOL_GVK,
};

use crate::{ClusterClient, ClusterConnector, ClusterSession, ControlPlane, DrainTool};

fn decode_err(e: anyhow::Error) -> VacateError {
    VacateError::Remote(format!("{:#}", e))
}

fn dynamic_api(client: &Client, key: &str, namespace: Option<&str>) -> VacateResult<Api<DynamicObject>> {
    let ar = api_resource(key).map_err(|e| VacateError::Config(format!("{:#}", e)))?;
    Ok(match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    })
}

/// Management-plane records read and written as `DynamicObject`s.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_cluster(&self, name: &str) -> VacateResult<ClusterRecord> {
        let obj = dynamic_api(&self.client, CLUSTER_GVK, None)?.get(name).await.map_err(map_kube_err)?;
        cluster_from_dynamic(&obj).map_err(decode_err)
    }

    /// Pool names may carry their namespace as `namespace:name`.
    async fn get_node_pool(&self, cluster: &str, name: &str) -> VacateResult<NodePool> {
        let (ns, pool) = name.split_once(':').unwrap_or((cluster, name));
        let obj = dynamic_api(&self.client, NODE_POOL_GVK, Some(ns))?.get(pool).await.map_err(map_kube_err)?;
        pool_from_dynamic(&obj).map_err(decode_err)
    }

    async fn get_node(&self, cluster: &str, name: &str) -> VacateResult<NodeRecord> {
        let obj = dynamic_api(&self.client, NODE_GVK, Some(cluster))?.get(name).await.map_err(map_kube_err)?;
        node_from_dynamic(&obj).map_err(decode_err)
    }

    async fn update_node(&self, node: &NodeRecord) -> VacateResult<NodeRecord> {
        let api = dynamic_api(&self.client, NODE_GVK, Some(&node.cluster))?;
        let mut latest = api.get(&node.name).await.map_err(map_kube_err)?;
        apply_markers(&mut latest, node);
        let stored = api.replace(&node.name, &PostParams::default(), &latest).await.map_err(map_kube_err)?;
        debug!(node = %node.name, rv = ?stored.metadata.resource_version, "node markers written");
        node_from_dynamic(&stored).map_err(decode_err)
    }
}

/// Jobs and nodes on one downstream cluster.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn find_job(&self, namespace: &str, selector: &str) -> VacateResult<Option<JobHandle>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let jobs = api.list(&ListParams::default().labels(selector)).await.map_err(map_kube_err)?;
        Ok(jobs
            .items
            .into_iter()
            .filter_map(|j| j.metadata.name)
            .next()
            .map(|name| JobHandle { namespace: namespace.to_string(), name }))
    }

    async fn create_job(&self, spec: &CleanupJobSpec) -> VacateResult<JobHandle> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &spec.namespace);
        let created = api.create(&PostParams::default(), &render_cleanup_job(spec)).await.map_err(map_kube_err)?;
        let name = created.metadata.name.ok_or_else(|| VacateError::Remote("created job has no name".into()))?;
        Ok(JobHandle { namespace: spec.namespace.clone(), name })
    }

    async fn job_status(&self, job: &JobHandle) -> VacateResult<CleanupJobStatus> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &job.namespace);
        let j = api.get(&job.name).await.map_err(map_kube_err)?;
        Ok(CleanupJobStatus::from_job(&j))
    }

    async fn delete_node(&self, name: &str) -> VacateResult<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await.map_err(map_kube_err)?;
        Ok(())
    }
}

/// Pod picked for eviction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvictionTarget {
    pub namespace: String,
    pub name: String,
}

/// Pods to evict from a node under `req`. DaemonSet and mirror pods are always
/// left in place; a pod the flags forbid evicting fails the whole drain.
pub fn eviction_targets(pods: &[Pod], req: &DrainRequest) -> VacateResult<Vec<EvictionTarget>> {
    let mut targets = Vec::new();
    let mut refused = Vec::new();
    for p in pods {
        let meta = &p.metadata;
        let (Some(ns), Some(name)) = (meta.namespace.clone(), meta.name.clone()) else { continue };
        let owners = meta.owner_references.as_deref().unwrap_or_default();
        if owners.iter().any(|o| o.kind == "DaemonSet") {
            continue;
        }
        if meta.annotations.as_ref().and_then(|a| a.get("kubernetes.io/config.mirror")).is_some() {
            continue;
        }
        let phase = p.status.as_ref().and_then(|s| s.phase.as_deref());
        if matches!(phase, Some("Succeeded") | Some("Failed")) {
            continue;
        }
        let unmanaged = !owners.iter().any(|o| o.controller.unwrap_or(false));
        let local_data = p.spec.as_ref().and_then(|s| s.volumes.as_ref()).map(|vs| vs.iter().any(|v| v.empty_dir.is_some())).unwrap_or(false);
        if unmanaged && !req.force {
            refused.push(format!("{}/{} (not managed by a controller)", ns, name));
            continue;
        }
        if local_data && !req.delete_local_data {
            refused.push(format!("{}/{} (uses local storage)", ns, name));
            continue;
        }
        targets.push(EvictionTarget { namespace: ns, name });
    }
    if !refused.is_empty() {
        return Err(VacateError::Remote(format!("cannot evict: {}", refused.join(", "))));
    }
    Ok(targets)
}

/// Cordon, then evict through the eviction subresource until the node is empty.
#[derive(Clone)]
pub struct EvictionDrain {
    client: Client,
    poll: Duration,
}

impl EvictionDrain {
    pub fn new(client: Client) -> Self { Self { client, poll: Duration::from_secs(2) } }

    async fn cordon(&self, node: &str) -> VacateResult<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({"spec": {"unschedulable": true}});
        api.patch(node, &PatchParams::default(), &Patch::Merge(&patch)).await.map_err(map_kube_err)?;
        Ok(())
    }

    async fn targets(&self, node: &str, req: &DrainRequest) -> VacateResult<Vec<EvictionTarget>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().fields(&format!("spec.nodeName={}", node));
        let list = pods.list(&lp).await.map_err(map_kube_err)?;
        eviction_targets(&list.items, req)
    }

    async fn evict_all(&self, targets: &[EvictionTarget], req: &DrainRequest) {
        let ep = EvictParams {
            delete_options: Some(DeleteParams { grace_period_seconds: Some(req.grace_period), ..Default::default() }),
            ..Default::default()
        };
        let evictions = targets.iter().map(|t| {
            let api: Api<Pod> = Api::namespaced(self.client.clone(), &t.namespace);
            let ep = ep.clone();
            async move {
                match api.evict(&t.name, &ep).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(ae)) if ae.code == 429 => {
                        warn!(ns = %t.namespace, pod = %t.name, "eviction blocked by disruption budget, will retry");
                    }
                    Err(e) if vacate_kubehub::is_not_found(&e) => {}
                    Err(e) => warn!(ns = %t.namespace, pod = %t.name, error = %e, "eviction error, will retry"),
                }
            }
        });
        join_all(evictions).await;
    }
}

#[async_trait]
impl DrainTool for EvictionDrain {
    async fn drain(&self, node: &str, req: &DrainRequest) -> VacateResult<String> {
        self.cordon(node).await?;
        let deadline = Instant::now() + req.timeout();
        let mut evicted: HashSet<EvictionTarget> = HashSet::new();
        loop {
            let pending = self.targets(node, req).await?;
            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                let remain: Vec<String> = pending.iter().map(|t| format!("{}/{}", t.namespace, t.name)).collect();
                return Err(VacateError::Timeout(format!("drain timeout; remaining: {}", remain.join(", "))));
            }
            self.evict_all(&pending, req).await;
            evicted.extend(pending);
            tokio::time::sleep(self.poll).await;
        }
        info!(node, pods = evicted.len(), "node drained");
        Ok(format!("node/{} drained ({} pods evicted)", node, evicted.len()))
    }
}

/// Connects to downstream clusters through kubeconfig contexts named after them.
#[derive(Debug, Clone, Default)]
pub struct KubeConnector;

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, cluster: &str) -> VacateResult<ClusterSession> {
        let client = vacate_kubehub::cluster_client(cluster).await?;
        Ok(ClusterSession {
            client: Arc::new(KubeClusterClient::new(client.clone())),
            drain: Arc::new(EvictionDrain::new(client)),
        })
    }
}
