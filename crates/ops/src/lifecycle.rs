//! Node decommission state machine: drain, dispatch, await, delete, finalize.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use vacate_core::marker::{self, MarkerState};
use vacate_core::{call_with_deadline, ClusterRecord, NodeRecord, VacateConfig, VacateError, VacateResult, REMOTE_CALL_DEADLINE};
use vacate_kubehub::JobHandle;

use crate::dispatch::{CleanupJobDispatcher, JobCompletionWatcher};
use crate::drain::{DrainCoordinator, DrainOutcome};
use crate::{ClusterConnector, ClusterSession, ControlPlane};

/// Upper bound on deleting the node from its cluster.
pub const NODE_DELETE_DEADLINE: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeDeletion {
    Deleted,
    AlreadyGone,
    /// Deadline hit; treated as done.
    DeadlineExpired,
    /// Node is unmanaged, unregistered or its cluster is gone.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecommissionReport {
    pub node: String,
    pub started_at: DateTime<Utc>,
    pub drain: DrainOutcome,
    pub job: Option<JobHandle>,
    pub cleanup_confirmed: bool,
    pub deletion: NodeDeletion,
    /// Markers were already in the completed state; nothing ran.
    pub already_complete: bool,
}

impl DecommissionReport {
    fn new(node: &NodeRecord) -> Self {
        Self {
            node: node.display_name().to_string(),
            started_at: Utc::now(),
            drain: DrainOutcome::Skipped,
            job: None,
            cleanup_confirmed: false,
            deletion: NodeDeletion::Skipped,
            already_complete: false,
        }
    }
}

pub struct NodeLifecycleOrchestrator {
    control: Arc<dyn ControlPlane>,
    connector: Arc<dyn ClusterConnector>,
    drainer: DrainCoordinator,
    dispatcher: CleanupJobDispatcher,
    watcher: JobCompletionWatcher,
    delete_deadline: Duration,
    /// Bound on control-plane reads and writes and on connecting to the cluster.
    call_deadline: Duration,
    cancel: CancellationToken,
}

impl NodeLifecycleOrchestrator {
    pub fn new(control: Arc<dyn ControlPlane>, connector: Arc<dyn ClusterConnector>, cfg: VacateConfig, cancel: CancellationToken) -> Self {
        Self {
            drainer: DrainCoordinator::new(control.clone(), cancel.child_token()),
            dispatcher: CleanupJobDispatcher::new(cfg).with_cancel(cancel.child_token()),
            watcher: JobCompletionWatcher::new(cancel.child_token()),
            control,
            connector,
            delete_deadline: NODE_DELETE_DEADLINE,
            call_deadline: REMOTE_CALL_DEADLINE,
            cancel,
        }
    }

    pub fn with_watcher(mut self, watcher: JobCompletionWatcher) -> Self {
        self.watcher = watcher;
        self
    }

    /// Reset the node to a single "removal requested" marker and persist it when it changed.
    ///
    /// `decommission` calls this itself for unmarked nodes, so the finalizer
    /// protects the node before any teardown starts.
    pub async fn mark_removal_in_progress(&self, mut node: NodeRecord) -> VacateResult<NodeRecord> {
        if !marker::mark_requested(&mut node) {
            return Ok(node);
        }
        let updated = call_with_deadline(self.call_deadline, "update_node", &self.cancel, self.control.update_node(&node)).await?;
        info!(node = %updated.display_name(), cluster = %updated.cluster, "node marked for removal");
        Ok(updated)
    }

    /// Run the whole workflow for `node`.
    ///
    /// Drain and cleanup failures are logged and skipped over. Control-plane
    /// errors other than not-found are returned so the caller can retry.
    #[instrument(skip(self, node), fields(node = %node.display_name(), cluster = %node.cluster))]
    pub async fn decommission(&self, mut node: NodeRecord) -> VacateResult<(NodeRecord, DecommissionReport)> {
        let mut report = DecommissionReport::new(&node);
        if marker::state(&node) == MarkerState::Completed {
            report.already_complete = true;
            return Ok((node, report));
        }
        if marker::state(&node) == MarkerState::Absent {
            node = self.mark_removal_in_progress(node).await?;
        }

        match call_with_deadline(self.call_deadline, "get_cluster", &self.cancel, self.control.get_cluster(&node.cluster)).await {
            Ok(cluster) => self.teardown(&node, &cluster, &mut report).await?,
            Err(e) if e.is_not_found() => info!("cluster already gone, nothing to clean"),
            Err(e) => return Err(e),
        }

        if marker::mark_completed(&mut node) {
            node = match call_with_deadline(self.call_deadline, "update_node", &self.cancel, self.control.update_node(&node)).await {
                Ok(updated) => updated,
                Err(e) if e.is_not_found() => node,
                Err(e) => return Err(e),
            };
        }
        counter!("decommission_total", 1u64, "deletion" => format!("{:?}", report.deletion));
        info!(drain = ?report.drain, cleanup_confirmed = report.cleanup_confirmed, deletion = ?report.deletion, "node decommissioned");
        Ok((node, report))
    }

    async fn teardown(&self, node: &NodeRecord, cluster: &ClusterRecord, report: &mut DecommissionReport) -> VacateResult<()> {
        if node.is_unmanaged() || node.node_name.is_empty() {
            info!(unmanaged = node.is_unmanaged(), "node not managed here, skipping cluster cleanup");
            return Ok(());
        }
        let session = match call_with_deadline(self.call_deadline, "connect", &self.cancel, self.connector.connect(&cluster.name)).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => {
                info!("cluster unreachable by name, nothing to clean");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Drain failures end in GaveUp; only cancellation comes back as an error.
        report.drain = self.drainer.drain(node, cluster, session.drain.as_ref()).await?;

        self.cleanup(node, cluster, &session, report).await?;
        report.deletion = self.delete_node(&session, &node.node_name).await?;
        Ok(())
    }

    async fn cleanup(&self, node: &NodeRecord, cluster: &ClusterRecord, session: &ClusterSession, report: &mut DecommissionReport) -> VacateResult<()> {
        let job = match self.dispatcher.dispatch(session.client.as_ref(), cluster, node).await {
            Ok(job) => job,
            Err(VacateError::Cancelled) => return Err(VacateError::Cancelled),
            Err(e) => {
                warn!(error = %e, "could not dispatch cleanup job, continuing");
                return Ok(());
            }
        };
        report.cleanup_confirmed = self.watcher.await_completion(session.client.as_ref(), &job).await?;
        if !report.cleanup_confirmed {
            warn!(job = %job.name, "cleanup job incomplete, removing node anyway");
        }
        report.job = Some(job);
        Ok(())
    }

    async fn delete_node(&self, session: &ClusterSession, name: &str) -> VacateResult<NodeDeletion> {
        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(VacateError::Cancelled),
            res = tokio::time::timeout(self.delete_deadline, session.client.delete_node(name)) => res,
        };
        match res {
            Ok(Ok(())) => {
                info!(node = name, "node deleted");
                Ok(NodeDeletion::Deleted)
            }
            Ok(Err(e)) if e.is_not_found() => Ok(NodeDeletion::AlreadyGone),
            Ok(Err(VacateError::Timeout(msg))) => {
                warn!(node = name, error = %msg, "node delete timed out, treating as done");
                Ok(NodeDeletion::DeadlineExpired)
            }
            Err(_) => {
                warn!(node = name, "node delete exceeded deadline, treating as done");
                Ok(NodeDeletion::DeadlineExpired)
            }
            Ok(Err(e)) => {
                error!(node = name, error = %e, "node delete failed");
                Err(e)
            }
        }
    }
}
