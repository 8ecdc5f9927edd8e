//! Cleanup job dispatch and completion polling.

use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vacate_core::{
    call_with_deadline, retry_bounded, Attempt, ClusterRecord, NodeRecord, RetryOutcome, RetryPolicy, VacateConfig, VacateResult,
    REMOTE_CALL_DEADLINE,
};
use vacate_kubehub::{CleanupJobSpec, CleanupJobStatus, HostMount, JobHandle};

use crate::ClusterClient;

/// Schedules the cleanup job for a node, reusing one that already carries the node's label.
#[derive(Debug, Clone)]
pub struct CleanupJobDispatcher {
    cfg: VacateConfig,
    /// Bound on each of the lookup and create calls.
    deadline: Duration,
    cancel: CancellationToken,
}

impl CleanupJobDispatcher {
    pub fn new(cfg: VacateConfig) -> Self {
        Self { cfg, deadline: REMOTE_CALL_DEADLINE, cancel: CancellationToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn build_spec(&self, cluster: &ClusterRecord, node: &NodeRecord) -> CleanupJobSpec {
        let cfg = self.cfg.for_cluster(cluster);
        let os = node.target_os();
        CleanupJobSpec {
            namespace: cfg.job_namespace.clone(),
            node_name: node.node_name.clone(),
            os,
            image: cfg.agent_image.clone(),
            env: cfg.agent_env(),
            mounts: HostMount::for_os(os),
            taints: node.taints.clone(),
            ttl_secs: cfg.job_ttl_secs,
        }
    }

    pub async fn dispatch(&self, client: &dyn ClusterClient, cluster: &ClusterRecord, node: &NodeRecord) -> VacateResult<JobHandle> {
        let spec = self.build_spec(cluster, node);
        let selector = spec.selector();
        let found = call_with_deadline(self.deadline, "find_cleanup_job", &self.cancel, client.find_job(&spec.namespace, &selector)).await?;
        if let Some(existing) = found {
            info!(node = %node.node_name, job = %existing.name, "cleanup job already dispatched, reusing");
            return Ok(existing);
        }
        let job = call_with_deadline(self.deadline, "create_cleanup_job", &self.cancel, client.create_job(&spec)).await?;
        info!(node = %node.node_name, job = %job.name, ns = %job.namespace, os = %spec.os, "dispatched cleanup job");
        Ok(job)
    }
}

/// Polls a cleanup job within a fixed budget.
#[derive(Debug, Clone)]
pub struct JobCompletionWatcher {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl JobCompletionWatcher {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { policy: RetryPolicy::job_completion(), cancel }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `true` once the job reports success. Running out of attempts yields
    /// `Ok(false)`; a job that no longer exists counts as finished.
    pub async fn await_completion(&self, client: &dyn ClusterClient, job: &JobHandle) -> VacateResult<bool> {
        let out = retry_bounded(&self.policy, "await_cleanup_job", &self.cancel, |_| async move {
            counter!("cleanup_job_poll_total", 1u64);
            match client.job_status(job).await {
                Ok(CleanupJobStatus::Succeeded) => Ok(Attempt::Done(true)),
                Ok(status) => Ok(Attempt::Pending(format!("job {} is {:?}", job.name, status))),
                Err(e) if e.is_not_found() => Ok(Attempt::Done(true)),
                Err(e) => Err(e),
            }
        })
        .await?;
        match out {
            RetryOutcome::Completed { value, .. } => Ok(value),
            RetryOutcome::Exhausted { attempts } => {
                warn!(job = %job.name, attempts, "cleanup job did not finish in time");
                Ok(false)
            }
        }
    }
}
