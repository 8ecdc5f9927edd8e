//! Best-effort workload eviction ahead of node removal.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vacate_core::{
    call_with_deadline, drain_before_delete, retry_bounded, Attempt, ClusterRecord, DrainRequest, NodeRecord, RetryOutcome, RetryPolicy,
    VacateError, VacateResult, REMOTE_CALL_DEADLINE,
};

use crate::{ControlPlane, DrainTool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DrainOutcome {
    /// Policy does not ask for a drain.
    Skipped,
    Drained { attempts: u32 },
    /// Every attempt failed; removal goes ahead anyway.
    GaveUp { attempts: u32 },
}

pub struct DrainCoordinator {
    control: Arc<dyn ControlPlane>,
    cancel: CancellationToken,
}

impl DrainCoordinator {
    pub fn new(control: Arc<dyn ControlPlane>, cancel: CancellationToken) -> Self {
        Self { control, cancel }
    }

    async fn required(&self, node: &NodeRecord, cluster: &ClusterRecord) -> VacateResult<bool> {
        let pool = match node.pool.as_deref() {
            Some(name) => match call_with_deadline(
                REMOTE_CALL_DEADLINE,
                "get_node_pool",
                &self.cancel,
                self.control.get_node_pool(&cluster.name, name),
            )
            .await
            {
                Ok(pool) => Some(pool),
                Err(VacateError::Cancelled) => return Err(VacateError::Cancelled),
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(node = %node.display_name(), pool = name, error = %e, "node pool lookup failed, using cluster policy");
                    }
                    None
                }
            },
            None => None,
        };
        Ok(drain_before_delete(node, cluster, pool.as_ref()))
    }

    /// Drain `node` when policy asks for it. Failed attempts are retried and then
    /// given up on; only cancellation is returned as an error.
    pub async fn drain(&self, node: &NodeRecord, cluster: &ClusterRecord, tool: &dyn DrainTool) -> VacateResult<DrainOutcome> {
        if node.node_name.is_empty() || !self.required(node, cluster).await? {
            debug!(node = %node.display_name(), "drain not required");
            return Ok(DrainOutcome::Skipped);
        }
        let req = DrainRequest::for_node(node);
        let policy = RetryPolicy::drain(req.timeout());
        let target = node.node_name.as_str();
        info!(node = target, force = req.force, delete_local_data = req.delete_local_data, grace = req.grace_period, timeout = req.timeout, "draining node");

        let out = retry_bounded(&policy, "drain", &self.cancel, |_| {
            let req = &req;
            async move {
                counter!("drain_attempts_total", 1u64);
                let output = tool.drain(target, req).await?;
                Ok(Attempt::Done(output))
            }
        })
        .await?;
        match out {
            RetryOutcome::Completed { value, attempts } => {
                info!(node = target, attempts, output = %value.trim(), "node drained");
                Ok(DrainOutcome::Drained { attempts })
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!(node = target, attempts, "drain failed, continuing with removal");
                Ok(DrainOutcome::GaveUp { attempts })
            }
        }
    }
}
