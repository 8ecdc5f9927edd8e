//! Vacate core types: node records, decommission markers, retry policy and errors.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod marker;
pub mod node;
pub mod retry;

pub use config::{CleanupOptions, TargetOs, VacateConfig};
pub use error::{VacateError, VacateResult};
pub use marker::MarkerState;
pub use node::{drain_before_delete, ClusterRecord, DrainRequest, NodePool, NodeRecord, Taint};
pub use retry::{call_with_deadline, retry_bounded, Attempt, RetryOutcome, RetryPolicy, REMOTE_CALL_DEADLINE};

pub mod prelude {
    pub use super::{
        Attempt, ClusterRecord, DrainRequest, MarkerState, NodePool, NodeRecord, RetryOutcome, RetryPolicy, TargetOs,
        VacateConfig, VacateError, VacateResult,
    };
}
