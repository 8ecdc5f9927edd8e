//! Host teardown sequence run inside the cleaner container.

use std::path::{Path, PathBuf};
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use vacate_core::{retry_bounded, Attempt, CleanupOptions, RetryOutcome, RetryPolicy, VacateResult};

use crate::engine::{ContainerEngine, ContainerSummary};
use crate::gateway::{RemoteExec, RemoteExecGateway};
use crate::script::{CleanupStep, CleanupSteps};
use crate::CLEANER_CONTAINER_NAME;

/// Containers the kubelet manages are named with this prefix.
pub const WORKLOAD_CONTAINER_PREFIX: &str = "k8s_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Done,
    /// Budget ran out; the sequence went on regardless.
    GaveUp { attempts: u32 },
    Killed { containers: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: CleanupStep,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub script: PathBuf,
    pub steps: Vec<StepReport>,
}

pub struct HostCleaner<E, X> {
    engine: E,
    gateway: RemoteExecGateway<X>,
    managed_image_prefix: String,
    opts: CleanupOptions,
    wait_policy: RetryPolicy,
    cancel: CancellationToken,
    /// Joined in front of the container-side script path; `None` in production.
    root: Option<PathBuf>,
}

impl<E: ContainerEngine, X: RemoteExec> HostCleaner<E, X> {
    pub fn new(engine: E, gateway: RemoteExecGateway<X>, managed_image_prefix: impl Into<String>, opts: CleanupOptions) -> Self {
        Self {
            engine,
            gateway,
            managed_image_prefix: managed_image_prefix.into(),
            opts,
            wait_policy: RetryPolicy::wait_for_workloads(),
            cancel: CancellationToken::new(),
            root: None,
        }
    }

    pub fn with_wait_policy(mut self, policy: RetryPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Where the script is written from inside the container.
    pub fn script_location(&self) -> PathBuf {
        let p = self.gateway.script().container_path(self.gateway.script_path());
        match &self.root {
            Some(root) => root.join(p.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(p),
        }
    }

    /// Write the script, replacing whatever is there.
    pub async fn materialize_script(&self) -> VacateResult<PathBuf> {
        let target = self.script_location();
        write_script(&target, &self.gateway.script().render()).await?;
        info!(path = %target.display(), os = %self.gateway.script().os(), "materialized cleanup script");
        Ok(target)
    }

    /// Full teardown: script first, then every enabled step in order. The first
    /// failing step aborts the rest; completed steps are not undone.
    #[instrument(skip(self), fields(os = %self.gateway.script().os()))]
    pub async fn run(&self) -> VacateResult<CleanupReport> {
        let script = self.materialize_script().await?;
        let mut report = CleanupReport { script, steps: Vec::new() };
        for step in self.gateway.script().sequence(&self.opts) {
            report.steps.push(self.run_step(step).await?);
        }
        info!(steps = report.steps.len(), "host cleanup finished");
        Ok(report)
    }

    pub async fn run_step(&self, step: CleanupStep) -> VacateResult<StepReport> {
        let started = Instant::now();
        let outcome = match step {
            CleanupStep::WaitForWorkloads => self.wait_for_workloads().await?,
            CleanupStep::Containers => self.stop_managed_containers().await?,
            _ => {
                self.gateway.run_step(step).await?;
                StepOutcome::Done
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        histogram!("cleanup_step_ms", elapsed_ms as f64, "step" => step.name());
        info!(step = %step, ?outcome, elapsed_ms, "cleanup step finished");
        Ok(StepReport { step, outcome, elapsed_ms })
    }

    async fn wait_for_workloads(&self) -> VacateResult<StepOutcome> {
        let out = retry_bounded(&self.wait_policy, "wait_for_workloads", &self.cancel, |_| async {
            let running = self.engine.list_containers().await?.into_iter().filter(is_workload).count();
            Ok(if running == 0 { Attempt::Done(()) } else { Attempt::Pending(format!("{} workload containers left", running)) })
        })
        .await?;
        match out {
            RetryOutcome::Completed { .. } => Ok(StepOutcome::Done),
            RetryOutcome::Exhausted { attempts } => {
                warn!(attempts, "workload containers still present, continuing");
                Ok(StepOutcome::GaveUp { attempts })
            }
        }
    }

    async fn stop_managed_containers(&self) -> VacateResult<StepOutcome> {
        let mut killed = 0;
        for c in self.engine.list_containers().await? {
            if c.has_name(CLEANER_CONTAINER_NAME) {
                continue;
            }
            let image = match self.engine.inspect_image(&c.id).await {
                Ok(image) => image,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if !image.starts_with(&self.managed_image_prefix) {
                continue;
            }
            match self.engine.kill(&c.id).await {
                Ok(()) => {
                    info!(id = %c.id, %image, "killed managed container");
                    killed += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(StepOutcome::Killed { containers: killed })
    }
}

fn is_workload(c: &ContainerSummary) -> bool {
    c.names.iter().any(|n| n.trim_start_matches('/').starts_with(WORKLOAD_CONTAINER_PREFIX))
}

async fn write_script(target: &Path, body: &str) -> VacateResult<()> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(target, body).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(0o777)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockContainerEngine;
    use crate::gateway::{HelperOutput, MockRemoteExec};
    use crate::script::PlatformCleanupScript;
    use std::time::Duration;
    use vacate_core::{TargetOs, VacateConfig, VacateError};

    fn summary(id: &str, name: &str) -> ContainerSummary {
        ContainerSummary { id: id.into(), names: vec![name.into()], image: String::new() }
    }

    fn cleaner(engine: MockContainerEngine, exec: MockRemoteExec, os: TargetOs) -> HostCleaner<MockContainerEngine, MockRemoteExec> {
        let cfg = VacateConfig::default();
        let gw = RemoteExecGateway::new(exec, PlatformCleanupScript::for_os(os, &cfg), cfg.script_path(os));
        HostCleaner::new(engine, gw, cfg.managed_image_prefix.clone(), CleanupOptions::default())
            .with_wait_policy(RetryPolicy::fixed(3, Duration::from_secs(10)))
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_and_continues() {
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().times(3).returning(|| Ok(vec![summary("a", "k8s_web_web-0")]));
        let c = cleaner(engine, MockRemoteExec::new(), TargetOs::Linux);
        let r = c.run_step(CleanupStep::WaitForWorkloads).await.expect("no error");
        assert_eq!(r.outcome, StepOutcome::GaveUp { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn wait_finishes_once_workloads_are_gone() {
        let mut engine = MockContainerEngine::new();
        let mut seq = mockall::Sequence::new();
        engine.expect_list_containers().times(1).in_sequence(&mut seq).returning(|| Ok(vec![summary("a", "/k8s_POD_x")]));
        engine.expect_list_containers().times(1).in_sequence(&mut seq).returning(|| Ok(vec![summary("b", "kubelet")]));
        let c = cleaner(engine, MockRemoteExec::new(), TargetOs::Linux);
        assert_eq!(c.run_step(CleanupStep::WaitForWorkloads).await.expect("ok").outcome, StepOutcome::Done);
    }

    #[tokio::test]
    async fn only_managed_images_are_killed() {
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().returning(|| {
            Ok(vec![summary("k1", "kubelet"), summary("u1", "user-app"), summary("self", CLEANER_CONTAINER_NAME), summary("gone", "proxy")])
        });
        engine.expect_inspect_image().returning(|id| match id {
            "k1" => Ok("vacate/hyperkube:v1.28".into()),
            "u1" => Ok("nginx:1.25".into()),
            "gone" => Err(VacateError::NotFound("No such object".into())),
            other => panic!("unexpected inspect of {}", other),
        });
        engine.expect_kill().withf(|id| id == "k1").times(1).returning(|_| Ok(()));
        let c = cleaner(engine, MockRemoteExec::new(), TargetOs::Linux);
        assert_eq!(c.run_step(CleanupStep::Containers).await.expect("ok").outcome, StepOutcome::Killed { containers: 1 });
    }

    #[tokio::test]
    async fn failing_step_aborts_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().returning(|| Ok(Vec::new()));
        let mut exec = MockRemoteExec::new();
        exec.expect_run()
            .withf(|cmd| cmd.args.last().map(String::as_str) == Some("Paths"))
            .times(1)
            .returning(|_| Ok(HelperOutput { code: 1, stdout: String::new(), stderr: "rm: busy".into() }));
        let c = cleaner(engine, exec, TargetOs::Linux).with_root(dir.path());
        let err = c.run().await.expect_err("aborts");
        assert!(err.is_permanent());
        assert!(dir.path().join("host/etc/vacate/cleanup.sh").exists());
    }

    #[tokio::test]
    async fn script_is_overwritten_and_executable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let c = cleaner(MockContainerEngine::new(), MockRemoteExec::new(), TargetOs::Linux).with_root(dir.path());
        let target = c.script_location();
        std::fs::create_dir_all(target.parent().expect("parent")).expect("mkdir");
        std::fs::write(&target, "stale").expect("write");
        let written = c.materialize_script().await.expect("materialize");
        let body = std::fs::read_to_string(&written).expect("read");
        assert!(body.starts_with("#!/bin/bash"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&written).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o777);
        }
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().returning(|| Ok(vec![summary("a", "k8s_x")]));
        let token = CancellationToken::new();
        token.cancel();
        let c = cleaner(engine, MockRemoteExec::new(), TargetOs::Linux).with_cancel(token);
        assert_eq!(c.run_step(CleanupStep::WaitForWorkloads).await, Err(VacateError::Cancelled));
    }
}
