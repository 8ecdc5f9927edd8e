//! Vacate clean: host teardown scripts, container engine access and the exec gateway.

#![forbid(unsafe_code)]

pub mod agent;
pub mod engine;
pub mod gateway;
pub mod host;
pub mod script;

use std::sync::Arc;

use async_trait::async_trait;
use vacate_core::VacateResult;

pub use agent::{cleaner_launch, launch_cleaner, LaunchOutcome};
pub use engine::{ContainerEngine, ContainerLaunch, ContainerSummary, DockerCli};
pub use gateway::{HelperOutput, ProcessExec, RemoteExec, RemoteExecGateway};
pub use host::{CleanupReport, HostCleaner, StepOutcome, StepReport};
pub use script::{CleanupStep, CleanupSteps, HelperCommand, LinuxCleanupScript, PlatformCleanupScript, WindowsCleanupScript};

/// Reserved name of the detached cleaner container; at most one per host.
pub const CLEANER_CONTAINER_NAME: &str = "vacate-node-cleanup";

#[async_trait]
impl<T: ContainerEngine + ?Sized> ContainerEngine for Arc<T> {
    async fn list_containers(&self) -> VacateResult<Vec<ContainerSummary>> { (**self).list_containers().await }
    async fn inspect_image(&self, id: &str) -> VacateResult<String> { (**self).inspect_image(id).await }
    async fn kill(&self, id: &str) -> VacateResult<()> { (**self).kill(id).await }
    async fn run_detached(&self, launch: &ContainerLaunch) -> VacateResult<String> { (**self).run_detached(launch).await }
}

#[async_trait]
impl<T: RemoteExec + ?Sized> RemoteExec for Arc<T> {
    async fn run(&self, cmd: &HelperCommand) -> VacateResult<HelperOutput> { (**self).run(cmd).await }
}
