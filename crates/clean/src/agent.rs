//! Agent side of the cleanup job: launch the host cleaner container once.

use serde::Serialize;
use tracing::info;
use vacate_core::{TargetOs, VacateConfig, VacateResult};

use crate::engine::{ContainerEngine, ContainerLaunch};
use crate::script::LINUX_HOST_MOUNT;
use crate::CLEANER_CONTAINER_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LaunchOutcome {
    /// A cleaner from an earlier dispatch is still around; nothing was started.
    AlreadyRunning,
    Launched { id: String },
}

/// Container description for the host cleaner on `os`.
pub fn cleaner_launch(cfg: &VacateConfig, os: TargetOs) -> ContainerLaunch {
    let args = vec!["--".to_string(), "agent".to_string(), "clean".to_string(), "node".to_string()];
    match os {
        TargetOs::Linux => ContainerLaunch {
            name: CLEANER_CONTAINER_NAME.to_string(),
            image: cfg.agent_image.clone(),
            args,
            env: cfg.agent_env(),
            binds: vec!["/var/run/docker.sock:/var/run/docker.sock".to_string(), format!("/:{}", LINUX_HOST_MOUNT)],
            privileged: true,
            host_network: true,
            host_pid: true,
        },
        TargetOs::Windows => ContainerLaunch {
            name: CLEANER_CONTAINER_NAME.to_string(),
            image: cfg.agent_image.clone(),
            args,
            env: cfg.agent_env(),
            binds: vec![
                "\\\\.\\pipe\\docker_engine:\\\\.\\pipe\\docker_engine".to_string(),
                "c:\\:c:\\host".to_string(),
                "\\\\.\\pipe\\rancher_wins:\\\\.\\pipe\\rancher_wins".to_string(),
            ],
            privileged: false,
            host_network: false,
            host_pid: false,
        },
    }
}

/// Start the cleaner unless one by the reserved name already exists.
pub async fn launch_cleaner<E: ContainerEngine + ?Sized>(engine: &E, cfg: &VacateConfig, os: TargetOs) -> VacateResult<LaunchOutcome> {
    let existing = engine.list_containers().await?;
    if let Some(c) = existing.iter().find(|c| c.has_name(CLEANER_CONTAINER_NAME)) {
        info!(id = %c.id, "cleaner container already present, skipping launch");
        return Ok(LaunchOutcome::AlreadyRunning);
    }
    let id = engine.run_detached(&cleaner_launch(cfg, os)).await?;
    Ok(LaunchOutcome::Launched { id })
}
