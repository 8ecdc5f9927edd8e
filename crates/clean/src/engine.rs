//! Container engine access on the node, via the `docker` CLI.

use std::collections::BTreeMap;
use std::process::Output;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};
use vacate_core::{VacateError, VacateResult};

/// Container as listed by the engine; names carry no leading slash.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }
}

/// Detached container the agent launches to run the host teardown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerLaunch {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// `host:container` bind specs.
    pub binds: Vec<String>,
    pub privileged: bool,
    pub host_network: bool,
    pub host_pid: bool,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// All containers, running or not.
    async fn list_containers(&self) -> VacateResult<Vec<ContainerSummary>>;

    /// Image reference the container was created from.
    async fn inspect_image(&self, id: &str) -> VacateResult<String>;

    /// Force-kill; a container that is already gone maps to `NotFound`.
    async fn kill(&self, id: &str) -> VacateResult<()>;

    /// Create and start a detached container, returning its id.
    async fn run_detached(&self, launch: &ContainerLaunch) -> VacateResult<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    image: String,
}

fn parse_ps(stdout: &str) -> VacateResult<Vec<ContainerSummary>> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let line: PsLine = serde_json::from_str(l).map_err(|e| VacateError::Remote(format!("decoding docker ps output: {}", e)))?;
            Ok(ContainerSummary {
                id: line.id,
                names: line.names.split(',').filter(|n| !n.is_empty()).map(|n| n.trim_start_matches('/').to_string()).collect(),
                image: line.image,
            })
        })
        .collect()
}

/// Engine backed by the `docker` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self { Self { binary: "docker".to_string() } }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self { Self { binary: binary.into() } }

    async fn exec(&self, args: &[&str]) -> VacateResult<Output> {
        debug!(binary = %self.binary, ?args, "invoking container engine");
        let out = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| VacateError::Local(format!("spawning {}: {}", self.binary, e)))?;
        if out.status.success() {
            return Ok(out);
        }
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if stderr.contains("No such container") || stderr.contains("No such object") {
            Err(VacateError::NotFound(stderr))
        } else {
            Err(VacateError::Remote(format!("{} {}: {}", self.binary, args.first().copied().unwrap_or_default(), stderr)))
        }
    }
}

pub fn run_args(launch: &ContainerLaunch) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), launch.name.clone()];
    if launch.privileged { args.push("--privileged".into()); }
    if launch.host_network { args.extend(["--network".to_string(), "host".to_string()]); }
    if launch.host_pid { args.extend(["--pid".to_string(), "host".to_string()]); }
    for b in &launch.binds {
        args.extend(["-v".to_string(), b.clone()]);
    }
    for (k, v) in &launch.env {
        args.extend(["-e".to_string(), format!("{}={}", k, v)]);
    }
    args.push(launch.image.clone());
    args.extend(launch.args.iter().cloned());
    args
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn list_containers(&self) -> VacateResult<Vec<ContainerSummary>> {
        let out = self.exec(&["ps", "-a", "--no-trunc", "--format", "{{json .}}"]).await?;
        parse_ps(&String::from_utf8_lossy(&out.stdout))
    }

    async fn inspect_image(&self, id: &str) -> VacateResult<String> {
        let out = self.exec(&["inspect", "--format", "{{.Config.Image}}", id]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    async fn kill(&self, id: &str) -> VacateResult<()> {
        self.exec(&["kill", "--signal", "SIGKILL", id]).await?;
        Ok(())
    }

    async fn run_detached(&self, launch: &ContainerLaunch) -> VacateResult<String> {
        let args = run_args(launch);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.exec(&refs).await?;
        let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
        info!(name = %launch.name, image = %launch.image, %id, "started container");
        Ok(id)
    }
}
