//! Explicit configuration handed to every component at construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::ClusterRecord;
use crate::VacateError;

pub const DEFAULT_AGENT_IMAGE: &str = "vacate/vacate-agent:master";
pub const DEFAULT_PREFIX_PATH: &str = "/";
pub const DEFAULT_WINDOWS_PREFIX_PATH: &str = "c:\\";
pub const DEFAULT_JOB_NAMESPACE: &str = "default";
pub const DEFAULT_JOB_TTL_SECS: i32 = 5 * 60;
pub const DEFAULT_HELPER_BINARY: &str = "wins.exe";

pub const ENV_AGENT_IMAGE: &str = "AGENT_IMAGE";
pub const ENV_PREFIX_PATH: &str = "PREFIX_PATH";
pub const ENV_WINDOWS_PREFIX_PATH: &str = "WINDOWS_PREFIX_PATH";

/// Label carrying the operating system a node reports.
pub const OS_LABEL: &str = "kubernetes.io/os";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VacateConfig {
    /// Image used for the cleanup job and the host-side cleaner container.
    pub agent_image: String,
    /// Host prefix under which Linux nodes keep their state.
    pub prefix_path: String,
    /// Host prefix under which Windows nodes keep their state.
    pub windows_prefix_path: String,
    pub job_namespace: String,
    pub job_ttl_secs: i32,
    /// Containers running images under this prefix are force-killed on the host.
    pub managed_image_prefix: String,
    pub helper_binary: String,
}

impl Default for VacateConfig {
    fn default() -> Self {
        Self {
            agent_image: DEFAULT_AGENT_IMAGE.to_string(),
            prefix_path: DEFAULT_PREFIX_PATH.to_string(),
            windows_prefix_path: DEFAULT_WINDOWS_PREFIX_PATH.to_string(),
            job_namespace: DEFAULT_JOB_NAMESPACE.to_string(),
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
            managed_image_prefix: image_namespace(DEFAULT_AGENT_IMAGE),
            helper_binary: DEFAULT_HELPER_BINARY.to_string(),
        }
    }
}

impl VacateConfig {
    /// Read `AGENT_IMAGE`, `PREFIX_PATH` and `WINDOWS_PREFIX_PATH` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup. Empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(image) = get(ENV_AGENT_IMAGE) { cfg = cfg.with_agent_image(image); }
        if let Some(p) = get(ENV_PREFIX_PATH) { cfg.prefix_path = p; }
        if let Some(p) = get(ENV_WINDOWS_PREFIX_PATH) { cfg.windows_prefix_path = p; }
        cfg
    }

    /// Replace the agent image; the managed image prefix follows the image's repository namespace.
    pub fn with_agent_image(mut self, image: impl Into<String>) -> Self {
        self.agent_image = image.into();
        let ns = image_namespace(&self.agent_image);
        if !ns.is_empty() { self.managed_image_prefix = ns; }
        self
    }

    /// Apply per-cluster path overrides (empty overrides are ignored).
    pub fn for_cluster(&self, cluster: &ClusterRecord) -> Self {
        let mut cfg = self.clone();
        if let Some(p) = cluster.prefix_path.as_deref().filter(|p| !p.is_empty()) { cfg.prefix_path = p.to_string(); }
        if let Some(p) = cluster.windows_prefix_path.as_deref().filter(|p| !p.is_empty()) { cfg.windows_prefix_path = p.to_string(); }
        cfg
    }

    /// Environment mirrored into the cleanup job and the host cleaner container.
    pub fn agent_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_AGENT_IMAGE.to_string(), self.agent_image.clone());
        env.insert(ENV_PREFIX_PATH.to_string(), self.prefix_path.clone());
        env.insert(ENV_WINDOWS_PREFIX_PATH.to_string(), self.windows_prefix_path.clone());
        env
    }

    /// Host path of the materialized cleanup script.
    pub fn script_path(&self, os: TargetOs) -> String {
        match os {
            TargetOs::Linux => {
                let prefix = self.prefix_path.trim_end_matches('/');
                format!("{}/etc/vacate/{}", prefix, os.script_file_name())
            }
            TargetOs::Windows => {
                let prefix = self.windows_prefix_path.trim_end_matches(['\\', '/']);
                format!("{}\\etc\\vacate\\{}", prefix, os.script_file_name())
            }
        }
    }
}

/// Repository namespace of an image reference, including the trailing slash.
///
/// `registry.local:5000/vacate/agent:v1` -> `registry.local:5000/vacate/`; images
/// without a namespace yield an empty string.
pub fn image_namespace(image: &str) -> String {
    let repo = image.split('@').next().unwrap_or(image);
    match repo.rfind('/') {
        Some(idx) => repo[..=idx].to_string(),
        None => String::new(),
    }
}

/// Operating system of the node being torn down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    #[default]
    Linux,
    Windows,
}

impl TargetOs {
    /// OS of the binary currently running.
    pub fn current() -> Self {
        if cfg!(windows) { TargetOs::Windows } else { TargetOs::Linux }
    }

    /// Resolve from the labels a node reports; anything but `windows` is Linux.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        match labels.get(OS_LABEL).map(|s| s.as_str()) {
            Some("windows") => TargetOs::Windows,
            _ => TargetOs::Linux,
        }
    }

    pub fn script_file_name(&self) -> &'static str {
        match self {
            TargetOs::Linux => "cleanup.sh",
            TargetOs::Windows => "cleanup.ps1",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOs::Linux => f.write_str("linux"),
            TargetOs::Windows => f.write_str("windows"),
        }
    }
}

impl FromStr for TargetOs {
    type Err = VacateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(TargetOs::Linux),
            "windows" => Ok(TargetOs::Windows),
            other => Err(VacateError::Config(format!("unknown os: {}", other))),
        }
    }
}

/// Host-side switches for the optional teardown steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Remove images and volumes left on the container engine.
    pub prune_images: bool,
    /// Flush firewall state and recycle the container engine.
    pub flush_firewall: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self { prune_images: false, flush_firewall: true }
    }
}
