//! Cleanup job descriptor and its `batch/v1 Job` rendering.

use std::collections::BTreeMap;
use std::hash::Hasher;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, HostPathVolumeSource, PodSpec, PodTemplateSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use vacate_core::{Taint, TargetOs};

pub const CLEANUP_JOB_PREFIX: &str = "vacate-node-cleanup-";
/// Reserved label: at most one cleanup job per node carries it.
pub const CLEANUP_NODE_LABEL: &str = "vacate.io/cleanup-node";
pub const CREATOR_LABEL: &str = "vacate.io/creator";
pub const CLEANUP_CONTAINER_NAME: &str = "vacate-node-cleanup";
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DOCKER_PIPE: &str = "\\\\.\\pipe\\docker_engine";
pub const HELPER_PIPE: &str = "\\\\.\\pipe\\rancher_wins";

/// Host path mounted into the cleanup job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostMount {
    pub name: String,
    pub host_path: String,
    pub mount_path: String,
    /// Kubernetes host-path type (`Socket`); pipes carry none.
    pub path_type: Option<String>,
}

impl HostMount {
    /// Mounts required by the host-side script of `os`.
    pub fn for_os(os: TargetOs) -> Vec<HostMount> {
        match os {
            TargetOs::Linux => vec![HostMount {
                name: "docker".into(),
                host_path: DOCKER_SOCKET.into(),
                mount_path: DOCKER_SOCKET.into(),
                path_type: Some("Socket".into()),
            }],
            TargetOs::Windows => vec![
                HostMount { name: "docker".into(), host_path: DOCKER_PIPE.into(), mount_path: DOCKER_PIPE.into(), path_type: None },
                HostMount { name: "wins".into(), host_path: HELPER_PIPE.into(), mount_path: HELPER_PIPE.into(), path_type: None },
            ],
        }
    }
}

/// Everything needed to schedule one cleanup job. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupJobSpec {
    pub namespace: String,
    /// Exact `kubernetes.io/hostname` the job is pinned to.
    pub node_name: String,
    pub os: TargetOs,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<HostMount>,
    pub taints: Vec<Taint>,
    pub ttl_secs: i32,
}

impl CleanupJobSpec {
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(CLEANUP_NODE_LABEL.to_string(), label_value(&self.node_name));
        labels.insert(CREATOR_LABEL.to_string(), "vacate".to_string());
        labels
    }

    /// Label selector matching jobs already dispatched for this node.
    pub fn selector(&self) -> String {
        format!("{}={}", CLEANUP_NODE_LABEL, label_value(&self.node_name))
    }

    pub fn tolerations(&self) -> Vec<Toleration> {
        self.taints
            .iter()
            .map(|t| Toleration {
                key: Some(t.key.clone()),
                effect: if t.effect.is_empty() { None } else { Some(t.effect.clone()) },
                operator: Some("Exists".to_string()),
                ..Default::default()
            })
            .collect()
    }
}

const LABEL_VALUE_MAX: usize = 63;
const LABEL_HASH_LEN: usize = 8;

/// Label values are capped at 63 characters. Longer names keep a prefix and
/// gain a hash of the full name, so names sharing a long prefix stay distinct.
fn label_value(s: &str) -> String {
    if s.chars().count() <= LABEL_VALUE_MAX {
        return s.trim_end_matches(['-', '.', '_']).to_string();
    }
    let mut hasher = FxHasher::default();
    hasher.write(s.as_bytes());
    let digest = format!("{:016x}", hasher.finish());
    let head: String = s.chars().take(LABEL_VALUE_MAX - LABEL_HASH_LEN - 1).collect();
    format!("{}-{}", head.trim_end_matches(['-', '.', '_']), &digest[..LABEL_HASH_LEN])
}

/// Reference to a dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CleanupJobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl CleanupJobStatus {
    pub fn from_job(job: &Job) -> Self {
        let status = job.status.as_ref();
        let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
        let failed = status.and_then(|s| s.failed).unwrap_or(0);
        let active = status.and_then(|s| s.active).unwrap_or(0);
        if succeeded >= 1 { CleanupJobStatus::Succeeded }
        else if active > 0 { CleanupJobStatus::Running }
        else if failed > 0 { CleanupJobStatus::Failed }
        else { CleanupJobStatus::Pending }
    }
}

pub fn render_cleanup_job(spec: &CleanupJobSpec) -> Job {
    let mut node_selector = BTreeMap::new();
    node_selector.insert(HOSTNAME_LABEL.to_string(), spec.node_name.clone());

    let volumes: Vec<Volume> = spec
        .mounts
        .iter()
        .map(|m| Volume {
            name: m.name.clone(),
            host_path: Some(HostPathVolumeSource { path: m.host_path.clone(), type_: m.path_type.clone() }),
            ..Default::default()
        })
        .collect();
    let volume_mounts: Vec<VolumeMount> = spec
        .mounts
        .iter()
        .map(|m| VolumeMount { name: m.name.clone(), mount_path: m.mount_path.clone(), ..Default::default() })
        .collect();
    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() })
        .collect();
    let tolerations = spec.tolerations();

    Job {
        metadata: ObjectMeta {
            generate_name: Some(CLEANUP_JOB_PREFIX.to_string()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(spec.labels()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            ttl_seconds_after_finished: Some(spec.ttl_secs),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    node_selector: Some(node_selector),
                    tolerations: if tolerations.is_empty() { None } else { Some(tolerations) },
                    volumes: Some(volumes),
                    containers: vec![Container {
                        name: CLEANUP_CONTAINER_NAME.to_string(),
                        image: Some(spec.image.clone()),
                        args: Some(vec!["--".into(), "agent".into(), "clean".into(), "job".into()]),
                        env: Some(env),
                        volume_mounts: Some(volume_mounts),
                        image_pull_policy: Some("Always".to_string()),
                        ..Default::default()
                    }],
                    restart_policy: Some("OnFailure".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobStatus;

    fn spec(os: TargetOs) -> CleanupJobSpec {
        let mut env = BTreeMap::new();
        env.insert("AGENT_IMAGE".into(), "vacate/vacate-agent:master".into());
        CleanupJobSpec {
            namespace: "default".into(),
            node_name: "worker-1".into(),
            os,
            image: "vacate/vacate-agent:master".into(),
            env,
            mounts: HostMount::for_os(os),
            taints: vec![Taint { key: "dedicated".into(), value: Some("gpu".into()), effect: "NoSchedule".into() }],
            ttl_secs: 300,
        }
    }

    #[test]
    fn renders_pinned_job() {
        let job = render_cleanup_job(&spec(TargetOs::Linux));
        assert_eq!(job.metadata.generate_name.as_deref(), Some(CLEANUP_JOB_PREFIX));
        let labels = job.metadata.labels.clone().expect("labels");
        assert_eq!(labels.get(CLEANUP_NODE_LABEL).map(String::as_str), Some("worker-1"));

        let js = job.spec.expect("spec");
        assert_eq!(js.ttl_seconds_after_finished, Some(300));
        let pod = js.template.spec.expect("pod");
        assert_eq!(pod.node_selector.expect("selector").get(HOSTNAME_LABEL).map(String::as_str), Some("worker-1"));
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));

        let tol = pod.tolerations.expect("tolerations");
        assert_eq!(tol.len(), 1);
        assert_eq!(tol[0].operator.as_deref(), Some("Exists"));
        assert_eq!(tol[0].effect.as_deref(), Some("NoSchedule"));
        assert!(tol[0].value.is_none());

        let vols = pod.volumes.expect("volumes");
        assert_eq!(vols.len(), 1);
        let hp = vols[0].host_path.as_ref().expect("host path");
        assert_eq!(hp.path, DOCKER_SOCKET);
        assert_eq!(hp.type_.as_deref(), Some("Socket"));

        let c = &pod.containers[0];
        assert_eq!(c.args.as_deref(), Some(&["--".to_string(), "agent".into(), "clean".into(), "job".into()][..]));
        assert_eq!(c.image_pull_policy.as_deref(), Some("Always"));
    }

    #[test]
    fn windows_job_mounts_pipes() {
        let job = render_cleanup_job(&spec(TargetOs::Windows));
        let pod = job.spec.and_then(|s| s.template.spec).expect("pod");
        let paths: Vec<_> = pod.volumes.expect("volumes").into_iter().filter_map(|v| v.host_path.map(|h| h.path)).collect();
        assert_eq!(paths, vec![DOCKER_PIPE.to_string(), HELPER_PIPE.to_string()]);
    }

    #[test]
    fn status_from_counts() {
        let mut job = Job::default();
        assert_eq!(CleanupJobStatus::from_job(&job), CleanupJobStatus::Pending);
        job.status = Some(JobStatus { active: Some(1), ..Default::default() });
        assert_eq!(CleanupJobStatus::from_job(&job), CleanupJobStatus::Running);
        job.status = Some(JobStatus { failed: Some(2), ..Default::default() });
        assert_eq!(CleanupJobStatus::from_job(&job), CleanupJobStatus::Failed);
        job.status = Some(JobStatus { succeeded: Some(1), failed: Some(1), ..Default::default() });
        assert_eq!(CleanupJobStatus::from_job(&job), CleanupJobStatus::Succeeded);
    }

    #[test]
    fn long_node_names_fit_label_values() {
        let mut s = spec(TargetOs::Linux);
        s.node_name = format!("{}-x", "a".repeat(62));
        assert!(s.selector().len() <= CLEANUP_NODE_LABEL.len() + 1 + 63);
        assert!(!s.labels()[CLEANUP_NODE_LABEL].ends_with('-'));
    }

    #[test]
    fn long_names_sharing_a_prefix_get_distinct_labels() {
        let base = format!("ip-10-0-0-1.eu-west-1.compute.internal.{}", "pool-a-".repeat(4));
        let (mut a, mut b) = (spec(TargetOs::Linux), spec(TargetOs::Linux));
        a.node_name = format!("{}worker-17", base);
        b.node_name = format!("{}worker-18", base);
        assert!(a.node_name.len() > 63 && a.node_name[..63] == b.node_name[..63]);

        let (la, lb) = (a.labels()[CLEANUP_NODE_LABEL].clone(), b.labels()[CLEANUP_NODE_LABEL].clone());
        assert_ne!(la, lb);
        assert_ne!(a.selector(), b.selector());
        for v in [&la, &lb] {
            assert_eq!(v.len(), 63);
            assert!(v.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()));
        }
        assert_eq!(la, label_value(&a.node_name));
        assert_eq!(label_value("worker-1"), "worker-1");
    }
}
