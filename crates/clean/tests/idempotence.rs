use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vacate_clean::{
    launch_cleaner, CleanupStep, CleanupSteps, ContainerEngine, ContainerLaunch, ContainerSummary, HelperCommand, HelperOutput,
    HostCleaner, LaunchOutcome, PlatformCleanupScript, RemoteExec, RemoteExecGateway, StepOutcome, CLEANER_CONTAINER_NAME,
};
use vacate_core::{CleanupOptions, TargetOs, VacateConfig, VacateError, VacateResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HostState {
    paths: BTreeSet<String>,
    interfaces: BTreeSet<String>,
    containers: Vec<ContainerSummary>,
    firewall_rules: usize,
    engine_restarts: usize,
}

/// Node whose state reacts to engine calls and script steps.
struct SimulatedHost {
    script: PlatformCleanupScript,
    state: Mutex<HostState>,
}

impl SimulatedHost {
    fn new(script: PlatformCleanupScript, unrelated_path: &str) -> Arc<Self> {
        let mut paths: BTreeSet<String> = script.targets(CleanupStep::Paths).into_iter().collect();
        paths.insert(unrelated_path.to_string());
        let interfaces = script.targets(CleanupStep::Network).into_iter().chain(["eth0".to_string()]).collect();
        let containers = vec![
            ContainerSummary { id: "kubelet".into(), names: vec!["kubelet".into()], image: "vacate/hyperkube:v1.28".into() },
            ContainerSummary { id: "app".into(), names: vec!["user-app".into()], image: "nginx:1.25".into() },
        ];
        Arc::new(Self { script, state: Mutex::new(HostState { paths, interfaces, containers, firewall_rules: 4, engine_restarts: 0 }) })
    }

    fn snapshot(&self) -> HostState {
        self.state.lock().expect("state").clone()
    }
}

fn requested_task(cmd: &HelperCommand) -> Option<CleanupStep> {
    let last = cmd.args.last()?;
    last.trim_start_matches("-Tasks ").parse().ok()
}

#[async_trait]
impl ContainerEngine for SimulatedHost {
    async fn list_containers(&self) -> VacateResult<Vec<ContainerSummary>> {
        Ok(self.snapshot().containers)
    }

    async fn inspect_image(&self, id: &str) -> VacateResult<String> {
        self.snapshot()
            .containers
            .into_iter()
            .find(|c| c.id == id)
            .map(|c| c.image)
            .ok_or_else(|| VacateError::NotFound(id.to_string()))
    }

    async fn kill(&self, id: &str) -> VacateResult<()> {
        let mut st = self.state.lock().expect("state");
        let before = st.containers.len();
        st.containers.retain(|c| c.id != id);
        if st.containers.len() == before { Err(VacateError::NotFound(id.to_string())) } else { Ok(()) }
    }

    async fn run_detached(&self, launch: &ContainerLaunch) -> VacateResult<String> {
        let mut st = self.state.lock().expect("state");
        let id = format!("cleaner-{}", st.containers.len());
        st.containers.push(ContainerSummary { id: id.clone(), names: vec![launch.name.clone()], image: launch.image.clone() });
        Ok(id)
    }
}

#[async_trait]
impl RemoteExec for SimulatedHost {
    async fn run(&self, cmd: &HelperCommand) -> VacateResult<HelperOutput> {
        let Some(step) = requested_task(cmd) else {
            return Ok(HelperOutput { code: 2, stdout: String::new(), stderr: "unknown task".into() });
        };
        let targets = self.script.targets(step);
        let mut st = self.state.lock().expect("state");
        match step {
            CleanupStep::Paths => st.paths.retain(|p| !targets.contains(p)),
            CleanupStep::Network => st.interfaces.retain(|i| !targets.contains(i)),
            CleanupStep::Firewall => {
                st.firewall_rules = 0;
                st.engine_restarts += 1;
            }
            _ => {}
        }
        Ok(HelperOutput { code: 0, stdout: format!("{} done\n", step), stderr: String::new() })
    }
}

fn cleaner_for(host: &Arc<SimulatedHost>, os: TargetOs, root: &std::path::Path) -> HostCleaner<Arc<SimulatedHost>, Arc<SimulatedHost>> {
    let cfg = VacateConfig::default();
    let gateway = RemoteExecGateway::new(host.clone(), PlatformCleanupScript::for_os(os, &cfg), cfg.script_path(os));
    HostCleaner::new(host.clone(), gateway, cfg.managed_image_prefix.clone(), CleanupOptions::default()).with_root(root)
}

async fn second_run_is_a_no_op(os: TargetOs, unrelated: &str) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = VacateConfig::default();
    let host = SimulatedHost::new(PlatformCleanupScript::for_os(os, &cfg), unrelated);
    let cleaner = cleaner_for(&host, os, dir.path());

    let first = cleaner.run().await.expect("first run");
    assert_eq!(first.steps.first().map(|s| s.step), Some(CleanupStep::WaitForWorkloads));
    assert!(first.steps.iter().any(|s| s.outcome == StepOutcome::Killed { containers: 1 }));
    let after_first = host.snapshot();
    assert_eq!(after_first.paths, BTreeSet::from([unrelated.to_string()]));
    assert_eq!(after_first.interfaces, BTreeSet::from(["eth0".to_string()]));
    assert_eq!(after_first.containers.len(), 1);
    assert_eq!(after_first.firewall_rules, 0);

    let second = cleaner.run().await.expect("second run");
    assert!(second.steps.iter().any(|s| s.outcome == StepOutcome::Killed { containers: 0 }));
    let after_second = host.snapshot();
    assert_eq!(after_second.paths, after_first.paths);
    assert_eq!(after_second.interfaces, after_first.interfaces);
    assert_eq!(after_second.containers, after_first.containers);
    assert!(first.script.exists());
}

#[tokio::test]
async fn linux_cleanup_is_idempotent() {
    second_run_is_a_no_op(TargetOs::Linux, "/home/ops").await;
}

#[tokio::test]
async fn windows_cleanup_is_idempotent() {
    second_run_is_a_no_op(TargetOs::Windows, "c:\\Users\\ops").await;
}

#[tokio::test]
async fn docker_step_only_runs_when_requested() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = VacateConfig::default();
    let host = SimulatedHost::new(PlatformCleanupScript::for_os(TargetOs::Linux, &cfg), "/srv");
    let report = cleaner_for(&host, TargetOs::Linux, dir.path()).run().await.expect("run");
    assert!(!report.steps.iter().any(|s| s.step == CleanupStep::Docker));

    let gateway = RemoteExecGateway::new(host.clone(), PlatformCleanupScript::for_os(TargetOs::Linux, &cfg), cfg.script_path(TargetOs::Linux));
    let opts = CleanupOptions { prune_images: true, flush_firewall: false };
    let report = HostCleaner::new(host.clone(), gateway, cfg.managed_image_prefix.clone(), opts).with_root(dir.path()).run().await.expect("run");
    let steps: Vec<_> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(steps, vec![CleanupStep::WaitForWorkloads, CleanupStep::Containers, CleanupStep::Paths, CleanupStep::Network, CleanupStep::Docker]);
}

#[tokio::test]
async fn second_dispatch_finds_running_cleaner() {
    let cfg = VacateConfig::default();
    let host = SimulatedHost::new(PlatformCleanupScript::for_os(TargetOs::Linux, &cfg), "/srv");

    let first = launch_cleaner(host.as_ref(), &cfg, TargetOs::Linux).await.expect("first");
    assert!(matches!(first, LaunchOutcome::Launched { .. }));
    let second = launch_cleaner(host.as_ref(), &cfg, TargetOs::Linux).await.expect("second");
    assert_eq!(second, LaunchOutcome::AlreadyRunning);

    let cleaners = host.snapshot().containers.into_iter().filter(|c| c.has_name(CLEANER_CONTAINER_NAME)).count();
    assert_eq!(cleaners, 1);
}

#[tokio::test]
async fn cleaner_survives_its_own_container_sweep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = VacateConfig::default();
    let host = SimulatedHost::new(PlatformCleanupScript::for_os(TargetOs::Linux, &cfg), "/srv");
    launch_cleaner(host.as_ref(), &cfg, TargetOs::Linux).await.expect("launch");

    cleaner_for(&host, TargetOs::Linux, dir.path()).run().await.expect("run");
    let names: Vec<_> = host.snapshot().containers.into_iter().flat_map(|c| c.names).collect();
    assert!(names.contains(&CLEANER_CONTAINER_NAME.to_string()));
    assert!(names.contains(&"user-app".to_string()));
    assert!(!names.contains(&"kubelet".to_string()));
}

/// Body of one task function in a rendered script, from `header` to its closing brace.
fn task_body<'a>(script: &'a str, header: &str) -> &'a str {
    let start = script.find(header).unwrap_or_else(|| panic!("{} missing", header));
    let len = script[start..].find("\n}\n").unwrap_or_else(|| panic!("{} not closed", header));
    &script[start..start + len]
}

fn before(body: &str, guard: &str, action: &str) -> bool {
    matches!((body.find(guard), body.find(action)), (Some(g), Some(a)) if g < a)
}

#[test]
fn bash_tasks_tolerate_missing_targets() {
    let text = PlatformCleanupScript::for_os(TargetOs::Linux, &VacateConfig::default()).render();
    assert!(!text.contains("set -e"));

    let paths = task_body(&text, "task-paths() {");
    assert!(paths.contains("umount \"$mount\" || techo"));
    assert!(paths.contains("rm -rf $DIR"));

    let network = task_body(&text, "task-network() {");
    assert!(before(network, "if ip link show \"${INTERFACE}\"", "ip link delete"));

    let docker = task_body(&text, "task-docker() {");
    assert!(before(docker, "if [[ -n ${VOLUMES} ]]", "docker volume rm"));
    assert!(before(docker, "if [[ -n ${IMAGES} ]]", "docker rmi"));
}

#[test]
fn powershell_tasks_tolerate_missing_targets() {
    let text = PlatformCleanupScript::for_os(TargetOs::Windows, &VacateConfig::default()).render();

    let paths = task_body(&text, "function Invoke-PathsTask\n{");
    assert!(paths.contains("Get-Process -ErrorAction Ignore"));
    assert!(before(paths, "Get-Item -ErrorAction Ignore", "Remove-Item -ErrorAction Ignore"));

    let network = task_body(&text, "function Invoke-NetworkTask\n{");
    for kind in ["networks", "policylists", "endpoints"] {
        let list = format!("-Method \"GET\" -Type \"{}\" | Where-Object", kind);
        let delete = format!("-Method \"DELETE\" -Type \"{}\"", kind);
        assert!(before(network, &list, &delete), "{} deleted without listing first", kind);
    }
    assert!(network.contains("} catch {"));

    let firewall = task_body(&text, "function Invoke-FirewallTask\n{");
    assert!(before(firewall, "-ErrorAction Ignore | ForEach-Object", "Remove-NetFirewallRule -ErrorAction Ignore"));
}
