//! Host teardown scripts, one variant per target OS.
//!
//! Each variant is declarative data (directories, interfaces, networks) rendered
//! into a shell script whose named tasks can be invoked one at a time. Every task
//! is a no-op when its targets are already gone.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vacate_core::{CleanupOptions, TargetOs, VacateConfig, VacateError};

/// One named step of the host teardown, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CleanupStep {
    WaitForWorkloads,
    Containers,
    Paths,
    Network,
    Docker,
    Firewall,
}

impl CleanupStep {
    pub const ALL: [CleanupStep; 6] = [
        CleanupStep::WaitForWorkloads,
        CleanupStep::Containers,
        CleanupStep::Paths,
        CleanupStep::Network,
        CleanupStep::Docker,
        CleanupStep::Firewall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CleanupStep::WaitForWorkloads => "WaitForWorkloads",
            CleanupStep::Containers => "Containers",
            CleanupStep::Paths => "Paths",
            CleanupStep::Network => "Network",
            CleanupStep::Docker => "Docker",
            CleanupStep::Firewall => "Firewall",
        }
    }

    /// Steps carried out by the script through the exec helper (the rest talk to the engine directly).
    pub fn runs_in_script(&self) -> bool {
        matches!(self, CleanupStep::Paths | CleanupStep::Network | CleanupStep::Docker | CleanupStep::Firewall)
    }
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for CleanupStep {
    type Err = VacateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        // "Links" is what older agents called the network step
        if wanted.eq_ignore_ascii_case("links") { return Ok(CleanupStep::Network); }
        CleanupStep::ALL
            .iter()
            .copied()
            .find(|st| st.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| VacateError::Config(format!("unknown cleanup step: {}", s)))
    }
}

/// Command line for the host exec helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Named-step capability shared by both script variants.
pub trait CleanupSteps {
    fn os(&self) -> TargetOs;

    /// Full script text, written to disk before any step runs.
    fn render(&self) -> String;

    /// Helper invocation running `step` from the script stored at `script_path` on the host.
    fn helper_command(&self, script_path: &str, step: CleanupStep) -> HelperCommand;

    /// Where the cleaner container sees a host path.
    fn container_path(&self, host_path: &str) -> String;

    /// Host entries a step removes; empty for steps without a fixed target list.
    fn targets(&self, step: CleanupStep) -> Vec<String>;
}

const LINUX_STATE_DIRS: &[&str] = &[
    "/etc/ceph",
    "/etc/cni",
    "/etc/kubernetes",
    "/opt/cni",
    "/opt/rke",
    "/run/secrets/kubernetes.io",
    "/run/calico",
    "/run/flannel",
    "/var/lib/calico",
    "/var/lib/weave",
    "/var/lib/etcd",
    "/var/lib/cni",
    "/var/lib/kubelet/*",
    "/var/lib/rancher/rke/log",
    "/var/log/containers",
    "/var/log/pods",
    "/var/run/calico",
];

const LINUX_INTERFACES: &[&str] = &["flannel.1", "cni0", "tunl0", "weave", "datapath", "vxlan-6784"];

/// Root of the host filesystem inside the Linux cleaner container.
pub const LINUX_HOST_MOUNT: &str = "/host";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxCleanupScript {
    pub state_dirs: Vec<String>,
    pub interfaces: Vec<String>,
    /// tmpfs mounts below this root are unmounted before directories go.
    pub kubelet_root: String,
}

impl LinuxCleanupScript {
    pub fn new(prefix_path: &str) -> Self {
        let prefixed = |p: &str| prefix_join(prefix_path, p);
        Self {
            state_dirs: LINUX_STATE_DIRS.iter().map(|d| prefixed(d)).collect(),
            interfaces: LINUX_INTERFACES.iter().map(|s| s.to_string()).collect(),
            kubelet_root: prefixed("/var/lib/kubelet"),
        }
    }
}

fn prefix_join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() { path.to_string() } else { format!("{}{}", prefix, path) }
}

fn bash_array(items: &[String]) -> String {
    items.join(" ")
}

impl CleanupSteps for LinuxCleanupScript {
    fn os(&self) -> TargetOs { TargetOs::Linux }

    fn render(&self) -> String {
        BASH_TEMPLATE
            .replace("@@CLEANUP_DIRS@@", &bash_array(&self.state_dirs))
            .replace("@@CLEANUP_INTERFACES@@", &bash_array(&self.interfaces))
            .replace("@@KUBELET_ROOT@@", &self.kubelet_root)
    }

    fn helper_command(&self, script_path: &str, step: CleanupStep) -> HelperCommand {
        HelperCommand {
            program: "nsenter".to_string(),
            args: vec![
                "--target".into(),
                "1".into(),
                "--mount".into(),
                "--uts".into(),
                "--ipc".into(),
                "--net".into(),
                "--pid".into(),
                "--".into(),
                "bash".into(),
                script_path.to_string(),
                "--tasks".into(),
                step.name().to_string(),
            ],
        }
    }

    fn container_path(&self, host_path: &str) -> String {
        format!("{}{}", LINUX_HOST_MOUNT, host_path)
    }

    fn targets(&self, step: CleanupStep) -> Vec<String> {
        match step {
            CleanupStep::Paths => self.state_dirs.clone(),
            CleanupStep::Network => self.interfaces.clone(),
            _ => Vec::new(),
        }
    }
}

const WINDOWS_HNS_NETWORKS: &[&str] = &["vxlan0", "cbr0", "nat"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowsCleanupScript {
    /// Glob patterns of state removed by the Paths task.
    pub data_paths: Vec<String>,
    /// Directory holding the script itself; kept so later tasks can still run.
    pub script_dir: String,
    pub hns_networks: Vec<String>,
    /// Name prefix of helper-managed processes and firewall rules.
    pub helper_prefix: String,
    pub helper_binary: String,
}

impl WindowsCleanupScript {
    pub fn new(cfg: &VacateConfig) -> Self {
        let prefix = cfg.windows_prefix_path.trim_end_matches(['\\', '/']);
        let script_path = cfg.script_path(TargetOs::Windows);
        let script_dir = script_path.rsplit_once('\\').map(|(d, _)| d.to_string()).unwrap_or_default();
        Self {
            data_paths: vec![
                format!("{}\\run\\*", prefix),
                format!("{}\\opt\\*", prefix),
                format!("{}\\var\\*", prefix),
                format!("{}\\etc\\*", prefix),
                "c:\\ProgramData\\docker\\containers\\*".to_string(),
            ],
            script_dir,
            hns_networks: WINDOWS_HNS_NETWORKS.iter().map(|s| s.to_string()).collect(),
            helper_prefix: "rancher-wins-".to_string(),
            helper_binary: cfg.helper_binary.clone(),
        }
    }
}

fn ps_list(items: &[String]) -> String {
    items.iter().map(|i| format!("    \"{}\"", i.replace('"', "`\""))).collect::<Vec<_>>().join("\n")
}

impl CleanupSteps for WindowsCleanupScript {
    fn os(&self) -> TargetOs { TargetOs::Windows }

    fn render(&self) -> String {
        let networks = self.hns_networks.iter().map(|n| format!("'{}'", n)).collect::<Vec<_>>().join(", ");
        POWERSHELL_TEMPLATE
            .replace("@@DATA_PATHS@@", &ps_list(&self.data_paths))
            .replace("@@SCRIPT_DIR@@", &self.script_dir)
            .replace("@@HNS_NETWORKS@@", &networks)
            .replace("@@HELPER_PREFIX@@", &self.helper_prefix)
    }

    fn helper_command(&self, script_path: &str, step: CleanupStep) -> HelperCommand {
        HelperCommand {
            program: self.helper_binary.clone(),
            args: vec![
                "cli".into(),
                "prc".into(),
                "run".into(),
                "--path".into(),
                script_path.to_string(),
                "--args".into(),
                format!("-Tasks {}", step.name()),
            ],
        }
    }

    fn container_path(&self, host_path: &str) -> String {
        match host_path.get(..3) {
            Some(drive) if drive.eq_ignore_ascii_case("c:\\") => format!("c:\\host\\{}", &host_path[3..]),
            _ => host_path.to_string(),
        }
    }

    fn targets(&self, step: CleanupStep) -> Vec<String> {
        match step {
            CleanupStep::Paths => self.data_paths.clone(),
            CleanupStep::Network => self.hns_networks.clone(),
            _ => Vec::new(),
        }
    }
}

/// The script for one target OS, chosen once per workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCleanupScript {
    Linux(LinuxCleanupScript),
    Windows(WindowsCleanupScript),
}

impl PlatformCleanupScript {
    pub fn for_os(os: TargetOs, cfg: &VacateConfig) -> Self {
        match os {
            TargetOs::Linux => PlatformCleanupScript::Linux(LinuxCleanupScript::new(&cfg.prefix_path)),
            TargetOs::Windows => PlatformCleanupScript::Windows(WindowsCleanupScript::new(cfg)),
        }
    }

    fn inner(&self) -> &dyn CleanupSteps {
        match self {
            PlatformCleanupScript::Linux(s) => s,
            PlatformCleanupScript::Windows(s) => s,
        }
    }

    /// Ordered steps of a full run under `opts`.
    pub fn sequence(&self, opts: &CleanupOptions) -> Vec<CleanupStep> {
        CleanupStep::ALL
            .iter()
            .copied()
            .filter(|st| match st {
                CleanupStep::Docker => opts.prune_images,
                CleanupStep::Firewall => opts.flush_firewall,
                _ => true,
            })
            .collect()
    }
}

impl CleanupSteps for PlatformCleanupScript {
    fn os(&self) -> TargetOs { self.inner().os() }
    fn render(&self) -> String { self.inner().render() }
    fn helper_command(&self, script_path: &str, step: CleanupStep) -> HelperCommand { self.inner().helper_command(script_path, step) }
    fn container_path(&self, host_path: &str) -> String { self.inner().container_path(host_path) }
    fn targets(&self, step: CleanupStep) -> Vec<String> { self.inner().targets(step) }
}

const BASH_TEMPLATE: &str = r#"#!/bin/bash
# Vacate node cleanup. Rewritten before every run; do not edit.

CLEANUP_DIRS=(@@CLEANUP_DIRS@@)
CLEANUP_INTERFACES=(@@CLEANUP_INTERFACES@@)
KUBELET_ROOT=@@KUBELET_ROOT@@

timestamp() {
  date "+%Y-%m-%d %H:%M:%S"
}

techo() {
  echo "$(timestamp): $*"
}

task-paths() {
  techo "Unmounting filesystems..."
  for mount in $(mount | grep tmpfs | grep "${KUBELET_ROOT}" | awk '{ print $3 }')
    do
      umount "$mount" || techo "Could not unmount $mount"
  done

  techo "Removing directories..."
  for DIR in "${CLEANUP_DIRS[@]}"
    do
      techo "Removing $DIR"
      rm -rf $DIR
  done
}

task-network() {
  techo "Removing interfaces..."
  for INTERFACE in "${CLEANUP_INTERFACES[@]}"
    do
      if ip link show "${INTERFACE}" > /dev/null 2>&1
        then
          techo "Removing $INTERFACE"
          ip link delete "$INTERFACE"
      fi
  done
}

task-docker() {
  VOLUMES=$(docker volume ls -q -f dangling=true)
  if [[ -n ${VOLUMES} ]]
    then
      techo "Removing dangling volumes..."
      docker volume rm ${VOLUMES}
    else
      techo "No dangling volumes, skipping volume cleanup..."
  fi
  IMAGES=$(docker images -q -f dangling=true)
  if [[ -n ${IMAGES} ]]
    then
      techo "Removing dangling images..."
      docker rmi -f ${IMAGES}
    else
      techo "No dangling images, skipping image cleanup..."
  fi
}

task-firewall() {
  techo "Flushing iptables..."
  iptables -F -t nat
  iptables -X -t nat
  iptables -F -t mangle
  iptables -X -t mangle
  iptables -F
  iptables -X
  techo "Restarting Docker..."
  if systemctl list-units --full -all | grep -q docker.service
    then
      systemctl restart docker
    else
      /etc/init.d/docker restart
  fi
}

run-task() {
  case "$(echo "$1" | tr '[:upper:]' '[:lower:]')" in
    paths) task-paths ;;
    network|links) task-network ;;
    docker) task-docker ;;
    firewall) task-firewall ;;
    *) techo "Unknown task $1"; exit 2 ;;
  esac
}

help() {
  echo "Vacate node cleanup
  Usage: bash cleanup.sh [ --tasks Paths,Network,Docker,Firewall ] [ -f -i ]

  --tasks LIST              Run only the named tasks, in the given order
  -f | --flush-iptables     Flush all iptables rules (includes a Docker restart)
  -i | --flush-images       Remove dangling images and volumes

  !! This script removes all data specific to Kubernetes on this host."
}

if [[ $EUID -ne 0 ]]
  then
    techo "This script must be run as root"
    exit 1
fi

TASKS=""
while test $# -gt 0
  do
    case ${1} in
      --tasks)
        shift
        TASKS=${1}
        shift
        ;;
      -f|--flush-iptables)
        shift
        FLUSH_IPTABLES=1
        ;;
      -i|--flush-images)
        shift
        CLEANUP_IMAGES=1
        ;;
      *)
        help && exit 0
    esac
done

if [[ -n ${TASKS} ]]
  then
    for TASK in ${TASKS//,/ }
      do
        run-task "$TASK" || exit 1
    done
  else
    task-paths
    task-network
    if [[ ${CLEANUP_IMAGES} -eq 1 ]]; then task-docker; fi
    if [[ ${FLUSH_IPTABLES} -eq 1 ]]; then task-firewall; fi
fi
techo "Done!"
"#;

const POWERSHELL_TEMPLATE: &str = r#"#Requires -RunAsAdministrator
<#
.SYNOPSIS
    Removes Kubernetes-managed state from a Windows node.
.DESCRIPTION
    Rewritten before every run; do not edit. Each task is safe to run again.
.EXAMPLE
    cleanup.ps1 -Tasks Paths,Network
#>
param (
    [string[]] $Tasks = @("Paths", "Network", "Firewall")
)
$ErrorActionPreference = 'Stop'
$WarningPreference = 'SilentlyContinue'
$VerbosePreference = 'SilentlyContinue'
$DebugPreference = 'SilentlyContinue'
$InformationPreference = 'SilentlyContinue'

function Log-Info
{
    Write-Host -NoNewline -ForegroundColor Blue "INFO: "
    Write-Host -ForegroundColor Gray ("{0,-44}" -f ($args -join " "))
}

function Log-Warn
{
    Write-Host -NoNewline -ForegroundColor DarkYellow "WARN: "
    Write-Host -ForegroundColor Gray ("{0,-44}" -f ($args -join " "))
}

function Log-Fatal
{
    Write-Host -NoNewline -ForegroundColor DarkRed "FATA: "
    Write-Host -ForegroundColor Gray ("{0,-44}" -f ($args -join " "))
    exit 255
}

function Get-VmComputeNativeMethods()
{
    $ret = 'VmCompute.PrivatePInvoke.NativeMethods' -as [type]
    if (-not $ret) {
        $signature = @'
[DllImport("vmcompute.dll")]
public static extern void HNSCall([MarshalAs(UnmanagedType.LPWStr)] string method, [MarshalAs(UnmanagedType.LPWStr)] string path, [MarshalAs(UnmanagedType.LPWStr)] string request, [MarshalAs(UnmanagedType.LPWStr)] out string response);
'@
        $ret = Add-Type -MemberDefinition $signature -Namespace VmCompute.PrivatePInvoke -Name "NativeMethods" -PassThru
    }
    return $ret
}

function Invoke-HNSRequest
{
    param
    (
        [ValidateSet('GET', 'DELETE')]
        [parameter(Mandatory = $true)] [string] $Method,
        [ValidateSet('networks', 'endpoints', 'policylists')]
        [parameter(Mandatory = $true)] [string] $Type,
        [parameter(Mandatory = $false)] [Guid] $Id = [Guid]::Empty
    )
    $hnsPath = "/$Type"
    if ($Id -ne [Guid]::Empty) {
        $hnsPath += "/$Id"
    }
    $response = ""
    $hnsApi = Get-VmComputeNativeMethods
    $hnsApi::HNSCall($Method, $hnsPath, "", [ref]$response)
    $output = @()
    if ($response) {
        try {
            $output = ($response | ConvertFrom-Json)
            if ($output.Error) {
                Log-Warn $output.Error
                $output = @()
            } else {
                $output = $output.Output
            }
        } catch {
            Log-Warn $_.Exception.Message
        }
    }
    return $output
}

function Invoke-PathsTask
{
    Get-Process -ErrorAction Ignore -Name "@@HELPER_PREFIX@@*" | ForEach-Object {
        Log-Info "Stopping process $($_.Name) ..."
        $_ | Stop-Process -ErrorAction Ignore -Force
    }
    Get-Item -ErrorAction Ignore -Path @(
@@DATA_PATHS@@
    ) | Where-Object { $_.FullName -ne "@@SCRIPT_DIR@@" } | ForEach-Object {
        Log-Info "Cleaning up data $($_.FullName) ..."
        try {
            $_ | Remove-Item -ErrorAction Ignore -Recurse -Force | Out-Null
        } catch {
            Log-Warn "Could not clean: $($_.Exception.Message)"
        }
    }
}

function Invoke-NetworkTask
{
    try {
        Invoke-HNSRequest -Method "GET" -Type "networks" | Where-Object { @(@@HNS_NETWORKS@@) -contains $_.Name } | ForEach-Object {
            Log-Info "Cleaning up HNS network $($_.Name) ..."
            Invoke-HNSRequest -Method "DELETE" -Type "networks" -Id $_.Id | Out-Null
        }
        Invoke-HNSRequest -Method "GET" -Type "policylists" | Where-Object { -not [string]::IsNullOrEmpty($_.Id) } | ForEach-Object {
            Log-Info "Cleaning up HNS policy list $($_.Id) ..."
            Invoke-HNSRequest -Method "DELETE" -Type "policylists" -Id $_.Id | Out-Null
        }
        Invoke-HNSRequest -Method "GET" -Type "endpoints" | Where-Object { -not [string]::IsNullOrEmpty($_.Id) } | ForEach-Object {
            Log-Info "Cleaning up HNS endpoint $($_.Name) ..."
            Invoke-HNSRequest -Method "DELETE" -Type "endpoints" -Id $_.Id | Out-Null
        }
    } catch {
        Log-Warn "Could not clean: $($_.Exception.Message)"
    }
}

function Invoke-DockerTask
{
    Log-Info "Pruning dangling images and volumes ..."
    $errMsg = $(docker.exe image prune -f 2>&1)
    if (-not $?) {
        Log-Warn "Could not prune images: $errMsg"
    }
    $errMsg = $(docker.exe volume prune -f 2>&1)
    if (-not $?) {
        Log-Warn "Could not prune volumes: $errMsg"
    }
}

function Invoke-FirewallTask
{
    Get-NetFirewallRule -PolicyStore ActiveStore -Name "@@HELPER_PREFIX@@*" -ErrorAction Ignore | ForEach-Object {
        Log-Info "Cleaning up firewall rule $($_.Name) ..."
        $_ | Remove-NetFirewallRule -ErrorAction Ignore | Out-Null
    }
    try {
        Log-Info "Restarting the Docker service"
        Stop-Service docker
        Start-Sleep -Seconds 5
        Start-Service docker
    } catch {
        Log-Fatal "Could not restart docker: $($_.Exception.Message)"
    }
}

Log-Info "Start cleaning ..."
foreach ($task in ($Tasks | ForEach-Object { $_ -split ',' } | ForEach-Object { $_.Trim() })) {
    switch ($task) {
        "Paths" { Invoke-PathsTask }
        "Network" { Invoke-NetworkTask }
        "Links" { Invoke-NetworkTask }
        "Docker" { Invoke-DockerTask }
        "Firewall" { Invoke-FirewallTask }
        default { Log-Fatal "Unknown task $task" }
    }
}
Log-Info "Finished!"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_round_trip_case_insensitively() {
        assert_eq!("paths".parse::<CleanupStep>().ok(), Some(CleanupStep::Paths));
        assert_eq!("FIREWALL".parse::<CleanupStep>().ok(), Some(CleanupStep::Firewall));
        assert_eq!("Links".parse::<CleanupStep>().ok(), Some(CleanupStep::Network));
        assert!("reboot".parse::<CleanupStep>().is_err());
    }

    #[test]
    fn sequence_honours_options() {
        let script = PlatformCleanupScript::for_os(TargetOs::Linux, &VacateConfig::default());
        let full = script.sequence(&CleanupOptions { prune_images: true, flush_firewall: true });
        assert_eq!(full, CleanupStep::ALL.to_vec());
        let default = script.sequence(&CleanupOptions::default());
        assert!(!default.contains(&CleanupStep::Docker));
        assert_eq!(default.last(), Some(&CleanupStep::Firewall));
        assert_eq!(default[0], CleanupStep::WaitForWorkloads);
    }

    #[test]
    fn linux_render_embeds_targets() {
        let cfg = VacateConfig { prefix_path: "/opt/custom/".into(), ..Default::default() };
        let script = LinuxCleanupScript::new(&cfg.prefix_path);
        let text = script.render();
        assert!(text.starts_with("#!/bin/bash"));
        assert!(text.contains("/opt/custom/etc/kubernetes"));
        assert!(text.contains("KUBELET_ROOT=/opt/custom/var/lib/kubelet"));
        assert!(text.contains("CLEANUP_INTERFACES=(flannel.1 cni0 tunl0 weave datapath vxlan-6784)"));
        assert!(!text.contains("@@"));
    }

    #[test]
    fn linux_helper_runs_in_host_namespaces() {
        let script = LinuxCleanupScript::new("/");
        let cmd = script.helper_command("/etc/vacate/cleanup.sh", CleanupStep::Network);
        assert_eq!(cmd.program, "nsenter");
        assert_eq!(&cmd.args[cmd.args.len() - 4..], &["bash", "/etc/vacate/cleanup.sh", "--tasks", "Network"]);
        assert_eq!(script.container_path("/etc/vacate/cleanup.sh"), "/host/etc/vacate/cleanup.sh");
    }

    #[test]
    fn windows_render_and_helper() {
        let cfg = VacateConfig::default();
        let script = WindowsCleanupScript::new(&cfg);
        assert_eq!(script.script_dir, "c:\\etc\\vacate");
        let text = script.render();
        assert!(text.starts_with("#Requires -RunAsAdministrator"));
        assert!(text.contains("\"c:\\etc\\*\""));
        assert!(text.contains("@('vxlan0', 'cbr0', 'nat')"));
        assert!(text.contains("-ne \"c:\\etc\\vacate\""));
        assert!(!text.contains("@@"));

        let cmd = script.helper_command("c:\\etc\\vacate\\cleanup.ps1", CleanupStep::Paths);
        assert_eq!(cmd.program, "wins.exe");
        assert_eq!(cmd.args, vec!["cli", "prc", "run", "--path", "c:\\etc\\vacate\\cleanup.ps1", "--args", "-Tasks Paths"]);
    }

    #[test]
    fn windows_container_path_rewrites_system_drive() {
        let script = WindowsCleanupScript::new(&VacateConfig::default());
        assert_eq!(script.container_path("c:\\etc\\vacate\\cleanup.ps1"), "c:\\host\\etc\\vacate\\cleanup.ps1");
        assert_eq!(script.container_path("C:\\etc\\x"), "c:\\host\\etc\\x");
        assert_eq!(script.container_path("d:\\etc\\x"), "d:\\etc\\x");
    }

    #[test]
    fn targets_follow_declared_data() {
        let script = PlatformCleanupScript::for_os(TargetOs::Windows, &VacateConfig::default());
        assert_eq!(script.targets(CleanupStep::Network), vec!["vxlan0", "cbr0", "nat"]);
        assert!(script.targets(CleanupStep::Firewall).is_empty());
        assert_eq!(script.os(), TargetOs::Windows);
    }
}
