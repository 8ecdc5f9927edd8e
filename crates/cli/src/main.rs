use std::ffi::OsString;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vacate_clean::{
    launch_cleaner, CleanupStep, CleanupSteps, DockerCli, HostCleaner, LaunchOutcome, PlatformCleanupScript, ProcessExec,
    RemoteExecGateway,
};
use vacate_core::{CleanupOptions, TargetOs, VacateConfig};
use vacate_ops::{ControlPlane, KubeConnector, KubeControlPlane, NodeLifecycleOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "vacatectl", version, about = "Vacate: node decommission and host cleanup")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Image for the cleanup job and the host cleaner container
    #[arg(long = "agent-image", env = "AGENT_IMAGE", global = true)]
    agent_image: Option<String>,

    /// Host prefix of Linux node state
    #[arg(long = "prefix-path", env = "PREFIX_PATH", global = true)]
    prefix_path: Option<String>,

    /// Host prefix of Windows node state
    #[arg(long = "windows-prefix-path", env = "WINDOWS_PREFIX_PATH", global = true)]
    windows_prefix_path: Option<String>,

    /// Namespace cleanup jobs are created in
    #[arg(long = "job-namespace", env = "VACATE_JOB_NAMESPACE", global = true)]
    job_namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Commands run on the node being torn down
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Decommission workflow against the management plane
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Host cleanup script helpers
    Script {
        #[command(subcommand)]
        command: ScriptCommands,
    },
}

#[derive(Subcommand, Debug)]
enum AgentCommands {
    /// Host cleanup entry points
    Clean {
        #[command(subcommand)]
        command: CleanCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CleanCommands {
    /// Launch the host cleaner container unless one is already present
    Job,
    /// Run the full host teardown sequence
    Node {
        #[command(flatten)]
        opts: CleanFlags,
    },
    /// Run a single named step (WaitForWorkloads, Containers, Paths, Network, Docker, Firewall)
    Step {
        name: String,
    },
}

#[derive(clap::Args, Debug)]
struct CleanFlags {
    /// Remove dangling images and volumes
    #[arg(long = "prune-images", action = ArgAction::SetTrue)]
    prune_images: bool,
    /// Leave firewall rules and the container engine alone
    #[arg(long = "no-flush-firewall", action = ArgAction::SetTrue)]
    no_flush_firewall: bool,
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    /// Drain, clean and delete a node, then finalize its markers
    Decommission {
        /// Cluster (namespace) the node object lives in
        #[arg(long = "cluster")]
        cluster: String,
        /// Node object name
        name: String,
    },
    /// Put the "removal requested" marker on a node
    Mark {
        #[arg(long = "cluster")]
        cluster: String,
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ScriptCommands {
    /// Print the rendered cleanup script
    Print {
        #[arg(long = "os", default_value = "linux")]
        os: String,
    },
}

fn init_tracing() {
    let env = std::env::var("VACATE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("VACATE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid VACATE_METRICS_ADDR; expected host:port");
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.trim().is_empty())
}

impl Cli {
    fn config(&self) -> VacateConfig {
        let mut cfg = VacateConfig::from_env();
        if let Some(image) = non_empty(&self.agent_image) { cfg = cfg.with_agent_image(image); }
        if let Some(p) = non_empty(&self.prefix_path) { cfg.prefix_path = p.to_string(); }
        if let Some(p) = non_empty(&self.windows_prefix_path) { cfg.windows_prefix_path = p.to_string(); }
        if let Some(ns) = non_empty(&self.job_namespace) { cfg.job_namespace = ns.to_string(); }
        cfg
    }
}

/// Container entrypoints pass a leading `--` before the subcommand.
fn normalized_args() -> Vec<OsString> {
    let mut args: Vec<OsString> = std::env::args_os().collect();
    if args.get(1).map(|a| a == "--").unwrap_or(false) {
        args.remove(1);
    }
    args
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            t.cancel();
        }
    });
    token
}

fn host_cleaner(cfg: &VacateConfig, opts: CleanupOptions, cancel: CancellationToken) -> HostCleaner<DockerCli, ProcessExec> {
    let os = TargetOs::current();
    let gateway = RemoteExecGateway::new(ProcessExec, PlatformCleanupScript::for_os(os, cfg), cfg.script_path(os));
    HostCleaner::new(DockerCli::default(), gateway, cfg.managed_image_prefix.clone(), opts).with_cancel(cancel)
}

fn print<T: serde::Serialize + std::fmt::Debug>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Human => println!("{:#?}", value),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse_from(normalized_args());
    let cfg = cli.config();

    match &cli.command {
        Commands::Agent { command: AgentCommands::Clean { command } } => match command {
            CleanCommands::Job => {
                let os = TargetOs::current();
                info!(%os, image = %cfg.agent_image, "starting cleanup job");
                let outcome = launch_cleaner(&DockerCli::default(), &cfg, os).await.context("launching host cleaner")?;
                if outcome == LaunchOutcome::AlreadyRunning {
                    info!("host cleaner already running, nothing to do");
                }
                print(cli.output, &outcome)?;
            }
            CleanCommands::Node { opts } => {
                let opts = CleanupOptions { prune_images: opts.prune_images, flush_firewall: !opts.no_flush_firewall };
                let report = host_cleaner(&cfg, opts, cancel_on_ctrl_c()).run().await.context("host cleanup")?;
                print(cli.output, &report)?;
            }
            CleanCommands::Step { name } => {
                let step = CleanupStep::from_str(name)?;
                let cleaner = host_cleaner(&cfg, CleanupOptions::default(), cancel_on_ctrl_c());
                if step.runs_in_script() {
                    cleaner.materialize_script().await.context("writing cleanup script")?;
                }
                let report = cleaner.run_step(step).await.with_context(|| format!("cleanup step {}", step))?;
                print(cli.output, &report)?;
            }
        },
        Commands::Node { command } => {
            let client = vacate_kubehub::management_client().await?;
            let control = Arc::new(KubeControlPlane::new(client));
            let orchestrator = NodeLifecycleOrchestrator::new(control.clone(), Arc::new(KubeConnector), cfg.clone(), cancel_on_ctrl_c());
            match command {
                NodeCommands::Decommission { cluster, name } => {
                    let node = control.get_node(cluster, name).await.context("fetching node")?;
                    let (_, report) = orchestrator.decommission(node).await.context("decommission")?;
                    print(cli.output, &report)?;
                }
                NodeCommands::Mark { cluster, name } => {
                    let node = control.get_node(cluster, name).await.context("fetching node")?;
                    let node = orchestrator.mark_removal_in_progress(node).await.context("marking node")?;
                    match cli.output {
                        Output::Human => println!("{} • {:?}", node.name, vacate_core::marker::state(&node)),
                        Output::Json => println!("{}", serde_json::to_string_pretty(&node)?),
                    }
                }
            }
        }
        Commands::Script { command: ScriptCommands::Print { os } } => {
            let os = TargetOs::from_str(os)?;
            print!("{}", PlatformCleanupScript::for_os(os, &cfg).render());
        }
    }
    Ok(())
}
