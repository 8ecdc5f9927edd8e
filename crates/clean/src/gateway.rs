//! Remote exec gateway: runs named script steps on the host through the exec helper.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vacate_core::{VacateError, VacateResult};

use crate::script::{CleanupStep, CleanupSteps, HelperCommand, PlatformCleanupScript};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn run(&self, cmd: &HelperCommand) -> VacateResult<HelperOutput>;
}

/// Spawns the helper as a local process.
#[derive(Debug, Clone, Default)]
pub struct ProcessExec;

#[async_trait]
impl RemoteExec for ProcessExec {
    async fn run(&self, cmd: &HelperCommand) -> VacateResult<HelperOutput> {
        let out = Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .await
            .map_err(|e| VacateError::Local(format!("spawning {}: {}", cmd.program, e)))?;
        Ok(HelperOutput {
            code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Binds a script variant and its host location to an exec backend.
pub struct RemoteExecGateway<X> {
    exec: X,
    script: PlatformCleanupScript,
    script_path: String,
}

impl<X: RemoteExec> RemoteExecGateway<X> {
    pub fn new(exec: X, script: PlatformCleanupScript, script_path: impl Into<String>) -> Self {
        Self { exec, script, script_path: script_path.into() }
    }

    pub fn script(&self) -> &PlatformCleanupScript { &self.script }

    pub fn script_path(&self) -> &str { &self.script_path }

    /// Run one script step. A non-zero helper exit is a local failure.
    pub async fn run_step(&self, step: CleanupStep) -> VacateResult<()> {
        if !step.runs_in_script() {
            return Err(VacateError::Config(format!("{} is not a script step", step)));
        }
        let cmd = self.script.helper_command(&self.script_path, step);
        debug!(step = %step, program = %cmd.program, args = ?cmd.args, "running script step");
        let out = self.exec.run(&cmd).await?;
        for line in out.stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!(step = %step, "{}", line);
        }
        if out.code != 0 {
            warn!(step = %step, code = out.code, stderr = %out.stderr.trim(), "script step failed");
            return Err(VacateError::Local(format!("step {} exited with {}: {}", step, out.code, out.stderr.trim())));
        }
        Ok(())
    }
}
