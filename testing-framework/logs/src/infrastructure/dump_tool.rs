use std::{
    ffi::OsString,
    io,
    path::Path,
    process::{Output, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const KUBECTL: &str = "kubectl";

/// Errors returned from diagnostic tool invocations.
#[derive(Debug, Error)]
pub enum DumpToolError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} exited with status {status:?}\nstderr:\n{stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// External diagnostics commands run against one cluster.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Writes the cluster-info dump tree for `namespaces` below `output_dir`.
    async fn cluster_info_dump(
        &self,
        kubeconfig: &Path,
        namespaces: &[String],
        output_dir: &Path,
    ) -> Result<(), DumpToolError>;

    /// Returns the `describe pods` output for one namespace.
    async fn describe_pods(
        &self,
        kubeconfig: &Path,
        namespace: &str,
    ) -> Result<Vec<u8>, DumpToolError>;
}

/// [`DumpTool`] shelling out to `kubectl`. Each invocation is killed once the
/// timeout expires.
#[derive(Clone, Debug)]
pub struct KubectlDumpTool {
    program: OsString,
    timeout: Duration,
}

impl KubectlDumpTool {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: KUBECTL.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, kubeconfig: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--kubeconfig")
            .arg(kubeconfig)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, command: String) -> Result<Output, DumpToolError> {
        debug!(command, "running diagnostics command");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| DumpToolError::Timeout {
                command: command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| DumpToolError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(DumpToolError::Failed {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

#[async_trait]
impl DumpTool for KubectlDumpTool {
    async fn cluster_info_dump(
        &self,
        kubeconfig: &Path,
        namespaces: &[String],
        output_dir: &Path,
    ) -> Result<(), DumpToolError> {
        let mut cmd = self.command(kubeconfig);
        cmd.arg("cluster-info")
            .arg("dump")
            .arg("--namespaces")
            .arg(namespaces.join(","))
            .arg("--output-directory")
            .arg(output_dir);

        let command = format!("kubectl cluster-info dump --namespaces {}", namespaces.join(","));
        self.run(cmd, command).await.map(|_| ())
    }

    async fn describe_pods(
        &self,
        kubeconfig: &Path,
        namespace: &str,
    ) -> Result<Vec<u8>, DumpToolError> {
        let mut cmd = self.command(kubeconfig);
        cmd.arg("describe").arg("pods").arg("-n").arg(namespace);

        let command = format!("kubectl describe pods -n {namespace}");
        self.run(cmd, command).await.map(|output| output.stdout)
    }
}
