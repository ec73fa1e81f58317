//! Hook-command adapters.
//!
//! The provisioner and mailer shell out to operator-supplied executables.
//! Arguments travel as `FLEET_*` environment variables; a non-zero exit is
//! a failure and its stderr becomes the error message.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Mailer, Provisioner};
use crate::error::{Error, Result};
use crate::model::{Host, HostAction, Notification};

/// Runs `command` with `envs`, enforcing `timeout`. Returns stderr on failure.
async fn run_hook(
    command: &Path,
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<std::result::Result<(), String>> {
    // Relative hook paths resolve against the process CWD.
    let command = if command.is_relative() {
        std::env::current_dir()?.join(command)
    } else {
        command.to_path_buf()
    };

    debug!(command = %command.display(), "running hook");

    let mut cmd = Command::new(&command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("hook {}", command.display()),
            seconds: timeout.as_secs(),
        })??;

    if output.status.success() {
        Ok(Ok(()))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok(Err(format!(
            "exited with status {}{}",
            output.status.code().unwrap_or(-1),
            if stderr.is_empty() {
                String::new()
            } else {
                format!(": {stderr}")
            }
        )))
    }
}

/// Terminates or decommissions hosts by running a hook command.
///
/// The hook sees `FLEET_ACTION` ("terminate" | "decommission"),
/// `FLEET_HOST_ID`, `FLEET_HOSTNAME`, and `FLEET_DISTRO`.
pub struct CommandProvisioner {
    command: PathBuf,
    timeout: Duration,
}

impl CommandProvisioner {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn apply(&self, host: &Host, action: HostAction) -> Result<()> {
        let envs = [
            ("FLEET_ACTION", action.as_str()),
            ("FLEET_HOST_ID", host.id.as_str()),
            ("FLEET_HOSTNAME", host.host.as_str()),
            ("FLEET_DISTRO", host.distro_id.as_str()),
        ];
        run_hook(&self.command, &envs, self.timeout)
            .await?
            .map_err(|message| Error::Provision {
                host_id: host.id.clone(),
                message,
            })
    }
}

/// Delivers notifications by running a hook command.
///
/// The hook sees `FLEET_RECIPIENT`, `FLEET_SUBJECT`, and `FLEET_BODY`.
pub struct CommandMailer {
    command: PathBuf,
    timeout: Duration,
}

impl CommandMailer {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Mailer for CommandMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let envs = [
            ("FLEET_RECIPIENT", notification.recipient.as_str()),
            ("FLEET_SUBJECT", notification.subject.as_str()),
            ("FLEET_BODY", notification.body.as_str()),
        ];
        run_hook(&self.command, &envs, self.timeout)
            .await?
            .map_err(|message| Error::Delivery {
                recipient: notification.recipient.clone(),
                message,
            })
    }
}
