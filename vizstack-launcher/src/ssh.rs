use std::process::Command;

use vizstack_types::{VizError, VizErrorKind, VizResult};

use crate::launcher::{Launcher, Locality, ProcessHandle, RunOptions};

/// Runs commands on a remote render node over `ssh`, for deployments with
/// no batch scheduler. Shaped the same way as `BatchReservation::run`
/// (`close_fds`-equivalent via a fresh `Command`, no inherited FDs beyond
/// the three redirected streams), but dispatches through `ssh` instead of
/// `srun`.
#[derive(Debug, Default)]
pub struct RemoteShellLauncher {
    pub ssh_binary: String,
}

impl RemoteShellLauncher {
    pub fn new() -> Self {
        Self { ssh_binary: "ssh".into() }
    }
}

impl Launcher for RemoteShellLauncher {
    fn run(&self, cmd: &[String], locality: &Locality, opts: RunOptions) -> VizResult<ProcessHandle> {
        let Locality::Host(host) = locality else {
            return Err(VizError::new(
                VizErrorKind::InternalError,
                "RemoteShellLauncher requires a host locality",
            ));
        };
        if cmd.is_empty() {
            return Err(VizError::incorrect_value("empty command line"));
        }

        let mut command = Command::new(&self.ssh_binary);
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(host)
            .arg("--")
            .args(cmd)
            .envs(opts.env)
            .stdin(opts.stdin.into_stdio())
            .stdout(opts.stdout.into_stdio())
            .stderr(opts.stderr.into_stdio());

        let child = command
            .spawn()
            .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to start ssh to '{host}': {e}")))?;
        Ok(ProcessHandle::new(child))
    }
}
