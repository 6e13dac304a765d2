use std::process::Command;

use vizstack_types::{VizError, VizErrorKind, VizResult};

use crate::launcher::{Launcher, Locality, ProcessHandle, RunOptions};

/// Runs commands directly on the broker's own host. Requests for any other
/// locality are rejected — they belong to `RemoteShell` or
/// `BatchReservation`.
#[derive(Debug, Default)]
pub struct LocalLauncher;

impl LocalLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for LocalLauncher {
    fn run(&self, cmd: &[String], locality: &Locality, opts: RunOptions) -> VizResult<ProcessHandle> {
        if !matches!(locality, Locality::Local) {
            return Err(VizError::new(
                VizErrorKind::InternalError,
                "LocalLauncher cannot run commands on a remote host",
            ));
        }
        let Some((program, args)) = cmd.split_first() else {
            return Err(VizError::incorrect_value("empty command line"));
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(opts.env)
            .stdin(opts.stdin.into_stdio())
            .stdout(opts.stdout.into_stdio())
            .stderr(opts.stderr.into_stdio());
        let child = command
            .spawn()
            .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to start '{program}': {e}")))?;
        Ok(ProcessHandle::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_locality() {
        let launcher = LocalLauncher::new();
        let err = launcher
            .run(&["true".into()], &Locality::Host("n0".into()), RunOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, VizErrorKind::InternalError);
    }

    #[test]
    fn runs_a_local_command() {
        let launcher = LocalLauncher::new();
        let mut handle = launcher
            .run(&["true".into()], &Locality::Local, RunOptions::default())
            .unwrap();
        let status = handle.wait().unwrap();
        assert!(status.success());
    }
}
