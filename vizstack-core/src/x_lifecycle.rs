//! X-server lifecycle (spec §4.4, §6): start/stop driven through a node's
//! launcher, a per-host rate limit on starts, and the `waitXState` polling
//! contract. Constants mirror the original implementation's
//! `X_SERVER_DELAY`/`MAX_GPUS_PER_SYSTEM`/`X_WAIT_TIMEOUT`/`X_WAIT_MAX`.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use vizstack_launcher::{Launcher, Locality, ProcessHandle, Redirect, RunOptions};
use vizstack_types::{VizError, VizErrorKind, VizResult};

/// Minimum interval between successive X-server starts on one host.
pub const X_SERVER_DELAY_SECS: u64 = 5;
pub const MAX_GPUS_PER_SYSTEM: u32 = 8;
/// `(X_SERVER_DELAY + 2) * 2 * MAX_GPUS_PER_SYSTEM`, the default `waitXState`
/// timeout when the caller doesn't specify one.
pub const X_WAIT_TIMEOUT_SECS: u64 = (X_SERVER_DELAY_SECS + 2) * 2 * MAX_GPUS_PER_SYSTEM as u64;
/// The largest timeout a caller may request.
pub const X_WAIT_MAX_SECS: u64 = 600;

const AEW_BIN: &str = "/opt/vizstack/bin/vs-aew";
const START_X_SERVER_BIN: &str = "/opt/vizstack/bin/start-x-server";
const X_KILL_BIN: &str = "/opt/vizstack/bin/vs-Xkill";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct XServerKey {
    pub host_index: u32,
}

struct RunningServer {
    process: ProcessHandle,
}

/// Tracks every X server the broker has started, plus the per-host start
/// rate limiter. Owned by the broker's locked state.
#[derive(Default)]
pub struct XLifecycle {
    servers: IndexMap<(String, u32), RunningServer>,
    last_start: IndexMap<String, Instant>,
}

impl XLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn rate_limited(&self, host: &str, now: Instant) -> bool {
        match self.last_start.get(host) {
            Some(last) => now.duration_since(*last) < Duration::from_secs(X_SERVER_DELAY_SECS),
            None => false,
        }
    }

    /// spec §4.4: starts server `:display` on `host` through `launcher`,
    /// refusing if a start already happened within the rate-limit window.
    pub fn start(&mut self, launcher: &dyn Launcher, host: &str, display: u32) -> VizResult<()> {
        let now = Instant::now();
        if self.rate_limited(host, now) {
            return Err(VizError::new(
                VizErrorKind::ResourceBusy,
                format!("an X server was started on '{host}' within the last {X_SERVER_DELAY_SECS}s"),
            ));
        }
        let cmd = vec![
            AEW_BIN.to_string(),
            START_X_SERVER_BIN.to_string(),
            format!(":{display}"),
            "-logverbose".to_string(),
            "6".to_string(),
        ];
        let opts = RunOptions {
            env: vizstack_launcher::sanitized_env(),
            stdin: Redirect::Null,
            stdout: Redirect::Null,
            stderr: Redirect::Null,
        };
        let process = launcher.run(&cmd, &Locality::Host(host.to_string()), opts)?;
        self.last_start.insert(host.to_string(), now);
        self.servers.insert((host.to_string(), display), RunningServer { process });
        Ok(())
    }

    /// spec §4.4: kills `:display` on `host` and forgets it. Returns
    /// immediately without waiting for the process to exit.
    pub fn stop(&mut self, launcher: &dyn Launcher, host: &str, display: u32) -> VizResult<()> {
        let cmd = vec![X_KILL_BIN.to_string(), format!(":{display}")];
        launcher.run(&cmd, &Locality::Host(host.to_string()), RunOptions::default())?;
        self.servers.remove(&(host.to_string(), display));
        Ok(())
    }

    /// Whether `:display` on `host` is currently running, per our own
    /// bookkeeping (the child process hasn't exited).
    pub fn is_running(&mut self, host: &str, display: u32) -> bool {
        match self.servers.get_mut(&(host.to_string(), display)) {
            Some(server) => matches!(server.process.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// Clamp a caller-supplied `waitXState` timeout to the defined bounds
/// (spec §4.4).
pub fn clamp_timeout(requested: Option<u32>) -> Duration {
    match requested {
        Some(secs) => Duration::from_secs((secs as u64).min(X_WAIT_MAX_SECS)),
        None => Duration::from_secs(X_WAIT_TIMEOUT_SECS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_matches_original_formula() {
        assert_eq!(X_WAIT_TIMEOUT_SECS, 112);
        assert_eq!(clamp_timeout(None), Duration::from_secs(112));
    }

    #[test]
    fn requested_timeout_is_capped_at_max() {
        assert_eq!(clamp_timeout(Some(10_000)), Duration::from_secs(X_WAIT_MAX_SECS));
    }

    #[test]
    fn second_start_within_the_window_is_rate_limited() {
        let mut lifecycle = XLifecycle::new();
        lifecycle.last_start.insert("n0".to_string(), Instant::now());
        assert!(lifecycle.rate_limited("n0", Instant::now()));
    }
}
