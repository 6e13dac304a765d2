//! An in-memory launcher for integration tests: instead of spawning real
//! processes it records what it was asked to run, and synthesizes a
//! trivially successful `ProcessHandle` by spawning `true` (or `cmd
//! /C exit 0` would be the Windows equivalent; this broker only targets
//! Unix render nodes). Kept separate from `LocalLauncher` so production
//! code never accidentally depends on it.

use std::process::Command;
use std::sync::Mutex;

use vizstack_types::VizResult;

use crate::launcher::{Launcher, Locality, ProcessHandle, RunOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub cmd: Vec<String>,
    pub locality: Locality,
}

#[derive(Default)]
pub struct MemoryLauncher {
    runs: Mutex<Vec<RecordedRun>>,
}

impl MemoryLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }
}

impl Launcher for MemoryLauncher {
    fn run(&self, cmd: &[String], locality: &Locality, _opts: RunOptions) -> VizResult<ProcessHandle> {
        self.runs.lock().unwrap().push(RecordedRun {
            cmd: cmd.to_vec(),
            locality: locality.clone(),
        });
        let child = Command::new("true")
            .spawn()
            .unwrap_or_else(|_| Command::new("/bin/true").spawn().expect("a `true` binary on PATH"));
        Ok(ProcessHandle::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_without_touching_the_real_command() {
        let launcher = MemoryLauncher::new();
        launcher
            .run(&["Xorg".into(), ":1".into()], &Locality::Host("n0".into()), RunOptions::default())
            .unwrap();
        let runs = launcher.recorded_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].cmd, vec!["Xorg".to_string(), ":1".to_string()]);
    }
}
