//! SLURM-backed launcher, grounded in `SLURMLauncher` of the original
//! implementation: `srun --jobid=N -w <node> -N1 <cmd>` to run inside an
//! already-held job allocation, `scancel -q <jobid>` to release it.

use std::process::Command;

use log::warn;
use vizstack_types::{VizError, VizErrorKind, VizResult};

use crate::launcher::{Launcher, Locality, ProcessHandle, RunOptions};

/// Holds a SLURM job allocation. Mirrors the original's `__isCopy`/
/// `__getstate__`/`__setstate__` dance: a `BatchReservation` obtained by
/// `Clone` (the copy-semantics the original needed for serialization) is
/// not the owner and will not `scancel` the job when dropped, since some
/// other instance already owns that responsibility.
#[derive(Debug)]
pub struct BatchReservation {
    job_id: Option<u64>,
    node_list: Vec<String>,
    is_owner: bool,
}

impl BatchReservation {
    /// A freshly obtained reservation: this instance owns the job and will
    /// `scancel` it on drop.
    pub fn new(job_id: u64, node_list: Vec<String>) -> Self {
        Self { job_id: Some(job_id), node_list, is_owner: true }
    }

    /// Rebuilt from a stored scheduler ID (e.g. deserialized from an
    /// allocation record): not the owner, never `scancel`s.
    pub fn from_job_id(job_id: u64) -> Self {
        Self { job_id: Some(job_id), node_list: Vec::new(), is_owner: false }
    }

    pub fn job_id(&self) -> Option<u64> {
        self.job_id
    }

    /// Release this job allocation. A no-op on non-owning reservations,
    /// exactly as `SLURMLauncher.deallocate` short-circuits when
    /// `__isCopy` is true.
    pub fn deallocate(&mut self) -> VizResult<()> {
        if !self.is_owner {
            self.job_id = None;
            return Ok(());
        }
        let Some(job_id) = self.job_id else { return Ok(()) };

        let output = Command::new("scancel")
            .arg("-q")
            .arg(job_id.to_string())
            .output()
            .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to run scancel: {e}")))?;
        if !output.status.success() {
            return Err(VizError::new(
                VizErrorKind::InternalError,
                format!("scancel -q {job_id} failed: {}", String::from_utf8_lossy(&output.stderr)),
            ));
        }
        self.job_id = None;
        Ok(())
    }
}

impl Clone for BatchReservation {
    fn clone(&self) -> Self {
        Self {
            job_id: self.job_id,
            node_list: self.node_list.clone(),
            is_owner: false,
        }
    }
}

impl Drop for BatchReservation {
    fn drop(&mut self) {
        if self.is_owner && !self.node_list.is_empty() {
            if let Err(e) = self.deallocate() {
                warn!("failed to release SLURM job on drop: {e}");
            }
        }
    }
}

impl Launcher for BatchReservation {
    fn run(&self, cmd: &[String], locality: &Locality, opts: RunOptions) -> VizResult<ProcessHandle> {
        let Locality::Host(node) = locality else {
            return Err(VizError::new(
                VizErrorKind::InternalError,
                "BatchReservation requires a host locality",
            ));
        };
        let job_id = self
            .job_id
            .ok_or_else(|| VizError::internal("this reservation has already been released"))?;
        if cmd.is_empty() {
            return Err(VizError::incorrect_value("empty command line"));
        }

        let mut command = Command::new("srun");
        command
            .arg(format!("--jobid={job_id}"))
            .arg("-w")
            .arg(node)
            .arg("-N1")
            .args(cmd)
            .envs(opts.env)
            .stdin(opts.stdin.into_stdio())
            .stdout(opts.stdout.into_stdio())
            .stderr(opts.stderr.into_stdio());

        let child = command
            .spawn()
            .map_err(|e| VizError::new(VizErrorKind::InternalError, format!("failed to start srun: {e}")))?;
        Ok(ProcessHandle::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_reservation_is_not_owner() {
        let original = BatchReservation::new(42, vec!["n0".into()]);
        let copy = original.clone();
        assert!(!copy.is_owner);
        assert_eq!(copy.job_id(), Some(42));
    }

    #[test]
    fn deallocate_on_non_owner_is_a_no_op() {
        let mut copy = BatchReservation::from_job_id(42);
        copy.deallocate().unwrap();
        assert_eq!(copy.job_id(), None);
    }
}
