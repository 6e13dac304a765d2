//! The batch-scheduler adapter (spec §4.5): a node is owned by exactly one
//! scheduler-kind implementation (`local`, `ssh`, `batch`); each can turn a
//! requested node set into a reservation, or fail without partial success.

use std::process::Command;

use vizstack_launcher::{BatchReservation, Launcher, RemoteShellLauncher};
use vizstack_types::{VizError, VizErrorKind, VizResult};

/// What reserving a node set handed back: a launcher usable for every node
/// in the reservation, plus (for batch reservations) the underlying job so
/// it can be released when the allocation is torn down.
pub enum Reservation {
    Local,
    Ssh,
    Batch(BatchReservation),
}

impl Reservation {
    pub fn launcher(&self) -> Box<dyn Launcher> {
        match self {
            Reservation::Local => Box::new(vizstack_launcher::LocalLauncher::new()),
            Reservation::Ssh => Box::new(RemoteShellLauncher::new()),
            Reservation::Batch(res) => Box::new(clone_batch(res)),
        }
    }
}

/// `BatchReservation` is deliberately not `Clone`-into-owner (see
/// `vizstack-launcher::batch`); handing a launcher out of a `Reservation`
/// uses the non-owning copy, since the `Reservation` itself remains the
/// owner responsible for releasing the job.
fn clone_batch(res: &BatchReservation) -> BatchReservation {
    res.clone()
}

pub trait SchedulerAdapter: Send + Sync {
    fn kind_name(&self) -> &'static str;
    fn owns(&self, node: &str) -> bool;
    fn reserve(&self, nodes: &[String]) -> VizResult<Reservation>;
}

pub struct LocalSchedulerAdapter {
    pub nodes: Vec<String>,
}

impl SchedulerAdapter for LocalSchedulerAdapter {
    fn kind_name(&self) -> &'static str {
        "local"
    }
    fn owns(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }
    fn reserve(&self, _nodes: &[String]) -> VizResult<Reservation> {
        Ok(Reservation::Local)
    }
}

pub struct SshSchedulerAdapter {
    pub nodes: Vec<String>,
}

impl SchedulerAdapter for SshSchedulerAdapter {
    fn kind_name(&self) -> &'static str {
        "ssh"
    }
    fn owns(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }
    fn reserve(&self, _nodes: &[String]) -> VizResult<Reservation> {
        Ok(Reservation::Ssh)
    }
}

/// Reserves nodes through SLURM with `salloc --immediate`, parsing the
/// granted job id out of `SLURM_JOB_ID`. Running steps inside the
/// reservation is `BatchReservation::run` (`srun --jobid=... -w ... -N1`).
pub struct BatchSchedulerAdapter {
    pub nodes: Vec<String>,
}

impl SchedulerAdapter for BatchSchedulerAdapter {
    fn kind_name(&self) -> &'static str {
        "batch"
    }
    fn owns(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }
    fn reserve(&self, nodes: &[String]) -> VizResult<Reservation> {
        let node_list = nodes.join(",");
        let output = Command::new("salloc")
            .arg("--immediate")
            .arg("-w")
            .arg(&node_list)
            .arg(format!("-N{}", nodes.len()))
            .arg("sh")
            .arg("-c")
            .arg("echo $SLURM_JOB_ID")
            .output()
            .map_err(|e| VizError::new(VizErrorKind::ResourceUnavailable, format!("failed to run salloc: {e}")))?;
        if !output.status.success() {
            return Err(VizError::new(
                VizErrorKind::ResourceUnavailable,
                format!("salloc could not reserve [{node_list}]: {}", String::from_utf8_lossy(&output.stderr)),
            ));
        }
        let job_id: u64 = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next_back()
            .unwrap_or("")
            .trim()
            .parse()
            .map_err(|_| VizError::new(VizErrorKind::InternalError, "salloc did not report a SLURM_JOB_ID"))?;
        Ok(Reservation::Batch(BatchReservation::new(job_id, nodes.to_vec())))
    }
}

/// Routes a reservation request to the adapter that owns every requested
/// node. Node ownership is exclusive across adapters, validated once at
/// startup (spec §4.5: "validated at startup and violates
/// `BAD_CONFIGURATION` otherwise").
pub struct MetaScheduler {
    adapters: Vec<Box<dyn SchedulerAdapter>>,
}

impl MetaScheduler {
    /// `all_nodes` is the full configured node list (spec §4.5: "a single
    /// node may be claimed by only one scheduler instance in the
    /// configuration; this is validated at startup").
    pub fn new(adapters: Vec<Box<dyn SchedulerAdapter>>, all_nodes: &[String]) -> VizResult<Self> {
        let meta = Self { adapters };
        meta.validate_no_overlap(all_nodes)?;
        Ok(meta)
    }

    fn validate_no_overlap(&self, all_nodes: &[String]) -> VizResult<()> {
        for node in all_nodes {
            let owners = self.adapters.iter().filter(|a| a.owns(node)).count();
            if owners > 1 {
                return Err(VizError::bad_configuration(format!(
                    "node '{node}' is claimed by more than one scheduler"
                )));
            }
        }
        Ok(())
    }

    pub fn adapter_for(&self, node: &str) -> Option<&dyn SchedulerAdapter> {
        self.adapters.iter().find(|a| a.owns(node)).map(|a| a.as_ref())
    }

    /// Reserve a node set. All requested nodes must belong to a single
    /// adapter; spanning adapters in one reservation is not supported.
    pub fn reserve(&self, nodes: &[String]) -> VizResult<Reservation> {
        let Some(first) = nodes.first() else {
            return Err(VizError::internal("cannot reserve an empty node set"));
        };
        let adapter = self
            .adapter_for(first)
            .ok_or_else(|| VizError::bad_configuration(format!("node '{first}' is not owned by any scheduler")))?;
        for node in nodes {
            if !adapter.owns(node) {
                return Err(VizError::internal(format!(
                    "reservation spans multiple scheduler kinds ('{first}' and '{node}')"
                )));
            }
        }
        adapter.reserve(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_nodes_are_bad_configuration() {
        let a = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".into()] });
        let b = Box::new(SshSchedulerAdapter { nodes: vec!["n0".into()] });
        let err = MetaScheduler::new(vec![a, b], &["n0".to_string()]).unwrap_err();
        assert_eq!(err.kind, vizstack_types::VizErrorKind::BadConfiguration);
    }

    #[test]
    fn disjoint_nodes_validate_cleanly() {
        let a = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".into()] });
        let b = Box::new(SshSchedulerAdapter { nodes: vec!["n1".into()] });
        let meta = MetaScheduler::new(vec![a, b], &["n0".to_string(), "n1".to_string()]).unwrap();
        assert_eq!(meta.adapter_for("n0").unwrap().kind_name(), "local");
        assert_eq!(meta.adapter_for("n1").unwrap().kind_name(), "ssh");
    }
}
