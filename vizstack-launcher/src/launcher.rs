use std::process::{Child, Stdio};

use vizstack_types::{VizError, VizErrorKind, VizResult};

/// Where a launcher places the process it starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locality {
    Local,
    Host(String),
}

/// Redirections a caller may want applied to a launched process. `Inherit`
/// mirrors passing `None` to the original's `Popen(..., stdin=None, ...)`.
#[derive(Debug, Default)]
pub enum Redirect {
    #[default]
    Inherit,
    Null,
    Piped,
}

impl Redirect {
    pub(crate) fn into_stdio(self) -> Stdio {
        match self {
            Redirect::Inherit => Stdio::inherit(),
            Redirect::Null => Stdio::null(),
            Redirect::Piped => Stdio::piped(),
        }
    }
}

#[derive(Default)]
pub struct RunOptions {
    pub env: Vec<(String, String)>,
    pub stdin: Redirect,
    pub stdout: Redirect,
    pub stderr: Redirect,
}

/// A launched process. Wraps `std::process::Child`; callers that launched
/// with `Redirect::Piped` can still reach the pipes through `child_mut`.
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub fn try_wait(&mut self) -> VizResult<Option<std::process::ExitStatus>> {
        self.child.try_wait().map_err(process_error)
    }

    pub fn wait(&mut self) -> VizResult<std::process::ExitStatus> {
        self.child.wait().map_err(process_error)
    }

    pub fn kill(&mut self) -> VizResult<()> {
        self.child.kill().map_err(process_error)
    }
}

fn process_error(e: std::io::Error) -> VizError {
    VizError::new(VizErrorKind::InternalError, e.to_string())
}

/// Starts processes at some locality. Implemented per scheduling backend:
/// `Local` runs in place, `RemoteShell` goes over `ssh`, `BatchReservation`
/// goes through `srun` inside a held SLURM allocation.
pub trait Launcher {
    fn run(&self, cmd: &[String], locality: &Locality, opts: RunOptions) -> VizResult<ProcessHandle>;
}
