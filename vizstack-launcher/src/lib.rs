//! Process launching across locality for the VizStack resource broker:
//! local execution, remote execution over `ssh`, and SLURM batch
//! reservations, unified behind the `Launcher` trait.

pub mod batch;
pub mod env;
pub mod launcher;
pub mod local;
pub mod memory;
pub mod ssh;

pub use batch::BatchReservation;
pub use env::{sanitize_ld_preload, sanitized_env};
pub use launcher::{Launcher, Locality, ProcessHandle, Redirect, RunOptions};
pub use local::LocalLauncher;
pub use memory::MemoryLauncher;
pub use ssh::RemoteShellLauncher;
