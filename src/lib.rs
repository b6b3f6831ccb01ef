//! # restartcheck
//!
//! Finds processes still holding on to deleted or upgraded files — a
//! library unlinked by a package upgrade, an executable replaced under a
//! running process's feet — and tells you what needs restarting to pick up
//! the new code: a systemd unit, a SysV init script, a user session, or the
//! system itself if the running kernel isn't the newest one installed.
//!
//! The scan is read-only and single-threaded: one frozen snapshot of
//! `/proc`, classified and attributed in ascending pid order, with no
//! mutation of system state. Everything outside that — loading a config
//! file, prompting the user to restart a service, the interactive TUI — is
//! a driver's job, not the library's.

pub mod attributor;
pub mod classifier;
pub mod collab;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod lsb;
pub mod mapscan;
pub mod natural;
pub mod output;
pub mod proc_table;
pub mod report;
pub mod scan;

pub use config::ScanOptions;
pub use error::FatalError;
pub use report::Report;
pub use scan::{run, Collaborators};
