//! The three pluggable collaborator interfaces (spec §6) plus the opaque
//! progress sink. The core composes them by parameter injection — no
//! global registry.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::natural::sort_natural;

/// `(verbose, exe_path) -> stream of lines`, each `KIND|VALUE`.
pub trait HookRunner {
    fn run(&self, verbose: bool, exe_path: &Path) -> anyhow::Result<Vec<String>>;
}

/// `(pid, exe) -> bool` for classification, `(pid, exe) -> optional path`
/// for attribution. A single trait covers both: `obsolete_source` returning
/// `Some` implies "obsolete" for the classifier's purposes.
pub trait InterpreterProber {
    fn obsolete_source(&self, pid: u32, exe: &Path) -> Option<PathBuf>;
}

/// `(pid) -> optional "name.service"`.
pub trait ServiceManagerProbe {
    fn probe(&self, pid: u32) -> Option<String>;
}

/// Opaque UI sink: progress reporting only, no reporting callbacks (those
/// are the caller's concern once it has the Report).
pub trait ProgressSink {
    fn progress_prep(&self, total: usize, label: &str);
    fn progress_step(&self);
    fn progress_fin(&self);
}

/// Always reports no obsolete interpreter source. The real per-interpreter
/// source-file discovery plugins are out of scope for the core.
pub struct NoopInterpreterProber;

impl InterpreterProber for NoopInterpreterProber {
    fn obsolete_source(&self, _pid: u32, _exe: &Path) -> Option<PathBuf> {
        None
    }
}

/// No-op progress sink for batch mode / tests.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn progress_prep(&self, _total: usize, _label: &str) {}
    fn progress_step(&self) {}
    fn progress_fin(&self) {}
}

/// Runs every executable file directly under `dir`, in natural-sort order
/// of filename, feeding each the exe path on argv and collecting its
/// stdout lines. A generic adapter — not a specific package manager's hook
/// script, which stays out of scope.
pub struct DirectoryHookRunner {
    pub dir: PathBuf,
}

impl HookRunner for DirectoryHookRunner {
    fn run(&self, verbose: bool, exe_path: &Path) -> anyhow::Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dir)?
            .flatten()
            .filter(|e| is_executable(&e.path()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        sort_natural(&mut names, |s| s.as_str());

        let mut lines = Vec::new();
        for name in names {
            let script = self.dir.join(&name);
            debug!(script = %script.display(), "running hook");
            let mut cmd = Command::new(&script);
            cmd.arg(exe_path);
            if verbose {
                cmd.arg("-v");
            }
            match cmd.output() {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    lines.extend(stdout.lines().map(|l| l.to_string()));
                }
                Err(e) => {
                    // Recoverable: a failed hook contributes no facts.
                    warn!(script = %script.display(), error = %e, "hook failed");
                }
            }
        }
        Ok(lines)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Shells out to `systemctl status <pid>` and parses the first `*.service`
/// token on the first status line. This is the explicit resolution of the
/// `$1`/`$2` regex mismatch noted as an open question in the original: we
/// parse our own output rather than relying on whatever a prior match left
/// behind.
pub struct SystemctlProbe;

impl ServiceManagerProbe for SystemctlProbe {
    fn probe(&self, pid: u32) -> Option<String> {
        let output = Command::new("systemctl")
            .arg("status")
            .arg(pid.to_string())
            .output()
            .ok()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next()?;
        first_status_line_unit(first_line)
    }
}

fn first_status_line_unit(line: &str) -> Option<String> {
    line.split_whitespace()
        .find(|tok| tok.ends_with(".service"))
        .map(|tok| tok.trim_end_matches(':').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_status_line_unit_parses_first_service_token() {
        let line = "* nginx.service - A high performance web server";
        assert_eq!(
            first_status_line_unit(line),
            Some("nginx.service".to_string())
        );
    }

    #[test]
    fn test_first_status_line_unit_none_when_absent() {
        let line = "Active: active (running) since Mon";
        assert_eq!(first_status_line_unit(line), None);
    }

    #[test]
    fn test_noop_interpreter_prober_always_none() {
        let prober = NoopInterpreterProber;
        assert_eq!(prober.obsolete_source(1, Path::new("/usr/bin/python3")), None);
    }
}
