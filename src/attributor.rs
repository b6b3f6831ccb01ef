//! ProcessAttributor — maps an obsolete pid to a controllable entity.
//!
//! Decision order is the ordering contract (spec §4.5, §5): session, then
//! parent pivot, then service-manager root / legacy init, then cgroup,
//! then the service-manager probe, then the hook runner, then `Unknown`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, trace};

use crate::collab::{HookRunner, ServiceManagerProbe};
use crate::lsb;
use crate::proc_table::{PidInfo, ProcTable};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ControllableUnit {
    ServiceManagerRoot,
    LegacyInit,
    ServiceUnit { name: String },
    InitScript { path: PathBuf },
    UserSession { uid: u32, session_id: String },
    Unknown,
}

/// Known service-manager binary paths; any of these at pid 1 means the
/// candidate is the supervisor root.
const SERVICE_MANAGER_PATHS: &[&str] =
    &["/usr/lib/systemd/systemd", "/lib/systemd/systemd", "/sbin/systemd"];

const LEGACY_INIT_PATH: &str = "/sbin/init";

pub struct AttributionInputs<'a> {
    pub proc_table: &'a ProcTable,
    pub current_uid: Option<u32>,
    pub proc_root: &'a Path,
    pub run_root: &'a Path,
    pub runlevel: u8,
    pub hook_runner: &'a dyn HookRunner,
    pub service_manager_probe: &'a dyn ServiceManagerProbe,
    pub verbose: bool,
}

pub fn attribute(pid: u32, inputs: &AttributionInputs) -> ControllableUnit {
    let Some(pid_info) = inputs.proc_table.get(pid) else {
        return ControllableUnit::Unknown;
    };

    // Step 1: session attribution dominates everything else.
    if let Some(tty) = &pid_info.tty_dev_path {
        return ControllableUnit::UserSession {
            uid: pid_info.uid,
            session_id: tty.clone(),
        };
    }

    // Step 2: parent pivot.
    let Some(candidate) = find_candidate(pid, inputs.proc_table, inputs.current_uid) else {
        return ControllableUnit::Unknown;
    };

    // Step 3/4: service-manager root or legacy init.
    if candidate.pid == 1 {
        if let Some(exe) = &candidate.exe_path {
            let exe_str = exe.to_string_lossy();
            if SERVICE_MANAGER_PATHS.iter().any(|p| exe_str == *p) {
                return ControllableUnit::ServiceManagerRoot;
            }
            if exe_str == LEGACY_INIT_PATH {
                return ControllableUnit::LegacyInit;
            }
        }
    }

    // Step 5: cgroup probe.
    if let Some(unit) = cgroup_attribution(inputs.proc_root, candidate.pid) {
        return unit;
    }

    // Step 6: service-manager probe fallback.
    if let Some(name) = inputs.service_manager_probe.probe(candidate.pid) {
        return ControllableUnit::ServiceUnit { name };
    }

    // Step 7: hook runner.
    if let Some(unit) = hook_attribution(candidate, inputs) {
        return unit;
    }

    ControllableUnit::Unknown
}

/// Walk the ppid chain to the nearest ancestor still visible to the caller.
/// In privileged mode this is the ancestor whose ppid is 1; in unprivileged
/// mode, the process itself as soon as its parent belongs to another uid
/// (or doesn't exist in the snapshot).
fn find_candidate<'a>(
    pid: u32,
    table: &'a ProcTable,
    current_uid: Option<u32>,
) -> Option<&'a PidInfo> {
    let mut visited = HashSet::new();
    let mut current = pid;

    loop {
        if visited.contains(&current) {
            return table.get(current);
        }
        visited.insert(current);

        let info = table.get(current)?;
        if info.ppid == 1 {
            return Some(info);
        }

        match (table.get(info.ppid), current_uid) {
            (Some(parent), Some(uid)) if parent.uid == uid => {
                current = info.ppid;
            }
            (Some(_), None) => {
                current = info.ppid;
            }
            _ => return Some(info),
        }
    }
}

static SYSTEMD_UNIT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^/]+\.service)$").unwrap());
static SYSTEMD_SESSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"user-(\d+)\.slice/session-(\d+)\.scope").unwrap());

/// Read `/proc/{pid}/cgroup` and extract a unit or user-session from any
/// line tagged as belonging to the service-manager controller (the unified
/// `0::` hierarchy, or a legacy `name=systemd` named hierarchy).
fn cgroup_attribution(proc_root: &Path, pid: u32) -> Option<ControllableUnit> {
    let content = std::fs::read_to_string(proc_root.join(pid.to_string()).join("cgroup")).ok()?;

    for line in content.lines() {
        let mut fields = line.splitn(3, ':');
        let _id = fields.next()?;
        let controllers = fields.next()?;
        let path = fields.next()?;

        let is_service_manager_line = controllers.is_empty() || controllers.contains("name=systemd");
        if !is_service_manager_line {
            continue;
        }

        if let Some(m) = SYSTEMD_UNIT_SEGMENT.captures(path) {
            return Some(ControllableUnit::ServiceUnit {
                name: m[1].to_string(),
            });
        }
        if let Some(m) = SYSTEMD_SESSION_SEGMENT.captures(path) {
            let uid: u32 = m[1].parse().ok()?;
            return Some(ControllableUnit::UserSession {
                uid,
                session_id: format!("session #{}", &m[2]),
            });
        }
    }
    None
}

enum HookCandidate {
    Script(PathBuf),
}

/// Invoke each configured hook script and parse its output per spec §4.5
/// step 7. Stops after the first hook that yields any attribution.
fn hook_attribution(candidate: &PidInfo, inputs: &AttributionInputs) -> Option<ControllableUnit> {
    let exe = candidate.exe_path.as_ref()?;
    let lines = inputs.hook_runner.run(inputs.verbose, exe).ok()?;

    let mut candidates: Vec<HookCandidate> = Vec::new();

    for line in &lines {
        let Some((kind, value)) = line.split_once('|') else {
            continue;
        };
        if kind != "RC" {
            continue; // PACKAGE lines are informational only
        }
        let script_path = PathBuf::from(value);
        let Ok(body) = std::fs::read_to_string(&script_path) else {
            continue;
        };

        match lsb::parse_header(&body) {
            None => {
                debug!(script = %script_path.display(), "no LSB header, treating as candidate");
                candidates.push(HookCandidate::Script(script_path));
            }
            Some(header) => {
                if !header.covers_runlevel(inputs.runlevel) {
                    trace!(script = %script_path.display(), "runlevel mismatch, ignoring");
                    continue;
                }
                match lsb::find_pidfile_reference(&body) {
                    Some(referenced) => {
                        let resolved = resolve_under_root(inputs.run_root, &referenced);
                        if lsb::pidfile_contains(&resolved, candidate.pid) {
                            return Some(ControllableUnit::InitScript { path: script_path });
                        }
                        candidates.push(HookCandidate::Script(script_path));
                    }
                    None => {
                        candidates.push(HookCandidate::Script(script_path));
                    }
                }
            }
        }
    }

    // No perfect pidfile hit: promote the first recorded candidate.
    candidates.into_iter().find_map(|HookCandidate::Script(path)| {
        Some(ControllableUnit::InitScript { path })
    })
}

fn resolve_under_root(run_root: &Path, referenced: &Path) -> PathBuf {
    match referenced.strip_prefix("/") {
        Ok(rel) => run_root.join(rel),
        Err(_) => run_root.join(referenced),
    }
}
