//! ProcTable — a single frozen snapshot of every visible pid.
//!
//! Kernel threads (no `exe` link) are excluded entirely; a pid that
//! disappears mid-read is simply not included. The snapshot is read-only
//! once built and consumed by every downstream component.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// One process as seen by a single ProcTable snapshot.
#[derive(Debug, Clone)]
pub struct PidInfo {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub comm: String,
    pub tty_dev_path: Option<String>,
    pub exe_path: Option<PathBuf>,
    pub exe_deleted: bool,
}

pub struct ProcTable {
    by_pid: HashMap<u32, PidInfo>,
    ignored: std::collections::HashSet<u32>,
}

impl ProcTable {
    /// Snapshot every pid under `proc_root`, in ascending numeric order of
    /// discovery. When `ignore_self` is set, the calling process's own pid
    /// and its parent are recorded as ignored (never classified).
    pub fn scan(proc_root: &Path, ignore_self: bool) -> anyhow::Result<ProcTable> {
        let mut by_pid = HashMap::new();

        let entries = fs::read_dir(proc_root)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", proc_root.display(), e))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };

            match read_pid_info(proc_root, pid) {
                Some(info) => {
                    by_pid.insert(pid, info);
                }
                None => {
                    debug!(pid, "pid vanished or is a kernel thread, dropping");
                }
            }
        }

        let mut ignored = std::collections::HashSet::new();
        if ignore_self {
            let self_pid = std::process::id();
            if let Some(info) = by_pid.get(&self_pid) {
                ignored.insert(self_pid);
                ignored.insert(info.ppid);
            }
        }

        Ok(ProcTable { by_pid, ignored })
    }

    pub fn get(&self, pid: u32) -> Option<&PidInfo> {
        self.by_pid.get(&pid)
    }

    pub fn is_ignored(&self, pid: u32) -> bool {
        self.ignored.contains(&pid)
    }

    /// All pids in ascending numeric order, for deterministic processing.
    pub fn pids_ascending(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.by_pid.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn len(&self) -> usize {
        self.by_pid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }
}

fn read_pid_info(proc_root: &Path, pid: u32) -> Option<PidInfo> {
    let pid_dir = proc_root.join(pid.to_string());

    let exe_path_raw = fs::read_link(pid_dir.join("exe")).ok()?;
    let (exe_path, exe_deleted) = split_deleted_marker(&exe_path_raw);

    let meta = fs::metadata(&pid_dir).ok()?;
    let uid = meta.uid();

    let stat = fs::read_to_string(pid_dir.join("stat")).ok()?;
    let (comm, ppid) = parse_stat_comm_ppid(&stat)?;

    let tty_dev_path = controlling_tty(proc_root, pid);

    Some(PidInfo {
        pid,
        ppid,
        uid,
        comm,
        tty_dev_path,
        exe_path: Some(exe_path),
        exe_deleted,
    })
}

/// Strip a leading or trailing `(deleted)` marker the kernel appends/prepends
/// to the exe symlink target for a process whose binary has been unlinked.
fn split_deleted_marker(raw: &Path) -> (PathBuf, bool) {
    let s = raw.to_string_lossy();
    if let Some(stripped) = s.strip_suffix(" (deleted)") {
        (PathBuf::from(stripped), true)
    } else if let Some(stripped) = s.strip_prefix("(deleted)") {
        (PathBuf::from(stripped.trim_start()), true)
    } else {
        (raw.to_path_buf(), false)
    }
}

/// Parse `comm` and `ppid` out of `/proc/{pid}/stat`.
///
/// Format: `pid (comm) state ppid ...`. `comm` may itself contain spaces or
/// parentheses, so we anchor on the *last* `)`.
fn parse_stat_comm_ppid(stat: &str) -> Option<(String, u32)> {
    let comm_start = stat.find('(')?;
    let comm_end = stat.rfind(')')?;
    let comm = stat.get(comm_start + 1..comm_end)?.to_string();

    let rest = stat.get(comm_end + 2..)?;
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    let ppid: u32 = fields.next()?.parse().ok()?;

    Some((comm, ppid))
}

/// Resolve the controlling terminal by inspecting stdio file descriptors.
/// The first of fd 0/1/2 that resolves to a pty or tty device wins.
fn controlling_tty(proc_root: &Path, pid: u32) -> Option<String> {
    for fd in 0..=2u32 {
        let link = proc_root.join(pid.to_string()).join("fd").join(fd.to_string());
        if let Ok(target) = fs::read_link(&link) {
            let target = target.to_string_lossy();
            if target.starts_with("/dev/pts/") || target.starts_with("/dev/tty") {
                return Some(target.to_string());
            }
        }
    }
    None
}
