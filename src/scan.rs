//! Top-level orchestration: wires ProcTable, ObsolescenceClassifier,
//! ProcessAttributor and KernelScanner into one Report (spec §2 data flow).
//! Single-threaded, sequential, ascending-pid order — no concurrency model
//! to speak of, which is itself the point: the snapshot is frozen once and
//! every component reads the same view of it.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::attributor::{self, AttributionInputs};
use crate::classifier::{self, Verdict};
use crate::collab::{HookRunner, InterpreterProber, ProgressSink, ServiceManagerProbe};
use crate::config::ScanOptions;
use crate::kernel;
use crate::proc_table::ProcTable;
use crate::report::{Report, ReportBuilder};

pub struct Collaborators<'a> {
    pub hook_runner: &'a dyn HookRunner,
    pub interpreter: &'a dyn InterpreterProber,
    pub service_manager_probe: &'a dyn ServiceManagerProbe,
    pub progress: &'a dyn ProgressSink,
}

pub fn run(options: &ScanOptions, collaborators: &Collaborators) -> anyhow::Result<Report> {
    options.validate()?;

    let current_uid = effective_uid(&options.proc_root);
    if current_uid.is_some() {
        info!("running unprivileged, scan limited to own processes");
    }

    let table = ProcTable::scan(&options.proc_root, true)?;
    let pids = table.pids_ascending();
    collaborators.progress.progress_prep(pids.len(), "scanning processes");

    let runlevel = kernel::current_runlevel();
    let mut builder = ReportBuilder::new();

    for pid in pids {
        collaborators.progress.progress_step();
        if table.is_ignored(pid) {
            continue;
        }
        let Some(pid_info) = table.get(pid) else {
            continue;
        };

        let verdict = match classifier::classify(
            pid_info,
            &options.proc_root,
            options,
            collaborators.interpreter,
            current_uid,
        ) {
            Ok(v) => v,
            Err(err) => {
                debug!(pid, %err, "pid not classifiable, skipping");
                continue;
            }
        };

        if matches!(verdict, Verdict::Current) {
            continue;
        }

        let inputs = AttributionInputs {
            proc_table: &table,
            current_uid,
            proc_root: &options.proc_root,
            run_root: &options.run_root,
            runlevel,
            hook_runner: collaborators.hook_runner,
            service_manager_probe: collaborators.service_manager_probe,
            verbose: options.verbose,
        };
        let unit = attributor::attribute(pid, &inputs);
        if !visible_in_scan(current_uid, &unit) {
            debug!(pid, "unprivileged scan, suppressing non-session attribution");
            continue;
        }

        builder.record(pid, &pid_info.comm, unit);
    }
    collaborators.progress.progress_fin();

    if options.kernelhints {
        let version_path = options.proc_root.join("version");
        builder.set_kernel(kernel::scan(&options.boot_dir, &version_path));
    }

    Ok(builder.build(options))
}

/// Unprivileged mode never reports a controllable unit (spec invariant 3):
/// only session attribution is something the caller could act on for their
/// own processes. `attribute()` itself is privilege-agnostic, so the run
/// loop filters its result here.
fn visible_in_scan(current_uid: Option<u32>, unit: &attributor::ControllableUnit) -> bool {
    match current_uid {
        Some(_) => matches!(unit, attributor::ControllableUnit::UserSession { .. }),
        None => true,
    }
}

/// Effective uid of the scanning process itself, read from
/// `{proc_root}/self/status` so tests can point it at a fixture tree.
/// `None` means uid 0 (unprivileged short-circuiting in the classifier is
/// disabled; every pid is inspected).
fn effective_uid(proc_root: &Path) -> Option<u32> {
    let status = fs::read_to_string(proc_root.join("self").join("status")).ok()?;
    let line = status.lines().find(|l| l.starts_with("Uid:"))?;
    let uid: u32 = line.split_whitespace().nth(2)?.parse().ok()?;
    if uid == 0 {
        None
    } else {
        Some(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NoopInterpreterProber, NullProgressSink};
    use std::os::unix::fs::symlink;

    struct NoProbe;
    impl ServiceManagerProbe for NoProbe {
        fn probe(&self, _pid: u32) -> Option<String> {
            None
        }
    }
    struct NoHooks;
    impl HookRunner for NoHooks {
        fn run(&self, _verbose: bool, _exe_path: &Path) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    /// `maps` is the raw `/proc/{pid}/maps` content; empty for pids whose
    /// mapping table shouldn't matter to the test (e.g. a `deleted` exe is
    /// already decided by the exe-link check, before mapscan ever runs).
    fn make_fake_pid(
        root: &Path,
        pid: u32,
        comm: &str,
        ppid: u32,
        exe_target: &str,
        deleted: bool,
        maps: &str,
    ) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(dir.join("fd")).unwrap();
        let stat = format!("{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 0 0 0 0 0 0 0 0 0 0 0 0\n");
        fs::write(dir.join("stat"), stat).unwrap();
        fs::write(dir.join("maps"), maps).unwrap();
        let target = if deleted {
            format!("{exe_target} (deleted)")
        } else {
            exe_target.to_string()
        };
        symlink(target, dir.join("exe")).unwrap();
    }

    #[test]
    fn test_visible_in_scan_privileged_allows_any_unit() {
        use crate::attributor::ControllableUnit;
        assert!(visible_in_scan(None, &ControllableUnit::ServiceUnit { name: "foo.service".to_string() }));
        assert!(visible_in_scan(None, &ControllableUnit::Unknown));
    }

    #[test]
    fn test_visible_in_scan_unprivileged_suppresses_non_session_units() {
        use crate::attributor::ControllableUnit;
        assert!(!visible_in_scan(
            Some(1000),
            &ControllableUnit::ServiceUnit { name: "foo.service".to_string() }
        ));
        assert!(!visible_in_scan(Some(1000), &ControllableUnit::Unknown));
        assert!(visible_in_scan(
            Some(1000),
            &ControllableUnit::UserSession { uid: 1000, session_id: "/dev/pts/2".to_string() }
        ));
    }

    #[test]
    fn test_effective_uid_root_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("self")).unwrap();
        fs::write(
            tmp.path().join("self").join("status"),
            "Name:\tfoo\nUid:\t0\t0\t0\t0\n",
        )
        .unwrap();
        assert_eq!(effective_uid(tmp.path()), None);
    }

    #[test]
    fn test_effective_uid_non_root_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("self")).unwrap();
        fs::write(
            tmp.path().join("self").join("status"),
            "Name:\tfoo\nUid:\t1000\t1000\t1000\t1000\n",
        )
        .unwrap();
        assert_eq!(effective_uid(tmp.path()), Some(1000));
    }

    #[test]
    fn test_run_finds_deleted_exe_and_reports_unit() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("self")).unwrap();
        fs::write(
            tmp.path().join("self").join("status"),
            "Name:\tfoo\nUid:\t0\t0\t0\t0\n",
        )
        .unwrap();
        fs::write(tmp.path().join("version"), "not a banner\n").unwrap();

        make_fake_pid(tmp.path(), 1, "init", 0, "/sbin/init", false, "");
        make_fake_pid(tmp.path(), 500, "xsvc", 1, "/usr/sbin/xsvc", true, "");

        let cgroup_dir = tmp.path().join("500");
        fs::write(cgroup_dir.join("cgroup"), "0::/system.slice/xsvc.service\n").unwrap();

        let mut options = ScanOptions::default();
        options.proc_root = tmp.path().to_path_buf();
        options.kernelhints = false;

        let prober = NoopInterpreterProber;
        let probe = NoProbe;
        let hooks = NoHooks;
        let progress = NullProgressSink;
        let collaborators = Collaborators {
            hook_runner: &hooks,
            interpreter: &prober,
            service_manager_probe: &probe,
            progress: &progress,
        };

        let report = run(&options, &collaborators).unwrap();
        assert_eq!(report.units.len(), 1);
        let entry = report.units.iter().next().unwrap();
        assert!(entry.pids.contains(&500));
    }
}
