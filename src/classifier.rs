//! ObsolescenceClassifier — per-pid orchestration producing a verdict.

use std::path::Path;

use tracing::debug;

use crate::collab::InterpreterProber;
use crate::config::ScanOptions;
use crate::error::Recoverable;
use crate::mapscan::{self, MapVerdict, ObsolescenceReason};
use crate::proc_table::PidInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Current,
    Obsolete(ObsolescenceReason),
}

/// Classify one pid. `current_uid`, when set, puts the classifier in
/// unprivileged mode: pids owned by any other uid are short-circuited to
/// `Current` without inspection.
pub(crate) fn classify(
    pid_info: &PidInfo,
    proc_root: &Path,
    options: &ScanOptions,
    interpreter: &dyn InterpreterProber,
    current_uid: Option<u32>,
) -> Result<Verdict, Recoverable> {
    if let Some(uid) = current_uid {
        if pid_info.uid != uid {
            return Ok(Verdict::Current);
        }
    }

    if let Some(exe_path) = &pid_info.exe_path {
        if options.is_blacklisted_exe(&exe_path.to_string_lossy()) {
            debug!(pid = pid_info.pid, "exe blacklisted, skipping");
            return Ok(Verdict::Current);
        }
    }

    if pid_info.exe_deleted {
        return Ok(Verdict::Obsolete(ObsolescenceReason::DeletedExe));
    }

    match mapscan::scan(proc_root, pid_info.pid)? {
        MapVerdict::Obsolete(reason) => return Ok(Verdict::Obsolete(reason)),
        MapVerdict::Current => {}
    }

    if options.interpscan {
        if let Some(exe_path) = &pid_info.exe_path {
            if let Some(source_path) = interpreter.obsolete_source(pid_info.pid, exe_path) {
                return Ok(Verdict::Obsolete(ObsolescenceReason::InterpreterSource(
                    source_path,
                )));
            }
        }
    }

    Ok(Verdict::Current)
}
