//! Machine-parsable batch-mode serialization (spec §6 Outputs): one line
//! per fact, each with a fixed `NEEDRESTART-*` prefix.

use std::io::Write;

use crate::attributor::ControllableUnit;
use crate::kernel::KernelVerdict;
use crate::report::Report;

pub fn write_report<W: Write>(mut w: W, report: &Report) -> std::io::Result<()> {
    writeln!(w, "NEEDRESTART-VER: {}", env!("CARGO_PKG_VERSION"))?;

    for entry in &report.units {
        for pid in &entry.pids {
            writeln!(w, "NEEDRESTART-PID: {pid}")?;
        }
        if let Some(name) = unit_name(&entry.unit) {
            writeln!(w, "NEEDRESTART-SVC: {name}")?;
        }
    }

    for (uid, sessions) in &report.user_sessions {
        for (session_id, by_comm) in sessions {
            for (comm, pids) in by_comm {
                for pid in pids {
                    writeln!(w, "NEEDRESTART-PID: {pid}")?;
                }
                writeln!(w, "NEEDRESTART-SVC: session:{uid}:{session_id}:{comm}")?;
            }
        }
    }

    if let Some(kernel) = &report.kernel {
        let (current, expected, status) = kernel_fields(kernel);
        if let Some(current) = current {
            writeln!(w, "NEEDRESTART-KCUR: {current}")?;
        }
        if let Some(expected) = expected {
            writeln!(w, "NEEDRESTART-KEXP: {expected}")?;
        }
        writeln!(w, "NEEDRESTART-KSTA: {status}")?;
    }

    Ok(())
}

fn unit_name(unit: &ControllableUnit) -> Option<String> {
    match unit {
        ControllableUnit::ServiceManagerRoot => Some("systemd".to_string()),
        ControllableUnit::LegacyInit => Some("init".to_string()),
        ControllableUnit::ServiceUnit { name } => Some(name.clone()),
        ControllableUnit::InitScript { path } => Some(path.display().to_string()),
        ControllableUnit::UserSession { .. } => None,
        ControllableUnit::Unknown => None,
    }
}

/// Status codes follow the convention of the tool this format originates
/// from: 0 up to date, 1 ABI upgrade, 2 version upgrade, 3 unknown.
fn kernel_fields(verdict: &KernelVerdict) -> (Option<String>, Option<String>, u8) {
    match verdict {
        KernelVerdict::UpToDate => (None, None, 0),
        KernelVerdict::AbiUpgrade { current, expected } => {
            (Some(current.clone()), Some(expected.clone()), 1)
        }
        KernelVerdict::VersionUpgrade { current, expected } => {
            (Some(current.clone()), Some(expected.clone()), 2)
        }
        KernelVerdict::Unknown => (None, None, 3),
    }
}
