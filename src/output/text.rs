//! Human-readable, non-interactive summary of a Report.

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::attributor::ControllableUnit;
use crate::kernel::KernelVerdict;
use crate::report::Report;

pub fn print_report(report: &Report) {
    if report.units.is_empty() && report.user_sessions.is_empty() {
        println!("{}", "No outdated processes found".green());
    } else {
        let mut table = Table::new();
        table.set_header(vec!["UNIT", "PIDS"]);

        for entry in &report.units {
            let pids: Vec<String> = entry.pids.iter().map(u32::to_string).collect();
            table.add_row(vec![Cell::new(unit_label(&entry.unit)), Cell::new(pids.join(", "))]);
        }

        for (uid, sessions) in &report.user_sessions {
            for (session_id, by_comm) in sessions {
                for (comm, pids) in by_comm {
                    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
                    table.add_row(vec![
                        Cell::new(format!("session uid={uid} {session_id} ({comm})")),
                        Cell::new(pids.join(", ")),
                    ]);
                }
            }
        }

        println!("{table}");
    }

    if let Some(kernel) = &report.kernel {
        println!("{} {}", "Kernel:".cyan().bold(), describe_kernel(kernel));
    }
}

fn unit_label(unit: &ControllableUnit) -> String {
    match unit {
        ControllableUnit::ServiceManagerRoot => "service manager (pid 1)".to_string(),
        ControllableUnit::LegacyInit => "legacy init (pid 1)".to_string(),
        ControllableUnit::ServiceUnit { name } => name.clone(),
        ControllableUnit::InitScript { path } => path.display().to_string(),
        ControllableUnit::UserSession { uid, session_id } => {
            format!("user session uid={uid} {session_id}")
        }
        ControllableUnit::Unknown => "unknown".to_string(),
    }
}

fn describe_kernel(verdict: &KernelVerdict) -> String {
    match verdict {
        KernelVerdict::UpToDate => "running the latest installed kernel".green().to_string(),
        KernelVerdict::AbiUpgrade { current, expected } => format!(
            "{} (running {current}, newer build {expected} installed)",
            "ABI upgrade available, reboot recommended".yellow()
        ),
        KernelVerdict::VersionUpgrade { current, expected } => format!(
            "{} (running {current}, {expected} installed)",
            "newer kernel installed, reboot recommended".yellow()
        ),
        KernelVerdict::Unknown => "could not be determined".dimmed().to_string(),
    }
}
