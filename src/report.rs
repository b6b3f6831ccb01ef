//! Report — aggregation, blacklist/override policy, and serialization.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::attributor::ControllableUnit;
use crate::config::{OverrideMap, ScanOptions};
use crate::kernel::KernelVerdict;

/// `map<uid, map<session_id, map<comm, set<pid>>>>`, kept in `BTreeMap`s so
/// serialization is deterministic.
pub type UserSessions = BTreeMap<u32, BTreeMap<String, BTreeMap<String, BTreeSet<u32>>>>;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub units: BTreeSet<UnitEntry>,
    pub user_sessions: UserSessions,
    pub kernel: Option<KernelVerdict>,
}

/// A unit paired with the pids attributed to it, serialized flat for
/// batch/JSON consumers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnitEntry {
    pub unit: ControllableUnit,
    pub pids: BTreeSet<u32>,
}

/// Accumulates attributed pids before blacklist/override policy is applied.
#[derive(Default)]
pub struct ReportBuilder {
    by_unit: std::collections::HashMap<ControllableUnit, BTreeSet<u32>>,
    user_sessions: UserSessions,
    kernel: Option<KernelVerdict>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one obsolete pid's attribution. User-session attribution
    /// dominates unit attribution (spec §3 invariant): a pid appears in at
    /// most one of `units` / `user_sessions`.
    pub fn record(&mut self, pid: u32, comm: &str, unit: ControllableUnit) {
        if let ControllableUnit::UserSession { uid, session_id } = unit {
            self.user_sessions
                .entry(uid)
                .or_default()
                .entry(session_id)
                .or_default()
                .entry(comm.to_string())
                .or_default()
                .insert(pid);
        } else {
            self.by_unit.entry(unit).or_default().insert(pid);
        }
    }

    pub fn set_kernel(&mut self, verdict: KernelVerdict) {
        self.kernel = Some(verdict);
    }

    /// Apply the unit blacklist and the `ServiceUnit`/`InitScript` basename
    /// dedup (spec §8 invariant 6), then emit the final Report.
    pub fn build(self, options: &ScanOptions) -> Report {
        // Blacklisting is applied first: a blacklisted ServiceUnit must not
        // shadow its InitScript counterpart, since the ServiceUnit itself
        // never makes it into the report.
        let kept: Vec<(ControllableUnit, BTreeSet<u32>)> = self
            .by_unit
            .into_iter()
            .filter(|(unit, _)| !is_blacklisted(unit, options))
            .collect();

        let service_unit_basenames: HashSet<String> = kept
            .iter()
            .filter_map(|(u, _)| match u {
                ControllableUnit::ServiceUnit { name } => {
                    Some(name.trim_end_matches(".service").to_string())
                }
                _ => None,
            })
            .collect();

        let mut units = BTreeSet::new();
        for (unit, pids) in kept {
            if let ControllableUnit::InitScript { path } = &unit {
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if service_unit_basenames.contains(&basename) {
                    continue;
                }
            }
            units.insert(UnitEntry { unit, pids });
        }

        Report {
            units,
            user_sessions: self.user_sessions,
            kernel: self.kernel,
        }
    }
}

fn is_blacklisted(unit: &ControllableUnit, options: &ScanOptions) -> bool {
    let name = match unit {
        ControllableUnit::ServiceUnit { name } => name.clone(),
        ControllableUnit::InitScript { path } => path.to_string_lossy().to_string(),
        ControllableUnit::ServiceManagerRoot => "systemd".to_string(),
        ControllableUnit::LegacyInit => "init".to_string(),
        ControllableUnit::Unknown => return false,
        ControllableUnit::UserSession { .. } => return false,
    };
    options.is_blacklisted_unit(&name)
}

/// The caller-supplied override map is carried through untouched; the core
/// never acts on it.
pub fn attach_overrides<'a>(report: &'a Report, overrides: &OverrideMap) -> Vec<(&'a str, bool)> {
    report
        .units
        .iter()
        .filter_map(|entry| match &entry.unit {
            ControllableUnit::ServiceUnit { name } => overrides
                .lookup(name)
                .map(|restart| (name.as_str(), restart)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_session_dominates_unit() {
        let mut builder = ReportBuilder::new();
        builder.record(
            400,
            "app",
            ControllableUnit::UserSession { uid: 1000, session_id: "/dev/pts/2".to_string() },
        );
        let options = ScanOptions::default();
        let report = builder.build(&options);

        assert!(report.units.is_empty());
        assert!(report.user_sessions[&1000]["/dev/pts/2"]["app"].contains(&400));
    }

    #[test]
    fn test_unit_blacklist_drops_matching_unit() {
        let mut builder = ReportBuilder::new();
        builder.record(10, "foo", ControllableUnit::ServiceUnit { name: "foo.service".to_string() });
        let mut options = ScanOptions::default();
        options.blacklist_rc.push(regex::Regex::new("^foo\\.service$").unwrap());

        let report = builder.build(&options);
        assert!(report.units.is_empty());
    }

    #[test]
    fn test_service_unit_and_init_script_never_coexist() {
        let mut builder = ReportBuilder::new();
        builder.record(10, "foo", ControllableUnit::ServiceUnit { name: "foo.service".to_string() });
        builder.record(11, "foo", ControllableUnit::InitScript { path: "/etc/init.d/foo".into() });

        let options = ScanOptions::default();
        let report = builder.build(&options);

        let has_service = report.units.iter().any(|e| matches!(e.unit, ControllableUnit::ServiceUnit { .. }));
        let has_initscript = report.units.iter().any(|e| matches!(e.unit, ControllableUnit::InitScript { .. }));
        assert!(has_service);
        assert!(!has_initscript);
    }

    #[test]
    fn test_blacklisted_service_unit_does_not_shadow_init_script() {
        let mut builder = ReportBuilder::new();
        builder.record(10, "foo", ControllableUnit::ServiceUnit { name: "foo.service".to_string() });
        builder.record(11, "foo", ControllableUnit::InitScript { path: "/etc/init.d/foo".into() });

        let mut options = ScanOptions::default();
        options.blacklist_rc.push(regex::Regex::new("^foo\\.service$").unwrap());
        let report = builder.build(&options);

        let has_service = report.units.iter().any(|e| matches!(e.unit, ControllableUnit::ServiceUnit { .. }));
        let has_initscript = report.units.iter().any(|e| matches!(e.unit, ControllableUnit::InitScript { .. }));
        assert!(!has_service);
        assert!(has_initscript);
    }

    #[test]
    fn test_empty_user_sessions_preserved_with_empty_units() {
        let builder = ReportBuilder::new();
        let options = ScanOptions::default();
        let report = builder.build(&options);
        assert!(report.units.is_empty());
        assert!(report.user_sessions.is_empty());
    }
}
