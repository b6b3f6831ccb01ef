//! Configuration surface the core honours (spec §6).
//!
//! Loading a config *file* and merging it with CLI flags is an external
//! driver's job; this struct is the validated, in-memory result of that
//! process, built programmatically by a caller or by the thin binary.

use std::path::PathBuf;

use regex::Regex;

use crate::error::FatalError;

/// `list | interactive | automatic`; opaque to the core beyond validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    List,
    Interactive,
    Automatic,
}

impl RestartMode {
    pub fn parse(s: &str) -> Result<Self, FatalError> {
        match s {
            "list" => Ok(RestartMode::List),
            "interactive" => Ok(RestartMode::Interactive),
            "automatic" => Ok(RestartMode::Automatic),
            other => Err(FatalError::InvalidRestartMode(other.to_string())),
        }
    }
}

/// An ordered regex → restart-policy map. Attached to the report untouched;
/// the core never acts on it.
#[derive(Debug, Clone, Default)]
pub struct OverrideMap {
    entries: Vec<(Regex, bool)>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: Regex, restart: bool) {
        self.entries.push((pattern, restart));
    }

    /// First matching entry wins, matching the source's ordered-map semantics.
    pub fn lookup(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(re, _)| re.is_match(name))
            .map(|(_, restart)| *restart)
    }

    pub fn entries(&self) -> &[(Regex, bool)] {
        &self.entries
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub verbose: bool,
    pub blacklist: Vec<Regex>,
    pub blacklist_rc: Vec<Regex>,
    pub override_rc: OverrideMap,
    pub interpscan: bool,
    pub kernelhints: bool,
    pub restart_mode: RestartMode,
    pub defno: bool,
    pub proc_root: PathBuf,
    pub boot_dir: PathBuf,
    pub run_root: PathBuf,
    pub hook_dir: Option<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            verbose: false,
            blacklist: Vec::new(),
            blacklist_rc: Vec::new(),
            override_rc: OverrideMap::new(),
            interpscan: false,
            kernelhints: true,
            restart_mode: RestartMode::List,
            defno: false,
            proc_root: PathBuf::from("/proc"),
            boot_dir: PathBuf::from("/boot"),
            run_root: PathBuf::from("/run"),
            hook_dir: None,
        }
    }
}

impl ScanOptions {
    /// Validate the hook directory, if configured, and any other
    /// fatal-on-setup conditions. CLI parsing validates `restart_mode`
    /// itself via `RestartMode::parse`.
    pub fn validate(&self) -> Result<(), FatalError> {
        if let Some(dir) = &self.hook_dir {
            if !dir.is_dir() {
                return Err(FatalError::InvalidHookDir(dir.clone()));
            }
        }
        Ok(())
    }

    pub fn is_blacklisted_exe(&self, exe_path: &str) -> bool {
        self.blacklist.iter().any(|re| re.is_match(exe_path))
    }

    pub fn is_blacklisted_unit(&self, name: &str) -> bool {
        self.blacklist_rc.iter().any(|re| re.is_match(name))
    }
}
