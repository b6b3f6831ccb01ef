//! LSB init-script header parsing.
//!
//! Parses the `### BEGIN INIT INFO` / `### END INIT INFO` block an init
//! script carries, and separately scans the script body for a pidfile path
//! literal so the attributor can confirm a candidate script actually
//! manages a given pid.

use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Default)]
pub struct LsbHeader {
    pub default_start: Vec<u8>,
}

impl LsbHeader {
    pub fn covers_runlevel(&self, runlevel: u8) -> bool {
        self.default_start.contains(&runlevel)
    }
}

static HEADER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###\s*BEGIN INIT INFO(.*?)###\s*END INIT INFO").unwrap()
});

static DEFAULT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^#\s*Default-Start:\s*(.*)$").unwrap());

/// `None` when the script carries no recognisable header block — broken
/// scripts are still used as a last resort by the caller.
pub fn parse_header(script_body: &str) -> Option<LsbHeader> {
    let block = HEADER_BLOCK.captures(script_body)?.get(1)?.as_str();
    let levels = DEFAULT_START
        .captures(block)?
        .get(1)?
        .as_str()
        .split_whitespace()
        .filter_map(|tok| tok.parse::<u8>().ok())
        .collect();
    Some(LsbHeader {
        default_start: levels,
    })
}

static PIDFILE_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/(?:var/)?run/[\w./-]+\.pid)").unwrap());

/// Find a pidfile path literal referenced anywhere in the script body.
pub fn find_pidfile_reference(script_body: &str) -> Option<PathBuf> {
    PIDFILE_LITERAL
        .captures(script_body)?
        .get(1)
        .map(|m| PathBuf::from(m.as_str()))
}

/// Does `pidfile` exist and contain exactly `candidate_pid`?
pub fn pidfile_contains(pidfile: &Path, candidate_pid: u32) -> bool {
    std::fs::read_to_string(pidfile)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .map(|pid| pid == candidate_pid)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#!/bin/sh
### BEGIN INIT INFO
# Provides:          xsvc
# Required-Start:    $network $remote_fs
# Required-Stop:     $network $remote_fs
# Default-Start:     2 3 4 5
# Default-Stop:      0 1 6
# Short-Description: X service
### END INIT INFO

PIDFILE=/run/xsvc.pid
"#;

    #[test]
    fn test_parse_header_extracts_default_start() {
        let header = parse_header(SCRIPT).unwrap();
        assert_eq!(header.default_start, vec![2, 3, 4, 5]);
        assert!(header.covers_runlevel(3));
        assert!(!header.covers_runlevel(1));
    }

    #[test]
    fn test_no_header_block_returns_none() {
        assert!(parse_header("#!/bin/sh\necho hi\n").is_none());
    }

    #[test]
    fn test_find_pidfile_reference() {
        let path = find_pidfile_reference(SCRIPT).unwrap();
        assert_eq!(path, PathBuf::from("/run/xsvc.pid"));
    }

    #[test]
    fn test_pidfile_contains_matches_content() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("xsvc.pid");
        std::fs::write(&pidfile, "200\n").unwrap();
        assert!(pidfile_contains(&pidfile, 200));
        assert!(!pidfile_contains(&pidfile, 201));
    }

    #[test]
    fn test_pidfile_contains_missing_file() {
        assert!(!pidfile_contains(Path::new("/no/such/pidfile"), 1));
    }
}
