//! MapScanner — per-pid memory-map obsolescence check.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::device::{self, FileIdent};
use crate::error::Recoverable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObsolescenceReason {
    DeletedExe,
    MissingBacking(PathBuf),
    StaleMapping(PathBuf),
    InterpreterSource(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapVerdict {
    Current,
    Obsolete(ObsolescenceReason),
}

/// One file-backed mapping line from `/proc/{pid}/maps`.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub perms: String,
    pub offset: u64,
    pub dev_id_text: String,
    pub inode: u64,
    pub backing_path: Option<String>,
}

/// Paths that participate in obsolescence checks are excluded if they match
/// any of these: shared-memory handles, DRM device handles, device-tree
/// nodes, or the async-I/O pseudo path.
static SKIP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^/dev/shm/").unwrap(),
        Regex::new(r"^/SYSV[0-9a-fA-F]+").unwrap(),
        Regex::new(r"^/dev/dri/").unwrap(),
        Regex::new(r"^/proc/device-tree").unwrap(),
        Regex::new(r"^/?\[aio\]$").unwrap(),
        Regex::new(r"^anon_inode:\[aio\]$").unwrap(),
    ]
});

/// Directories where a missing backing file is expected and harmless —
/// build systems and package managers routinely mmap a scratch file and
/// unlink it immediately.
const SCRATCH_PREFIXES: &[&str] = &["/tmp/", "/var/tmp/", "/dev/shm/"];

fn should_skip(path: &str) -> bool {
    SKIP_PATTERNS.iter().any(|re| re.is_match(path))
}

fn is_scratch_path(path: &str) -> bool {
    SCRATCH_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn parse_maps_line(line: &str) -> Option<Mapping> {
    // vaddr-range perms offset dev inode [path]
    let mut fields = line.split_whitespace();
    let _vaddr_range = fields.next()?;
    let perms = fields.next()?.to_string();
    let offset_str = fields.next()?;
    let dev_id_text = fields.next()?.to_string();
    let inode_str = fields.next()?;

    let offset = u64::from_str_radix(offset_str, 16).ok()?;
    let inode: u64 = inode_str.parse().ok()?;

    // Whatever remains (joined back) is the path, if any. fields() already
    // skipped whitespace, so re-join with single spaces; paths rarely
    // contain runs of whitespace and this matches the kernel's own output.
    let rest: Vec<&str> = fields.collect();
    let backing_path = if rest.is_empty() {
        None
    } else {
        let joined = rest.join(" ");
        let stripped = joined.strip_suffix(" (deleted)").map(str::to_string);
        Some(stripped.unwrap_or(joined))
    };

    Some(Mapping {
        perms,
        offset,
        dev_id_text,
        inode,
        backing_path,
    })
}

/// Scan one pid's memory map. Reading the map file failing at all means the
/// pid vanished; a single `stat` failure on a candidate path ends scanning
/// of that pid with `Current` — we do not report obsolescence we can't
/// prove.
pub(crate) fn scan(proc_root: &Path, pid: u32) -> Result<MapVerdict, Recoverable> {
    let maps_path = proc_root.join(pid.to_string()).join("maps");
    let content = fs::read_to_string(&maps_path).map_err(|_| Recoverable::Vanished)?;

    for line in content.lines() {
        let Some(mapping) = parse_maps_line(line) else {
            let err = Recoverable::ParseFailure(line.to_string());
            debug!(pid, %err, "dropping unparseable maps line");
            continue;
        };

        if mapping.inode == 0 || !mapping.perms.contains('x') {
            continue;
        }

        let Some(path) = &mapping.backing_path else {
            continue;
        };

        if should_skip(path) {
            continue;
        }

        let backing = Path::new(path);
        if !backing.exists() {
            if is_scratch_path(path) {
                continue;
            }
            return Ok(MapVerdict::Obsolete(ObsolescenceReason::MissingBacking(
                backing.to_path_buf(),
            )));
        }

        let ident = match FileIdent::stat(backing) {
            Ok(ident) => ident,
            Err(_) => {
                let err = Recoverable::StatFailure(backing.to_path_buf());
                debug!(pid, %err, "treating pid as current, not obsolete");
                return Ok(MapVerdict::Current);
            }
        };

        if mapping.inode != ident.inode || !device::matches(&mapping.dev_id_text, &ident) {
            return Ok(MapVerdict::Obsolete(ObsolescenceReason::StaleMapping(
                backing.to_path_buf(),
            )));
        }
    }

    Ok(MapVerdict::Current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A tempdir that doesn't itself live under a scratch prefix (`tempdir()`
    /// defaults to `/tmp` on Linux, which would make every fixture path look
    /// like a harmless scratch mmap regardless of what the test intends).
    fn fixture_dir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("mapscan-test-")
            .tempdir_in(env!("CARGO_MANIFEST_DIR"))
            .unwrap()
    }

    fn write_maps(dir: &Path, pid: u32, content: &str) {
        let pid_dir = dir.join(pid.to_string());
        fs::create_dir_all(&pid_dir).unwrap();
        let mut f = fs::File::create(pid_dir.join("maps")).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_parse_maps_line_basic() {
        let line = "00400000-00452000 r-xp 00000000 08:02 1234 /usr/bin/foo";
        let m = parse_maps_line(line).unwrap();
        assert_eq!(m.perms, "r-xp");
        assert_eq!(m.dev_id_text, "08:02");
        assert_eq!(m.inode, 1234);
        assert_eq!(m.backing_path.as_deref(), Some("/usr/bin/foo"));
    }

    #[test]
    fn test_parse_maps_line_strips_deleted_marker() {
        let line = "00400000-00452000 r-xp 00000000 08:02 1234 /usr/lib/libssl.so.1.1 (deleted)";
        let m = parse_maps_line(line).unwrap();
        assert_eq!(m.backing_path.as_deref(), Some("/usr/lib/libssl.so.1.1"));
    }

    #[test]
    fn test_missing_map_file_is_vanished() {
        let tmp = tempfile::tempdir().unwrap();
        let result = scan(tmp.path(), 999);
        assert!(matches!(result, Err(Recoverable::Vanished)));
    }

    #[test]
    fn test_stale_mapping_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_path = tmp.path().join("libx.so.1");
        fs::write(&lib_path, b"binary").unwrap();
        let real = FileIdent::stat(&lib_path).unwrap();

        // Map claims a different inode than the file actually has.
        let bogus_inode = real.inode.wrapping_add(1);
        let content = format!(
            "00400000-00452000 r-xp 00000000 00:00 {bogus_inode} {}\n",
            lib_path.display()
        );
        write_maps(tmp.path(), 200, &content);

        let verdict = scan(tmp.path(), 200).unwrap();
        assert_eq!(
            verdict,
            MapVerdict::Obsolete(ObsolescenceReason::StaleMapping(lib_path))
        );
    }

    #[test]
    fn test_current_mapping_is_current() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_path = tmp.path().join("libx.so.1");
        fs::write(&lib_path, b"binary").unwrap();
        let real = FileIdent::stat(&lib_path).unwrap();

        let content = format!(
            "00400000-00452000 r-xp 00000000 00:00 {} {}\n",
            real.inode,
            lib_path.display()
        );
        write_maps(tmp.path(), 201, &content);

        assert_eq!(scan(tmp.path(), 201).unwrap(), MapVerdict::Current);
    }

    #[test]
    fn test_missing_backing_file_not_in_scratch() {
        let tmp = fixture_dir();
        let missing = tmp.path().join("gone.so");
        let content = format!(
            "00400000-00452000 r-xp 00000000 00:00 42 {}\n",
            missing.display()
        );
        write_maps(tmp.path(), 202, &content);

        let verdict = scan(tmp.path(), 202).unwrap();
        assert_eq!(
            verdict,
            MapVerdict::Obsolete(ObsolescenceReason::MissingBacking(missing))
        );
    }

    #[test]
    fn test_missing_backing_file_in_scratch_is_current() {
        let content = "00400000-00452000 r-xp 00000000 00:00 42 /tmp/scratch.so\n";
        let tmp = tempfile::tempdir().unwrap();
        write_maps(tmp.path(), 203, content);

        assert_eq!(scan(tmp.path(), 203).unwrap(), MapVerdict::Current);
    }

    #[test]
    fn test_non_executable_mapping_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let content = "00400000-00452000 rw-p 00000000 00:00 42 /tmp/does/not/exist.so\n";
        write_maps(tmp.path(), 204, content);

        assert_eq!(scan(tmp.path(), 204).unwrap(), MapVerdict::Current);
    }

    #[test]
    fn test_shm_path_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let content = "00400000-00452000 r-xp 00000000 00:00 42 /dev/shm/whatever\n";
        write_maps(tmp.path(), 205, content);

        assert_eq!(scan(tmp.path(), 205).unwrap(), MapVerdict::Current);
    }

    #[test]
    fn test_first_obsolete_mapping_wins() {
        let tmp = fixture_dir();
        let missing_first = tmp.path().join("first-gone.so");
        let missing_second = tmp.path().join("second-gone.so");
        let content = format!(
            "00400000-00452000 r-xp 00000000 00:00 1 {}\n00500000-00552000 r-xp 00000000 00:00 2 {}\n",
            missing_first.display(),
            missing_second.display()
        );
        write_maps(tmp.path(), 206, &content);

        let verdict = scan(tmp.path(), 206).unwrap();
        assert_eq!(
            verdict,
            MapVerdict::Obsolete(ObsolescenceReason::MissingBacking(missing_first))
        );
    }
}
