//! DeviceEncoder — candidate textual encodings of a filesystem device id.
//!
//! The kernel's memory-map table reports a device as a `major:minor` hex
//! pair, but which encoding scheme it uses for that pair is kernel-version
//! dependent. Rather than guess, we produce every candidate and let the
//! caller match against any of them.

use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// The `(dev_id, inode)` of an on-disk file as observed by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdent {
    pub dev_id: u64,
    pub inode: u64,
}

impl FileIdent {
    pub fn stat(path: &Path) -> std::io::Result<FileIdent> {
        let meta = std::fs::metadata(path)?;
        Ok(FileIdent {
            dev_id: meta.dev(),
            inode: meta.ino(),
        })
    }
}

/// All candidate textual encodings of `dev`, plus the universal `00:00`
/// fallback.
pub fn encodings(dev: u64) -> HashSet<String> {
    let mut set = HashSet::new();

    // "Modern" encoding.
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfffu64);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xffu64);
    set.insert(format!("{:02x}:{:02x}", major, minor));

    // "Traditional" encoding.
    let major = dev >> 8;
    let minor = dev & 0xff;
    set.insert(format!("{:02x}:{:02x}", major, minor));

    // Some kernels report no device id at all for file-backed maps.
    set.insert("00:00".to_string());

    set
}

/// Does `mapping_dev_text` identify the same device as `ident.dev_id`?
///
/// Accepts any of the candidate encodings, plus any `00:`-prefixed text —
/// anonymous/virtual block devices (e.g. copy-on-write filesystems) whose
/// reported device id has no corresponding `stat` result. Without this
/// exemption every process on such a filesystem would be falsely reported
/// obsolete.
pub fn matches(mapping_dev_text: &str, ident: &FileIdent) -> bool {
    if mapping_dev_text.starts_with("00:") {
        return true;
    }
    encodings(ident.dev_id).contains(mapping_dev_text)
}
