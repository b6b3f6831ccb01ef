//! KernelScanner — compares the running kernel to the newest installed
//! kernel image under the boot directory.

use std::fs;
use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::natural::natural_cmp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum KernelVerdict {
    UpToDate,
    AbiUpgrade { current: String, expected: String },
    VersionUpgrade { current: String, expected: String },
    Unknown,
}

static KERNEL_IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(vmlinuz|vmlinux|kernel)-").unwrap());

static BANNER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Linux version (\S+) \(([^)]*)\) (.*)$").unwrap());

struct Banner {
    release: String,
    full: String,
}

fn parse_banner(line: &str) -> Option<Banner> {
    let caps = BANNER_LINE.captures(line)?;
    Some(Banner {
        release: caps[1].to_string(),
        full: line.to_string(),
    })
}

/// Extract printable-ASCII runs of at least `min_len` bytes, the way the
/// `strings` utility does, so a compressed/binary kernel image can still
/// yield its embedded version banner.
fn extract_strings(bytes: &[u8], min_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut run = Vec::new();

    let mut flush = |run: &mut Vec<u8>, out: &mut Vec<String>| {
        if run.len() >= min_len {
            out.push(String::from_utf8_lossy(run).to_string());
        }
        run.clear();
    };

    for &b in bytes {
        if (0x20..=0x7e).contains(&b) {
            run.push(b);
        } else {
            flush(&mut run, &mut out);
        }
    }
    flush(&mut run, &mut out);

    out
}

fn banner_from_image(path: &Path) -> Option<Banner> {
    let bytes = fs::read(path).ok()?;
    extract_strings(&bytes, 12)
        .into_iter()
        .find_map(|s| parse_banner(&s))
}

/// Tokens not all present in `current_banner` is how we detect an ABI
/// upgrade: same release, later build.
fn banner_has_new_tokens(image_banner: &str, current_banner: &str) -> bool {
    let current_tokens: std::collections::HashSet<&str> =
        current_banner.split_whitespace().collect();
    image_banner
        .split_whitespace()
        .any(|tok| !current_tokens.contains(tok))
}

/// Read the current runlevel via the `runlevel` utility; defaults to `2`
/// on any failure (missing utility, non-UTF8 output, unparsable token).
pub fn current_runlevel() -> u8 {
    Command::new("runlevel")
        .output()
        .ok()
        .and_then(|out| {
            let stdout = String::from_utf8_lossy(&out.stdout).to_string();
            stdout
                .split_whitespace()
                .last()
                .and_then(|tok| tok.parse::<u8>().ok())
        })
        .unwrap_or(2)
}

pub fn scan(boot_dir: &Path, version_path: &Path) -> KernelVerdict {
    let current_banner = match fs::read_to_string(version_path) {
        Ok(s) => s.trim().to_string(),
        Err(_) => return KernelVerdict::Unknown,
    };
    let Some(current) = parse_banner(&current_banner) else {
        return KernelVerdict::Unknown;
    };

    let Ok(entries) = fs::read_dir(boot_dir) else {
        return KernelVerdict::Unknown;
    };

    let mut parsed_any = false;
    let mut best_version_upgrade: Option<String> = None;
    let mut abi_upgrade: Option<Banner> = None;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !KERNEL_IMAGE_NAME.is_match(&name) {
            continue;
        }

        let Some(image) = banner_from_image(&entry.path()) else {
            debug!(image = %name, "no parseable version banner");
            continue;
        };
        parsed_any = true;

        if natural_cmp(&image.release, &current.release) == std::cmp::Ordering::Greater {
            let better = match &best_version_upgrade {
                Some(existing) => natural_cmp(&image.release, existing) == std::cmp::Ordering::Greater,
                None => true,
            };
            if better {
                best_version_upgrade = Some(image.release.clone());
            }
        } else if image.release == current.release
            && banner_has_new_tokens(&image.full, &current.full)
            && abi_upgrade.is_none()
        {
            abi_upgrade = Some(image);
        }
    }

    if let Some(expected) = best_version_upgrade {
        return KernelVerdict::VersionUpgrade {
            current: current.release,
            expected,
        };
    }
    if abi_upgrade.is_some() {
        return KernelVerdict::AbiUpgrade {
            current: current.release.clone(),
            expected: current.release,
        };
    }
    if parsed_any {
        return KernelVerdict::UpToDate;
    }
    KernelVerdict::Unknown
}
