//! File lifecycle helpers shared by the progress store, the session cache and
//! the image downloader.
//!
//! Snapshots are written to a sibling temp file and renamed over the target,
//! so readers only ever see a complete previous or complete new version.
//! Downloads stream into `<name>.part` and are renamed on success.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `alice.jpg` → `alice.jpg.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Replace `path` with `bytes` in one step: write a temp file in the same
/// directory, fsync it, then rename it over `path`. Creates the parent dir.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("create dir: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes).context("write snapshot")?;
    tmp.as_file().sync_all().context("sync snapshot")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Atomically rename a finished temp file to its final path.
pub fn finalize(temp_path: &Path, final_path: &Path) -> Result<()> {
    std::fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// File name for an identifier's artifact: `<identifier>.<ext>`.
///
/// Path separators, NUL and control characters become `_`, and a leading dot
/// is escaped so an identifier can never name a hidden file or a parent dir.
/// Whenever the stem differs from the identifier, the first 8 hex digits of
/// the identifier's SHA-256 are appended so `a/b` and `a_b` stay distinct.
pub fn artifact_file_name(identifier: &str, extension: &str) -> String {
    const NAME_MAX: usize = 255;
    const SUFFIX_LEN: usize = 9;

    let mut stem: String = identifier
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if stem.is_empty() || stem.starts_with('.') {
        stem.insert(0, '_');
    }

    let ext = extension.trim_start_matches('.');
    let mut budget = NAME_MAX.saturating_sub(ext.len() + 1);
    let escaped = stem != identifier || stem.len() > budget;
    if escaped {
        budget = budget.saturating_sub(SUFFIX_LEN);
    }
    if stem.len() > budget {
        let mut take = budget;
        while take > 0 && !stem.is_char_boundary(take) {
            take -= 1;
        }
        stem.truncate(take);
    }
    if escaped {
        stem.push('-');
        stem.push_str(&identifier_digest(identifier));
    }

    if ext.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, ext)
    }
}

fn identifier_digest(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    hex::encode(&digest[..4])
}
