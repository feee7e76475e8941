//! The [`Entry`] data model (spec.md §3) — the unit passed to the writer.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::path::StoredPath;

/// What kind of filesystem object an [`Entry`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    Directory = 0,
    File = 1,
    Symlink = 2,
}

/// Where an entry's payload bytes come from.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// A path on disk; the writer reads its contents (or readlink target)
    /// while streaming the record.
    Disk(PathBuf),
    /// An in-memory buffer supplied directly by the caller.
    Virtual(Vec<u8>),
}

/// One filesystem entry to be written into the archive.
///
/// Mirrors spec.md §3 exactly: `stored_path` is treated as authoritative,
/// `perms` defaults to `0o755` for virtual entries, `mtime` is `0` for
/// symlinks and `now()` for virtual entries.
#[derive(Debug, Clone)]
pub struct Entry {
    pub stored_path: StoredPath,
    pub kind: EntryKind,
    pub source: EntrySource,
    pub perms: u32,
    pub mtime: u32,
    pub size: u64,
}

impl Entry {
    /// Builds an entry from an on-disk path, collecting the metadata the
    /// wire format needs (size, mtime, perms) the way a real traversal
    /// collaborator would before calling `add_entry_from_path`.
    ///
    /// `dereference_symlinks` controls whether a symlink on disk is stored
    /// as a symlink record (default) or followed and stored as its target's
    /// content — the platform policy spec.md §9 assigns to the caller.
    pub fn from_disk_path(
        stored_path: StoredPath,
        abs_path: &std::path::Path,
        dereference_symlinks: bool,
    ) -> std::io::Result<Self> {
        let symlink_meta = std::fs::symlink_metadata(abs_path)?;

        if symlink_meta.file_type().is_symlink() && !dereference_symlinks {
            let target = std::fs::read_link(abs_path)?;
            let target_bytes = path_to_bytes(&target);
            return Ok(Entry {
                stored_path,
                kind: EntryKind::Symlink,
                size: target_bytes.len() as u64,
                source: EntrySource::Virtual(target_bytes),
                perms: mode_of(&symlink_meta),
                mtime: 0,
            });
        }

        let meta = std::fs::metadata(abs_path)?;
        if meta.is_dir() {
            Ok(Entry {
                stored_path,
                kind: EntryKind::Directory,
                source: EntrySource::Disk(abs_path.to_path_buf()),
                perms: mode_of(&meta),
                mtime: mtime_of(&meta),
                size: 0,
            })
        } else {
            Ok(Entry {
                stored_path,
                kind: EntryKind::File,
                size: meta.len(),
                source: EntrySource::Disk(abs_path.to_path_buf()),
                perms: mode_of(&meta),
                mtime: mtime_of(&meta),
            })
        }
    }

    /// Builds a virtual entry whose payload is already in memory.
    pub fn virtual_entry(stored_path: StoredPath, content: Vec<u8>) -> Self {
        Entry {
            stored_path,
            kind: EntryKind::File,
            size: content.len() as u64,
            source: EntrySource::Virtual(content),
            perms: 0o755,
            mtime: now_unix(),
        }
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0o755
}

fn mtime_of(meta: &std::fs::Metadata) -> u32 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(unix)]
fn path_to_bytes(p: &std::path::Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    p.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_bytes(p: &std::path::Path) -> Vec<u8> {
    p.to_string_lossy().into_owned().into_bytes()
}
