//! The Byte Sink (spec.md §4.1) — scoped ownership of an append-mode output
//! stream on the current part file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// An open, append-mode handle on a single part file.
///
/// `ByteSink` owns the underlying [`File`] exclusively for as long as it is
/// alive. `close()` (and `Drop`) flush and release the handle exactly once,
/// on every exit path — success, error, or rollover — matching spec.md
/// §4.1's scoped-release requirement.
pub struct ByteSink {
    path: PathBuf,
    file: Option<File>,
}

impl ByteSink {
    /// Opens `path` in binary-append mode, creating it (mode `0o666`) if it
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SinkOpen`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path).map_err(|source| Error::SinkOpen {
            path: path.clone(),
            source,
        })?;
        log::debug!("opened part sink at {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Writes `bytes`, returning the actual number of bytes written.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let file = self.file.as_mut().expect("sink used after close");
        file.write(bytes)
    }

    /// Writes all of `bytes`, retrying short writes.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().expect("sink used after close");
        file.write_all(bytes)
    }

    /// Current size of the part, obtained by restatting the file — the
    /// cached size is considered stale across external writes (spec.md
    /// §4.1), so this always round-trips through the filesystem.
    pub fn size(&self) -> io::Result<u64> {
        let file = self.file.as_ref().expect("sink used after close");
        Ok(file.metadata()?.len())
    }

    /// The path this sink is writing to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and releases the underlying handle. Safe to call multiple
    /// times; only the first call does any work.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            log::debug!("closed part sink at {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for ByteSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o666);
    }
    opts.open(path)
}
