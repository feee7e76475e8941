//! Error types for the archive writer engine.
//!
//! Every fatal condition the writer can hit is a variant of [`Error`]. The two
//! failure classes from the design (warning vs. error) are represented as
//! [`Diagnostic`], the type actually pushed onto the writer's warning/error
//! queues — see [`crate::ArchiveWriter::drain_warnings`] and
//! [`crate::ArchiveWriter::drain_errors`].

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal and non-fatal conditions the writer can encounter.
///
/// This mirrors the taxonomy in the design: `SinkOpen`, `Rollover`,
/// `FinalRename`, `CryptoUnavailable`, and `EncodingCorruption` are always
/// fatal; `UnreadableFile`, `ShortRead`, and `EmptyPassword` are warnings
/// unless they occur mid-record, in which case the caller sees them surface
/// through `add_entry`'s `false` return and the writer transitions to
/// `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not open or reopen a part's byte sink.
    #[error("cannot write to target part {path}: {source}")]
    SinkOpen { path: PathBuf, source: io::Error },

    /// Could not create the next part during a rollover.
    #[error("cannot create next part {path}: {source}")]
    Rollover { path: PathBuf, source: io::Error },

    /// Could not rename the terminal part to its canonical extension.
    #[error("cannot finalize extension for {path}: {source}")]
    FinalRename { path: PathBuf, source: io::Error },

    /// Format-E was requested but AES support is unavailable.
    #[error("platform lacks AES support required for this archive format")]
    CryptoUnavailable,

    /// A source file shrank or vanished in the middle of writing a record.
    #[error("source '{path}' changed size while being read: {reason}")]
    ShortRead { path: PathBuf, reason: String },

    /// A single file could not be read; the entry is skipped.
    #[error("unreadable file '{path}': {source}")]
    UnreadableFile { path: PathBuf, source: io::Error },

    /// The Format-E split-ciphertext consistency check failed.
    #[error("ciphertext split consistency check failed for record {record_index}")]
    EncodingCorruption { record_index: u64 },

    /// A Format-E archive was requested with an empty password.
    #[error("empty password supplied for encrypted archive")]
    EmptyPassword,

    /// The supplied stored path failed validation.
    #[error("invalid stored path '{path}': {reason}")]
    InvalidStoredPath { path: String, reason: &'static str },

    /// Generic I/O failure not otherwise classified above.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the errors the design classifies as fatal (transition the
    /// writer to `Failed`); false for warnings that merely skip an entry.
    ///
    /// `ShortRead` and `UnreadableFile` are only fatal when detected after a
    /// header has already been committed to a part. Most entries are read
    /// fully before anything is written, so this is `false` here; the one
    /// exception is the streamed Store-file payload path, which commits the
    /// header before reading the file and instead calls
    /// `ArchiveWriter::fail_mid_record` to force the fatal outcome directly.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::UnreadableFile { .. } | Error::EmptyPassword | Error::ShortRead { .. }
        )
    }
}

/// One entry in the writer's warning or error queue.
///
/// The writer never panics or propagates an `Error` through its public
/// surface once a condition has been observed — it queues a `Diagnostic`
/// describing what happened and returns `false` from the triggering call.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub(crate) message: String,
}

impl Diagnostic {
    pub(crate) fn from_error(err: &Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }

    pub(crate) fn message(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// The human-readable message, suitable for surfacing to a CLI user.
    pub fn as_str(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<Diagnostic> for String {
    fn from(d: Diagnostic) -> String {
        d.message
    }
}
