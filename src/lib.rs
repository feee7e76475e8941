//! Streaming writer engine for the Format-A (`.jpa`) and Format-E (`.jps`)
//! backup archive containers.
//!
//! This crate implements only the *writer* side of both containers: given a
//! sequence of filesystem or in-memory entries, it streams a byte-exact
//! archive to one or more part files, splitting and (for Format-E)
//! encrypting as it goes. Reading an existing archive back is out of scope.
//!
//! ```no_run
//! use jpackarchive::{ArchiveWriter, StoredPath, WriterOptions};
//!
//! let mut writer = ArchiveWriter::new(WriterOptions::new());
//! writer.initialize("/backups/site-2026-08-01");
//! writer.add_virtual_entry(StoredPath::new("hello.txt").unwrap(), b"hi".to_vec());
//! writer.finalize();
//! for warning in writer.drain_warnings() {
//!     log::warn!("{warning}");
//! }
//! ```

pub mod compress;
#[cfg(feature = "aes")]
pub mod crypto;
pub mod entry;
pub mod error;
pub mod format;
pub mod options;
pub mod part;
pub mod path;
pub mod sink;
mod writer;

pub use entry::{Entry, EntryKind, EntrySource};
pub use error::{Diagnostic, Error, Result};
pub use options::{ArchiveFormat, WriterOptions};
pub use path::StoredPath;
pub use writer::ArchiveWriter;

#[cfg(feature = "aes")]
pub use crypto::Password;
