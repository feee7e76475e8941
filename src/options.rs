//! Options for archive creation.

#[cfg(feature = "aes")]
use crate::crypto::Password;

/// Which container format a [`crate::ArchiveWriter`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    /// Unencrypted `.jpa` container.
    #[default]
    PlainText,
    /// AES-encrypted `.jps` container.
    Encrypted,
}

/// Options governing one archive's construction.
#[derive(Clone, Default)]
pub struct WriterOptions {
    /// Bytes per part; `0` disables splitting.
    pub part_size: u64,
    /// Whether symlinks on disk are followed and stored as their target's
    /// content, rather than as a symlink record.
    pub dereference_symlinks: bool,
    /// Which container format to produce.
    pub format: ArchiveFormat,
    /// Password for `Encrypted` archives; ignored for `PlainText`.
    #[cfg(feature = "aes")]
    pub password: Option<Password>,
    /// Whether to use a fixed, archive-wide static salt rather than a
    /// per-record salt derived from each record's IV.
    #[cfg(feature = "aes")]
    pub use_static_salt: bool,
    /// Explicit static salt; a random one is generated if `None` and
    /// `use_static_salt` is set.
    #[cfg(feature = "aes")]
    pub static_salt: Option<[u8; 64]>,
}

impl std::fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("WriterOptions");
        s.field("part_size", &self.part_size)
            .field("dereference_symlinks", &self.dereference_symlinks)
            .field("format", &self.format);
        #[cfg(feature = "aes")]
        s.field("has_password", &self.password.is_some())
            .field("use_static_salt", &self.use_static_salt);
        s.finish()
    }
}

impl WriterOptions {
    /// Creates new writer options with defaults: single-part, plain-text,
    /// symlinks stored as symlinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the part size; `0` disables splitting.
    pub fn part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    /// Sets whether symlinks are dereferenced rather than stored as-is.
    pub fn dereference_symlinks(mut self, enabled: bool) -> Self {
        self.dereference_symlinks = enabled;
        self
    }

    /// Sets the container format.
    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the Format-E password.
    #[cfg(feature = "aes")]
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enables a fixed static salt, optionally supplying it explicitly; a
    /// random 64-byte salt is generated at `initialize()` if omitted.
    #[cfg(feature = "aes")]
    pub fn static_salt(mut self, salt: Option<[u8; 64]>) -> Self {
        self.use_static_salt = true;
        self.static_salt = salt;
        self
    }

    /// Whether this configuration targets Format-E.
    pub fn is_encrypted(&self) -> bool {
        self.format == ArchiveFormat::Encrypted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_single_part_plaintext() {
        let opts = WriterOptions::new();
        assert_eq!(opts.part_size, 0);
        assert!(!opts.is_encrypted());
        assert!(!opts.dereference_symlinks);
    }

    #[test]
    fn builder_sets_fields() {
        let opts = WriterOptions::new()
            .part_size(1024)
            .dereference_symlinks(true)
            .format(ArchiveFormat::Encrypted);
        assert_eq!(opts.part_size, 1024);
        assert!(opts.dereference_symlinks);
        assert!(opts.is_encrypted());
    }

    #[cfg(feature = "aes")]
    #[test]
    fn password_and_static_salt_builders() {
        let opts = WriterOptions::new()
            .format(ArchiveFormat::Encrypted)
            .password("hunter2")
            .static_salt(Some([0u8; 64]));
        assert!(opts.password.is_some());
        assert!(opts.use_static_salt);
        assert_eq!(opts.static_salt, Some([0u8; 64]));
    }
}
