//! Password handling for Format-E archives.

use zeroize::Zeroizing;

/// A password for Format-E encryption.
///
/// Stored zeroizing so the plaintext password does not linger in memory
/// after the `Password` is dropped.
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a new password from a string.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// Raw UTF-8 bytes used as PBKDF2 input.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// True if the password has no characters; triggers
    /// [`crate::Error::EmptyPassword`] as a warning (spec.md §4.6).
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
