//! The Compressor (spec.md §4.3) — raw DEFLATE with a stored-payload
//! fallback.

/// Size above which a file is always stored rather than compressed
/// (spec.md §4.3): 24 MiB.
pub const COMPRESSION_THRESHOLD: u64 = 24 * 1024 * 1024;

/// Format-E's fixed per-chunk plaintext size before encryption (spec.md
/// §4.3): `64 KiB - 1`.
pub const ENCRYPTED_CHUNK_SIZE: usize = 65_535;

/// On-disk compression method code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    Store = 0,
    Deflate = 1,
}

/// Compresses `data` with raw DEFLATE (no zlib header/trailer).
///
/// # Feature
///
/// Only compiled in with the `deflate` feature; without it, callers should
/// always choose [`Method::Store`].
#[cfg(feature = "deflate")]
pub fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(6));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decides how a non-virtual, non-directory, non-symlink payload should be
/// stored, applying the per-file policy of spec.md §4.3: always stored if
/// the uncompressed size is at or above [`COMPRESSION_THRESHOLD`], or if
/// compressing the input would use more than ~40% of `heap_budget` bytes;
/// otherwise compressed, with the deflate-or-expand fallback to stored
/// applied by the caller once it has the actual compressed bytes.
pub fn choose_policy(uncompressed_size: u64, heap_budget: u64) -> Method {
    if uncompressed_size >= COMPRESSION_THRESHOLD {
        return Method::Store;
    }
    let cap = (heap_budget as f64 * 0.4) as u64;
    if uncompressed_size > cap {
        return Method::Store;
    }
    Method::Deflate
}

/// Applies the compress-or-fall-back-to-store rule: compresses `data` and
/// returns `(Method::Deflate, bytes)` unless compression is unavailable,
/// fails, or would not shrink the input, in which case it returns
/// `(Method::Store, data.to_vec())`.
pub fn compress_with_fallback(data: &[u8], policy: Method) -> (Method, Vec<u8>) {
    if policy == Method::Store {
        return (Method::Store, data.to_vec());
    }

    #[cfg(feature = "deflate")]
    {
        match deflate(data) {
            Ok(out) if out.len() < data.len() => (Method::Deflate, out),
            _ => (Method::Store, data.to_vec()),
        }
    }

    #[cfg(not(feature = "deflate"))]
    {
        (Method::Store, data.to_vec())
    }
}
