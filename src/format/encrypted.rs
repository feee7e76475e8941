//! Format-E (`.jps`) wire-format encoding (spec.md §4.5.2).
//!
//! This module only builds the *plaintext* byte layouts; actual AES
//! encryption of `header_payload` and each `data_block`'s chunk is
//! orchestrated by [`crate::writer`], which owns the derived key and RNG.

use super::*;

/// Size of the Format-E standard header.
pub const STD_HEADER_LEN: usize = 6;
/// Size of the extra-headers block (`extra_len` field + its 76-byte body).
pub const EXTRA_HEADERS_LEN: usize = 2 + 76;

/// Builds the 6-byte standard header.
pub fn encode_std_header(is_split: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(STD_HEADER_LEN);
    buf.extend_from_slice(SIG_JPS);
    buf.push(JPS_VERSION.0);
    buf.push(JPS_VERSION.1);
    buf.push(is_split as u8);
    debug_assert_eq!(buf.len(), STD_HEADER_LEN);
    buf
}

/// Builds the key-derivation extra-header block.
pub fn encode_extra_headers(params: &crate::crypto::KeyDerivationParams) -> Vec<u8> {
    let mut buf = Vec::with_capacity(EXTRA_HEADERS_LEN);
    push_u16le(&mut buf, 76); // extra_len
    buf.extend_from_slice(SIG_JH);
    push_u16le(&mut buf, 76); // field_len = 12 + len(static_salt)
    buf.push(params.algorithm as u8);
    push_u32le(&mut buf, params.iterations);
    buf.push(params.has_static_salt as u8);
    buf.extend_from_slice(&params.static_salt);
    debug_assert_eq!(buf.len(), EXTRA_HEADERS_LEN);
    buf
}

/// Builds the plaintext `header_payload` for one record (to be encrypted by
/// the caller before being wrapped in a `JPF` frame).
pub fn encode_header_payload(
    path_bytes: &[u8],
    file_type: u8,
    compression: u8,
    uncompressed_len: u32,
    perms: u32,
    mtime: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + path_bytes.len());
    push_u16le(&mut buf, path_bytes.len() as u16);
    buf.extend_from_slice(path_bytes);
    buf.push(file_type);
    buf.push(compression);
    push_u32le(&mut buf, uncompressed_len);
    push_u32le(&mut buf, perms);
    push_u32le(&mut buf, mtime);
    buf
}

/// Builds the `JPF` frame prefix: signature plus the two length fields. The
/// caller appends `encrypted_header` immediately after.
pub fn encode_record_prefix(enc_header_len: u16, dec_header_len: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(7);
    buf.extend_from_slice(SIG_JPF_E);
    push_u16le(&mut buf, enc_header_len);
    push_u16le(&mut buf, dec_header_len);
    buf
}

/// Builds the 8-byte `enc_len`/`dec_len` prefix of one data block. The
/// caller appends `encrypted_chunk` immediately after.
pub fn encode_data_block_prefix(enc_len: u32, dec_len: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    push_u32le(&mut buf, enc_len);
    push_u32le(&mut buf, dec_len);
    buf
}

/// Builds the final `JPE` end header.
pub fn encode_end_header(
    total_parts: u16,
    total_entries: u32,
    total_uncompressed: u32,
    total_compressed: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(SIG_JPE);
    push_u16le(&mut buf, total_parts);
    push_u32le(&mut buf, total_entries);
    push_u32le(&mut buf, total_uncompressed);
    push_u32le(&mut buf, total_compressed);
    buf
}
