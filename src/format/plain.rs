//! Format-A (`.jpa`) wire-format encoding (spec.md §4.5.1).

use super::*;

/// Fixed size of the Format-A standard header alone (no split header).
pub const STD_HEADER_LEN: u16 = 19;
/// Size of the standard header plus the split header.
pub const STD_HEADER_LEN_SPLIT: u16 = 27;
/// Size of the split header block.
pub const SPLIT_HEADER_LEN: usize = 8;

/// Builds the 19-byte standard header (or the header_len field alone, when
/// the caller wants to rewrite just the counters in place — see
/// [`std_header_prefix_len`]).
pub fn encode_std_header(
    total_entries: u32,
    total_uncompressed: u32,
    total_compressed: u32,
    split: bool,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(19);
    buf.extend_from_slice(SIG_JPA);
    push_u16le(
        &mut buf,
        if split {
            STD_HEADER_LEN_SPLIT
        } else {
            STD_HEADER_LEN
        },
    );
    buf.push(JPA_VERSION.0);
    buf.push(JPA_VERSION.1);
    push_u32le(&mut buf, total_entries);
    push_u32le(&mut buf, total_uncompressed);
    push_u32le(&mut buf, total_compressed);
    debug_assert_eq!(buf.len(), STD_HEADER_LEN as usize);
    buf
}

/// Builds the 8-byte split header (present only when the archive splits
/// into multiple parts).
pub fn encode_split_header(total_parts: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SPLIT_HEADER_LEN);
    buf.extend_from_slice(SIG_SPLIT);
    push_u16le(&mut buf, 4);
    push_u16le(&mut buf, total_parts);
    debug_assert_eq!(buf.len(), SPLIT_HEADER_LEN);
    buf
}

/// Builds one `JPF` record header (everything up to, but not including, the
/// payload bytes). `path_bytes` must already carry the trailing `/` for
/// directory entries.
pub fn encode_record_header(
    path_bytes: &[u8],
    file_type: u8,
    compression: u8,
    compressed_len: u32,
    uncompressed_len: u32,
    perms: u32,
    mtime: u32,
) -> Vec<u8> {
    let path_len = path_bytes.len() as u16;
    let has_mtime = mtime > 0;
    let block_len = 21u16 + path_len + if has_mtime { 8 } else { 0 };

    let mut buf = Vec::with_capacity(block_len as usize);
    buf.extend_from_slice(SIG_JPF_A);
    push_u16le(&mut buf, block_len);
    push_u16le(&mut buf, path_len);
    buf.extend_from_slice(path_bytes);
    buf.push(file_type);
    buf.push(compression);
    push_u32le(&mut buf, compressed_len);
    push_u32le(&mut buf, uncompressed_len);
    push_u32le(&mut buf, perms);
    if has_mtime {
        buf.extend_from_slice(SIG_MTIME);
        push_u16le(&mut buf, 8);
        push_u32le(&mut buf, mtime);
    }
    buf
}
