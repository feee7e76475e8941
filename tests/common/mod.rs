//! Test-only decoders that invert the Format-A and Format-E wire layouts.
//!
//! Nothing here is part of the crate's public surface; reading an archive
//! back is explicitly out of scope for the library itself (spec.md §1's
//! writer-only framing), so these helpers exist solely to let integration
//! tests assert that what the writer produced is byte-correct.

use std::path::{Path, PathBuf};

pub fn read_u16le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn read_u32le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Reassembles a (possibly split) archive's full byte stream: every
/// `<base>.jNN` part in ascending order, followed by the terminal part under
/// its canonical extension.
pub fn concat_archive_bytes(base: &Path, canonical_ext: &str) -> Vec<u8> {
    let dir = base.parent().unwrap();
    let stem = base.file_name().unwrap().to_str().unwrap().to_owned();
    let prefix = format!("{stem}.j");

    let mut numbered: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|p| {
            let fname = p.file_name()?.to_str()?;
            let suffix = fname.strip_prefix(&prefix)?;
            let n: u32 = suffix.parse().ok()?;
            Some((n, p))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);

    let mut out = Vec::new();
    for (_, path) in numbered {
        out.extend(std::fs::read(path).unwrap());
    }
    out.extend(std::fs::read(base.with_extension(canonical_ext)).unwrap());
    out
}

fn inflate_raw(data: &[u8]) -> Vec<u8> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

/// One decoded Format-A record, with `content` already inflated if the
/// record was stored with `compression == COMPRESSION_DEFLATE`.
pub struct RecordA {
    pub path: String,
    pub file_type: u8,
    pub compression: u8,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub perms: u32,
    pub mtime: u32,
    pub content: Vec<u8>,
}

pub struct ArchiveA {
    pub total_entries: u32,
    pub total_uncompressed: u32,
    pub total_compressed: u32,
    pub total_parts: u16,
    pub records: Vec<RecordA>,
}

pub fn decode_format_a(bytes: &[u8]) -> ArchiveA {
    assert_eq!(&bytes[0..3], b"JPA");
    let header_len = read_u16le(bytes, 3) as usize;
    let total_entries = read_u32le(bytes, 7);
    let total_uncompressed = read_u32le(bytes, 11);
    let total_compressed = read_u32le(bytes, 15);

    let mut offset = 19;
    let mut total_parts = 1u16;
    if header_len == 27 {
        assert_eq!(&bytes[19..23], b"JP\x01\x01");
        total_parts = read_u16le(bytes, 25);
        offset = 27;
    }

    let mut records = Vec::with_capacity(total_entries as usize);
    for _ in 0..total_entries {
        let rec_start = offset;
        assert_eq!(&bytes[offset..offset + 3], b"JPF");
        let block_len = read_u16le(bytes, offset + 3) as usize;
        let path_len = read_u16le(bytes, offset + 5) as usize;
        let path_start = offset + 7;
        let path = String::from_utf8(bytes[path_start..path_start + path_len].to_vec()).unwrap();

        let mut cur = path_start + path_len;
        let file_type = bytes[cur];
        cur += 1;
        let compression = bytes[cur];
        cur += 1;
        let compressed_len = read_u32le(bytes, cur);
        cur += 4;
        let uncompressed_len = read_u32le(bytes, cur);
        cur += 4;
        let perms = read_u32le(bytes, cur);
        cur += 4;

        let mut mtime = 0u32;
        if cur - rec_start < block_len {
            assert_eq!(&bytes[cur..cur + 2], b"\x00\x01");
            mtime = read_u32le(bytes, cur + 4);
            cur += 8;
        }
        assert_eq!(cur - rec_start, block_len);

        let payload_start = rec_start + block_len;
        let raw_payload = bytes[payload_start..payload_start + compressed_len as usize].to_vec();
        let content = if compression == 1 {
            inflate_raw(&raw_payload)
        } else {
            raw_payload
        };

        offset = payload_start + compressed_len as usize;
        records.push(RecordA {
            path,
            file_type,
            compression,
            compressed_len,
            uncompressed_len,
            perms,
            mtime,
            content,
        });
    }

    ArchiveA {
        total_entries,
        total_uncompressed,
        total_compressed,
        total_parts,
        records,
    }
}

/// One decoded Format-E record, with `content` already decrypted and (if
/// the record was deflated) inflated.
pub struct RecordE {
    pub path: String,
    pub file_type: u8,
    pub compression: u8,
    pub uncompressed_len: u32,
    pub perms: u32,
    pub mtime: u32,
    pub content: Vec<u8>,
}

pub struct ArchiveE {
    pub total_parts: u16,
    pub total_entries: u32,
    pub total_uncompressed: u32,
    pub total_compressed: u32,
    pub records: Vec<RecordE>,
}

/// Decodes a full Format-E byte stream under `password`, decrypting every
/// record header and data block along the way.
pub fn decode_format_e(bytes: &[u8], password: &str) -> ArchiveE {
    use jpackarchive::crypto::{self, KdfAlgorithm, KeyDerivationParams, Password};

    assert_eq!(&bytes[0..3], b"JPS");
    let mut offset = 6;

    assert_eq!(read_u16le(bytes, offset), 76);
    offset += 2;
    assert_eq!(&bytes[offset..offset + 4], b"JH\x00\x01");
    offset += 4;
    offset += 2; // field_len, always 76
    let algorithm = KdfAlgorithm::from_code(bytes[offset]).unwrap();
    offset += 1;
    let iterations = read_u32le(bytes, offset);
    offset += 4;
    let has_static_salt = bytes[offset] != 0;
    offset += 1;
    let mut static_salt = [0u8; 64];
    static_salt.copy_from_slice(&bytes[offset..offset + 64]);
    offset += 64;

    let params = KeyDerivationParams {
        algorithm,
        iterations,
        has_static_salt,
        static_salt,
    };
    let pw = Password::new(password);
    let static_key16 = has_static_salt
        .then(|| crypto::aes128_key(&crypto::derive_key(&pw, &static_salt, &params)));

    let key_for = |ciphertext: &[u8]| -> [u8; 16] {
        if let Some(k) = static_key16 {
            return k;
        }
        let iv: [u8; 16] = ciphertext[0..16].try_into().unwrap();
        crypto::aes128_key(&crypto::derive_key(&pw, &iv, &params))
    };

    let mut records = Vec::new();
    while &bytes[offset..offset + 3] != b"JPE" {
        assert_eq!(&bytes[offset..offset + 3], b"JPF");
        let enc_header_len = read_u16le(bytes, offset + 3) as usize;
        let dec_header_len = read_u16le(bytes, offset + 5) as usize;
        offset += 7;
        let enc_header = &bytes[offset..offset + enc_header_len];
        offset += enc_header_len;

        let header_key = key_for(enc_header);
        let header_payload = crypto::decrypt_record(&header_key, enc_header).unwrap();
        assert_eq!(header_payload.len(), dec_header_len);

        let path_len = read_u16le(&header_payload, 0) as usize;
        let path = String::from_utf8(header_payload[2..2 + path_len].to_vec()).unwrap();
        let mut cur = 2 + path_len;
        let file_type = header_payload[cur];
        cur += 1;
        let compression = header_payload[cur];
        cur += 1;
        let uncompressed_len = read_u32le(&header_payload, cur);
        cur += 4;
        let perms = read_u32le(&header_payload, cur);
        cur += 4;
        let mtime = read_u32le(&header_payload, cur);

        let mut content = Vec::new();
        while (content.len() as u32) < uncompressed_len {
            let enc_len = read_u32le(bytes, offset) as usize;
            let dec_len = read_u32le(bytes, offset + 4) as usize;
            offset += 8;
            let ciphertext = &bytes[offset..offset + enc_len];
            offset += enc_len;

            let block_key = key_for(ciphertext);
            let dec_bytes = crypto::decrypt_record(&block_key, ciphertext).unwrap();
            assert_eq!(dec_bytes.len(), dec_len);

            let chunk = if compression == 1 {
                inflate_raw(&dec_bytes)
            } else {
                dec_bytes
            };
            content.extend_from_slice(&chunk);
        }

        records.push(RecordE {
            path,
            file_type,
            compression,
            uncompressed_len,
            perms,
            mtime,
            content,
        });
    }

    let total_parts = read_u16le(bytes, offset + 3);
    let total_entries = read_u32le(bytes, offset + 5);
    let total_uncompressed = read_u32le(bytes, offset + 9);
    let total_compressed = read_u32le(bytes, offset + 13);
    assert_eq!(total_entries as usize, records.len());

    ArchiveE {
        total_parts,
        total_entries,
        total_uncompressed,
        total_compressed,
        records,
    }
}

/// Bytes that reliably defeat DEFLATE (expand rather than shrink), so a
/// record's on-disk `compression` is deterministically `COMPRESSION_STORE`.
pub fn incompressible_bytes(len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| (i.wrapping_mul(2654435761)) as u8).collect()
}
