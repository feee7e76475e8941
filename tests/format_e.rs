//! End-to-end coverage of the AES-encrypted `.jps` container: header layout,
//! offline decryption of both record headers and data blocks, a directory
//! entry (no data blocks at all), and a symlink entry on POSIX.

#![cfg(feature = "aes")]

mod common;

use jpackarchive::crypto::Password;
use jpackarchive::options::ArchiveFormat;
use jpackarchive::{ArchiveWriter, Entry, EntryKind, EntrySource, StoredPath, WriterOptions};

#[test]
fn static_salt_round_trip_recovers_plaintext_fields() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("archive");
    let opts = WriterOptions::new()
        .format(ArchiveFormat::Encrypted)
        .password(Password::new("correct horse battery staple"))
        .static_salt(Some([9u8; 64]));
    let mut writer = ArchiveWriter::new(opts);
    assert!(writer.initialize(&base));

    let content = "x".repeat(5000).into_bytes();
    let entry = Entry {
        stored_path: StoredPath::new("notes.txt").unwrap(),
        kind: EntryKind::File,
        source: EntrySource::Virtual(content.clone()),
        perms: 0o640,
        mtime: 1_700_000_000,
        size: content.len() as u64,
    };
    assert!(writer.add_entries(vec![entry]));
    assert!(writer.finalize());
    assert!(writer.drain_errors().is_empty());

    let bytes = common::concat_archive_bytes(&base, "jps");
    let archive = common::decode_format_e(&bytes, "correct horse battery staple");

    assert_eq!(archive.total_entries, 1);
    assert_eq!(archive.total_parts, 1);
    let record = &archive.records[0];
    assert_eq!(record.path, "notes.txt");
    assert_eq!(record.perms, 0o640);
    assert_eq!(record.mtime, 1_700_000_000);
    assert_eq!(record.content, content);
}

#[test]
fn wrong_password_does_not_recover_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("archive");
    let opts = WriterOptions::new()
        .format(ArchiveFormat::Encrypted)
        .password(Password::new("right password"))
        .static_salt(Some([3u8; 64]));
    let mut writer = ArchiveWriter::new(opts);
    assert!(writer.initialize(&base));
    assert!(writer.add_virtual_entry(StoredPath::new("secret.txt").unwrap(), b"topsecret".to_vec()));
    assert!(writer.finalize());

    let bytes = common::concat_archive_bytes(&base, "jps");
    let result = std::panic::catch_unwind(|| common::decode_format_e(&bytes, "wrong password"));
    assert!(result.is_err(), "decrypting with the wrong password should not silently succeed");
}

#[test]
fn directory_entry_has_no_data_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("archive");
    let opts = WriterOptions::new()
        .format(ArchiveFormat::Encrypted)
        .password(Password::new("pw"))
        .static_salt(Some([1u8; 64]));
    let mut writer = ArchiveWriter::new(opts);
    assert!(writer.initialize(&base));
    let entry = Entry {
        stored_path: StoredPath::new("empty-dir").unwrap(),
        kind: EntryKind::Directory,
        source: EntrySource::Virtual(Vec::new()),
        perms: 0o755,
        mtime: 0,
        size: 0,
    };
    assert!(writer.add_entries(vec![entry]));
    assert!(writer.finalize());

    let bytes = common::concat_archive_bytes(&base, "jps");
    let archive = common::decode_format_e(&bytes, "pw");
    let record = &archive.records[0];
    assert_eq!(record.path, "empty-dir/");
    assert_eq!(record.file_type, 0);
    assert!(record.content.is_empty());
}

#[cfg(unix)]
#[test]
fn symlink_entry_on_unix_is_stored_as_its_target() {
    let dir = tempfile::tempdir().unwrap();
    let target_dir = dir.path().join("real");
    std::fs::create_dir(&target_dir).unwrap();
    let link_path = dir.path().join("link");
    std::os::unix::fs::symlink(&target_dir, &link_path).unwrap();

    let base = dir.path().join("archive");
    let opts = WriterOptions::new()
        .format(ArchiveFormat::Encrypted)
        .password(Password::new("pw"))
        .static_salt(Some([2u8; 64]));
    let mut writer = ArchiveWriter::new(opts);
    assert!(writer.initialize(&base));
    assert!(writer.add_entry_from_path(&link_path, StoredPath::new("link").unwrap()));
    assert!(writer.finalize());

    let bytes = common::concat_archive_bytes(&base, "jps");
    let archive = common::decode_format_e(&bytes, "pw");
    let record = &archive.records[0];
    assert_eq!(record.file_type, 2);
    assert_eq!(record.content, target_dir.to_string_lossy().into_owned().into_bytes());
}
