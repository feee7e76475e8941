//! The engine proper: decides entry type, builds headers, chooses
//! compression, calls the Crypto Core when applicable, enforces
//! part-boundary rules, and accumulates the counters written into the
//! archive's terminal record at finalization.

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::compress::{self, Method};
use crate::entry::{Entry, EntryKind, EntrySource};
use crate::error::{Diagnostic, Error};
use crate::format::{
    plain, COMPRESSION_DEFLATE, COMPRESSION_STORE, FILE_TYPE_DIRECTORY, FILE_TYPE_FILE,
    FILE_TYPE_SYMLINK,
};
use crate::options::{ArchiveFormat, WriterOptions};
use crate::part::PartManager;
use crate::path::StoredPath;

#[cfg(feature = "aes")]
use crate::crypto::{self, KeyDerivationParams};
#[cfg(feature = "aes")]
use crate::format::encrypted;
#[cfg(feature = "aes")]
use md5::{Digest, Md5};

/// Upper bound on a single read from a source file, bounding steady-state
/// memory use independent of source file size (spec.md §5).
const CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Assumed heap budget fed to the compression per-file heuristic (spec.md
/// §4.3's "~40% of the remaining heap budget").
const HEAP_BUDGET: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Initialized,
    Writing,
    Finalized,
    Failed,
}

#[cfg(feature = "aes")]
struct CryptoState {
    password: crypto::Password,
    params: KeyDerivationParams,
    /// Cached when a static salt is configured, since the key is then
    /// identical for every record; `None` forces fresh per-record
    /// derivation using that record's own IV as the salt.
    static_key16: Option<[u8; 16]>,
}

/// Streams entries into a Format-A or Format-E archive.
///
/// A writer instance is not safe for concurrent use; it owns the active
/// part's file handle exclusively for its whole lifetime (spec.md §5).
pub struct ArchiveWriter {
    state: State,
    options: WriterOptions,
    base_path: PathBuf,
    parts: Option<PartManager>,
    total_entries: u32,
    total_uncompressed: u64,
    total_compressed: u64,
    warnings: VecDeque<Diagnostic>,
    errors: VecDeque<Diagnostic>,
    #[cfg(feature = "aes")]
    crypto: Option<CryptoState>,
}

impl ArchiveWriter {
    /// Creates a writer in the `Fresh` state; call [`Self::initialize`]
    /// before adding entries.
    pub fn new(options: WriterOptions) -> Self {
        Self {
            state: State::Fresh,
            options,
            base_path: PathBuf::new(),
            parts: None,
            total_entries: 0,
            total_uncompressed: 0,
            total_compressed: 0,
            warnings: VecDeque::new(),
            errors: VecDeque::new(),
            #[cfg(feature = "aes")]
            crypto: None,
        }
    }

    fn canonical_ext(&self) -> &'static str {
        match self.options.format {
            ArchiveFormat::PlainText => "jpa",
            ArchiveFormat::Encrypted => "jps",
        }
    }

    /// Opens the first part under `target_path` (extension-less base) and
    /// writes the placeholder standard header. Only valid from `Fresh`.
    pub fn initialize(&mut self, target_path: impl AsRef<Path>) -> bool {
        if self.state != State::Fresh {
            return false;
        }

        if self.options.is_encrypted() {
            if let Err(err) = check_crypto_available() {
                self.fail(err);
                return false;
            }
        }

        self.base_path = target_path.as_ref().to_path_buf();
        match PartManager::create(&self.base_path, self.canonical_ext(), self.options.part_size) {
            Ok(pm) => self.parts = Some(pm),
            Err(err) => {
                self.fail(err);
                return false;
            }
        }

        if self.options.is_encrypted() {
            if !self.initialize_crypto() {
                return false;
            }
        } else {
            let std_header = plain::encode_std_header(0, 0, 0, self.options.part_size > 0);
            if !self.write_atomic(&std_header) {
                return false;
            }
            if self.options.part_size > 0 {
                let split_header = plain::encode_split_header(1);
                if !self.write_atomic(&split_header) {
                    return false;
                }
            }
        }

        self.state = State::Initialized;
        true
    }

    #[cfg(feature = "aes")]
    fn initialize_crypto(&mut self) -> bool {
        let password = self
            .options
            .password
            .clone()
            .unwrap_or_else(|| crypto::Password::new(""));
        if password.is_empty() {
            self.warnings
                .push_back(Diagnostic::from_error(&Error::EmptyPassword));
        }

        let params = KeyDerivationParams::new(self.options.use_static_salt, self.options.static_salt);
        let std_header = encrypted::encode_std_header(self.options.part_size > 0);
        let extra = encrypted::encode_extra_headers(&params);
        if !self.write_atomic(&std_header) || !self.write_atomic(&extra) {
            return false;
        }

        let static_key16 = if params.has_static_salt {
            let key32 = crypto::derive_key(&password, &params.static_salt, &params);
            Some(crypto::aes128_key(&key32))
        } else {
            None
        };
        self.crypto = Some(CryptoState {
            password,
            params,
            static_key16,
        });
        true
    }

    #[cfg(not(feature = "aes"))]
    fn initialize_crypto(&mut self) -> bool {
        unreachable!("check_crypto_available rejects encrypted archives without the aes feature")
    }

    /// Reads `abs_path` from disk and appends it as one record.
    pub fn add_entry_from_path(&mut self, abs_path: impl AsRef<Path>, stored_path: StoredPath) -> bool {
        if !matches!(self.state, State::Initialized | State::Writing) {
            return false;
        }
        let entry = match Entry::from_disk_path(stored_path, abs_path.as_ref(), self.options.dereference_symlinks) {
            Ok(e) => e,
            Err(source) => {
                self.fail(Error::UnreadableFile {
                    path: abs_path.as_ref().to_path_buf(),
                    source,
                });
                return false;
            }
        };
        self.write_entry(entry)
    }

    /// Appends an in-memory buffer as one record.
    pub fn add_virtual_entry(&mut self, stored_path: StoredPath, content: Vec<u8>) -> bool {
        if !matches!(self.state, State::Initialized | State::Writing) {
            return false;
        }
        let entry = Entry::virtual_entry(stored_path, content);
        self.write_entry(entry)
    }

    /// Appends every entry from `entries` in order, stopping early only if
    /// the writer transitions to `Failed`. Returns `true` iff every entry
    /// succeeded.
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = Entry>) -> bool {
        let mut all_ok = true;
        for entry in entries {
            if !matches!(self.state, State::Initialized | State::Writing) {
                return false;
            }
            if !self.write_entry(entry) {
                all_ok = false;
            }
        }
        all_ok
    }

    fn write_entry(&mut self, entry: Entry) -> bool {
        self.state = State::Writing;
        let record_index = self.total_entries as u64;
        let ok = if self.options.is_encrypted() {
            self.write_entry_encrypted_dispatch(entry, record_index)
        } else {
            self.write_entry_plain(entry)
        };
        if ok {
            self.total_entries += 1;
        }
        ok
    }

    #[cfg(feature = "aes")]
    fn write_entry_encrypted_dispatch(&mut self, entry: Entry, record_index: u64) -> bool {
        self.write_entry_encrypted(entry, record_index)
    }

    #[cfg(not(feature = "aes"))]
    fn write_entry_encrypted_dispatch(&mut self, _entry: Entry, _record_index: u64) -> bool {
        unreachable!("initialize() rejects encrypted archives without the aes feature")
    }

    fn write_entry_plain(&mut self, entry: Entry) -> bool {
        let path_bytes = stored_path_bytes(&entry);
        let file_type = file_type_code(&entry);

        // A file classified Store by the size/heap heuristic never needs
        // its bytes in memory at all: stream it straight from disk to the
        // active part instead of buffering the whole file first.
        if matches!(entry.kind, EntryKind::File)
            && compress::choose_policy(entry.size, HEAP_BUDGET) == Method::Store
        {
            return self.write_entry_plain_stored_file(&entry, &path_bytes, file_type);
        }

        let (compression, payload) = match entry.kind {
            EntryKind::Directory => (COMPRESSION_STORE, Vec::new()),
            EntryKind::Symlink => match read_small_payload(&entry) {
                Ok(raw) => (COMPRESSION_STORE, raw),
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            },
            EntryKind::File => {
                let raw = match self.read_file_bytes(&entry) {
                    Ok(b) => b,
                    Err(err) => {
                        self.fail(err);
                        return false;
                    }
                };
                let policy = compress::choose_policy(entry.size, HEAP_BUDGET);
                let (method, bytes) = compress::compress_with_fallback(&raw, policy);
                (method_code(method), bytes)
            }
        };

        let compressed_len = payload.len() as u32;
        let uncompressed_len = entry.size as u32;
        let header = plain::encode_record_header(
            &path_bytes,
            file_type,
            compression,
            compressed_len,
            uncompressed_len,
            entry.perms,
            entry.mtime,
        );

        if !self.write_atomic(&header) {
            return false;
        }
        if !payload.is_empty() && !self.write_splittable(&payload) {
            return false;
        }

        self.total_uncompressed += entry.size;
        self.total_compressed += payload.len() as u64;
        true
    }

    /// Writes a Store-classified regular file's record header, then
    /// streams its payload from disk in `CHUNK_BYTES` pieces rather than
    /// reading the whole file into one buffer first (spec.md §5).
    fn write_entry_plain_stored_file(&mut self, entry: &Entry, path_bytes: &[u8], file_type: u8) -> bool {
        // Open (but don't yet read) the source file before committing the
        // header, so a missing/unreadable file is still a pre-commit
        // warning rather than a mid-record failure.
        let mut file = match &entry.source {
            EntrySource::Virtual(_) => None,
            EntrySource::Disk(path) => match std::fs::File::open(path) {
                Ok(f) => Some(f),
                Err(source) => {
                    self.fail(Error::UnreadableFile { path: path.clone(), source });
                    return false;
                }
            },
        };

        let header = plain::encode_record_header(
            path_bytes,
            file_type,
            COMPRESSION_STORE,
            entry.size as u32,
            entry.size as u32,
            entry.perms,
            entry.mtime,
        );
        if !self.write_atomic(&header) {
            return false;
        }

        // Everything past this point writes after the header has already
        // been committed to the part, so any failure here is mid-record.
        let written = match &entry.source {
            EntrySource::Virtual(v) => {
                if !v.is_empty() && !self.write_splittable(v) {
                    return false;
                }
                v.len() as u64
            }
            EntrySource::Disk(path) => {
                let file = file.as_mut().expect("EntrySource::Disk always opens a file above");
                let mut chunk = vec![0u8; CHUNK_BYTES];
                let mut total = 0u64;
                loop {
                    let n = match file.read(&mut chunk) {
                        Ok(n) => n,
                        Err(source) => {
                            self.fail_mid_record(Error::UnreadableFile { path: path.clone(), source });
                            return false;
                        }
                    };
                    if n == 0 {
                        break;
                    }
                    if !self.write_splittable(&chunk[..n]) {
                        return false;
                    }
                    total += n as u64;
                }
                if total != entry.size {
                    self.fail_mid_record(Error::ShortRead {
                        path: path.clone(),
                        reason: format!("expected {} bytes, read {}", entry.size, total),
                    });
                    return false;
                }
                total
            }
        };

        self.total_uncompressed += entry.size;
        self.total_compressed += written;
        true
    }

    #[cfg(feature = "aes")]
    fn write_entry_encrypted(&mut self, entry: Entry, record_index: u64) -> bool {
        let path_bytes = stored_path_bytes(&entry);
        let file_type = file_type_code(&entry);

        let raw = match entry.kind {
            EntryKind::Directory => Vec::new(),
            EntryKind::Symlink => match read_small_payload(&entry) {
                Ok(b) => b,
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            },
            EntryKind::File => match self.read_file_bytes(&entry) {
                Ok(b) => b,
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            },
        };

        // Format-E always compresses regular-file payloads in fixed-size
        // chunks, independently of the stored-payload size/heap heuristic
        // the plain-text path uses.
        let compress_this_entry = format_e_compresses(entry.kind);
        let compression_code = if compress_this_entry {
            COMPRESSION_DEFLATE
        } else {
            COMPRESSION_STORE
        };

        let header_payload = encrypted::encode_header_payload(
            &path_bytes,
            file_type,
            compression_code,
            entry.size as u32,
            entry.perms,
            entry.mtime,
        );
        let enc_header = match self.encrypt_record_bytes(&header_payload) {
            Some(b) => b,
            None => return false,
        };
        let mut framed_header = encrypted::encode_record_prefix(enc_header.len() as u16, header_payload.len() as u16);
        framed_header.extend_from_slice(&enc_header);
        if !self.write_atomic(&framed_header) {
            return false;
        }

        let mut on_disk_payload_len: u64 = 0;
        for chunk in raw.chunks(compress::ENCRYPTED_CHUNK_SIZE) {
            let dec_bytes = if compress_this_entry {
                match deflate_chunk_required(chunk) {
                    Ok(b) => b,
                    Err(err) => {
                        self.fail(err);
                        return false;
                    }
                }
            } else {
                chunk.to_vec()
            };
            let ciphertext = match self.encrypt_record_bytes(&dec_bytes) {
                Some(b) => b,
                None => return false,
            };
            let block_prefix = encrypted::encode_data_block_prefix(ciphertext.len() as u32, dec_bytes.len() as u32);
            if !self.write_atomic(&block_prefix) {
                return false;
            }
            if !self.write_ciphertext_checked(&ciphertext, record_index) {
                return false;
            }
            on_disk_payload_len += ciphertext.len() as u64;
        }

        self.total_uncompressed += entry.size;
        self.total_compressed += on_disk_payload_len;
        true
    }

    #[cfg(feature = "aes")]
    fn encrypt_record_bytes(&mut self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let crypto_state = match self.crypto.as_ref() {
            Some(cs) => cs,
            None => {
                self.fail(Error::CryptoUnavailable);
                return None;
            }
        };
        let ciphertext = if let Some(key16) = crypto_state.static_key16 {
            crypto::encrypt_record(&key16, plaintext)
        } else {
            let iv = crypto::random_iv();
            let salt = crypto::record_salt(&crypto_state.params, &iv).to_vec();
            let key32 = crypto::derive_key(&crypto_state.password, &salt, &crypto_state.params);
            let key16 = crypto::aes128_key(&key32);
            crypto::encrypt_record_with_iv(&key16, &iv, plaintext)
        };
        Some(ciphertext)
    }

    #[cfg(feature = "aes")]
    fn write_ciphertext_checked(&mut self, ciphertext: &[u8], record_index: u64) -> bool {
        let expected = Md5::digest(ciphertext);
        let mut hasher = Md5::new();
        let result = match self.parts.as_mut() {
            Some(pm) => pm.write_splittable_tracked(ciphertext, |chunk| hasher.update(chunk)),
            None => return false,
        };
        if let Err(err) = result {
            self.fail(err);
            return false;
        }
        if hasher.finalize() != expected {
            self.fail(Error::EncodingCorruption { record_index });
            return false;
        }
        true
    }

    fn read_file_bytes(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        match &entry.source {
            EntrySource::Virtual(v) => Ok(v.clone()),
            EntrySource::Disk(path) => {
                let mut file = std::fs::File::open(path).map_err(|source| Error::UnreadableFile {
                    path: path.clone(),
                    source,
                })?;
                let mut buf = Vec::with_capacity(entry.size.min(CHUNK_BYTES as u64) as usize);
                let mut chunk = vec![0u8; CHUNK_BYTES];
                loop {
                    let n = file.read(&mut chunk).map_err(|source| Error::UnreadableFile {
                        path: path.clone(),
                        source,
                    })?;
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                if buf.len() as u64 != entry.size {
                    return Err(Error::ShortRead {
                        path: path.clone(),
                        reason: format!("expected {} bytes, read {}", entry.size, buf.len()),
                    });
                }
                Ok(buf)
            }
        }
    }

    fn write_atomic(&mut self, bytes: &[u8]) -> bool {
        let ensure_result = match self.parts.as_mut() {
            Some(pm) => pm.ensure_room(bytes.len() as u64),
            None => return false,
        };
        if let Err(err) = ensure_result {
            self.fail(err);
            return false;
        }
        let write_result = match self.parts.as_mut() {
            Some(pm) => pm.write_atomic(bytes).map_err(|source| Error::SinkOpen {
                path: pm.current_path().to_path_buf(),
                source,
            }),
            None => return false,
        };
        if let Err(err) = write_result {
            self.fail(err);
            return false;
        }
        true
    }

    fn write_splittable(&mut self, bytes: &[u8]) -> bool {
        let result = match self.parts.as_mut() {
            Some(pm) => pm.write_splittable(bytes),
            None => return false,
        };
        if let Err(err) = result {
            self.fail(err);
            return false;
        }
        true
    }

    /// Closes the active part, renames the terminal part to its canonical
    /// extension if needed, and writes the final header/trailer. A second
    /// call on an already-`Finalized` writer is a no-op that reports
    /// success (spec.md §8, P5).
    pub fn finalize(&mut self) -> bool {
        match self.state {
            State::Finalized => return true,
            State::Failed | State::Fresh => return false,
            _ => {}
        }

        let first_part_path;
        let terminal_path;
        let total_parts;
        {
            let pm = match self.parts.as_mut() {
                Some(pm) => pm,
                None => return false,
            };
            first_part_path = pm.first_part_path();
            terminal_path = match pm.finalize() {
                Ok(p) => p,
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            };
            total_parts = pm.total_parts();
        }

        // When splitting produced exactly one part, that part *is* the
        // terminal part and has already been renamed to its canonical
        // extension, so `first_part_path` (always the pre-rename `.j01`
        // name when splitting is configured) no longer exists on disk.
        let header_path = if total_parts <= 1 { &terminal_path } else { &first_part_path };

        let ok = if self.options.is_encrypted() {
            self.append_end_header(total_parts)
        } else {
            self.rewrite_plain_header(header_path, total_parts)
        };

        if ok {
            self.parts = None;
            self.state = State::Finalized;
        }
        ok
    }

    #[cfg(feature = "aes")]
    fn append_end_header(&mut self, total_parts: u32) -> bool {
        let end_header = encrypted::encode_end_header(
            total_parts as u16,
            self.total_entries,
            self.total_uncompressed as u32,
            self.total_compressed as u32,
        );
        let final_path = self.base_path.with_extension(self.canonical_ext());
        let mut sink = match crate::sink::ByteSink::open(&final_path) {
            Ok(s) => s,
            Err(err) => {
                self.fail(err);
                return false;
            }
        };
        if let Err(source) = sink.write_all(&end_header) {
            self.fail(Error::FinalRename {
                path: final_path,
                source,
            });
            return false;
        }
        true
    }

    #[cfg(not(feature = "aes"))]
    fn append_end_header(&mut self, _total_parts: u32) -> bool {
        unreachable!("encrypted archives cannot reach finalize without the aes feature")
    }

    fn rewrite_plain_header(&mut self, first_part_path: &Path, total_parts: u32) -> bool {
        use std::io::{Seek, SeekFrom, Write as _};

        let std_header = plain::encode_std_header(
            self.total_entries,
            self.total_uncompressed as u32,
            self.total_compressed as u32,
            self.options.part_size > 0,
        );
        let mut file = match std::fs::OpenOptions::new().write(true).open(first_part_path) {
            Ok(f) => f,
            Err(source) => {
                self.fail(Error::FinalRename {
                    path: first_part_path.to_path_buf(),
                    source,
                });
                return false;
            }
        };
        let rewrite = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&std_header));
        if let Err(source) = rewrite {
            self.fail(Error::FinalRename {
                path: first_part_path.to_path_buf(),
                source,
            });
            return false;
        }

        if self.options.part_size > 0 {
            let split_header = plain::encode_split_header(total_parts as u16);
            let rewrite = file
                .seek(SeekFrom::Start(plain::STD_HEADER_LEN as u64))
                .and_then(|_| file.write_all(&split_header));
            if let Err(source) = rewrite {
                self.fail(Error::FinalRename {
                    path: first_part_path.to_path_buf(),
                    source,
                });
                return false;
            }
        }
        true
    }

    fn fail(&mut self, err: Error) {
        let diagnostic = Diagnostic::from_error(&err);
        if err.is_fatal() {
            log::error!("{diagnostic}");
            self.errors.push_back(diagnostic);
            self.state = State::Failed;
        } else {
            log::warn!("{diagnostic}");
            self.warnings.push_back(diagnostic);
        }
    }

    /// Like [`Self::fail`], but always fatal regardless of `err.is_fatal()`.
    /// Used where the record's header has already been committed to a
    /// part, so the condition is a mid-record failure (spec.md: "fatal if
    /// mid-record") even for an `Error` variant that is ordinarily a
    /// pre-commit warning.
    fn fail_mid_record(&mut self, err: Error) {
        let diagnostic = Diagnostic::from_error(&err);
        log::error!("{diagnostic}");
        self.errors.push_back(diagnostic);
        self.state = State::Failed;
    }

    /// Drains and returns queued warning messages (non-fatal conditions).
    pub fn drain_warnings(&mut self) -> Vec<String> {
        self.warnings.drain(..).map(String::from).collect()
    }

    /// Drains and returns queued error messages (fatal conditions).
    pub fn drain_errors(&mut self) -> Vec<String> {
        self.errors.drain(..).map(String::from).collect()
    }

    /// Total entries successfully written so far.
    pub fn total_entries(&self) -> u32 {
        self.total_entries
    }
}

fn stored_path_bytes(entry: &Entry) -> Vec<u8> {
    match entry.kind {
        EntryKind::Directory => entry.stored_path.with_trailing_slash().into_bytes(),
        _ => entry.stored_path.as_bytes().to_vec(),
    }
}

fn file_type_code(entry: &Entry) -> u8 {
    match entry.kind {
        EntryKind::Directory => FILE_TYPE_DIRECTORY,
        EntryKind::File => FILE_TYPE_FILE,
        EntryKind::Symlink => FILE_TYPE_SYMLINK,
    }
}

fn method_code(method: Method) -> u8 {
    match method {
        Method::Store => COMPRESSION_STORE,
        Method::Deflate => COMPRESSION_DEFLATE,
    }
}

fn read_small_payload(entry: &Entry) -> Result<Vec<u8>, Error> {
    match &entry.source {
        EntrySource::Virtual(v) => Ok(v.clone()),
        EntrySource::Disk(path) => std::fs::read(path).map_err(|source| Error::UnreadableFile {
            path: path.clone(),
            source,
        }),
    }
}

#[cfg(feature = "aes")]
fn check_crypto_available() -> Result<(), Error> {
    crypto::check_available()
}

#[cfg(not(feature = "aes"))]
fn check_crypto_available() -> Result<(), Error> {
    Err(Error::CryptoUnavailable)
}

/// Whether Format-E compresses `kind`'s payload (spec.md §4.3: regular
/// files always, directories/symlinks never). Without the `deflate`
/// feature there is no compressor to run, so every entry is stored.
#[cfg(all(feature = "aes", feature = "deflate"))]
fn format_e_compresses(kind: EntryKind) -> bool {
    matches!(kind, EntryKind::File)
}

#[cfg(all(feature = "aes", not(feature = "deflate")))]
fn format_e_compresses(_kind: EntryKind) -> bool {
    false
}

/// Deflates one Format-E data-block chunk unconditionally: once an entry
/// is classified deflate, every chunk must actually be deflated, since
/// the per-entry header carries a single compression method for all of
/// its chunks and a reader inflates every block accordingly.
#[cfg(all(feature = "aes", feature = "deflate"))]
fn deflate_chunk_required(chunk: &[u8]) -> Result<Vec<u8>, Error> {
    compress::deflate(chunk).map_err(Error::Io)
}

#[cfg(all(feature = "aes", not(feature = "deflate")))]
fn deflate_chunk_required(_chunk: &[u8]) -> Result<Vec<u8>, Error> {
    unreachable!("format_e_compresses is always false without the deflate feature")
}
