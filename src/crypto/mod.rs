//! The Crypto Core (spec.md §4.4, Format-E only) — PBKDF2 key derivation and
//! AES-128-CBC record encryption.

mod password;
pub use password::Password;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// The hash family behind a Format-E archive's PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdfAlgorithm {
    Sha1 = 0,
    Sha256 = 1,
    Sha512 = 2,
}

impl KdfAlgorithm {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Sha1),
            1 => Some(Self::Sha256),
            2 => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Key-derivation parameters persisted in the Format-E extra header
/// (spec.md §3). The canonical configuration is SHA-1 with a static salt.
#[derive(Debug, Clone)]
pub struct KeyDerivationParams {
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
    pub has_static_salt: bool,
    /// Always 64 bytes; zero-filled placeholder when `has_static_salt` is
    /// false.
    pub static_salt: [u8; 64],
}

impl KeyDerivationParams {
    /// Builds the canonical configuration: SHA-1, with or without a static
    /// salt (spec.md §3 — `iterations = 128_000` when static, `2_500`
    /// otherwise).
    pub fn new(use_static_salt: bool, static_salt: Option<[u8; 64]>) -> Self {
        if use_static_salt {
            Self {
                algorithm: KdfAlgorithm::Sha1,
                iterations: 128_000,
                has_static_salt: true,
                static_salt: static_salt.unwrap_or_else(random_salt),
            }
        } else {
            Self {
                algorithm: KdfAlgorithm::Sha1,
                iterations: 2_500,
                has_static_salt: false,
                static_salt: [0u8; 64],
            }
        }
    }
}

fn random_salt() -> [u8; 64] {
    let mut salt = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derives a 32-byte key from `password` and `salt` using PBKDF2-HMAC with
/// the configured hash algorithm and iteration count. Only the first 16
/// bytes (the AES-128 key) are currently used; the remaining 16 are
/// reserved for future HMAC use (spec.md §4.4).
pub fn derive_key(password: &Password, salt: &[u8], params: &KeyDerivationParams) -> [u8; 32] {
    let mut out = [0u8; 32];
    match params.algorithm {
        KdfAlgorithm::Sha1 => pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, params.iterations, &mut out),
        KdfAlgorithm::Sha256 => {
            pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut out)
        }
        KdfAlgorithm::Sha512 => {
            pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, params.iterations, &mut out)
        }
    }
    out
}

/// Picks the PBKDF2 salt for one record: the archive-wide static salt when
/// enabled, otherwise a fresh random salt reusing the record's own IV bytes
/// (spec.md §4.4's "IV-derived per-record salt" — see DESIGN.md for the
/// rationale behind this reading of the source's ambiguous description).
pub fn record_salt<'a>(params: &'a KeyDerivationParams, iv: &'a [u8; 16]) -> &'a [u8] {
    if params.has_static_salt {
        &params.static_salt
    } else {
        iv
    }
}

/// Encrypts one record's plaintext with AES-128-CBC/PKCS7 under a fresh
/// random IV, returning `IV || ciphertext` (spec.md §4.4). The emitted
/// length is always `16 + 16 * ceil((len(plaintext) + 1) / 16)`.
///
/// # Errors
///
/// Returns [`Error::CryptoUnavailable`] only in builds without the `aes`
/// feature (see the crate's feature-gated stub); within this module AES is
/// always available, so this function itself is infallible.
pub fn encrypt_record(key16: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_record_with_iv(key16, &iv, plaintext)
}

/// Generates a fresh random 16-byte IV, as used for both per-record AES IVs
/// and (when no static salt is configured) the per-record PBKDF2 salt.
pub fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypts `plaintext` under an explicitly-supplied IV rather than a freshly
/// generated one, returning `IV || ciphertext`. Used by the writer when the
/// same 16 bytes must serve as both the AES IV and the per-record PBKDF2 salt
/// (spec.md §4.4, non-static-salt mode).
pub fn encrypt_record_with_iv(key16: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let encryptor = Aes128CbcEnc::new(key16.into(), iv.into());
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Inverts [`encrypt_record`]/[`encrypt_record_with_iv`]: splits off the
/// leading 16-byte IV and decrypts the remainder under `key16`.
///
/// # Errors
///
/// Returns [`Error::EncodingCorruption`] (record index `0`, since the caller
/// identifies the record) if `ciphertext` is shorter than one block or the
/// PKCS7 padding is invalid.
pub fn decrypt_record(key16: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < 16 {
        return Err(Error::EncodingCorruption { record_index: 0 });
    }
    let (iv, body) = ciphertext.split_at(16);
    let decryptor = Aes128CbcDec::new(key16.into(), iv.into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| Error::EncodingCorruption { record_index: 0 })
}

/// Extracts the 16-byte IV prepended to an `encrypt_record` output, and the
/// AES-128 key derived for this record from `key32`.
pub fn aes128_key(key32: &[u8; 32]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key.copy_from_slice(&key32[..16]);
    key
}

/// Confirms AES is available in this build. Format-E's `initialize()` calls
/// this first so the `CryptoUnavailable` failure mode is a single,
/// consistent checkpoint rather than a deferred panic deep in record
/// encryption (spec.md §4.4).
pub fn check_available() -> Result<(), Error> {
    Ok(())
}
