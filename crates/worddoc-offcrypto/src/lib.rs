//! Legacy Office binary-document encryption for the Word `.doc` family.
//!
//! This crate covers the three password-protection schemes found in binary Word
//! documents and implements, for each of them:
//! - parsing the key material stored at the head of the document's table stream,
//! - password verification against the embedded verifier fields, and
//! - a chunked decrypting reader for the protected streams.
//!
//! Supported schemes:
//! - XOR obfuscation method 1 ([MS-OFFCRYPTO] 2.3.7) — forced by the document
//!   header's obfuscation flag; the key material is a 16-bit key/verifier pair.
//! - Office binary RC4 ([MS-OFFCRYPTO] 2.3.6) — `EncryptionInfo` version 1.1.
//! - RC4 CryptoAPI ([MS-OFFCRYPTO] 2.3.5) — `EncryptionInfo` versions 2.2/3.2/4.2.
//!
//! Password verification and decryption are separate steps on purpose: a
//! [`Decryptor`] refuses to produce a [`DecryptingReader`] until a password has
//! been verified, so there is no way to stream plaintext from an unverified key.

use std::io::Read;

use thiserror::Error;
use zeroize::Zeroizing;

pub mod binary_rc4;
pub mod cryptoapi;
mod ct;
pub mod data_stream;
pub mod rc4;
pub mod xor;

pub use cryptoapi::HashAlg;
pub use data_stream::DecryptingReader;

/// The well-known default password of the binary Office family. Writers apply it
/// when the user protects a document without choosing a password, so readers try
/// it before reporting a password failure.
pub const DEFAULT_PASSWORD: &str = "VelvetSweatshop";

/// Cipher-chunk size used by the Word binary format (the RC4 schemes re-key
/// every 512 bytes of protected stream).
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Errors from key-material parsing, key derivation and password verification.
///
/// A wrong password is *not* an error: [`Decryptor::verify_password`] reports it
/// as `Ok(false)` so callers can distinguish "verification ran and said no" from
/// an operational failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OffcryptoError {
    #[error("truncated key material while reading {context}")]
    Truncated { context: &'static str },
    #[error("unsupported EncryptionInfo version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("decryption requested before password verification")]
    KeyNotVerified,
}

pub(crate) fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parsed `EncryptionVersionInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionVersionInfo {
    pub major: u16,
    pub minor: u16,
}

/// Parsed key material from a document's table stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionInfo {
    /// XOR obfuscation method 1; the table stream leads with the key/verifier pair.
    XorObfuscation { key: u16, verifier: u16 },
    /// Office binary RC4 (`EncryptionInfo` version 1.1).
    BinaryRc4(binary_rc4::BinaryRc4KeyMaterial),
    /// RC4 CryptoAPI (`EncryptionInfo` versions 2.2, 3.2, 4.2).
    Rc4CryptoApi {
        version: EncryptionVersionInfo,
        header: cryptoapi::EncryptionHeader,
        verifier: cryptoapi::EncryptionVerifier,
    },
}

impl EncryptionInfo {
    /// Parse key material read from the table stream.
    ///
    /// `force_xor` reflects the document header's obfuscation flag: when set, the
    /// material is the XOR key/verifier pair and no version dispatch happens.
    /// Otherwise the leading `EncryptionVersionInfo` selects the scheme; versions
    /// this crate does not understand fail with
    /// [`OffcryptoError::UnsupportedVersion`] rather than guessing.
    pub fn parse(key_material: &[u8], force_xor: bool) -> Result<Self, OffcryptoError> {
        if force_xor {
            let key = read_u16_le(key_material, 0).ok_or(OffcryptoError::Truncated {
                context: "XOR obfuscation key",
            })?;
            let verifier = read_u16_le(key_material, 2).ok_or(OffcryptoError::Truncated {
                context: "XOR obfuscation verifier",
            })?;
            return Ok(EncryptionInfo::XorObfuscation { key, verifier });
        }

        let major = read_u16_le(key_material, 0).ok_or(OffcryptoError::Truncated {
            context: "EncryptionVersionInfo.major",
        })?;
        let minor = read_u16_le(key_material, 2).ok_or(OffcryptoError::Truncated {
            context: "EncryptionVersionInfo.minor",
        })?;

        match (major, minor) {
            (1, 1) => Ok(EncryptionInfo::BinaryRc4(binary_rc4::parse_key_material(
                key_material,
            )?)),
            (2..=4, 2) => {
                let (header, verifier) = cryptoapi::parse_key_material(key_material)?;
                Ok(EncryptionInfo::Rc4CryptoApi {
                    version: EncryptionVersionInfo { major, minor },
                    header,
                    verifier,
                })
            }
            _ => Err(OffcryptoError::UnsupportedVersion { major, minor }),
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            EncryptionInfo::XorObfuscation { .. } => "XOR obfuscation",
            EncryptionInfo::BinaryRc4(_) => "binary RC4",
            EncryptionInfo::Rc4CryptoApi { .. } => "RC4 CryptoAPI",
        }
    }
}

/// Verified session key material, derived from the password on successful
/// verification.
#[derive(Clone)]
pub(crate) enum SessionKey {
    Xor(Zeroizing<[u8; 16]>),
    BinaryRc4 { base: Zeroizing<[u8; 5]> },
    CryptoApi {
        base: Zeroizing<Vec<u8>>,
        hash_alg: HashAlg,
        key_len: usize,
    },
}

impl SessionKey {
    pub(crate) fn rc4_key_for_block(&self, block: u32) -> Result<Zeroizing<Vec<u8>>, OffcryptoError> {
        match self {
            // The XOR transform is positional, not block-keyed; the reader never
            // asks for block keys on that path.
            SessionKey::Xor(_) => Err(OffcryptoError::InvalidKeyMaterial(
                "XOR obfuscation has no block keys".to_string(),
            )),
            SessionKey::BinaryRc4 { base } => Ok(Zeroizing::new(
                binary_rc4::key_for_block(base, block).to_vec(),
            )),
            SessionKey::CryptoApi {
                base,
                hash_alg,
                key_len,
            } => cryptoapi::key_for_block(*hash_alg, base, block, *key_len),
        }
    }
}

/// Decryption capability for one protected document.
///
/// Construct from parsed [`EncryptionInfo`], configure the cipher-chunk size,
/// verify a password, then open decrypting readers over the protected streams.
pub struct Decryptor {
    info: EncryptionInfo,
    chunk_size: usize,
    key: Option<SessionKey>,
}

impl Clone for Decryptor {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            chunk_size: self.chunk_size,
            key: self.key.clone(),
        }
    }
}

impl std::fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Session key material is deliberately not printed.
        f.debug_struct("Decryptor")
            .field("scheme", &self.info.scheme_name())
            .field("chunk_size", &self.chunk_size)
            .field("verified", &self.key.is_some())
            .finish()
    }
}

impl Decryptor {
    pub fn new(info: EncryptionInfo) -> Self {
        Self {
            info,
            chunk_size: DEFAULT_CHUNK_SIZE,
            key: None,
        }
    }

    pub fn info(&self) -> &EncryptionInfo {
        &self.info
    }

    /// Set the cipher-chunk size (the RC4 re-key interval). Must be non-zero.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        assert!(chunk_size > 0, "cipher chunk size must be non-zero");
        self.chunk_size = chunk_size;
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_verified(&self) -> bool {
        self.key.is_some()
    }

    /// Verify a candidate password against the key material.
    ///
    /// `Ok(true)` stores the derived session key; `Ok(false)` means verification
    /// ran and the password does not match; `Err(_)` is an operational failure
    /// (malformed key material, unsupported algorithm) and says nothing about
    /// the password.
    pub fn verify_password(&mut self, password: &str) -> Result<bool, OffcryptoError> {
        match &self.info {
            EncryptionInfo::XorObfuscation { key, verifier } => {
                let matches = xor::create_xor_key_method1(password) == *key
                    && xor::create_xor_verifier_method1(password) == *verifier;
                if matches {
                    self.key = Some(SessionKey::Xor(Zeroizing::new(
                        xor::create_xor_array_method1(password),
                    )));
                }
                Ok(matches)
            }
            EncryptionInfo::BinaryRc4(material) => {
                let base = binary_rc4::derive_key_base(password, &material.salt);
                let matches = binary_rc4::verify_password(material, &base)?;
                if matches {
                    self.key = Some(SessionKey::BinaryRc4 { base });
                }
                Ok(matches)
            }
            EncryptionInfo::Rc4CryptoApi {
                header, verifier, ..
            } => {
                if header.alg_id != cryptoapi::CALG_RC4 {
                    return Err(OffcryptoError::UnsupportedAlgorithm(format!(
                        "algId=0x{:08X}",
                        header.alg_id
                    )));
                }
                let hash_alg = HashAlg::from_alg_id_hash(header.alg_id_hash)?;
                let key_size_bits = cryptoapi::normalize_rc4_key_size_bits(header.key_size_bits);
                if key_size_bits % 8 != 0 {
                    return Err(OffcryptoError::InvalidKeyMaterial(format!(
                        "keySize {key_size_bits} bits is not a whole number of bytes"
                    )));
                }
                let key_len = (key_size_bits / 8) as usize;

                let base = cryptoapi::derive_base_hash(hash_alg, password, &verifier.salt);
                let matches = cryptoapi::verify_password(hash_alg, &base, key_len, verifier)?;
                if matches {
                    self.key = Some(SessionKey::CryptoApi {
                        base,
                        hash_alg,
                        key_len,
                    });
                }
                Ok(matches)
            }
        }
    }

    /// Open a decrypting reader over a protected stream.
    ///
    /// `total_size` is the protected stream's size (reads are capped to it);
    /// `start_offset` is the cipher position of the source's first byte, for
    /// sources that do not begin at stream offset 0. Fails with
    /// [`OffcryptoError::KeyNotVerified`] until a password has been verified.
    pub fn data_stream<R: Read>(
        &self,
        inner: R,
        total_size: u64,
        start_offset: u64,
    ) -> Result<DecryptingReader<R>, OffcryptoError> {
        let key = self.key.clone().ok_or(OffcryptoError::KeyNotVerified)?;
        Ok(DecryptingReader::new(
            inner,
            key,
            self.chunk_size as u64,
            total_size,
            start_offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parse_forced_xor_reads_key_and_verifier() {
        let material = [0x34, 0x12, 0x78, 0x56, 0xAA, 0xBB];
        let info = EncryptionInfo::parse(&material, true).expect("parse");
        assert_eq!(
            info,
            EncryptionInfo::XorObfuscation {
                key: 0x1234,
                verifier: 0x5678
            }
        );
    }

    #[test]
    fn parse_forced_xor_rejects_truncated_material() {
        let err = EncryptionInfo::parse(&[0x34, 0x12, 0x78], true).expect_err("short");
        assert!(matches!(err, OffcryptoError::Truncated { .. }));
    }

    #[test]
    fn parse_dispatches_version_1_1_to_binary_rc4() {
        let mut material = vec![0x01, 0x00, 0x01, 0x00];
        material.extend_from_slice(&[0u8; 48]);
        let info = EncryptionInfo::parse(&material, false).expect("parse");
        assert!(matches!(info, EncryptionInfo::BinaryRc4(_)));
    }

    #[test]
    fn parse_rejects_unknown_versions() {
        for (major, minor) in [(4u16, 4u16), (5, 2), (0, 0), (1, 2)] {
            let mut material = Vec::new();
            material.extend_from_slice(&major.to_le_bytes());
            material.extend_from_slice(&minor.to_le_bytes());
            material.extend_from_slice(&[0u8; 64]);
            let err = EncryptionInfo::parse(&material, false).expect_err("unknown version");
            assert_eq!(err, OffcryptoError::UnsupportedVersion { major, minor });
        }
    }

    #[test]
    fn xor_decryptor_verifies_and_rejects_passwords() {
        let key = xor::create_xor_key_method1("Example");
        let verifier = xor::create_xor_verifier_method1("Example");
        let mut decryptor = Decryptor::new(EncryptionInfo::XorObfuscation { key, verifier });

        assert!(!decryptor.verify_password("wrong").expect("verify"));
        assert!(!decryptor.is_verified());
        assert!(decryptor.verify_password("Example").expect("verify"));
        assert!(decryptor.is_verified());
    }

    #[test]
    fn data_stream_requires_a_verified_key() {
        let key = xor::create_xor_key_method1("Example");
        let verifier = xor::create_xor_verifier_method1("Example");
        let decryptor = Decryptor::new(EncryptionInfo::XorObfuscation { key, verifier });

        let err = decryptor
            .data_stream(Cursor::new(vec![0u8; 4]), 4, 0)
            .expect_err("unverified");
        assert_eq!(err, OffcryptoError::KeyNotVerified);
    }

    #[test]
    fn xor_data_stream_round_trips_with_plain_prefix() {
        let mut decryptor = Decryptor::new(EncryptionInfo::XorObfuscation {
            key: xor::create_xor_key_method1("Example"),
            verifier: xor::create_xor_verifier_method1("Example"),
        });
        assert!(decryptor.verify_password("Example").expect("verify"));

        let array = xor::create_xor_array_method1("Example");
        let plain: Vec<u8> = (0u32..800).map(|i| (i % 256) as u8).collect();
        let mut stream = plain.clone();
        xor::encrypt_in_place(&mut stream[68..], &array, 68);

        let mut reader = decryptor
            .data_stream(Cursor::new(&stream), stream.len() as u64, 0)
            .expect("data stream");
        let mut head = [0u8; 68];
        reader.read_plain(&mut head).expect("plain prefix");
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).expect("decrypt");

        assert_eq!(&head[..], &plain[..68]);
        assert_eq!(tail, &plain[68..]);
    }

    #[test]
    fn chunk_size_is_configurable() {
        let mut decryptor = Decryptor::new(EncryptionInfo::XorObfuscation {
            key: 0,
            verifier: 0,
        });
        assert_eq!(decryptor.chunk_size(), DEFAULT_CHUNK_SIZE);
        decryptor.set_chunk_size(1024);
        assert_eq!(decryptor.chunk_size(), 1024);
    }
}
