//! RC4 CryptoAPI encryption ([MS-OFFCRYPTO] 2.3.5).
//!
//! Key-material descriptor versions 2.2, 3.2 and 4.2: `EncryptionVersionInfo`,
//! flags, a length-prefixed `EncryptionHeader` (algorithm ids, key size, CSP
//! name) and an `EncryptionVerifier`. The base hash is `Hash(salt || password)`
//! with no spin loop; per-chunk RC4 keys are `Hash(base || LE32(block))`
//! truncated to `keySize / 8` bytes.

use md5::Md5;
use sha1::{Digest as _, Sha1};
use zeroize::{Zeroize, Zeroizing};

use crate::ct::ct_eq;
use crate::rc4::Rc4;
use crate::{read_u32_le, OffcryptoError};

// CryptoAPI ALG_ID values (WinCrypt.h).
pub const CALG_RC4: u32 = 0x0000_6801;
pub const CALG_MD5: u32 = 0x0000_8003;
pub const CALG_SHA1: u32 = 0x0000_8004;

// EncryptionHeader is 32 bytes of fixed fields plus an optional CSP name.
// Cap it so malformed files cannot request unbounded allocations.
const MAX_ENCRYPTION_HEADER_SIZE: usize = 4096;
const MAX_SALT_SIZE: usize = 64;
const MAX_VERIFIER_HASH_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Md5,
}

impl HashAlg {
    pub fn from_alg_id_hash(alg_id_hash: u32) -> Result<Self, OffcryptoError> {
        match alg_id_hash {
            CALG_SHA1 => Ok(Self::Sha1),
            CALG_MD5 => Ok(Self::Md5),
            other => Err(OffcryptoError::UnsupportedAlgorithm(format!(
                "algIdHash=0x{other:08X}"
            ))),
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Md5 => 16,
        }
    }

    fn hash2(self, a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Sha1 => {
                let mut digest = Sha1::new().chain_update(a).chain_update(b).finalize();
                let out = Zeroizing::new(digest.to_vec());
                digest.as_mut_slice().zeroize();
                out
            }
            Self::Md5 => {
                let mut digest = Md5::new().chain_update(a).chain_update(b).finalize();
                let out = Zeroizing::new(digest.to_vec());
                digest.as_mut_slice().zeroize();
                out
            }
        }
    }
}

/// Parsed CryptoAPI `EncryptionHeader` ([MS-OFFCRYPTO] 2.3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionHeader {
    pub flags: u32,
    pub alg_id: u32,
    pub alg_id_hash: u32,
    pub key_size_bits: u32,
    pub provider_type: u32,
    pub csp_name: Option<String>,
}

/// Parsed CryptoAPI `EncryptionVerifier` ([MS-OFFCRYPTO] 2.3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionVerifier {
    pub salt: Vec<u8>,
    pub encrypted_verifier: [u8; 16],
    pub verifier_hash_size: u32,
    pub encrypted_verifier_hash: Vec<u8>,
}

/// Normalize `EncryptionHeader.keySize` (bits): `0` is defined to mean 40-bit RC4.
pub fn normalize_rc4_key_size_bits(key_size_bits: u32) -> u32 {
    if key_size_bits == 0 {
        40
    } else {
        key_size_bits
    }
}

pub(crate) fn parse_encryption_header(bytes: &[u8]) -> Result<EncryptionHeader, OffcryptoError> {
    // Fixed-length header fields are 8 DWORDs:
    //   Flags, SizeExtra, AlgID, AlgIDHash, KeySize, ProviderType, Reserved1,
    //   Reserved2, then a null-terminated UTF-16LE CSPName.
    if bytes.len() < 32 {
        return Err(OffcryptoError::Truncated {
            context: "EncryptionHeader",
        });
    }

    let flags = read_u32_le(bytes, 0).ok_or(OffcryptoError::Truncated {
        context: "EncryptionHeader.Flags",
    })?;
    let alg_id = read_u32_le(bytes, 8).ok_or(OffcryptoError::Truncated {
        context: "EncryptionHeader.AlgID",
    })?;
    let alg_id_hash = read_u32_le(bytes, 12).ok_or(OffcryptoError::Truncated {
        context: "EncryptionHeader.AlgIDHash",
    })?;
    let key_size_bits = read_u32_le(bytes, 16).ok_or(OffcryptoError::Truncated {
        context: "EncryptionHeader.KeySize",
    })?;
    let provider_type = read_u32_le(bytes, 20).ok_or(OffcryptoError::Truncated {
        context: "EncryptionHeader.ProviderType",
    })?;

    let csp_bytes = &bytes[32..];
    let csp_name = if csp_bytes.is_empty() {
        None
    } else {
        let even_len = csp_bytes.len() - csp_bytes.len() % 2;
        let mut units: Vec<u16> = Vec::with_capacity(even_len / 2);
        for chunk in csp_bytes[..even_len].chunks_exact(2) {
            let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Some(String::from_utf16_lossy(&units))
    };

    Ok(EncryptionHeader {
        flags,
        alg_id,
        alg_id_hash,
        key_size_bits,
        provider_type,
        csp_name,
    })
}

pub(crate) fn parse_encryption_verifier(
    bytes: &[u8],
) -> Result<EncryptionVerifier, OffcryptoError> {
    // EncryptionVerifier layout:
    //   DWORD SaltSize;
    //   BYTE  Salt[SaltSize];
    //   BYTE  EncryptedVerifier[16];
    //   DWORD VerifierHashSize;
    //   BYTE  EncryptedVerifierHash[remaining];
    let salt_size = read_u32_le(bytes, 0).ok_or(OffcryptoError::Truncated {
        context: "EncryptionVerifier.SaltSize",
    })? as usize;
    if salt_size > MAX_SALT_SIZE {
        return Err(OffcryptoError::InvalidKeyMaterial(format!(
            "EncryptionVerifier SaltSize {salt_size} exceeds max {MAX_SALT_SIZE}"
        )));
    }

    let salt_end = 4 + salt_size;
    let verifier_end = salt_end + 16;
    let hash_size_end = verifier_end + 4;
    if bytes.len() < hash_size_end {
        return Err(OffcryptoError::Truncated {
            context: "EncryptionVerifier",
        });
    }

    let salt = bytes[4..salt_end].to_vec();
    let mut encrypted_verifier = [0u8; 16];
    encrypted_verifier.copy_from_slice(&bytes[salt_end..verifier_end]);
    let verifier_hash_size = read_u32_le(bytes, verifier_end).ok_or(OffcryptoError::Truncated {
        context: "EncryptionVerifier.VerifierHashSize",
    })?;

    let remaining = &bytes[hash_size_end..];
    if remaining.len() > MAX_VERIFIER_HASH_SIZE {
        return Err(OffcryptoError::InvalidKeyMaterial(format!(
            "EncryptionVerifierHash length {} exceeds max {MAX_VERIFIER_HASH_SIZE}",
            remaining.len()
        )));
    }

    Ok(EncryptionVerifier {
        salt,
        encrypted_verifier,
        verifier_hash_size,
        encrypted_verifier_hash: remaining.to_vec(),
    })
}

/// Parse a CryptoAPI key-material descriptor, starting at `EncryptionVersionInfo`.
pub(crate) fn parse_key_material(
    bytes: &[u8],
) -> Result<(EncryptionHeader, EncryptionVerifier), OffcryptoError> {
    // EncryptionVersionInfo (4) + Flags (4) + HeaderSize (4) + header + verifier.
    let header_size = read_u32_le(bytes, 8).ok_or(OffcryptoError::Truncated {
        context: "EncryptionInfo.HeaderSize",
    })? as usize;
    if header_size > MAX_ENCRYPTION_HEADER_SIZE {
        return Err(OffcryptoError::InvalidKeyMaterial(format!(
            "EncryptionInfo HeaderSize {header_size} exceeds max {MAX_ENCRYPTION_HEADER_SIZE}"
        )));
    }

    let header_start = 12usize;
    let header_end = header_start
        .checked_add(header_size)
        .ok_or(OffcryptoError::Truncated {
            context: "EncryptionInfo header bounds",
        })?;
    let header_bytes = bytes
        .get(header_start..header_end)
        .ok_or(OffcryptoError::Truncated {
            context: "EncryptionHeader",
        })?;

    let header = parse_encryption_header(header_bytes)?;
    let verifier = parse_encryption_verifier(&bytes[header_end..])?;
    Ok((header, verifier))
}

/// Derive the base hash `Hash(salt || UTF16LE(password))`.
///
/// Unlike ECMA-376 Standard/Agile password hashing there is no iteration count;
/// the original CryptoAPI providers feed the salted digest straight into the
/// per-block derivation.
pub fn derive_base_hash(hash_alg: HashAlg, password: &str, salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut pw_bytes = Zeroizing::new(Vec::with_capacity(password.len().saturating_mul(2)));
    for unit in password.encode_utf16() {
        pw_bytes.extend_from_slice(&unit.to_le_bytes());
    }
    hash_alg.hash2(salt, &pw_bytes)
}

/// Derive the RC4 key for a cipher chunk: `Hash(base || LE32(block))[..key_len]`.
///
/// 40-bit keys (`key_len == 5`) are expanded to a 16-byte key blob with the high
/// 88 bits zero; the CryptoAPI providers that produced these files key RC4 with
/// the full blob, which changes the KSA relative to a raw 5-byte key.
pub fn key_for_block(
    hash_alg: HashAlg,
    base: &[u8],
    block: u32,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, OffcryptoError> {
    if key_len == 0 || key_len > hash_alg.digest_len() {
        return Err(OffcryptoError::InvalidKeyMaterial(format!(
            "RC4 key length {key_len} bytes is outside the digest length"
        )));
    }
    let digest = hash_alg.hash2(base, &block.to_le_bytes());
    let mut key = Zeroizing::new(digest[..key_len].to_vec());
    if key_len == 5 {
        key.resize(16, 0);
    }
    Ok(key)
}

/// Check a candidate password against the verifier fields.
///
/// The verifier and its hash are decrypted with one continuous block-0 RC4
/// keystream; the check compares `Hash(verifier)` in constant time.
pub fn verify_password(
    hash_alg: HashAlg,
    base: &[u8],
    key_len: usize,
    verifier: &EncryptionVerifier,
) -> Result<bool, OffcryptoError> {
    let digest_len = hash_alg.digest_len();
    if (verifier.verifier_hash_size as usize) < digest_len
        || verifier.encrypted_verifier_hash.len() < digest_len
    {
        return Err(OffcryptoError::InvalidKeyMaterial(format!(
            "verifier hash too short for digest length {digest_len}"
        )));
    }

    let key = key_for_block(hash_alg, base, 0, key_len)?;
    let mut rc4 = Rc4::new(&key[..]);
    drop(key);

    let mut plain_verifier = Zeroizing::new(verifier.encrypted_verifier);
    rc4.apply_keystream(&mut plain_verifier[..]);
    let mut plain_hash = Zeroizing::new(verifier.encrypted_verifier_hash.clone());
    rc4.apply_keystream(&mut plain_hash);
    rc4.zeroize();

    let expected = hash_alg.hash2(&plain_verifier[..], &[]);
    Ok(ct_eq(&expected[..], &plain_hash[..digest_len]))
}
