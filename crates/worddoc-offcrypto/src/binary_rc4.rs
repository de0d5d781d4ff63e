//! Office binary-document RC4 encryption ([MS-OFFCRYPTO] 2.3.6).
//!
//! Version 1.1 of the key-material descriptor: a 16-byte salt followed by the
//! 16-byte encrypted verifier and the 16-byte encrypted verifier hash. Password
//! hashing is MD5-based with the documented truncate-and-restir construction;
//! the data stream re-keys every cipher chunk with `MD5(base || LE32(block))`.

use md5::{Digest as _, Md5};
use zeroize::{Zeroize, Zeroizing};

use crate::ct::ct_eq;
use crate::rc4::Rc4;
use crate::OffcryptoError;

/// Parsed version-1.1 key material (after the 4-byte `EncryptionVersionInfo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRc4KeyMaterial {
    pub salt: [u8; 16],
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: [u8; 16],
}

fn utf16le_bytes(s: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(s.len().saturating_mul(2)));
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Derive the 5-byte key base ([MS-OFFCRYPTO] 2.3.6.2):
///
/// ```text
/// H0        = MD5(UTF16LE(password))
/// truncated = H0[0..5]
/// H1        = MD5((truncated || salt) repeated 16 times)
/// base      = H1[0..5]
/// ```
pub fn derive_key_base(password: &str, salt: &[u8; 16]) -> Zeroizing<[u8; 5]> {
    let pw_bytes = utf16le_bytes(password);
    let mut h0 = Md5::new().chain_update(&pw_bytes[..]).finalize();
    drop(pw_bytes);

    // 16 repetitions of the truncated digest and the salt: 16 * (5 + 16) bytes.
    let mut intermediate = Zeroizing::new([0u8; 336]);
    for chunk in intermediate.chunks_exact_mut(21) {
        chunk[..5].copy_from_slice(&h0[..5]);
        chunk[5..].copy_from_slice(salt);
    }
    h0.as_mut_slice().zeroize();

    let mut h1 = Md5::new().chain_update(&intermediate[..]).finalize();
    let mut base = Zeroizing::new([0u8; 5]);
    base.copy_from_slice(&h1[..5]);
    h1.as_mut_slice().zeroize();
    base
}

/// Derive the full 16-byte RC4 key for a cipher chunk: `MD5(base || LE32(block))`.
pub fn key_for_block(base: &[u8; 5], block: u32) -> Zeroizing<[u8; 16]> {
    let mut digest = Md5::new()
        .chain_update(base)
        .chain_update(block.to_le_bytes())
        .finalize();
    let mut key = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    key
}

/// Check a candidate password against the verifier fields.
///
/// Decrypts the verifier and its hash with the block-0 key (the two fields share
/// one RC4 keystream) and compares `MD5(verifier)` in constant time.
pub fn verify_password(
    material: &BinaryRc4KeyMaterial,
    base: &[u8; 5],
) -> Result<bool, OffcryptoError> {
    let key = key_for_block(base, 0);
    let mut rc4 = Rc4::new(&key[..]);
    drop(key);

    let mut buf = Zeroizing::new([0u8; 32]);
    buf[..16].copy_from_slice(&material.encrypted_verifier);
    buf[16..].copy_from_slice(&material.encrypted_verifier_hash);
    rc4.apply_keystream(&mut buf[..]);
    rc4.zeroize();

    let mut expected = Md5::new().chain_update(&buf[..16]).finalize();
    let ok = ct_eq(expected.as_slice(), &buf[16..]);
    expected.as_mut_slice().zeroize();
    Ok(ok)
}

pub(crate) fn parse_key_material(bytes: &[u8]) -> Result<BinaryRc4KeyMaterial, OffcryptoError> {
    // 4-byte version prefix + salt + encryptedVerifier + encryptedVerifierHash.
    const EXPECTED_LEN: usize = 4 + 16 + 16 + 16;
    if bytes.len() < EXPECTED_LEN {
        return Err(OffcryptoError::Truncated {
            context: "binary RC4 key material",
        });
    }
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&bytes[4..20]);
    let mut encrypted_verifier = [0u8; 16];
    encrypted_verifier.copy_from_slice(&bytes[20..36]);
    let mut encrypted_verifier_hash = [0u8; 16];
    encrypted_verifier_hash.copy_from_slice(&bytes[36..52]);
    Ok(BinaryRc4KeyMaterial {
        salt,
        encrypted_verifier,
        encrypted_verifier_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; 16] = [
        0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x10, 0x32, 0x54, 0x76, 0x98, 0xBA,
        0xDC, 0xFE,
    ];

    /// Build verifier fields for `password` with the derivation under test, so
    /// that `verify_password` exercises the decrypt-and-compare path end to end.
    fn material_for(password: &str) -> BinaryRc4KeyMaterial {
        let verifier: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ];
        let verifier_hash: [u8; 16] = Md5::digest(verifier).into();

        let base = derive_key_base(password, &SALT);
        let key = key_for_block(&base, 0);
        let mut rc4 = Rc4::new(&key[..]);
        let mut encrypted_verifier = verifier;
        rc4.apply_keystream(&mut encrypted_verifier);
        let mut encrypted_verifier_hash = verifier_hash;
        rc4.apply_keystream(&mut encrypted_verifier_hash);

        BinaryRc4KeyMaterial {
            salt: SALT,
            encrypted_verifier,
            encrypted_verifier_hash,
        }
    }

    #[test]
    fn accepts_the_generating_password() {
        let material = material_for("SecretPassword");
        let base = derive_key_base("SecretPassword", &SALT);
        assert!(verify_password(&material, &base).expect("verify"));
    }

    #[test]
    fn rejects_other_passwords() {
        let material = material_for("SecretPassword");
        for wrong in ["", "secretpassword", "SecretPassword "] {
            let base = derive_key_base(wrong, &SALT);
            assert!(!verify_password(&material, &base).expect("verify"));
        }
    }

    #[test]
    fn block_keys_differ_across_blocks() {
        let base = derive_key_base("SecretPassword", &SALT);
        let k0 = key_for_block(&base, 0);
        let k1 = key_for_block(&base, 1);
        assert_ne!(&k0[..], &k1[..]);
        assert_eq!(&k0[..], &key_for_block(&base, 0)[..]);
    }

    #[test]
    fn key_base_depends_on_salt_and_password() {
        let a = derive_key_base("SecretPassword", &SALT);
        let mut other_salt = SALT;
        other_salt[0] ^= 0xFF;
        let b = derive_key_base("SecretPassword", &other_salt);
        let c = derive_key_base("OtherPassword", &SALT);
        assert_ne!(&a[..], &b[..]);
        assert_ne!(&a[..], &c[..]);
    }

    #[test]
    fn parse_rejects_truncated_material() {
        let err = parse_key_material(&[0u8; 51]).expect_err("should fail");
        assert!(matches!(err, OffcryptoError::Truncated { .. }));
    }

    #[test]
    fn parse_extracts_fields_at_documented_offsets() {
        let mut bytes = vec![0u8; 52];
        bytes[0..4].copy_from_slice(&[0x01, 0x00, 0x01, 0x00]);
        bytes[4..20].copy_from_slice(&SALT);
        bytes[20] = 0xAA;
        bytes[36] = 0xBB;
        let material = parse_key_material(&bytes).expect("parse");
        assert_eq!(material.salt, SALT);
        assert_eq!(material.encrypted_verifier[0], 0xAA);
        assert_eq!(material.encrypted_verifier_hash[0], 0xBB);
    }
}
