//! XOR obfuscation "method 1" ([MS-OFFCRYPTO] 2.3.7).
//!
//! The oldest password protection in the binary Office family: a 16-bit key and a
//! 16-bit verifier derived from the password with fixed lookup tables, plus a
//! 16-byte obfuscation array that is XOR/rotate-combined with the stream bytes.
//! The array index is the absolute stream offset modulo 16, so decryption can
//! start anywhere as long as the caller tracks the offset.

/// Per-password-length seed for the 16-bit obfuscation key ([MS-OFFCRYPTO] 2.3.7.2).
const INITIAL_CODE: [u16; 15] = [
    0xE1F0, 0x1D0F, 0xCC9C, 0x84C0, 0x110C, 0x0E10, 0xF1CE, 0x313E, 0x1872, 0xE139, 0xD40F,
    0x84F9, 0x280C, 0xA96A, 0x4EC3,
];

/// Bit-mixing matrix for the obfuscation key, 7 entries per password character,
/// consumed from the last entry backwards ([MS-OFFCRYPTO] 2.3.7.2).
const XOR_MATRIX: [u16; 105] = [
    0xAEFC, 0x4DD9, 0x9BB2, 0x2745, 0x4E8A, 0x9D14, 0x2A09, // char 1
    0x7B61, 0xF6C2, 0xFDA5, 0xEB6B, 0xC6F7, 0x9DCF, 0x2BBF, // char 2
    0x4563, 0x8AC6, 0x05AD, 0x0B5A, 0x16B4, 0x2D68, 0x5AD0, // char 3
    0x0375, 0x06EA, 0x0DD4, 0x1BA8, 0x3750, 0x6EA0, 0xDD40, // char 4
    0xD849, 0xA0B3, 0x5147, 0xA28E, 0x553D, 0xAA7A, 0x44D5, // char 5
    0x6F45, 0xDE8A, 0xAD35, 0x4A4B, 0x9496, 0x390D, 0x721A, // char 6
    0xEB23, 0xC667, 0x9CEF, 0x29FF, 0x53FE, 0xA7FC, 0x5FD9, // char 7
    0x47D3, 0x8FA6, 0x0F6D, 0x1EDA, 0x3DB4, 0x7B68, 0xF6D0, // char 8
    0xB861, 0x60E3, 0xC1C6, 0x93AD, 0x377B, 0x6EF6, 0xDDEC, // char 9
    0x45A0, 0x8B40, 0x06A1, 0x0D42, 0x1A84, 0x3508, 0x6A10, // char 10
    0xAA51, 0x4483, 0x8906, 0x022D, 0x045A, 0x08B4, 0x1168, // char 11
    0x76B4, 0xED68, 0xCAF1, 0x85C3, 0x1BA7, 0x374E, 0x6E9C, // char 12
    0x3730, 0x6E60, 0xDCC0, 0xA9A3, 0x4A7F, 0x94FE, 0x1D7F, // char 13
    0x2F7C, 0x5EF8, 0xBDF0, 0x69A1, 0xD342, 0xA601, 0x4C25, // char 14
    0xF9CC, 0x3399, 0x6633, 0xCC66, 0x99CC, 0x238D, 0x471A, // char 15
];

/// Pad bytes used to fill the obfuscation array past the password length
/// ([MS-OFFCRYPTO] 2.3.7.2).
const PAD_ARRAY: [u8; 15] = [
    0xBB, 0xFF, 0xFF, 0xBA, 0xFF, 0xFF, 0xB9, 0x80, 0x00, 0xBE, 0x0F, 0x00, 0xBF, 0x0F, 0x00,
];

/// The method-1 algorithms are defined for at most 15 single-byte characters.
const MAX_PASSWORD_LEN: usize = 15;

/// Map a password to the single-byte form the derivation tables operate on,
/// truncated to 15 characters.
fn ansi_password_bytes(password: &str) -> Vec<u8> {
    password
        .chars()
        .take(MAX_PASSWORD_LEN)
        .map(|c| (c as u32 & 0xFF) as u8)
        .collect()
}

fn rotate_left_15_bit(value: u16) -> u16 {
    ((value >> 14) & 0x0001) | ((value << 1) & 0x7FFF)
}

/// Derive the 16-bit obfuscation key ([MS-OFFCRYPTO] 2.3.7.2, `CreateXorKey_Method1`).
pub fn create_xor_key_method1(password: &str) -> u16 {
    let bytes = ansi_password_bytes(password);
    if bytes.is_empty() {
        return 0;
    }

    let mut key = INITIAL_CODE[bytes.len() - 1];
    let mut element = XOR_MATRIX.len();
    for &b in bytes.iter().rev() {
        let mut c = b;
        for _ in 0..7 {
            element -= 1;
            if c & 0x40 != 0 {
                key ^= XOR_MATRIX[element];
            }
            c <<= 1;
        }
    }
    key
}

/// Derive the 16-bit password verifier ([MS-OFFCRYPTO] 2.3.7.1, `CreatePasswordVerifier_Method1`).
pub fn create_xor_verifier_method1(password: &str) -> u16 {
    let bytes = ansi_password_bytes(password);
    let mut verifier: u16 = 0;
    for &b in bytes.iter().rev() {
        verifier = rotate_left_15_bit(verifier);
        verifier ^= u16::from(b);
    }
    if !bytes.is_empty() {
        verifier = rotate_left_15_bit(verifier);
        verifier ^= bytes.len() as u16;
        verifier ^= 0xCE4B;
    }
    verifier
}

fn xor_ror(a: u8, b: u8) -> u8 {
    (a ^ b).rotate_right(1)
}

/// Derive the 16-byte obfuscation array ([MS-OFFCRYPTO] 2.3.7.2, `CreateXorArray_Method1`).
///
/// Each slot combines a password byte (pad bytes past the password length) with
/// the low byte of the obfuscation key at even indices and the high byte at odd
/// indices, rotated right by one bit.
pub fn create_xor_array_method1(password: &str) -> [u8; 16] {
    let bytes = ansi_password_bytes(password);
    let key = create_xor_key_method1(password);
    let key_lo = (key & 0xFF) as u8;
    let key_hi = (key >> 8) as u8;

    let mut array = [0u8; 16];
    for (i, slot) in array.iter_mut().enumerate() {
        let source = if i < bytes.len() {
            bytes[i]
        } else {
            // The tables are defined for 1..=15 characters; the wrap only
            // fires for the degenerate empty password.
            PAD_ARRAY[(i - bytes.len()) % PAD_ARRAY.len()]
        };
        let key_byte = if i % 2 == 1 { key_hi } else { key_lo };
        *slot = xor_ror(source, key_byte);
    }
    array
}

/// Obfuscate `data` in place; `stream_offset` is the absolute offset of
/// `data[0]` within the protected stream ([MS-OFFCRYPTO] 2.3.7.3).
pub fn encrypt_in_place(data: &mut [u8], array: &[u8; 16], stream_offset: usize) {
    for (i, b) in data.iter_mut().enumerate() {
        *b = (*b ^ array[(stream_offset + i) & 0x0F]).rotate_left(5);
    }
}

/// Invert [`encrypt_in_place`] at the same `stream_offset`.
pub fn decrypt_in_place(data: &mut [u8], array: &[u8; 16], stream_offset: usize) {
    for (i, b) in data.iter_mut().enumerate() {
        *b = b.rotate_right(5) ^ array[(stream_offset + i) & 0x0F];
    }
}
