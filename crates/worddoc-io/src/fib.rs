//! FIB-base decoding.
//!
//! The `WordDocument` stream leads with the File Information Block. Its fixed
//! 32-byte base carries the document-wide flags this subsystem acts on; the
//! loader reads [`FIB_BASE_LEN`] (68) bytes because the bytes after the base
//! (the `csw` count and the `FibRgW97` head) belong to the same never-encrypted
//! leading span and downstream FIB parsing expects them to be present.
//!
//! Layout ([MS-DOC] 2.5.2, all little-endian):
//!
//! ```text
//! 0  wIdent    2  nFib      4  unused    6  lid       8  pnNext
//! 10 flags     12 nFibBack  14 lKey(u32) 18 envr      19 flags2
//! 20 chs       22 chsTables 24 fcMin(u32)             28 fcMac(u32)
//! ```

use crate::{DocError, FIB_BASE_LEN, TABLE_0_STREAM, TABLE_1_STREAM};

/// `wIdent` of Word 97 and later binary documents.
pub const WORD_97_IDENT: u16 = 0xA5EC;
/// `wIdent` of Word 6.0/95 documents, which share the FIB-base layout.
pub const WORD_6_IDENT: u16 = 0xA5DC;

/// Decoded FIB base. Immutable once parsed; the loading session keeps one for
/// its lifetime and the document model reads it through the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibBase {
    pub w_ident: u16,
    pub n_fib: u16,
    pub lid: u16,
    pub pn_next: u16,

    pub f_dot: bool,
    pub f_glsy: bool,
    pub f_complex: bool,
    pub f_has_pic: bool,
    pub c_quick_saves: u8,
    pub f_encrypted: bool,
    pub f_which_tbl_stm: bool,
    pub f_read_only_recommended: bool,
    pub f_write_reservation: bool,
    pub f_ext_char: bool,
    pub f_load_override: bool,
    pub f_far_east: bool,
    pub f_obfuscated: bool,

    pub n_fib_back: u16,
    /// For obfuscated documents this packs the XOR key/verifier pair; otherwise
    /// it is the size of the key material at the head of the table stream.
    pub l_key: u32,
    pub envr: u8,

    pub f_mac: bool,
    pub f_empty_special: bool,
    pub f_load_override_page: bool,
    pub f_future_saved_undo: bool,
    pub f_word97_saved: bool,

    pub chs: u16,
    pub chs_tables: u16,
    pub fc_min: u32,
    pub fc_mac: u32,
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl FibBase {
    /// Decode the FIB base from the head of the `WordDocument` stream.
    ///
    /// Pure decode of fixed offsets; fails with [`DocError::TruncatedHeader`]
    /// when fewer than [`FIB_BASE_LEN`] bytes are supplied.
    pub fn parse(bytes: &[u8]) -> Result<FibBase, DocError> {
        if bytes.len() < FIB_BASE_LEN {
            return Err(DocError::TruncatedHeader { len: bytes.len() });
        }

        let flags = u16_at(bytes, 10);
        let flags2 = bytes[19];

        Ok(FibBase {
            w_ident: u16_at(bytes, 0),
            n_fib: u16_at(bytes, 2),
            lid: u16_at(bytes, 6),
            pn_next: u16_at(bytes, 8),

            f_dot: flags & 0x0001 != 0,
            f_glsy: flags & 0x0002 != 0,
            f_complex: flags & 0x0004 != 0,
            f_has_pic: flags & 0x0008 != 0,
            c_quick_saves: ((flags >> 4) & 0x0F) as u8,
            f_encrypted: flags & 0x0100 != 0,
            f_which_tbl_stm: flags & 0x0200 != 0,
            f_read_only_recommended: flags & 0x0400 != 0,
            f_write_reservation: flags & 0x0800 != 0,
            f_ext_char: flags & 0x1000 != 0,
            f_load_override: flags & 0x2000 != 0,
            f_far_east: flags & 0x4000 != 0,
            f_obfuscated: flags & 0x8000 != 0,

            n_fib_back: u16_at(bytes, 12),
            l_key: u32_at(bytes, 14),
            envr: bytes[18],

            f_mac: flags2 & 0x01 != 0,
            f_empty_special: flags2 & 0x02 != 0,
            f_load_override_page: flags2 & 0x04 != 0,
            f_future_saved_undo: flags2 & 0x08 != 0,
            f_word97_saved: flags2 & 0x10 != 0,

            chs: u16_at(bytes, 20),
            chs_tables: u16_at(bytes, 22),
            fc_min: u32_at(bytes, 24),
            fc_mac: u32_at(bytes, 28),
        })
    }

    /// Whether `w_ident` is one of the known Word magic values.
    pub fn has_word_ident(&self) -> bool {
        matches!(self.w_ident, WORD_97_IDENT | WORD_6_IDENT)
    }

    /// Name of the table stream carrying this document's tables and, for
    /// encrypted documents, the key material.
    pub fn table_stream_name(&self) -> &'static str {
        if self.f_which_tbl_stm {
            TABLE_1_STREAM
        } else {
            TABLE_0_STREAM
        }
    }
}
