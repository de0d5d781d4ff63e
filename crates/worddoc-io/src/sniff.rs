//! Rejection of non-compound-file inputs that commonly masquerade as `.doc`.
//!
//! RTF and PDF files are routinely handed around with a `.doc` extension; both
//! are recognizable from their first bytes. The check peeks without consuming:
//! the source is rewound to its starting position so the compound-file parser
//! (or any fallback path) sees the stream from byte 0.

use std::io::{Read, Seek, SeekFrom};

use crate::{DocError, ForeignFormat};

const RTF_SIGNATURE: &[u8] = b"{\\rtf";
const PDF_SIGNATURE: &[u8] = b"%PDF";
const PEEK_LEN: usize = 6;

/// Peek at the leading bytes of `reader` and fail with
/// [`DocError::WrongFormat`] if they identify a foreign format.
///
/// On return (success or failure) the reader is positioned where it started.
pub(crate) fn check_leading_bytes<R: Read + Seek>(reader: &mut R) -> Result<(), DocError> {
    let start = reader.stream_position()?;

    let mut first = [0u8; PEEK_LEN];
    let mut filled = 0usize;
    while filled < PEEK_LEN {
        let n = reader.read(&mut first[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.seek(SeekFrom::Start(start))?;

    let first = &first[..filled];
    if first.starts_with(RTF_SIGNATURE) {
        return Err(DocError::WrongFormat(ForeignFormat::Rtf));
    }
    if first.starts_with(PDF_SIGNATURE) {
        return Err(DocError::WrongFormat(ForeignFormat::Pdf));
    }
    Ok(())
}
