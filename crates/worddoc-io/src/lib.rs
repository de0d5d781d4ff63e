//! Loading support for legacy binary Word documents.
//!
//! A `.doc` file is an OLE compound file whose `WordDocument` stream leads with
//! the File Information Block. This crate opens such a container, probes the
//! FIB base for the document-wide flags (most importantly whether the content
//! streams are encrypted), establishes a decryption context when they are, and
//! exposes byte-range reads that splice an optional plaintext prefix together
//! with decrypted stream bytes.
//!
//! The document model proper (formatting tables, stylesheet, fonts, object
//! pool) is out of scope: it consumes [`Session::read_range`] and
//! [`Session::fib`] and never touches the container or the crypto directly.
//!
//! ```no_run
//! use std::sync::Arc;
//! use worddoc_io::{open_document, PasswordStore, FIB_BASE_LEN, WORD_DOCUMENT_STREAM};
//!
//! # fn main() -> Result<(), worddoc_io::DocError> {
//! let passwords = Arc::new(PasswordStore::new());
//! passwords.set_password(Some("secret"));
//!
//! let mut session = open_document("letter.doc", passwords)?;
//! // The main stream, decrypted past its never-encrypted FIB prefix.
//! let main = session.read_range(WORD_DOCUMENT_STREAM, Some(FIB_BASE_LEN), None)?;
//! # let _ = main;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub mod fib;
pub mod password;
pub mod session;
mod sniff;

pub use fib::FibBase;
pub use password::{NoPassword, PasswordProvider, PasswordStore};
pub use session::Session;
pub use worddoc_offcrypto::{OffcryptoError, DEFAULT_PASSWORD};

/// Main content stream of a binary Word document.
pub const WORD_DOCUMENT_STREAM: &str = "WordDocument";
/// Table stream used when the FIB's `fWhichTblStm` flag is clear.
pub const TABLE_0_STREAM: &str = "0Table";
/// Table stream used when the FIB's `fWhichTblStm` flag is set.
pub const TABLE_1_STREAM: &str = "1Table";
/// Storage holding embedded OLE objects.
pub const OBJECT_POOL_STREAM: &str = "ObjectPool";

/// Number of leading `WordDocument` bytes carrying the FIB base. This span is
/// never encrypted: the flags that say *whether* the document is encrypted
/// live inside it.
pub const FIB_BASE_LEN: usize = 68;

/// A foreign file format detected by the leading-bytes sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignFormat {
    Rtf,
    Pdf,
}

impl fmt::Display for ForeignFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignFormat::Rtf => write!(f, "RTF"),
            ForeignFormat::Pdf => write!(f, "PDF"),
        }
    }
}

/// Errors surfaced by the loading session.
///
/// [`DocError::WrongPassword`] is deliberately distinct from
/// [`DocError::Verification`]: the former means verification ran and reported a
/// mismatch (callers typically re-prompt and retry), the latter that the
/// cryptographic machinery itself failed (malformed key material, unsupported
/// scheme) and retrying with another password is pointless.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("the document is really a {0} file")]
    WrongFormat(ForeignFormat),
    #[error("document stream `{0}` was not found in the compound file")]
    StreamNotFound(String),
    #[error("WordDocument stream too short for the FIB base: expected {FIB_BASE_LEN} bytes, got {len}")]
    TruncatedHeader { len: usize },
    #[error("document is encrypted and the password is invalid")]
    WrongPassword,
    #[error("failed to establish a decryption context: {0}")]
    Verification(#[from] OffcryptoError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Open a document from disk.
pub fn open_document(
    path: impl AsRef<Path>,
    passwords: Arc<dyn PasswordProvider>,
) -> Result<Session<File>, DocError> {
    let file = File::open(path)?;
    Session::open(file, passwords)
}
