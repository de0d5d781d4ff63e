//! The document loading session: compound-file access, encryption detection,
//! and byte-range reads for the document-model layer.

use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use log::{debug, warn};
use zeroize::Zeroizing;

use worddoc_offcrypto::{Decryptor, EncryptionInfo, DEFAULT_PASSWORD};

use crate::fib::FibBase;
use crate::password::PasswordProvider;
use crate::sniff;
use crate::{DocError, FIB_BASE_LEN, WORD_DOCUMENT_STREAM};

/// RC4 re-key interval of the Word binary format.
const CIPHER_CHUNK_SIZE: usize = 512;

/// One document-loading session.
///
/// Owns the compound file and the decoded FIB base. The encryption context is
/// built lazily on the first byte-range read that asks for decryption, then
/// memoized: constructing it costs a full pass over the key-material stream and
/// a password verification, and both are idempotent for the session.
pub struct Session<F> {
    ole: cfb::CompoundFile<F>,
    fib: FibBase,
    passwords: Arc<dyn PasswordProvider>,
    /// `None` until first needed, then `Some(None)` for unencrypted documents
    /// or `Some(Some(_))` once a password has been verified.
    encryption: Option<Option<EncryptionContext>>,
}

struct EncryptionContext {
    decryptor: Decryptor,
}

impl<F> std::fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("n_fib", &self.fib.n_fib)
            .field("encrypted", &self.fib.f_encrypted)
            .field(
                "encryption_resolved",
                &self.encryption.as_ref().map(Option::is_some),
            )
            .finish()
    }
}

/// Look up a named stream entry, mapping "no such entry" (and non-stream
/// entries, e.g. a storage of the same name) to [`DocError::StreamNotFound`].
fn stream_entry<F: Read + Seek>(
    ole: &cfb::CompoundFile<F>,
    name: &str,
) -> Result<cfb::Entry, DocError> {
    let entry = ole
        .entry(name)
        .map_err(|_| DocError::StreamNotFound(name.to_string()))?;
    if !entry.is_stream() {
        return Err(DocError::StreamNotFound(name.to_string()));
    }
    Ok(entry)
}

fn read_stream_bounded<F: Read + Seek>(
    ole: &mut cfb::CompoundFile<F>,
    name: &str,
    max_len: Option<usize>,
) -> Result<Vec<u8>, DocError> {
    let size = stream_entry(ole, name)?.len();
    let cap = match max_len {
        Some(m) => (m as u64).min(size),
        None => size,
    };
    let stream = ole.open_stream(name)?;
    let mut out = Vec::with_capacity(usize::try_from(cap).unwrap_or(0));
    stream.take(cap).read_to_end(&mut out)?;
    Ok(out)
}

impl<F: Read + Seek> Session<F> {
    /// Open a loading session over a byte source holding a compound file.
    ///
    /// Sniffs the leading bytes first (RTF/PDF inputs fail with
    /// [`DocError::WrongFormat`] and leave the source positioned at its start),
    /// then opens the container and probes the raw FIB base. The encryption
    /// context is *not* built here; see [`Session::read_range`].
    pub fn open(mut reader: F, passwords: Arc<dyn PasswordProvider>) -> Result<Self, DocError> {
        sniff::check_leading_bytes(&mut reader)?;
        let mut ole = cfb::CompoundFile::open(reader)?;

        let head = read_stream_bounded(&mut ole, WORD_DOCUMENT_STREAM, Some(FIB_BASE_LEN))?;
        let fib = FibBase::parse(&head)?;
        if !fib.has_word_ident() {
            warn!(
                "unexpected FIB ident 0x{:04X} in `{}`; continuing",
                fib.w_ident, WORD_DOCUMENT_STREAM
            );
        }
        debug!(
            "opened document session: nFib=0x{:04X} encrypted={} obfuscated={}",
            fib.n_fib, fib.f_encrypted, fib.f_obfuscated
        );

        Ok(Session {
            ole,
            fib,
            passwords,
            encryption: None,
        })
    }

    /// The decoded FIB base (read-only header record).
    pub fn fib(&self) -> &FibBase {
        &self.fib
    }

    pub fn is_encrypted(&self) -> bool {
        self.fib.f_encrypted
    }

    pub fn has_stream(&self, name: &str) -> bool {
        stream_entry(&self.ole, name).is_ok()
    }

    /// Size of a named stream from container metadata.
    pub fn stream_size(&self, name: &str) -> Result<u64, DocError> {
        Ok(stream_entry(&self.ole, name)?.len())
    }

    /// Read a byte range from a named stream.
    ///
    /// - `plain_prefix: None` copies bytes verbatim, whether or not the
    ///   document is encrypted; no cryptographic code runs on this path.
    /// - `plain_prefix: Some(p)` decrypts the stream, passing the first `p`
    ///   bytes through unmodified (the never-encrypted leading span). For an
    ///   unencrypted document this degrades to a verbatim copy.
    /// - `max_len: Some(n)` caps the output at `n` bytes; `None` reads to the
    ///   end of the stream. The output length is always
    ///   `min(max_len, stream size)`.
    ///
    /// The first decrypting read of a session builds the encryption context:
    /// key material is read from the table stream, the scheme is selected, and
    /// the configured password (or the format's default) is verified. A
    /// mismatch fails with [`DocError::WrongPassword`]; operational
    /// verification failures with [`DocError::Verification`].
    pub fn read_range(
        &mut self,
        stream_name: &str,
        plain_prefix: Option<usize>,
        max_len: Option<usize>,
    ) -> Result<Vec<u8>, DocError> {
        if plain_prefix.is_some() {
            self.resolve_encryption()?;
        }
        let encrypted = matches!(self.encryption, Some(Some(_)));

        let size = usize::try_from(self.stream_size(stream_name)?).map_err(|_| {
            DocError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "stream too large for this platform",
            ))
        })?;
        let cap = max_len.map_or(size, |m| m.min(size));

        if plain_prefix.is_none() || !encrypted {
            return read_stream_bounded(&mut self.ole, stream_name, Some(cap));
        }

        // Ciphertext for the whole stream; the decrypting reader is positioned
        // at stream offset 0 and sized to the stream's total length.
        let raw = read_stream_bounded(&mut self.ole, stream_name, None)?;
        let context = self
            .encryption
            .as_ref()
            .and_then(|resolved| resolved.as_ref())
            .expect("encryption context resolved above");
        let prefix = plain_prefix.unwrap_or(0).min(cap);

        let mut reader = context
            .decryptor
            .data_stream(Cursor::new(&raw), size as u64, 0)?;
        let mut out = vec![0u8; cap];
        if prefix > 0 {
            reader.read_plain(&mut out[..prefix])?;
        }
        reader.read_exact(&mut out[prefix..])?;
        Ok(out)
    }

    fn resolve_encryption(&mut self) -> Result<(), DocError> {
        if self.encryption.is_none() {
            let context = self.build_encryption_context()?;
            self.encryption = Some(context);
        }
        Ok(())
    }

    /// Build the decryption context from the table stream's key material.
    ///
    /// "Not encrypted" is a valid terminal outcome, not an error. Runs at most
    /// once per session; [`Session::read_range`] memoizes the result.
    fn build_encryption_context(&mut self) -> Result<Option<EncryptionContext>, DocError> {
        if !self.fib.f_encrypted {
            return Ok(None);
        }

        let table_name = self.fib.table_stream_name();
        // The key-material length field doubles as the XOR key/verifier pair
        // for obfuscated documents; the read stays bounded by the stream size
        // either way, and the XOR parser only needs the first 4 bytes.
        let l_key = self.fib.l_key as usize;
        let key_material = read_stream_bounded(&mut self.ole, table_name, Some(l_key))?;

        let info = EncryptionInfo::parse(&key_material, self.fib.f_obfuscated)?;
        debug!(
            "encrypted document: {} key material in `{table_name}`",
            info.scheme_name()
        );

        let mut decryptor = Decryptor::new(info);
        decryptor.set_chunk_size(CIPHER_CHUNK_SIZE);

        // Read the provider now, not at session construction, so a password
        // configured just before this load is honored.
        let configured = self.passwords.current_password().map(Zeroizing::new);
        if configured.is_none() {
            debug!("no password configured; trying the default password");
        }
        let password = configured.unwrap_or_else(|| Zeroizing::new(DEFAULT_PASSWORD.to_string()));

        match decryptor.verify_password(&password) {
            Ok(true) => Ok(Some(EncryptionContext { decryptor })),
            Ok(false) => Err(DocError::WrongPassword),
            Err(err) => Err(DocError::Verification(err)),
        }
    }
}

impl Session<Cursor<Vec<u8>>> {
    /// Open a session over an in-memory document.
    pub fn from_bytes(
        bytes: Vec<u8>,
        passwords: Arc<dyn PasswordProvider>,
    ) -> Result<Self, DocError> {
        Self::open(Cursor::new(bytes), passwords)
    }
}
