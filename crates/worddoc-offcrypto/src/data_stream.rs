//! Chunked decrypting reader over a ciphertext-bearing byte source.
//!
//! The protected streams of a binary document are decrypted in fixed-size cipher
//! chunks (512 bytes for the Word family): the RC4 schemes re-key at every chunk
//! boundary, and the XOR scheme indexes its obfuscation array by absolute stream
//! offset. A leading span of the stream may be plaintext even when the remainder
//! is encrypted; [`DecryptingReader::read_plain`] passes those bytes through
//! verbatim while still advancing the cipher position, so a later switch to
//! decrypting reads picks up the keystream at the right offset.

use std::fmt;
use std::io::{self, Read};

use zeroize::Zeroize;

use crate::rc4::Rc4;
use crate::{xor, SessionKey};

pub struct DecryptingReader<R> {
    inner: R,
    key: SessionKey,
    chunk_size: u64,
    /// Cipher position of the first byte of `inner` within the protected stream.
    start_offset: u64,
    /// Total number of readable bytes (the protected stream's size).
    total_size: u64,
    /// Bytes consumed so far (plain or decrypted).
    pos: u64,
    rc4: Option<Rc4State>,
}

struct Rc4State {
    cipher: Rc4,
    block: u32,
    offset_in_block: u64,
}

impl<R> fmt::Debug for DecryptingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material is deliberately not printed.
        f.debug_struct("DecryptingReader")
            .field("chunk_size", &self.chunk_size)
            .field("start_offset", &self.start_offset)
            .field("total_size", &self.total_size)
            .field("pos", &self.pos)
            .finish()
    }
}

impl<R: Read> DecryptingReader<R> {
    pub(crate) fn new(
        inner: R,
        key: SessionKey,
        chunk_size: u64,
        total_size: u64,
        start_offset: u64,
    ) -> Self {
        Self {
            inner,
            key,
            chunk_size,
            start_offset,
            total_size,
            pos: 0,
            rc4: None,
        }
    }

    /// Number of bytes consumed so far, plaintext passthrough included.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read exactly `buf.len()` bytes without decrypting them.
    ///
    /// The cipher position still advances, so bytes read afterwards are
    /// decrypted as if the plain span had been part of the cipher stream.
    pub fn read_plain(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = self.pos.checked_add(buf.len() as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "plaintext prefix overflows")
        })?;
        if end > self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "plaintext prefix extends past the end of the stream",
            ));
        }
        self.inner.read_exact(buf)?;
        self.pos = end;
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> io::Result<()> {
        if let SessionKey::Xor(array) = &self.key {
            let abs = usize::try_from(self.start_offset + self.pos)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "stream too large"))?;
            xor::decrypt_in_place(data, array, abs);
            return Ok(());
        }

        let mut done = 0usize;
        while done < data.len() {
            let abs = self.start_offset + self.pos + done as u64;
            let block = u32::try_from(abs / self.chunk_size).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "cipher block index overflows")
            })?;
            let in_block = abs % self.chunk_size;
            self.align(block, in_block)?;

            let take = usize::try_from(self.chunk_size - in_block)
                .unwrap_or(usize::MAX)
                .min(data.len() - done);
            let state = self.rc4.as_mut().expect("aligned above");
            state.cipher.apply_keystream(&mut data[done..done + take]);
            state.offset_in_block += take as u64;
            done += take;
        }
        Ok(())
    }

    /// Ensure the RC4 state matches `(block, in_block)`, re-keying and
    /// discarding keystream as needed.
    fn align(&mut self, block: u32, in_block: u64) -> io::Result<()> {
        if matches!(&self.rc4, Some(s) if s.block == block && s.offset_in_block == in_block) {
            return Ok(());
        }

        let key = self.key.rc4_key_for_block(block).map_err(|err| {
            io::Error::new(io::ErrorKind::InvalidData, format!("key derivation: {err}"))
        })?;
        let mut cipher = Rc4::new(&key[..]);
        cipher.discard(usize::try_from(in_block).unwrap_or(usize::MAX));

        if let Some(old) = &mut self.rc4 {
            old.cipher.zeroize();
        }
        self.rc4 = Some(Rc4State {
            cipher,
            block,
            offset_in_block: in_block,
        });
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.total_size.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        if n > 0 {
            self.decrypt(&mut buf[..n])?;
            self.pos += n as u64;
        }
        Ok(n)
    }
}

impl<R> Drop for DecryptingReader<R> {
    fn drop(&mut self) {
        if let Some(state) = &mut self.rc4 {
            state.cipher.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{binary_rc4, Decryptor, EncryptionInfo};

    const SALT: [u8; 16] = [7u8; 16];

    /// Key material + decryptor for a binary RC4 document protected with `password`.
    fn verified_decryptor(password: &str) -> Decryptor {
        let verifier: [u8; 16] = [0x11; 16];
        let verifier_hash: [u8; 16] = {
            use md5::{Digest as _, Md5};
            Md5::digest(verifier).into()
        };
        let base = binary_rc4::derive_key_base(password, &SALT);
        let key = binary_rc4::key_for_block(&base, 0);
        let mut rc4 = Rc4::new(&key[..]);
        let mut encrypted_verifier = verifier;
        rc4.apply_keystream(&mut encrypted_verifier);
        let mut encrypted_verifier_hash = verifier_hash;
        rc4.apply_keystream(&mut encrypted_verifier_hash);

        let mut bytes = vec![0x01, 0x00, 0x01, 0x00];
        bytes.extend_from_slice(&SALT);
        bytes.extend_from_slice(&encrypted_verifier);
        bytes.extend_from_slice(&encrypted_verifier_hash);

        let info = EncryptionInfo::parse(&bytes, false).expect("parse");
        let mut decryptor = Decryptor::new(info);
        assert!(decryptor.verify_password(password).expect("verify"));
        decryptor
    }

    /// Encrypt `plain` with RC4 per-chunk keys starting at stream offset 0.
    ///
    /// RC4 is an XOR keystream, so running the decrypting reader over plaintext
    /// yields the ciphertext.
    fn encrypt(decryptor: &Decryptor, plain: &[u8]) -> Vec<u8> {
        let mut reader = decryptor
            .data_stream(Cursor::new(plain), plain.len() as u64, 0)
            .expect("data stream");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("encrypt");
        out
    }

    #[test]
    fn decrypts_across_chunk_boundaries() {
        let decryptor = verified_decryptor("pw");
        let plain: Vec<u8> = (0u32..1500).map(|i| (i % 251) as u8).collect();
        let cipher = encrypt(&decryptor, &plain);
        assert_ne!(cipher, plain);

        let mut reader = decryptor
            .data_stream(Cursor::new(&cipher), cipher.len() as u64, 0)
            .expect("data stream");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("decrypt");
        assert_eq!(out, plain);
    }

    #[test]
    fn read_plain_prefix_keeps_the_keystream_aligned() {
        let decryptor = verified_decryptor("pw");

        // First 68 bytes stay plaintext; the rest is encrypted at its absolute
        // stream offset (keystream positions 68..).
        let mut stream: Vec<u8> = (0u32..1200).map(|i| (i * 3 % 256) as u8).collect();
        let plain = stream.clone();
        let encrypted_tail = {
            let whole = encrypt(&decryptor, &plain);
            whole[68..].to_vec()
        };
        stream[68..].copy_from_slice(&encrypted_tail);

        let mut reader = decryptor
            .data_stream(Cursor::new(&stream), stream.len() as u64, 0)
            .expect("data stream");
        let mut head = [0u8; 68];
        reader.read_plain(&mut head).expect("read_plain");
        assert_eq!(&head[..], &plain[..68]);
        assert_eq!(reader.position(), 68);

        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).expect("decrypt tail");
        assert_eq!(tail, &plain[68..]);
    }

    #[test]
    fn reads_are_capped_at_total_size() {
        let decryptor = verified_decryptor("pw");
        let plain = vec![0xABu8; 600];
        let cipher = encrypt(&decryptor, &plain);

        // The source holds 600 bytes, but the reader is sized to 100.
        let mut reader = decryptor
            .data_stream(Cursor::new(&cipher), 100, 0)
            .expect("data stream");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out.len(), 100);
        assert_eq!(out, &plain[..100]);
    }

    #[test]
    fn read_plain_past_the_end_is_an_error() {
        let decryptor = verified_decryptor("pw");
        let mut reader = decryptor
            .data_stream(Cursor::new(vec![0u8; 10]), 10, 0)
            .expect("data stream");
        let mut buf = [0u8; 11];
        let err = reader.read_plain(&mut buf).expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn split_reads_match_one_shot_reads() {
        let decryptor = verified_decryptor("pw");
        let plain: Vec<u8> = (0u32..2048).map(|i| (i * 13 % 256) as u8).collect();
        let cipher = encrypt(&decryptor, &plain);

        let mut reader = decryptor
            .data_stream(Cursor::new(&cipher), cipher.len() as u64, 0)
            .expect("data stream");
        let mut out = vec![0u8; plain.len()];
        // Odd-sized reads straddling the 512-byte rekey boundary.
        let mut done = 0;
        for step in [1usize, 7, 500, 512, 300, 728] {
            let end = (done + step).min(out.len());
            reader.read_exact(&mut out[done..end]).expect("read chunk");
            done = end;
        }
        assert_eq!(done, plain.len());
        assert_eq!(out, plain);
    }
}
