use zeroize::Zeroize;

/// Minimal RC4 stream cipher implementation (KSA + PRGA).
///
/// The legacy Office binary encryption schemes use RC4 with per-block keys derived
/// from password material, so the cipher is re-instantiated at every cipher-chunk
/// boundary rather than keyed once for the whole stream.
#[derive(Clone)]
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        assert!(!key.is_empty(), "RC4 key must be non-empty");

        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256u16 {
            let idx = i as usize;
            j = j.wrapping_add(s[idx]).wrapping_add(key[idx % key.len()]);
            s.swap(idx, j as usize);
        }

        Self { s, i: 0, j: 0 }
    }

    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            let k = self.s[idx as usize];
            *b ^= k;
        }
    }

    /// Advance the keystream without producing output.
    ///
    /// Used to position the cipher mid-chunk after a plaintext-passthrough read or
    /// when decryption starts at a non-chunk-aligned stream offset.
    pub fn discard(&mut self, mut n: usize) {
        let mut scratch = [0u8; 64];
        while n > 0 {
            let take = n.min(scratch.len());
            self.apply_keystream(&mut scratch[..take]);
            n -= take;
        }
        scratch.zeroize();
    }
}

impl Zeroize for Rc4 {
    fn zeroize(&mut self) {
        self.s.zeroize();
        self.i.zeroize();
        self.j.zeroize();
    }
}
