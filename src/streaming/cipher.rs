//! AES-256-OFB stream transform.
//!
//! OFB turns the block cipher into a keystream generator, so encryption and
//! decryption are the same XOR and the output length equals the input length.
//!
//! The IV is fixed to 16 zero bytes so the stored objects stay decodable with
//! `openssl enc -d -aes-256-ofb -iv 0 -K <key>`. With a long-lived key every
//! object shares the same keystream, so two ciphertexts XOR to the XOR of
//! their compressed plaintexts. Do not reuse this scheme where that matters.

use crate::config::KEY_LEN;
use crate::error::{Result, TransferError};
use aes::Aes256;
use ofb::cipher::{KeyIvInit, StreamCipher};
use std::io::{self, Read, Write};

type Aes256Ofb = ofb::Ofb<Aes256>;

/// AES block size; also the IV length.
pub const IV_LEN: usize = 16;

/// Scratch buffer used by [`CipherWriter`]
const SCRATCH_SIZE: usize = 16 * 1024;

/// Keystream state for one direction of one stream.
pub struct Cipher {
    inner: Aes256Ofb,
}

impl Cipher {
    /// Build the keystream for `key` with the all-zero IV.
    ///
    /// The key must be exactly 32 bytes; nothing is truncated or padded.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(TransferError::InvalidKeySize {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let iv = [0u8; IV_LEN];
        let inner =
            Aes256Ofb::new_from_slices(key, &iv).map_err(|_| TransferError::InvalidKeySize {
                expected: KEY_LEN,
                actual: key.len(),
            })?;
        Ok(Self { inner })
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

/// Encrypts everything written through it.
pub struct CipherWriter<W: Write> {
    inner: W,
    cipher: Cipher,
    scratch: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(inner: W, cipher: Cipher) -> Self {
        Self {
            inner,
            cipher,
            scratch: Vec::with_capacity(SCRATCH_SIZE),
        }
    }

    /// Flush and hand back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The keystream advances for every byte we accept, so each chunk has
        // to reach the inner writer in full.
        for chunk in buf.chunks(SCRATCH_SIZE) {
            self.scratch.clear();
            self.scratch.extend_from_slice(chunk);
            self.cipher.apply(&mut self.scratch);
            self.inner.write_all(&self.scratch)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts everything read through it.
pub struct CipherReader<R: Read> {
    inner: R,
    cipher: Cipher,
}

impl<R: Read> CipherReader<R> {
    pub fn new(inner: R, cipher: Cipher) -> Self {
        Self { inner, cipher }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply(&mut buf[..n]);
        Ok(n)
    }
}
