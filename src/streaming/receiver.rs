//! Decode stage: wire -> decrypt -> decompress -> sink.

use crate::streaming::cipher::{Cipher, CipherReader};
use crate::streaming::compress::Decompressor;
use std::io::{self, Read, Write};
use tracing::debug;

/// Byte counts for one decode run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    /// Compressed bytes consumed from the wire
    pub bytes_in: u64,
    /// Plaintext bytes written to the sink
    pub bytes_out: u64,
}

/// Receiver state
pub struct Receiver {
    cipher: Option<Cipher>,
}

impl Receiver {
    pub fn new(cipher: Option<Cipher>) -> Self {
        Self { cipher }
    }

    /// Decode `source` into `sink` until the end of the zlib stream.
    ///
    /// Input that ends before the stream footer fails with
    /// [`io::ErrorKind::UnexpectedEof`].
    pub fn run<R, W>(self, source: R, sink: &mut W) -> io::Result<DecodeStats>
    where
        R: Read,
        W: Write + ?Sized,
    {
        let stats = match self.cipher {
            Some(cipher) => {
                copy_decoded(Decompressor::new(CipherReader::new(source, cipher)), sink)?
            }
            None => copy_decoded(Decompressor::new(source), sink)?,
        };
        sink.flush()?;

        debug!(bytes_in = stats.bytes_in, bytes_out = stats.bytes_out, "decode finished");
        Ok(stats)
    }
}

fn copy_decoded<R: Read, W: Write + ?Sized>(
    mut decoder: Decompressor<R>,
    sink: &mut W,
) -> io::Result<DecodeStats> {
    let bytes_out = io::copy(&mut decoder, sink)?;
    Ok(DecodeStats {
        bytes_in: decoder.total_in(),
        bytes_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::cipher::CipherWriter;
    use crate::streaming::compress::Compressor;
    use crate::streaming::sender::Sender;

    const KEY: [u8; 32] = [0x13; 32];

    fn cipher() -> Option<Cipher> {
        Some(Cipher::new(&KEY).unwrap())
    }

    fn sample() -> Vec<u8> {
        (0..200_000u32).map(|i| ((i / 7) % 256) as u8).collect()
    }

    #[test]
    fn test_roundtrip() {
        let data = sample();
        let (_, wire) = Sender::new(cipher()).run(&mut data.as_slice(), Vec::new()).unwrap();

        let mut out = Vec::new();
        let stats = Receiver::new(cipher()).run(wire.as_slice(), &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.bytes_out, data.len() as u64);
        assert_eq!(stats.bytes_in, wire.len() as u64);
    }

    #[test]
    fn test_wrong_key_fails() {
        let data = sample();
        let (_, wire) = Sender::new(cipher()).run(&mut data.as_slice(), Vec::new()).unwrap();

        let other = Some(Cipher::new(&[0x14; 32]).unwrap());
        let mut out = Vec::new();
        assert!(Receiver::new(other).run(wire.as_slice(), &mut out).is_err());
    }

    #[test]
    fn test_swapped_order_is_detected() {
        // encrypt first, compress second: the inverse of the real pipeline
        let data = sample();
        let mut compressor = Compressor::new(Vec::new());
        {
            let mut encrypting = CipherWriter::new(&mut compressor, cipher().unwrap());
            encrypting.write_all(&data).unwrap();
            encrypting.finish().unwrap();
        }
        let wire = compressor.finish().unwrap();

        let mut out = Vec::new();
        let result = Receiver::new(cipher()).run(wire.as_slice(), &mut out);
        assert!(result.is_err() || out != data);
    }

    #[test]
    fn test_truncated_wire_fails() {
        let data = sample();
        let (_, wire) = Sender::new(cipher()).run(&mut data.as_slice(), Vec::new()).unwrap();

        let mut out = Vec::new();
        let err = Receiver::new(cipher())
            .run(&wire[..wire.len() - 3], &mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unencrypted_roundtrip() {
        let data = sample();
        let (_, wire) = Sender::new(None).run(&mut data.as_slice(), Vec::new()).unwrap();

        let mut out = Vec::new();
        Receiver::new(None).run(wire.as_slice(), &mut out).unwrap();
        assert_eq!(out, data);
    }
}
