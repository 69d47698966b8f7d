//! Encode stage: plaintext -> compress -> encrypt.
//!
//! Runs synchronously on a blocking thread; the sink is normally the write
//! end of the conduit.

use crate::streaming::cipher::{Cipher, CipherWriter};
use crate::streaming::compress::Compressor;
use std::io::{self, Read, Write};
use tracing::debug;

/// Byte counts for one encode run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    /// Plaintext bytes read from the source
    pub bytes_in: u64,
}

/// Sender state
pub struct Sender {
    cipher: Option<Cipher>,
}

impl Sender {
    /// `None` leaves the compressed stream unencrypted.
    pub fn new(cipher: Option<Cipher>) -> Self {
        Self { cipher }
    }

    /// Encode all of `source` into `sink` and return the sink.
    ///
    /// The compressor is finished before the cipher writer, so the zlib
    /// footer is encrypted and flushed like any other byte.
    pub fn run<R, W>(self, source: &mut R, sink: W) -> io::Result<(EncodeStats, W)>
    where
        R: Read + ?Sized,
        W: Write,
    {
        let (bytes_in, sink) = match self.cipher {
            Some(cipher) => {
                let mut compressor = Compressor::new(CipherWriter::new(sink, cipher));
                let n = io::copy(source, &mut compressor)?;
                let sink = compressor.finish()?.finish()?;
                (n, sink)
            }
            None => {
                let mut compressor = Compressor::new(sink);
                let n = io::copy(source, &mut compressor)?;
                let mut sink = compressor.finish()?;
                sink.flush()?;
                (n, sink)
            }
        };

        debug!(bytes_in, "encode finished");
        Ok((EncodeStats { bytes_in }, sink))
    }
}
