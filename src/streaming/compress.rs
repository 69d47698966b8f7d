//! zlib stream transform.
//!
//! Default level, default window, no dictionary: the output is what `pigz -z`
//! writes and `unpigz` reads.

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{self, BufRead, BufReader, Read, Write};

/// Compresses everything written through it.
///
/// [`Compressor::finish`] must be called: the last deflate block and the
/// Adler-32 footer are only written there.
pub struct Compressor<W: Write> {
    inner: ZlibEncoder<W>,
}

impl<W: Write> Compressor<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: ZlibEncoder::new(inner, Compression::default()),
        }
    }

    /// Write the remaining output and the footer, then return the sink.
    pub fn finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decompresses a zlib stream read from `R`.
///
/// Running out of input before the stream end marker is an
/// [`io::ErrorKind::UnexpectedEof`] error rather than a short read, so a
/// truncated object never decodes as a shorter file.
pub struct Decompressor<R: Read> {
    inner: BufReader<R>,
    state: Decompress,
    done: bool,
}

impl<R: Read> Decompressor<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            state: Decompress::new(true),
            done: false,
        }
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.state.total_in()
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        loop {
            let input = self.inner.fill_buf()?;
            let eof = input.is_empty();
            let before_in = self.state.total_in();
            let before_out = self.state.total_out();

            let status = self
                .state
                .decompress(input, buf, FlushDecompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let consumed = (self.state.total_in() - before_in) as usize;
            let produced = (self.state.total_out() - before_out) as usize;
            self.inner.consume(consumed);

            match status {
                Status::StreamEnd => {
                    self.done = true;
                    return Ok(produced);
                }
                Status::Ok | Status::BufError => {
                    if produced > 0 {
                        return Ok(produced);
                    }
                    if eof {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "compressed stream ended before its footer",
                        ));
                    }
                    if consumed == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "compressed stream made no progress",
                        ));
                    }
                }
            }
        }
    }
}
