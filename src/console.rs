//! Handles to the two human-facing output streams.
//!
//! Library code never prints to the process streams directly so that tests
//! can capture what a transfer reports.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

#[derive(Clone)]
pub struct Console {
    out: SharedWriter,
    err: SharedWriter,
}

impl Console {
    /// The process stdout and stderr.
    pub fn std() -> Self {
        Self {
            out: Arc::new(Mutex::new(io::stdout())),
            err: Arc::new(Mutex::new(io::stderr())),
        }
    }

    pub fn new(out: SharedWriter, err: SharedWriter) -> Self {
        Self { out, err }
    }

    /// Write a line to the result stream (stdout).
    pub fn out_line(&self, args: fmt::Arguments<'_>) {
        write_line(&self.out, args);
    }

    /// Write a line to the status stream (stderr).
    pub fn err_line(&self, args: fmt::Arguments<'_>) {
        write_line(&self.err, args);
    }

    /// Write raw text to the status stream without a newline.
    pub fn err_raw(&self, text: &str) {
        if let Ok(mut w) = self.err.lock() {
            let _ = w.write_all(text.as_bytes());
            let _ = w.flush();
        }
    }
}

fn write_line(writer: &SharedWriter, args: fmt::Arguments<'_>) {
    // Console output is best effort; a closed terminal must not fail a transfer.
    if let Ok(mut w) = writer.lock() {
        let _ = w.write_fmt(args);
        let _ = w.write_all(b"\n");
        let _ = w.flush();
    }
}

/// In-memory console for tests: returns the console plus its stdout and
/// stderr buffers.
#[cfg(test)]
pub(crate) fn capture() -> (Console, Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let err = Arc::new(Mutex::new(Vec::new()));
    let console = Console::new(out.clone(), err.clone());
    (console, out, err)
}

/// Copy a capture buffer out as a string.
#[cfg(test)]
pub(crate) fn captured(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    let data = buf.lock().map(|b| b.clone()).unwrap_or_default();
    String::from_utf8_lossy(&data).into_owned()
}
