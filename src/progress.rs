//! Live transfer progress on stderr.
//!
//! The tap side ([`ProgressCounter`], [`Tap`]) only bumps atomics, so it can
//! sit inside the blocking transform thread. A separate tokio task redraws a
//! single status line every [`TICK`] until the monitor is closed.

use crate::console::Console;
use indicatif::HumanBytes;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Redraw interval
pub const TICK: Duration = Duration::from_millis(100);

/// Minimum time between two throughput samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Bytes observed by the tap.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    written: AtomicU64,
    started: AtomicBool,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.written.fetch_add(n as u64, Ordering::Relaxed);
        self.started.store(true, Ordering::Release);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// True once the first byte has been observed.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// Counts the bytes the inner writer accepts.
pub struct Tap<W: Write> {
    inner: W,
    counter: Arc<ProgressCounter>,
}

impl<W: Write> Tap<W> {
    pub fn new(inner: W, counter: Arc<ProgressCounter>) -> Self {
        Self { inner, counter }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Tap<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.counter.record(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A single self-overwriting line.
///
/// Every redraw is padded to the width of the previous one so a shorter line
/// fully covers a longer one.
pub struct StatusLine {
    console: Console,
    max_len: usize,
}

impl StatusLine {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            max_len: 0,
        }
    }

    pub fn render(&mut self, line: &str) -> String {
        let mut line = line.to_string();
        let len = line.chars().count();
        if len < self.max_len {
            line.push_str(&" ".repeat(self.max_len - len));
        }
        self.max_len = line.chars().count();
        line
    }

    pub fn redraw(&mut self, line: &str) {
        let line = self.render(line);
        self.console.err_raw(&format!("{}\r", line));
    }

    /// Last line; ends with a newline so later output starts on a fresh line.
    pub fn finish(&mut self, line: &str) {
        let line = self.render(line);
        self.console.err_raw(&format!("{}\n", line));
    }
}

/// Handle to a running progress loop.
pub struct ProgressMonitor {
    counter: Arc<ProgressCounter>,
    done: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressMonitor {
    /// Spawn the reporting loop for one transfer.
    pub fn start(name: impl Into<String>, total: Option<u64>, console: Console) -> Self {
        let counter = Arc::new(ProgressCounter::new());
        let done = CancellationToken::new();
        let handle = tokio::spawn(report(
            name.into(),
            total,
            counter.clone(),
            done.clone(),
            console,
        ));
        Self {
            counter,
            done,
            handle,
        }
    }

    pub fn counter(&self) -> Arc<ProgressCounter> {
        self.counter.clone()
    }

    /// Stop the loop and wait for the final line. Returns the bytes observed.
    pub async fn close(self) -> u64 {
        self.done.cancel();
        let _ = self.handle.await;
        self.counter.written()
    }
}

fn speed(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    };
    format!("at {}/s", HumanBytes(rate))
}

async fn report(
    name: String,
    total: Option<u64>,
    counter: Arc<ProgressCounter>,
    done: CancellationToken,
    console: Console,
) {
    let begin = Instant::now();
    let mut previous = begin;
    let mut sampled = 0u64;
    let mut current_speed = String::new();
    let mut line = StatusLine::new(console);
    let of_total = total
        .map(|t| format!(" of {}", HumanBytes(t)))
        .unwrap_or_default();

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let written = counter.written();
        let since = previous.elapsed();
        if since >= SAMPLE_INTERVAL {
            current_speed = speed(written.saturating_sub(sampled), since);
            sampled = written;
            previous = Instant::now();
        }

        if counter.started() {
            line.redraw(&format!(
                "Processing `{}` {}{} {}",
                name,
                HumanBytes(written),
                of_total,
                current_speed
            ));
        }

        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {}
        }
    }

    if counter.started() {
        let elapsed = begin.elapsed();
        let shown = Duration::from_millis(elapsed.as_millis() as u64);
        line.finish(&format!(
            "Done in {:?} {}, waiting for response",
            shown,
            speed(counter.written(), elapsed)
        ));
    }
}
