//! Transfer pipeline.
//!
//! Couples the blocking transform stage to the async storage call through a
//! conduit:
//!
//! ```text
//! upload:   source -> Sender (compress, encrypt) -> tap -> conduit -> storage.upload
//! download: storage.download -> tap -> conduit -> Receiver (decrypt, decompress) -> sink
//! ```

use crate::config::Key;
use crate::console::Console;
use crate::error::{Result, TransferError};
use crate::naming::base_name;
use crate::progress::{ProgressCounter, ProgressMonitor, Tap};
use crate::streaming::channel::{conduit, ConduitWriter, CONDUIT_CAPACITY};
use crate::streaming::cipher::Cipher;
use crate::streaming::{Receiver, Sender};
use crate::transport::{ObjectStorage, RemoteObject};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-invocation switches
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Show the progress line on stderr
    pub progress: bool,
    /// Run the cipher stage
    pub encrypt: bool,
    /// Report what would happen without transferring anything
    pub dry_run: bool,
    /// Print the shell command that decrypts the uploaded object
    pub print_command: bool,
    /// Conduit buffer size in bytes
    pub capacity: usize,
    /// Pause after the final progress line, before the summary
    pub final_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            progress: true,
            encrypt: true,
            dry_run: false,
            print_command: false,
            capacity: CONDUIT_CAPACITY,
            final_delay: Duration::ZERO,
        }
    }
}

/// One logical file move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// Label of the source (local path or stdin name)
    pub source: String,
    /// Remote object key
    pub destination: String,
    /// Source size, when known
    pub size: Option<u64>,
}

/// Result of one transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub url: String,
    /// Plaintext bytes
    pub plain_bytes: u64,
    /// Bytes on the wire
    pub wire_bytes: u64,
    pub dry_run: bool,
}

/// The shell pipeline that recovers an object without this tool.
pub fn decryption_command(url: &str, key: &Key, encrypted: bool) -> String {
    if encrypted {
        format!(
            "curl -s {} | openssl enc -d -aes-256-ofb -iv 0 -K {} | unpigz",
            url,
            key.to_hex()
        )
    } else {
        format!("curl -s {} | unpigz", url)
    }
}

/// Orchestrator for uploads and downloads
pub struct Pipeline {
    key: Key,
    options: PipelineOptions,
    storage: Arc<dyn ObjectStorage>,
    console: Console,
}

impl Pipeline {
    pub fn new(
        key: Key,
        options: PipelineOptions,
        storage: Arc<dyn ObjectStorage>,
        console: Console,
    ) -> Self {
        Self {
            key,
            options,
            storage,
            console,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn cipher(&self) -> Result<Option<Cipher>> {
        if self.options.encrypt {
            Cipher::new(self.key.as_bytes()).map(Some)
        } else {
            Ok(None)
        }
    }

    fn monitor(&self, name: &str, total: Option<u64>) -> Option<ProgressMonitor> {
        self.options
            .progress
            .then(|| ProgressMonitor::start(base_name(name), total, self.console.clone()))
    }

    async fn finish_progress(&self, monitor: Option<ProgressMonitor>) {
        let Some(monitor) = monitor else { return };
        let written = monitor.close().await;
        if written > 0 && !self.options.final_delay.is_zero() {
            tokio::time::sleep(self.options.final_delay).await;
        }
    }

    fn print_command(&self, url: &str) {
        self.console.out_line(format_args!(
            "{}",
            decryption_command(url, &self.key, self.options.encrypt)
        ));
    }

    /// Compress, encrypt and upload `source` to `session.destination`.
    pub async fn upload<R>(
        &self,
        session: &TransferSession,
        source: R,
        cancel: &CancellationToken,
    ) -> Result<TransferStats>
    where
        R: Read + Send + 'static,
    {
        if self.options.dry_run {
            let url = self.storage.url(&session.destination);
            if self.options.print_command {
                self.console.out_line(format_args!("# {}", session.source));
                self.print_command(&url);
            } else {
                self.console
                    .out_line(format_args!("{} -> {}", session.source, url));
            }
            return Ok(TransferStats {
                url,
                dry_run: true,
                ..Default::default()
            });
        }

        let sender = Sender::new(self.cipher()?);
        let monitor = self.monitor(&session.destination, session.size);
        let counter = monitor.as_ref().map(|m| m.counter());
        let (writer, reader) = conduit(self.options.capacity);

        debug!(source = %session.source, destination = %session.destination, "upload pipeline started");
        let bridge = SyncIoBridge::new(writer);
        let producer = tokio::task::spawn_blocking(move || encode(sender, source, bridge, counter));

        let storage = self.storage.clone();
        let transfer = async move {
            let uploaded = storage
                .upload(&session.destination, Box::new(reader), session.size)
                .await;
            let produced = producer
                .await
                .map_err(|e| TransferError::Conduit(format!("Encoder task failed: {}", e)))?;

            match (uploaded, produced) {
                (Ok(url), Ok((plain_bytes, wire_bytes))) => Ok(TransferStats {
                    url,
                    plain_bytes,
                    wire_bytes,
                    dry_run: false,
                }),
                // A producer failure is the root cause unless it only failed
                // because the storage side hung up first.
                (Err(storage_err), Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    Err(storage_err)
                }
                (_, Err(e)) => Err(TransferError::Io(e)),
                (Err(storage_err), Ok(_)) => Err(storage_err),
            }
        };

        let result = tokio::select! {
            res = transfer => res,
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
        };

        self.finish_progress(monitor).await;
        let stats = result?;

        if self.options.print_command {
            self.print_command(&stats.url);
        } else {
            self.console
                .err_line(format_args!("{} -> {}", session.source, stats.url));
        }
        Ok(stats)
    }

    /// Fetch `key`, decrypt and decompress it into `sink`.
    ///
    /// `dest` only labels the summary line.
    pub async fn download<W>(
        &self,
        key: &str,
        dest: &str,
        sink: W,
        cancel: &CancellationToken,
    ) -> Result<TransferStats>
    where
        W: Write + Send + 'static,
    {
        if self.options.dry_run {
            let url = self.storage.url(key);
            self.console.out_line(format_args!("{} -> {}", url, dest));
            return Ok(TransferStats {
                url,
                dry_run: true,
                ..Default::default()
            });
        }

        let receiver = Receiver::new(self.cipher()?);
        let RemoteObject {
            url,
            content_length,
            body,
        } = self.storage.download(key).await?;

        let monitor = self.monitor(key, content_length);
        let counter = monitor.as_ref().map(|m| m.counter());
        let (mut writer, reader) = conduit(self.options.capacity);

        debug!(%key, %url, ?content_length, "download pipeline started");
        let pump = tokio::spawn(async move {
            let result = pump_body(body, &mut writer, counter.as_deref()).await;
            writer.close(result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
            result
        });

        let pump_abort = pump.abort_handle();

        let bridge = SyncIoBridge::new(reader);
        let decoder = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            receiver.run(bridge, &mut sink)
        });

        let transfer = async {
            let decoded = decoder
                .await
                .map_err(|e| TransferError::Conduit(format!("Decoder task failed: {}", e)))?;
            let pumped = pump
                .await
                .map_err(|e| TransferError::Conduit(format!("Network task failed: {}", e)))?;

            match (decoded, pumped) {
                // Bytes after the end of the zlib stream are ignored.
                (Ok(stats), _) => Ok(stats),
                // A storage failure explains whatever the decoder saw.
                (Err(_), Err(network_err)) if !is_broken_pipe(&network_err) => Err(network_err),
                (Err(e), _) => Err(TransferError::from_decode(e)),
            }
        };

        let result = tokio::select! {
            res = transfer => res,
            _ = cancel.cancelled() => {
                // Dropping the write end unblocks the decoder thread.
                pump_abort.abort();
                Err(TransferError::Cancelled)
            }
        };

        self.finish_progress(monitor).await;
        let stats = result?;

        self.console.err_line(format_args!("{} -> {}", url, dest));
        Ok(TransferStats {
            url,
            plain_bytes: stats.bytes_out,
            wire_bytes: stats.bytes_in,
            dry_run: false,
        })
    }
}

/// Producer body: run the encoder into the conduit, then close it with the
/// outcome exactly once.
fn encode<R: Read>(
    sender: Sender,
    mut source: R,
    mut bridge: SyncIoBridge<ConduitWriter>,
    counter: Option<Arc<ProgressCounter>>,
) -> io::Result<(u64, u64)> {
    let result = match counter {
        Some(counter) => {
            let tap_counter = counter.clone();
            sender
                .run(&mut source, Tap::new(&mut bridge, tap_counter))
                .map(|(stats, _)| (stats.bytes_in, counter.written()))
        }
        None => {
            sender
                .run(&mut source, CountingWriter::new(&mut bridge))
                .map(|(stats, counted)| (stats.bytes_in, counted.count))
        }
    };

    bridge
        .into_inner()
        .close(result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
    result
}

/// Network receiver body: move response chunks into the conduit.
async fn pump_body(
    mut body: BoxStream<'static, Result<Bytes>>,
    writer: &mut ConduitWriter,
    counter: Option<&ProgressCounter>,
) -> Result<u64> {
    let mut received = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        if let Some(counter) = counter {
            counter.record(chunk.len());
        }
        received += chunk.len() as u64;
    }
    Ok(received)
}

fn is_broken_pipe(err: &TransferError) -> bool {
    matches!(err, TransferError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
