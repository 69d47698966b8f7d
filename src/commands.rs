//! Command dispatch: turns parsed arguments into list, delete, download or
//! upload runs against one storage client.

use crate::cli::Cli;
use crate::config::Config;
use crate::console::Console;
use crate::error::{Result, TransferError};
use crate::naming::{base_name, format_name, remote_path};
use crate::streaming::{Pipeline, PipelineOptions, TransferSession};
use crate::transport::{format_listing, ObjectStorage};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, IsTerminal, Read, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const STDIN_PROMPT: &str = "Input content and press Ctrl-D to finish or Ctrl-C to abort:";

pub struct App {
    config: Config,
    storage: Arc<dyn ObjectStorage>,
    console: Console,
    cancel: CancellationToken,
}

impl App {
    pub fn new(
        config: Config,
        storage: Arc<dyn ObjectStorage>,
        console: Console,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            storage,
            console,
            cancel,
        }
    }

    pub async fn run(&self, cli: &Cli) -> Result<()> {
        if cli.list {
            return self.list(cli).await;
        }
        if cli.delete {
            return self.delete(cli).await;
        }
        if cli.output.is_some() || cli.remote_name {
            return self.download(cli).await;
        }
        if cli.args.is_empty() {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            return self.upload_source(cli, stdin, interactive).await;
        }
        self.upload_files(cli).await
    }

    fn pipeline(&self, cli: &Cli, progress: bool) -> Pipeline {
        let options = PipelineOptions {
            progress: progress && !cli.no_progress,
            encrypt: !cli.no_encryption,
            dry_run: cli.dry_run,
            print_command: cli.print_command,
            ..Default::default()
        };
        Pipeline::new(
            self.config.encryption_key.clone(),
            options,
            self.storage.clone(),
            self.console.clone(),
        )
    }

    /// Run a storage request unless Ctrl-C comes first.
    async fn until_cancelled<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            result = request => result,
        }
    }

    /// Object key for a local name under the configured remote directory.
    fn destination(&self, cli: &Cli, local: &str) -> Result<String> {
        let format = cli.naming_format(&self.config.file_name_format);
        let name = format_name(format, local, &Local::now())?;
        Ok(remote_path(&self.config.remote_dir()?, &name))
    }

    async fn list(&self, cli: &Cli) -> Result<()> {
        let prefix = match cli.args.first() {
            Some(prefix) => prefix.clone(),
            None => self.config.remote_dir()?,
        };
        let files = self
            .until_cancelled(self.storage.list(&prefix, true))
            .await?;
        debug!(%prefix, count = files.len(), "listed");
        for line in format_listing(&files) {
            self.console.out_line(format_args!("{}", line));
        }
        Ok(())
    }

    async fn delete(&self, cli: &Cli) -> Result<()> {
        let names = required_names(cli)?;
        let mut batch = Batch::new(cli.keep_going, self.console.clone());
        for name in names {
            let url = self.storage.url(name);
            let result = if cli.dry_run {
                self.console.out_line(format_args!("delete {}", url));
                Ok(())
            } else {
                self.until_cancelled(self.storage.delete(std::slice::from_ref(name)))
                    .await
                    .map(|()| self.console.err_line(format_args!("{} deleted", url)))
            };
            batch.record(name, result)?;
        }
        batch.finish()
    }

    async fn download(&self, cli: &Cli) -> Result<()> {
        let keys = required_names(cli)?;
        let pipeline = self.pipeline(cli, true);

        if let Some(output) = &cli.output {
            if keys.len() > 1 {
                return Err(TransferError::Usage(
                    "Only one remote file can be written to --output; use -O for several."
                        .to_string(),
                ));
            }
            return self.download_one(&pipeline, &keys[0], output).await;
        }

        let mut batch = Batch::new(cli.keep_going, self.console.clone());
        for key in keys {
            let local = base_name(key);
            let result = self.download_one(&pipeline, key, &local).await;
            batch.record(key, result)?;
        }
        batch.finish()
    }

    async fn download_one(&self, pipeline: &Pipeline, key: &str, output: &str) -> Result<()> {
        let sink: Box<dyn Write + Send> = if pipeline.options().dry_run {
            Box::new(io::sink())
        } else if output == "-" {
            Box::new(io::stdout())
        } else {
            Box::new(open_output(output)?)
        };
        pipeline.download(key, output, sink, &self.cancel).await?;
        Ok(())
    }

    /// Upload one unnamed stream under `--stdin-name`.
    ///
    /// An interactive source gets a prompt instead of a progress line.
    pub async fn upload_source<R>(&self, cli: &Cli, source: R, interactive: bool) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        let session = TransferSession {
            source: cli.stdin_name.clone(),
            destination: self.destination(cli, &cli.stdin_name)?,
            size: None,
        };
        if interactive && !cli.dry_run {
            self.console.err_line(format_args!("{}", STDIN_PROMPT));
        }
        self.pipeline(cli, !interactive)
            .upload(&session, source, &self.cancel)
            .await?;
        Ok(())
    }

    async fn upload_files(&self, cli: &Cli) -> Result<()> {
        let pipeline = self.pipeline(cli, true);
        let mut batch = Batch::new(cli.keep_going, self.console.clone());
        for path in &cli.args {
            let result = self.upload_file(cli, &pipeline, path).await;
            batch.record(path, result)?;
        }
        batch.finish()
    }

    async fn upload_file(&self, cli: &Cli, pipeline: &Pipeline, path: &str) -> Result<()> {
        let destination = self.destination(cli, path)?;
        if pipeline.options().dry_run {
            let session = TransferSession {
                source: path.to_string(),
                destination,
                size: None,
            };
            pipeline.upload(&session, io::empty(), &self.cancel).await?;
            return Ok(());
        }

        let file = File::open(path).map_err(|e| with_path(path, e))?;
        let size = file.metadata().ok().map(|m| m.len());
        let session = TransferSession {
            source: path.to_string(),
            destination,
            size,
        };
        pipeline.upload(&session, file, &self.cancel).await?;
        Ok(())
    }
}

fn required_names(cli: &Cli) -> Result<&[String]> {
    if cli.args.is_empty() {
        return Err(TransferError::Usage(
            "You must provide remote file name.".to_string(),
        ));
    }
    Ok(cli.args.as_slice())
}

/// Open a download target, replacing any previous content; owner-only mode.
fn open_output(path: &str) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| with_path(path, e))
}

fn with_path(path: &str, err: io::Error) -> TransferError {
    TransferError::Io(io::Error::new(err.kind(), format!("{}: {}", path, err)))
}

/// Sequential batch policy: stop at the first failure, or with `keep_going`
/// report it and move on.
struct Batch {
    keep_going: bool,
    console: Console,
    total: usize,
    failed: usize,
}

impl Batch {
    fn new(keep_going: bool, console: Console) -> Self {
        Self {
            keep_going,
            console,
            total: 0,
            failed: 0,
        }
    }

    fn record(&mut self, item: &str, result: Result<()>) -> Result<()> {
        self.total += 1;
        match result {
            Ok(()) => Ok(()),
            // Ctrl-C ends the whole batch.
            Err(TransferError::Cancelled) => Err(TransferError::Cancelled),
            Err(e) if self.keep_going => {
                warn!(item, error = %e, "item failed, continuing");
                self.console.err_line(format_args!("{}: {}", item, e));
                self.failed += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn finish(self) -> Result<()> {
        if self.failed > 0 {
            return Err(TransferError::Partial {
                failed: self.failed,
                total: self.total,
            });
        }
        Ok(())
    }
}
