use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ossenc")]
#[command(about = "Upload files to object storage, compressed and encrypted", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    ossenc report.pdf                  upload a file
    tar c dir | ossenc -s dir.tar      upload stdin as dir.tar
    ossenc -l                          list the remote directory
    ossenc -o report.pdf backups/report.pdf
                                       download and decrypt
    ossenc -P -n report.pdf            print the recovery command only")]
pub struct Cli {
    /// Local files to upload, or remote keys with -o, -O, -d; list prefix with -l
    pub args: Vec<String>,

    /// Do not show progress
    #[arg(short = 'p', long)]
    pub no_progress: bool,

    /// Print the shell command that decrypts the uploaded file
    #[arg(short = 'P', long)]
    pub print_command: bool,

    /// Location of the config file [default: ~/.ossenc.json]
    #[arg(short = 'c', long, env = "OSSENC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Create (update if exists) the config file and exit
    #[arg(short = 'C', long)]
    pub create_config: bool,

    /// File name format, overrides FileNameFormat from the config
    #[arg(short = 'F', long, conflicts_with = "no_format")]
    pub format: Option<String>,

    /// Ignore any file name format and upload under the base name
    #[arg(short = 'f', long)]
    pub no_format: bool,

    /// List the remote directory
    #[arg(short = 'l', long, conflicts_with_all = ["output", "remote_name", "delete"])]
    pub list: bool,

    /// Name used for the uploaded object when reading stdin
    #[arg(short = 's', long, default_value = "stdin")]
    pub stdin_name: String,

    /// Download the remote file to this path, `-` for stdout
    #[arg(short = 'o', long, conflicts_with_all = ["remote_name", "delete"])]
    pub output: Option<String>,

    /// Download each remote file to a local file with the same base name
    #[arg(short = 'O', long, conflicts_with = "delete")]
    pub remote_name: bool,

    /// Dry run: resolve names and print them, transfer nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Compress only, do not encrypt
    #[arg(short = 'E', long)]
    pub no_encryption: bool,

    /// Delete the given remote files
    #[arg(short = 'd', long)]
    pub delete: bool,

    /// Keep going with the remaining files after a failure
    #[arg(short = 'k', long)]
    pub keep_going: bool,
}

impl Cli {
    /// Config path from the flag, or the default in the home directory.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Effective naming format: `-f` wins, then `-F`, then the config value.
    pub fn naming_format<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.no_format {
            ""
        } else {
            self.format.as_deref().unwrap_or(configured)
        }
    }
}
