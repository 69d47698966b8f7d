use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Compressed stream error: {0}")]
    Compression(#[source] io::Error),

    #[error("Conduit error: {0}")]
    Conduit(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Usage(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("{failed} of {total} items failed")]
    Partial { failed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<object_store::Error> for TransferError {
    fn from(err: object_store::Error) -> Self {
        TransferError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Config(err.to_string())
    }
}

impl TransferError {
    /// Classify an I/O error coming out of the decode path.
    ///
    /// Truncated or malformed zlib data is reported as a compression error,
    /// a producer failure relayed by the conduit as a conduit error.
    pub fn from_decode(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                TransferError::Compression(err)
            }
            io::ErrorKind::BrokenPipe => TransferError::Conduit(err.to_string()),
            _ => TransferError::Io(err),
        }
    }
}
