//! Object storage collaborator.
//!
//! The pipeline only needs five operations from the bucket; everything
//! protocol-specific (signing, HTTP, part sizes) lives behind this trait.

mod store;

pub use store::{ObjectStoreClient, DEFAULT_REGION};

use crate::error::{Result, TransferError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tokio::io::AsyncRead;

/// Request body handed to [`ObjectStorage::upload`]; pulled at network speed
pub type UploadBody = Box<dyn AsyncRead + Send + Unpin>;

/// A download whose response headers have arrived; the body streams later.
pub struct RemoteObject {
    pub url: String,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store everything `body` yields under `path`; returns the object URL.
    ///
    /// An error from `body` must abort the upload without creating the object.
    async fn upload(&self, path: &str, body: UploadBody, size_hint: Option<u64>) -> Result<String>;

    /// Start fetching `key`.
    async fn download(&self, key: &str) -> Result<RemoteObject>;

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<RemoteFile>>;

    async fn delete(&self, names: &[String]) -> Result<()>;

    /// Public URL of `path`, without contacting the store.
    fn url(&self, path: &str) -> String;
}

/// Format a listing the way `ls`-style tools do: name column at least 20
/// wide, sizes right-aligned, then the timestamp.
pub fn format_listing(files: &[RemoteFile]) -> Vec<String> {
    let name_len = files
        .iter()
        .map(|f| f.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(20);
    let size_len = files
        .iter()
        .map(|f| f.size.to_string().len())
        .max()
        .unwrap_or(0)
        .max(1);

    files
        .iter()
        .map(|f| {
            format!(
                "{:<name_len$}\t{:>size_len$}\t{}",
                f.name,
                f.size,
                f.last_modified.format("%Y-%m-%d %H:%M:%S %Z"),
                name_len = name_len,
                size_len = size_len
            )
        })
        .collect()
}

pub(crate) fn storage_error(context: &str, err: impl std::fmt::Display) -> TransferError {
    TransferError::Storage(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_listing_alignment() {
        let when = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let files = vec![
            RemoteFile {
                name: "backups/a.gz".to_string(),
                size: 5,
                last_modified: when,
            },
            RemoteFile {
                name: "backups/b.gz".to_string(),
                size: 12345,
                last_modified: when,
            },
        ];

        let lines = format_listing(&files);
        assert_eq!(
            lines[0],
            "backups/a.gz        \t    5\t2024-03-05 12:00:00 UTC"
        );
        assert_eq!(
            lines[1],
            "backups/b.gz        \t12345\t2024-03-05 12:00:00 UTC"
        );
    }

    #[test]
    fn test_format_listing_empty() {
        assert!(format_listing(&[]).is_empty());
    }
}
