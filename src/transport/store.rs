//! [`ObjectStorage`] over the `object_store` crate.
//!
//! Production uses the S3-compatible client built from the config; tests
//! plug in `object_store::memory::InMemory`.

use super::{storage_error, ObjectStorage, RemoteFile, RemoteObject, UploadBody};
use crate::config::Config;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Region used when the config does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Bytes buffered before an upload switches from one PUT to multipart
pub const DEFAULT_UPLOAD_BUFFER: usize = 10 * 1024 * 1024;

pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    base_url: String,
    upload_buffer: usize,
}

impl ObjectStoreClient {
    /// `base_url` is prepended to object keys to form public URLs.
    pub fn new(store: Arc<dyn ObjectStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            upload_buffer: DEFAULT_UPLOAD_BUFFER,
        }
    }

    pub fn with_upload_buffer(mut self, bytes: usize) -> Self {
        self.upload_buffer = bytes;
        self
    }

    /// S3-compatible client for the bucket in `config`.
    ///
    /// `OSSPrefix` carries the bucket in its host name, so requests use
    /// virtual-hosted style against that origin.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);

        let store = AmazonS3Builder::new()
            .with_endpoint(&endpoint)
            .with_bucket_name(&config.bucket)
            .with_region(region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.access_key_secret)
            .with_virtual_hosted_style_request(true)
            .with_allow_http(endpoint.starts_with("http://"))
            .build()
            .map_err(|e| TransferError::Config(format!("Cannot set up storage client: {}", e)))?;

        Ok(Self::new(Arc::new(store), endpoint))
    }
}

/// An upload that has not completed yet.
///
/// Dropping it unfinished (the caller stopped polling a cancelled transfer)
/// aborts the multipart upload in the background so no parts are left behind.
struct PendingUpload {
    writer: Option<BufWriter>,
}

impl PendingUpload {
    fn new(writer: BufWriter) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    async fn copy_from(&mut self, body: &mut UploadBody) -> io::Result<u64> {
        match self.writer.as_mut() {
            Some(writer) => tokio::io::copy(body, writer).await,
            None => Ok(0),
        }
    }

    /// Completes the upload. A writer that has begun flushing can no longer
    /// be aborted, so it leaves the guard first.
    async fn finish(mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }

    async fn abort(mut self) -> object_store::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.abort().await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            debug!("upload dropped unfinished, aborting");
            handle.spawn(async move {
                let _ = writer.abort().await;
            });
        }
    }
}

fn object_path(key: &str) -> Path {
    Path::from(key.trim_start_matches('/'))
}

fn to_remote_file(meta: ObjectMeta) -> RemoteFile {
    RemoteFile {
        name: meta.location.to_string(),
        size: meta.size as u64,
        last_modified: meta.last_modified,
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreClient {
    async fn upload(
        &self,
        path: &str,
        mut body: UploadBody,
        size_hint: Option<u64>,
    ) -> Result<String> {
        let location = object_path(path);
        debug!(%location, ?size_hint, "upload started");

        let mut pending = PendingUpload::new(BufWriter::with_capacity(
            self.store.clone(),
            location.clone(),
            self.upload_buffer,
        ));
        match pending.copy_from(&mut body).await {
            Ok(sent) => {
                pending
                    .finish()
                    .await
                    .map_err(|e| storage_error(&format!("Upload of {} failed", path), e))?;
                debug!(%location, sent, "upload complete");
            }
            Err(e) => {
                let _ = pending.abort().await;
                return Err(storage_error(&format!("Upload of {} aborted", path), e));
            }
        }

        Ok(self.url(path))
    }

    async fn download(&self, key: &str) -> Result<RemoteObject> {
        let location = object_path(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| storage_error(&format!("Download of {} failed", key), e))?;
        let content_length = Some(result.meta.size as u64);
        debug!(%location, ?content_length, "download started");

        let body = result
            .into_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        Ok(RemoteObject {
            url: self.url(key),
            content_length,
            body,
        })
    }

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<RemoteFile>> {
        let trimmed = prefix.trim_matches('/');
        let prefix = (!trimmed.is_empty()).then(|| Path::from(trimmed));

        let metas: Vec<ObjectMeta> = if recursive {
            self.store.list(prefix.as_ref()).try_collect().await?
        } else {
            self.store.list_with_delimiter(prefix.as_ref()).await?.objects
        };

        let mut files: Vec<RemoteFile> = metas.into_iter().map(to_remote_file).collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete(&self, names: &[String]) -> Result<()> {
        for name in names {
            self.store
                .delete(&object_path(name))
                .await
                .map_err(|e| storage_error(&format!("Delete of {} failed", name), e))?;
            debug!(name = %name, "deleted");
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
