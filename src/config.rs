//! Configuration store.
//!
//! A JSON document (default `~/.ossenc.json`) holding the encryption key and
//! the storage credentials. The key is created once from the OS random source
//! and never rotated; everything else is edited by hand.

use crate::error::{Result, TransferError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Length of a freshly generated key (AES-256).
pub const KEY_LEN: usize = 32;

/// File name of the config in the home directory.
pub const DEFAULT_CONFIG_NAME: &str = ".ossenc.json";

/// Raw symmetric key material, stored as hex.
///
/// Loaded verbatim: the length is only checked when a cipher is built from it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate a new random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s.trim())
            .map(Self)
            .map_err(|e| TransferError::Config(format!("Invalid EncryptionKey: {}", e)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(<{} bytes>)", self.0.len())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map(Key).map_err(serde::de::Error::custom)
    }
}

/// Process-wide settings, read once at startup and passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(rename = "EncryptionKey")]
    pub encryption_key: Key,

    #[serde(rename = "FileNameFormat", default)]
    pub file_name_format: String,

    #[serde(rename = "OSSAccessKeyId", default)]
    pub access_key_id: String,

    #[serde(rename = "OSSAccessKeySecret", default)]
    pub access_key_secret: String,

    /// Origin plus remote directory, e.g. `https://bucket.example.com/backups/`
    #[serde(rename = "OSSPrefix", default)]
    pub prefix: String,

    #[serde(rename = "OSSBucket", default)]
    pub bucket: String,

    #[serde(rename = "OSSRegion", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Whether `create_or_update` wrote a new file or rewrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWrite {
    Created,
    Updated,
}

impl Config {
    /// Default config location (`~/.ossenc.json`, or the working directory
    /// when no home directory is known).
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(DEFAULT_CONFIG_NAME),
            None => PathBuf::from(DEFAULT_CONFIG_NAME),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            TransferError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_slice(&data).map_err(|e| {
            TransferError::Config(format!("Cannot parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Create the config file with a fresh key, or rewrite an existing one.
    pub fn create_or_update(path: &Path) -> Result<(Self, ConfigWrite)> {
        let (config, outcome) = if path.exists() {
            (Self::load(path)?, ConfigWrite::Updated)
        } else {
            let config = Config {
                encryption_key: Key::generate(),
                ..Default::default()
            };
            (config, ConfigWrite::Created)
        };

        config.save(path)?;

        match outcome {
            ConfigWrite::Created => info!("Config file created: {}", path.display()),
            ConfigWrite::Updated => info!("Config file updated: {}", path.display()),
        }

        Ok((config, outcome))
    }

    /// Write the config as tab-indented JSON, owner read/write only.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(&buf)?;
        Ok(())
    }

    /// Scheme and host of `OSSPrefix`, used as the storage endpoint.
    pub fn endpoint(&self) -> Result<String> {
        split_prefix(&self.prefix).map(|(origin, _)| origin.to_string())
    }

    /// Path component of `OSSPrefix`: the remote directory uploads land in.
    pub fn remote_dir(&self) -> Result<String> {
        split_prefix(&self.prefix).map(|(_, dir)| dir.to_string())
    }
}

/// Split `scheme://host/path?query#frag` into (`scheme://host`, `/path`).
fn split_prefix(prefix: &str) -> Result<(&str, &str)> {
    let scheme_end = prefix.find("://").ok_or_else(|| {
        TransferError::Config(format!("OSSPrefix is not a URL: {:?}", prefix))
    })?;
    let after_scheme = scheme_end + 3;
    let rest = &prefix[after_scheme..];
    let host_end = rest
        .find(['/', '?', '#'])
        .unwrap_or(rest.len());
    if host_end == 0 {
        return Err(TransferError::Config(format!(
            "OSSPrefix has no host: {:?}",
            prefix
        )));
    }
    let origin = &prefix[..after_scheme + host_end];
    let tail = &rest[host_end..];
    let path_end = tail.find(['?', '#']).unwrap_or(tail.len());
    Ok((origin, &tail[..path_end]))
}
