//! Streaming transform pipeline.
//!
//! Upload: source -> compress -> encrypt -> conduit -> storage.
//! Download: storage -> conduit -> decrypt -> decompress -> sink.
//!
//! # Architecture
//!
//! ```text
//! +--------------+     +--------------+     +--------------+
//! |    Sender    | --> |   Conduit    | --> |   Storage    |
//! | (blocking)   |     | (bounded)    |     |   (async)    |
//! +--------------+     +--------------+     +--------------+
//! ```
//!
//! Compression always runs on the plaintext and the cipher on the
//! compressed bytes; the reverse order would leave nothing to compress.

pub mod channel;
pub mod cipher;
pub mod compress;
pub mod pipeline;
pub mod receiver;
pub mod sender;

pub use channel::{conduit, ConduitReader, ConduitWriter, Outcome, CONDUIT_CAPACITY};
pub use cipher::{Cipher, CipherReader, CipherWriter, IV_LEN};
pub use compress::{Compressor, Decompressor};
pub use pipeline::{decryption_command, Pipeline, PipelineOptions, TransferSession, TransferStats};
pub use receiver::{DecodeStats, Receiver};
pub use sender::{EncodeStats, Sender};
