pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod naming;
pub mod progress;
pub mod streaming;
pub mod transport;

pub use error::{Result, TransferError};
