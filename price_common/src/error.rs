//! Error types shared between client and server.
//!
//! The `StreamError` enum unifies transport, protocol, catalog and
//! synchronization failures so every crate in the workspace can propagate a
//! single error type with `?`.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum StreamError {
    /// I/O error originating from sockets or files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound message that does not match any recognized schema.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The symbol catalog could not be loaded or contains invalid entries.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Operation addressed a connection that is not (or no longer) registered.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(u64),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// A poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for StreamError {
    fn from(err: PoisonError<T>) -> Self {
        StreamError::MutexLock(err.to_string())
    }
}
