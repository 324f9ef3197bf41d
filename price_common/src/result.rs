//! Result type alias shared across the workspace.
//!
//! Defaults the error type to `StreamError`, so functions can simply return
//! `Result<T>`.
use crate::error::StreamError;

/// Workspace-wide `Result` alias with `StreamError` as the default error.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;
