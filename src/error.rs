//! Error types for Tallybot
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Validation failures for user-supplied counter input
///
/// These are recoverable: flow handlers report them back to the user
/// instead of propagating them as fatal errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Counter name is empty or whitespace-only
    #[error("Counter name must not be empty")]
    EmptyName,

    /// Counter name contains the record separator character
    #[error("Counter name must not contain ';': {0}")]
    InvalidName(String),

    /// Step input is not a positive integer
    #[error("Increase step must be a positive integer, got: {0}")]
    InvalidStep(String),

    /// Manual value input is not a non-negative integer
    #[error("Counter value must be a non-negative integer, got: {0}")]
    InvalidValue(String),

    /// A counter with this name already exists for the chat
    #[error("A counter named {0} already exists")]
    DuplicateName(String),
}

/// Main error type for Tallybot operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, transport interactions, session sequencing,
/// and counter storage.
#[derive(Error, Debug)]
pub enum TallybotError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-related errors (sending, awaiting, deleting messages)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Counter storage errors (record files, data directory)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Chained-question session errors
    #[error("Session error: {0}")]
    Session(String),

    /// A chained-question flow is already pending for this chat
    #[error("A question sequence is already pending for chat {0}")]
    SessionBusy(i64),

    /// User input validation failures
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Stored counter record could not be parsed
    #[error("Malformed counter record: {0}")]
    MalformedRecord(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Tallybot operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
