//! Unified error handling for botmux.
//!
//! One crate-level [`Error`] covers the whole taxonomy: configuration,
//! duplicate registration, missing entities, lifecycle misuse, transport
//! failures, and log-file I/O. Components construct the variants directly;
//! lifecycle orchestration collects them per module instead of aborting
//! siblings.

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the dispatch and lifecycle core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing required fields or failed to load.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A module name collided with "core" or an already-registered module.
    #[error("module name already registered: {0}")]
    DuplicateName(String),

    /// The module is already attached to a connection.
    #[error("module is already bound to a connection")]
    AlreadyBound,

    /// A trigger with identical normalized text exists in the same registry.
    #[error("trigger already registered: {0}")]
    AlreadyRegistered(String),

    /// Unregister of a trigger that was never registered.
    #[error("trigger not registered: {0}")]
    NotRegistered(String),

    /// An allow/deny entry is already present.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// An allow/deny target was the empty string.
    #[error("empty target")]
    EmptyTarget,

    /// Remove of an allow/deny entry that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// `start` or `connect` called while already running.
    #[error("{0} is already running")]
    AlreadyRunning(String),

    /// `exit` or `disconnect` called while not running.
    #[error("{0} is not running")]
    NotRunning(String),

    /// A log priority name was not recognized.
    #[error("unknown log priority: {0}")]
    UnknownPriority(String),

    /// Transport-level failure, surfaced to the caller unretried.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport's inbound event stream is closed or already taken.
    #[error("inbound event stream unavailable")]
    EventStreamUnavailable,

    /// A user-supplied lifecycle hook failed.
    #[error("hook error: {0}")]
    Hook(String),

    /// Log file creation, flush, or close failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The logger worker task terminated abnormally.
    #[error("log worker terminated abnormally: {0}")]
    LogWorker(String),
}

/// Errors from the opaque chat transport.
///
/// The core never retries these; they are surfaced to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(String),

    #[error("not connected")]
    NotConnected,
}
