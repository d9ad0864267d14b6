//! Error types for the presence relay.
//!
//! None of the per-tick errors escape `PresenceSync::tick`; they exist so the
//! loop can log what went wrong and pick the right downgrade. Only
//! `ConfigError` is fatal, and only at startup.

use flrp_presence_protocol::FrameError;
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// IPC Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure to bring up a presence channel.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no Discord IPC endpoint accepted a connection (tried {attempts})")]
    NoEndpoint { attempts: u8 },

    #[error("handshake rejected: {reason}")]
    HandshakeRejected { reason: String },
}

/// Mid-session failure on an open channel. The channel is unusable afterwards.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    #[error("endpoint closed the channel: {reason}")]
    ClosedByPeer { reason: String },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("command rejected by endpoint: {0}")]
    Rejected(String),

    /// The command could not be framed. Nothing was written.
    #[error("command could not be encoded: {0}")]
    Unencodable(#[source] FrameError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Status file could not be turned into a snapshot. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum StatusReadError {
    #[error("status file not found: {0}")]
    Missing(PathBuf),

    #[error("status file unreadable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("status file malformed: {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),

    #[error("configuration file unreadable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file malformed: {path}: {details}")]
    Malformed { path: PathBuf, details: String },

    #[error("required setting {0} is missing")]
    MissingKey(&'static str),

    #[error("setting {key} has invalid value {value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
