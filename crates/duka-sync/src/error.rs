//! # Sync Error Types
//!
//! What a caller of a domain service can see.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Remote         │  │   Domain        │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Unauthenticated│  │  NotFound       │  │  InvalidConfig          │ │
//! │  │  RemoteRejected │  │  DeactivateInst.│  │  InvalidUrl             │ │
//! │  │  RemoteUnavail. │  │  Validation     │  │  ConfigLoad/SaveFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Mirror         │  │  Internal                                   │  │
//! │  │  (DbError)      │  │  Serialization, ChannelError, ShuttingDown  │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Unreachable and SchemaMissing remote failures are absorbed by the     │
//! │  offline fallback and never reach a caller of a mirrored operation.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::remote::{RejectionKind, RemoteError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type for every service, repository and agent operation.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// No valid session, or the remote refused the token.
    #[error("Not signed in or session expired")]
    Unauthenticated,

    /// The remote store refused the operation.
    #[error("Remote store rejected the request ({kind}): {message}")]
    RemoteRejected { kind: RejectionKind, message: String },

    /// The remote store is unreachable and the operation has no offline
    /// path (e.g. confirming a user's email).
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Entity unknown both remotely and locally.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The row is still referenced by other rows and can't be deleted.
    #[error("{entity} {id} is referenced by other records; deactivate it instead of deleting")]
    DeactivateInstead { entity: String, id: String },

    /// Input or patch failed validation. Raised before any I/O.
    #[error("Invalid input: {0}")]
    Validation(#[from] duka_core::CoreError),

    // =========================================================================
    // Mirror Errors
    // =========================================================================
    #[error("Local mirror error: {0}")]
    Mirror(#[from] duka_db::DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A row couldn't be converted to or from its JSON form.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Sync agent is shutting down")]
    ShuttingDown,
}

impl SyncError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Used once a remote failure has been judged fatal for the operation.
impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthenticated => SyncError::Unauthenticated,
            RemoteError::Rejected { kind, message } => SyncError::RemoteRejected { kind, message },
            RemoteError::Unreachable(msg) => SyncError::RemoteUnavailable(msg),
            RemoteError::SchemaMissing(what) => {
                SyncError::RemoteUnavailable(format!("missing remote schema: {what}"))
            }
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SyncError::ChannelError(err.to_string())
    }
}
