//! # Remote Store Boundary
//!
//! The authoritative store the mirror follows. Rows cross this boundary as
//! JSON objects keyed by column name, exactly as the mirror stores them.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteStore                                      │
//! │                                                                         │
//! │   insert(table, row)           → row as stored                         │
//! │   select(table, filter)        → rows                                  │
//! │   update(table, id, patch)     → row after update                      │
//! │   delete(table, id)            → existed?                              │
//! │   invoke(function, args)       → function result (privileged ops)      │
//! │                                                                         │
//! │   ┌────────────────────┐          ┌────────────────────────────┐       │
//! │   │  RestRemoteStore   │          │  MemoryRemoteStore         │       │
//! │   │  PostgREST / HTTPS │          │  in-process tables,        │       │
//! │   │  (rest.rs)         │          │  fault injection (tests)   │       │
//! │   └────────────────────┘          └────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Taxonomy
//! | Variant           | Meaning                                  | Caller sees     |
//! |-------------------|------------------------------------------|-----------------|
//! | `Unauthenticated` | no session / token refused               | error           |
//! | `Rejected`        | remote refused the operation             | error (mostly)  |
//! | `Unreachable`     | network, timeout, 5xx                    | offline result  |
//! | `SchemaMissing`   | table/function not deployed remotely     | offline result  |

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use duka_core::Filter;

pub use memory::{Fault, FaultRule, MemoryRemoteStore, RemoteOp};
pub use rest::RestRemoteStore;

// =============================================================================
// Errors
// =============================================================================

/// Why the remote store refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Row-level security or a policy denied the write.
    PermissionDenied,
    /// The row is referenced by (or references a missing) other row.
    ForeignKey,
    /// Unique constraint.
    Conflict,
    /// Key-addressed operation matched no row.
    NotFound,
    /// Any other client error.
    Validation,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionKind::PermissionDenied => "permission denied",
            RejectionKind::ForeignKey => "foreign key",
            RejectionKind::Conflict => "conflict",
            RejectionKind::NotFound => "not found",
            RejectionKind::Validation => "validation",
        };
        f.write_str(s)
    }
}

/// Remote store failures.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Remote schema missing: {0}")]
    SchemaMissing(String),

    #[error("Rejected ({kind}): {message}")]
    Rejected { kind: RejectionKind, message: String },
}

impl RemoteError {
    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            kind,
            message: message.into(),
        }
    }

    /// Network-level failure; the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }

    pub fn is_schema_missing(&self) -> bool {
        matches!(self, RemoteError::SchemaMissing(_))
    }

    /// The rejection kind, if this is a rejection.
    pub fn rejection(&self) -> Option<RejectionKind> {
        match self {
            RemoteError::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

// =============================================================================
// RemoteStore Trait
// =============================================================================

/// Operations the remote store offers. Every method is keyed by table name
/// and primary key column `id`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts a row with a caller-chosen `id` and returns it as stored.
    async fn insert(&self, table: &str, row: Value) -> RemoteResult<Value>;

    /// Returns rows matching the filter.
    async fn select(&self, table: &str, filter: &Filter) -> RemoteResult<Vec<Value>>;

    /// Applies a partial update to the row with this `id`.
    ///
    /// ## Errors
    /// `Rejected(NotFound)` when no row has this `id`.
    async fn update(&self, table: &str, id: &str, patch: Value) -> RemoteResult<Value>;

    /// Deletes the row with this `id`. Returns whether it existed.
    async fn delete(&self, table: &str, id: &str) -> RemoteResult<bool>;

    /// Calls a named server-side function.
    async fn invoke(&self, function: &str, args: Value) -> RemoteResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        assert!(RemoteError::Unreachable("timeout".into()).is_transient());
        assert!(!RemoteError::Unauthenticated.is_transient());
        assert!(RemoteError::SchemaMissing("debts".into()).is_schema_missing());

        let err = RemoteError::rejected(RejectionKind::Conflict, "duplicate key");
        assert_eq!(err.rejection(), Some(RejectionKind::Conflict));
        assert_eq!(err.to_string(), "Rejected (conflict): duplicate key");
    }
}
