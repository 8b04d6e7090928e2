//! # Mirrored Repository
//!
//! One generic repository per entity. It decides, per call, whether the
//! remote store or the local mirror answers, and keeps the mirror's
//! `synced` flag honest.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          attempt(op, call)                              │
//! │                                                                         │
//! │   oracle.is_online()? ──no──► Fallback(Offline)                        │
//! │          │yes                                                           │
//! │          ▼                                                              │
//! │   timeout(call) ──ok──────────────────────► Remote(value)              │
//! │          │err / expired (= Unreachable)                                 │
//! │          ▼                                                              │
//! │   op.fallback_reason(err)? ──some──► Fallback(reason)                  │
//! │          │none                                                          │
//! │          ▼                                                              │
//! │   Err(SyncError)  (Unauthenticated, RemoteRejected, ...)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//!            │ Remote(value)                 │ Fallback(reason)
//!            ▼                               ▼
//!   mirror written with synced = 1   mirror written with synced = 0
//! ```
//!
//! ## Fallback Policy
//! | Operation | Falls back on                                          |
//! |-----------|--------------------------------------------------------|
//! | Create    | Unreachable, SchemaMissing                             |
//! | Read      | Unreachable, SchemaMissing                             |
//! | Update    | Unreachable, SchemaMissing, Rejected(PermissionDenied) |
//! | Delete    | Unreachable, SchemaMissing                             |
//! | Push      | nothing; the row stays pending                          |
//!
//! Operations on the same primary key run one at a time, in issue order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use duka_core::{CoreError, Filter, Patch};
use duka_db::{Database, MirrorRecord, MirrorRow, MirrorTable};

use crate::connectivity::ConnectivityOracle;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RejectionKind, RemoteError, RemoteResult, RemoteStore};

/// Default upper bound for one remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Above this many idle entries the lock map is pruned.
const LOCK_PRUNE_THRESHOLD: usize = 256;

// =============================================================================
// Attempt Outcome
// =============================================================================

/// A mirrored operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    /// Reconciliation push of a pending row.
    Push,
}

impl Operation {
    /// Why this operation would fall back to the mirror on `err`, or `None`
    /// when the error must reach the caller.
    pub fn fallback_reason(&self, err: &RemoteError) -> Option<FallbackReason> {
        if *self == Operation::Push {
            return None;
        }
        match err {
            RemoteError::Unreachable(message) => Some(FallbackReason::Unreachable(message.clone())),
            RemoteError::SchemaMissing(message) => {
                Some(FallbackReason::SchemaMissing(message.clone()))
            }
            RemoteError::Rejected {
                kind: RejectionKind::PermissionDenied,
                message,
            } if *self == Operation::Update => Some(FallbackReason::PermissionDenied(message.clone())),
            _ => None,
        }
    }

    pub fn falls_back_on(&self, err: &RemoteError) -> bool {
        self.fallback_reason(err).is_some()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Push => "push",
        };
        f.write_str(s)
    }
}

/// Why the mirror answered instead of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Offline,
    Unreachable(String),
    SchemaMissing(String),
    PermissionDenied(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Offline => write!(f, "offline"),
            FallbackReason::Unreachable(m) => write!(f, "unreachable: {m}"),
            FallbackReason::SchemaMissing(m) => write!(f, "schema missing: {m}"),
            FallbackReason::PermissionDenied(m) => write!(f, "permission denied: {m}"),
        }
    }
}

#[derive(Debug)]
enum Attempt<T> {
    Remote(T),
    Fallback(FallbackReason),
}

/// Result of pushing one pending row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The row was no longer pending when its turn came.
    Skipped,
}

// =============================================================================
// Per-Key Locks
// =============================================================================

/// FIFO async mutex per primary key.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Remote-first, mirror-backed access to one entity table.
pub struct MirroredRepository<R: MirrorRecord> {
    remote: Arc<dyn RemoteStore>,
    oracle: Arc<dyn ConnectivityOracle>,
    mirror: MirrorTable<R>,
    timeout: Duration,
    locks: KeyLocks,
}

impl<R: MirrorRecord> fmt::Debug for MirroredRepository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirroredRepository")
            .field("table", &R::TABLE)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<R: MirrorRecord> MirroredRepository<R> {
    pub fn new(
        db: &Database,
        remote: Arc<dyn RemoteStore>,
        oracle: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        MirroredRepository {
            remote,
            oracle,
            mirror: db.mirror::<R>(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            locks: KeyLocks::default(),
        }
    }

    /// Sets the upper bound for each remote call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &'static str {
        R::TABLE
    }

    /// The mirror table behind this repository.
    pub fn mirror(&self) -> &MirrorTable<R> {
        &self.mirror
    }

    pub async fn is_online(&self) -> bool {
        self.oracle.is_online().await
    }

    // =========================================================================
    // Remote Plumbing
    // =========================================================================

    /// Runs a remote call under the request timeout. Expiry is `Unreachable`.
    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Unreachable(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn attempt<T>(
        &self,
        op: Operation,
        id: Option<&str>,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> SyncResult<Attempt<T>> {
        if !self.oracle.is_online().await {
            debug!(table = R::TABLE, ?id, %op, "Offline, using local mirror");
            return Ok(Attempt::Fallback(FallbackReason::Offline));
        }

        let err = match self.bounded(call).await {
            Ok(value) => return Ok(Attempt::Remote(value)),
            Err(err) => err,
        };

        match op.fallback_reason(&err) {
            Some(reason) => {
                if err.is_schema_missing() {
                    warn!(
                        table = R::TABLE,
                        ?id,
                        %op,
                        reason = %reason,
                        "Remote schema missing, check the deployment; using local mirror"
                    );
                } else {
                    warn!(table = R::TABLE, ?id, %op, reason = %reason, "Remote call failed, using local mirror");
                }
                Ok(Attempt::Fallback(reason))
            }
            None => Err(err.into()),
        }
    }

    fn encode(record: &R) -> SyncResult<Value> {
        Ok(serde_json::to_value(record)?)
    }

    fn decode(row: Value) -> SyncResult<R> {
        Ok(serde_json::from_value(row)?)
    }

    /// Decodes remote rows, skipping any that don't fit the entity.
    fn decode_rows(rows: Vec<Value>) -> Vec<R> {
        rows.into_iter()
            .filter_map(|row| match Self::decode(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(table = R::TABLE, error = %e, "Skipping undecodable remote row");
                    None
                }
            })
            .collect()
    }

    // =========================================================================
    // Mirrored Operations
    // =========================================================================

    /// Stores a freshly constructed record.
    ///
    /// Returns the record unchanged whichever side accepted it.
    pub async fn create(&self, record: R) -> SyncResult<R> {
        let _guard = self.locks.acquire(record.id()).await;
        let row = Self::encode(&record)?;

        let call = self.remote.insert(R::TABLE, row);
        match self.attempt(Operation::Create, Some(record.id()), call).await? {
            Attempt::Remote(_) => {
                self.mirror.upsert(&record, true).await?;
                info!(table = R::TABLE, id = record.id(), "Created");
            }
            Attempt::Fallback(reason) => {
                self.mirror.upsert(&record, false).await?;
                info!(table = R::TABLE, id = record.id(), reason = %reason, "Created locally, pending sync");
            }
        }

        Ok(record)
    }

    /// Reads one record. The remote store answers when reachable and the
    /// mirror is refreshed from it.
    pub async fn get(&self, id: &str) -> SyncResult<Option<R>> {
        let _guard = self.locks.acquire(id).await;
        let filter = Filter::new().eq("id", id).limit(1);

        let call = self.remote.select(R::TABLE, &filter);
        match self.attempt(Operation::Read, Some(id), call).await? {
            Attempt::Remote(rows) => match rows.into_iter().next() {
                Some(row) => {
                    let record = Self::decode(row)?;
                    self.mirror.refresh(&record).await?;
                    Ok(self.mirror.get(id).await?.map(|row| row.record))
                }
                // Only a local write that never reached the remote survives.
                None => Ok(self
                    .mirror
                    .get(id)
                    .await?
                    .filter(MirrorRow::is_pending)
                    .map(|row| row.record)),
            },
            Attempt::Fallback(_) => Ok(self.mirror.get(id).await?.map(|row| row.record)),
        }
    }

    /// Lists records matching `filter`, refreshing the mirror from the
    /// remote store when reachable. Pending local rows are included.
    ///
    /// When the remote answers, a synced mirror row it no longer returns is
    /// left out, matching [`MirroredRepository::get`].
    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<R>> {
        let call = self.remote.select(R::TABLE, filter);
        let remote_ids = match self.attempt(Operation::Read, None, call).await? {
            Attempt::Remote(rows) => {
                let records = Self::decode_rows(rows);
                self.mirror.refresh_all(&records).await?;
                Some(
                    records
                        .iter()
                        .map(|record| record.id().to_string())
                        .collect::<HashSet<_>>(),
                )
            }
            Attempt::Fallback(_) => None,
        };

        let rows = self.mirror.list(filter).await?;
        Ok(rows
            .into_iter()
            .filter(|row| match &remote_ids {
                Some(ids) => row.is_pending() || ids.contains(row.record.id()),
                None => true,
            })
            .map(|row| row.record)
            .collect())
    }

    /// Applies a partial update.
    ///
    /// ## Errors
    /// * `Validation` - the patch is invalid or empty (before any I/O), or
    ///   doesn't fit the current row (e.g. a payment above the total)
    /// * `NotFound` - the id is unknown both remotely and locally
    /// * `RemoteRejected` / `Unauthenticated` - the remote refused
    pub async fn update<P: Patch<R>>(&self, id: &str, patch: &P) -> SyncResult<R> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(CoreError::EmptyPatch {
                entity: R::ENTITY.to_string(),
            }
            .into());
        }

        let _guard = self.locks.acquire(id).await;
        if patch.needs_current() {
            if let Some(current) = self.current(id).await? {
                patch.validate_against(&current)?;
            }
        }
        let now = Utc::now();

        let mut body = serde_json::to_value(patch)?;
        if let Value::Object(fields) = &mut body {
            fields.insert("updated_at".to_string(), serde_json::to_value(now)?);
        }

        let call = self.remote.update(R::TABLE, id, body);
        match self.attempt(Operation::Update, Some(id), call).await {
            Ok(Attempt::Remote(row)) => {
                let local = self.mirror.get(id).await?;
                if local.as_ref().is_some_and(MirrorRow::is_pending) {
                    // The pending row is pushed whole later.
                    return self.apply_locally(id, patch, now).await;
                }
                let record = Self::decode(row)?;
                self.mirror.upsert(&record, true).await?;
                info!(table = R::TABLE, id, "Updated");
                Ok(record)
            }
            Ok(Attempt::Fallback(_)) => self.apply_locally(id, patch, now).await,
            Err(SyncError::RemoteRejected {
                kind: RejectionKind::NotFound,
                ..
            }) => match self.mirror.get(id).await? {
                Some(row) if row.is_pending() => self.apply_locally(id, patch, now).await,
                _ => Err(SyncError::not_found(R::ENTITY, id)),
            },
            Err(e) => Err(e),
        }
    }

    /// The row a patch will be applied to: the mirror's copy, else the
    /// remote's when reachable.
    async fn current(&self, id: &str) -> SyncResult<Option<R>> {
        if let Some(row) = self.mirror.get(id).await? {
            return Ok(Some(row.record));
        }

        let filter = Filter::new().eq("id", id).limit(1);
        let call = self.remote.select(R::TABLE, &filter);
        match self.attempt(Operation::Read, Some(id), call).await? {
            Attempt::Remote(rows) => rows.into_iter().next().map(Self::decode).transpose(),
            Attempt::Fallback(_) => Ok(None),
        }
    }

    async fn apply_locally<P: Patch<R>>(
        &self,
        id: &str,
        patch: &P,
        now: chrono::DateTime<Utc>,
    ) -> SyncResult<R> {
        let mut record = self
            .mirror
            .get(id)
            .await?
            .ok_or_else(|| SyncError::not_found(R::ENTITY, id))?
            .record;

        patch.apply_to(&mut record, now);
        self.mirror.upsert(&record, false).await?;
        info!(table = R::TABLE, id, "Updated locally, pending sync");
        Ok(record)
    }

    /// Deletes a record. Returns whether it existed on either side.
    ///
    /// ## Errors
    /// * `DeactivateInstead` - other remote rows still reference it; the
    ///   mirror is left untouched
    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        let _guard = self.locks.acquire(id).await;

        let call = self.remote.delete(R::TABLE, id);
        match self.attempt(Operation::Delete, Some(id), call).await {
            Ok(Attempt::Remote(existed)) => {
                let local = self.mirror.delete(id).await?;
                info!(table = R::TABLE, id, "Deleted");
                Ok(existed || local)
            }
            Ok(Attempt::Fallback(reason)) => {
                let local = self.mirror.delete(id).await?;
                warn!(
                    table = R::TABLE,
                    id,
                    reason = %reason,
                    "Deleted from local mirror only; the remote delete is not replayed"
                );
                Ok(local)
            }
            Err(SyncError::RemoteRejected {
                kind: RejectionKind::NotFound,
                ..
            }) => Ok(self.mirror.delete(id).await?),
            Err(SyncError::RemoteRejected {
                kind: RejectionKind::ForeignKey,
                ..
            }) => Err(SyncError::DeactivateInstead {
                entity: R::ENTITY.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Reconciliation Support
    // =========================================================================

    /// Pending local rows, oldest first.
    pub async fn pending(&self) -> SyncResult<Vec<R>> {
        Ok(self.mirror.pending().await?)
    }

    pub async fn count_pending(&self) -> SyncResult<i64> {
        Ok(self.mirror.count_pending().await?)
    }

    /// Pushes the current mirror version of a pending row: update by key
    /// with the full row, insert if the remote has no such row. Marks it
    /// synced on success.
    ///
    /// Nothing falls back here; any remote failure is returned and the row
    /// stays pending.
    pub async fn push(&self, id: &str) -> SyncResult<PushOutcome> {
        let _guard = self.locks.acquire(id).await;

        let record = match self.mirror.get(id).await? {
            Some(row) if row.is_pending() => row.record,
            _ => return Ok(PushOutcome::Skipped),
        };
        let row = Self::encode(&record)?;

        let updated = self
            .bounded(self.remote.update(R::TABLE, id, row.clone()))
            .await;
        match updated {
            Ok(_) => {}
            Err(err) if err.rejection() == Some(RejectionKind::NotFound) => {
                self.bounded(self.remote.insert(R::TABLE, row)).await?;
            }
            Err(err) => {
                if err.is_transient() {
                    debug!(table = R::TABLE, id, error = %err, "Push deferred, remote unreachable");
                }
                return Err(err.into());
            }
        }

        self.mirror.mark_synced(id).await?;
        debug!(table = R::TABLE, id, "Pushed pending row");
        Ok(PushOutcome::Pushed)
    }

    /// Pulls every remote row and refreshes the mirror. Pending rows are
    /// kept. Returns how many rows were applied.
    pub async fn refresh_from_remote(&self) -> SyncResult<usize> {
        let rows = self
            .bounded(self.remote.select(R::TABLE, &Filter::new()))
            .await?;
        let records = Self::decode_rows(rows);
        Ok(self.mirror.refresh_all(&records).await?)
    }
}
