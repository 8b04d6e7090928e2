//! # Reconciliation Engine
//!
//! Pushes every pending mirror row to the remote store, then refreshes the
//! mirror from it.
//!
//! ## Pass Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          sync_all()                                     │
//! │                                                                         │
//! │  tier 1   user_profiles ║ customers        (concurrently)              │
//! │              │                                                          │
//! │  tier 2   incidents     ║ sales            (after tier 1)              │
//! │              │                                                          │
//! │  tier 3   debts                            (after tier 2)              │
//! │                                                                         │
//! │  per table:                                                            │
//! │    offline?            → defer every pending row                       │
//! │    for row in pending (oldest first):                                  │
//! │      push  ok          → synced = 1                                    │
//! │            rejected    → stays pending, next row                       │
//! │            unreachable → stays pending, defer the rest                 │
//! │    select * → conditional refresh (pending rows kept)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A row is either pending or synced. There is no conflicted state: the
//! remote wins on read, and a local write wins until it has been pushed.
//!
//! A pass never fails. What happened is returned as a [`SyncReport`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use duka_db::MirrorRecord;

use crate::error::{SyncError, SyncResult};
use crate::repository::{MirroredRepository, PushOutcome};

// =============================================================================
// Reports
// =============================================================================

/// Outcome of reconciling one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    /// Rows now synced.
    pub pushed: usize,
    /// Rows the remote refused; still pending.
    pub rejected: usize,
    /// Rows left for the next trigger (offline or unreachable).
    pub deferred: usize,
    /// Remote rows applied to the mirror.
    pub refreshed: usize,
    /// Why the table stopped early, if it did.
    pub error: Option<String>,
}

impl TableReport {
    fn new(table: &str) -> Self {
        TableReport {
            table: table.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tables: Vec<TableReport>,
    /// True when this trigger joined a pass that was already running.
    pub coalesced: bool,
}

impl SyncReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn pushed(&self) -> usize {
        self.tables.iter().map(|t| t.pushed).sum()
    }

    pub fn rejected(&self) -> usize {
        self.tables.iter().map(|t| t.rejected).sum()
    }

    pub fn deferred(&self) -> usize {
        self.tables.iter().map(|t| t.deferred).sum()
    }

    /// Nothing rejected, deferred or failed.
    pub fn is_clean(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.rejected == 0 && t.deferred == 0 && t.error.is_none())
    }
}

// =============================================================================
// Reconcilable
// =============================================================================

/// A table the reconciler can push and refresh.
#[async_trait]
pub trait Reconcilable: Send + Sync {
    fn table(&self) -> &'static str;

    async fn pending_count(&self) -> SyncResult<i64>;

    /// Pushes pending rows and refreshes the table. Never fails.
    async fn reconcile(&self) -> TableReport;
}

#[async_trait]
impl<R: MirrorRecord> Reconcilable for MirroredRepository<R> {
    fn table(&self) -> &'static str {
        R::TABLE
    }

    async fn pending_count(&self) -> SyncResult<i64> {
        self.count_pending().await
    }

    async fn reconcile(&self) -> TableReport {
        let mut report = TableReport::new(R::TABLE);

        let pending = match self.pending().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(table = R::TABLE, error = %e, "Failed to read pending rows");
                report.error = Some(e.to_string());
                return report;
            }
        };

        if !self.is_online().await {
            report.deferred = pending.len();
            debug!(table = R::TABLE, deferred = report.deferred, "Offline, deferring table");
            return report;
        }

        for (index, record) in pending.iter().enumerate() {
            let id = record.id();
            match self.push(id).await {
                Ok(PushOutcome::Pushed) => report.pushed += 1,
                Ok(PushOutcome::Skipped) => {}
                Err(SyncError::RemoteRejected { kind, message }) => {
                    report.rejected += 1;
                    warn!(table = R::TABLE, id, %kind, message = %message, "Push rejected, row stays pending");
                }
                Err(SyncError::RemoteUnavailable(reason)) => {
                    report.deferred = pending.len() - index;
                    warn!(table = R::TABLE, id, reason = %reason, deferred = report.deferred, "Remote unavailable, deferring rest of table");
                    return report;
                }
                Err(e) => {
                    report.deferred = pending.len() - index;
                    error!(table = R::TABLE, id, error = %e, "Push failed, stopping table");
                    report.error = Some(e.to_string());
                    return report;
                }
            }
        }

        match self.refresh_from_remote().await {
            Ok(refreshed) => report.refreshed = refreshed,
            Err(SyncError::RemoteUnavailable(reason)) => {
                warn!(table = R::TABLE, reason = %reason, "Refresh skipped, remote unavailable");
            }
            Err(e) => {
                error!(table = R::TABLE, error = %e, "Refresh failed");
                report.error = Some(e.to_string());
            }
        }

        report
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Runs reconciliation passes over tiers of tables.
pub struct Reconciler {
    tiers: Vec<Vec<Arc<dyn Reconcilable>>>,
    running: Mutex<()>,
    last: RwLock<Option<SyncReport>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tiers: Vec<Vec<&str>> = self
            .tiers
            .iter()
            .map(|tier| tier.iter().map(|t| t.table()).collect())
            .collect();
        f.debug_struct("Reconciler").field("tiers", &tiers).finish()
    }
}

impl Reconciler {
    /// `tiers` run in order; tables within a tier run concurrently.
    pub fn new(tiers: Vec<Vec<Arc<dyn Reconcilable>>>) -> Self {
        Reconciler {
            tiers,
            running: Mutex::new(()),
            last: RwLock::new(None),
        }
    }

    /// Runs one pass. A call made while a pass is running waits for that
    /// pass and returns its report marked `coalesced`.
    pub async fn sync_all(&self) -> SyncReport {
        let _pass = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Reconciliation already running, joining it");
                let _joined = self.running.lock().await;
                let mut report = self.last_report().await.unwrap_or_default();
                report.coalesced = true;
                return report;
            }
        };

        info!("Reconciliation pass started");
        let mut report = SyncReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        for tier in &self.tiers {
            let tables = join_all(tier.iter().map(|table| table.reconcile())).await;
            report.tables.extend(tables);
        }

        report.finished_at = Some(Utc::now());
        info!(
            pushed = report.pushed(),
            rejected = report.rejected(),
            deferred = report.deferred(),
            "Reconciliation pass finished"
        );

        *self.last.write().await = Some(report.clone());
        report
    }

    /// Report for a pass that was not run: every pending row is deferred.
    pub async fn deferred_report(&self) -> SyncReport {
        let now = Utc::now();
        let mut report = SyncReport {
            started_at: Some(now),
            finished_at: Some(now),
            ..Default::default()
        };

        for table in self.tiers.iter().flatten() {
            let mut entry = TableReport::new(table.table());
            match table.pending_count().await {
                Ok(count) => entry.deferred = usize::try_from(count).unwrap_or_default(),
                Err(e) => entry.error = Some(e.to_string()),
            }
            report.tables.push(entry);
        }
        report
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last.read().await.clone()
    }

    /// Pending rows across every table.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        let mut total = 0;
        for table in self.tiers.iter().flatten() {
            total += table.pending_count().await?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Fault, FaultRule, RejectionKind, RemoteOp};
    use crate::testing::Harness;
    use duka_core::{Customer, Filter, IncidentSeverity, NewCustomer, NewDebt, NewIncident};
    use std::time::Duration;

    const STAFF: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn customer(n: usize) -> NewCustomer {
        NewCustomer::new(format!("Customer {n}"), format!("+2557000000{n:02}"))
    }

    #[tokio::test]
    async fn test_offline_create_then_reconnect_scenario() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        let account = services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();

        h.oracle.set_online(true);
        let report = reconciler.sync_all().await;

        assert_eq!(report.table("customers").unwrap().pushed, 1);
        assert!(report.is_clean());
        let remote = h.remote.row("customers", account.id()).await.unwrap();
        assert_eq!(remote["name"], "Jane");
        let row = h
            .db
            .mirror::<Customer>()
            .get(account.id())
            .await
            .unwrap()
            .unwrap();
        assert!(row.synced);
    }

    #[tokio::test]
    async fn test_eventual_consistency_across_tables() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        let mut written = Vec::new();
        for n in 0..3 {
            written.push(services.customers.create(customer(n)).await.unwrap());
        }
        let debt = services
            .debts
            .create(NewDebt {
                customer_id: written[0].id().to_string(),
                sale_id: None,
                amount_cents: 1_000,
                paid_cents: 0,
                due_date: None,
            })
            .await
            .unwrap();
        let incident = services
            .incidents
            .create(NewIncident {
                title: "Broken scale".to_string(),
                description: "Scale at till 2 reads 0".to_string(),
                severity: IncidentSeverity::Low,
                reported_by: STAFF.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reconciler.pending_count().await.unwrap(), 5);

        h.oracle.set_online(true);
        let report = reconciler.sync_all().await;

        assert_eq!(report.pushed(), 5);
        assert_eq!(reconciler.pending_count().await.unwrap(), 0);
        assert_eq!(h.remote.rows("customers").await.len(), 3);
        for account in &written {
            let remote = h.remote.row("customers", account.id()).await.unwrap();
            let local: Customer = serde_json::from_value(remote).unwrap();
            assert_eq!(local, account.customer);
        }
        assert!(h.remote.row("debts", &debt.id).await.is_some());
        assert!(h.remote.row("incidents", &incident.id).await.is_some());
    }

    #[tokio::test]
    async fn test_repeated_passes_are_idempotent() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        for n in 0..2 {
            services.customers.create(customer(n)).await.unwrap();
        }
        h.oracle.set_online(true);

        reconciler.sync_all().await;
        let mirror_before = h.db.mirror::<Customer>().list(&Filter::new()).await.unwrap();
        let remote_before = h.remote.rows("customers").await;

        let second = reconciler.sync_all().await;
        assert_eq!(second.pushed(), 0);
        assert_eq!(
            h.db.mirror::<Customer>().list(&Filter::new()).await.unwrap(),
            mirror_before
        );
        assert_eq!(h.remote.rows("customers").await, remote_before);
    }

    #[tokio::test]
    async fn test_rejected_push_does_not_block_later_rows() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        let refused = services.customers.create(customer(1)).await.unwrap();
        let accepted = services.customers.create(customer(2)).await.unwrap();

        h.remote
            .inject(
                FaultRule::on(RemoteOp::Insert, Fault::reject(RejectionKind::PermissionDenied))
                    .id(refused.id().to_string()),
            )
            .await;
        h.oracle.set_online(true);

        let report = reconciler.sync_all().await;
        let customers = report.table("customers").unwrap();
        assert_eq!(customers.pushed, 1);
        assert_eq!(customers.rejected, 1);
        assert!(!report.is_clean());

        let mirror = h.db.mirror::<Customer>();
        assert!(mirror.get(refused.id()).await.unwrap().unwrap().is_pending());
        assert!(mirror.get(accepted.id()).await.unwrap().unwrap().synced);
    }

    #[tokio::test]
    async fn test_unreachable_push_defers_rest_of_table() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        for n in 0..3 {
            services.customers.create(customer(n)).await.unwrap();
        }
        h.remote
            .inject(FaultRule::on(RemoteOp::Update, Fault::unreachable()))
            .await;
        h.oracle.set_online(true);

        let report = reconciler.sync_all().await;
        assert_eq!(report.table("customers").unwrap().deferred, 3);
        assert_eq!(reconciler.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_offline_pass_defers_everything() {
        let h = Harness::offline().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        services.customers.create(customer(1)).await.unwrap();

        let report = reconciler.sync_all().await;
        assert_eq!(report.deferred(), 1);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_pulls_remote_rows() {
        let h = Harness::online().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        let remote_only = Customer::create(
            uuid::Uuid::new_v4().to_string(),
            customer(7),
            Utc::now(),
        );
        h.remote
            .seed("customers", serde_json::to_value(&remote_only).unwrap())
            .await;

        let report = reconciler.sync_all().await;
        assert_eq!(report.table("customers").unwrap().refreshed, 1);

        h.oracle.set_online(false);
        let listed = services.customers.list(&Filter::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].customer, remote_only);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let h = Harness::online().await;
        let services = h.services();
        let reconciler = Reconciler::new(services.tiers());

        h.remote
            .inject(FaultRule::on(RemoteOp::Select, Fault::Delay(Duration::from_millis(50))))
            .await;

        let (first, second) = tokio::join!(reconciler.sync_all(), reconciler.sync_all());
        assert_ne!(first.coalesced, second.coalesced);
        assert_eq!(first.tables, second.tables);
        assert_eq!(reconciler.last_report().await.unwrap().tables.len(), 5);
    }
}
