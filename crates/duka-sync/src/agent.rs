//! # Sync Agent
//!
//! Decides when to reconcile. Listens for session events, manual refresh
//! requests and reconnects, and runs a reconciliation pass for each.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │   SessionManager ──SignedIn──────────┐                                 │
//! │                                      │                                  │
//! │   SyncAgentHandle ──refresh()────────┼──► select! loop ──► Reconciler  │
//! │                                      │        │             sync_all() │
//! │   poll tick ──offline → online───────┘        │                        │
//! │                                               ▼                         │
//! │                                     SyncStatus (RwLock)                │
//! │                                     pending_count, last_report,        │
//! │                                     online, last_error                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sign-in, token refresh and manual refresh always start a pass; a
//! reconnect only does for a signed-in session. In `offline` mode no pass
//! pushes anything and every pending row is reported as deferred.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{SyncMode, SyncSettings};
use crate::connectivity::ConnectivityOracle;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{Reconciler, SyncReport};
use crate::session::{SessionEvent, SessionManager};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub mode: SyncMode,

    /// Last connectivity answer seen by the agent.
    pub online: bool,

    /// A pass is running right now.
    pub syncing: bool,

    /// Pending mirror rows after the last pass.
    pub pending_count: i64,

    /// When the last pass finished.
    pub last_sync: Option<DateTime<Utc>>,

    pub last_report: Option<SyncReport>,

    /// First table error of the last pass, if any.
    pub last_error: Option<String>,
}

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SignIn,
    TokenRefresh,
    Manual,
    Reconnect,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::SignIn => write!(f, "sign-in"),
            Trigger::TokenRefresh => write!(f, "token-refresh"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Reconnect => write!(f, "reconnect"),
        }
    }
}

enum AgentCommand {
    Refresh(oneshot::Sender<SyncReport>),
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Background task that triggers reconciliation.
pub struct SyncAgent {
    reconciler: Arc<Reconciler>,
    sessions: Arc<SessionManager>,
    oracle: Arc<dyn ConnectivityOracle>,
    settings: SyncSettings,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncAgent {
    pub fn new(
        reconciler: Arc<Reconciler>,
        sessions: Arc<SessionManager>,
        oracle: Arc<dyn ConnectivityOracle>,
        settings: SyncSettings,
    ) -> Self {
        let status = SyncStatus {
            mode: settings.mode,
            ..Default::default()
        };

        SyncAgent {
            reconciler,
            sessions,
            oracle,
            settings,
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// Starts the agent loop and returns a handle to it.
    pub fn spawn(self) -> SyncAgentHandle {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        // Events published after spawn() returns are seen by the loop.
        let events = self.sessions.subscribe();

        let status = self.status.clone();
        let reconciler = self.reconciler.clone();

        info!(
            mode = %self.settings.mode,
            poll_secs = self.settings.reconnect_poll_secs,
            "Starting sync agent"
        );
        let task = tokio::spawn(self.run(events, command_rx, shutdown_rx));

        SyncAgentHandle {
            commands: command_tx,
            shutdown_tx,
            status,
            reconciler,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(
        self,
        mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
        mut commands: mpsc::Receiver<AgentCommand>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut poll = tokio::time::interval(self.settings.reconnect_poll());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut was_online = self.oracle.is_online().await;
        self.status.write().await.online = was_online;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }

                event = events.recv() => match event {
                    Ok(SessionEvent::SignedIn { user_id }) => {
                        info!(user_id = %user_id, "Session started, reconciling");
                        self.run_pass(Trigger::SignIn).await;
                    }
                    Ok(SessionEvent::TokenRefreshed) => {
                        debug!("Session token refreshed, reconciling");
                        self.run_pass(Trigger::TokenRefresh).await;
                    }
                    Ok(SessionEvent::SignedOut) => info!("Session ended"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session events, reconciling");
                        self.run_pass(Trigger::SignIn).await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Session channel closed");
                        break;
                    }
                },

                Some(command) = commands.recv() => match command {
                    AgentCommand::Refresh(reply) => {
                        let report = self.run_pass(Trigger::Manual).await;
                        // The caller may have stopped waiting.
                        let _ = reply.send(report);
                    }
                },

                _ = poll.tick() => {
                    let online = self.oracle.is_online().await;
                    self.status.write().await.online = online;

                    if online && !was_online {
                        if self.sessions.is_signed_in().await {
                            info!("Connection restored, reconciling");
                            self.run_pass(Trigger::Reconnect).await;
                        } else {
                            debug!("Connection restored while signed out");
                        }
                    }
                    was_online = online;
                }
            }
        }

        info!("Sync agent stopped");
    }

    async fn run_pass(&self, trigger: Trigger) -> SyncReport {
        self.status.write().await.syncing = true;
        debug!(%trigger, "Reconciliation triggered");

        let report = if self.settings.mode.is_sync_enabled() {
            self.reconciler.sync_all().await
        } else {
            info!(%trigger, "Sync disabled, deferring pending rows");
            self.reconciler.deferred_report().await
        };
        let pending = self.reconciler.pending_count().await;

        let mut status = self.status.write().await;
        status.syncing = false;
        status.last_sync = report.finished_at;
        status.last_error = report.tables.iter().find_map(|t| t.error.clone());
        match pending {
            Ok(count) => status.pending_count = count,
            Err(e) => warn!(error = %e, "Failed to count pending rows"),
        }
        status.last_report = Some(report.clone());

        report
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Controls a running [`SyncAgent`].
#[derive(Clone)]
pub struct SyncAgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SyncStatus>>,
    reconciler: Arc<Reconciler>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for SyncAgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncAgentHandle").finish_non_exhaustive()
    }
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Pending rows right now, across every table.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        self.reconciler.pending_count().await
    }

    /// Runs a pass now and waits for its report.
    pub async fn refresh(&self) -> SyncResult<SyncReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(AgentCommand::Refresh(reply_tx))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        reply_rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the agent and waits for its loop to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync agent task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_session;
    use crate::testing::Harness;
    use duka_core::NewCustomer;
    use std::time::Duration;

    fn settings(poll_secs: u64) -> SyncSettings {
        SyncSettings {
            mode: SyncMode::Auto,
            reconnect_poll_secs: poll_secs,
        }
    }

    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_sync_status_default() {
        let status = SyncStatus::default();
        assert_eq!(status.mode, SyncMode::Auto);
        assert!(!status.syncing);
        assert_eq!(status.pending_count, 0);
        assert!(status.last_report.is_none());
    }

    #[tokio::test]
    async fn test_sign_in_triggers_pass() {
        let h = Harness::offline().await;
        let services = h.services();
        services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();
        h.oracle.set_online(true);

        let handle = h.agent(&services, settings(3600)).spawn();
        h.sessions.sign_in(test_session("u-1")).await;

        let remote = &h.remote;
        assert!(eventually(|| async move { remote.rows("customers").await.len() == 1 }).await);
        let agent = &handle;
        assert!(eventually(|| async move { agent.status().await.last_report.is_some() }).await);
        assert_eq!(handle.pending_count().await.unwrap(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_refresh_returns_report() {
        let h = Harness::online().await;
        let services = h.services();
        let handle = h.agent(&services, settings(3600)).spawn();

        let report = handle.refresh().await.unwrap();
        assert_eq!(report.tables.len(), 5);

        let status = handle.status().await;
        assert!(status.online);
        assert_eq!(status.last_report, Some(report));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_triggers_pass_when_signed_in() {
        let h = Harness::offline().await;
        let services = h.services();
        h.sessions.sign_in(test_session("u-1")).await;

        services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();

        let handle = h.agent(&services, settings(1)).spawn();
        assert_eq!(handle.pending_count().await.unwrap(), 1);

        h.oracle.set_online(true);
        let mut synced = false;
        for _ in 0..30 {
            if handle.pending_count().await.unwrap() == 0 {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(synced);
        assert_eq!(h.remote.rows("customers").await.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_token_refresh_triggers_pass() {
        let h = Harness::offline().await;
        let services = h.services();
        h.sessions.sign_in(test_session("u-1")).await;
        services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();
        h.oracle.set_online(true);

        let handle = h.agent(&services, settings(3600)).spawn();
        h.sessions.refresh(test_session("u-1")).await;

        let remote = &h.remote;
        assert!(eventually(|| async move { remote.rows("customers").await.len() == 1 }).await);
        let agent = &handle;
        assert!(eventually(|| async move { agent.status().await.last_report.is_some() }).await);
        assert_eq!(handle.pending_count().await.unwrap(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_mode_defers_instead_of_pushing() {
        let h = Harness::online().await;
        let services = h.services();
        h.oracle.set_online(false);
        services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();
        h.oracle.set_online(true);

        let offline = SyncSettings {
            mode: SyncMode::Offline,
            reconnect_poll_secs: 3600,
        };
        let handle = h.agent(&services, offline).spawn();

        let report = handle.refresh().await.unwrap();
        assert_eq!(report.deferred(), 1);
        assert_eq!(report.table("customers").unwrap().deferred, 1);
        assert!(h.remote.rows("customers").await.is_empty());
        assert_eq!(handle.status().await.pending_count, 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_fails() {
        let h = Harness::online().await;
        let services = h.services();
        let handle = h.agent(&services, settings(3600)).spawn();

        handle.shutdown().await;
        assert!(matches!(
            handle.refresh().await,
            Err(SyncError::ShuttingDown)
        ));
    }
}
