//! # duka-sync: Offline-First Sync Layer for Duka
//!
//! Every read and write a screen makes goes through a domain service. The
//! service's repository asks the remote store first when the device is
//! online and falls back to the local mirror when it isn't; rows written
//! locally stay pending until a reconciliation pass pushes them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Duka Sync Layer                                 │
//! │                                                                         │
//! │   screens ──► Services ──► MirroredRepository<R> ──┬──► RemoteStore    │
//! │                                 │                   │   (PostgREST)     │
//! │                                 │ is_online()?      │                   │
//! │                                 ▼                   └──► MirrorTable<R> │
//! │                        ConnectivityOracle                (SQLite,       │
//! │                                                           synced flag)  │
//! │                                                                         │
//! │   SessionManager ──SignedIn──► SyncAgent ──► Reconciler                │
//! │   reconnect / manual refresh ──┘               push pending rows,      │
//! │                                                refresh mirror          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`services`] - Five-operation domain services (customers, users, ...)
//! - [`repository`] - Generic remote-first, mirror-backed repository
//! - [`reconcile`] - Reconciliation passes and reports
//! - [`agent`] - Background task that decides when to reconcile
//! - [`remote`] - Remote store boundary (REST and in-memory)
//! - [`connectivity`] - Reachability oracle
//! - [`session`] - Session tokens and lifecycle events
//! - [`config`] - Layered configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use duka_db::Database;
//! use duka_sync::{HttpProbe, Reconciler, RestRemoteStore, Services, SessionManager, SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::open(config.db_config()?).await?;
//! let sessions = Arc::new(SessionManager::new());
//! let remote = Arc::new(RestRemoteStore::new(&config.remote, sessions.clone())?);
//! let oracle = Arc::new(HttpProbe::new(&config.remote)?);
//!
//! let services = Services::new(&db, remote, oracle.clone(), config.remote.request_timeout());
//! let reconciler = Arc::new(Reconciler::new(services.tiers()));
//! let agent = SyncAgent::new(reconciler, sessions.clone(), oracle, config.sync.clone()).spawn();
//!
//! let jane = services.customers.create(NewCustomer::new("Jane", "+255700000001")).await?;
//! println!("pending rows: {}", agent.pending_count().await?);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod reconcile;
pub mod remote;
pub mod repository;
pub mod services;
pub mod session;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{SyncAgent, SyncAgentHandle, SyncStatus, Trigger};
pub use config::{MirrorSettings, RemoteSettings, SyncConfig, SyncMode, SyncSettings};
pub use connectivity::{ConnectivityOracle, HttpProbe, ManualConnectivity};
pub use error::{SyncError, SyncResult};
pub use reconcile::{Reconcilable, Reconciler, SyncReport, TableReport};
pub use remote::{
    MemoryRemoteStore, RejectionKind, RemoteError, RemoteResult, RemoteStore, RestRemoteStore,
};
pub use repository::{FallbackReason, MirroredRepository, Operation, PushOutcome};
pub use services::{
    CustomerService, DebtService, IncidentService, SaleService, Services, UserService,
};
pub use session::{AuthSession, SessionEvent, SessionManager};
