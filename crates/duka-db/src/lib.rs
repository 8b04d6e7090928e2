//! # duka-db: Local Mirror Store for Duka
//!
//! The on-device copy of every mirrored entity. Each row carries a `synced`
//! flag telling the reconciliation pass whether it still has to be pushed.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka Data Flow                                   │
//! │                                                                         │
//! │  CustomerService::create (duka-sync)                                   │
//! │       │ offline, or remote unreachable                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     duka-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  MirrorTable<R>│    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (mirror.rs)   │    │  (embedded)  │  │   │
//! │  │   │               │    │                │    │              │  │   │
//! │  │   │ open / close  │◄───│ upsert/refresh │    │ 001_mirror_  │  │   │
//! │  │   │ SqlitePool    │    │ pending/get    │    │ tables.sql   │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      SQLite mirror (customers, user_profiles, incidents,        │   │
//! │  │                     sales, debts; each with `synced`)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - `Database` handle with explicit open/close
//! - [`migrations`] - Embedded migrations
//! - [`mirror`] - `MirrorRecord` trait and the generic `MirrorTable<R>`
//! - [`records`] - Column bindings for the five entities
//! - [`error`] - Mirror error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duka_core::Customer;
//! use duka_db::{Database, DbConfig};
//!
//! let db = Database::open(DbConfig::new("mirror.db")).await?;
//! let pending = db.mirror::<Customer>().pending().await?;
//! db.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod mirror;
pub mod pool;
pub mod records;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use mirror::{MirrorRecord, MirrorRow, MirrorTable};
pub use pool::{Database, DbConfig};
