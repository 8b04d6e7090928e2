//! # duka-core: Pure Domain Types for Duka
//!
//! Every entity the point-of-sale client reads and writes is defined here,
//! together with its creation input, its partial-update patch and the
//! validation rules applied before any I/O happens.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Screens (sales, customers, staff, audits)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ five-operation services                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    duka-sync (repositories)                     │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────┐  ┌────────────▼────────────────────┐  │
//! │  │  duka-db (local mirror)     │  │  remote store (PostgREST)       │  │
//! │  └─────────────────────────────┘  └─────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ duka-core (THIS CRATE) ★                        │   │
//! │  │   types • patches • account fold • money • filter • validation  │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities (Customer, UserProfile, Incident, Sale, Debt) and enums
//! - [`inputs`] - Creation inputs and partial-update patches
//! - [`account`] - The derived `CustomerAccount` view
//! - [`filter`] - Equality filters shared by the mirror and the remote store
//! - [`money`] - Integer money
//! - [`validation`] - Field validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use duka_core::{Customer, NewCustomer};
//!
//! let input = NewCustomer::new("Jane", "+255700000001");
//! input.validate().unwrap();
//!
//! let customer = Customer::create("7f1c0c5e-0000-4000-8000-000000000001".into(), input, Utc::now());
//! assert_eq!(customer.name, "Jane");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod account;
pub mod error;
pub mod filter;
pub mod inputs;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use account::{fold_accounts, CustomerAccount};
pub use error::{CoreError, CoreResult, ValidationError};
pub use filter::{Filter, FilterValue};
pub use inputs::*;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a person or customer name.
pub const MAX_NAME_LEN: usize = 120;

/// Maximum length of free-form text (incident descriptions, addresses).
pub const MAX_TEXT_LEN: usize = 2000;
