//! # Domain Types
//!
//! The mirrored entities of the point-of-sale client.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mirrored Entities                               │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  UserProfile    │   │    Customer     │   │    Incident     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  full_name      │   │  name, phone    │   │  severity       │       │
//! │  │  role, status   │   │  status         │   │  reported_by ───┼──► user│
//! │  └─────────────────┘   └────────▲────────┘   └─────────────────┘       │
//! │                                 │                                       │
//! │  ┌─────────────────┐            │            ┌─────────────────┐       │
//! │  │      Sale       │────────────┴────────────│      Debt       │       │
//! │  │  ─────────────  │     customer_id         │  ─────────────  │       │
//! │  │  total_cents    │◄────────────────────────│  sale_id        │       │
//! │  │  paid_cents     │                         │  amount_cents   │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity is keyed by a UUID v4 generated on the device, so a record
//! created offline already has its final primary key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inputs::{NewCustomer, NewDebt, NewIncident, NewSale, NewUserProfile};
use crate::money::Money;

// =============================================================================
// Record Trait
// =============================================================================

/// Common shape of every mirrored entity.
pub trait Record: Clone + Send + Sync + 'static {
    /// Entity name used in errors and log fields ("Customer", "Debt", ...).
    const ENTITY: &'static str;

    /// Primary key.
    fn id(&self) -> &str;

    /// Last modification time.
    fn updated_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_record {
    ($ty:ty, $name:literal) => {
        impl Record for $ty {
            const ENTITY: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }
    };
}

// =============================================================================
// Shared Enums
// =============================================================================

/// Whether a customer or staff member is active.
///
/// Deactivation is the business alternative to deleting a record that
/// other rows still reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    #[default]
    Active,
    Inactive,
}

/// Staff role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    #[default]
    Cashier,
}

// =============================================================================
// User Profile
// =============================================================================

/// A staff member's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserProfile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: ActiveStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(UserProfile, "UserProfile");

impl UserProfile {
    /// Builds a profile from validated input.
    pub fn create(id: String, input: NewUserProfile, now: DateTime<Utc>) -> Self {
        UserProfile {
            id,
            full_name: input.full_name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            phone: input.phone,
            role: input.role,
            status: ActiveStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer of the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub status: ActiveStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(Customer, "Customer");

impl Customer {
    /// Builds a customer from validated input.
    pub fn create(id: String, input: NewCustomer, now: DateTime<Utc>) -> Self {
        Customer {
            id,
            name: input.name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            email: input.email,
            address: input.address,
            status: ActiveStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ActiveStatus::Active
    }
}

// =============================================================================
// Incident
// =============================================================================

/// How serious an incident report is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Open,
    Resolved,
}

/// An incident report filed by staff (breakage, shortage, theft, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    /// UserProfile id of the reporter.
    pub reported_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(Incident, "Incident");

impl Incident {
    pub fn create(id: String, input: NewIncident, now: DateTime<Utc>) -> Self {
        Incident {
            id,
            title: input.title.trim().to_string(),
            description: input.description,
            severity: input.severity,
            status: IncidentStatus::Open,
            reported_by: input.reported_by,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// How a sale was paid.
///
/// `Credit` sales are usually paired with a [`Debt`] for the unpaid part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    MobileMoney,
    Card,
    Credit,
}

/// Lifecycle of a recorded sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale has been paid (fully or on credit) and recorded.
    #[default]
    Completed,
    /// Goods came back; the sale no longer counts toward spend.
    Returned,
    /// Sale was cancelled.
    Voided,
}

/// A recorded sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Human-readable receipt number, e.g. `20260131-9f2a-0417`.
    pub receipt_number: String,
    pub customer_id: Option<String>,
    /// UserProfile id of the cashier.
    pub cashier_id: String,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(Sale, "Sale");

impl Sale {
    pub fn create(
        id: String,
        receipt_number: String,
        input: NewSale,
        now: DateTime<Utc>,
    ) -> Self {
        Sale {
            id,
            receipt_number,
            customer_id: input.customer_id,
            cashier_id: input.cashier_id,
            total_cents: input.total_cents,
            paid_cents: input.paid_cents,
            payment_method: input.payment_method,
            status: SaleStatus::Completed,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Amount still unpaid on this sale.
    #[inline]
    pub fn balance(&self) -> Money {
        self.total().saturating_balance(Money::from_cents(self.paid_cents))
    }

    /// Whether the sale counts toward a customer's spend.
    pub fn counts_toward_spend(&self) -> bool {
        self.status == SaleStatus::Completed
    }
}

// =============================================================================
// Debt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    #[default]
    Open,
    Settled,
    WrittenOff,
}

/// Money a customer owes the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Debt {
    pub id: String,
    pub customer_id: String,
    pub sale_id: Option<String>,
    pub amount_cents: i64,
    pub paid_cents: i64,
    pub status: DebtStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(Debt, "Debt");

impl Debt {
    pub fn create(id: String, input: NewDebt, now: DateTime<Utc>) -> Self {
        let status = if input.paid_cents >= input.amount_cents {
            DebtStatus::Settled
        } else {
            DebtStatus::Open
        };

        Debt {
            id,
            customer_id: input.customer_id,
            sale_id: input.sale_id,
            amount_cents: input.amount_cents,
            paid_cents: input.paid_cents,
            status,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// What the customer still owes on this debt.
    ///
    /// Settled and written-off debts owe nothing regardless of amounts.
    pub fn outstanding(&self) -> Money {
        match self.status {
            DebtStatus::Open => Money::from_cents(self.amount_cents)
                .saturating_balance(Money::from_cents(self.paid_cents)),
            DebtStatus::Settled | DebtStatus::WrittenOff => Money::zero(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
