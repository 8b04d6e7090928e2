//! # Inputs and Patches
//!
//! What callers hand to a service: a `New*` input for creation and a
//! `*Patch` for partial updates.
//!
//! ```text
//! ┌──────────────────┐  validate()  ┌────────────────┐  Entity::create  ┌──────────┐
//! │ NewCustomer      │─────────────►│  valid input   │─────────────────►│ Customer │
//! └──────────────────┘              └────────────────┘  (+ id, now)     └──────────┘
//!
//! ┌──────────────────┐  validate()  ┌────────────────┐  apply_to(row)   ┌──────────┐
//! │ CustomerPatch    │─────────────►│  valid patch   │─────────────────►│ Customer │
//! └──────────────────┘              └────────────────┘  (bumps updated) └──────────┘
//! ```
//!
//! Patches serialize only the fields they carry, so the same value is the
//! JSON body of a remote partial update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    ActiveStatus, Customer, Debt, DebtStatus, Incident, IncidentSeverity, IncidentStatus,
    PaymentMethod, Sale, SaleStatus, UserProfile, UserRole,
};
use crate::validation::{
    validate_amount, validate_email, validate_name, validate_phone, validate_text, validate_uuid,
};

// =============================================================================
// Patch Trait
// =============================================================================

/// A partial update of `T`.
///
/// Absent fields leave the target untouched; applying a patch always bumps
/// `updated_at`.
pub trait Patch<T>: Serialize + Send + Sync {
    /// Checks the fields the patch carries.
    fn validate(&self) -> CoreResult<()>;

    /// Whether [`Patch::validate_against`] needs the current row.
    fn needs_current(&self) -> bool {
        false
    }

    /// Checks the patch against the row it will be applied to.
    fn validate_against(&self, _current: &T) -> CoreResult<()> {
        Ok(())
    }

    /// Applies the carried fields to `target`.
    fn apply_to(&self, target: &mut T, now: DateTime<Utc>);

    /// True when the patch carries no field at all.
    fn is_empty(&self) -> bool;
}

fn check_paid(field: &str, paid: i64, due: i64) -> CoreResult<()> {
    if paid > due {
        return Err(CoreError::Overpayment {
            field: field.to_string(),
            paid,
            due,
        });
    }
    Ok(())
}

// =============================================================================
// Customer
// =============================================================================

/// Input for creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        NewCustomer {
            name: name.into(),
            phone: phone.into(),
            email: None,
            address: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        validate_phone("phone", &self.phone)?;
        if let Some(email) = &self.email {
            validate_email("email", email)?;
        }
        if let Some(address) = &self.address {
            validate_text("address", address)?;
        }
        Ok(())
    }
}

/// Partial update of a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActiveStatus>,
}

impl CustomerPatch {
    /// Patch that only deactivates the customer.
    pub fn deactivate() -> Self {
        CustomerPatch {
            status: Some(ActiveStatus::Inactive),
            ..Default::default()
        }
    }
}

impl Patch<Customer> for CustomerPatch {
    fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        if let Some(phone) = &self.phone {
            validate_phone("phone", phone)?;
        }
        if let Some(email) = &self.email {
            validate_email("email", email)?;
        }
        if let Some(address) = &self.address {
            validate_text("address", address)?;
        }
        Ok(())
    }

    fn apply_to(&self, target: &mut Customer, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            target.name = name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            target.phone = phone.trim().to_string();
        }
        if let Some(email) = &self.email {
            target.email = Some(email.clone());
        }
        if let Some(address) = &self.address {
            target.address = Some(address.clone());
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        target.updated_at = now;
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.status.is_none()
    }
}

// =============================================================================
// User Profile
// =============================================================================

/// Input for creating a staff profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

impl NewUserProfile {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("full_name", &self.full_name)?;
        validate_email("email", &self.email)?;
        if let Some(phone) = &self.phone {
            validate_phone("phone", phone)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActiveStatus>,
}

impl Patch<UserProfile> for UserProfilePatch {
    fn validate(&self) -> CoreResult<()> {
        if let Some(full_name) = &self.full_name {
            validate_name("full_name", full_name)?;
        }
        if let Some(phone) = &self.phone {
            validate_phone("phone", phone)?;
        }
        Ok(())
    }

    fn apply_to(&self, target: &mut UserProfile, now: DateTime<Utc>) {
        if let Some(full_name) = &self.full_name {
            target.full_name = full_name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            target.phone = Some(phone.trim().to_string());
        }
        if let Some(role) = self.role {
            target.role = role;
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        target.updated_at = now;
    }

    fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.role.is_none() && self.status.is_none()
    }
}

// =============================================================================
// Incident
// =============================================================================

/// Input for filing an incident report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub reported_by: String,
}

impl NewIncident {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("title", &self.title)?;
        validate_text("description", &self.description)?;
        validate_uuid("reported_by", &self.reported_by)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<IncidentSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
}

impl Patch<Incident> for IncidentPatch {
    fn validate(&self) -> CoreResult<()> {
        if let Some(title) = &self.title {
            validate_name("title", title)?;
        }
        if let Some(description) = &self.description {
            validate_text("description", description)?;
        }
        Ok(())
    }

    fn apply_to(&self, target: &mut Incident, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            target.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            target.description = description.clone();
        }
        if let Some(severity) = self.severity {
            target.severity = severity;
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        target.updated_at = now;
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.status.is_none()
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Input for recording a sale.
///
/// `receipt_number` is normally left empty and assigned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub receipt_number: Option<String>,
    pub customer_id: Option<String>,
    pub cashier_id: String,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub payment_method: PaymentMethod,
}

impl NewSale {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(customer_id) = &self.customer_id {
            validate_uuid("customer_id", customer_id)?;
        }
        validate_uuid("cashier_id", &self.cashier_id)?;
        validate_amount("total_cents", self.total_cents)?;
        validate_amount("paid_cents", self.paid_cents)?;
        check_paid("paid_cents", self.paid_cents, self.total_cents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SaleStatus>,
}

impl Patch<Sale> for SalePatch {
    fn validate(&self) -> CoreResult<()> {
        if let Some(customer_id) = &self.customer_id {
            validate_uuid("customer_id", customer_id)?;
        }
        if let Some(paid) = self.paid_cents {
            validate_amount("paid_cents", paid)?;
        }
        Ok(())
    }

    fn needs_current(&self) -> bool {
        self.paid_cents.is_some()
    }

    fn validate_against(&self, current: &Sale) -> CoreResult<()> {
        match self.paid_cents {
            Some(paid) => check_paid("paid_cents", paid, current.total_cents),
            None => Ok(()),
        }
    }

    fn apply_to(&self, target: &mut Sale, now: DateTime<Utc>) {
        if let Some(customer_id) = &self.customer_id {
            target.customer_id = Some(customer_id.clone());
        }
        if let Some(paid) = self.paid_cents {
            target.paid_cents = paid;
        }
        if let Some(method) = self.payment_method {
            target.payment_method = method;
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        target.updated_at = now;
    }

    fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.paid_cents.is_none()
            && self.payment_method.is_none()
            && self.status.is_none()
    }
}

// =============================================================================
// Debt
// =============================================================================

/// Input for recording a customer debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDebt {
    pub customer_id: String,
    pub sale_id: Option<String>,
    pub amount_cents: i64,
    pub paid_cents: i64,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewDebt {
    pub fn validate(&self) -> CoreResult<()> {
        validate_uuid("customer_id", &self.customer_id)?;
        if let Some(sale_id) = &self.sale_id {
            validate_uuid("sale_id", sale_id)?;
        }
        validate_amount("amount_cents", self.amount_cents)?;
        validate_amount("paid_cents", self.paid_cents)?;
        check_paid("paid_cents", self.paid_cents, self.amount_cents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DebtStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Patch<Debt> for DebtPatch {
    fn validate(&self) -> CoreResult<()> {
        if let Some(paid) = self.paid_cents {
            validate_amount("paid_cents", paid)?;
        }
        Ok(())
    }

    fn needs_current(&self) -> bool {
        self.paid_cents.is_some()
    }

    fn validate_against(&self, current: &Debt) -> CoreResult<()> {
        match self.paid_cents {
            Some(paid) => check_paid("paid_cents", paid, current.amount_cents),
            None => Ok(()),
        }
    }

    /// Recording a payment that covers the amount settles an open debt,
    /// unless the patch sets a status explicitly.
    fn apply_to(&self, target: &mut Debt, now: DateTime<Utc>) {
        if let Some(paid) = self.paid_cents {
            target.paid_cents = paid;
            if self.status.is_none()
                && target.status == DebtStatus::Open
                && target.paid_cents >= target.amount_cents
            {
                target.status = DebtStatus::Settled;
            }
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        if let Some(due_date) = self.due_date {
            target.due_date = Some(due_date);
        }
        target.updated_at = now;
    }

    fn is_empty(&self) -> bool {
        self.paid_cents.is_none() && self.status.is_none() && self.due_date.is_none()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CASHIER: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_new_customer_validation() {
        assert!(NewCustomer::new("Jane", "+255700000001").validate().is_ok());
        assert!(NewCustomer::new("", "+255700000001").validate().is_err());
        assert!(NewCustomer::new("Jane", "0700").validate().is_err());
        assert!(NewCustomer::new("Jane", "+255700000001")
            .with_email("not-an-email")
            .validate()
            .is_err());
    }

    #[test]
    fn test_new_sale_rejects_overpayment() {
        let sale = NewSale {
            receipt_number: None,
            customer_id: None,
            cashier_id: CASHIER.to_string(),
            total_cents: 1000,
            paid_cents: 1500,
            payment_method: PaymentMethod::Cash,
        };
        assert!(matches!(sale.validate(), Err(CoreError::Overpayment { .. })));
    }

    #[test]
    fn test_customer_patch_serializes_only_present_fields() {
        let patch = CustomerPatch::deactivate();
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "inactive" }));
        assert!(!patch.is_empty());
        assert!(CustomerPatch::default().is_empty());
    }

    #[test]
    fn test_customer_patch_apply_bumps_updated_at() {
        let created = Utc::now();
        let mut customer = Customer::create(
            "c-1".to_string(),
            NewCustomer::new("Jane", "+255700000001"),
            created,
        );

        let later = created + Duration::seconds(5);
        CustomerPatch {
            name: Some("Jane Doe".to_string()),
            ..Default::default()
        }
        .apply_to(&mut customer, later);

        assert_eq!(customer.name, "Jane Doe");
        assert_eq!(customer.phone, "+255700000001");
        assert_eq!(customer.updated_at, later);
        assert_eq!(customer.created_at, created);
    }

    #[test]
    fn test_debt_patch_settles_when_fully_paid() {
        let now = Utc::now();
        let mut debt = Debt::create(
            "d-1".to_string(),
            NewDebt {
                customer_id: CASHIER.to_string(),
                sale_id: None,
                amount_cents: 1000,
                paid_cents: 0,
                due_date: None,
            },
            now,
        );
        assert_eq!(debt.status, DebtStatus::Open);

        DebtPatch {
            paid_cents: Some(1000),
            ..Default::default()
        }
        .apply_to(&mut debt, now);
        assert_eq!(debt.status, DebtStatus::Settled);
        assert!(debt.outstanding().is_zero());
    }

    #[test]
    fn test_payment_patches_check_the_current_row() {
        let now = Utc::now();
        let debt = Debt::create(
            "d-1".to_string(),
            NewDebt {
                customer_id: CASHIER.to_string(),
                sale_id: None,
                amount_cents: 5000,
                paid_cents: 0,
                due_date: None,
            },
            now,
        );

        let overpaid = DebtPatch {
            paid_cents: Some(9000),
            ..Default::default()
        };
        assert!(overpaid.needs_current());
        assert!(overpaid.validate().is_ok());
        assert!(matches!(
            overpaid.validate_against(&debt),
            Err(CoreError::Overpayment { paid: 9000, due: 5000, .. })
        ));

        let exact = DebtPatch {
            paid_cents: Some(5000),
            ..Default::default()
        };
        assert!(exact.validate_against(&debt).is_ok());
        assert!(!DebtPatch {
            status: Some(DebtStatus::WrittenOff),
            ..Default::default()
        }
        .needs_current());
    }

    #[test]
    fn test_incident_requires_reporter_uuid() {
        let incident = NewIncident {
            title: "Broken scale".to_string(),
            description: String::new(),
            severity: IncidentSeverity::Medium,
            reported_by: "nobody".to_string(),
        };
        assert!(incident.validate().is_err());
    }
}
