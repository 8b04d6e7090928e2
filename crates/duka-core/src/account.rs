//! # Customer Account
//!
//! The aggregate view returned by the customer service: a customer plus
//! figures folded from that customer's sales and debts.
//!
//! ```text
//!   customers ──┐
//!   sales     ──┼──► fold_accounts ──► [CustomerAccount]
//!   debts     ──┘      (in memory, recomputed on every read)
//! ```
//!
//! The account is never stored. Both the mirror and the remote store only
//! hold the base rows; the figures are derived here so an offline sale or
//! debt payment is reflected immediately.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{Customer, Debt, Sale};

/// A customer together with derived spend and debt figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAccount {
    #[serde(flatten)]
    pub customer: Customer,
    /// Sum of what is still owed on open debts.
    pub outstanding_debt: Money,
    /// Sum of completed sale totals.
    pub total_spent: Money,
    pub sale_count: u32,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

impl CustomerAccount {
    /// An account with no sales or debts.
    pub fn empty(customer: Customer) -> Self {
        CustomerAccount {
            customer,
            outstanding_debt: Money::zero(),
            total_spent: Money::zero(),
            sale_count: 0,
            last_purchase_at: None,
        }
    }

    /// Folds the given rows into one account. Rows belonging to other
    /// customers are ignored.
    pub fn fold<'a>(
        customer: Customer,
        sales: impl IntoIterator<Item = &'a Sale>,
        debts: impl IntoIterator<Item = &'a Debt>,
    ) -> Self {
        let mut account = CustomerAccount::empty(customer);
        for sale in sales {
            if sale.customer_id.as_deref() == Some(account.customer.id.as_str()) {
                account.add_sale(sale);
            }
        }
        for debt in debts {
            if debt.customer_id == account.customer.id {
                account.add_debt(debt);
            }
        }
        account
    }

    fn add_sale(&mut self, sale: &Sale) {
        if !sale.counts_toward_spend() {
            return;
        }
        self.total_spent += sale.total();
        self.sale_count += 1;
        self.last_purchase_at = match self.last_purchase_at {
            Some(last) if last >= sale.created_at => Some(last),
            _ => Some(sale.created_at),
        };
    }

    fn add_debt(&mut self, debt: &Debt) {
        self.outstanding_debt += debt.outstanding();
    }

    pub fn id(&self) -> &str {
        &self.customer.id
    }
}

/// Folds every customer against the full sale and debt tables in one pass.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use duka_core::{fold_accounts, Customer, NewCustomer};
///
/// let customer = Customer::create("c-1".into(), NewCustomer::new("Jane", "+255700000001"), Utc::now());
/// let accounts = fold_accounts(vec![customer], &[], &[]);
/// assert!(accounts[0].outstanding_debt.is_zero());
/// ```
pub fn fold_accounts(customers: Vec<Customer>, sales: &[Sale], debts: &[Debt]) -> Vec<CustomerAccount> {
    let mut sales_by_customer: HashMap<&str, Vec<&Sale>> = HashMap::new();
    for sale in sales {
        if let Some(customer_id) = sale.customer_id.as_deref() {
            sales_by_customer.entry(customer_id).or_default().push(sale);
        }
    }

    let mut debts_by_customer: HashMap<&str, Vec<&Debt>> = HashMap::new();
    for debt in debts {
        debts_by_customer
            .entry(debt.customer_id.as_str())
            .or_default()
            .push(debt);
    }

    customers
        .into_iter()
        .map(|customer| {
            let id = customer.id.clone();
            let sales = sales_by_customer.get(id.as_str()).into_iter().flatten().copied();
            let debts = debts_by_customer.get(id.as_str()).into_iter().flatten().copied();
            CustomerAccount::fold(customer, sales, debts)
        })
        .collect()
}
