//! # Customer Service
//!
//! Customers are returned as [`CustomerAccount`]s: the stored row plus
//! spend and debt figures folded from the mirrored `sales` and `debts`
//! tables on every read.
//!
//! ```text
//!   customers repo ──► Customer ─┐
//!   sales mirror   ──► [Sale]  ──┼──► CustomerAccount::fold ──► caller
//!   debts mirror   ──► [Debt]  ──┘
//! ```
//!
//! The fold never calls the remote store; sales and debts are as fresh as
//! their last refresh.

use std::sync::Arc;

use chrono::Utc;

use duka_core::{fold_accounts, Customer, CustomerAccount, CustomerPatch, Debt, Filter, NewCustomer, Sale};
use duka_db::MirrorTable;

use crate::error::SyncResult;
use crate::repository::MirroredRepository;
use crate::services::new_id;

#[derive(Debug, Clone)]
pub struct CustomerService {
    customers: Arc<MirroredRepository<Customer>>,
    sales: MirrorTable<Sale>,
    debts: MirrorTable<Debt>,
}

impl CustomerService {
    pub fn new(
        customers: Arc<MirroredRepository<Customer>>,
        sales: MirrorTable<Sale>,
        debts: MirrorTable<Debt>,
    ) -> Self {
        CustomerService {
            customers,
            sales,
            debts,
        }
    }

    pub fn repository(&self) -> Arc<MirroredRepository<Customer>> {
        self.customers.clone()
    }

    async fn account(&self, customer: Customer) -> SyncResult<CustomerAccount> {
        let by_customer = Filter::new().eq("customer_id", customer.id.as_str());
        let sales = self.sales.records(&by_customer).await?;
        let debts = self.debts.records(&by_customer).await?;
        Ok(CustomerAccount::fold(customer, &sales, &debts))
    }

    /// Registers a customer.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let account = service.create(NewCustomer::new("Jane", "+255700000001")).await?;
    /// assert_eq!(account.sale_count, 0);
    /// ```
    pub async fn create(&self, input: NewCustomer) -> SyncResult<CustomerAccount> {
        input.validate()?;
        let customer = Customer::create(new_id(), input, Utc::now());
        let customer = self.customers.create(customer).await?;
        self.account(customer).await
    }

    pub async fn get(&self, id: &str) -> SyncResult<Option<CustomerAccount>> {
        match self.customers.get(id).await? {
            Some(customer) => Ok(Some(self.account(customer).await?)),
            None => Ok(None),
        }
    }

    /// Lists customers, folding the mirrored sales and debts once for the
    /// whole page.
    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<CustomerAccount>> {
        let customers = self.customers.list(filter).await?;
        if customers.is_empty() {
            return Ok(Vec::new());
        }

        let sales = self.sales.records(&Filter::new()).await?;
        let debts = self.debts.records(&Filter::new()).await?;
        Ok(fold_accounts(customers, &sales, &debts))
    }

    pub async fn update(&self, id: &str, patch: &CustomerPatch) -> SyncResult<CustomerAccount> {
        let customer = self.customers.update(id, patch).await?;
        self.account(customer).await
    }

    /// Deletes a customer. Customers with sales or debts can't be deleted
    /// remotely; deactivate them with [`CustomerPatch::deactivate`].
    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        self.customers.delete(id).await
    }
}
