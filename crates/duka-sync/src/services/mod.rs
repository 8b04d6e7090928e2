//! # Domain Services
//!
//! What screens call. Every service offers the same five operations and
//! hides where the answer came from.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Services                                      │
//! │                                                                         │
//! │   customers   create · get · list · update · delete → CustomerAccount  │
//! │   users       create · get · list · update · delete · confirm_email    │
//! │   incidents   create · get · list · update · delete                    │
//! │   sales       create · get · list · update · delete                    │
//! │   debts       create · get · list · update · delete                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   MirroredRepository<R>  (one per table, shared with the Reconciler)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inputs are validated before any I/O; primary keys are generated here.
//!
//! ## Example
//! ```rust,ignore
//! let services = Services::new(&db, remote, oracle, Duration::from_secs(8));
//! let account = services.customers.create(NewCustomer::new("Jane", "+255700000001")).await?;
//! assert!(account.outstanding_debt.is_zero());
//! ```

pub mod customers;
pub mod debts;
pub mod incidents;
pub mod sales;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use duka_db::{Database, MirrorRecord};

use crate::connectivity::ConnectivityOracle;
use crate::reconcile::Reconcilable;
use crate::remote::RemoteStore;
use crate::repository::MirroredRepository;

pub use customers::CustomerService;
pub use debts::DebtService;
pub use incidents::IncidentService;
pub use sales::SaleService;
pub use users::UserService;

/// New primary key.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Every domain service over one mirror and one remote store.
#[derive(Debug, Clone)]
pub struct Services {
    pub users: UserService,
    pub customers: CustomerService,
    pub incidents: IncidentService,
    pub sales: SaleService,
    pub debts: DebtService,
}

impl Services {
    pub fn new(
        db: &Database,
        remote: Arc<dyn RemoteStore>,
        oracle: Arc<dyn ConnectivityOracle>,
        request_timeout: Duration,
    ) -> Self {
        fn repository<R: MirrorRecord>(
            db: &Database,
            remote: &Arc<dyn RemoteStore>,
            oracle: &Arc<dyn ConnectivityOracle>,
            timeout: Duration,
        ) -> Arc<MirroredRepository<R>> {
            Arc::new(MirroredRepository::new(db, remote.clone(), oracle.clone()).with_timeout(timeout))
        }

        Services {
            users: UserService::new(repository(db, &remote, &oracle, request_timeout), remote.clone()),
            customers: CustomerService::new(
                repository(db, &remote, &oracle, request_timeout),
                db.mirror(),
                db.mirror(),
            ),
            incidents: IncidentService::new(repository(db, &remote, &oracle, request_timeout)),
            sales: SaleService::new(repository(db, &remote, &oracle, request_timeout)),
            debts: DebtService::new(repository(db, &remote, &oracle, request_timeout)),
        }
    }

    /// Repositories grouped in reconciliation order: tables nothing else
    /// references first.
    pub fn tiers(&self) -> Vec<Vec<Arc<dyn Reconcilable>>> {
        vec![
            vec![
                self.users.repository() as Arc<dyn Reconcilable>,
                self.customers.repository() as Arc<dyn Reconcilable>,
            ],
            vec![
                self.incidents.repository() as Arc<dyn Reconcilable>,
                self.sales.repository() as Arc<dyn Reconcilable>,
            ],
            vec![self.debts.repository() as Arc<dyn Reconcilable>],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_tiers_follow_dependency_order() {
        let h = Harness::online().await;
        let services = h.services();

        let tables: Vec<Vec<&str>> = services
            .tiers()
            .iter()
            .map(|tier| tier.iter().map(|r| r.table()).collect())
            .collect();

        assert_eq!(
            tables,
            vec![
                vec!["user_profiles", "customers"],
                vec!["incidents", "sales"],
                vec!["debts"],
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_remote_every_operation_answers() {
        use duka_core::{CustomerPatch, Filter, NewCustomer, NewSale, PaymentMethod};

        let h = Harness::online().await;
        h.remote.go_down().await;
        let services = h.services();

        let jane = services
            .customers
            .create(NewCustomer::new("Jane", "+255700000001"))
            .await
            .unwrap();
        let id = jane.customer.id.clone();

        let sale = services
            .sales
            .create(NewSale {
                receipt_number: None,
                customer_id: Some(id.clone()),
                cashier_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
                total_cents: 12_000,
                paid_cents: 12_000,
                payment_method: PaymentMethod::MobileMoney,
            })
            .await
            .unwrap();

        let patch = CustomerPatch {
            address: Some("Kariakoo, Dar es Salaam".to_string()),
            ..Default::default()
        };
        let updated = services.customers.update(&id, &patch).await.unwrap();
        assert_eq!(updated.customer.address.as_deref(), Some("Kariakoo, Dar es Salaam"));
        assert_eq!(updated.sale_count, 1);

        let listed = services.customers.list(&Filter::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(services.sales.get(&sale.id).await.unwrap(), Some(sale));

        // One pending row per written record; the update rewrote the same row.
        assert_eq!(services.customers.repository().count_pending().await.unwrap(), 1);
        assert_eq!(services.sales.repository().count_pending().await.unwrap(), 1);
        assert!(h.remote.rows("customers").await.is_empty());
    }

    #[test]
    fn test_new_id_is_uuid() {
        assert!(uuid::Uuid::parse_str(&new_id()).is_ok());
    }
}
