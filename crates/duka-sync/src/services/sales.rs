//! # Sale Service
//!
//! Records sales. A sale without a receipt number gets one on creation:
//!
//! ```text
//! 20260131-9f2a-0417
//! ├──────┘ ├──┘ ├──┘
//! │        │    └── millisecond sequence (ms % 10000)
//! │        └─────── last four hex chars of the sale id
//! └──────────────── date of the sale (UTC)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use duka_core::{Filter, NewSale, Sale, SalePatch};

use crate::error::SyncResult;
use crate::repository::MirroredRepository;
use crate::services::new_id;

#[derive(Debug, Clone)]
pub struct SaleService {
    sales: Arc<MirroredRepository<Sale>>,
}

impl SaleService {
    pub fn new(sales: Arc<MirroredRepository<Sale>>) -> Self {
        SaleService { sales }
    }

    pub fn repository(&self) -> Arc<MirroredRepository<Sale>> {
        self.sales.clone()
    }

    pub async fn create(&self, input: NewSale) -> SyncResult<Sale> {
        input.validate()?;

        let id = new_id();
        let now = Utc::now();
        let receipt = match input.receipt_number.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => given.to_string(),
            _ => receipt_number(&id, now),
        };

        let sale = Sale::create(id, receipt, input, now);
        self.sales.create(sale).await
    }

    pub async fn get(&self, id: &str) -> SyncResult<Option<Sale>> {
        self.sales.get(id).await
    }

    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<Sale>> {
        self.sales.list(filter).await
    }

    pub async fn update(&self, id: &str, patch: &SalePatch) -> SyncResult<Sale> {
        self.sales.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        self.sales.delete(id).await
    }
}

/// `YYYYMMDD-XXXX-NNNN`.
fn receipt_number(id: &str, now: DateTime<Utc>) -> String {
    let hex: String = id.chars().filter(char::is_ascii_hexdigit).collect();
    let suffix = if hex.len() >= 4 {
        &hex[hex.len() - 4..]
    } else {
        "0000"
    };
    let seq = now.timestamp_millis().rem_euclid(10_000);

    format!("{}-{}-{:04}", now.format("%Y%m%d"), suffix, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::testing::Harness;
    use chrono::TimeZone;
    use duka_core::{PaymentMethod, SaleStatus};

    fn cash_sale(receipt_number: Option<&str>) -> NewSale {
        NewSale {
            receipt_number: receipt_number.map(str::to_string),
            customer_id: None,
            cashier_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            total_cents: 2_500,
            paid_cents: 2_500,
            payment_method: PaymentMethod::Cash,
        }
    }

    #[test]
    fn test_receipt_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 9, 15, 0).unwrap();
        let receipt = receipt_number("7f1c0c5e-0000-4000-8000-000000009f2a", now);

        assert!(receipt.starts_with("20260131-9f2a-"));
        assert_eq!(receipt.len(), "20260131-9f2a-0000".len());
    }

    #[tokio::test]
    async fn test_create_assigns_receipt_number() {
        let h = Harness::online().await;
        let sales = h.services().sales;

        let sale = sales.create(cash_sale(None)).await.unwrap();
        let tail = &sale.id[sale.id.len() - 4..];
        assert!(sale.receipt_number.contains(&format!("-{tail}-")));
        assert_eq!(sale.status, SaleStatus::Completed);

        let kept = sales.create(cash_sale(Some("MANUAL-1"))).await.unwrap();
        assert_eq!(kept.receipt_number, "MANUAL-1");
    }

    #[tokio::test]
    async fn test_overpayment_rejected() {
        let h = Harness::online().await;
        let sales = h.services().sales;

        let mut input = cash_sale(None);
        input.paid_cents = 3_000;
        assert!(matches!(
            sales.create(input).await,
            Err(SyncError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_patch_above_total_rejected_on_both_paths() {
        let mut input = cash_sale(None);
        input.paid_cents = 1_000;
        let overpaid = SalePatch {
            paid_cents: Some(4_000),
            ..Default::default()
        };
        let settled = SalePatch {
            paid_cents: Some(2_500),
            ..Default::default()
        };

        for h in [Harness::online().await, Harness::offline().await] {
            let sales = h.services().sales;
            let sale = sales.create(input.clone()).await.unwrap();

            assert!(matches!(
                sales.update(&sale.id, &overpaid).await,
                Err(SyncError::Validation(_))
            ));
            let paid = sales.update(&sale.id, &settled).await.unwrap();
            assert_eq!(paid.paid_cents, 2_500);
            assert!(paid.balance().is_zero());
        }
    }

    #[tokio::test]
    async fn test_void_offline() {
        let h = Harness::offline().await;
        let sales = h.services().sales;

        let sale = sales.create(cash_sale(None)).await.unwrap();
        let patch = SalePatch {
            status: Some(SaleStatus::Voided),
            ..Default::default()
        };
        let voided = sales.update(&sale.id, &patch).await.unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);

        let listed = sales.list(&Filter::new().eq("status", "voided")).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
