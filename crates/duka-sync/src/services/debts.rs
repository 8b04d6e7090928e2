//! # Debt Service
//!
//! Customer credit. Recording a payment that covers the whole amount
//! settles the debt on both sides: the status is added to the patch before
//! it leaves the device.

use std::sync::Arc;

use chrono::Utc;

use duka_core::{Debt, DebtPatch, DebtStatus, Filter, NewDebt};

use crate::error::SyncResult;
use crate::repository::MirroredRepository;
use crate::services::new_id;

#[derive(Debug, Clone)]
pub struct DebtService {
    debts: Arc<MirroredRepository<Debt>>,
}

impl DebtService {
    pub fn new(debts: Arc<MirroredRepository<Debt>>) -> Self {
        DebtService { debts }
    }

    pub fn repository(&self) -> Arc<MirroredRepository<Debt>> {
        self.debts.clone()
    }

    pub async fn create(&self, input: NewDebt) -> SyncResult<Debt> {
        input.validate()?;
        let debt = Debt::create(new_id(), input, Utc::now());
        self.debts.create(debt).await
    }

    pub async fn get(&self, id: &str) -> SyncResult<Option<Debt>> {
        self.debts.get(id).await
    }

    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<Debt>> {
        self.debts.list(filter).await
    }

    pub async fn update(&self, id: &str, patch: &DebtPatch) -> SyncResult<Debt> {
        let patch = self.with_settlement(id, patch).await?;
        self.debts.update(id, &patch).await
    }

    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        self.debts.delete(id).await
    }

    /// Adds `status: settled` when the payment covers an open debt known to
    /// the mirror.
    async fn with_settlement(&self, id: &str, patch: &DebtPatch) -> SyncResult<DebtPatch> {
        let mut patch = patch.clone();
        let Some(paid) = patch.paid_cents else {
            return Ok(patch);
        };
        if patch.status.is_some() {
            return Ok(patch);
        }

        if let Some(row) = self.debts.mirror().get(id).await? {
            let debt = row.record;
            if debt.status == DebtStatus::Open && paid >= debt.amount_cents {
                patch.status = Some(DebtStatus::Settled);
            }
        }
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use duka_core::Money;

    fn credit(amount_cents: i64) -> NewDebt {
        NewDebt {
            customer_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            sale_id: None,
            amount_cents,
            paid_cents: 0,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_full_payment_settles_remotely() {
        let h = Harness::online().await;
        let debts = h.services().debts;

        let debt = debts.create(credit(5_000)).await.unwrap();
        assert_eq!(debt.outstanding(), Money::from_cents(5_000));

        let patch = DebtPatch {
            paid_cents: Some(5_000),
            ..Default::default()
        };
        let settled = debts.update(&debt.id, &patch).await.unwrap();

        assert_eq!(settled.status, DebtStatus::Settled);
        assert_eq!(h.remote.row("debts", &debt.id).await.unwrap()["status"], "settled");
    }

    #[tokio::test]
    async fn test_overpayment_rejected_online_and_offline() {
        use crate::error::SyncError;
        use duka_core::CoreError;

        let overpaid = DebtPatch {
            paid_cents: Some(9_000),
            ..Default::default()
        };

        for online in [true, false] {
            let h = if online {
                Harness::online().await
            } else {
                Harness::offline().await
            };
            let debts = h.services().debts;
            let debt = debts.create(credit(5_000)).await.unwrap();

            let err = debts.update(&debt.id, &overpaid).await.unwrap_err();
            assert!(
                matches!(err, SyncError::Validation(CoreError::Overpayment { .. })),
                "online = {online}: {err:?}"
            );
            assert_eq!(debts.get(&debt.id).await.unwrap().unwrap().paid_cents, 0);
        }
    }

    #[tokio::test]
    async fn test_overpayment_checked_against_remote_row_when_not_mirrored() {
        use crate::error::SyncError;

        let h = Harness::online().await;
        let debt = Debt::create(new_id(), credit(5_000), Utc::now());
        h.remote
            .seed("debts", serde_json::to_value(&debt).unwrap())
            .await;
        let debts = h.services().debts;

        let patch = DebtPatch {
            paid_cents: Some(9_000),
            ..Default::default()
        };
        assert!(matches!(
            debts.update(&debt.id, &patch).await,
            Err(SyncError::Validation(_))
        ));
        assert_eq!(h.remote.row("debts", &debt.id).await.unwrap()["paid_cents"], 0);
    }

    #[tokio::test]
    async fn test_partial_payment_stays_open() {
        let h = Harness::offline().await;
        let debts = h.services().debts;

        let debt = debts.create(credit(5_000)).await.unwrap();
        let patch = DebtPatch {
            paid_cents: Some(2_000),
            ..Default::default()
        };
        let updated = debts.update(&debt.id, &patch).await.unwrap();

        assert_eq!(updated.status, DebtStatus::Open);
        assert_eq!(updated.outstanding(), Money::from_cents(3_000));
        assert_eq!(
            debts.list(&Filter::new().eq("status", "open")).await.unwrap().len(),
            1
        );
    }
}
