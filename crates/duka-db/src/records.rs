//! Column bindings for each mirrored entity.
//!
//! `COLUMNS` must match `migrations/sqlite` and the entity's field names
//! (the `FromRow` derive reads columns by field name).

use duka_core::{Customer, Debt, Incident, Sale, UserProfile};

use crate::mirror::{MirrorRecord, SqliteQuery};

impl MirrorRecord for UserProfile {
    const TABLE: &'static str = "user_profiles";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "full_name",
        "email",
        "phone",
        "role",
        "status",
        "created_at",
        "updated_at",
    ];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.clone())
            .bind(self.full_name.clone())
            .bind(self.email.clone())
            .bind(self.phone.clone())
            .bind(self.role)
            .bind(self.status)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl MirrorRecord for Customer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "phone",
        "email",
        "address",
        "status",
        "created_at",
        "updated_at",
    ];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.clone())
            .bind(self.name.clone())
            .bind(self.phone.clone())
            .bind(self.email.clone())
            .bind(self.address.clone())
            .bind(self.status)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl MirrorRecord for Incident {
    const TABLE: &'static str = "incidents";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "description",
        "severity",
        "status",
        "reported_by",
        "created_at",
        "updated_at",
    ];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.clone())
            .bind(self.title.clone())
            .bind(self.description.clone())
            .bind(self.severity)
            .bind(self.status)
            .bind(self.reported_by.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl MirrorRecord for Sale {
    const TABLE: &'static str = "sales";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "receipt_number",
        "customer_id",
        "cashier_id",
        "total_cents",
        "paid_cents",
        "payment_method",
        "status",
        "created_at",
        "updated_at",
    ];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.clone())
            .bind(self.receipt_number.clone())
            .bind(self.customer_id.clone())
            .bind(self.cashier_id.clone())
            .bind(self.total_cents)
            .bind(self.paid_cents)
            .bind(self.payment_method)
            .bind(self.status)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl MirrorRecord for Debt {
    const TABLE: &'static str = "debts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "customer_id",
        "sale_id",
        "amount_cents",
        "paid_cents",
        "status",
        "due_date",
        "created_at",
        "updated_at",
    ];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.clone())
            .bind(self.customer_id.clone())
            .bind(self.sale_id.clone())
            .bind(self.amount_cents)
            .bind(self.paid_cents)
            .bind(self.status)
            .bind(self.due_date)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use duka_core::{
        DebtStatus, NewDebt, NewIncident, NewSale, NewUserProfile, IncidentSeverity,
        PaymentMethod, SaleStatus, UserRole,
    };

    fn uuid() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[tokio::test]
    async fn test_every_entity_round_trips_through_its_table() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let user = UserProfile::create(
            uuid(),
            NewUserProfile {
                full_name: "Asha Juma".to_string(),
                email: "asha@duka.co.tz".to_string(),
                phone: None,
                role: UserRole::Manager,
            },
            now,
        );
        db.mirror::<UserProfile>().upsert(&user, true).await.unwrap();
        let row = db.mirror::<UserProfile>().get(&user.id).await.unwrap().unwrap();
        assert_eq!(row.record, user);

        let incident = Incident::create(
            uuid(),
            NewIncident {
                title: "Till short".to_string(),
                description: "Evening count short by 2000".to_string(),
                severity: IncidentSeverity::High,
                reported_by: user.id.clone(),
            },
            now,
        );
        db.mirror::<Incident>().upsert(&incident, false).await.unwrap();
        let row = db.mirror::<Incident>().get(&incident.id).await.unwrap().unwrap();
        assert_eq!(row.record, incident);

        let sale = Sale::create(
            uuid(),
            "20260131-abcd-0001".to_string(),
            NewSale {
                receipt_number: None,
                customer_id: None,
                cashier_id: user.id.clone(),
                total_cents: 12_500,
                paid_cents: 10_000,
                payment_method: PaymentMethod::Credit,
            },
            now,
        );
        db.mirror::<Sale>().upsert(&sale, false).await.unwrap();
        let row = db.mirror::<Sale>().get(&sale.id).await.unwrap().unwrap();
        assert_eq!(row.record.payment_method, PaymentMethod::Credit);
        assert_eq!(row.record.status, SaleStatus::Completed);
        assert_eq!(row.record, sale);

        let debt = Debt::create(
            uuid(),
            NewDebt {
                customer_id: uuid(),
                sale_id: Some(sale.id.clone()),
                amount_cents: 2_500,
                paid_cents: 0,
                due_date: Some(now),
            },
            now,
        );
        db.mirror::<Debt>().upsert(&debt, false).await.unwrap();
        let row = db.mirror::<Debt>().get(&debt.id).await.unwrap().unwrap();
        assert_eq!(row.record.status, DebtStatus::Open);
        assert_eq!(row.record, debt);
    }

    #[test]
    fn test_columns_start_with_id() {
        assert_eq!(Customer::COLUMNS[0], "id");
        assert_eq!(UserProfile::COLUMNS[0], "id");
        assert_eq!(Incident::COLUMNS[0], "id");
        assert_eq!(Sale::COLUMNS[0], "id");
        assert_eq!(Debt::COLUMNS[0], "id");
    }

    #[test]
    fn test_columns_match_serialized_fields() {
        let now = Utc::now();
        let customer = Customer::create(uuid(), duka_core::NewCustomer::new("Jane", "+255700000001"), now);
        let json = serde_json::to_value(&customer).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), Customer::COLUMNS.len());
        for column in Customer::COLUMNS {
            assert!(object.contains_key(*column), "missing {column}");
        }
    }
}
