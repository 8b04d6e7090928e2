//! Incident reports.

use std::sync::Arc;

use chrono::Utc;

use duka_core::{Filter, Incident, IncidentPatch, NewIncident};

use crate::error::SyncResult;
use crate::repository::MirroredRepository;
use crate::services::new_id;

#[derive(Debug, Clone)]
pub struct IncidentService {
    incidents: Arc<MirroredRepository<Incident>>,
}

impl IncidentService {
    pub fn new(incidents: Arc<MirroredRepository<Incident>>) -> Self {
        IncidentService { incidents }
    }

    pub fn repository(&self) -> Arc<MirroredRepository<Incident>> {
        self.incidents.clone()
    }

    pub async fn create(&self, input: NewIncident) -> SyncResult<Incident> {
        input.validate()?;
        let incident = Incident::create(new_id(), input, Utc::now());
        self.incidents.create(incident).await
    }

    pub async fn get(&self, id: &str) -> SyncResult<Option<Incident>> {
        self.incidents.get(id).await
    }

    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<Incident>> {
        self.incidents.list(filter).await
    }

    pub async fn update(&self, id: &str, patch: &IncidentPatch) -> SyncResult<Incident> {
        self.incidents.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        self.incidents.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use duka_core::{IncidentSeverity, IncidentStatus};

    fn till_shortage() -> NewIncident {
        NewIncident {
            title: "Till shortage".to_string(),
            description: "Drawer short by 2,000 at close".to_string(),
            severity: IncidentSeverity::Medium,
            reported_by: "550e8400-e29b-41d4-a716-446655440000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_offline_lifecycle() {
        let h = Harness::offline().await;
        let incidents = h.services().incidents;

        let incident = incidents.create(till_shortage()).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Open);

        let patch = IncidentPatch {
            status: Some(IncidentStatus::Resolved),
            ..Default::default()
        };
        let resolved = incidents.update(&incident.id, &patch).await.unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);

        let open = incidents
            .list(&Filter::new().eq("status", "open"))
            .await
            .unwrap();
        assert!(open.is_empty());

        assert!(incidents.delete(&incident.id).await.unwrap());
        assert!(incidents.get(&incident.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_transparent() {
        let h = Harness::online().await;
        h.remote.go_down().await;
        let incidents = h.services().incidents;

        let incident = incidents.create(till_shortage()).await.unwrap();
        assert_eq!(incidents.get(&incident.id).await.unwrap(), Some(incident));
        assert_eq!(incidents.repository().count_pending().await.unwrap(), 1);
    }
}
