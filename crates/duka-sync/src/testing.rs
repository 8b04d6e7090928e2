//! Test fixtures: an in-memory mirror, an in-process remote store and a
//! hand-flipped connectivity flag.

use std::sync::Arc;
use std::time::Duration;

use duka_db::{Database, DbConfig, MirrorRecord};

use crate::agent::SyncAgent;
use crate::config::SyncSettings;
use crate::connectivity::{ConnectivityOracle, ManualConnectivity};
use crate::reconcile::Reconciler;
use crate::remote::{MemoryRemoteStore, RemoteStore};
use crate::repository::MirroredRepository;
use crate::services::Services;
use crate::session::SessionManager;

pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct Harness {
    pub db: Database,
    pub remote: Arc<MemoryRemoteStore>,
    pub oracle: Arc<ManualConnectivity>,
    pub sessions: Arc<SessionManager>,
}

impl Harness {
    async fn new(online: bool) -> Self {
        let db = Database::open(DbConfig::in_memory())
            .await
            .expect("in-memory mirror");

        Harness {
            db,
            remote: Arc::new(MemoryRemoteStore::new()),
            oracle: Arc::new(ManualConnectivity::new(online)),
            sessions: Arc::new(SessionManager::new()),
        }
    }

    pub async fn online() -> Self {
        Self::new(true).await
    }

    pub async fn offline() -> Self {
        Self::new(false).await
    }

    fn remote_store(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    fn connectivity(&self) -> Arc<dyn ConnectivityOracle> {
        self.oracle.clone()
    }

    pub fn repository<R: MirrorRecord>(&self) -> MirroredRepository<R> {
        MirroredRepository::new(&self.db, self.remote_store(), self.connectivity())
            .with_timeout(TEST_TIMEOUT)
    }

    pub fn services(&self) -> Services {
        Services::new(&self.db, self.remote_store(), self.connectivity(), TEST_TIMEOUT)
    }

    pub fn agent(&self, services: &Services, settings: SyncSettings) -> SyncAgent {
        SyncAgent::new(
            Arc::new(Reconciler::new(services.tiers())),
            self.sessions.clone(),
            self.connectivity(),
            settings,
        )
    }
}
