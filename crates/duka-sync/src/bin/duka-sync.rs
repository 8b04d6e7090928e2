//! One-shot reconciliation pass.
//!
//! Loads the sync config, opens the local mirror, pushes every pending row
//! and prints the pass report as JSON.
//!
//! ```text
//! DUKA_REMOTE_URL=https://example.supabase.co \
//! DUKA_ACCESS_TOKEN=... RUST_LOG=duka_sync=debug duka-sync
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use duka_db::Database;
use duka_sync::{
    AuthSession, ConnectivityOracle, HttpProbe, ManualConnectivity, Reconciler, RemoteStore,
    RestRemoteStore, Services, SessionManager, SyncConfig, SyncResult,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match SyncConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            if e.is_config_error() {
                error!(
                    path = ?SyncConfig::default_config_path(),
                    "Check sync.toml and the DUKA_* environment variables"
                );
            }
            return Err(e.into());
        }
    };
    info!(mode = %config.mode(), "Loaded sync config");

    let db = Database::open(config.db_config()?).await?;
    let report = run_pass(&config, &db).await;
    db.close().await;

    let report = report?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        warn!(
            rejected = report.rejected(),
            deferred = report.deferred(),
            "Pass finished with rows left pending"
        );
    }
    Ok(())
}

async fn run_pass(config: &SyncConfig, db: &Database) -> SyncResult<duka_sync::SyncReport> {
    let sessions = Arc::new(SessionManager::new());
    if let Ok(access_token) = std::env::var("DUKA_ACCESS_TOKEN") {
        let user_id = std::env::var("DUKA_USER_ID").unwrap_or_else(|_| "cli".to_string());
        sessions
            .sign_in(AuthSession {
                access_token,
                refresh_token: String::new(),
                expires_at: Utc::now() + Duration::hours(1),
                user_id,
            })
            .await;
    } else {
        warn!("DUKA_ACCESS_TOKEN not set; every push will be refused as unauthenticated and rows stay pending");
    }

    let remote: Arc<dyn RemoteStore> = Arc::new(RestRemoteStore::new(&config.remote, sessions)?);
    let oracle: Arc<dyn ConnectivityOracle> = if config.is_sync_enabled() {
        Arc::new(HttpProbe::new(&config.remote)?)
    } else {
        info!("Sync disabled, every table will be deferred");
        Arc::new(ManualConnectivity::offline())
    };

    let services = Services::new(db, remote, oracle, config.remote.request_timeout());
    let reconciler = Reconciler::new(services.tiers());
    Ok(reconciler.sync_all().await)
}
