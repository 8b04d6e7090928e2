//! # Connectivity Oracle
//!
//! Answers one question before every mirrored operation: is the remote
//! store reachable right now?
//!
//! ```text
//!   repository ──is_online()──► ConnectivityOracle
//!                                 │
//!                    ┌────────────┴─────────────┐
//!                    ▼                          ▼
//!               HttpProbe                ManualConnectivity
//!     HEAD {url}/{health_path}           atomic flag
//!     bounded timeout, cached            offline mode, tests
//! ```
//!
//! The oracle never fails. Anything other than a response, including a
//! timeout, means offline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

/// Reports whether the remote store is currently reachable.
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    async fn is_online(&self) -> bool;
}

// =============================================================================
// HTTP Probe
// =============================================================================

/// Probes the remote health endpoint with a `HEAD` request.
///
/// Any HTTP response counts as reachable, including 4xx and 5xx; only
/// transport failures and timeouts count as offline. Answers are reused
/// for `ttl`.
#[derive(Debug)]
pub struct HttpProbe {
    client: Client,
    health_url: Url,
    timeout: Duration,
    ttl: Duration,
    last: Mutex<Option<(Instant, bool)>>,
}

impl HttpProbe {
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let raw = settings
            .url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".into()))?;

        let base = if raw.ends_with('/') {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("{raw}/"))?
        };
        let health_url = base.join(settings.health_path.trim_start_matches('/'))?;

        let client = Client::builder()
            .timeout(settings.probe_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpProbe {
            client,
            health_url,
            timeout: settings.probe_timeout(),
            ttl: settings.probe_ttl(),
            last: Mutex::new(None),
        })
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    async fn probe(&self) -> bool {
        let request = self.client.head(self.health_url.clone()).send();
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => {
                debug!(status = response.status().as_u16(), "Connectivity probe answered");
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "Connectivity probe timed out");
                false
            }
        }
    }
}

#[async_trait]
impl ConnectivityOracle for HttpProbe {
    async fn is_online(&self) -> bool {
        let mut last = self.last.lock().await;
        if let Some((at, online)) = *last {
            if at.elapsed() < self.ttl {
                return online;
            }
        }

        let online = self.probe().await;
        *last = Some((Instant::now(), online));
        online
    }
}

// =============================================================================
// Manual Connectivity
// =============================================================================

/// A connectivity flag flipped by hand.
///
/// Backs the `offline` sync mode and simulates reconnects in tests.
#[derive(Debug)]
pub struct ManualConnectivity {
    online: AtomicBool,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        ManualConnectivity {
            online: AtomicBool::new(online),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityOracle for ManualConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> RemoteSettings {
        RemoteSettings {
            url: Some(url.to_string()),
            probe_timeout_ms: 500,
            ..RemoteSettings::default()
        }
    }

    #[tokio::test]
    async fn test_manual_connectivity_toggles() {
        let oracle = ManualConnectivity::offline();
        assert!(!oracle.is_online().await);

        oracle.set_online(true);
        assert!(oracle.is_online().await);
    }

    #[test]
    fn test_health_url_joins_below_base() {
        let probe = HttpProbe::new(&settings("https://abc.supabase.co")).unwrap();
        assert_eq!(
            probe.health_url().as_str(),
            "https://abc.supabase.co/auth/v1/health"
        );
    }

    #[test]
    fn test_probe_requires_url() {
        let err = HttpProbe::new(&RemoteSettings::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_refused_connection_is_offline() {
        // Nothing listens on port 1.
        let probe = HttpProbe::new(&settings("http://127.0.0.1:1")).unwrap();
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_cached_answer_is_reused_within_ttl() {
        let probe = HttpProbe::new(&settings("http://127.0.0.1:1")).unwrap();
        *probe.last.lock().await = Some((Instant::now(), true));
        assert!(probe.is_online().await);

        *probe.last.lock().await = Some((Instant::now() - Duration::from_secs(10), true));
        assert!(!probe.is_online().await);
    }
}
