//! PostgREST remote store.
//!
//! ## Request Mapping
//! ```text
//! insert  POST    /rest/v1/{table}                 Prefer: return=representation
//! select  GET     /rest/v1/{table}?col=eq.v&limit=n
//! update  PATCH   /rest/v1/{table}?id=eq.{id}      Prefer: return=representation
//! delete  DELETE  /rest/v1/{table}?id=eq.{id}      Prefer: return=representation
//! invoke  POST    /rest/v1/rpc/{function}
//!
//! headers: apikey: <project key>
//!          Authorization: Bearer <session access token>
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use duka_core::Filter;

use super::{RejectionKind, RemoteError, RemoteResult, RemoteStore};
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::session::SessionManager;

/// Remote store speaking the PostgREST dialect over HTTPS.
#[derive(Clone)]
pub struct RestRemoteStore {
    client: Client,
    base: Url,
    api_key: String,
    session: Arc<SessionManager>,
}

impl std::fmt::Debug for RestRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRemoteStore")
            .field("base", &self.base.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl RestRemoteStore {
    /// Builds the client from remote settings.
    ///
    /// ## Errors
    /// `InvalidConfig` when no URL is configured, `InvalidUrl` when it
    /// doesn't parse.
    pub fn new(settings: &RemoteSettings, session: Arc<SessionManager>) -> SyncResult<Self> {
        let raw = settings
            .url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".into()))?;

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(RestRemoteStore {
            client,
            base: base_url(raw)?,
            api_key: settings.api_key.clone().unwrap_or_default(),
            session,
        })
    }

    fn endpoint(&self, path: &str) -> RemoteResult<Url> {
        self.base
            .join(path)
            .map_err(|e| RemoteError::rejected(RejectionKind::Validation, e.to_string()))
    }

    async fn authorized(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or(RemoteError::Unauthenticated)?;

        Ok(request
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Value> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let err = classify(status, &body);
            debug!(status = status.as_u16(), error = %err, "Remote request failed");
            return Err(err);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Remote returned a body that is not JSON");
            RemoteError::rejected(RejectionKind::Validation, format!("unexpected response: {e}"))
        })
    }
}

/// Normalizes the project URL so `join` appends below it.
fn base_url(raw: &str) -> SyncResult<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Ok(Url::parse(&with_slash)?)
}

fn by_id(url: &mut Url, id: &str) {
    url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
}

fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert(&self, table: &str, row: Value) -> RemoteResult<Value> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&row);

        Ok(into_rows(self.send(request).await?)
            .into_iter()
            .next()
            .unwrap_or(row))
    }

    async fn select(&self, table: &str, filter: &Filter) -> RemoteResult<Vec<Value>> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in filter.conditions() {
                pairs.append_pair(column, &format!("eq.{}", value.to_query()));
            }
            if let Some(limit) = filter.max_rows() {
                pairs.append_pair("limit", &limit.to_string());
            }
        }

        Ok(into_rows(self.send(self.client.get(url)).await?))
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> RemoteResult<Value> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        by_id(&mut url, id);
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&patch);

        into_rows(self.send(request).await?)
            .into_iter()
            .next()
            .ok_or_else(|| {
                RemoteError::rejected(RejectionKind::NotFound, format!("no row {id} in {table}"))
            })
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<bool> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        by_id(&mut url, id);
        let request = self
            .client
            .delete(url)
            .header("Prefer", "return=representation");

        Ok(!into_rows(self.send(request).await?).is_empty())
    }

    async fn invoke(&self, function: &str, args: Value) -> RemoteResult<Value> {
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        self.send(self.client.post(url).json(&args)).await
    }
}

// =============================================================================
// Error Classification
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Maps a failed response to the remote error taxonomy.
///
/// ## Mapping
/// ```text
/// 401                                 → Unauthenticated
/// code 42P01 / PGRST205 / PGRST202    → SchemaMissing
/// code 42501, 403                     → Rejected(PermissionDenied)
/// code 23503                          → Rejected(ForeignKey)
/// code 23505, 409                     → Rejected(Conflict)
/// 404                                 → SchemaMissing
/// 5xx, 408, 429                       → Unreachable
/// other 4xx                           → Rejected(Validation)
/// ```
pub(crate) fn classify(status: StatusCode, body: &str) -> RemoteError {
    let payload: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = describe(status, &payload, body);

    if status == StatusCode::UNAUTHORIZED {
        return RemoteError::Unauthenticated;
    }

    match payload.code.as_deref() {
        Some("42P01" | "PGRST205" | "PGRST202") => return RemoteError::SchemaMissing(message),
        Some("42501") => return RemoteError::rejected(RejectionKind::PermissionDenied, message),
        Some("23503") => return RemoteError::rejected(RejectionKind::ForeignKey, message),
        Some("23505") => return RemoteError::rejected(RejectionKind::Conflict, message),
        _ => {}
    }

    match status {
        StatusCode::FORBIDDEN => RemoteError::rejected(RejectionKind::PermissionDenied, message),
        StatusCode::CONFLICT => RemoteError::rejected(RejectionKind::Conflict, message),
        StatusCode::NOT_FOUND => RemoteError::SchemaMissing(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Unreachable(message)
        }
        s if s.is_server_error() => RemoteError::Unreachable(message),
        _ => RemoteError::rejected(RejectionKind::Validation, message),
    }
}

fn describe(status: StatusCode, payload: &PostgrestError, body: &str) -> String {
    let mut text = match (&payload.message, &payload.details) {
        (Some(message), Some(details)) => format!("{} ({})", message.trim(), details.trim()),
        (Some(message), None) => message.trim().to_string(),
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => format!("HTTP {}", status.as_u16()),
    };
    if let Some(hint) = &payload.hint {
        text.push_str(&format!("; hint: {}", hint.trim()));
    }
    text
}
