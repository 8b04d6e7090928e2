//! In-process remote store.
//!
//! Holds remote tables as JSON rows and can be told to fail, per operation,
//! table or row, the same ways the real remote does. Used by tests and to
//! simulate a flaky connection locally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use duka_core::Filter;

use super::{RejectionKind, RemoteError, RemoteResult, RemoteStore};

/// Which remote operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Insert,
    Select,
    Update,
    Delete,
    Invoke,
}

/// What an injected fault does.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail with this error.
    Fail(RemoteError),
    /// Wait before answering normally.
    Delay(Duration),
}

impl Fault {
    pub fn unreachable() -> Self {
        Fault::Fail(RemoteError::Unreachable("simulated network failure".into()))
    }

    pub fn unauthenticated() -> Self {
        Fault::Fail(RemoteError::Unauthenticated)
    }

    pub fn schema_missing() -> Self {
        Fault::Fail(RemoteError::SchemaMissing("simulated missing relation".into()))
    }

    pub fn reject(kind: RejectionKind) -> Self {
        Fault::Fail(RemoteError::rejected(kind, format!("simulated {kind}")))
    }
}

/// Matches calls by operation, table and row id. Unset parts match anything.
#[derive(Debug, Clone)]
pub struct FaultRule {
    op: Option<RemoteOp>,
    table: Option<String>,
    id: Option<String>,
    fault: Fault,
}

impl FaultRule {
    /// Applies to every call.
    pub fn any(fault: Fault) -> Self {
        FaultRule {
            op: None,
            table: None,
            id: None,
            fault,
        }
    }

    /// Applies to one operation.
    pub fn on(op: RemoteOp, fault: Fault) -> Self {
        FaultRule {
            op: Some(op),
            ..FaultRule::any(fault)
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn matches(&self, op: RemoteOp, table: &str, id: Option<&str>) -> bool {
        self.op.map_or(true, |o| o == op)
            && self.table.as_deref().map_or(true, |t| t == table)
            && self.id.as_deref().map_or(true, |i| Some(i) == id)
    }
}

/// Remote store backed by in-process tables.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    functions: Mutex<HashMap<String, Value>>,
    invocations: Mutex<Vec<(String, Value)>>,
    faults: Mutex<Vec<FaultRule>>,
    calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Adds a fault rule. The first matching rule wins.
    pub async fn inject(&self, rule: FaultRule) {
        self.faults.lock().await.push(rule);
    }

    /// Makes every call fail as unreachable.
    pub async fn go_down(&self) {
        self.inject(FaultRule::any(Fault::unreachable())).await;
    }

    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Registers the result a named function returns.
    pub async fn register_function(&self, name: impl Into<String>, result: Value) {
        self.functions.lock().await.insert(name.into(), result);
    }

    /// Functions called so far, with their arguments.
    pub async fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().await.clone()
    }

    /// Seeds a row directly, bypassing faults.
    pub async fn seed(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn row(&self, table: &str, id: &str) -> Option<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .and_then(|rows| rows.iter().find(|r| row_id(r) == Some(id)).cloned())
    }

    /// Number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn check(&self, op: RemoteOp, table: &str, id: Option<&str>) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fault = self
            .faults
            .lock()
            .await
            .iter()
            .find(|rule| rule.matches(op, table, id))
            .map(|rule| rule.fault.clone());

        match fault {
            Some(Fault::Fail(err)) => {
                debug!(?op, table, ?id, error = %err, "Injected remote fault");
                Err(err)
            }
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn insert(&self, table: &str, row: Value) -> RemoteResult<Value> {
        let id = row_id(&row)
            .ok_or_else(|| RemoteError::rejected(RejectionKind::Validation, "row has no id"))?
            .to_string();
        self.check(RemoteOp::Insert, table, Some(&id)).await?;

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| row_id(r) == Some(id.as_str())) {
            return Err(RemoteError::rejected(
                RejectionKind::Conflict,
                format!("duplicate key value violates unique constraint \"{table}_pkey\""),
            ));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn select(&self, table: &str, filter: &Filter) -> RemoteResult<Vec<Value>> {
        let id = filter
            .conditions()
            .iter()
            .find(|(column, _)| column == "id")
            .map(|(_, value)| value.to_query());
        self.check(RemoteOp::Select, table, id.as_deref()).await?;

        let tables = self.tables.lock().await;
        let limit = filter.max_rows().map_or(usize::MAX, |l| l as usize);
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.matches(row))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> RemoteResult<Value> {
        self.check(RemoteOp::Update, table, Some(id)).await?;

        let mut tables = self.tables.lock().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
            .ok_or_else(|| {
                RemoteError::rejected(RejectionKind::NotFound, format!("no row {id} in {table}"))
            })?;

        if let (Some(target), Value::Object(fields)) = (row.as_object_mut(), patch) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<bool> {
        self.check(RemoteOp::Delete, table, Some(id)).await?;

        let mut tables = self.tables.lock().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| row_id(r) != Some(id));
        Ok(rows.len() < before)
    }

    async fn invoke(&self, function: &str, args: Value) -> RemoteResult<Value> {
        self.check(RemoteOp::Invoke, function, None).await?;

        let result = self
            .functions
            .lock()
            .await
            .get(function)
            .cloned()
            .ok_or_else(|| RemoteError::SchemaMissing(format!("function {function}")))?;

        self.invocations
            .lock()
            .await
            .push((function.to_string(), args));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_select_update_delete() {
        let store = MemoryRemoteStore::new();

        store
            .insert("customers", json!({ "id": "c-1", "name": "Jane", "status": "active" }))
            .await
            .unwrap();

        let rows = store
            .select("customers", &Filter::new().eq("status", "active"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let updated = store
            .update("customers", "c-1", json!({ "status": "inactive" }))
            .await
            .unwrap();
        assert_eq!(updated["status"], "inactive");
        assert_eq!(updated["name"], "Jane");

        assert!(store.delete("customers", "c-1").await.unwrap());
        assert!(!store.delete("customers", "c-1").await.unwrap());
        assert_eq!(store.call_count(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryRemoteStore::new();
        store.insert("debts", json!({ "id": "d-1" })).await.unwrap();

        let err = store.insert("debts", json!({ "id": "d-1" })).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionKind::Conflict));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = MemoryRemoteStore::new();
        let err = store.update("sales", "s-1", json!({})).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionKind::NotFound));
    }

    #[tokio::test]
    async fn test_fault_rules_match_narrowly() {
        let store = MemoryRemoteStore::new();
        store
            .inject(
                FaultRule::on(RemoteOp::Delete, Fault::reject(RejectionKind::ForeignKey))
                    .table("customers")
                    .id("c-1"),
            )
            .await;

        store.seed("customers", json!({ "id": "c-1" })).await;
        store.seed("customers", json!({ "id": "c-2" })).await;

        assert!(store.delete("customers", "c-1").await.is_err());
        assert!(store.delete("customers", "c-2").await.unwrap());
        assert!(store.select("customers", &Filter::new()).await.is_ok());

        store.go_down().await;
        assert!(store
            .select("customers", &Filter::new())
            .await
            .unwrap_err()
            .is_transient());

        store.clear_faults().await;
        assert_eq!(store.rows("customers").await.len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_function_is_schema_missing() {
        let store = MemoryRemoteStore::new();
        assert!(store
            .invoke("confirm_user_email", json!({}))
            .await
            .unwrap_err()
            .is_schema_missing());

        store.register_function("confirm_user_email", json!(true)).await;
        let result = store
            .invoke("confirm_user_email", json!({ "user_id": "u-1" }))
            .await
            .unwrap();
        assert_eq!(result, json!(true));
        assert_eq!(store.invocations().await.len(), 1);
    }
}
