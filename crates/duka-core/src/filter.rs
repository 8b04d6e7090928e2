//! # Filters
//!
//! Equality filters understood by both the local mirror (as a SQL `WHERE`
//! clause) and the remote store (as `?column=eq.value` query pairs).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value compared against a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl FilterValue {
    /// JSON form, used when matching rows held as JSON objects.
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Text(s) => Value::String(s.clone()),
            FilterValue::Int(i) => Value::from(*i),
            FilterValue::Bool(b) => Value::Bool(*b),
        }
    }

    /// Text form, used in query strings.
    pub fn to_query(&self) -> String {
        match self {
            FilterValue::Text(s) => s.clone(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// A conjunction of `column = value` conditions with an optional limit.
///
/// Enum-valued columns are compared by their snake_case text.
///
/// ```rust
/// use duka_core::Filter;
///
/// let filter = Filter::new().eq("customer_id", "c-1").eq("status", "open").limit(50);
/// assert_eq!(filter.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<(String, FilterValue)>,
    limit: Option<u32>,
}

impl Filter {
    /// Matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[(String, FilterValue)] {
        &self.conditions
    }

    pub fn max_rows(&self) -> Option<u32> {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.limit.is_none()
    }

    /// Whether a JSON object row satisfies every condition.
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(&value.to_json()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_json_rows() {
        let row = json!({ "id": "d-1", "customer_id": "c-1", "status": "open", "paid_cents": 0 });

        assert!(Filter::new().matches(&row));
        assert!(Filter::new().eq("customer_id", "c-1").matches(&row));
        assert!(Filter::new().eq("paid_cents", 0i64).eq("status", "open").matches(&row));
        assert!(!Filter::new().eq("status", "settled").matches(&row));
        assert!(!Filter::new().eq("missing", "x").matches(&row));
    }

    #[test]
    fn test_query_form() {
        assert_eq!(FilterValue::from(42i64).to_query(), "42");
        assert_eq!(FilterValue::from(true).to_query(), "true");
        assert_eq!(FilterValue::from("c-1").to_query(), "c-1");
    }

    #[test]
    fn test_empty_filter() {
        assert!(Filter::new().is_empty());
        assert!(!Filter::new().limit(5).is_empty());
        assert_eq!(Filter::new().limit(5).max_rows(), Some(5));
    }
}
