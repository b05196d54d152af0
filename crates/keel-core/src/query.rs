//! Query parameters and filter serialization.
//!
//! Plain parameters are form-urlencoded as-is. The `filters` entry is a
//! mapping of filter name to a set of values; it is first encoded as a JSON
//! object of name → array-of-strings, and that JSON text becomes the
//! URL-encoded value of the `filters` key.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Reserved key carrying the JSON-encoded filters.
pub const FILTERS_KEY: &str = "filters";

/// Key used to resume the event stream.
pub const SINCE_KEY: &str = "since";

/// Filter name → distinct values.
pub type Filters = BTreeMap<String, Vec<String>>;

/// Query parameters for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, String>,
    filters: Filters,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plain parameter, replacing any previous value for `key`.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add a value to a filter. Duplicate values are ignored.
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let values = self.filters.entry(name.into()).or_default();
        let value = value.into();
        if !values.contains(&value) {
            values.push(value);
        }
        self
    }

    /// Build a query holding only the given filters.
    pub fn from_filters(filters: Filters) -> Self {
        let mut query = Self::new();
        for (name, values) in filters {
            for value in values {
                query = query.filter(name.clone(), value);
            }
        }
        query
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.filters.is_empty()
    }

    /// A copy of this query with `since` set to `timestamp`, replacing any
    /// value the caller supplied.
    pub fn merged_since(&self, timestamp: i64) -> Self {
        self.clone().param(SINCE_KEY, timestamp)
    }

    /// Form-urlencode the query, or `None` when there is nothing to send.
    pub fn encode(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            // Structured filters win over a pre-encoded `filters` parameter.
            if key == FILTERS_KEY && !self.filters.is_empty() {
                continue;
            }
            serializer.append_pair(key, value);
        }
        if !self.filters.is_empty() {
            // A map of strings to string arrays cannot fail to serialize.
            let json = serde_json::to_string(&self.filters).unwrap_or_default();
            serializer.append_pair(FILTERS_KEY, &json);
        }
        Some(serializer.finish())
    }
}
