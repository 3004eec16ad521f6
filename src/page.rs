use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page must be at least 1, got {0}")]
    InvalidPage(u32),
    #[error("limit must be at least 1, got {0}")]
    InvalidLimit(u32),
    #[error("invalid filter field '{field}': {reason}")]
    InvalidFilterField { field: String, reason: String },
}

/// An ordered set of `field=value` filters applied to a list request.
///
/// Field order is deterministic (sorted) so that rendered query strings
/// are stable across invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: BTreeMap<String, String>,
}

impl FilterSet {
    const MAX_FIELD_LENGTH: usize = 64;

    pub fn new() -> Self {
        Self {
            filters: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), PageError> {
        let field = field.into();
        Self::validate_field(&field)?;
        self.filters.insert(field, value.into());
        Ok(())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Result<Self, PageError> {
        self.insert(field, value)?;
        Ok(self)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.filters.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when `item` satisfies every filter in the set.
    pub fn matches(&self, item: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| matches_filter(item, field, value))
    }

    fn validate_field(field: &str) -> Result<(), PageError> {
        if field.is_empty() {
            return Err(PageError::InvalidFilterField {
                field: field.to_string(),
                reason: "field name cannot be empty".to_string(),
            });
        }
        if field.len() > Self::MAX_FIELD_LENGTH {
            // char-based truncation: a byte slice could split a multibyte
            // character and panic instead of returning the error
            let shown: String = field.chars().take(32).collect();
            return Err(PageError::InvalidFilterField {
                field: format!("{shown}..."),
                reason: format!(
                    "field name exceeds maximum length of {} bytes",
                    Self::MAX_FIELD_LENGTH
                ),
            });
        }
        if !field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PageError::InvalidFilterField {
                field: field.to_string(),
                reason: "allowed characters are a-z, A-Z, 0-9, -, _".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether one item satisfies a single `field=value` predicate.
///
/// Backends are inconsistent about casing of status strings, so string
/// comparison is ASCII-case-insensitive. Numbers and booleans compare by
/// their canonical string rendering. A missing field never matches.
pub fn matches_filter(item: &Value, field: &str, value: &str) -> bool {
    match item.get(field) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case(value),
        Some(Value::Number(n)) => n.to_string() == value,
        Some(Value::Bool(b)) => {
            (*b && value.eq_ignore_ascii_case("true"))
                || (!*b && value.eq_ignore_ascii_case("false"))
        }
        _ => false,
    }
}

/// Immutable description of one fetch intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    limit: u32,
    filters: FilterSet,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, PageError> {
        if page < 1 {
            return Err(PageError::InvalidPage(page));
        }
        if limit < 1 {
            return Err(PageError::InvalidLimit(limit));
        }
        Ok(Self {
            page,
            limit,
            filters: FilterSet::new(),
        })
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_filter(
        mut self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, PageError> {
        self.filters.insert(field, value)?;
        Ok(self)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Query parameters for the wire request; filters follow page/limit.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        for (field, value) in self.filters.iter() {
            query.push((field.to_string(), value.to_string()));
        }
        query
    }
}

/// Pagination metadata attached to a returned page.
///
/// When `server_reported_totals` is false, `total` and `total_pages` are
/// heuristic lower-bound estimates and callers should present them as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub server_reported_totals: bool,
}

/// Server- or client-computed aggregate of item counts per status value,
/// independent of the current page. Holds a `total` entry alongside the
/// per-status entries, matching the backend's `counts` object shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    counts: BTreeMap<String, u64>,
}

impl StatusCounts {
    pub const TOTAL_KEY: &'static str = "total";

    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Parse a server-supplied `counts` object. Returns `None` unless the
    /// value is an object with at least one non-negative integer entry;
    /// non-integer entries are skipped rather than failing the whole object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut counts = BTreeMap::new();
        for (key, entry) in object {
            if let Some(n) = entry.as_u64() {
                counts.insert(key.clone(), n);
            }
        }
        if counts.is_empty() {
            return None;
        }
        Some(Self { counts })
    }

    pub fn set(&mut self, key: impl Into<String>, count: u64) {
        self.counts.insert(key.into(), count);
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    pub fn total(&self) -> Option<u64> {
        self.get(Self::TOTAL_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// One coherent page of a filtered collection, regardless of which path
/// (direct or fallback) produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub items: Vec<Value>,
    pub meta: PageMeta,
    pub counts: Option<StatusCounts>,
    /// Set when a fallback page walk hit its safety bound before the last
    /// backend page; totals derived from the walk undercount in that case.
    pub truncated: bool,
}

impl PageResult {
    pub fn empty(page: u32, limit: u32) -> Self {
        Self {
            items: Vec::new(),
            meta: PageMeta {
                total: 0,
                page,
                limit,
                total_pages: 1,
                server_reported_totals: false,
            },
            counts: None,
            truncated: false,
        }
    }

    /// Decode the page's items into a concrete entity type.
    pub fn deserialize_items<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<Vec<T>, serde_json::Error> {
        self.items
            .iter()
            .map(|item| serde_json::from_value(item.clone()))
            .collect()
    }
}
