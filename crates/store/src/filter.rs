use serde_json::Value;

use crate::record::StoredRecord;

/// Field-equality filter over a bucket's JSON values, in the spirit of the
/// teacher's `ObjectColumnFilter`/`FilterableQueryBuilder` typed-column
/// filters but collapsed to the one predicate shape C3/C5/C6 actually need:
/// AND of exact-match field checks.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    equals: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.push((field.into(), value));
        self
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.equals.iter().all(|(field, expected)| {
            record
                .value
                .get(field)
                .map(|actual| actual == expected)
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct FindOptions {
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            sort_field: None,
            sort_order: SortOrder::Ascending,
            limit: None,
            offset: 0,
        }
    }
}

/// Result of [`crate::Store::sql_gap_scan`]: the first free address found in
/// the scanned range and how many consecutive addresses are free starting
/// there (bounded by `max_gap`).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Gap {
    pub gap_start: std::net::IpAddr,
    pub gap_length: u32,
}
