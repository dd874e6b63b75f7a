//! Row records
//!
//! A `Record` maps column names to values. The map is ordered (`BTreeMap`)
//! so records serialize canonically — commit payload hashing depends on it.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// System column populated on insert when time-travel bookkeeping is on.
pub const COL_CREATED_AT: &str = "_created_at";
/// System column refreshed on every upsert when time-travel bookkeeping is on.
pub const COL_UPDATED_AT: &str = "_updated_at";

/// Whether a column name is one of the engine-managed system columns.
pub fn is_system_column(name: &str) -> bool {
    name == COL_CREATED_AT || name == COL_UPDATED_AT
}

/// Ordered mapping from column name to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get a column's value, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Set a column's value, returning the previous one if any.
    pub fn set(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    /// Remove a column.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Whether the record has a value for `column`.
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Column names in deterministic order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    /// Iterate columns and values in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the named columns (projection). Unknown names are skipped.
    pub fn project(&self, columns: &[String]) -> Record {
        let mut out = Record::new();
        for col in columns {
            if let Some(v) = self.get(col) {
                out.set(col.clone(), v.clone());
            }
        }
        out
    }

    /// Rough in-memory size in bytes, used for tier accounting.
    pub fn approx_size(&self) -> u64 {
        fn value_size(v: &Value) -> u64 {
            match v {
                Value::Null => 1,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) | Value::Timestamp(_) => 8,
                Value::String(s) => s.len() as u64,
                Value::Array(items) => items.iter().map(value_size).sum::<u64>() + 8,
                Value::Struct(fields) => fields
                    .iter()
                    .map(|(k, v)| k.len() as u64 + value_size(v))
                    .sum::<u64>(),
            }
        }
        self.0
            .iter()
            .map(|(k, v)| k.len() as u64 + value_size(v))
            .sum()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Record {
    fn from(entries: [(&str, Value); N]) -> Self {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}
