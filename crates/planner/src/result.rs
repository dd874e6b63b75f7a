//! Query results

use serde::{Deserialize, Serialize};
use terrace_core::{Record, Value};

/// An ordered set of result rows with their column names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Output column names, in projection order.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Record>,
}

impl ResultSet {
    /// Build a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// The empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The single value of a one-row projection, if the shape matches.
    pub fn single_value(&self, column: &str) -> Option<&Value> {
        if self.rows.len() == 1 {
            self.rows[0].get(column)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_requires_one_row() {
        let rows = vec![Record::from([("name", Value::String("A".into()))])];
        let rs = ResultSet::new(vec!["name".into()], rows);
        assert_eq!(rs.single_value("name"), Some(&Value::String("A".into())));
        assert_eq!(rs.single_value("missing"), None);
        assert!(!rs.is_empty());
        assert_eq!(rs.row_count(), 1);

        assert_eq!(ResultSet::empty().single_value("name"), None);
    }
}
