//! Table schemas and evolution rules
//!
//! A table's schema is an ordered list of typed, nullability-annotated
//! columns plus a storage mode. Schemas are immutable within a version;
//! every accepted change produces a new version recorded in the catalog.
//!
//! Evolution compatibility:
//! - adding a nullable column is compatible
//! - dropping a nullable column is compatible (readers see null)
//! - adding or dropping a non-nullable column is a breaking change and
//!   requires explicit migration
//!
//! Float columns accept integer writes (see [`ColumnType::matches`]), so
//! rows written before a column was widened keep validating.

use crate::error::{Error, Result};
use crate::record::{is_system_column, Record};
use crate::types::Timestamp;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// Microseconds since the Unix epoch.
    Timestamp,
    /// Homogeneous list.
    Array(Box<ColumnType>),
    /// Nested structure.
    Struct(Vec<ColumnDef>),
}

impl ColumnType {
    /// Whether `value` inhabits this type. Null is handled by nullability,
    /// not here.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Int, Value::Int(_)) => true,
            // Widened columns keep accepting the narrower writes.
            (ColumnType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ColumnType::Bool, Value::Bool(_)) => true,
            (ColumnType::String, Value::String(_)) => true,
            (ColumnType::Timestamp, Value::Timestamp(_) | Value::Int(_)) => true,
            (ColumnType::Array(elem), Value::Array(items)) => {
                items.iter().all(|v| v.is_null() || elem.matches(v))
            }
            (ColumnType::Struct(fields), Value::Struct(entries)) => fields.iter().all(|f| {
                match entries.get(&f.name) {
                    Some(v) if v.is_null() => f.nullable,
                    Some(v) => f.ty.matches(v),
                    None => f.nullable,
                }
            }),
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "int"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Bool => write!(f, "bool"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Array(elem) => write!(f, "array<{}>", elem),
            ColumnType::Struct(_) => write!(f, "struct"),
        }
    }
}

/// A column definition: name, type, nullability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub ty: ColumnType,
    /// Whether null is a legal value.
    pub nullable: bool,
}

impl ColumnDef {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, ty: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable,
        }
    }
}

/// How a table's write path behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Every write produces new read-optimized blocks.
    CopyOnWrite,
    /// Writes append change records reconciled at scan time.
    MergeOnRead,
    /// Adaptive placement driven by batch size and workload ratio.
    #[default]
    Hybrid,
}

/// A versioned table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub table: String,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDef>,
    /// Schema version, starting at 1 and bumped on every accepted change.
    pub version: u32,
    /// Write-path behavior.
    pub mode: StorageMode,
    /// When this table was created (engine microseconds).
    pub created_at: Timestamp,
}

impl TableSchema {
    /// Create a version-1 schema.
    pub fn new(
        table: impl Into<String>,
        columns: Vec<ColumnDef>,
        mode: StorageMode,
        created_at: Timestamp,
    ) -> Self {
        Self {
            table: table.into(),
            columns,
            version: 1,
            mode,
            created_at,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Validate a record against this schema.
    ///
    /// Rejects unknown columns, null or missing values in non-nullable
    /// columns, and type mismatches. Engine-managed system columns pass
    /// through untyped.
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        for (name, value) in record.iter() {
            if is_system_column(name) {
                continue;
            }
            let col = self.column(name).ok_or_else(|| Error::SchemaMismatch {
                column: name.to_string(),
                reason: format!("no such column in table {}", self.table),
            })?;
            if value.is_null() {
                if !col.nullable {
                    return Err(Error::SchemaMismatch {
                        column: name.to_string(),
                        reason: "null in non-nullable column".to_string(),
                    });
                }
                continue;
            }
            if !col.ty.matches(value) {
                return Err(Error::SchemaMismatch {
                    column: name.to_string(),
                    reason: format!("expected {}, got {}", col.ty, value.type_name()),
                });
            }
        }
        for col in &self.columns {
            if !col.nullable && !record.contains(&col.name) {
                return Err(Error::SchemaMismatch {
                    column: col.name.clone(),
                    reason: "missing non-nullable column".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Produce the next schema version with `col` added.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the column name is taken; `BreakingChange` if the
    /// column is non-nullable (existing rows cannot satisfy it).
    pub fn with_column(&self, col: ColumnDef) -> Result<TableSchema> {
        if self.column(&col.name).is_some() {
            return Err(Error::AlreadyExists(format!(
                "column {} on table {}",
                col.name, self.table
            )));
        }
        if !col.nullable {
            return Err(Error::BreakingChange(format!(
                "adding non-nullable column {} to table {}",
                col.name, self.table
            )));
        }
        let mut next = self.clone();
        next.columns.push(col);
        next.version += 1;
        Ok(next)
    }

    /// Produce the next schema version with `name` removed.
    ///
    /// # Errors
    ///
    /// `NotFound` if the column does not exist; `BreakingChange` if it is
    /// non-nullable.
    pub fn without_column(&self, name: &str) -> Result<TableSchema> {
        let col = self.column(name).ok_or_else(|| {
            Error::NotFound(format!("column {} on table {}", name, self.table))
        })?;
        if !col.nullable {
            return Err(Error::BreakingChange(format!(
                "dropping non-nullable column {} from table {}",
                name, self.table
            )));
        }
        let mut next = self.clone();
        next.columns.retain(|c| c.name != name);
        next.version += 1;
        Ok(next)
    }
}
