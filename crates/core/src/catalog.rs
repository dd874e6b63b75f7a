//! Schema catalog
//!
//! The catalog owns every table's schema version history and persists it as
//! canonical JSON at `schema/catalog.json`. Writes go through a temp file
//! and an atomic rename so a crash never leaves a torn catalog.
//!
//! Time travel consults `schema_version_at` to know which schema was active
//! at a given timestamp.

use crate::error::{Error, Result};
use crate::schema::{ColumnDef, TableSchema};
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CATALOG_FILE: &str = "catalog.json";

/// One entry in a table's schema history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRevision {
    /// The schema as of this revision.
    pub schema: TableSchema,
    /// When the revision took effect (engine microseconds).
    pub effective_at: Timestamp,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    /// Table name to ascending revision history.
    tables: BTreeMap<String, Vec<SchemaRevision>>,
}

/// Versioned schema catalog persisted under `schema/`.
pub struct SchemaCatalog {
    path: PathBuf,
    inner: RwLock<CatalogState>,
}

impl SchemaCatalog {
    /// Load the catalog from `schema_dir`, creating an empty one if the
    /// file does not exist yet.
    pub fn open(schema_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = schema_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(CATALOG_FILE);
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            CatalogState::default()
        };
        Ok(Self {
            path,
            inner: RwLock::new(state),
        })
    }

    /// Register a new table.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a table with the same name is registered.
    pub fn create_table(&self, schema: TableSchema, now: Timestamp) -> Result<()> {
        {
            let mut state = self.inner.write();
            if state.tables.contains_key(&schema.table) {
                return Err(Error::AlreadyExists(schema.table));
            }
            debug!(target: "terrace::catalog", table = %schema.table, "table registered");
            state.tables.insert(
                schema.table.clone(),
                vec![SchemaRevision {
                    schema,
                    effective_at: now,
                }],
            );
        }
        self.persist()
    }

    /// Remove a table and its history.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        {
            let mut state = self.inner.write();
            if state.tables.remove(table).is_none() {
                return Err(Error::NotFound(table.to_string()));
            }
        }
        self.persist()
    }

    /// Current schema for `table`.
    pub fn current(&self, table: &str) -> Result<TableSchema> {
        let state = self.inner.read();
        state
            .tables
            .get(table)
            .and_then(|revs| revs.last())
            .map(|rev| rev.schema.clone())
            .ok_or_else(|| Error::NotFound(table.to_string()))
    }

    /// Full revision history for `table`, oldest first.
    pub fn history(&self, table: &str) -> Result<Vec<SchemaRevision>> {
        let state = self.inner.read();
        state
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| Error::NotFound(table.to_string()))
    }

    /// Schema version active at timestamp `at`.
    ///
    /// Falls back to the first revision when `at` predates the table, so
    /// time travel before creation still resolves deterministically.
    pub fn schema_version_at(&self, table: &str, at: Timestamp) -> Result<u32> {
        let state = self.inner.read();
        let revs = state
            .tables
            .get(table)
            .ok_or_else(|| Error::NotFound(table.to_string()))?;
        let mut version = revs[0].schema.version;
        for rev in revs {
            if rev.effective_at <= at {
                version = rev.schema.version;
            } else {
                break;
            }
        }
        Ok(version)
    }

    /// Evolve `table` by adding `col`; returns the new schema version.
    pub fn add_column(&self, table: &str, col: ColumnDef, now: Timestamp) -> Result<u32> {
        let version = {
            let mut state = self.inner.write();
            let revs = state
                .tables
                .get_mut(table)
                .ok_or_else(|| Error::NotFound(table.to_string()))?;
            let next = revs
                .last()
                .expect("table history is never empty")
                .schema
                .with_column(col)?;
            let version = next.version;
            revs.push(SchemaRevision {
                schema: next,
                effective_at: now,
            });
            version
        };
        self.persist()?;
        Ok(version)
    }

    /// Evolve `table` by dropping `column`; returns the new schema version.
    pub fn drop_column(&self, table: &str, column: &str, now: Timestamp) -> Result<u32> {
        let version = {
            let mut state = self.inner.write();
            let revs = state
                .tables
                .get_mut(table)
                .ok_or_else(|| Error::NotFound(table.to_string()))?;
            let next = revs
                .last()
                .expect("table history is never empty")
                .schema
                .without_column(column)?;
            let version = next.version;
            revs.push(SchemaRevision {
                schema: next,
                effective_at: now,
            });
            version
        };
        self.persist()?;
        Ok(version)
    }

    /// Names of all registered tables.
    pub fn list_tables(&self) -> Vec<String> {
        self.inner.read().tables.keys().cloned().collect()
    }

    /// Whether `table` is registered.
    pub fn table_exists(&self, table: &str) -> bool {
        self.inner.read().tables.contains_key(table)
    }

    // Canonical JSON, temp file, rename. The BTreeMap state keeps field
    // order stable across rewrites.
    fn persist(&self) -> Result<()> {
        let bytes = {
            let state = self.inner.read();
            serde_json::to_vec_pretty(&*state)?
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
