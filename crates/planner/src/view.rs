//! Materialized views
//!
//! A view stores its defining query in canonical form, its refresh
//! strategy, the watermark of the last refresh, and the materialized rows.
//! A query whose canonical text equals a view's defining query is
//! rewritten to scan the view — but only when the view is fresh: its
//! watermark must be at or past the latest commit timestamp of the source
//! table. Incremental views are refreshed on demand when stale; full
//! views refuse the rewrite instead.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use terrace_core::{Error, Record, Result, Timestamp};
use tracing::debug;

/// When a stale view gets new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    /// Refresh on demand when a source change makes the view stale.
    Incremental,
    /// Refresh only when explicitly requested.
    Full,
}

/// A registered materialized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedView {
    /// View name.
    pub name: String,
    /// Defining query, canonical form.
    pub query: String,
    /// Source table the query reads.
    pub table: String,
    /// Refresh strategy.
    pub strategy: RefreshStrategy,
    /// Commit timestamp covered by the materialized rows.
    pub watermark: Timestamp,
    /// Output column names.
    pub columns: Vec<String>,
    /// Materialized rows.
    pub rows: Vec<Record>,
}

impl MaterializedView {
    /// Whether the view reflects every commit of its source.
    pub fn is_fresh(&self, latest_source_commit: Option<Timestamp>) -> bool {
        match latest_source_commit {
            Some(latest) => self.watermark >= latest,
            // A source with no commits cannot make the view stale.
            None => true,
        }
    }
}

/// Registry of materialized views.
#[derive(Default)]
pub struct ViewRegistry {
    views: RwLock<HashMap<String, MaterializedView>>,
}

impl ViewRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken.
    pub fn create(
        &self,
        name: &str,
        canonical_query: &str,
        table: &str,
        strategy: RefreshStrategy,
    ) -> Result<()> {
        let mut views = self.views.write();
        if views.contains_key(name) {
            return Err(Error::AlreadyExists(format!("view {}", name)));
        }
        views.insert(
            name.to_string(),
            MaterializedView {
                name: name.to_string(),
                query: canonical_query.to_string(),
                table: table.to_string(),
                strategy,
                watermark: 0,
                columns: Vec::new(),
                rows: Vec::new(),
            },
        );
        debug!(target: "terrace::planner", view = name, table, "materialized view registered");
        Ok(())
    }

    /// Fetch a view by name.
    pub fn get(&self, name: &str) -> Result<MaterializedView> {
        self.views
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("view {}", name)))
    }

    /// Remove a view.
    pub fn drop_view(&self, name: &str) -> Result<()> {
        if self.views.write().remove(name).is_none() {
            return Err(Error::NotFound(format!("view {}", name)));
        }
        Ok(())
    }

    /// The view whose defining query matches `canonical`, if any.
    pub fn find_rewrite(&self, canonical: &str) -> Option<MaterializedView> {
        self.views
            .read()
            .values()
            .find(|v| v.query == canonical)
            .cloned()
    }

    /// Store refreshed content and advance the watermark.
    pub fn store_refresh(
        &self,
        name: &str,
        watermark: Timestamp,
        columns: Vec<String>,
        rows: Vec<Record>,
    ) -> Result<()> {
        let mut views = self.views.write();
        let view = views
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("view {}", name)))?;
        view.watermark = watermark;
        view.columns = columns;
        view.rows = rows;
        debug!(target: "terrace::planner", view = name, watermark, "view refreshed");
        Ok(())
    }

    /// Registered view names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.read().keys().cloned().collect();
        names.sort();
        names
    }
}
