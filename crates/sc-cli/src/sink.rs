//! Result persistence: named tables inside one JSON document.
//!
//! The document maps table names to [`ResultTable`]s, so repeated scans of
//! different selections can share an output file. Publishing with `merge`
//! upserts rows by mass into an existing table instead of replacing it.

use sc_core::{Result, ResultTable};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes result tables to a JSON document on disk.
pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<BTreeMap<String, ResultTable>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Publish `table` under `name`.
    ///
    /// With `merge`, rows are upserted into the existing table of the same
    /// name; without it, the named table is replaced wholesale. Other
    /// tables in the document are left untouched either way.
    pub fn publish(&self, name: &str, table: ResultTable, merge: bool) -> Result<()> {
        let mut document = self.read_document()?;
        let n_rows = table.len();
        match document.entry(name.to_string()) {
            Entry::Occupied(mut entry) if merge => entry.get_mut().merge(table),
            Entry::Occupied(mut entry) => {
                entry.insert(table);
            }
            Entry::Vacant(entry) => {
                entry.insert(table);
            }
        }
        let bytes = serde_json::to_vec_pretty(&document)?;
        std::fs::write(&self.path, bytes)?;
        info!(path = %self.path.display(), table = name, n_rows, merge, "published result table");
        Ok(())
    }

    /// Read the named table back, if present.
    pub fn read_table(&self, name: &str) -> Result<Option<ResultTable>> {
        Ok(self.read_document()?.remove(name))
    }
}

/// Convenience for one-shot publication.
pub fn publish_table(path: &Path, name: &str, table: ResultTable, merge: bool) -> Result<()> {
    ResultSink::new(path).publish(name, table, merge)
}
