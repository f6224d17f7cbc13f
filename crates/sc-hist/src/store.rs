//! Path-addressed histogram repository.
//!
//! Histograms are keyed by explicit slash-separated paths
//! (`/<cutID>/<channel>/run_<N>/mwp_<channel>`); there is no notion of a
//! "current directory" carried between calls. Derived histograms live at
//! the store root under fixed names (`/bcombined`, `/snormed`).

use sc_core::{Error, Histogram, Result, SelectionContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Store-root name of the combined background histogram.
pub const BCOMBINED: &str = "/bcombined";
/// Store-root name of the normalized signal histogram.
pub const SNORMED: &str = "/snormed";

/// In-memory histogram store with a JSON file representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistogramStore {
    histograms: BTreeMap<String, Histogram>,
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') { path.to_string() } else { format!("/{path}") }
}

impl HistogramStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a store from a JSON file.
    ///
    /// A missing file is `NotFound` (the caller decides whether that is
    /// fatal); a malformed file surfaces as a JSON error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("histogram store {}", path.display())));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the store to a JSON file, replacing any existing content.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Look up the histogram addressed by a selection context.
    pub fn get(&self, ctx: &SelectionContext) -> Result<&Histogram> {
        self.get_path(&ctx.path())
    }

    /// Look up a histogram by explicit path.
    pub fn get_path(&self, path: &str) -> Result<&Histogram> {
        let key = normalize_path(path);
        self.histograms
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("histogram at {key}")))
    }

    /// Insert a histogram at `path`, overwriting any existing entry.
    ///
    /// Intermediate path segments are implicit; the key space is flat.
    pub fn put(&mut self, path: &str, histogram: Histogram) {
        let key = normalize_path(path);
        if self.histograms.insert(key.clone(), histogram).is_some() {
            tracing::debug!(path = %key, "overwrote existing histogram");
        }
    }

    /// Whether a histogram exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.histograms.contains_key(&normalize_path(path))
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    /// Number of stored histograms.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}
