//! On-disk job descriptions for the CLI.

use sc_core::{ChannelSpec, Error};
use sc_hist::{NormalizerConfig, SignalBasis};
use sc_inference::{CalculatorConfig, ScanConfig, ScanPointSpec};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

/// Signal selection for a normalize job. A sample is typically split over
/// several generation runs; the whole inclusive run range is normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSpec {
    /// Signal channel name.
    pub channel: String,
    /// First run of the signal selection.
    pub run_start: u32,
    /// Last run, inclusive; defaults to `run_start`.
    #[serde(default)]
    pub run_end: Option<u32>,
    /// Generated event count of the signal sample.
    pub n_generated: u64,
    /// Normalization basis.
    pub basis: SignalBasis,
}

impl SignalSpec {
    /// The inclusive run range to normalize.
    pub fn runs(&self) -> sc_core::Result<RangeInclusive<u32>> {
        let end = self.run_end.unwrap_or(self.run_start);
        if end < self.run_start {
            return Err(Error::ConfigurationError(format!(
                "signal run range {}..={} is reversed",
                self.run_start, end
            )));
        }
        Ok(self.run_start..=end)
    }
}

/// A `normalize` job: which channels of one store to rescale and combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeSpec {
    /// Selection cut identifier.
    pub cut_id: String,
    /// Run index of the background selections.
    pub run: u32,
    /// Background channels.
    pub backgrounds: Vec<ChannelSpec>,
    /// Optional signal to normalize alongside the backgrounds.
    #[serde(default)]
    pub signal: Option<SignalSpec>,
    /// Scale factor and combination policy.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

/// Calculator settings as written in job files. Kept separate from
/// [`CalculatorConfig`] so the file format stays flat and stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorSpec {
    /// Null toys for the p-value.
    pub n_toys: usize,
    /// Signal+background toys for the expected band.
    pub n_toys_alt: usize,
    /// Toys per batch.
    pub batch_size: usize,
    /// Base seed.
    pub seed: u64,
    /// Binned or unbinned toys.
    pub binned: bool,
    /// Force every toy to this event count.
    pub toy_event_count: Option<u64>,
    /// Wall-clock budget in seconds, checked between batches.
    pub deadline_secs: Option<u64>,
}

impl Default for CalculatorSpec {
    fn default() -> Self {
        let c = CalculatorConfig::default();
        Self {
            n_toys: c.n_toys_null,
            n_toys_alt: c.n_toys_alt,
            batch_size: c.batch_size,
            seed: c.seed,
            binned: c.binned,
            toy_event_count: c.toy_event_count,
            deadline_secs: None,
        }
    }
}

impl CalculatorSpec {
    /// Convert to the calculator configuration.
    pub fn to_config(&self) -> CalculatorConfig {
        CalculatorConfig {
            n_toys_null: self.n_toys,
            n_toys_alt: self.n_toys_alt,
            batch_size: self.batch_size,
            seed: self.seed,
            binned: self.binned,
            toy_event_count: self.toy_event_count,
            deadline: self.deadline_secs.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

/// A `scan` job: scan-wide settings plus the list of mass points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSpec {
    /// Shared per-point configuration.
    pub scan: ScanConfig,
    /// Calculator settings.
    #[serde(default)]
    pub calculator: CalculatorSpec,
    /// Mass points, each with its own store file.
    pub points: Vec<ScanPointSpec>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> sc_core::Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl NormalizeSpec {
    /// Read a normalize job from a JSON file.
    pub fn load(path: &Path) -> sc_core::Result<Self> {
        read_json(path)
    }
}

impl ScanSpec {
    /// Read a scan job from a JSON file.
    pub fn load(path: &Path) -> sc_core::Result<Self> {
        read_json(path)
    }
}
