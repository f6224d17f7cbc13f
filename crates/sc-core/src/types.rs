//! Common data types for sigscan.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Relative tolerance used when comparing bin edges.
const EDGE_RTOL: f64 = 1e-9;

/// A 1D binned histogram: contiguous bins with strictly increasing edges.
///
/// `edges.len() == counts.len() + 1`; `sumw2` carries the per-bin sum of
/// squared weights (statistical variance of the bin content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin edges (length = n_bins + 1), strictly increasing.
    pub edges: Vec<f64>,
    /// Bin contents (length = n_bins).
    pub counts: Vec<f64>,
    /// Per-bin sum of weights squared (length = n_bins).
    pub sumw2: Vec<f64>,
}

impl Histogram {
    /// Create a histogram, validating edge ordering and length agreement.
    pub fn new(edges: Vec<f64>, counts: Vec<f64>, sumw2: Vec<f64>) -> Result<Self> {
        if edges.len() != counts.len() + 1 {
            return Err(Error::InvalidHistogram(format!(
                "edge/count length mismatch: {} edges for {} bins",
                edges.len(),
                counts.len()
            )));
        }
        if sumw2.len() != counts.len() {
            return Err(Error::InvalidHistogram(format!(
                "sumw2 length mismatch: {} for {} bins",
                sumw2.len(),
                counts.len()
            )));
        }
        if edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::InvalidHistogram("bin edges must be strictly increasing".into()));
        }
        if edges.iter().any(|e| !e.is_finite()) || counts.iter().any(|c| !c.is_finite()) {
            return Err(Error::InvalidHistogram("non-finite edge or content".into()));
        }
        if sumw2.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidHistogram(
                "non-finite or negative bin variance".into(),
            ));
        }
        Ok(Self { edges, counts, sumw2 })
    }

    /// Uniform-binning constructor with all-zero contents.
    pub fn with_uniform_bins(n_bins: usize, low: f64, high: f64) -> Result<Self> {
        if n_bins == 0 || !(high > low) {
            return Err(Error::InvalidHistogram(format!(
                "invalid axis: {} bins over [{}, {}]",
                n_bins, low, high
            )));
        }
        let width = (high - low) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| low + width * i as f64).collect();
        Ok(Self { edges, counts: vec![0.0; n_bins], sumw2: vec![0.0; n_bins] })
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Scale all bin contents (and variances) in place.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.counts {
            *c *= factor;
        }
        for v in &mut self.sumw2 {
            *v *= factor * factor;
        }
    }

    /// Whether `other` shares this histogram's bin count and edges.
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.edges.len() == other.edges.len()
            && self.edges.iter().zip(other.edges.iter()).all(|(a, b)| {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= EDGE_RTOL * scale
            })
    }

    /// Add `other` bin-wise. Fails `IncompatibleBinning` on layout mismatch.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        if !self.same_binning(other) {
            return Err(Error::IncompatibleBinning(format!(
                "cannot add histograms with {} and {} bins (or differing edges)",
                self.n_bins(),
                other.n_bins()
            )));
        }
        for (c, o) in self.counts.iter_mut().zip(other.counts.iter()) {
            *c += o;
        }
        for (v, o) in self.sumw2.iter_mut().zip(other.sumw2.iter()) {
            *v += o;
        }
        Ok(())
    }

    /// Rescale to unit area. Fails `InvalidHistogram` if the integral is not positive.
    pub fn unit_area(&mut self) -> Result<()> {
        let integral = self.integral();
        if !(integral > 0.0) || !integral.is_finite() {
            return Err(Error::InvalidHistogram(format!(
                "cannot normalize histogram with integral {integral}"
            )));
        }
        self.scale(1.0 / integral);
        Ok(())
    }
}

/// Key addressing one histogram in a store: `(cutID, channel, run)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionContext {
    /// Selection (cut) identifier.
    pub cut_id: String,
    /// Channel name, e.g. `background_jjbb` or `signal`.
    pub channel: String,
    /// Generation run number.
    pub run: u32,
}

impl SelectionContext {
    /// Store path: `/<cutID>/<channel>/run_<N>/mwp_<channel>`.
    pub fn path(&self) -> String {
        format!("/{}/{}/run_{}/mwp_{}", self.cut_id, self.channel, self.run, self.channel)
    }
}

/// Static per-channel configuration: cross section and generated statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Channel name as used in store paths.
    pub name: String,
    /// Production cross section in pb.
    pub xsec_pb: f64,
    /// Number of generated events for this channel.
    pub n_generated: u64,
}

/// Outcome of one scan point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ScanStatus {
    /// Point processed successfully.
    Ok,
    /// Point failed; carries the error reason code.
    Failed(String),
}

/// One row of the significance scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Hypothesized resonance mass.
    pub mass: f64,
    /// Signal cross section assumed at this mass point (pb).
    pub signal_xsec: f64,
    /// One-sided Gaussian significance Z.
    pub significance: f64,
    /// Propagated Monte Carlo error on Z.
    pub significance_error: f64,
    /// Right-tail p-value under the background-only hypothesis.
    pub p_value: f64,
    /// Monte Carlo counting error on the p-value.
    pub p_value_error: f64,
    /// Row status.
    pub status: ScanStatus,
}

impl ScanPoint {
    /// A successful row.
    pub fn ok(
        mass: f64,
        signal_xsec: f64,
        significance: f64,
        significance_error: f64,
        p_value: f64,
        p_value_error: f64,
    ) -> Self {
        Self {
            mass,
            signal_xsec,
            significance,
            significance_error,
            p_value,
            p_value_error,
            status: ScanStatus::Ok,
        }
    }

    /// A failed row: NaN statistics plus the error's reason code.
    pub fn failed(mass: f64, signal_xsec: f64, reason: &Error) -> Self {
        Self {
            mass,
            signal_xsec,
            significance: f64::NAN,
            significance_error: f64::NAN,
            p_value: f64::NAN,
            p_value_error: f64::NAN,
            status: ScanStatus::Failed(reason.code().to_string()),
        }
    }
}

/// Ordered collection of scan rows, keyed by mass point.
///
/// Appending a row for an existing mass overwrites that row (re-running a
/// point is idempotent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<ScanPoint>,
}

impl ResultTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the row for `point.mass`, keeping rows ordered by mass.
    pub fn upsert(&mut self, point: ScanPoint) {
        match self.rows.iter_mut().find(|r| r.mass == point.mass) {
            Some(row) => *row = point,
            None => {
                self.rows.push(point);
                self.rows.sort_by(|a, b| a.mass.total_cmp(&b.mass));
            }
        }
    }

    /// Rows in mass order.
    pub fn rows(&self) -> &[ScanPoint] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Merge `other` into this table, overwriting rows with matching mass.
    pub fn merge(&mut self, other: ResultTable) {
        for row in other.rows {
            self.upsert(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist(counts: &[f64]) -> Histogram {
        let n = counts.len();
        let mut h = Histogram::with_uniform_bins(n, 0.0, n as f64).unwrap();
        h.counts = counts.to_vec();
        h
    }

    #[test]
    fn rejects_decreasing_edges() {
        let r = Histogram::new(vec![0.0, 2.0, 1.0], vec![1.0, 1.0], vec![0.0, 0.0]);
        assert!(matches!(r, Err(Error::InvalidHistogram(_))));
    }

    #[test]
    fn rejects_bad_variances() {
        let r = Histogram::new(vec![0.0, 1.0, 2.0], vec![1.0, 1.0], vec![1.0, -0.5]);
        assert!(matches!(r, Err(Error::InvalidHistogram(_))));
        let r = Histogram::new(vec![0.0, 1.0, 2.0], vec![1.0, 1.0], vec![1.0, f64::NAN]);
        assert!(matches!(r, Err(Error::InvalidHistogram(_))));
    }

    #[test]
    fn add_requires_same_binning() {
        let mut a = hist(&[1.0, 2.0, 3.0]);
        let b = hist(&[1.0, 1.0]);
        assert!(matches!(a.add(&b), Err(Error::IncompatibleBinning(_))));
    }

    #[test]
    fn scale_squares_variances() {
        let mut h = hist(&[4.0, 6.0]);
        h.sumw2 = vec![4.0, 6.0];
        h.scale(0.5);
        assert_relative_eq!(h.integral(), 5.0);
        assert_relative_eq!(h.sumw2[0], 1.0);
    }

    #[test]
    fn unit_area_rejects_empty() {
        let mut h = hist(&[0.0, 0.0]);
        assert!(matches!(h.unit_area(), Err(Error::InvalidHistogram(_))));
    }

    #[test]
    fn selection_path_layout() {
        let ctx = SelectionContext {
            cut_id: "cut020457101143203100".into(),
            channel: "background_jjbb".into(),
            run: 1,
        };
        assert_eq!(ctx.path(), "/cut020457101143203100/background_jjbb/run_1/mwp_background_jjbb");
    }

    #[test]
    fn result_table_upsert_overwrites_by_mass() {
        let mut table = ResultTable::new();
        let mut row = ScanPoint {
            mass: 400.0,
            signal_xsec: 0.01,
            significance: 1.0,
            significance_error: 0.1,
            p_value: 0.16,
            p_value_error: 0.01,
            status: ScanStatus::Ok,
        };
        table.upsert(row.clone());
        row.mass = 300.0;
        table.upsert(row.clone());
        row.mass = 400.0;
        row.significance = 2.0;
        table.upsert(row);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].mass, 300.0);
        assert_eq!(table.rows()[1].significance, 2.0);
    }
}
