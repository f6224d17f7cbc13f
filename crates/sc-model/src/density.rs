//! Piecewise-constant densities derived from histograms.

use sc_core::{Error, Histogram, Result};

/// A unit-area piecewise-constant density over a histogram's bin edges,
/// with the expected event count (yield) kept as a separate scalar.
#[derive(Debug, Clone)]
pub struct HistogramDensity {
    edges: Vec<f64>,
    /// Per-bin probability mass (sums to 1).
    probs: Vec<f64>,
    /// Density value inside each bin (`probs[i] / width[i]`).
    heights: Vec<f64>,
    /// Cumulative probability at each bin's upper edge.
    cdf: Vec<f64>,
    yield_: f64,
}

impl HistogramDensity {
    /// Build a density from a histogram, normalizing to unit area and
    /// recording `expected_yield` separately.
    ///
    /// Fails `InvalidHistogram` on a non-positive integral or negative bin
    /// contents.
    pub fn from_histogram(hist: &Histogram, expected_yield: f64) -> Result<Self> {
        let integral = hist.integral();
        if !(integral > 0.0) || !integral.is_finite() {
            return Err(Error::InvalidHistogram(format!(
                "density requires a positive integral, got {integral}"
            )));
        }
        if hist.counts.iter().any(|&c| c < 0.0) {
            return Err(Error::InvalidHistogram(
                "density requires non-negative bin contents".into(),
            ));
        }
        if !expected_yield.is_finite() || expected_yield < 0.0 {
            return Err(Error::InvalidHistogram(format!(
                "invalid expected yield {expected_yield}"
            )));
        }

        let probs: Vec<f64> = hist.counts.iter().map(|c| c / integral).collect();
        let heights: Vec<f64> = probs
            .iter()
            .zip(hist.edges.windows(2))
            .map(|(p, w)| p / (w[1] - w[0]))
            .collect();
        let mut acc = 0.0;
        let cdf: Vec<f64> = probs
            .iter()
            .map(|p| {
                acc += p;
                acc
            })
            .collect();

        Ok(Self { edges: hist.edges.clone(), probs, heights, cdf, yield_: expected_yield })
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.probs.len()
    }

    /// Bin edges (length = n_bins + 1).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Observable support `(low, high)`.
    pub fn support(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    /// Expected event count associated with this density.
    pub fn expected_yield(&self) -> f64 {
        self.yield_
    }

    /// Probability mass of bin `i`.
    pub fn bin_prob(&self, i: usize) -> f64 {
        self.probs[i]
    }

    /// Whether `other` is defined over the same bin edges.
    pub fn same_binning(&self, other: &HistogramDensity) -> bool {
        self.edges.len() == other.edges.len()
            && self.edges.iter().zip(other.edges.iter()).all(|(a, b)| {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= 1e-9 * scale
            })
    }

    /// Density value at `x` (0 outside the support).
    pub fn pdf(&self, x: f64) -> f64 {
        match self.bin_index(x) {
            Some(i) => self.heights[i],
            None => 0.0,
        }
    }

    /// Index of the bin containing `x`; the upper support edge belongs to
    /// the last bin.
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        let (lo, hi) = self.support();
        if x < lo || x > hi {
            return None;
        }
        if x == hi {
            return Some(self.n_bins() - 1);
        }
        // partition_point: first edge strictly greater than x
        let idx = self.edges.partition_point(|&e| e <= x);
        Some(idx - 1)
    }

    /// Inverse-CDF transform of `u ∈ [0, 1)` into an observable value.
    pub fn quantile(&self, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        let bin = self.cdf.partition_point(|&c| c < u).min(self.n_bins() - 1);
        let cdf_lo = if bin == 0 { 0.0 } else { self.cdf[bin - 1] };
        let mass = self.probs[bin];
        let frac = if mass > 0.0 { (u - cdf_lo) / mass } else { 0.0 };
        let lo = self.edges[bin];
        let hi = self.edges[bin + 1];
        lo + frac.clamp(0.0, 1.0) * (hi - lo)
    }
}
