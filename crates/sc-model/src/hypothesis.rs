//! Nested signal+background hypotheses.
//!
//! A hypothesis is a yield-weighted mixture of histogram densities with a
//! single parameter of interest (the signal strength) and a snapshot value
//! for it. The background-only null shares the *same* component list as
//! the alternative and differs only in its snapshot; nesting is exact by
//! construction, never the result of copying and zeroing a live model.

use crate::density::HistogramDensity;
use sc_core::{Error, Result};
use std::sync::Arc;

/// Default POI bounds for the free fit. The lower bound is negative so a
/// data deficit produces `mu_hat < 0` and the one-sided floor can engage.
pub const DEFAULT_POI_BOUNDS: (f64, f64) = (-10.0, 50.0);

/// The immutable component list shared by an alternative hypothesis and
/// its derived null.
#[derive(Debug)]
pub struct ModelComponents {
    signal: HistogramDensity,
    backgrounds: Vec<HistogramDensity>,
    poi_bounds: (f64, f64),
}

impl ModelComponents {
    /// Total background yield.
    pub fn background_yield(&self) -> f64 {
        self.backgrounds.iter().map(|b| b.expected_yield()).sum()
    }
}

/// A mixture pdf with a fixed parameter-of-interest snapshot.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    components: Arc<ModelComponents>,
    poi: f64,
}

/// Builds hypotheses from histogram densities.
pub struct ModelBuilder;

impl ModelBuilder {
    /// Build the signal+background hypothesis with snapshot `poi = 1`.
    ///
    /// The signal density's yield is the expected signal count at unit
    /// signal strength; `poi` scales it. All component binnings must match.
    pub fn signal_plus_background(
        signal: HistogramDensity,
        backgrounds: Vec<HistogramDensity>,
        poi_bounds: Option<(f64, f64)>,
    ) -> Result<Hypothesis> {
        if backgrounds.is_empty() {
            return Err(Error::ConfigurationError(
                "hypothesis requires at least one background component".into(),
            ));
        }
        for bg in &backgrounds {
            if !signal.same_binning(bg) {
                return Err(Error::IncompatibleBinning(
                    "signal and background components must share bin edges".into(),
                ));
            }
        }
        let poi_bounds = poi_bounds.unwrap_or(DEFAULT_POI_BOUNDS);
        if !(poi_bounds.0 < poi_bounds.1) {
            return Err(Error::ConfigurationError(format!(
                "invalid POI bounds ({}, {})",
                poi_bounds.0, poi_bounds.1
            )));
        }
        Ok(Hypothesis {
            components: Arc::new(ModelComponents { signal, backgrounds, poi_bounds }),
            poi: 1.0,
        })
    }
}

impl Hypothesis {
    /// The snapshot value of the parameter of interest.
    pub fn poi(&self) -> f64 {
        self.poi
    }

    /// Box bounds for the free POI fit.
    pub fn poi_bounds(&self) -> (f64, f64) {
        self.components.poi_bounds
    }

    /// A hypothesis over the same components with a different snapshot.
    pub fn with_poi(&self, poi: f64) -> Hypothesis {
        Hypothesis { components: Arc::clone(&self.components), poi }
    }

    /// The background-only null: same components, snapshot fixed to 0.
    pub fn null(&self) -> Hypothesis {
        self.with_poi(0.0)
    }

    /// Number of bins of the shared observable axis.
    pub fn n_bins(&self) -> usize {
        self.components.signal.n_bins()
    }

    /// Shared bin edges.
    pub fn edges(&self) -> &[f64] {
        self.components.signal.edges()
    }

    /// Observable support.
    pub fn support(&self) -> (f64, f64) {
        self.components.signal.support()
    }

    /// Total expected yield at signal strength `poi`.
    pub fn total_yield_at(&self, poi: f64) -> f64 {
        poi * self.components.signal.expected_yield() + self.components.background_yield()
    }

    /// Total expected yield at the snapshot.
    pub fn total_yield(&self) -> f64 {
        self.total_yield_at(self.poi)
    }

    /// Unnormalized mixture intensity at `x` for signal strength `poi`
    /// (events per unit observable).
    pub fn intensity_at(&self, x: f64, poi: f64) -> f64 {
        let c = &self.components;
        let mut v = poi * c.signal.expected_yield() * c.signal.pdf(x);
        for bg in &c.backgrounds {
            v += bg.expected_yield() * bg.pdf(x);
        }
        v
    }

    /// Normalized mixture density at `x` for signal strength `poi`
    /// (0 when the total yield is not positive).
    pub fn pdf_at(&self, x: f64, poi: f64) -> f64 {
        let total = self.total_yield_at(poi);
        if !(total > 0.0) {
            return 0.0;
        }
        self.intensity_at(x, poi) / total
    }

    /// Normalized mixture density at `x` at the snapshot.
    pub fn pdf(&self, x: f64) -> f64 {
        self.pdf_at(x, self.poi)
    }

    /// Expected event count per bin for signal strength `poi`.
    pub fn expected_bins_at(&self, poi: f64) -> Vec<f64> {
        let c = &self.components;
        let s_yield = poi * c.signal.expected_yield();
        (0..self.n_bins())
            .map(|i| {
                let mut nu = s_yield * c.signal.bin_prob(i);
                for bg in &c.backgrounds {
                    nu += bg.expected_yield() * bg.bin_prob(i);
                }
                nu
            })
            .collect()
    }

    /// Expected event count per bin at the snapshot.
    pub fn expected_bins(&self) -> Vec<f64> {
        self.expected_bins_at(self.poi)
    }

    /// Inverse-CDF transform of `u ∈ [0, 1)` through the snapshot mixture.
    ///
    /// Fails `InvalidHistogram` when the snapshot yield is not positive
    /// (there is no density to sample).
    pub fn quantile(&self, u: f64) -> Result<f64> {
        let expected = self.expected_bins();
        let total: f64 = expected.iter().sum();
        if !(total > 0.0) {
            return Err(Error::InvalidHistogram(format!(
                "cannot sample hypothesis with total yield {total}"
            )));
        }
        let u = u.clamp(0.0, 1.0);
        let target = u * total;
        let edges = self.edges();
        let mut acc = 0.0;
        for (i, nu) in expected.iter().enumerate() {
            if acc + nu >= target && *nu > 0.0 {
                let frac = ((target - acc) / nu).clamp(0.0, 1.0);
                return Ok(edges[i] + frac * (edges[i + 1] - edges[i]));
            }
            acc += nu;
        }
        Ok(edges[edges.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sc_core::Histogram;

    fn density(counts: &[f64], expected_yield: f64) -> HistogramDensity {
        let mut h = Histogram::with_uniform_bins(counts.len(), 0.0, counts.len() as f64).unwrap();
        h.counts = counts.to_vec();
        HistogramDensity::from_histogram(&h, expected_yield).unwrap()
    }

    fn sb() -> Hypothesis {
        let signal = density(&[0.0, 8.0, 2.0], 5.0);
        let bg1 = density(&[6.0, 3.0, 1.0], 20.0);
        let bg2 = density(&[2.0, 2.0, 2.0], 10.0);
        ModelBuilder::signal_plus_background(signal, vec![bg1, bg2], None).unwrap()
    }

    #[test]
    fn null_shares_components_and_zeroes_poi() {
        let sb = sb();
        let b = sb.null();
        assert_eq!(b.poi(), 0.0);
        assert_eq!(sb.poi(), 1.0);
        assert!(Arc::ptr_eq(&sb.components, &b.components));
    }

    #[test]
    fn nesting_is_exact_pointwise() {
        let sb = sb();
        let b = sb.null();
        for i in 0..=60 {
            let x = 0.05 * i as f64;
            assert_relative_eq!(b.pdf(x), sb.pdf_at(x, 0.0), epsilon = 1e-15);
        }
        let nu_b = b.expected_bins();
        let nu_sb0 = sb.expected_bins_at(0.0);
        assert_eq!(nu_b, nu_sb0);
    }

    #[test]
    fn expected_bins_sum_to_total_yield() {
        let sb = sb();
        let total: f64 = sb.expected_bins().iter().sum();
        assert_relative_eq!(total, sb.total_yield(), epsilon = 1e-12);
        assert_relative_eq!(sb.total_yield(), 35.0, epsilon = 1e-12);
        assert_relative_eq!(sb.null().total_yield(), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn mixture_pdf_is_yield_weighted() {
        let sb = sb();
        // Bin 0: signal contributes nothing, backgrounds 20*0.6 + 10*1/3.
        let nu0 = sb.expected_bins()[0];
        assert_relative_eq!(nu0, 12.0 + 10.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(sb.pdf(0.5), nu0 / 35.0, epsilon = 1e-12);
    }

    #[test]
    fn quantile_covers_support() {
        let sb = sb();
        let (lo, hi) = sb.support();
        assert_relative_eq!(sb.quantile(0.0).unwrap(), lo);
        assert_relative_eq!(sb.quantile(1.0).unwrap(), hi);
        let mid = sb.quantile(0.5).unwrap();
        assert!(mid > lo && mid < hi);
    }

    #[test]
    fn mismatched_binning_is_rejected() {
        let signal = density(&[1.0, 1.0], 1.0);
        let bg = density(&[1.0, 1.0, 1.0], 1.0);
        let err =
            ModelBuilder::signal_plus_background(signal, vec![bg], None).unwrap_err();
        assert!(matches!(err, Error::IncompatibleBinning(_)));
    }
}
