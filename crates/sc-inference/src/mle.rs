//! Extended Poisson likelihood and the free fit of the signal strength.

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};
use crate::toys::ToyDataset;
use sc_core::{Error, Result};
use sc_model::Hypothesis;

// Floors the log argument; bins with a truly zero prediction but observed
// events get a large finite penalty instead of an infinity.
const LOG_FLOOR: f64 = 1e-10;

/// Extended negative log-likelihood of `data` under the hypothesis's
/// components at signal strength `poi` (constant terms dropped).
///
/// Binned: `sum_b nu_b - n_b ln nu_b`. Unbinned: `nu_tot - sum_i ln f(x_i)`
/// with `f` the mixture intensity. Predictions driven negative by a negative
/// `poi` are penalized smoothly so the line search backs off rather than
/// evaluating an undefined likelihood.
pub fn dataset_nll(data: &ToyDataset, hypothesis: &Hypothesis, poi: f64) -> Result<f64> {
    match data {
        ToyDataset::Binned(counts) => {
            let expected = hypothesis.expected_bins_at(poi);
            if counts.len() != expected.len() {
                return Err(Error::IncompatibleBinning(format!(
                    "data has {} bins, model has {}",
                    counts.len(),
                    expected.len()
                )));
            }
            let mut nll = 0.0;
            for (&n, &nu) in counts.iter().zip(expected.iter()) {
                if nu <= 0.0 {
                    nll += 1e6 * (1.0 + nu * nu) + n * -LOG_FLOOR.ln();
                } else {
                    nll += nu - n * nu.ln();
                }
            }
            Ok(nll)
        }
        ToyDataset::Unbinned(values) => {
            let total = hypothesis.total_yield_at(poi);
            let mut nll = if total <= 0.0 { 1e6 * (1.0 + total * total) } else { total };
            for &x in values {
                let f = hypothesis.intensity_at(x, poi);
                nll -= f.max(LOG_FLOOR).ln();
            }
            Ok(nll)
        }
    }
}

struct PoiObjective<'a> {
    data: &'a ToyDataset,
    hypothesis: &'a Hypothesis,
}

impl ObjectiveFunction for PoiObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        dataset_nll(self.data, self.hypothesis, params[0])
    }
}

/// Result of the free fit over the signal strength.
#[derive(Debug, Clone)]
pub struct PoiFit {
    /// Best-fit signal strength.
    pub mu_hat: f64,
    /// NLL at the best fit.
    pub nll: f64,
    /// Whether the optimizer reported convergence.
    pub converged: bool,
    /// Iterations used.
    pub n_iter: u64,
}

/// Fits the signal strength by minimizing the extended NLL.
pub struct MaximumLikelihoodEstimator {
    optimizer: LbfgsbOptimizer,
}

impl MaximumLikelihoodEstimator {
    /// Estimator with the given optimizer configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { optimizer: LbfgsbOptimizer::new(config) }
    }

    /// Free fit of the signal strength inside the hypothesis's POI bounds,
    /// started from the snapshot value.
    pub fn fit_poi(&self, data: &ToyDataset, hypothesis: &Hypothesis) -> Result<PoiFit> {
        let (lo, hi) = hypothesis.poi_bounds();
        let init = hypothesis.poi().clamp(lo, hi);
        let objective = PoiObjective { data, hypothesis };
        let res = self.optimizer.minimize(&objective, &[init], &[(lo, hi)])?;
        Ok(PoiFit {
            mu_hat: res.parameters[0],
            nll: res.fval,
            converged: res.converged,
            n_iter: res.n_iter,
        })
    }
}

impl Default for MaximumLikelihoodEstimator {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sc_core::Histogram;
    use sc_model::{HistogramDensity, ModelBuilder};

    fn density(counts: &[f64], expected_yield: f64) -> HistogramDensity {
        let mut h = Histogram::with_uniform_bins(counts.len(), 0.0, counts.len() as f64).unwrap();
        h.counts = counts.to_vec();
        HistogramDensity::from_histogram(&h, expected_yield).unwrap()
    }

    fn sb() -> sc_model::Hypothesis {
        let signal = density(&[0.0, 10.0, 0.0], 10.0);
        let bg = density(&[1.0, 1.0, 1.0], 30.0);
        ModelBuilder::signal_plus_background(signal, vec![bg], None).unwrap()
    }

    #[test]
    fn binned_nll_matches_hand_computation() {
        let sb = sb();
        let data = ToyDataset::Binned(vec![10.0, 20.0, 10.0]);
        // nu at poi=1: [10, 20, 10]
        let expect: f64 = 10.0 - 10.0 * 10.0f64.ln() + 20.0 - 20.0 * 20.0f64.ln() + 10.0
            - 10.0 * 10.0f64.ln();
        assert_relative_eq!(dataset_nll(&data, &sb, 1.0).unwrap(), expect, epsilon = 1e-12);
    }

    #[test]
    fn unbinned_nll_matches_hand_computation() {
        let sb = sb();
        let data = ToyDataset::Unbinned(vec![0.5, 1.5]);
        // intensity per unit x at poi=1: [10, 20, 10]
        let expect = 40.0 - 10.0f64.ln() - 20.0f64.ln();
        assert_relative_eq!(dataset_nll(&data, &sb, 1.0).unwrap(), expect, epsilon = 1e-12);
    }

    #[test]
    fn bin_count_mismatch_is_rejected() {
        let sb = sb();
        let data = ToyDataset::Binned(vec![1.0, 2.0]);
        assert!(matches!(
            dataset_nll(&data, &sb, 1.0).unwrap_err(),
            Error::IncompatibleBinning(_)
        ));
    }

    #[test]
    fn nll_is_minimal_near_true_poi() {
        let sb = sb();
        let data = ToyDataset::Binned(sb.expected_bins_at(2.0));
        let at_truth = dataset_nll(&data, &sb, 2.0).unwrap();
        for poi in [0.0, 1.0, 3.0, 4.0] {
            assert!(dataset_nll(&data, &sb, poi).unwrap() > at_truth);
        }
    }

    #[test]
    fn free_fit_recovers_injected_strength() {
        let sb = sb();
        let data = ToyDataset::Binned(sb.expected_bins_at(1.7));
        let fit = MaximumLikelihoodEstimator::default().fit_poi(&data, &sb).unwrap();
        assert!(fit.converged);
        assert_relative_eq!(fit.mu_hat, 1.7, epsilon = 1e-3);
    }

    #[test]
    fn deficit_fits_negative_strength() {
        let sb = sb();
        // Fewer events than background-only in the signal bin.
        let data = ToyDataset::Binned(vec![10.0, 5.0, 10.0]);
        let fit = MaximumLikelihoodEstimator::default().fit_poi(&data, &sb).unwrap();
        assert!(fit.converged);
        assert!(fit.mu_hat < 0.0, "mu_hat = {}", fit.mu_hat);
    }
}
