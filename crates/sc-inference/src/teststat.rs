//! One-sided profile likelihood ratio for discovery.

use crate::mle::{dataset_nll, MaximumLikelihoodEstimator};
use crate::optimizer::OptimizerConfig;
use crate::toys::ToyDataset;
use sc_core::{Error, Result};
use sc_model::Hypothesis;

/// One evaluation of the discovery test statistic.
#[derive(Debug, Clone)]
pub struct Q0Evaluation {
    /// The one-sided statistic, `max(0, 2 (nll(0) - nll(mu_hat)))`, forced
    /// to 0 when `mu_hat < 0`.
    pub q0: f64,
    /// Best-fit signal strength from the free fit.
    pub mu_hat: f64,
    /// NLL at the null snapshot.
    pub nll_null: f64,
    /// NLL at the best fit.
    pub nll_hat: f64,
}

/// Evaluates the discovery statistic `q0` on a dataset.
///
/// Larger values mean the data prefer the signal+background alternative
/// over the background-only null more strongly.
pub struct ProfileLikelihoodRatio {
    mle: MaximumLikelihoodEstimator,
}

impl ProfileLikelihoodRatio {
    /// Evaluator with the given optimizer configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { mle: MaximumLikelihoodEstimator::new(config) }
    }

    /// Evaluate `q0` for `data` given the alternative and its null.
    ///
    /// Both hypotheses must share components (the null is derived from the
    /// alternative via [`Hypothesis::null`]); the null's snapshot fixes the
    /// numerator, the free fit inside the alternative's POI bounds fixes
    /// the denominator.
    pub fn evaluate(
        &self,
        data: &ToyDataset,
        sb: &Hypothesis,
        b: &Hypothesis,
    ) -> Result<Q0Evaluation> {
        let nll_null = dataset_nll(data, b, b.poi())?;
        let fit = self.mle.fit_poi(data, sb)?;
        if !fit.converged {
            return Err(Error::OptimizerFailure(format!(
                "free fit did not converge after {} iterations",
                fit.n_iter
            )));
        }

        let q0 = if fit.mu_hat < 0.0 {
            // Deficits carry no discovery evidence.
            0.0
        } else {
            (2.0 * (nll_null - fit.nll)).max(0.0)
        };

        Ok(Q0Evaluation { q0, mu_hat: fit.mu_hat, nll_null, nll_hat: fit.nll })
    }
}

impl Default for ProfileLikelihoodRatio {
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

    fn model() -> (Hypothesis, Hypothesis) {
        let signal = density(&[0.0, 10.0, 0.0], 10.0);
        let bg = density(&[1.0, 1.0, 1.0], 30.0);
        let sb = ModelBuilder::signal_plus_background(signal, vec![bg], None).unwrap();
        let b = sb.null();
        (sb, b)
    }

    #[test]
    fn background_like_data_gives_zero() {
        let (sb, b) = model();
        // Expected counts under the null itself: mu_hat ~ 0, q0 ~ 0.
        let data = ToyDataset::Binned(b.expected_bins());
        let ev = ProfileLikelihoodRatio::default().evaluate(&data, &sb, &b).unwrap();
        assert!(ev.q0 < 1e-6, "q0 = {}", ev.q0);
        assert_relative_eq!(ev.mu_hat, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn deficit_is_floored_to_zero() {
        let (sb, b) = model();
        let data = ToyDataset::Binned(vec![10.0, 4.0, 10.0]);
        let ev = ProfileLikelihoodRatio::default().evaluate(&data, &sb, &b).unwrap();
        assert!(ev.mu_hat < 0.0);
        assert_eq!(ev.q0, 0.0);
    }

    #[test]
    fn excess_grows_with_signal_strength() {
        let (sb, b) = model();
        let plr = ProfileLikelihoodRatio::default();
        let weak = ToyDataset::Binned(sb.expected_bins_at(0.5));
        let strong = ToyDataset::Binned(sb.expected_bins_at(2.0));
        let q_weak = plr.evaluate(&weak, &sb, &b).unwrap().q0;
        let q_strong = plr.evaluate(&strong, &sb, &b).unwrap().q0;
        assert!(q_weak > 0.0);
        assert!(q_strong > q_weak);
    }

    #[test]
    fn asimov_q0_matches_closed_form() {
        let (sb, b) = model();
        // Asimov data at mu = 1: mu_hat = 1 and
        // q0 = 2 * sum_b (nu_b(0) - nu_b(1) + n_b ln(nu_b(1)/nu_b(0))).
        let data = ToyDataset::Binned(sb.expected_bins());
        let nu0 = b.expected_bins();
        let nu1 = sb.expected_bins();
        let expect: f64 = 2.0
            * nu0
                .iter()
                .zip(nu1.iter())
                .map(|(&z, &o)| z - o + o * (o / z).ln())
                .sum::<f64>();
        let ev = ProfileLikelihoodRatio::default().evaluate(&data, &sb, &b).unwrap();
        assert_relative_eq!(ev.mu_hat, 1.0, epsilon = 1e-3);
        assert_relative_eq!(ev.q0, expect, epsilon = 1e-4);
    }

    #[test]
    fn works_on_unbinned_data() {
        let (sb, b) = model();
        // A pile of events at the signal bin center.
        let mut values = vec![0.5, 2.5];
        values.extend(std::iter::repeat(1.5).take(40));
        let data = ToyDataset::Unbinned(values);
        let ev = ProfileLikelihoodRatio::default().evaluate(&data, &sb, &b).unwrap();
        assert!(ev.q0 > 0.0);
        assert!(ev.mu_hat > 0.0);
    }
}
