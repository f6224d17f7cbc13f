//! Toy dataset generation (Poisson pseudo-experiments + Asimov).
//!
//! Sampling is deterministic: a dataset is a pure function of
//! `(hypothesis snapshot, event count, seed)`. Ensemble code derives
//! per-toy seeds as `seed + toy_idx`, independent of threading.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use sc_core::{Error, Result};
use sc_model::Hypothesis;

/// A pseudo-dataset generated under one hypothesis snapshot, consumed by
/// exactly one test-statistic evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToyDataset {
    /// Per-bin observed counts over the hypothesis's bin edges.
    Binned(Vec<f64>),
    /// Individual observed values of the observable.
    Unbinned(Vec<f64>),
}

impl ToyDataset {
    /// Total observed event count.
    pub fn n_events(&self) -> f64 {
        match self {
            ToyDataset::Binned(counts) => counts.iter().sum(),
            ToyDataset::Unbinned(values) => values.len() as f64,
        }
    }
}

/// Draws pseudo-datasets from a hypothesis.
#[derive(Debug, Clone, Copy)]
pub struct ToyGenerator {
    binned: bool,
}

impl ToyGenerator {
    /// Generator producing per-bin Poisson counts.
    pub fn binned() -> Self {
        Self { binned: true }
    }

    /// Generator producing individual values via inverse-CDF sampling.
    pub fn unbinned() -> Self {
        Self { binned: false }
    }

    /// Whether this generator produces binned datasets.
    pub fn is_binned(&self) -> bool {
        self.binned
    }

    /// The Asimov dataset: per-bin counts equal to their expectation at the
    /// hypothesis snapshot, with no fluctuation.
    pub fn asimov(hypothesis: &Hypothesis) -> ToyDataset {
        ToyDataset::Binned(hypothesis.expected_bins())
    }

    /// Generate one toy dataset under the hypothesis snapshot.
    ///
    /// Binned mode draws a Poisson count per bin with mean equal to the
    /// expected yield in that bin; when `n_events` is given, expectations
    /// are rescaled so their sum equals it. Unbinned mode draws `n_events`
    /// values (defaulting to the total expected yield, rounded) through the
    /// mixture's inverse CDF.
    pub fn generate(
        &self,
        hypothesis: &Hypothesis,
        n_events: Option<u64>,
        seed: u64,
    ) -> Result<ToyDataset> {
        let mut rng = StdRng::seed_from_u64(seed);
        if self.binned {
            let mut expected = hypothesis.expected_bins();
            if let Some(n) = n_events {
                let total: f64 = expected.iter().sum();
                if !(total > 0.0) {
                    return Err(Error::InvalidHistogram(format!(
                        "cannot rescale expectations with total yield {total}"
                    )));
                }
                let factor = n as f64 / total;
                for nu in &mut expected {
                    *nu *= factor;
                }
            }
            let counts = expected
                .iter()
                .map(|&lam| {
                    if !lam.is_finite() || lam <= 0.0 {
                        // Poisson(0) is deterministically 0; negative or
                        // non-finite expectations are treated the same way.
                        return 0.0;
                    }
                    let pois = Poisson::new(lam).expect("Poisson::new(lambda>0)");
                    pois.sample(&mut rng)
                })
                .collect();
            Ok(ToyDataset::Binned(counts))
        } else {
            let count = match n_events {
                Some(n) => n,
                None => {
                    let total = hypothesis.total_yield();
                    if !(total > 0.0) {
                        return Err(Error::InvalidHistogram(format!(
                            "cannot default event count from total yield {total}"
                        )));
                    }
                    total.round() as u64
                }
            };
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let u: f64 = rng.gen();
                values.push(hypothesis.quantile(u)?);
            }
            Ok(ToyDataset::Unbinned(values))
        }
    }
}
