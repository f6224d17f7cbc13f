//! Toy-based frequentist hypothesis test calculator.
//!
//! Builds the null distribution of the discovery statistic from Poisson
//! pseudo-experiments and converts the observed right-tail fraction into a
//! p-value and a Gaussian significance, each with a Monte Carlo error.
//!
//! Determinism: toy `i` of the null ensemble is seeded with
//! `seed.wrapping_add(i)`, so results are bit-identical across runs, thread
//! counts, and batch sizes for a fixed configuration.

use crate::optimizer::OptimizerConfig;
use crate::teststat::{ProfileLikelihoodRatio, Q0Evaluation};
use crate::toys::{ToyDataset, ToyGenerator};
use rayon::prelude::*;
use sc_core::{Error, Result};
use sc_model::Hypothesis;
use statrs::function::erf;
use std::f64::consts::{PI, SQRT_2};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Alt-ensemble seeds live far away from the null ensemble's.
const ALT_SEED_OFFSET: u64 = 1_000_000_000;

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erf::erfc(-x / SQRT_2)
}

/// Standard normal density.
fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Gaussian significance for a right-tail p-value, `Z = Phi^-1(1 - p)`.
pub fn significance_from_p(p: f64) -> f64 {
    SQRT_2 * erf::erfc_inv(2.0 * p)
}

/// Lifecycle of a calculator; each run walks it forward and finishes in
/// [`CalculatorStage::Done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorStage {
    /// Configured, nothing computed yet.
    Configured,
    /// Evaluating the observed test statistic.
    ObservedFit,
    /// Generating and fitting the null toy ensemble.
    NullEnsemble,
    /// Generating and fitting the signal+background toy ensemble.
    AltEnsemble,
    /// Turning tail counts into p-value and significance.
    Aggregating,
    /// Finished.
    Done,
}

/// Configuration for [`FrequentistCalculator`].
#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    /// Null-hypothesis toys used for the p-value.
    pub n_toys_null: usize,
    /// Signal+background toys for the expected band; 0 disables the band.
    pub n_toys_alt: usize,
    /// Toys generated and fitted per batch. Purely a scheduling knob: the
    /// per-toy seeding makes results independent of it.
    pub batch_size: usize,
    /// Base seed for the toy ensembles.
    pub seed: u64,
    /// Generate binned (per-bin Poisson) or unbinned toys.
    pub binned: bool,
    /// Force every toy to this event count instead of fluctuating it.
    pub toy_event_count: Option<u64>,
    /// Wall-clock budget; checked between batches, so at least one batch
    /// always completes.
    pub deadline: Option<Duration>,
    /// Optimizer settings for every fit.
    pub optimizer: OptimizerConfig,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            n_toys_null: 5000,
            n_toys_alt: 0,
            batch_size: 1250,
            seed: 0,
            binned: true,
            toy_event_count: None,
            deadline: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Expected-significance band from the signal+background ensemble.
#[derive(Debug, Clone)]
pub struct ExpectedBand {
    /// Band positions in Gaussian sigmas, `[+2, +1, 0, -1, -2]`.
    pub n_sigma: [f64; 5],
    /// Significance at each band position.
    pub significance: [f64; 5],
}

/// Outcome of one hypothesis test.
#[derive(Debug, Clone)]
pub struct HypoTestSummary {
    /// Observed value of the discovery statistic.
    pub q0_obs: f64,
    /// Best-fit signal strength on the observed data.
    pub mu_hat_obs: f64,
    /// Right-tail p-value of `q0_obs` under the null ensemble.
    pub p_value: f64,
    /// Binomial Monte Carlo error on the p-value.
    pub p_value_error: f64,
    /// Gaussian significance.
    pub significance: f64,
    /// Error on the significance, propagated from the p-value error.
    pub significance_error: f64,
    /// Null toys that produced a valid statistic.
    pub n_toys_used: usize,
    /// Toys dropped because generation or fitting failed.
    pub n_toy_errors: usize,
    /// Whether the deadline cut the ensembles short.
    pub stopped_early: bool,
    /// Expected band, when an alt ensemble was requested.
    pub expected: Option<ExpectedBand>,
}

/// Toy-based frequentist calculator for the discovery test.
pub struct FrequentistCalculator {
    config: CalculatorConfig,
    plr: ProfileLikelihoodRatio,
    stage: CalculatorStage,
}

impl FrequentistCalculator {
    /// Calculator with the given configuration.
    pub fn new(config: CalculatorConfig) -> Self {
        let plr = ProfileLikelihoodRatio::new(config.optimizer.clone());
        Self { config, plr, stage: CalculatorStage::Configured }
    }

    /// Current lifecycle stage.
    pub fn stage(&self) -> CalculatorStage {
        self.stage
    }

    fn set_stage(&mut self, stage: CalculatorStage) {
        debug!(from = ?self.stage, to = ?stage, "calculator stage");
        self.stage = stage;
    }

    /// Run the full test: observed fit, null ensemble, optional alt
    /// ensemble, aggregation.
    ///
    /// `b` must be derived from `sb` via [`Hypothesis::null`] so the two
    /// hypotheses share components. Fails with
    /// [`Error::SaturatedPValue`] when the observed statistic falls outside
    /// the resolved range of the null ensemble (tail count 0 or full).
    pub fn run(
        &mut self,
        sb: &Hypothesis,
        b: &Hypothesis,
        observed: &ToyDataset,
    ) -> Result<HypoTestSummary> {
        if self.config.n_toys_null == 0 || self.config.batch_size == 0 {
            return Err(Error::ConfigurationError(
                "n_toys_null and batch_size must be positive".into(),
            ));
        }
        let started = Instant::now();
        let deadline_at = self.config.deadline.map(|d| started + d);

        self.set_stage(CalculatorStage::ObservedFit);
        let Q0Evaluation { q0, mu_hat, .. } = self.plr.evaluate(observed, sb, b)?;
        info!(q0_obs = q0, mu_hat = mu_hat, "observed test statistic");

        self.set_stage(CalculatorStage::NullEnsemble);
        let null = self.toy_ensemble(b, sb, b, self.config.n_toys_null, self.config.seed, deadline_at)?;

        let alt = if self.config.n_toys_alt > 0 {
            self.set_stage(CalculatorStage::AltEnsemble);
            let seed = self.config.seed.wrapping_add(ALT_SEED_OFFSET);
            Some(self.toy_ensemble(sb, sb, b, self.config.n_toys_alt, seed, deadline_at)?)
        } else {
            None
        };

        self.set_stage(CalculatorStage::Aggregating);
        let n_valid = null.q0s.len();
        if n_valid == 0 {
            return Err(Error::Validation("no null toy produced a valid test statistic".into()));
        }
        let tail = null.q0s.iter().filter(|&&q| q >= q0).count();
        if tail == 0 || tail == n_valid {
            return Err(Error::SaturatedPValue { tail, n_toys: n_valid });
        }
        let n = n_valid as f64;
        let p = tail as f64 / n;
        let p_err = (p * (1.0 - p) / n).sqrt();
        let z = significance_from_p(p);
        let z_err = p_err / normal_pdf(z);

        let expected = alt.as_ref().map(|alt| expected_band(&null.q0s, &alt.q0s));

        let n_toy_errors = null.n_errors + alt.as_ref().map_or(0, |a| a.n_errors);
        let stopped_early = null.stopped_early || alt.as_ref().is_some_and(|a| a.stopped_early);
        info!(
            p_value = p,
            significance = z,
            n_toys_used = n_valid,
            n_toy_errors,
            elapsed_s = started.elapsed().as_secs_f64(),
            "hypothesis test complete"
        );

        self.set_stage(CalculatorStage::Done);
        Ok(HypoTestSummary {
            q0_obs: q0,
            mu_hat_obs: mu_hat,
            p_value: p,
            p_value_error: p_err,
            significance: z,
            significance_error: z_err,
            n_toys_used: n_valid,
            n_toy_errors,
            stopped_early,
            expected,
        })
    }

    fn toy_ensemble(
        &self,
        gen_hyp: &Hypothesis,
        sb: &Hypothesis,
        b: &Hypothesis,
        n_toys: usize,
        seed_base: u64,
        deadline_at: Option<Instant>,
    ) -> Result<Ensemble> {
        let generator =
            if self.config.binned { ToyGenerator::binned() } else { ToyGenerator::unbinned() };
        let mut q0s = Vec::with_capacity(n_toys);
        let mut n_errors = 0usize;
        let mut stopped_early = false;

        let mut next = 0usize;
        while next < n_toys {
            let end = (next + self.config.batch_size).min(n_toys);
            let batch: Vec<Result<f64>> = (next..end)
                .into_par_iter()
                .with_min_len(16)
                .map(|i| {
                    let seed = seed_base.wrapping_add(i as u64);
                    let toy = generator.generate(gen_hyp, self.config.toy_event_count, seed)?;
                    Ok(self.plr.evaluate(&toy, sb, b)?.q0)
                })
                .collect();
            for r in batch {
                match r {
                    Ok(q) => q0s.push(q),
                    Err(e) => {
                        n_errors += 1;
                        debug!(error = %e, "toy dropped");
                    }
                }
            }
            next = end;

            if let Some(at) = deadline_at {
                if Instant::now() >= at && next < n_toys {
                    warn!(done = next, requested = n_toys, "deadline reached, ensemble truncated");
                    stopped_early = true;
                    break;
                }
            }
        }

        if n_errors > 0 {
            warn!(n_errors, n_toys = q0s.len(), "some toys failed and were dropped");
        }
        Ok(Ensemble { q0s, n_errors, stopped_early })
    }
}

struct Ensemble {
    q0s: Vec<f64>,
    n_errors: usize,
    stopped_early: bool,
}

// Maps quantiles of the alt ensemble through the null ensemble's tail.
// Tail probabilities are add-one smoothed so the band stays finite even when
// an alt quantile exceeds every null toy.
fn expected_band(null_q0s: &[f64], alt_q0s: &[f64]) -> ExpectedBand {
    let n_sigma = [2.0, 1.0, 0.0, -1.0, -2.0];
    let mut alt_sorted = alt_q0s.to_vec();
    alt_sorted.sort_by(|a, b| a.total_cmp(b));

    let mut significance = [f64::NAN; 5];
    for (i, ns) in n_sigma.iter().enumerate() {
        if alt_sorted.is_empty() {
            continue;
        }
        let prob = normal_cdf(*ns);
        let idx = ((alt_sorted.len() - 1) as f64 * prob).round() as usize;
        let threshold = alt_sorted[idx];
        let tail = null_q0s.iter().filter(|&&q| q >= threshold).count();
        let p = (tail + 1) as f64 / (null_q0s.len() + 2) as f64;
        significance[i] = significance_from_p(p);
    }
    ExpectedBand { n_sigma, significance }
}
