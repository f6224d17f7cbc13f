//! # sc-inference
//!
//! Toy-based frequentist inference for sigscan:
//! - [`ProfileLikelihoodRatio`]: one-sided discovery statistic `q0`
//! - [`FrequentistCalculator`]: null toy ensembles, p-value, significance
//! - [`ScanDriver`]: the full pipeline across a list of mass points
//!
//! All randomness is seeded explicitly; a run is a pure function of its
//! configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frequentist;
pub mod mle;
pub mod optimizer;
pub mod scan;
pub mod teststat;
pub mod toys;

pub use frequentist::{
    normal_cdf, significance_from_p, CalculatorConfig, CalculatorStage, ExpectedBand,
    FrequentistCalculator, HypoTestSummary,
};
pub use mle::{dataset_nll, MaximumLikelihoodEstimator, PoiFit};
pub use optimizer::{
    LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig,
};
pub use scan::{ScanConfig, ScanDriver, ScanPointSpec};
pub use teststat::{ProfileLikelihoodRatio, Q0Evaluation};
pub use toys::{ToyDataset, ToyGenerator};
