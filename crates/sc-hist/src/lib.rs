//! # sc-hist
//!
//! Histogram repository and normalization for sigscan:
//! - a path-addressed, JSON-backed [`HistogramStore`]
//! - the [`Normalizer`] that rescales and combines per-channel histograms
//!   into the background (`bcombined`) and signal (`snormed`) shapes the
//!   model layer consumes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod normalize;
pub mod store;

pub use normalize::{CombinePolicy, Normalizer, NormalizerConfig, SignalBasis};
pub use store::{HistogramStore, BCOMBINED, SNORMED};
