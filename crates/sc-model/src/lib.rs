//! # sc-model
//!
//! Density models and hypothesis construction for sigscan:
//! - [`HistogramDensity`]: unit-area piecewise-constant density with a
//!   separate yield scalar
//! - [`Hypothesis`] / [`ModelBuilder`]: nested signal+background and
//!   background-only mixtures sharing one component list.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod density;
pub mod hypothesis;

pub use density::HistogramDensity;
pub use hypothesis::{Hypothesis, ModelBuilder, ModelComponents, DEFAULT_POI_BOUNDS};
