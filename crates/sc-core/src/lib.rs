//! # sc-core
//!
//! Shared building blocks for the sigscan workspace: the error taxonomy
//! and the data model (histograms, selection keys, channel configuration,
//! scan rows).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ChannelSpec, Histogram, ResultTable, ScanPoint, ScanStatus, SelectionContext,
};
