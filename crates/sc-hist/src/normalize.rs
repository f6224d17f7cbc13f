//! Channel rescaling and combination.
//!
//! The corpus of analyses this engine replaces used several mutually
//! inconsistent background-normalization formulas. Both survivors are
//! exposed here as explicit policies; the caller picks one per call site
//! instead of the engine guessing which is authoritative.

use crate::store::{HistogramStore, BCOMBINED, SNORMED};
use sc_core::{ChannelSpec, Error, Histogram, Result, SelectionContext};
use serde::{Deserialize, Serialize};

/// How per-channel background histograms are combined into `bcombined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinePolicy {
    /// Scale each channel by `xsec * sf * (integral / n_generated)` and sum.
    /// The result is a yield prediction.
    Yield,
    /// Weight each channel by `xsec * sf`, sum, then rescale the sum to
    /// unit area. The result is a probability shape, not a yield.
    Shape,
}

/// Normalization basis for a single signal histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalBasis {
    /// Divide by the histogram's own integral (unit area).
    UnitArea,
    /// Divide by the generated event count; the integral becomes the
    /// selection efficiency.
    PerGenerated,
}

/// Normalizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Luminosity scale factor applied to every cross section.
    pub scale_factor: f64,
    /// Background combination policy.
    pub policy: CombinePolicy,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        // 1e3 converts pb cross sections to an fb-scale luminosity.
        Self { scale_factor: 1000.0, policy: CombinePolicy::Yield }
    }
}

/// Rescales and combines per-channel histograms into fit-ready shapes.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Normalizer with the given configuration.
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Access the configuration.
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    fn check_channel(&self, spec: &ChannelSpec) -> Result<()> {
        if spec.n_generated == 0 {
            return Err(Error::ConfigurationError(format!(
                "channel {}: generated event count is 0",
                spec.name
            )));
        }
        if !spec.xsec_pb.is_finite() || spec.xsec_pb < 0.0 {
            return Err(Error::ConfigurationError(format!(
                "channel {}: invalid cross section {}",
                spec.name, spec.xsec_pb
            )));
        }
        Ok(())
    }

    /// Combine the background channels for `cut_id`/`run` into `bcombined`.
    ///
    /// The scaled per-channel histograms are written back to the store root
    /// as `bg_<channel>`, and the combination as `/bcombined` (overwriting
    /// prior values). Returns the combined histogram.
    pub fn combine_backgrounds(
        &self,
        store: &mut HistogramStore,
        cut_id: &str,
        run: u32,
        channels: &[ChannelSpec],
    ) -> Result<Histogram> {
        if channels.is_empty() {
            return Err(Error::ConfigurationError("no background channels declared".into()));
        }

        let mut combined: Option<Histogram> = None;
        let mut scaled_channels: Vec<(String, Histogram)> = Vec::with_capacity(channels.len());

        for spec in channels {
            self.check_channel(spec)?;
            let ctx = SelectionContext {
                cut_id: cut_id.to_string(),
                channel: spec.name.clone(),
                run,
            };
            let mut scaled = store.get(&ctx)?.clone();

            let weight = spec.xsec_pb * self.config.scale_factor;
            let factor = match self.config.policy {
                CombinePolicy::Yield => {
                    weight * (scaled.integral() / spec.n_generated as f64)
                }
                CombinePolicy::Shape => weight,
            };
            scaled.scale(factor);

            match combined.as_mut() {
                Some(sum) => sum.add(&scaled)?,
                None => combined = Some(scaled.clone()),
            }
            scaled_channels.push((format!("/bg_{}", spec.name), scaled));
        }

        // channels is non-empty, so combined is always set here
        let mut combined = combined.ok_or_else(|| {
            Error::ConfigurationError("no background channels declared".into())
        })?;

        if self.config.policy == CombinePolicy::Shape {
            combined.unit_area()?;
        }

        for (path, hist) in scaled_channels {
            store.put(&path, hist);
        }
        tracing::info!(
            policy = ?self.config.policy,
            n_channels = channels.len(),
            integral = combined.integral(),
            "combined backgrounds"
        );
        store.put(BCOMBINED, combined.clone());
        Ok(combined)
    }

    /// Normalize a single signal histogram and write it as `snormed`.
    ///
    /// `UnitArea` divides by the histogram's own integral; `PerGenerated`
    /// divides by `n_generated`, leaving the selection efficiency as the
    /// integral.
    pub fn normalize_signal(
        &self,
        store: &mut HistogramStore,
        ctx: &SelectionContext,
        n_generated: u64,
        basis: SignalBasis,
    ) -> Result<Histogram> {
        let mut hist = store.get(ctx)?.clone();
        match basis {
            SignalBasis::UnitArea => hist.unit_area()?,
            SignalBasis::PerGenerated => {
                if n_generated == 0 {
                    return Err(Error::ConfigurationError(format!(
                        "signal channel {}: generated event count is 0",
                        ctx.channel
                    )));
                }
                hist.scale(1.0 / n_generated as f64);
            }
        }
        store.put(SNORMED, hist.clone());
        Ok(hist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn put_channel(store: &mut HistogramStore, cut: &str, name: &str, counts: &[f64]) {
        let mut h = Histogram::with_uniform_bins(counts.len(), 0.0, 100.0).unwrap();
        h.counts = counts.to_vec();
        let ctx =
            SelectionContext { cut_id: cut.into(), channel: name.into(), run: 1 };
        store.put(&ctx.path(), h);
    }

    fn channels() -> Vec<ChannelSpec> {
        vec![
            ChannelSpec { name: "bg_a".into(), xsec_pb: 2.0, n_generated: 100 },
            ChannelSpec { name: "bg_b".into(), xsec_pb: 0.5, n_generated: 100 },
        ]
    }

    #[test]
    fn yield_policy_scales_by_self_integral() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "bg_a", &[10.0, 10.0]); // integral 20
        put_channel(&mut store, "cut", "bg_b", &[30.0, 10.0]); // integral 40

        let norm = Normalizer::new(NormalizerConfig {
            scale_factor: 1.0,
            policy: CombinePolicy::Yield,
        });
        let combined = norm.combine_backgrounds(&mut store, "cut", 1, &channels()).unwrap();

        // a: 2.0 * (20/100) = 0.4 per unit content -> integral 8
        // b: 0.5 * (40/100) = 0.2 per unit content -> integral 8
        assert_relative_eq!(combined.integral(), 16.0, epsilon = 1e-12);
        assert!(store.contains(BCOMBINED));
        assert!(store.contains("/bg_bg_a"));
    }

    #[test]
    fn shape_policy_unit_area_and_prescale_integral() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "bg_a", &[10.0, 10.0]);
        put_channel(&mut store, "cut", "bg_b", &[30.0, 10.0]);

        let sf = 3.0;
        let norm = Normalizer::new(NormalizerConfig {
            scale_factor: sf,
            policy: CombinePolicy::Shape,
        });
        let combined = norm.combine_backgrounds(&mut store, "cut", 1, &channels()).unwrap();
        assert_relative_eq!(combined.integral(), 1.0, epsilon = 1e-12);

        // Before the final unity rescale the integral is
        // sum(channel.integral * xsec * sf); recover it from the stored
        // weighted per-channel histograms.
        let prescale: f64 = ["/bg_bg_a", "/bg_bg_b"]
            .iter()
            .map(|p| store.get_path(p).unwrap().integral())
            .sum();
        let expected = 20.0 * 2.0 * sf + 40.0 * 0.5 * sf;
        assert_relative_eq!(prescale, expected, epsilon = 1e-9);
    }

    #[test]
    fn unit_area_normalization_is_idempotent() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "signal", &[1.0, 3.0, 6.0]);
        let ctx =
            SelectionContext { cut_id: "cut".into(), channel: "signal".into(), run: 1 };

        let norm = Normalizer::default();
        let once = norm
            .normalize_signal(&mut store, &ctx, 0, SignalBasis::UnitArea)
            .unwrap();
        assert_relative_eq!(once.integral(), 1.0, epsilon = 1e-12);

        // Re-normalizing the already unit-area result must not move the bins.
        store.put(&ctx.path(), once.clone());
        let twice = norm
            .normalize_signal(&mut store, &ctx, 0, SignalBasis::UnitArea)
            .unwrap();
        for (a, b) in once.counts.iter().zip(twice.counts.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-14);
        }
    }

    #[test]
    fn per_generated_basis_keeps_efficiency() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "signal", &[5.0, 15.0]); // 20 selected
        let ctx =
            SelectionContext { cut_id: "cut".into(), channel: "signal".into(), run: 1 };

        let norm = Normalizer::default();
        let snormed = norm
            .normalize_signal(&mut store, &ctx, 200, SignalBasis::PerGenerated)
            .unwrap();
        assert_relative_eq!(snormed.integral(), 0.1, epsilon = 1e-12);
        assert!(store.contains(SNORMED));
    }

    #[test]
    fn empty_signal_is_invalid_for_unit_area() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "signal", &[0.0, 0.0]);
        let ctx =
            SelectionContext { cut_id: "cut".into(), channel: "signal".into(), run: 1 };
        let err = Normalizer::default()
            .normalize_signal(&mut store, &ctx, 0, SignalBasis::UnitArea)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHistogram(_)));
    }

    #[test]
    fn mismatched_binning_aborts_combination() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "bg_a", &[10.0, 10.0]);
        put_channel(&mut store, "cut", "bg_b", &[30.0, 10.0, 5.0]);

        let err = Normalizer::default()
            .combine_backgrounds(&mut store, "cut", 1, &channels())
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleBinning(_)));
    }

    #[test]
    fn zero_generated_count_is_a_configuration_error() {
        let mut store = HistogramStore::new();
        put_channel(&mut store, "cut", "bg_a", &[1.0]);
        let bad = vec![ChannelSpec { name: "bg_a".into(), xsec_pb: 1.0, n_generated: 0 }];
        let err = Normalizer::default()
            .combine_backgrounds(&mut store, "cut", 1, &bad)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }
}
