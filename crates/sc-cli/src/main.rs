//! `sigscan`: normalize histogram stores and run toy-based significance
//! scans from the command line.

mod sink;
mod spec;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sc_core::{ScanStatus, SelectionContext};
use sc_hist::{HistogramStore, Normalizer};
use sc_inference::ScanDriver;
use spec::{NormalizeSpec, ScanSpec};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigscan", version, about = "Toy-based significance scans over histogram stores")]
struct Cli {
    /// Log filter, e.g. `info` or `sc_inference=debug` (RUST_LOG overrides).
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rescale and combine the channels of one histogram store.
    Normalize {
        /// Histogram store file (JSON).
        store: PathBuf,

        /// Normalize job description (JSON).
        #[arg(long)]
        job: PathBuf,

        /// Compute and report, but do not write the store back.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a significance scan over a list of mass points.
    Scan {
        /// Scan job description (JSON).
        job: PathBuf,

        /// Results document (JSON) to write.
        #[arg(long, short)]
        out: PathBuf,

        /// Table name inside the results document.
        #[arg(long, default_value = "scan")]
        table: String,

        /// Upsert rows into an existing table instead of replacing it.
        #[arg(long)]
        merge: bool,

        /// Override the job's null toy count.
        #[arg(long)]
        toys: Option<usize>,

        /// Override the job's batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the job's base seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command {
        Command::Normalize { store, job, dry_run } => cmd_normalize(&store, &job, dry_run),
        Command::Scan { job, out, table, merge, toys, batch_size, seed } => {
            let overrides = Overrides { toys, batch_size, seed };
            cmd_scan(&job, &out, &table, merge, overrides)
        }
    }
}

struct Overrides {
    toys: Option<usize>,
    batch_size: Option<usize>,
    seed: Option<u64>,
}

// Applies a normalize job to an in-memory store; the caller decides
// whether the result is written back.
fn apply_normalize(store: &mut HistogramStore, spec: &NormalizeSpec) -> anyhow::Result<()> {
    let normalizer = Normalizer::new(spec.normalizer.clone());
    let combined =
        normalizer.combine_backgrounds(store, &spec.cut_id, spec.run, &spec.backgrounds)?;
    println!(
        "combined {} background channels, integral {:.6}",
        spec.backgrounds.len(),
        combined.integral()
    );

    if let Some(sig) = &spec.signal {
        for run in sig.runs()? {
            let ctx = SelectionContext {
                cut_id: spec.cut_id.clone(),
                channel: sig.channel.clone(),
                run,
            };
            let snormed =
                normalizer.normalize_signal(store, &ctx, sig.n_generated, sig.basis)?;
            println!(
                "normalized signal {} run {run}, integral {:.6}",
                sig.channel,
                snormed.integral()
            );
        }
    }
    Ok(())
}

fn cmd_normalize(store_path: &PathBuf, job: &PathBuf, dry_run: bool) -> anyhow::Result<()> {
    let spec = NormalizeSpec::load(job)
        .with_context(|| format!("reading normalize job {}", job.display()))?;
    let mut store = HistogramStore::load(store_path)
        .with_context(|| format!("reading histogram store {}", store_path.display()))?;

    apply_normalize(&mut store, &spec)?;

    if dry_run {
        info!("dry run, store not written");
    } else {
        store.save(store_path)
            .with_context(|| format!("writing histogram store {}", store_path.display()))?;
        info!(store = %store_path.display(), "store updated");
    }
    Ok(())
}

fn cmd_scan(
    job: &PathBuf,
    out: &PathBuf,
    table: &str,
    merge: bool,
    overrides: Overrides,
) -> anyhow::Result<()> {
    let spec =
        ScanSpec::load(job).with_context(|| format!("reading scan job {}", job.display()))?;
    if spec.points.is_empty() {
        anyhow::bail!("scan job has no mass points");
    }

    let mut calculator = spec.calculator.to_config();
    if let Some(n) = overrides.toys {
        calculator.n_toys_null = n;
    }
    if let Some(b) = overrides.batch_size {
        calculator.batch_size = b;
    }
    if let Some(s) = overrides.seed {
        calculator.seed = s;
    }

    let driver = ScanDriver::new(spec.scan, calculator);
    let results = driver.scan(&spec.points);

    println!("{:>10} {:>12} {:>9} {:>9} {:>10} {:>10}  status", "mass", "xsec_pb", "Z", "dZ", "p", "dp");
    let mut n_ok = 0usize;
    for row in results.rows() {
        match &row.status {
            ScanStatus::Ok => {
                n_ok += 1;
                println!(
                    "{:>10.1} {:>12.6} {:>9.3} {:>9.3} {:>10.5} {:>10.5}  ok",
                    row.mass,
                    row.signal_xsec,
                    row.significance,
                    row.significance_error,
                    row.p_value,
                    row.p_value_error
                );
            }
            ScanStatus::Failed(reason) => {
                println!(
                    "{:>10.1} {:>12.6} {:>9} {:>9} {:>10} {:>10}  failed: {reason}",
                    row.mass, row.signal_xsec, "-", "-", "-", "-"
                );
            }
        }
    }

    sink::publish_table(out, table, results, merge)
        .with_context(|| format!("writing results to {}", out.display()))?;

    if n_ok == 0 {
        anyhow::bail!("every scan point failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::{ChannelSpec, Histogram};
    use sc_hist::{NormalizerConfig, SignalBasis, BCOMBINED, SNORMED};
    use spec::SignalSpec;

    fn put(store: &mut HistogramStore, channel: &str, run: u32, counts: &[f64]) {
        let mut h = Histogram::with_uniform_bins(counts.len(), 0.0, 100.0).unwrap();
        h.counts = counts.to_vec();
        let ctx = SelectionContext { cut_id: "cut4".into(), channel: channel.into(), run };
        store.put(&ctx.path(), h);
    }

    fn job(run_start: u32, run_end: Option<u32>) -> NormalizeSpec {
        NormalizeSpec {
            cut_id: "cut4".into(),
            run: 1,
            backgrounds: vec![ChannelSpec {
                name: "background_jjjj".into(),
                xsec_pb: 0.04,
                n_generated: 1000,
            }],
            signal: Some(SignalSpec {
                channel: "signal".into(),
                run_start,
                run_end,
                n_generated: 1000,
                basis: SignalBasis::UnitArea,
            }),
            normalizer: NormalizerConfig::default(),
        }
    }

    #[test]
    fn normalize_walks_the_whole_signal_run_range() {
        let mut store = HistogramStore::new();
        put(&mut store, "background_jjjj", 1, &[10.0, 10.0]);
        put(&mut store, "signal", 1, &[4.0, 0.0]);
        put(&mut store, "signal", 2, &[0.0, 4.0]);
        put(&mut store, "signal", 3, &[6.0, 2.0]);

        apply_normalize(&mut store, &job(1, Some(3))).unwrap();
        assert!(store.contains(BCOMBINED));
        // The root slot holds the last run of the range.
        let snormed = store.get_path(SNORMED).unwrap();
        assert_eq!(snormed.counts, vec![0.75, 0.25]);
    }

    #[test]
    fn normalize_fails_on_a_missing_run_inside_the_range() {
        let mut store = HistogramStore::new();
        put(&mut store, "background_jjjj", 1, &[10.0, 10.0]);
        put(&mut store, "signal", 1, &[4.0, 0.0]);
        // run 2 absent
        put(&mut store, "signal", 3, &[6.0, 2.0]);

        let err = apply_normalize(&mut store, &job(1, Some(3))).unwrap_err();
        assert!(err.to_string().contains("run_2"), "{err}");
    }
}
