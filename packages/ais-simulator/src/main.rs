//! main.rs — Synthetic AIS feed generator entry point
//!
//! Writes a time-ordered multi-vessel AIS dump (CSV, optionally `.csv.zst`)
//! with a configurable number of injected feed anomalies, so every detection
//! rule in the backend can be exercised end-to-end from a file:
//!
//! ```text
//! ais-sim --out fleet.csv.zst --vessels 8 --duration-mins 120 \
//!         --teleports 3 --turn-spikes 2 --heading-splits 1 --seed 42
//! ```

mod fleet;

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use fleet::{AnomalyPlan, FleetSim};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ais-sim", about = "Seawatch synthetic AIS feed generator")]
struct Args {
    /// Output file (.csv or .csv.zst)
    #[arg(short, long)]
    out: PathBuf,
    /// Number of vessels in the fleet
    #[arg(long, default_value = "6")]
    vessels: usize,
    /// Run length in minutes of source time
    #[arg(long, default_value = "60")]
    duration_mins: u64,
    /// Reporting interval per vessel, seconds
    #[arg(long, default_value = "10")]
    interval_secs: u64,
    /// First report timestamp (RFC 3339)
    #[arg(long, default_value = "2025-01-01T00:00:00Z")]
    start: DateTime<Utc>,
    /// RNG seed; omit for a random feed
    #[arg(long)]
    seed: Option<u64>,
    /// Injected position jumps
    #[arg(long, default_value = "2")]
    teleports: usize,
    /// Injected hard turns
    #[arg(long, default_value = "2")]
    turn_spikes: usize,
    /// Injected reported-speed spikes
    #[arg(long, default_value = "2")]
    accel_spikes: usize,
    /// Injected heading-vs-course splits
    #[arg(long, default_value = "1")]
    heading_splits: usize,
    /// Injected (0, 0) fixes
    #[arg(long, default_value = "1")]
    null_islands: usize,
    /// Injected out-of-bounds latitudes
    #[arg(long, default_value = "1")]
    out_of_bounds: usize,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ais_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let plan = AnomalyPlan {
        teleports: args.teleports,
        turn_spikes: args.turn_spikes,
        accel_spikes: args.accel_spikes,
        heading_splits: args.heading_splits,
        null_islands: args.null_islands,
        out_of_bounds: args.out_of_bounds,
    };
    let steps = ((args.duration_mins * 60) / args.interval_secs.max(1)) as usize;

    info!(
        "🛳  Generating {} vessels × {} steps ({} anomalies, seed {seed})",
        args.vessels,
        steps,
        plan.total()
    );

    let mut fleet = FleetSim::new(args.vessels, args.start, args.interval_secs, steps, &plan, &mut rng);
    let points = fleet.generate(&mut rng);

    let file = File::create(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let sink: Box<dyn Write> = if args
        .out
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zst"))
    {
        Box::new(zstd::stream::write::Encoder::new(file, 3)?.auto_finish())
    } else {
        Box::new(file)
    };

    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(["MMSI", "BaseDateTime", "LAT", "LON", "SOG", "COG", "Heading"])?;
    for p in &points {
        writer.write_record([
            p.mmsi.clone(),
            p.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            format!("{:.6}", p.lat),
            format!("{:.6}", p.lon),
            p.sog.map(|v| format!("{v:.2}")).unwrap_or_default(),
            p.cog.map(|v| format!("{v:.1}")).unwrap_or_default(),
            p.heading.map(|v| format!("{v:.1}")).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;

    info!(
        "✅ Wrote {} reports for {} vessels to {}",
        points.len(),
        args.vessels,
        args.out.display()
    );
    Ok(())
}
