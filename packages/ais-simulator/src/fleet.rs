//! fleet.rs — Synthetic vessel motion and anomaly injection
//!
//! Each vessel follows a gently wandering great-circle-ish track: Gaussian
//! heading drift, Gaussian speed wander, position advanced by speed over
//! ground each step. Anomalies are injected at pre-drawn (vessel, step)
//! slots by corrupting the emitted row the way real bad feeds do: position
//! jumps, impossible turns, speed spikes, split heading/course channels,
//! null-island and out-of-bounds fixes.

use ais_types::AisPoint;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

const METERS_PER_DEG_LAT: f64 = 111_320.0;
const MPS_PER_KNOT: f64 = 0.514_444;

// ── Anomaly kinds ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anomaly {
    /// Position jumps ~1.5 degrees of longitude in one report
    Teleport,
    /// Heading and course slew ~80 degrees in one interval
    TurnSpike,
    /// Reported speed jumps far beyond the displacement
    AccelSpike,
    /// Heading pinned opposite the course over ground
    HeadingSplit,
    /// (0, 0) fix
    NullIsland,
    /// Latitude outside [-90, 90]
    OutOfBounds,
}

/// How many of each anomaly to scatter across the run.
#[derive(Debug, Clone, Default)]
pub struct AnomalyPlan {
    pub teleports: usize,
    pub turn_spikes: usize,
    pub accel_spikes: usize,
    pub heading_splits: usize,
    pub null_islands: usize,
    pub out_of_bounds: usize,
}

impl AnomalyPlan {
    fn as_counts(&self) -> [(Anomaly, usize); 6] {
        [
            (Anomaly::Teleport, self.teleports),
            (Anomaly::TurnSpike, self.turn_spikes),
            (Anomaly::AccelSpike, self.accel_spikes),
            (Anomaly::HeadingSplit, self.heading_splits),
            (Anomaly::NullIsland, self.null_islands),
            (Anomaly::OutOfBounds, self.out_of_bounds),
        ]
    }

    pub fn total(&self) -> usize {
        self.as_counts().iter().map(|(_, n)| n).sum()
    }
}

// ── Vessels ───────────────────────────────────────────────────────────────────

struct Vessel {
    mmsi: String,
    lat: f64,
    lon: f64,
    sog_kn: f64,
    course_deg: f64,
}

impl Vessel {
    fn step(&mut self, dt_sec: f64, rng: &mut StdRng) {
        // Fixed, positive std-devs: construction cannot fail
        let drift = Normal::new(0.0, 1.2).expect("valid normal");
        let wander = Normal::new(0.0, 0.25).expect("valid normal");
        self.course_deg = (self.course_deg + drift.sample(rng)).rem_euclid(360.0);
        self.sog_kn = (self.sog_kn + wander.sample(rng)).clamp(2.0, 24.0);

        let dist_m = self.sog_kn * MPS_PER_KNOT * dt_sec;
        let theta = self.course_deg.to_radians();
        self.lat += dist_m * theta.cos() / METERS_PER_DEG_LAT;
        self.lon += dist_m * theta.sin() / (METERS_PER_DEG_LAT * self.lat.to_radians().cos());
    }
}

// ── Fleet simulation ──────────────────────────────────────────────────────────

pub struct FleetSim {
    vessels: Vec<Vessel>,
    start: DateTime<Utc>,
    interval_sec: u64,
    steps: usize,
    /// (vessel index, step index) → anomaly to inject
    schedule: HashMap<(usize, usize), Anomaly>,
}

impl FleetSim {
    pub fn new(
        n_vessels: usize,
        start: DateTime<Utc>,
        interval_sec: u64,
        steps: usize,
        plan: &AnomalyPlan,
        rng: &mut StdRng,
    ) -> Self {
        let vessels = (0..n_vessels)
            .map(|i| Vessel {
                mmsi: format!("2{:08}", 36_000_000 + i as u64),
                lat: 54.0 + rng.gen_range(-0.5..0.5),
                lon: 6.0 + rng.gen_range(-0.5..0.5),
                sog_kn: rng.gen_range(6.0..18.0),
                course_deg: rng.gen_range(0.0..360.0),
            })
            .collect();

        // Anomalies land after step 1 so every corrupted point has a prev
        let mut schedule = HashMap::new();
        if n_vessels > 0 && steps > 2 {
            for (kind, count) in plan.as_counts() {
                for _ in 0..count {
                    loop {
                        let slot = (rng.gen_range(0..n_vessels), rng.gen_range(2..steps));
                        if !schedule.contains_key(&slot) {
                            schedule.insert(slot, kind);
                            break;
                        }
                    }
                }
            }
        }

        Self {
            vessels,
            start,
            interval_sec,
            steps,
            schedule,
        }
    }

    pub fn scheduled(&self) -> usize {
        self.schedule.len()
    }

    /// Produce the whole run, time-ordered across the fleet.
    pub fn generate(&mut self, rng: &mut StdRng) -> Vec<AisPoint> {
        let mut out = Vec::with_capacity(self.vessels.len() * self.steps);
        for step in 0..self.steps {
            let timestamp = self.start + Duration::seconds((step as u64 * self.interval_sec) as i64);
            for idx in 0..self.vessels.len() {
                if step > 0 {
                    self.vessels[idx].step(self.interval_sec as f64, rng);
                }
                let vessel = &self.vessels[idx];
                let mut point = AisPoint {
                    mmsi: vessel.mmsi.clone(),
                    timestamp,
                    lat: vessel.lat,
                    lon: vessel.lon,
                    sog: Some(round2(vessel.sog_kn)),
                    cog: Some(round1(vessel.course_deg)),
                    heading: Some(round1(vessel.course_deg)),
                };
                if let Some(kind) = self.schedule.get(&(idx, step)) {
                    corrupt(&mut point, *kind);
                }
                out.push(point);
            }
        }
        out
    }
}

/// Corrupt one emitted report in place. The vessel's real state is left
/// untouched so the track recovers on the next report, exactly like a feed
/// glitch.
fn corrupt(point: &mut AisPoint, kind: Anomaly) {
    match kind {
        Anomaly::Teleport => point.lon += 1.5,
        Anomaly::TurnSpike => {
            let turned = point.cog.map(|c| (c + 80.0).rem_euclid(360.0));
            point.cog = turned;
            point.heading = turned;
        }
        Anomaly::AccelSpike => point.sog = Some(45.0),
        Anomaly::HeadingSplit => {
            point.sog = Some(point.sog.unwrap_or(12.0).max(12.0));
            point.heading = point.cog.map(|c| (c + 180.0).rem_euclid(360.0));
        }
        Anomaly::NullIsland => {
            point.lat = 0.0;
            point.lon = 0.0;
        }
        Anomaly::OutOfBounds => point.lat = 95.0,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
