//! # replay
//!
//! The replay session driver: pulls points from the loader, windows them per
//! vessel, runs the detection rules, persists ingest units, and fans events
//! out to subscribers, paced against source timestamps at a configurable
//! wall-clock multiple.
//!
//! ## Session lifecycle
//!
//! `Idle → Starting → Running → Stopping → Idle`, one active session at a
//! time. `start` rejects unless Idle; source validation happens in Starting
//! and a failure there returns to Idle with no observable side effects.
//! `stop` is cooperative: the driver checks the cancellation token before
//! every pacing sleep and between chunks, then drains in-flight work.
//!
//! Only this driver task ever touches the session's track store; the store
//! dies with the session.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ais_types::AisPoint;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::config::Config;
use crate::db::{Database, IngestUnit};
use crate::error::{SourceError, StartError, StateError};
use crate::loader::PointReader;
use crate::rules;
use crate::track::TrackStore;

/// A `tick` event is emitted at least every this many processed points.
pub const TICK_EVERY: u64 = 100;

// ── Parameters & status ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplayParams {
    pub path: PathBuf,
    /// Wall-clock multiple, ≥ 0.1; `+∞` disables pacing entirely
    pub speedup: f64,
    pub use_streaming: bool,
    /// Units per transaction; defaults to the configured batch size
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub processed: u64,
    pub persisted: u64,
    pub skipped_parse: u64,
    pub skipped_persist: u64,
    pub out_of_order_discarded: u64,
    pub detection_errors: u64,
    pub alerts_emitted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub processed_count: u64,
    pub last_timestamp: Option<i64>,
    pub stop_requested: bool,
    pub session_id: Option<Uuid>,
    pub dropped_events: u64,
    pub last_summary: Option<SessionSummary>,
}

/// Live counters shared between the driver task and the status surface.
struct SessionStats {
    processed: AtomicU64,
    last_timestamp_ms: AtomicI64,
    has_timestamp: AtomicBool,
    stop_requested: AtomicBool,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            last_timestamp_ms: AtomicI64::new(0),
            has_timestamp: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn set_last_timestamp(&self, ts: i64) {
        self.last_timestamp_ms.store(ts, Ordering::Relaxed);
        self.has_timestamp.store(true, Ordering::Relaxed);
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.has_timestamp
            .load(Ordering::Relaxed)
            .then(|| self.last_timestamp_ms.load(Ordering::Relaxed))
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

struct ManagerState {
    phase: Phase,
    session_id: Option<Uuid>,
    stats: Option<Arc<SessionStats>>,
    cancel: Option<CancellationToken>,
    last_summary: Option<SessionSummary>,
}

/// Owns the single-session state machine and spawns driver tasks.
#[derive(Clone)]
pub struct ReplayManager {
    config: Arc<Config>,
    db: Database,
    bus: EventBus,
    state: Arc<Mutex<ManagerState>>,
}

impl ReplayManager {
    pub fn new(config: Arc<Config>, db: Database, bus: EventBus) -> Self {
        Self {
            config,
            db,
            bus,
            state: Arc::new(Mutex::new(ManagerState {
                phase: Phase::Idle,
                session_id: None,
                stats: None,
                cancel: None,
                last_summary: None,
            })),
        }
    }

    /// Start a replay session. Rejects when another session is active, when
    /// the parameters are invalid, or when the source fails validation.
    pub async fn start(&self, params: ReplayParams) -> Result<Uuid, StartError> {
        if params.speedup.is_nan() || params.speedup < 0.1 {
            return Err(StartError::Params(format!(
                "speedup must be at least 0.1 (got {})",
                params.speedup
            )));
        }
        if let Some(batch) = params.batch_size {
            if !(1..=10_000).contains(&batch) {
                return Err(StartError::Params(format!(
                    "batch_size must be within 1..=10000 (got {batch})"
                )));
            }
        }

        {
            let mut st = self.state.lock().unwrap();
            if st.phase != Phase::Idle {
                return Err(StateError::AlreadyRunning.into());
            }
            st.phase = Phase::Starting;
        }

        // Validate path and decodability before any side effects; a failure
        // here must leave the system exactly as it was.
        let reader = match PointReader::open(&params.path) {
            Ok(reader) => reader,
            Err(e) => {
                self.state.lock().unwrap().phase = Phase::Idle;
                return Err(e.into());
            }
        };

        let streaming = params.use_streaming
            || std::fs::metadata(&params.path)
                .map(|m| m.len() > self.config.replay.streaming_threshold_mb * 1024 * 1024)
                .unwrap_or(false);
        let batch_size = params
            .batch_size
            .unwrap_or(self.config.replay.default_batch_size);

        let session_id = Uuid::new_v4();
        let stats = Arc::new(SessionStats::new());
        let cancel = CancellationToken::new();
        {
            let mut st = self.state.lock().unwrap();
            st.phase = Phase::Running;
            st.session_id = Some(session_id);
            st.stats = Some(stats.clone());
            st.cancel = Some(cancel.clone());
        }

        info!(
            %session_id,
            path = %params.path.display(),
            speedup = params.speedup,
            streaming,
            batch_size,
            "replay session started"
        );

        let mgr = self.clone();
        tokio::spawn(async move {
            let summary =
                run_session(&mgr, reader, streaming, batch_size, params.speedup, session_id, &stats, &cancel)
                    .await;
            mgr.finish(summary);
        });
        Ok(session_id)
    }

    /// Request cooperative shutdown of the active session. Returns whether a
    /// session was (still) active; repeated calls are no-ops.
    pub fn stop(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        match st.phase {
            Phase::Running => {
                st.phase = Phase::Stopping;
                if let Some(stats) = &st.stats {
                    stats.stop_requested.store(true, Ordering::Relaxed);
                }
                if let Some(cancel) = &st.cancel {
                    cancel.cancel();
                }
                true
            }
            Phase::Stopping => true,
            Phase::Idle | Phase::Starting => false,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let st = self.state.lock().unwrap();
        let running = st.phase != Phase::Idle;
        let (processed_count, last_timestamp, stop_requested) = match &st.stats {
            Some(stats) => (
                stats.processed.load(Ordering::Relaxed),
                stats.last_timestamp(),
                stats.stop_requested.load(Ordering::Relaxed),
            ),
            None => (
                st.last_summary.as_ref().map_or(0, |s| s.processed),
                None,
                false,
            ),
        };
        StatusSnapshot {
            running,
            processed_count,
            last_timestamp,
            stop_requested,
            session_id: st.session_id,
            dropped_events: self.bus.dropped(),
            last_summary: st.last_summary.clone(),
        }
    }

    fn finish(&self, summary: SessionSummary) {
        info!(
            session_id = %summary.session_id,
            processed = summary.processed,
            persisted = summary.persisted,
            skipped_parse = summary.skipped_parse,
            skipped_persist = summary.skipped_persist,
            alerts = summary.alerts_emitted,
            error = summary.error.as_deref().unwrap_or("none"),
            "replay session finished"
        );
        let mut st = self.state.lock().unwrap();
        st.phase = Phase::Idle;
        st.session_id = None;
        st.stats = None;
        st.cancel = None;
        st.last_summary = Some(summary);
    }
}

// ── Pacing ────────────────────────────────────────────────────────────────────

/// Source-timestamp pacing: the first point anchors (source, wall) references
/// and each later point sleeps off its share of the gap, divided by the
/// speedup. Out-of-order timestamps yield negative delays and pass through.
struct Pacing {
    speedup: f64,
    reference: Option<(i64, Instant)>,
}

impl Pacing {
    fn new(speedup: f64) -> Self {
        Self {
            speedup,
            reference: None,
        }
    }

    fn delay_for(&mut self, point: &AisPoint) -> Option<Duration> {
        if !self.speedup.is_finite() {
            return None;
        }
        let ts = point.timestamp_ms();
        match self.reference {
            None => {
                self.reference = Some((ts, Instant::now()));
                None
            }
            Some((ref_ts, ref_wall)) => {
                let source_elapsed = (ts - ref_ts) as f64 / 1000.0 / self.speedup;
                let delay = source_elapsed - ref_wall.elapsed().as_secs_f64();
                (delay > 0.0).then(|| Duration::from_secs_f64(delay))
            }
        }
    }
}

// ── Point feed (streaming vs buffered) ────────────────────────────────────────

/// Both modes feed the pipeline the same points in the same order; the split
/// is purely about memory. Reads happen on the blocking pool since the
/// decoder is synchronous I/O.
enum Feed {
    Buffered {
        points: std::vec::IntoIter<AisPoint>,
        skipped: u64,
        drained: bool,
    },
    Streaming {
        reader: Option<PointReader>,
        chunk_size: usize,
        skipped: u64,
    },
}

impl Feed {
    async fn new(
        mut reader: PointReader,
        streaming: bool,
        chunk_size: usize,
    ) -> Result<Self, SourceError> {
        if streaming {
            return Ok(Feed::Streaming {
                reader: Some(reader),
                chunk_size,
                skipped: 0,
            });
        }
        let (reader, points) = tokio::task::spawn_blocking(move || {
            let points = reader.load_all();
            (reader, points)
        })
        .await
        .map_err(|e| SourceError::Io(std::io::Error::other(e)))?;
        Ok(Feed::Buffered {
            points: points?.into_iter(),
            skipped: reader.skipped(),
            drained: false,
        })
    }

    async fn next_chunk(&mut self) -> Result<Vec<AisPoint>, SourceError> {
        match self {
            Feed::Buffered {
                points, drained, ..
            } => {
                if *drained {
                    return Ok(Vec::new());
                }
                *drained = true;
                Ok(points.by_ref().collect())
            }
            Feed::Streaming {
                reader,
                chunk_size,
                skipped,
            } => {
                let Some(mut taken) = reader.take() else {
                    return Ok(Vec::new());
                };
                let n = *chunk_size;
                let (taken, chunk) = tokio::task::spawn_blocking(move || {
                    let chunk = taken.next_chunk(n);
                    (taken, chunk)
                })
                .await
                .map_err(|e| SourceError::Io(std::io::Error::other(e)))?;
                *skipped = taken.skipped();
                *reader = Some(taken);
                chunk
            }
        }
    }

    fn skipped(&self) -> u64 {
        match self {
            Feed::Buffered { skipped, .. } | Feed::Streaming { skipped, .. } => *skipped,
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    processed: u64,
    persisted: u64,
    skipped_persist: u64,
    out_of_order_discarded: u64,
    detection_errors: u64,
    alerts_emitted: u64,
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    mgr: &ReplayManager,
    reader: PointReader,
    streaming: bool,
    batch_size: usize,
    speedup: f64,
    session_id: Uuid,
    stats: &SessionStats,
    cancel: &CancellationToken,
) -> SessionSummary {
    let cfg = &mgr.config;
    let mut store = TrackStore::new(cfg.replay.track_window_size);
    let mut counters = Counters::default();
    let mut pacing = Pacing::new(speedup);
    let mut batch: Vec<IngestUnit> = Vec::with_capacity(batch_size);
    let mut next_tick = TICK_EVERY;
    let mut terminal_error: Option<String> = None;

    // Session-high severities start from zero
    if let Err(e) = mgr.db.reset_alert_severity().await {
        let message = format!("failed to reset session severities: {e}");
        mgr.bus.publish(BusEvent::Error {
            message: message.clone(),
        });
        return summarize(session_id, &counters, 0, Some(message));
    }

    let mut feed = match Feed::new(reader, streaming, cfg.replay.chunk_size).await {
        Ok(feed) => feed,
        Err(e) => {
            let message = format!("source failed: {e}");
            mgr.bus.publish(BusEvent::Error {
                message: message.clone(),
            });
            return summarize(session_id, &counters, 0, Some(message));
        }
    };

    'session: loop {
        if cancel.is_cancelled() {
            break;
        }
        let chunk = match feed.next_chunk().await {
            Ok(chunk) => chunk,
            Err(e) => {
                // Loader trouble past validation is terminal for the session
                terminal_error = Some(format!("source failed mid-session: {e}"));
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }
        for point in chunk {
            if cancel.is_cancelled() {
                break 'session;
            }
            if let Some(delay) = pacing.delay_for(&point) {
                tokio::select! {
                    _ = cancel.cancelled() => break 'session,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            store.push(point.clone());
            let prev = store.previous(&point.mmsi).cloned();
            let candidates = match catch_unwind(AssertUnwindSafe(|| {
                rules::evaluate(&cfg.detection, prev.as_ref(), &point)
            })) {
                Ok(candidates) => candidates,
                Err(_) => {
                    // A rule panic is a programmer error; the point still counts
                    counters.detection_errors += 1;
                    error!(
                        mmsi = %point.mmsi,
                        timestamp = %point.timestamp,
                        "rule evaluation panicked; rules skipped for this point"
                    );
                    Vec::new()
                }
            };

            batch.push(IngestUnit { point, candidates });
            if batch.len() >= batch_size {
                flush_batch(mgr, &mut batch, &mut counters, stats, &mut next_tick).await;
            }
        }
    }

    // Drain in-flight work before the session winds down
    flush_batch(mgr, &mut batch, &mut counters, stats, &mut next_tick).await;

    match terminal_error {
        Some(message) => {
            mgr.bus.publish(BusEvent::Error {
                message: message.clone(),
            });
            summarize(session_id, &counters, feed.skipped(), Some(message))
        }
        None => {
            mgr.bus.publish(BusEvent::Tick {
                processed: counters.processed,
            });
            summarize(session_id, &counters, feed.skipped(), None)
        }
    }
}

async fn flush_batch(
    mgr: &ReplayManager,
    batch: &mut Vec<IngestUnit>,
    counters: &mut Counters,
    stats: &SessionStats,
    next_tick: &mut u64,
) {
    let Some(last) = batch.last() else { return };
    let last_ts = last.point.timestamp_ms();
    let n = batch.len() as u64;

    match mgr
        .db
        .ingest_batch(
            batch,
            mgr.config.replay.alert_cooldown_sec,
            mgr.config.replay.out_of_order_policy,
        )
        .await
    {
        Ok(outcome) => {
            counters.persisted += outcome.persisted;
            counters.skipped_persist += outcome.skipped_persist;
            counters.out_of_order_discarded += outcome.out_of_order_discarded;
            counters.alerts_emitted += outcome.alerts.len() as u64;
            for alert in outcome.alerts {
                mgr.bus.publish(BusEvent::Alert { data: alert });
            }
        }
        Err(e) => {
            counters.skipped_persist += n;
            warn!(error = %e, units = n, "batch transaction failed; units skipped");
        }
    }

    // Progress counts every attempted unit, persisted or not
    counters.processed += n;
    stats.processed.store(counters.processed, Ordering::Relaxed);
    stats.set_last_timestamp(last_ts);
    if counters.processed >= *next_tick {
        mgr.bus.publish(BusEvent::Tick {
            processed: counters.processed,
        });
        while counters.processed >= *next_tick {
            *next_tick += TICK_EVERY;
        }
    }
    batch.clear();
}

fn summarize(
    session_id: Uuid,
    counters: &Counters,
    skipped_parse: u64,
    error: Option<String>,
) -> SessionSummary {
    SessionSummary {
        session_id,
        processed: counters.processed,
        persisted: counters.persisted,
        skipped_parse,
        skipped_persist: counters.skipped_persist,
        out_of_order_discarded: counters.out_of_order_discarded,
        detection_errors: counters.detection_errors,
        alerts_emitted: counters.alerts_emitted,
        error,
    }
}
