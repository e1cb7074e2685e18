//! # db
//!
//! Persistence layer over an embedded SQLite store.
//!
//! The write path is the *ingest unit*: for one point, upsert latest-state,
//! append the position row, insert cooldown-accepted alerts with their
//! cooldown upserts, then bump the vessel's session-high severity, all or
//! nothing. Units run inside savepoints so a batch transaction can revert a
//! single failing unit and keep the rest.
//!
//! Schema is created idempotently at connect time; there is no separate
//! migration machinery.

use ais_types::{Alert, AlertStatus, AisPoint, RuleType, VesselLatest};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Acquire, Row, Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::config::OutOfOrderPolicy;
use crate::error::PersistenceError;
use crate::rules::CandidateAlert;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vessels_latest (
    mmsi                TEXT PRIMARY KEY,
    timestamp           INTEGER NOT NULL,
    lat                 REAL NOT NULL,
    lon                 REAL NOT NULL,
    sog                 REAL,
    cog                 REAL,
    heading             REAL,
    last_alert_severity INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_vessels_latest_timestamp ON vessels_latest(timestamp);
CREATE INDEX IF NOT EXISTS idx_vessels_latest_severity ON vessels_latest(last_alert_severity);

CREATE TABLE IF NOT EXISTS vessel_positions (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi      TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    lat       REAL NOT NULL,
    lon       REAL NOT NULL,
    sog       REAL,
    cog       REAL,
    heading   REAL
);
CREATE INDEX IF NOT EXISTS idx_positions_mmsi_timestamp ON vessel_positions(mmsi, timestamp);
CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON vessel_positions(timestamp);

CREATE TABLE IF NOT EXISTS alerts (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    mmsi      TEXT NOT NULL,
    rule_type TEXT NOT NULL,
    severity  INTEGER NOT NULL,
    summary   TEXT NOT NULL,
    evidence  TEXT NOT NULL,
    status    TEXT NOT NULL DEFAULT 'new',
    notes     TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_mmsi ON alerts(mmsi);
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_type ON alerts(rule_type);
CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity);
CREATE INDEX IF NOT EXISTS idx_alerts_mmsi_timestamp ON alerts(mmsi, timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_type_timestamp ON alerts(rule_type, timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_severity_timestamp ON alerts(severity, timestamp);

CREATE TABLE IF NOT EXISTS alert_cooldowns (
    mmsi                 TEXT NOT NULL,
    rule_type            TEXT NOT NULL,
    last_alert_timestamp INTEGER NOT NULL,
    PRIMARY KEY (mmsi, rule_type)
);
CREATE INDEX IF NOT EXISTS idx_cooldowns_last_timestamp ON alert_cooldowns(last_alert_timestamp);
"#;

/// Cooldown rows older than this (relative to the newest row) are reaped.
const COOLDOWN_RETENTION_MS: i64 = 24 * 3600 * 1000;

// ── Ingest types ──────────────────────────────────────────────────────────────

/// One point plus the rule verdicts computed for it.
#[derive(Debug, Clone)]
pub struct IngestUnit {
    pub point: AisPoint,
    pub candidates: Vec<CandidateAlert>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub persisted: u64,
    pub skipped_persist: u64,
    pub out_of_order_discarded: u64,
    /// Cooldown-accepted alerts, in insertion order
    pub alerts: Vec<Alert>,
}

enum UnitResult {
    Persisted(Vec<Alert>),
    Discarded,
}

// ── Database handle ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        let db = Self { pool };
        db.init_schema().await?;
        info!(url, "database ready");
        Ok(db)
    }

    /// A private in-memory store; one connection so the database is shared.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Session-high severities are per-session: zeroed when a replay starts.
    pub async fn reset_alert_severity(&self) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE vessels_latest SET last_alert_severity = 0")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a batch of ingest units in one transaction, each unit inside
    /// its own savepoint so one bad unit never takes down its neighbors.
    pub async fn ingest_batch(
        &self,
        units: &[IngestUnit],
        cooldown_sec: i64,
        policy: OutOfOrderPolicy,
    ) -> Result<BatchOutcome, PersistenceError> {
        let cooldown_ms = cooldown_sec.saturating_mul(1000);
        let mut out = BatchOutcome::default();
        let mut tx = self.pool.begin().await?;
        for unit in units {
            let mut sp = tx.begin().await?;
            match ingest_unit(&mut sp, unit, cooldown_ms, policy).await {
                Ok(UnitResult::Persisted(alerts)) => {
                    sp.commit().await?;
                    out.persisted += 1;
                    out.alerts.extend(alerts);
                }
                Ok(UnitResult::Discarded) => {
                    sp.commit().await?;
                    out.out_of_order_discarded += 1;
                }
                Err(e) => {
                    let _ = sp.rollback().await;
                    out.skipped_persist += 1;
                    warn!(mmsi = %unit.point.mmsi, error = %e, "ingest unit rolled back");
                }
            }
        }
        tx.commit().await?;
        Ok(out)
    }

    // ── Alert workflow ────────────────────────────────────────────────────────

    /// Returns false when the alert id is unknown.
    pub async fn update_alert_status(
        &self,
        id: i64,
        status: AlertStatus,
        notes: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts SET status = ?1, notes = COALESCE(?2, notes) WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn recent_alerts(
        &self,
        mmsi: Option<&str>,
        rule_type: Option<RuleType>,
        limit: i64,
    ) -> Result<Vec<Alert>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, timestamp, mmsi, rule_type, severity, summary, evidence, status, notes \
             FROM alerts \
             WHERE (?1 IS NULL OR mmsi = ?1) AND (?2 IS NULL OR rule_type = ?2) \
             ORDER BY timestamp DESC, id DESC LIMIT ?3",
        )
        .bind(mmsi)
        .bind(rule_type.map(|r| r.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().filter_map(alert_from_row).collect())
    }

    pub async fn latest_vessels(&self, limit: i64) -> Result<Vec<VesselLatest>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT mmsi, timestamp, lat, lon, sog, cog, heading, last_alert_severity \
             FROM vessels_latest ORDER BY last_alert_severity DESC, timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| VesselLatest {
                mmsi: row.get("mmsi"),
                timestamp: row.get("timestamp"),
                lat: row.get("lat"),
                lon: row.get("lon"),
                sog: row.get("sog"),
                cog: row.get("cog"),
                heading: row.get("heading"),
                last_alert_severity: row.get("last_alert_severity"),
            })
            .collect())
    }

    /// Reap cooldown rows that have fallen a day behind the newest one.
    /// Measured in source time so a historical replay keeps its dedup state.
    pub async fn cleanup_cooldowns(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM alert_cooldowns WHERE last_alert_timestamp < \
             (SELECT MAX(last_alert_timestamp) FROM alert_cooldowns) - ?1",
        )
        .bind(COOLDOWN_RETENTION_MS)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ── Unit write path ───────────────────────────────────────────────────────────

async fn ingest_unit(
    sp: &mut Transaction<'_, Sqlite>,
    unit: &IngestUnit,
    cooldown_ms: i64,
    policy: OutOfOrderPolicy,
) -> Result<UnitResult, sqlx::Error> {
    let point = &unit.point;
    let ts = point.timestamp_ms();

    let latest_ts: Option<i64> =
        sqlx::query_scalar("SELECT timestamp FROM vessels_latest WHERE mmsi = ?1")
            .bind(&point.mmsi)
            .fetch_optional(&mut **sp)
            .await?;
    let out_of_order = latest_ts.is_some_and(|t| ts < t);

    if out_of_order && policy == OutOfOrderPolicy::Discard {
        return Ok(UnitResult::Discarded);
    }

    // (a) latest-state upsert, unless this point is a late arrival and the
    // policy keeps latest-state monotone
    if !(out_of_order && policy == OutOfOrderPolicy::AppendSkipLatest) {
        sqlx::query(
            "INSERT INTO vessels_latest (mmsi, timestamp, lat, lon, sog, cog, heading, last_alert_severity) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0) \
             ON CONFLICT(mmsi) DO UPDATE SET \
                 timestamp = excluded.timestamp, lat = excluded.lat, lon = excluded.lon, \
                 sog = excluded.sog, cog = excluded.cog, heading = excluded.heading",
        )
        .bind(&point.mmsi)
        .bind(ts)
        .bind(point.lat)
        .bind(point.lon)
        .bind(point.sog)
        .bind(point.cog)
        .bind(point.heading)
        .execute(&mut **sp)
        .await?;
    }

    // (b) append-only history row
    sqlx::query(
        "INSERT INTO vessel_positions (mmsi, timestamp, lat, lon, sog, cog, heading) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&point.mmsi)
    .bind(ts)
    .bind(point.lat)
    .bind(point.lon)
    .bind(point.sog)
    .bind(point.cog)
    .bind(point.heading)
    .execute(&mut **sp)
    .await?;

    // (c) cooldown-gated alert inserts
    let mut accepted = Vec::new();
    for cand in &unit.candidates {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT last_alert_timestamp FROM alert_cooldowns WHERE mmsi = ?1 AND rule_type = ?2",
        )
        .bind(&point.mmsi)
        .bind(cand.rule_type.as_str())
        .fetch_optional(&mut **sp)
        .await?;
        if last.is_some_and(|t| ts - t < cooldown_ms) {
            continue;
        }

        let result = sqlx::query(
            "INSERT INTO alerts (timestamp, mmsi, rule_type, severity, summary, evidence, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'new')",
        )
        .bind(ts)
        .bind(&point.mmsi)
        .bind(cand.rule_type.as_str())
        .bind(cand.severity)
        .bind(&cand.summary)
        .bind(cand.evidence.to_string())
        .execute(&mut **sp)
        .await?;

        sqlx::query(
            "INSERT INTO alert_cooldowns (mmsi, rule_type, last_alert_timestamp) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(mmsi, rule_type) DO UPDATE SET \
                 last_alert_timestamp = excluded.last_alert_timestamp",
        )
        .bind(&point.mmsi)
        .bind(cand.rule_type.as_str())
        .bind(ts)
        .execute(&mut **sp)
        .await?;

        accepted.push(Alert {
            id: result.last_insert_rowid(),
            timestamp: ts,
            mmsi: point.mmsi.clone(),
            rule_type: cand.rule_type,
            severity: cand.severity,
            summary: cand.summary.clone(),
            evidence: cand.evidence.clone(),
            status: AlertStatus::New,
            notes: None,
        });
    }

    // (d) session-high severity
    if let Some(max_severity) = accepted.iter().map(|a| a.severity).max() {
        sqlx::query(
            "UPDATE vessels_latest SET last_alert_severity = MAX(last_alert_severity, ?1) \
             WHERE mmsi = ?2",
        )
        .bind(max_severity)
        .bind(&point.mmsi)
        .execute(&mut **sp)
        .await?;
    }

    Ok(UnitResult::Persisted(accepted))
}

fn alert_from_row(row: &SqliteRow) -> Option<Alert> {
    Some(Alert {
        id: row.get("id"),
        timestamp: row.get("timestamp"),
        mmsi: row.get("mmsi"),
        rule_type: RuleType::parse(row.get::<&str, _>("rule_type"))?,
        severity: row.get("severity"),
        summary: row.get("summary"),
        evidence: serde_json::from_str(row.get::<&str, _>("evidence"))
            .unwrap_or(serde_json::Value::Null),
        status: AlertStatus::parse(row.get::<&str, _>("status")).unwrap_or(AlertStatus::New),
        notes: row.get("notes"),
    })
}
