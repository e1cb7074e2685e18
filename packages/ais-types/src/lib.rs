//! # ais-types
//!
//! Shared AIS domain structures for the Seawatch suite.
//!
//! These types are used by:
//! - `backend-rust`: decoding position reports, running the detection rules,
//!   persisting alerts and vessel state
//! - `ais-simulator`: producing synthetic feed files that exercise every rule
//!
//! ## Conventions
//!
//! - **MMSI**: vessel identifier, exactly 9 ASCII digits, kept as a string
//! - **Timestamps**: `chrono::DateTime<Utc>` in flight; unix *milliseconds*
//!   (`i64`) everywhere a timestamp crosses a wire or a table
//! - **Heading 511** means "unavailable" on the AIS air interface and is
//!   normalized to `None` at the decode boundary; nothing downstream ever
//!   sees the sentinel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod kinematics;

/// AIS heading sentinel for "not available".
pub const HEADING_UNAVAILABLE: f64 = 511.0;

/// True when `s` is a well-formed MMSI: exactly 9 ASCII digits.
pub fn is_valid_mmsi(s: &str) -> bool {
    s.len() == 9 && s.bytes().all(|b| b.is_ascii_digit())
}

// ── Position Report ───────────────────────────────────────────────────────────

/// One decoded AIS position report, immutable while in flight.
///
/// Created by the loader, consumed by the pipeline; never persisted directly.
/// Derived rows (`VesselPosition`, `VesselLatest`, `Alert`) are persisted
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisPoint {
    pub mmsi: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground, knots
    pub sog: Option<f64>,
    /// Course over ground, degrees [0, 360)
    pub cog: Option<f64>,
    /// Bow direction, degrees [0, 360); 511 already normalized to `None`
    pub heading: Option<f64>,
}

impl AisPoint {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

// ── Rule Types ────────────────────────────────────────────────────────────────

/// The closed set of detection rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Tier 1: physically impossible displacement between reports
    Teleport,
    /// Tier 2: implausible but not impossible displacement
    TeleportT2,
    /// Tier 1: out-of-bounds / null-island / stuck-while-moving fix
    PositionInvalid,
    /// Tier 1: turn rate beyond what a hull can do
    TurnRate,
    /// Tier 2: unusual turn rate
    TurnRateT2,
    /// Tier 2: reported speed inconsistent with displacement
    Acceleration,
    /// Tier 1: heading and course disagree while underway
    HeadingCogConsistency,
}

impl RuleType {
    pub const ALL: [RuleType; 7] = [
        RuleType::Teleport,
        RuleType::TeleportT2,
        RuleType::PositionInvalid,
        RuleType::TurnRate,
        RuleType::TurnRateT2,
        RuleType::Acceleration,
        RuleType::HeadingCogConsistency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Teleport => "TELEPORT",
            RuleType::TeleportT2 => "TELEPORT_T2",
            RuleType::PositionInvalid => "POSITION_INVALID",
            RuleType::TurnRate => "TURN_RATE",
            RuleType::TurnRateT2 => "TURN_RATE_T2",
            RuleType::Acceleration => "ACCELERATION",
            RuleType::HeadingCogConsistency => "HEADING_COG_CONSISTENCY",
        }
    }

    pub fn parse(s: &str) -> Option<RuleType> {
        RuleType::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────────

/// Review workflow state of an alert. Everything but `status`/`notes` on an
/// alert is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Reviewed,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Reviewed => "reviewed",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalsePositive => "false_positive",
        }
    }

    pub fn parse(s: &str) -> Option<AlertStatus> {
        match s {
            "new" => Some(AlertStatus::New),
            "reviewed" => Some(AlertStatus::Reviewed),
            "resolved" => Some(AlertStatus::Resolved),
            "false_positive" => Some(AlertStatus::FalsePositive),
            _ => None,
        }
    }
}

/// A persisted detection alert.
///
/// `timestamp` is the triggering *report's* timestamp (unix ms), never wall
/// clock, so replayed historical data keeps its own timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub timestamp: i64,
    pub mmsi: String,
    pub rule_type: RuleType,
    /// 0–100
    pub severity: i64,
    pub summary: String,
    /// Raw metrics the rule computed, shape per rule
    pub evidence: serde_json::Value,
    pub status: AlertStatus,
    pub notes: Option<String>,
}

// ── Vessel State Rows ─────────────────────────────────────────────────────────

/// Most recent persisted report per vessel, plus the highest alert severity
/// observed in the current replay session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselLatest {
    pub mmsi: String,
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<f64>,
    pub last_alert_severity: i64,
}

/// Append-only position history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselPosition {
    pub id: i64,
    pub mmsi: String,
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmsi_validation() {
        assert!(is_valid_mmsi("200000001"));
        assert!(!is_valid_mmsi("20000001"));
        assert!(!is_valid_mmsi("2000000010"));
        assert!(!is_valid_mmsi("20000000a"));
        assert!(!is_valid_mmsi(""));
    }

    #[test]
    fn rule_type_round_trips_through_str() {
        for rule in RuleType::ALL {
            assert_eq!(RuleType::parse(rule.as_str()), Some(rule));
        }
        assert_eq!(RuleType::parse("TELEPORT_T3"), None);
    }

    #[test]
    fn rule_type_serde_matches_as_str() {
        for rule in RuleType::ALL {
            let json = serde_json::to_string(&rule).unwrap();
            assert_eq!(json, format!("\"{}\"", rule.as_str()));
        }
    }

    #[test]
    fn alert_status_rejects_unknown() {
        assert_eq!(AlertStatus::parse("false_positive"), Some(AlertStatus::FalsePositive));
        assert_eq!(AlertStatus::parse("FALSE_POSITIVE"), None);
        assert_eq!(AlertStatus::parse("wontfix"), None);
    }
}
