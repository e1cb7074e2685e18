//! Runtime configuration: detection thresholds and replay operating
//! parameters, every one overridable via `SEAWATCH_*` environment variables
//! and validated before the service starts serving.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Detection thresholds ──────────────────────────────────────────────────────

/// Rule thresholds. Units are in the field names; all values must be finite
/// and non-negative.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// TELEPORT: implied speed over a ≤120 s gap, knots
    pub teleport_speed_knots_short: f64,
    /// TELEPORT: implied speed over a 120–1800 s gap, knots
    pub teleport_speed_knots_medium: f64,
    /// TELEPORT_T2: lower bound of the suspicious band, knots
    pub teleport_t2_min_speed_knots: f64,
    /// TELEPORT_T2: long-gap displacement rate, meters per second of gap
    pub long_gap_speed_m_per_sec: f64,
    /// TURN_RATE: hard turn-rate limit, degrees/s
    pub max_turn_rate_deg_per_sec: f64,
    /// TURN_RATE + HEADING_COG: minimum speed for the check, knots
    pub min_speed_for_turn_check_knots: f64,
    /// TURN_RATE_T2: suspicious turn rate, degrees/s
    pub turn_t2_min_rate_deg_per_sec: f64,
    /// TURN_RATE_T2: minimum speed, knots
    pub turn_t2_min_speed_knots: f64,
    /// ACCELERATION: reported-vs-implied mismatch, knots
    pub accel_mismatch_knots: f64,
    /// ACCELERATION: reported-speed slew limit, knots/s
    pub accel_rate_knots_per_sec: f64,
    /// HEADING_COG: heading/course split, degrees
    pub heading_cog_split_deg: f64,
    /// HEADING_COG: minimum divergence rate, degrees/s
    pub heading_cog_min_turn_rate: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            teleport_speed_knots_short: env_f64("SEAWATCH_TELEPORT_SHORT_KN", 60.0),
            teleport_speed_knots_medium: env_f64("SEAWATCH_TELEPORT_MEDIUM_KN", 100.0),
            teleport_t2_min_speed_knots: env_f64("SEAWATCH_TELEPORT_T2_MIN_KN", 25.0),
            long_gap_speed_m_per_sec: env_f64("SEAWATCH_LONG_GAP_M_PER_SEC", 20.0),
            max_turn_rate_deg_per_sec: env_f64("SEAWATCH_MAX_TURN_RATE", 3.0),
            min_speed_for_turn_check_knots: env_f64("SEAWATCH_MIN_TURN_SPEED_KN", 10.0),
            turn_t2_min_rate_deg_per_sec: env_f64("SEAWATCH_TURN_T2_MIN_RATE", 1.0),
            turn_t2_min_speed_knots: env_f64("SEAWATCH_TURN_T2_MIN_SPEED_KN", 5.0),
            accel_mismatch_knots: env_f64("SEAWATCH_ACCEL_MISMATCH_KN", 15.0),
            accel_rate_knots_per_sec: env_f64("SEAWATCH_ACCEL_RATE_KN_S", 1.0),
            heading_cog_split_deg: env_f64("SEAWATCH_HDG_COG_SPLIT_DEG", 90.0),
            heading_cog_min_turn_rate: env_f64("SEAWATCH_HDG_COG_MIN_RATE", 2.0),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("teleport_speed_knots_short", self.teleport_speed_knots_short),
            ("teleport_speed_knots_medium", self.teleport_speed_knots_medium),
            ("teleport_t2_min_speed_knots", self.teleport_t2_min_speed_knots),
            ("long_gap_speed_m_per_sec", self.long_gap_speed_m_per_sec),
            ("max_turn_rate_deg_per_sec", self.max_turn_rate_deg_per_sec),
            ("min_speed_for_turn_check_knots", self.min_speed_for_turn_check_knots),
            ("turn_t2_min_rate_deg_per_sec", self.turn_t2_min_rate_deg_per_sec),
            ("turn_t2_min_speed_knots", self.turn_t2_min_speed_knots),
            ("accel_mismatch_knots", self.accel_mismatch_knots),
            ("accel_rate_knots_per_sec", self.accel_rate_knots_per_sec),
            ("heading_cog_split_deg", self.heading_cog_split_deg),
            ("heading_cog_min_turn_rate", self.heading_cog_min_turn_rate),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadThreshold { name, value });
            }
        }
        Ok(())
    }
}

// ── Out-of-order policy ───────────────────────────────────────────────────────

/// What to do with a report whose timestamp precedes the vessel's persisted
/// latest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfOrderPolicy {
    /// Append the position row, leave latest-state alone (default)
    AppendSkipLatest,
    /// Ingestion order wins wholesale: latest-state is rewound too
    UpdateLatest,
    /// Drop the whole unit, alerts included
    Discard,
}

impl OutOfOrderPolicy {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "append_skip_latest" => Ok(Self::AppendSkipLatest),
            "update_latest" => Ok(Self::UpdateLatest),
            "discard" => Ok(Self::Discard),
            other => Err(ConfigError::BadPolicy(other.to_string())),
        }
    }
}

// ── Replay parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Per-(vessel, rule) alert suppression window, source-time seconds
    pub alert_cooldown_sec: i64,
    /// Units per transaction when the caller does not pick a batch size
    pub default_batch_size: usize,
    /// Files larger than this switch to streaming mode, MB
    pub streaming_threshold_mb: u64,
    /// Points pulled per loader chunk in streaming mode
    pub chunk_size: usize,
    /// Per-vessel window capacity in the track store
    pub track_window_size: usize,
    pub out_of_order_policy: OutOfOrderPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        let policy = std::env::var("SEAWATCH_OUT_OF_ORDER_POLICY")
            .ok()
            .and_then(|v| OutOfOrderPolicy::parse(&v).ok())
            .unwrap_or(OutOfOrderPolicy::AppendSkipLatest);
        Self {
            alert_cooldown_sec: env_u64("SEAWATCH_ALERT_COOLDOWN_SEC", 300) as i64,
            default_batch_size: env_u64("SEAWATCH_DEFAULT_BATCH_SIZE", 100) as usize,
            streaming_threshold_mb: env_u64("SEAWATCH_STREAMING_THRESHOLD_MB", 50),
            chunk_size: env_u64("SEAWATCH_CHUNK_SIZE", 10_000) as usize,
            track_window_size: env_u64("SEAWATCH_TRACK_WINDOW_SIZE", 5) as usize,
            out_of_order_policy: policy,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alert_cooldown_sec < 0 {
            return Err(ConfigError::BadThreshold {
                name: "alert_cooldown_sec",
                value: self.alert_cooldown_sec as f64,
            });
        }
        if !(1..=10_000).contains(&self.default_batch_size) {
            return Err(ConfigError::OutOfRange {
                name: "default_batch_size",
                value: self.default_batch_size as u64,
                min: 1,
                max: 10_000,
            });
        }
        if self.streaming_threshold_mb == 0 {
            return Err(ConfigError::OutOfRange {
                name: "streaming_threshold_mb",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "chunk_size",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        if self.track_window_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "track_window_size",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        Ok(())
    }
}

// ── Top-level config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub detection: DetectionConfig,
    pub replay: ReplayConfig,
    pub database_url: String,
    pub http_port: u16,
}

impl Config {
    /// Build from environment, falling back to documented defaults.
    /// An unparsable override silently keeps the default; `validate` is the
    /// gate that refuses to start on genuinely invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var("SEAWATCH_OUT_OF_ORDER_POLICY") {
            // Surface a typo here rather than silently running with the default
            OutOfOrderPolicy::parse(&raw)?;
        }
        Ok(Self {
            detection: DetectionConfig::default(),
            replay: ReplayConfig::default(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://seawatch.db?mode=rwc".to_string()),
            http_port: env_u64("PORT", 3001) as u16,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.replay.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config {
            detection: DetectionConfig::default(),
            replay: ReplayConfig::default(),
            database_url: "sqlite::memory:".to_string(),
            http_port: 0,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn negative_threshold_refused() {
        let mut det = DetectionConfig::default();
        det.max_turn_rate_deg_per_sec = -1.0;
        assert!(matches!(det.validate(), Err(ConfigError::BadThreshold { .. })));
    }

    #[test]
    fn non_finite_threshold_refused() {
        let mut det = DetectionConfig::default();
        det.teleport_speed_knots_short = f64::NAN;
        assert!(det.validate().is_err());
    }

    #[test]
    fn batch_size_bounds() {
        let mut replay = ReplayConfig::default();
        replay.default_batch_size = 0;
        assert!(replay.validate().is_err());
        replay.default_batch_size = 10_001;
        assert!(replay.validate().is_err());
        replay.default_batch_size = 10_000;
        assert!(replay.validate().is_ok());
    }

    #[test]
    fn zero_sizes_refused() {
        let mut replay = ReplayConfig::default();
        replay.streaming_threshold_mb = 0;
        assert!(matches!(replay.validate(), Err(ConfigError::OutOfRange { .. })));

        let mut replay = ReplayConfig::default();
        replay.chunk_size = 0;
        assert!(replay.validate().is_err());

        let mut replay = ReplayConfig::default();
        replay.track_window_size = 0;
        assert!(replay.validate().is_err());
    }

    #[test]
    fn policy_parse() {
        assert_eq!(
            OutOfOrderPolicy::parse("discard").unwrap(),
            OutOfOrderPolicy::Discard
        );
        assert!(OutOfOrderPolicy::parse("keep").is_err());
    }
}
