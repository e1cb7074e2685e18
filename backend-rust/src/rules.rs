//! # rules
//!
//! The detection rule engine: seven rules evaluated in a fixed order against
//! (previous, current) report pairs from the track store.
//!
//! Rules are independent: several may fire on the same point, each producing
//! its own candidate alert; the cooldown gate downstream decides what is
//! actually persisted. Tier-2 variants (TELEPORT_T2, TURN_RATE_T2) only fire
//! when their tier-1 sibling stayed quiet.
//!
//! Numeric discipline: any undefined kinematic feature (simultaneous or
//! out-of-order pair, missing channel) silently disables the rule for that
//! point, and severity scoring never sees a non-finite value.

use ais_types::kinematics::{angle_diff_deg, distance_m, dt_sec, implied_speed_kn};
use ais_types::{AisPoint, RuleType};
use serde_json::json;

use crate::config::DetectionConfig;

// Rule 3 integrity constants
const NULL_ISLAND_EPSILON_DEG: f64 = 0.001;
const STUCK_MAX_DISTANCE_M: f64 = 1.0;
const STUCK_MIN_SOG_KN: f64 = 1.0;
const STUCK_MIN_DT_SEC: f64 = 60.0;

/// One rule's verdict on a point, before the cooldown gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAlert {
    pub rule_type: RuleType,
    pub severity: i64,
    pub summary: String,
    pub evidence: serde_json::Value,
}

/// Pairwise features, derived once per point.
struct Pair<'a> {
    prev: &'a AisPoint,
    dt: f64,
    distance: f64,
    implied_kn: Option<f64>,
}

/// Evaluate every rule against `curr`, with `prev` taken from the vessel's
/// track window. Returned candidates preserve rule order.
pub fn evaluate(
    cfg: &DetectionConfig,
    prev: Option<&AisPoint>,
    curr: &AisPoint,
) -> Vec<CandidateAlert> {
    let pair = prev.map(|p| Pair {
        prev: p,
        dt: dt_sec(p, curr),
        distance: distance_m(p, curr),
        implied_kn: implied_speed_kn(p, curr),
    });

    let mut out = Vec::new();

    let teleport = pair.as_ref().and_then(|pr| teleport_t1(cfg, pr, curr));
    let teleport_fired = teleport.is_some();
    out.extend(teleport);
    if !teleport_fired {
        out.extend(pair.as_ref().and_then(|pr| teleport_t2(cfg, pr, curr)));
    }

    out.extend(position_invalid(pair.as_ref(), curr));

    let turn = pair.as_ref().and_then(|pr| turn_rate_t1(cfg, pr, curr));
    let turn_fired = turn.is_some();
    out.extend(turn);
    if !turn_fired {
        out.extend(pair.as_ref().and_then(|pr| turn_rate_t2(cfg, pr, curr)));
    }

    out.extend(pair.as_ref().and_then(|pr| acceleration(cfg, pr, curr)));
    out.extend(pair.as_ref().and_then(|pr| heading_cog_consistency(cfg, pr, curr)));

    out
}

/// Clamp-then-round, with a floor fallback so NaN can never escape.
fn severity(raw: f64, lo: f64, hi: f64) -> i64 {
    if raw.is_finite() {
        raw.clamp(lo, hi).round() as i64
    } else {
        lo as i64
    }
}

fn pair_coords(pr: &Pair<'_>, curr: &AisPoint) -> serde_json::Value {
    json!({
        "p1_lat": pr.prev.lat,
        "p1_lon": pr.prev.lon,
        "p1_timestamp": pr.prev.timestamp.to_rfc3339(),
        "p2_lat": curr.lat,
        "p2_lon": curr.lon,
        "p2_timestamp": curr.timestamp.to_rfc3339(),
    })
}

fn merge(mut base: serde_json::Value, coords: serde_json::Value) -> serde_json::Value {
    if let (Some(obj), Some(extra)) = (base.as_object_mut(), coords.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    base
}

// ── Rule 1: TELEPORT (tier 1) ─────────────────────────────────────────────────

fn teleport_t1(cfg: &DetectionConfig, pr: &Pair<'_>, curr: &AisPoint) -> Option<CandidateAlert> {
    let v = pr.implied_kn?;
    let (tier, threshold) = if pr.dt > 0.0 && pr.dt <= 120.0 {
        ("short", cfg.teleport_speed_knots_short)
    } else if pr.dt > 120.0 && pr.dt <= 1800.0 {
        ("medium", cfg.teleport_speed_knots_medium)
    } else {
        return None;
    };
    if v < threshold {
        return None;
    }
    Some(CandidateAlert {
        rule_type: RuleType::Teleport,
        severity: severity(40.0 + 0.4 * (v - threshold), 70.0, 100.0),
        summary: format!(
            "{} implied {:.0} kn over {:.0} s ({:.1} km displacement)",
            curr.mmsi,
            v,
            pr.dt,
            pr.distance / 1000.0
        ),
        evidence: merge(
            json!({
                "dt_sec": pr.dt,
                "distance_m": pr.distance,
                "implied_speed_kn": v,
                "tier": tier,
            }),
            pair_coords(pr, curr),
        ),
    })
}

// ── Rule 2: TELEPORT_T2 (tier 2) ──────────────────────────────────────────────

fn teleport_t2(cfg: &DetectionConfig, pr: &Pair<'_>, curr: &AisPoint) -> Option<CandidateAlert> {
    let v = pr.implied_kn?;
    let tier = if pr.dt > 0.0 && pr.dt <= 1800.0 {
        let threshold = if pr.dt <= 120.0 {
            cfg.teleport_speed_knots_short
        } else {
            cfg.teleport_speed_knots_medium
        };
        if v >= cfg.teleport_t2_min_speed_knots && v < threshold {
            if pr.dt <= 120.0 { "short" } else { "medium" }
        } else {
            return None;
        }
    } else if pr.dt > 1800.0 && pr.distance > cfg.long_gap_speed_m_per_sec * pr.dt {
        "long_gap"
    } else {
        return None;
    };
    Some(CandidateAlert {
        rule_type: RuleType::TeleportT2,
        severity: severity(15.0 + 0.3 * v, 15.0, 60.0),
        summary: format!(
            "{} suspicious {:.0} kn implied over {:.0} s",
            curr.mmsi, v, pr.dt
        ),
        evidence: merge(
            json!({
                "dt_sec": pr.dt,
                "distance_m": pr.distance,
                "implied_speed_kn": v,
                "tier": tier,
            }),
            pair_coords(pr, curr),
        ),
    })
}

// ── Rule 3: POSITION_INVALID (tier 1) ─────────────────────────────────────────

fn position_invalid(pair: Option<&Pair<'_>>, curr: &AisPoint) -> Option<CandidateAlert> {
    let out_of_bounds = !(-90.0..=90.0).contains(&curr.lat) || !(-180.0..=180.0).contains(&curr.lon);
    let null_island =
        curr.lat.abs() < NULL_ISLAND_EPSILON_DEG && curr.lon.abs() < NULL_ISLAND_EPSILON_DEG;

    let (reason, sev, sog, summary) = if out_of_bounds {
        (
            "out_of_bounds",
            75,
            curr.sog,
            format!("{} reported out-of-bounds position ({}, {})", curr.mmsi, curr.lat, curr.lon),
        )
    } else if null_island {
        (
            "null_island",
            75,
            curr.sog,
            format!("{} reported a null-island fix", curr.mmsi),
        )
    } else {
        let pr = pair?;
        let stuck = pr.distance < STUCK_MAX_DISTANCE_M
            && pr.prev.sog.map_or(false, |s| s >= STUCK_MIN_SOG_KN)
            && pr.dt >= STUCK_MIN_DT_SEC;
        if !stuck {
            return None;
        }
        (
            "stuck",
            70,
            pr.prev.sog,
            format!("{} position frozen for {:.0} s while making way", curr.mmsi, pr.dt),
        )
    };

    Some(CandidateAlert {
        rule_type: RuleType::PositionInvalid,
        severity: sev,
        summary,
        evidence: json!({
            "lat": curr.lat,
            "lon": curr.lon,
            "sog": sog,
            "dt_sec": pair.map(|p| p.dt),
            "reason": reason,
        }),
    })
}

// ── Rules 4/5: TURN_RATE / TURN_RATE_T2 ───────────────────────────────────────

/// Pick the angle channel shared by both points: heading preferred, cog as
/// fallback, nothing if neither is available on both.
fn angle_channel(prev: &AisPoint, curr: &AisPoint) -> Option<(&'static str, f64, f64)> {
    if let (Some(a), Some(b)) = (prev.heading, curr.heading) {
        return Some(("heading", a, b));
    }
    if let (Some(a), Some(b)) = (prev.cog, curr.cog) {
        return Some(("cog", a, b));
    }
    None
}

struct Turn {
    angle_type: &'static str,
    delta: f64,
    rate: f64,
    speed_kn: f64,
}

fn turn_features(pr: &Pair<'_>, curr: &AisPoint) -> Option<Turn> {
    let (angle_type, a, b) = angle_channel(pr.prev, curr)?;
    if !(pr.dt > 0.0 && pr.dt <= 120.0) {
        return None;
    }
    let speed_kn = curr.sog.or(pr.implied_kn)?;
    let delta = angle_diff_deg(a, b);
    let rate = delta.abs() / pr.dt;
    rate.is_finite().then_some(Turn {
        angle_type,
        delta,
        rate,
        speed_kn,
    })
}

fn turn_evidence(pr: &Pair<'_>, curr: &AisPoint, t: &Turn, tier: &str) -> serde_json::Value {
    merge(
        json!({
            "dt_sec": pr.dt,
            "delta_angle_deg": t.delta,
            "turn_rate_deg_s": t.rate,
            "speed_kn": t.speed_kn,
            "angle_type": t.angle_type,
            "tier": tier,
        }),
        pair_coords(pr, curr),
    )
}

fn turn_rate_t1(cfg: &DetectionConfig, pr: &Pair<'_>, curr: &AisPoint) -> Option<CandidateAlert> {
    let t = turn_features(pr, curr)?;
    if t.speed_kn < cfg.min_speed_for_turn_check_knots || t.rate < cfg.max_turn_rate_deg_per_sec {
        return None;
    }
    Some(CandidateAlert {
        rule_type: RuleType::TurnRate,
        severity: severity(
            50.0 + 10.0 * (t.rate - cfg.max_turn_rate_deg_per_sec),
            70.0,
            95.0,
        ),
        summary: format!(
            "{} turned {:.0} deg in {:.0} s ({:.1} deg/s at {:.0} kn)",
            curr.mmsi,
            t.delta.abs(),
            pr.dt,
            t.rate,
            t.speed_kn
        ),
        evidence: turn_evidence(pr, curr, &t, "normal"),
    })
}

fn turn_rate_t2(cfg: &DetectionConfig, pr: &Pair<'_>, curr: &AisPoint) -> Option<CandidateAlert> {
    let t = turn_features(pr, curr)?;
    if t.rate < cfg.turn_t2_min_rate_deg_per_sec || t.speed_kn < cfg.turn_t2_min_speed_knots {
        return None;
    }
    let tier = if t.speed_kn < cfg.min_speed_for_turn_check_knots {
        "low_speed"
    } else {
        "normal"
    };
    Some(CandidateAlert {
        rule_type: RuleType::TurnRateT2,
        severity: severity(25.0 + 10.0 * t.rate, 25.0, 55.0),
        summary: format!(
            "{} unusual turn of {:.0} deg in {:.0} s ({:.1} deg/s)",
            curr.mmsi,
            t.delta.abs(),
            pr.dt,
            t.rate
        ),
        evidence: turn_evidence(pr, curr, &t, tier),
    })
}

// ── Rule 6: ACCELERATION (tier 2) ─────────────────────────────────────────────

fn acceleration(cfg: &DetectionConfig, pr: &Pair<'_>, curr: &AisPoint) -> Option<CandidateAlert> {
    let sog_curr = curr.sog?;
    let sog_prev = pr.prev.sog?;
    if !(pr.dt > 1.0 && pr.dt <= 300.0) {
        return None;
    }
    let implied = pr.implied_kn?;
    let diff = (sog_curr - implied).abs();
    let accel = (sog_curr - sog_prev).abs() / pr.dt;
    if diff < cfg.accel_mismatch_knots && accel < cfg.accel_rate_knots_per_sec {
        return None;
    }
    Some(CandidateAlert {
        rule_type: RuleType::Acceleration,
        severity: severity(20.0 + diff, 25.0, 85.0),
        summary: format!(
            "{} reported {:.0} kn against {:.0} kn implied",
            curr.mmsi, sog_curr, implied
        ),
        evidence: json!({
            "difference_kn": diff,
            "implied_speed_kn": implied,
            "sog_reported": sog_curr,
            "accel_knots_per_sec": accel,
        }),
    })
}

// ── Rule 7: HEADING_COG_CONSISTENCY (tier 1) ──────────────────────────────────

fn heading_cog_consistency(
    cfg: &DetectionConfig,
    pr: &Pair<'_>,
    curr: &AisPoint,
) -> Option<CandidateAlert> {
    let heading = curr.heading?;
    let cog = curr.cog?;
    if pr.dt <= 0.0 {
        return None;
    }
    let speed_kn = curr.sog.or(pr.implied_kn)?;
    if speed_kn < cfg.min_speed_for_turn_check_knots {
        return None;
    }
    let split = angle_diff_deg(heading, cog).abs();
    if split < cfg.heading_cog_split_deg {
        return None;
    }
    // Divergence rate between the two channels across the pair interval
    let rate = split / pr.dt;
    if !rate.is_finite() || rate < cfg.heading_cog_min_turn_rate {
        return None;
    }
    Some(CandidateAlert {
        rule_type: RuleType::HeadingCogConsistency,
        severity: severity(60.0 + 0.2 * split, 70.0, 85.0),
        summary: format!(
            "{} heading {:.0} deg against course {:.0} deg at {:.0} kn",
            curr.mmsi, heading, cog, speed_kn
        ),
        evidence: json!({
            "dt_sec": pr.dt,
            "angle_change_deg": split,
            "turn_rate_deg_s": rate,
            "speed_kn": speed_kn,
            // This rule compares the two channels against each other; there
            // is no single selected channel like rules 4/5 have
            "angle_type": "heading_vs_cog",
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn cfg() -> DetectionConfig {
        DetectionConfig::default()
    }

    fn pt(
        mmsi: &str,
        secs: i64,
        lat: f64,
        lon: f64,
        sog: Option<f64>,
        cog: Option<f64>,
        heading: Option<f64>,
    ) -> AisPoint {
        AisPoint {
            mmsi: mmsi.to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            lat,
            lon,
            sog,
            cog,
            heading,
        }
    }

    fn rules_fired(alerts: &[CandidateAlert]) -> Vec<RuleType> {
        alerts.iter().map(|a| a.rule_type).collect()
    }

    #[test]
    fn teleport_short_gap_maxes_severity() {
        // Two degrees of longitude in one minute: thousands of knots implied
        let p1 = pt("200000001", 0, 40.0, -70.0, Some(12.0), Some(90.0), Some(90.0));
        let p2 = pt("200000001", 60, 40.0, -68.0, Some(12.0), Some(90.0), Some(90.0));
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        let teleport = alerts
            .iter()
            .find(|a| a.rule_type == RuleType::Teleport)
            .expect("teleport should fire");
        assert_eq!(teleport.severity, 100);
        assert_eq!(teleport.evidence["tier"], "short");
        assert!(teleport.evidence["implied_speed_kn"].as_f64().unwrap() > 5_000.0);
        // Tier 2 must stay quiet when tier 1 fired
        assert!(!rules_fired(&alerts).contains(&RuleType::TeleportT2));
    }

    #[test]
    fn teleport_t2_medium_band() {
        // 15 km in 300 s ≈ 97 kn: below the 100 kn medium threshold,
        // well above the 25 kn suspicion floor
        let p1 = pt("200000002", 0, 0.0, 10.0, None, None, None);
        let p2 = pt("200000002", 300, 0.0, 10.1349, None, None, None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert_eq!(rules_fired(&alerts), vec![RuleType::TeleportT2]);
        let a = &alerts[0];
        assert_eq!(a.evidence["tier"], "medium");
        assert!((15..=60).contains(&a.severity), "severity {}", a.severity);
    }

    #[test]
    fn teleport_t2_long_gap() {
        // 2000 s gap, ~80 km displacement: > 20 m per gap-second
        let p1 = pt("200000003", 0, 0.0, 10.0, None, None, None);
        let p2 = pt("200000003", 2000, 0.0, 10.72, None, None, None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert_eq!(rules_fired(&alerts), vec![RuleType::TeleportT2]);
        assert_eq!(alerts[0].evidence["tier"], "long_gap");
    }

    #[test]
    fn position_invalid_out_of_bounds_without_prev() {
        let p = pt("200000004", 0, 95.0, 0.0, None, None, None);
        let alerts = evaluate(&cfg(), None, &p);
        assert_eq!(rules_fired(&alerts), vec![RuleType::PositionInvalid]);
        assert_eq!(alerts[0].severity, 75);
        assert_eq!(alerts[0].evidence["reason"], "out_of_bounds");
    }

    #[test]
    fn position_invalid_null_island() {
        let p = pt("200000004", 0, 0.0004, -0.0007, Some(3.0), None, None);
        let alerts = evaluate(&cfg(), None, &p);
        assert_eq!(alerts[0].evidence["reason"], "null_island");
        assert_eq!(alerts[0].severity, 75);
    }

    #[test]
    fn position_invalid_stuck_while_moving() {
        let p1 = pt("200000005", 0, 40.0, -70.0, Some(8.0), None, None);
        let p2 = pt("200000005", 120, 40.0, -70.0, Some(8.0), None, None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert_eq!(rules_fired(&alerts), vec![RuleType::PositionInvalid]);
        assert_eq!(alerts[0].severity, 70);
        assert_eq!(alerts[0].evidence["reason"], "stuck");
    }

    #[test]
    fn stuck_needs_speed_and_time() {
        // Drifting (sog < 1): staying put is fine
        let p1 = pt("200000005", 0, 40.0, -70.0, Some(0.2), None, None);
        let p2 = pt("200000005", 120, 40.0, -70.0, Some(0.2), None, None);
        assert!(evaluate(&cfg(), Some(&p1), &p2).is_empty());
        // Too soon to call it stuck
        let p1 = pt("200000005", 0, 40.0, -70.0, Some(8.0), None, None);
        let p2 = pt("200000005", 30, 40.0, -70.0, Some(8.0), None, None);
        assert!(evaluate(&cfg(), Some(&p1), &p2).is_empty());
    }

    #[test]
    fn turn_rate_fires_on_hard_turn() {
        // 60 degrees in 10 s at 25 kn: 6 deg/s
        let p1 = pt("300000001", 0, 40.0, -70.0, Some(25.0), Some(0.0), Some(0.0));
        let p2 = pt("300000001", 10, 40.001, -70.0, Some(25.0), Some(60.0), Some(60.0));
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        let turn = alerts
            .iter()
            .find(|a| a.rule_type == RuleType::TurnRate)
            .expect("turn rate should fire");
        assert!(turn.severity >= 80, "severity {}", turn.severity);
        assert_eq!(turn.evidence["angle_type"], "heading");
        assert!(!rules_fired(&alerts).contains(&RuleType::TurnRateT2));
    }

    #[test]
    fn turn_rate_falls_back_to_cog() {
        let p1 = pt("300000001", 0, 40.0, -70.0, Some(25.0), Some(0.0), None);
        let p2 = pt("300000001", 10, 40.001, -70.0, Some(25.0), Some(60.0), None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        let turn = alerts.iter().find(|a| a.rule_type == RuleType::TurnRate).unwrap();
        assert_eq!(turn.evidence["angle_type"], "cog");
    }

    #[test]
    fn turn_rate_skips_without_a_shared_channel() {
        let p1 = pt("300000001", 0, 40.0, -70.0, Some(25.0), None, Some(0.0));
        let p2 = pt("300000001", 10, 40.001, -70.0, Some(25.0), Some(60.0), None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert!(!rules_fired(&alerts).contains(&RuleType::TurnRate));
        assert!(!rules_fired(&alerts).contains(&RuleType::TurnRateT2));
    }

    #[test]
    fn turn_rate_t2_low_speed_tier() {
        // 2 deg/s at 7 kn: below both tier-1 gates, inside tier 2
        let p1 = pt("300000002", 0, 40.0, -70.0, Some(7.0), None, Some(0.0));
        let p2 = pt("300000002", 10, 40.0002, -70.0, Some(7.0), None, Some(20.0));
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert_eq!(rules_fired(&alerts), vec![RuleType::TurnRateT2]);
        let a = &alerts[0];
        assert_eq!(a.evidence["tier"], "low_speed");
        assert!((25..=55).contains(&a.severity));
    }

    #[test]
    fn acceleration_on_reported_vs_implied_mismatch() {
        // Same position, sog jumps 5 → 50 kn in 10 s
        let p1 = pt("400000001", 0, 40.0, -70.0, Some(5.0), None, None);
        let p2 = pt("400000001", 10, 40.0, -70.0, Some(50.0), None, None);
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        let acc = alerts
            .iter()
            .find(|a| a.rule_type == RuleType::Acceleration)
            .expect("acceleration should fire");
        assert_eq!(acc.evidence["difference_kn"].as_f64().unwrap(), 50.0);
        assert_eq!(acc.evidence["accel_knots_per_sec"].as_f64().unwrap(), 4.5);
        assert_eq!(acc.severity, 70);
    }

    #[test]
    fn acceleration_needs_both_sog_values_and_window() {
        let p1 = pt("400000001", 0, 40.0, -70.0, None, None, None);
        let p2 = pt("400000001", 10, 40.0, -70.0, Some(50.0), None, None);
        assert!(evaluate(&cfg(), Some(&p1), &p2).is_empty());
        // dt = 1 s is outside the (1, 300] window
        let p1 = pt("400000001", 0, 40.0, -70.0, Some(5.0), None, None);
        let p2 = pt("400000001", 1, 40.0, -70.0, Some(50.0), None, None);
        assert!(evaluate(&cfg(), Some(&p1), &p2).is_empty());
    }

    #[test]
    fn heading_cog_split_fires() {
        // Heading 180 against course 0 at 20 kn, pair 5 s apart
        let p1 = pt("500000001", 0, 40.0, -70.0, Some(20.0), Some(358.0), Some(178.0));
        let p2 = pt("500000001", 5, 40.0005, -70.0, Some(20.0), Some(0.0), Some(180.0));
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        let hc = alerts
            .iter()
            .find(|a| a.rule_type == RuleType::HeadingCogConsistency)
            .expect("heading/cog split should fire");
        assert_eq!(hc.evidence["angle_change_deg"].as_f64().unwrap(), 180.0);
        assert!(hc.evidence["turn_rate_deg_s"].as_f64().unwrap() >= 2.0);
        assert_eq!(hc.evidence["angle_type"], "heading_vs_cog");
        assert_eq!(hc.severity, 85);
    }

    #[test]
    fn heading_cog_quiet_when_slow() {
        let p1 = pt("500000001", 0, 40.0, -70.0, Some(4.0), Some(358.0), Some(178.0));
        let p2 = pt("500000001", 5, 40.0, -70.0, Some(4.0), Some(0.0), Some(180.0));
        let alerts = evaluate(&cfg(), Some(&p1), &p2);
        assert!(!rules_fired(&alerts).contains(&RuleType::HeadingCogConsistency));
    }

    #[test]
    fn simultaneous_pair_disables_all_pairwise_rules() {
        let p1 = pt("600000001", 0, 40.0, -70.0, Some(12.0), Some(90.0), Some(90.0));
        let p2 = pt("600000001", 0, 41.0, -70.0, Some(50.0), Some(180.0), Some(180.0));
        assert!(evaluate(&cfg(), Some(&p1), &p2).is_empty());
    }

    #[test]
    fn first_point_of_a_clean_vessel_is_quiet() {
        let p = pt("600000002", 0, 40.0, -70.0, Some(12.0), Some(90.0), Some(90.0));
        assert!(evaluate(&cfg(), None, &p).is_empty());
    }

    #[test]
    fn multiple_rules_can_fire_on_one_point() {
        // A teleport whose reported sog also disagrees wildly with implied
        let p1 = pt("600000003", 0, 40.0, -70.0, Some(10.0), Some(90.0), Some(90.0));
        let p2 = pt("600000003", 60, 40.0, -68.0, Some(10.0), Some(90.0), Some(90.0));
        let fired = rules_fired(&evaluate(&cfg(), Some(&p1), &p2));
        assert!(fired.contains(&RuleType::Teleport));
        assert!(fired.contains(&RuleType::Acceleration));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let p1 = pt("600000004", 0, 40.0, -70.0, Some(25.0), Some(0.0), Some(0.0));
        let p2 = pt("600000004", 10, 40.5, -70.0, Some(25.0), Some(60.0), Some(60.0));
        let a = evaluate(&cfg(), Some(&p1), &p2);
        let b = evaluate(&cfg(), Some(&p1), &p2);
        assert_eq!(a, b);
    }
}
