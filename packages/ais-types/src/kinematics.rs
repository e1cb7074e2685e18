//! Pure kinematic derivations over pairs of position reports.
//!
//! Every function here is total, deterministic and side-effect-free: the same
//! inputs always produce bitwise-identical outputs, and an undefined quantity
//! comes back as `None` instead of NaN/Inf. The detection rules depend on
//! that; a non-finite number must never reach severity scoring or storage.

use crate::AisPoint;

/// WGS-84 mean radius, meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Knots per meter-per-second.
pub const KNOTS_PER_MPS: f64 = 1.943_844_5;

/// Seconds from `p` to `q`; negative when the pair is out of order.
pub fn dt_sec(p: &AisPoint, q: &AisPoint) -> f64 {
    (q.timestamp - p.timestamp).num_milliseconds() as f64 / 1000.0
}

/// Great-circle distance between two fixes (haversine), meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Great-circle distance between two reports, meters.
pub fn distance_m(p: &AisPoint, q: &AisPoint) -> f64 {
    haversine_m(p.lat, p.lon, q.lat, q.lon)
}

/// Speed implied by displacement over elapsed time, knots.
/// Undefined (`None`) when the pair is simultaneous or out of order.
pub fn implied_speed_kn(p: &AisPoint, q: &AisPoint) -> Option<f64> {
    let dt = dt_sec(p, q);
    if dt <= 0.0 {
        return None;
    }
    let kn = distance_m(p, q) / dt * KNOTS_PER_MPS;
    kn.is_finite().then_some(kn)
}

/// Smallest signed difference from `a` to `b` modulo 360, in [-180, 180].
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let d = (b - a).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Magnitude of angular change per second, degrees/s.
/// Undefined (`None`) when `dt` is non-positive.
pub fn turn_rate_deg_s(a: f64, b: f64, dt: f64) -> Option<f64> {
    if dt <= 0.0 {
        return None;
    }
    let rate = angle_diff_deg(a, b).abs() / dt;
    rate.is_finite().then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pt(secs: i64, lat: f64, lon: f64) -> AisPoint {
        AisPoint {
            mmsi: "200000001".to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            lat,
            lon,
            sog: None,
            cog: None,
            heading: None,
        }
    }

    #[test]
    fn dt_is_signed() {
        let a = pt(0, 0.0, 0.0);
        let b = pt(60, 0.0, 0.0);
        assert_eq!(dt_sec(&a, &b), 60.0);
        assert_eq!(dt_sec(&b, &a), -60.0);
    }

    #[test]
    fn haversine_known_distances() {
        // One degree of latitude along a meridian ≈ 111.19 km on the mean sphere
        let d = haversine_m(40.0, -70.0, 41.0, -70.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");

        // One degree of longitude at the equator is the same arc
        let d = haversine_m(0.0, 10.0, 0.0, 11.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");

        // Coincident fixes
        assert_eq!(haversine_m(55.5, 12.5, 55.5, 12.5), 0.0);
    }

    #[test]
    fn implied_speed_teleport_magnitude() {
        // Two degrees of longitude at 40°N in one minute is thousands of knots
        let a = pt(0, 40.0, -70.0);
        let b = pt(60, 40.0, -68.0);
        let kn = implied_speed_kn(&a, &b).unwrap();
        assert!(kn > 5_000.0, "got {kn}");
    }

    #[test]
    fn implied_speed_undefined_without_forward_time() {
        let a = pt(0, 40.0, -70.0);
        let b = pt(0, 40.0, -68.0);
        assert_eq!(implied_speed_kn(&a, &b), None);
        let c = pt(-10, 40.0, -68.0);
        assert_eq!(implied_speed_kn(&a, &c), None);
    }

    #[test]
    fn angle_diff_wraps_and_signs() {
        assert_eq!(angle_diff_deg(350.0, 10.0), 20.0);
        assert_eq!(angle_diff_deg(10.0, 350.0), -20.0);
        assert_eq!(angle_diff_deg(0.0, 180.0), 180.0);
        assert_eq!(angle_diff_deg(180.0, 0.0), -180.0);
        assert_eq!(angle_diff_deg(90.0, 90.0), 0.0);
        assert_eq!(angle_diff_deg(-10.0, 10.0), 20.0);
    }

    #[test]
    fn turn_rate_guards_dt() {
        assert_eq!(turn_rate_deg_s(0.0, 60.0, 10.0), Some(6.0));
        assert_eq!(turn_rate_deg_s(0.0, 60.0, 0.0), None);
        assert_eq!(turn_rate_deg_s(0.0, 60.0, -5.0), None);
    }

    #[test]
    fn derivations_are_pure() {
        let a = pt(0, 40.0, -70.0);
        let b = pt(60, 40.5, -69.5);
        for _ in 0..3 {
            assert_eq!(distance_m(&a, &b).to_bits(), distance_m(&a, &b).to_bits());
            assert_eq!(
                implied_speed_kn(&a, &b).map(f64::to_bits),
                implied_speed_kn(&a, &b).map(f64::to_bits)
            );
        }
    }
}
