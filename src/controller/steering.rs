// Steering target resolution: minimize-turn then clip to the joint range

use std::f64::consts::{PI, TAU};

/// Below this the wheel is considered already on target
pub const ANGLE_EPSILON: f64 = 1e-6;

/// Wrap an angle to (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Signed shortest rotation from `from` to `to`
pub fn shortest_rotation(from: f64, to: f64) -> f64 {
    normalize_angle(to - from)
}

/// Outcome of resolving one wheel's steering target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteerResolution {
    /// Target written to the steering joint, always inside the range
    pub angle: f64,
    /// Target before clipping, used to measure how far off the wheel is
    pub unclipped_angle: f64,
    /// Wheel speed, sign-flipped when `inverted`
    pub speed: f64,
    pub inverted: bool,
    pub clipped: bool,
}

/// Clip overshoot tolerated by [`resolve`] before the other route is taken
pub const DEFAULT_CLIP_TOLERANCE: f64 = 0.5;

/// Pick the cheaper of `raw_angle` and its opposite (with the wheel spun
/// backwards), expressed relative to `current_angle` so continuous joints
/// never unwind, then clamp into `[min_angle, max_angle]`.
pub fn resolve(
    raw_angle: f64,
    current_angle: f64,
    speed: f64,
    min_angle: f64,
    max_angle: f64,
) -> SteerResolution {
    resolve_within(
        raw_angle,
        current_angle,
        speed,
        min_angle,
        max_angle,
        DEFAULT_CLIP_TOLERANCE,
    )
}

/// Like [`resolve`], but when the shorter route would be clamped more than
/// `clip_tolerance` short of its heading, the other route is used instead
/// if it ends closer to the range. A wheel parked at a limit can then always
/// turn back towards a reachable heading.
pub fn resolve_within(
    raw_angle: f64,
    current_angle: f64,
    speed: f64,
    min_angle: f64,
    max_angle: f64,
    clip_tolerance: f64,
) -> SteerResolution {
    let direct = shortest_rotation(current_angle, raw_angle);

    let (delta, inverted) = if direct.abs() < ANGLE_EPSILON {
        (0.0, false)
    } else {
        let opposite = shortest_rotation(current_angle, raw_angle + PI);
        // Ties keep the current spin direction
        let (preferred, fallback) = if opposite.abs() + ANGLE_EPSILON < direct.abs() {
            ((opposite, true), (direct, false))
        } else {
            ((direct, false), (opposite, true))
        };

        let overshoot = |(delta, _): (f64, bool)| {
            clip_overshoot(current_angle + delta, min_angle, max_angle)
        };
        if overshoot(preferred) > clip_tolerance && overshoot(fallback) < overshoot(preferred) {
            fallback
        } else {
            preferred
        }
    };

    let unclipped_angle = current_angle + delta;
    let (angle, clipped) = clip_steering_angle(unclipped_angle, min_angle, max_angle);

    SteerResolution {
        angle,
        unclipped_angle,
        speed: if inverted { -speed } else { speed },
        inverted,
        clipped,
    }
}

/// Distance from `angle` to the range, zero inside it
fn clip_overshoot(angle: f64, min_angle: f64, max_angle: f64) -> f64 {
    (min_angle - angle).max(angle - max_angle).max(0.0)
}

/// Clamp to the reachable range, reporting whether clamping happened
pub fn clip_steering_angle(angle: f64, min_angle: f64, max_angle: f64) -> (f64, bool) {
    if angle > max_angle {
        (max_angle, true)
    } else if angle < min_angle {
        (min_angle, true)
    } else {
        (angle, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    const MIN: f64 = -1.57;
    const MAX: f64 = 1.57;

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * FRAC_PI_2) - FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(0.3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_small_turn_keeps_direction() {
        let r = resolve(0.4, 0.1, 2.0, MIN, MAX);
        assert!((r.angle - 0.4).abs() < 1e-12);
        assert_eq!(r.speed, 2.0);
        assert!(!r.inverted);
        assert!(!r.clipped);
    }

    #[test]
    fn test_wrap_and_invert_instead_of_long_rotation() {
        // Direct route would be 3.0 rad; the opposite heading is 0.14 rad away
        let r = resolve(-1.5, 1.5, 3.0, MIN, MAX);
        assert!(r.inverted);
        assert_eq!(r.speed, -3.0);
        assert!((r.unclipped_angle - (PI - 1.5)).abs() < 1e-12);
        assert!((r.unclipped_angle - 1.5).abs() < 0.2);
        // Opposite heading sits just past the limit
        assert!(r.clipped);
        assert_eq!(r.angle, MAX);
    }

    #[test]
    fn test_folds_back_from_limit_when_flip_is_unreachable() {
        // Parked at the upper limit, heading -0.5: the flipped route ends at
        // 2.64, far outside, so the wheel turns back without inverting
        let r = resolve(-0.5, MAX, 1.0, MIN, MAX);
        assert!(!r.inverted);
        assert!(!r.clipped);
        assert!((r.angle + 0.5).abs() < 1e-12);
        assert_eq!(r.speed, 1.0);
    }

    #[test]
    fn test_tolerance_decides_between_clip_and_fold_back() {
        // Flipped route overshoots MAX by ~0.07
        let loose = resolve_within(-1.5, 1.5, 1.0, MIN, MAX, 0.1);
        assert!(loose.inverted && loose.clipped);

        let strict = resolve_within(-1.5, 1.5, 1.0, MIN, MAX, 0.01);
        assert!(!strict.inverted && !strict.clipped);
        assert!((strict.angle + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_unreachable_both_ways_clamps_nearest() {
        let r = resolve_within(0.0, 0.6, 1.0, 0.5, 0.7, 0.0);
        // Direct ends 0.5 short of the range, opposite 2.44 past it
        assert!(r.clipped);
        assert!(!r.inverted);
        assert_eq!(r.angle, 0.5);
    }

    #[test]
    fn test_reverse_heading_inverts_speed() {
        let r = resolve(PI, 0.0, 1.0, MIN, MAX);
        assert!(r.inverted);
        assert!(r.angle.abs() < 1e-12);
        assert_eq!(r.speed, -1.0);
    }

    #[test]
    fn test_equal_angles_no_wrap_decision() {
        let r = resolve(0.7 + 1e-9, 0.7, 1.0, MIN, MAX);
        assert_eq!(r.angle, 0.7);
        assert!(!r.inverted);
        assert_eq!(r.speed, 1.0);
    }

    #[test]
    fn test_clip_to_nearest_bound() {
        assert_eq!(clip_steering_angle(2.0, MIN, MAX), (MAX, true));
        assert_eq!(clip_steering_angle(-2.0, MIN, MAX), (MIN, true));
        assert_eq!(clip_steering_angle(0.5, MIN, MAX), (0.5, false));
    }

    #[test]
    fn test_continuous_joint_does_not_unwind() {
        // A joint already wound past 2pi keeps turning from where it is
        let current = 2.0 * TAU + 0.1;
        let r = resolve(0.2, current, 1.0, f64::NEG_INFINITY, f64::INFINITY);
        assert!((r.angle - (current + 0.1)).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_target_within_range(
            raw in -10.0f64..10.0,
            current in MIN..MAX,
            speed in -5.0f64..5.0,
        ) {
            let r = resolve(raw, current, speed, MIN, MAX);
            prop_assert!(r.angle >= MIN && r.angle <= MAX);
            let out_of_range = r.unclipped_angle < MIN || r.unclipped_angle > MAX;
            prop_assert_eq!(out_of_range, r.clipped);
        }

        #[test]
        fn prop_rotation_at_most_quarter_turn(
            raw in -10.0f64..10.0,
            current in -PI..PI,
        ) {
            let r = resolve(raw, current, 1.0, f64::NEG_INFINITY, f64::INFINITY);
            prop_assert!((r.angle - current).abs() <= FRAC_PI_2 + ANGLE_EPSILON);
        }

        #[test]
        fn prop_half_turn_range_never_parks_off_heading(
            raw in -10.0f64..10.0,
            current in MIN..MAX,
            tolerance in 0.01f64..1.0,
        ) {
            // [-1.57, 1.57] holds one of the two headings for any raw angle,
            // give or take the 0.0008 rad missing from a half turn
            let r = resolve_within(raw, current, 1.0, MIN, MAX, tolerance);
            prop_assert!((r.unclipped_angle - r.angle).abs() <= tolerance.max(1e-3));
        }

        #[test]
        fn prop_resolution_points_wheel_along_raw_heading(
            raw in -PI..PI,
            current in -1.5f64..1.5,
        ) {
            let r = resolve(raw, current, 1.0, f64::NEG_INFINITY, f64::INFINITY);
            // Same physical velocity vector either way
            let (vx, vy) = (r.speed * r.angle.cos(), r.speed * r.angle.sin());
            prop_assert!((vx - raw.cos()).abs() < 1e-6);
            prop_assert!((vy - raw.sin()).abs() < 1e-6);
        }
    }
}
