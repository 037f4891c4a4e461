// Swerve inverse kinematics for a four-module base
// Converts body-frame velocities (x, y, theta) to per-wheel speed and heading,
// and back again for odometry.

use crate::config::GeometryParams;
use crate::controller::hardware::Corner;

/// Wheels slower than this (m/s at the contact point) keep their heading
pub const MIN_WHEEL_SPEED: f64 = 1e-6;

/// Body-frame velocity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVelocity {
    /// Forward velocity in m/s (positive = forward)
    pub lin_x: f64,
    /// Lateral velocity in m/s (positive = left)
    pub lin_y: f64,
    /// Rotational velocity in rad/s (positive = counter-clockwise)
    pub ang: f64,
}

impl BodyVelocity {
    pub fn new(lin_x: f64, lin_y: f64, ang: f64) -> Self {
        Self { lin_x, lin_y, ang }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Unresolved wheel command straight out of the kinematics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawWheelCommand {
    /// Wheel rotation speed (rad/s), never negative
    pub speed: f64,
    /// Heading of the wheel velocity; `None` when the wheel is at rest and
    /// should hold whatever angle it already has
    pub angle: Option<f64>,
}

/// Inverse kinematics: each wheel moves with v + w x r_wheel
pub fn solve(twist: &BodyVelocity, geometry: &GeometryParams, wheel_radius: f64) -> [RawWheelCommand; 4] {
    Corner::ALL.map(|corner| {
        let (x, y) = geometry.wheel_position(corner);
        let vx = twist.lin_x - twist.ang * y;
        let vy = twist.lin_y + twist.ang * x;
        let linear = vx.hypot(vy);

        if linear < MIN_WHEEL_SPEED {
            RawWheelCommand {
                speed: 0.0,
                angle: None,
            }
        } else {
            RawWheelCommand {
                speed: linear / wheel_radius,
                angle: Some(vy.atan2(vx)),
            }
        }
    })
}

/// Measured state of one module
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelFeedback {
    /// Wheel rotation speed (rad/s, signed)
    pub speed: f64,
    /// Steering angle (rad)
    pub angle: f64,
}

impl WheelFeedback {
    /// Contact-point velocity in the body frame
    pub fn velocity(&self, wheel_radius: f64) -> (f64, f64) {
        let linear = self.speed * wheel_radius;
        (linear * self.angle.cos(), linear * self.angle.sin())
    }
}

/// Forward kinematics: least-squares body velocity from four measured modules
pub fn body_velocity(
    feedback: &[WheelFeedback; 4],
    geometry: &GeometryParams,
    wheel_radius: f64,
) -> BodyVelocity {
    let mut sum_vx = 0.0;
    let mut sum_vy = 0.0;
    let mut moment = 0.0;
    let mut inertia = 0.0;

    for corner in Corner::ALL {
        let (x, y) = geometry.wheel_position(corner);
        let (vx, vy) = feedback[corner.index()].velocity(wheel_radius);
        sum_vx += vx;
        sum_vy += vy;
        moment += x * vy - y * vx;
        inertia += x * x + y * y;
    }

    BodyVelocity {
        lin_x: sum_vx / 4.0,
        lin_y: sum_vy / 4.0,
        ang: if inertia > 0.0 { moment / inertia } else { 0.0 },
    }
}

/// Forward kinematics from left/right-averaged front and rear modules
/// (bicycle model along the centre line)
pub fn body_velocity_from_pair(
    front: &WheelFeedback,
    rear: &WheelFeedback,
    geometry: &GeometryParams,
    wheel_radius: f64,
) -> BodyVelocity {
    let (fx, fy) = front.velocity(wheel_radius);
    let (rx, ry) = rear.velocity(wheel_radius);

    BodyVelocity {
        lin_x: (fx + rx) / 2.0,
        lin_y: (fy + ry) / 2.0,
        ang: (fy - ry) / geometry.wheel_base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry() -> GeometryParams {
        GeometryParams {
            track: 0.5,
            wheel_steering_offset: 0.0,
            wheel_radius: 0.1,
            wheel_base: 0.5,
            min_steering_angle: -1.57,
            max_steering_angle: 1.57,
        }
    }

    #[test]
    fn test_zero_velocity_holds_heading() {
        let wheels = solve(&BodyVelocity::zero(), &geometry(), 0.1);
        for wheel in wheels {
            assert_eq!(wheel.speed, 0.0);
            assert_eq!(wheel.angle, None);
        }
    }

    #[test]
    fn test_forward_motion() {
        let wheels = solve(&BodyVelocity::new(1.0, 0.0, 0.0), &geometry(), 0.1);
        for wheel in wheels {
            assert!((wheel.speed - 10.0).abs() < 1e-9);
            assert_eq!(wheel.angle, Some(0.0));
        }
    }

    #[test]
    fn test_rotation_in_place_is_tangential() {
        let g = geometry();
        let wheels = solve(&BodyVelocity::new(0.0, 0.0, 1.0), &g, 0.1);
        let expected_speed = (0.25f64).hypot(0.25) / 0.1;
        for corner in Corner::ALL {
            let wheel = wheels[corner.index()];
            let (x, y) = g.wheel_position(corner);
            let angle = wheel.angle.unwrap();
            assert!((wheel.speed - expected_speed).abs() < 1e-9);
            // Wheel velocity is perpendicular to its lever arm
            assert!((angle.cos() * x + angle.sin() * y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_steering_offset_shortens_lever_arm() {
        let g = GeometryParams {
            wheel_steering_offset: 0.05,
            ..geometry()
        };
        assert!((g.half_steering_track() - 0.2).abs() < 1e-12);
        let (x, y) = g.wheel_position(Corner::RearRight);
        assert_eq!(x, -0.25);
        assert!((y + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_pair_model_matches_full_model_for_straight_motion() {
        let g = geometry();
        let wheel = WheelFeedback { speed: 5.0, angle: 0.3 };
        let full = body_velocity(&[wheel; 4], &g, 0.1);
        let pair = body_velocity_from_pair(&wheel, &wheel, &g, 0.1);
        assert!((full.lin_x - pair.lin_x).abs() < 1e-12);
        assert!((full.lin_y - pair.lin_y).abs() < 1e-12);
        assert!(full.ang.abs() < 1e-12 && pair.ang.abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_straight_line_angles_match_direction(
            lin_x in -3.0f64..3.0,
            lin_y in -3.0f64..3.0,
        ) {
            prop_assume!(lin_x.hypot(lin_y) > 1e-3);
            let wheels = solve(&BodyVelocity::new(lin_x, lin_y, 0.0), &geometry(), 0.1);
            let expected = lin_y.atan2(lin_x);
            for wheel in wheels {
                prop_assert!((wheel.angle.unwrap() - expected).abs() < 1e-12);
            }
        }

        #[test]
        fn prop_forward_inverts_inverse(
            lin_x in -2.0f64..2.0,
            lin_y in -2.0f64..2.0,
            ang in -3.0f64..3.0,
        ) {
            let g = geometry();
            let twist = BodyVelocity::new(lin_x, lin_y, ang);
            let feedback = solve(&twist, &g, 0.1).map(|w| WheelFeedback {
                speed: w.speed,
                angle: w.angle.unwrap_or(0.0),
            });
            let estimate = body_velocity(&feedback, &g, 0.1);
            prop_assert!((estimate.lin_x - lin_x).abs() < 1e-6);
            prop_assert!((estimate.lin_y - lin_y).abs() < 1e-6);
            prop_assert!((estimate.ang - ang).abs() < 1e-6);
        }
    }
}
