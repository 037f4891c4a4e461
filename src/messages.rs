// Wire messages exchanged with teleop/scripts and state consumers

use serde::{Deserialize, Serialize};

use crate::controller::hardware::Corner;
use crate::controller::odometry::OdometryState;
use crate::controller::{DynamicParams, LoopState, WheelTarget};

/// Velocity command from teleop/scripts -> runtime (m/s, rad/s, body frame)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct VelocityCommand {
    pub linear_x: f64,
    #[serde(default)]
    pub linear_y: f64,
    pub angular_z: f64,
}

impl VelocityCommand {
    /// Non-finite values would poison the limiter history
    pub fn is_finite(&self) -> bool {
        self.linear_x.is_finite() && self.linear_y.is_finite() && self.angular_z.is_finite()
    }
}

/// Dynamic parameter update; omitted fields keep their current value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ReconfigureRequest {
    pub angle_threshold: Option<f64>,
    pub enable_odom_broadcast: Option<bool>,
    pub wheel_radius: Option<f64>,
}

impl ReconfigureRequest {
    /// Overlay this request on the parameters currently in force
    pub fn apply_to(&self, current: DynamicParams) -> DynamicParams {
        DynamicParams {
            angle_threshold: self.angle_threshold.unwrap_or(current.angle_threshold),
            enable_odom_broadcast: self
                .enable_odom_broadcast
                .unwrap_or(current.enable_odom_broadcast),
            wheel_radius: self.wheel_radius.unwrap_or(current.wheel_radius),
        }
    }
}

/// Pose and velocity estimate published by runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OdometryMsg {
    pub frame_id: String,
    pub child_frame_id: String,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl OdometryMsg {
    pub fn new(odom: &OdometryState, frame_id: &str, child_frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            child_frame_id: child_frame_id.to_string(),
            x: odom.x,
            y: odom.y,
            heading: odom.heading,
            linear_x: odom.linear_x,
            linear_y: odom.linear_y,
            angular_z: odom.angular,
        }
    }
}

/// Planar odom -> base transform, rotation as a yaw-only quaternion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformMsg {
    pub frame_id: String,
    pub child_frame_id: String,
    pub translation: [f64; 3],
    /// x, y, z, w
    pub rotation: [f64; 4],
}

impl TransformMsg {
    pub fn new(odom: &OdometryState, frame_id: &str, child_frame_id: &str) -> Self {
        let half = odom.heading / 2.0;
        Self {
            frame_id: frame_id.to_string(),
            child_frame_id: child_frame_id.to_string(),
            translation: [odom.x, odom.y, 0.0],
            rotation: [0.0, 0.0, half.sin(), half.cos()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WheelStatus {
    pub wheel: String,
    pub speed: f64,
    pub steering_angle: f64,
    pub inverted: bool,
    pub clipped: bool,
}

/// Per-wheel targets of the last cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WheelStatusMsg {
    pub translation_suppressed: bool,
    pub wheels: Vec<WheelStatus>,
}

impl WheelStatusMsg {
    pub fn new(targets: &[WheelTarget; 4], translation_suppressed: bool) -> Self {
        let wheels = Corner::ALL
            .iter()
            .map(|corner| {
                let t = &targets[corner.index()];
                WheelStatus {
                    wheel: corner.name().to_string(),
                    speed: t.speed,
                    steering_angle: t.steering_angle,
                    inverted: t.direction_inverted,
                    clipped: t.clipped,
                }
            })
            .collect();
        Self {
            translation_suppressed,
            wheels,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Stopped,
}

impl From<LoopState> for RuntimeHealth {
    fn from(state: LoopState) -> Self {
        match state {
            LoopState::Running => RuntimeHealth::Ok,
            LoopState::Braking => RuntimeHealth::CmdStale,
            LoopState::Stopped => RuntimeHealth::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_parse_velocity_command() {
        let cmd: VelocityCommand =
            serde_json::from_str(r#"{"linear_x": 0.5, "linear_y": -0.1, "angular_z": 1.0}"#)
                .unwrap();
        assert_eq!(cmd.linear_x, 0.5);
        assert_eq!(cmd.linear_y, -0.1);
        assert_eq!(cmd.angular_z, 1.0);
        assert!(cmd.is_finite());
    }

    #[test]
    fn test_lateral_defaults_to_zero() {
        let cmd: VelocityCommand =
            serde_json::from_str(r#"{"linear_x": 0.2, "angular_z": 0.0}"#).unwrap();
        assert_eq!(cmd.linear_y, 0.0);
    }

    #[test]
    fn test_reject_malformed_command() {
        assert!(serde_json::from_str::<VelocityCommand>(r#"{"x_vel": 0.2}"#).is_err());
    }

    #[test]
    fn test_partial_reconfigure_keeps_other_fields() {
        let current = DynamicParams {
            angle_threshold: 0.5,
            enable_odom_broadcast: true,
            wheel_radius: 0.1,
        };
        let req: ReconfigureRequest = serde_json::from_str(r#"{"wheel_radius": 0.12}"#).unwrap();
        let next = req.apply_to(current);
        assert_eq!(next.wheel_radius, 0.12);
        assert_eq!(next.angle_threshold, 0.5);
        assert!(next.enable_odom_broadcast);
    }

    #[test]
    fn test_transform_rotation_is_yaw_quaternion() {
        let odom = OdometryState {
            x: 1.0,
            y: 2.0,
            heading: FRAC_PI_2,
            ..OdometryState::default()
        };
        let tf = TransformMsg::new(&odom, "odom", "base_link");
        assert_eq!(tf.translation, [1.0, 2.0, 0.0]);
        let [qx, qy, qz, qw] = tf.rotation;
        assert_eq!((qx, qy), (0.0, 0.0));
        assert!((qz - (FRAC_PI_2 / 2.0).sin()).abs() < 1e-12);
        assert!((qz * qz + qw * qw - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wheel_status_order_and_names() {
        let mut targets = [WheelTarget::default(); 4];
        targets[Corner::RearLeft.index()].clipped = true;
        let msg = WheelStatusMsg::new(&targets, false);
        let names: Vec<&str> = msg.wheels.iter().map(|w| w.wheel.as_str()).collect();
        assert_eq!(names, ["front_left", "front_right", "rear_left", "rear_right"]);
        assert!(msg.wheels[2].clipped);
    }

    #[test]
    fn test_health_serializes_snake_case() {
        let json = serde_json::to_string(&RuntimeHealth::from(LoopState::Braking)).unwrap();
        assert_eq!(json, r#""cmd_stale""#);
        assert_eq!(RuntimeHealth::from(LoopState::Running), RuntimeHealth::Ok);
    }
}
