// Timeouts, topics, geometry and motor configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::hardware::{Corner, JointId, JointKind};

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Odometry publish rate (Hz), never faster than the loop
pub const PUBLISH_RATE: f64 = 50.0;

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // velocity commands
pub const TOPIC_RECONFIGURE: &str = "swerve/cmd/reconfigure"; // dynamic parameters
pub const TOPIC_ODOM: &str = "swerve/state/odom"; // pose + velocity
pub const TOPIC_TF: &str = "swerve/tf"; // odom -> base transform
pub const TOPIC_WHEELS: &str = "swerve/rt/wheels"; // per-wheel targets
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for Feetech motor controller
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

/// Error types for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Invalid parameter {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Static robot dimensions, immutable once the controller is built
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParams {
    /// Distance between left and right steering axes (m)
    pub track: f64,
    /// Lateral distance between a steering axis and its wheel contact point (m)
    pub wheel_steering_offset: f64,
    pub wheel_radius: f64,
    /// Distance between front and rear axles (m)
    pub wheel_base: f64,
    pub min_steering_angle: f64,
    pub max_steering_angle: f64,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            track: 0.5,
            wheel_steering_offset: 0.0,
            wheel_radius: 0.1,
            wheel_base: 0.5,
            min_steering_angle: -1.57,
            max_steering_angle: 1.57,
        }
    }
}

impl GeometryParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wheel_radius > 0.0) {
            return Err(ConfigError::Geometry(format!(
                "wheel_radius must be positive, got {}",
                self.wheel_radius
            )));
        }
        if !(self.track > 0.0) || !(self.wheel_base > 0.0) {
            return Err(ConfigError::Geometry(format!(
                "track and wheel_base must be positive, got {} and {}",
                self.track, self.wheel_base
            )));
        }
        if self.wheel_steering_offset < 0.0 || self.wheel_steering_offset >= self.track / 2.0 {
            return Err(ConfigError::Geometry(format!(
                "wheel_steering_offset must lie in [0, track/2), got {}",
                self.wheel_steering_offset
            )));
        }
        if !(self.min_steering_angle < self.max_steering_angle) {
            return Err(ConfigError::Geometry(format!(
                "min_steering_angle ({}) must be below max_steering_angle ({})",
                self.min_steering_angle, self.max_steering_angle
            )));
        }
        Ok(())
    }

    /// Lateral lever arm between the body centre and a wheel contact point
    pub fn half_steering_track(&self) -> f64 {
        self.track / 2.0 - self.wheel_steering_offset
    }

    /// Contact point of a wheel in the body frame (x forward, y left)
    pub fn wheel_position(&self, corner: Corner) -> (f64, f64) {
        let x = self.wheel_base / 2.0;
        let y = self.half_steering_track();
        match corner {
            Corner::FrontLeft => (x, y),
            Corner::FrontRight => (x, -y),
            Corner::RearLeft => (-x, y),
            Corner::RearRight => (-x, -y),
        }
    }
}

/// Symmetric-by-default bound pair; `min` falls back to `-max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<f64>,
    pub max: f64,
}

impl Bounds {
    pub fn symmetric(max: f64) -> Self {
        Self { min: None, max }
    }

    pub fn lower(&self) -> f64 {
        self.min.unwrap_or(-self.max)
    }

    pub fn upper(&self) -> f64 {
        self.max
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !(self.lower() <= self.upper()) {
            return Err(ConfigError::Invalid {
                name,
                reason: format!("min {} exceeds max {}", self.lower(), self.upper()),
            });
        }
        Ok(())
    }
}

/// Velocity / acceleration / jerk bounds for one command channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub velocity: Option<Bounds>,
    pub acceleration: Option<Bounds>,
    pub jerk: Option<Bounds>,
}

impl LimiterConfig {
    pub fn validate(&self, channel: &'static str) -> Result<(), ConfigError> {
        if let Some(b) = &self.velocity {
            b.validate(channel)?;
        }
        // A zero-width acceleration window would freeze the channel forever
        for b in [&self.acceleration, &self.jerk].into_iter().flatten() {
            b.validate(channel)?;
            if !(b.lower() <= 0.0 && b.upper() >= 0.0) {
                return Err(ConfigError::Invalid {
                    name: channel,
                    reason: "rate bounds must bracket zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Everything the control core needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub geometry: GeometryParams,
    pub loop_hz: u64,
    /// Seconds without a command before braking
    pub cmd_vel_timeout: f64,
    pub publish_rate: f64,
    pub velocity_rolling_window_size: usize,
    pub angle_threshold: f64,
    pub enable_odom_broadcast: bool,
    pub debug_single_wheel: bool,
    pub base_frame_id: String,
    pub odom_frame_id: String,
    pub linear: LimiterConfig,
    pub angular: LimiterConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryParams::default(),
            loop_hz: LOOP_HZ,
            cmd_vel_timeout: CMD_TIMEOUT.as_secs_f64(),
            publish_rate: PUBLISH_RATE,
            velocity_rolling_window_size: 10,
            angle_threshold: 0.5,
            enable_odom_broadcast: true,
            debug_single_wheel: false,
            base_frame_id: "base_link".to_string(),
            odom_frame_id: "odom".to_string(),
            linear: LimiterConfig::default(),
            angular: LimiterConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()?;
        if self.loop_hz == 0 {
            return Err(ConfigError::Invalid {
                name: "loop_hz",
                reason: "must be non-zero".to_string(),
            });
        }
        if !(self.cmd_vel_timeout > 0.0) {
            return Err(ConfigError::Invalid {
                name: "cmd_vel_timeout",
                reason: format!("must be positive, got {}", self.cmd_vel_timeout),
            });
        }
        if !(self.publish_rate > 0.0) {
            return Err(ConfigError::Invalid {
                name: "publish_rate",
                reason: format!("must be positive, got {}", self.publish_rate),
            });
        }
        if self.velocity_rolling_window_size == 0 {
            return Err(ConfigError::Invalid {
                name: "velocity_rolling_window_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.angle_threshold > 0.0) {
            return Err(ConfigError::Invalid {
                name: "angle_threshold",
                reason: format!("must be positive, got {}", self.angle_threshold),
            });
        }
        self.linear.validate("linear")?;
        self.angular.validate("angular")?;
        Ok(())
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz as f64)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.cmd_vel_timeout)
    }

    /// Publish period, never shorter than one control cycle
    pub fn publish_period(&self) -> Duration {
        let rate = self.publish_rate.min(self.loop_hz as f64);
        Duration::from_secs_f64(1.0 / rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub cmd: String,
    pub reconfigure: String,
    pub odom: String,
    pub tf: String,
    pub wheels: String,
    pub health: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            cmd: TOPIC_CMD_BASE.to_string(),
            reconfigure: TOPIC_RECONFIGURE.to_string(),
            odom: TOPIC_ODOM.to_string(),
            tf: TOPIC_TF.to_string(),
            wheels: TOPIC_WHEELS.to_string(),
            health: TOPIC_HEALTH.to_string(),
        }
    }
}

/// Motor IDs on the Feetech bus, one optional entry per joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorIds {
    pub front_left_wheel: Option<u8>,
    pub front_right_wheel: Option<u8>,
    pub rear_left_wheel: Option<u8>,
    pub rear_right_wheel: Option<u8>,
    pub front_left_steering: Option<u8>,
    pub front_right_steering: Option<u8>,
    pub rear_left_steering: Option<u8>,
    pub rear_right_steering: Option<u8>,
}

impl Default for MotorIds {
    fn default() -> Self {
        Self {
            front_left_wheel: Some(1),
            front_right_wheel: Some(2),
            rear_left_wheel: Some(3),
            rear_right_wheel: Some(4),
            front_left_steering: Some(5),
            front_right_steering: Some(6),
            rear_left_steering: Some(7),
            rear_right_steering: Some(8),
        }
    }
}

impl MotorIds {
    pub fn get(&self, joint: JointId) -> Option<u8> {
        match (joint.corner, joint.kind) {
            (Corner::FrontLeft, JointKind::Wheel) => self.front_left_wheel,
            (Corner::FrontRight, JointKind::Wheel) => self.front_right_wheel,
            (Corner::RearLeft, JointKind::Wheel) => self.rear_left_wheel,
            (Corner::RearRight, JointKind::Wheel) => self.rear_right_wheel,
            (Corner::FrontLeft, JointKind::Steering) => self.front_left_steering,
            (Corner::FrontRight, JointKind::Steering) => self.front_right_steering,
            (Corner::RearLeft, JointKind::Steering) => self.rear_left_steering,
            (Corner::RearRight, JointKind::Steering) => self.rear_right_steering,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub port: String,
    pub enabled: bool,
    pub ids: MotorIds,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            enabled: MOTOR_ENABLED,
            ids: MotorIds::default(),
        }
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub topics: TopicConfig,
    pub motors: MotorConfig,
}

impl RuntimeConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.controller.validate()?;
        Ok(config)
    }
}
