// Swerve motion-control core
//
// Provides:
// - Speed limiting of the incoming twist
// - Swerve inverse kinematics with minimize-turn steering and range clipping
// - Rotate-before-translate sequencing
// - Wheel odometry
// - The fixed-period control loop tying them together

mod buffer;
pub mod hardware;
pub mod kinematics;
pub mod odometry;
pub mod sequencer;
pub mod speed_limiter;
pub mod steering;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use buffer::RealtimeBuffer;
use hardware::{BoundJoints, Corner, HardwareError, JointId, RobotHardware};
use kinematics::{BodyVelocity, WheelFeedback};
use odometry::{OdometryEstimator, OdometryState};
use speed_limiter::{ChannelHistory, SpeedLimiter};

use crate::config::{ConfigError, ControllerConfig};

/// Possible errors when building the controller
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No actuator handle for joint {0}")]
    MissingJoint(JointId),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// Desired body-frame velocity with its arrival time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist {
    /// `None` until the first command arrives
    pub stamp: Option<Instant>,
    pub lin_x: f64,
    pub lin_y: f64,
    pub ang: f64,
}

impl Twist {
    pub fn body_velocity(&self) -> BodyVelocity {
        BodyVelocity::new(self.lin_x, self.lin_y, self.ang)
    }
}

/// Operating parameters that can change while the loop runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicParams {
    pub angle_threshold: f64,
    pub enable_odom_broadcast: bool,
    pub wheel_radius: f64,
}

impl DynamicParams {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            angle_threshold: config.angle_threshold,
            enable_odom_broadcast: config.enable_odom_broadcast,
            wheel_radius: config.geometry.wheel_radius,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.wheel_radius.is_finite()
            && self.wheel_radius > 0.0
            && self.angle_threshold.is_finite()
            && self.angle_threshold > 0.0
    }
}

/// Per-wheel actuation for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelTarget {
    /// Wheel rotation speed (rad/s)
    pub speed: f64,
    /// Steering joint position (rad)
    pub steering_angle: f64,
    pub direction_inverted: bool,
    pub clipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Inactive: no targets computed, no odometry
    Stopped,
    /// Tracking the latest command
    Running,
    /// Command stale or stop requested: drive to zero, steering held
    Braking,
}

/// Everything the outer runtime needs from one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub state: LoopState,
    pub targets: [WheelTarget; 4],
    /// Drive held back while steering catches up
    pub translation_suppressed: bool,
    pub odometry: OdometryState,
    /// Time to emit odometry / wheel status
    pub publish: bool,
    /// Mirror odometry as a transform
    pub broadcast_odom: bool,
    pub hardware_fault: bool,
}

/// Non-realtime side of the controller: command, reconfigure and stop inputs
#[derive(Clone)]
pub struct ControllerHandle {
    command: Arc<RealtimeBuffer<Twist>>,
    params: Arc<RealtimeBuffer<DynamicParams>>,
    stop_requested: Arc<AtomicBool>,
}

impl ControllerHandle {
    /// Publish a velocity command received now
    pub fn send_command(&self, lin_x: f64, lin_y: f64, ang: f64) {
        self.send_command_at(lin_x, lin_y, ang, Instant::now());
    }

    pub fn send_command_at(&self, lin_x: f64, lin_y: f64, ang: f64, stamp: Instant) {
        self.command.write(Twist {
            stamp: Some(stamp),
            lin_x,
            lin_y,
            ang,
        });
        self.stop_requested.store(false, Ordering::Release);
    }

    /// Queue new operating parameters for the next cycle boundary
    pub fn reconfigure(&self, params: DynamicParams) {
        self.params.write(params);
    }

    /// Brake until the next command arrives
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }
}

pub struct SwerveController {
    config: ControllerConfig,
    joints: BoundJoints,
    handle: ControllerHandle,
    params: DynamicParams,
    state: LoopState,
    limiter_lin: SpeedLimiter,
    limiter_ang: SpeedLimiter,
    // lin_x, lin_y, ang
    history: [ChannelHistory; 3],
    odometry: OdometryEstimator,
    next_publish: Option<Instant>,
    cmd_timeout: Duration,
    publish_period: Duration,
}

impl SwerveController {
    /// Validate the configuration and bind every joint; the loop cannot be
    /// built if either fails.
    pub fn new<H: RobotHardware + ?Sized>(
        config: ControllerConfig,
        hw: &H,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let joints = BoundJoints::bind(hw).map_err(ControllerError::MissingJoint)?;
        let params = DynamicParams::from_config(&config);

        let handle = ControllerHandle {
            command: Arc::new(RealtimeBuffer::new(Twist::default())),
            params: Arc::new(RealtimeBuffer::new(params)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        };

        info!(
            "Swerve controller ready: track={} wheel_base={} wheel_radius={} steering=[{}, {}]",
            config.geometry.track,
            config.geometry.wheel_base,
            config.geometry.wheel_radius,
            config.geometry.min_steering_angle,
            config.geometry.max_steering_angle
        );

        Ok(Self {
            limiter_lin: SpeedLimiter::new(&config.linear),
            limiter_ang: SpeedLimiter::new(&config.angular),
            history: [ChannelHistory::default(); 3],
            odometry: OdometryEstimator::new(config.geometry, config.velocity_rolling_window_size),
            next_publish: None,
            cmd_timeout: config.cmd_timeout(),
            publish_period: config.publish_period(),
            state: LoopState::Stopped,
            joints,
            handle,
            params,
            config,
        })
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn params(&self) -> DynamicParams {
        self.params
    }

    pub fn odometry(&self) -> OdometryState {
        self.odometry.state()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Stopped -> Running: fresh odometry and limiter history, wheels braked
    pub fn start<H: RobotHardware + ?Sized>(&mut self, now: Instant, hw: &mut H) {
        self.odometry.init(now);
        self.history = [ChannelHistory::default(); 3];
        self.next_publish = Some(now);
        if let Err(e) = self.brake(hw) {
            warn!("Failed to brake on start: {}", e);
        }
        self.state = LoopState::Running;
        info!("Controller started");
    }

    /// Any state -> Stopped: wheels braked, steering held
    pub fn stop<H: RobotHardware + ?Sized>(&mut self, hw: &mut H) {
        if let Err(e) = self.brake(hw) {
            warn!("Failed to brake on stop: {}", e);
        }
        self.state = LoopState::Stopped;
        info!("Controller stopped");
    }

    /// Zero drive speed and hold steering where it is
    fn brake<H: RobotHardware + ?Sized>(&mut self, hw: &mut H) -> Result<(), HardwareError> {
        for corner in Corner::ALL {
            let steer = self.joints.steering(corner);
            let hold = hw.position(steer);
            hw.set_velocity_target(self.joints.wheel(corner), 0.0);
            hw.set_position_target(steer, hold);
        }
        hw.write()
    }

    fn apply_params(&mut self, params: DynamicParams) {
        if !params.is_valid() {
            warn!("Rejected dynamic parameters {:?}, keeping {:?}", params, self.params);
            return;
        }
        info!("Applying dynamic parameters: {:?}", params);
        self.odometry.set_wheel_radius(params.wheel_radius);
        self.params = params;
    }

    fn update_state(&mut self, stale: bool) {
        match (self.state, stale) {
            (LoopState::Running, true) => {
                warn!("Command stale or stop requested, braking");
                self.state = LoopState::Braking;
            }
            (LoopState::Braking, false) => {
                info!("Fresh command received, resuming");
                self.state = LoopState::Running;
            }
            _ => {}
        }
    }

    /// Limit the three command channels against their history
    fn limit_command(&mut self, desired: BodyVelocity, dt: f64) -> BodyVelocity {
        let [hx, hy, ha] = &mut self.history;
        let limited = BodyVelocity {
            lin_x: self.limiter_lin.limit(desired.lin_x, hx.last, hx.last2, dt),
            lin_y: self.limiter_lin.limit(desired.lin_y, hy.last, hy.last2, dt),
            ang: self.limiter_ang.limit(desired.ang, ha.last, ha.last2, dt),
        };
        hx.push(limited.lin_x);
        hy.push(limited.lin_y);
        ha.push(limited.ang);
        limited
    }

    fn publish_due(&mut self, now: Instant) -> bool {
        match self.next_publish {
            Some(next) if now < next => false,
            Some(next) => {
                let following = next + self.publish_period;
                // Skip missed slots rather than bursting
                self.next_publish = Some(if following <= now {
                    now + self.publish_period
                } else {
                    following
                });
                true
            }
            None => {
                self.next_publish = Some(now + self.publish_period);
                true
            }
        }
    }

    /// Run one control cycle.
    ///
    /// Never blocks and never fails: a stale command degrades to Braking and
    /// hardware faults are reported back without aborting the cycle.
    pub fn update<H: RobotHardware + ?Sized>(
        &mut self,
        now: Instant,
        period: Duration,
        hw: &mut H,
    ) -> CycleReport {
        if self.state == LoopState::Stopped {
            return CycleReport {
                state: LoopState::Stopped,
                targets: [WheelTarget::default(); 4],
                translation_suppressed: false,
                odometry: self.odometry.state(),
                publish: false,
                broadcast_odom: false,
                hardware_fault: false,
            };
        }

        // 1. Snapshot parameters and command
        if let Some(params) = self.handle.params.take_fresh() {
            self.apply_params(params);
        }
        let twist = self.handle.command.read();
        let stale = match twist.stamp {
            Some(stamp) => now.saturating_duration_since(stamp) > self.cmd_timeout,
            None => true,
        };
        let stop_requested = self.handle.stop_requested.load(Ordering::Acquire);
        self.update_state(stale || stop_requested);

        let mut hardware_fault = false;
        let read_ok = match hw.read() {
            Ok(()) => true,
            Err(e) => {
                warn!("Hardware read failed: {}", e);
                hardware_fault = true;
                false
            }
        };

        // 2. Speed limits
        let desired = match self.state {
            LoopState::Braking => BodyVelocity::zero(),
            _ => twist.body_velocity(),
        };
        let command = self.limit_command(desired, period.as_secs_f64());

        // 3. Kinematics
        let geometry = &self.config.geometry;
        let raw = kinematics::solve(&command, geometry, self.params.wheel_radius);

        // 4. Steering resolution
        let mut targets = [WheelTarget::default(); 4];
        let mut errors = [0.0; 4];
        for corner in Corner::ALL {
            let i = corner.index();
            let current = hw.position(self.joints.steering(corner));
            let wheel = raw[i];
            // A clip larger than the threshold would suppress drive for good
            let resolved = steering::resolve_within(
                wheel.angle.unwrap_or(current),
                current,
                wheel.speed,
                geometry.min_steering_angle,
                geometry.max_steering_angle,
                self.params.angle_threshold,
            );
            errors[i] = resolved.unclipped_angle - current;
            targets[i] = WheelTarget {
                speed: resolved.speed,
                steering_angle: resolved.angle,
                direction_inverted: resolved.inverted,
                clipped: resolved.clipped,
            };
        }

        // 5. Rotate before translating
        let translation_suppressed =
            sequencer::should_suppress_translation(&errors, self.params.angle_threshold);
        if translation_suppressed {
            debug!("Steering error above {} rad, holding drive", self.params.angle_threshold);
            for target in &mut targets {
                target.speed = 0.0;
            }
        }

        if self.config.debug_single_wheel {
            for corner in &Corner::ALL[1..] {
                targets[corner.index()] = WheelTarget {
                    steering_angle: hw.position(self.joints.steering(*corner)),
                    ..WheelTarget::default()
                };
            }
        }

        // 6. Actuate
        for corner in Corner::ALL {
            let target = &targets[corner.index()];
            hw.set_velocity_target(self.joints.wheel(corner), target.speed);
            hw.set_position_target(self.joints.steering(corner), target.steering_angle);
        }
        if let Err(e) = hw.write() {
            warn!("Hardware write failed: {}", e);
            hardware_fault = true;
        }

        // 7. Odometry from measured feedback only
        if read_ok {
            let feedback = Corner::ALL.map(|corner| WheelFeedback {
                speed: hw.velocity(self.joints.wheel(corner)),
                angle: hw.position(self.joints.steering(corner)),
            });
            self.odometry.update_at(&feedback, now);
        }

        // 8. Publish at the configured rate
        let publish = self.publish_due(now);

        CycleReport {
            state: self.state,
            targets,
            translation_suppressed,
            odometry: self.odometry.state(),
            publish,
            broadcast_odom: publish && self.params.enable_odom_broadcast,
            hardware_fault,
        }
    }
}
