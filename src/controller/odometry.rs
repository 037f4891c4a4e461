// Dead-reckoning from measured wheel speeds and steering angles

use std::time::{Duration, Instant};

use crate::config::GeometryParams;
use crate::controller::kinematics::{self, BodyVelocity, WheelFeedback};
use crate::controller::steering::normalize_angle;

/// Estimated pose and velocity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OdometryState {
    pub x: f64,
    pub y: f64,
    /// Heading wrapped to (-pi, pi]
    pub heading: f64,
    /// Body-frame velocities, averaged over the rolling window
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular: f64,
    pub last_update_time: Option<Instant>,
}

impl OdometryState {
    /// Planar speed regardless of direction
    pub fn linear_speed(&self) -> f64 {
        self.linear_x.hypot(self.linear_y)
    }
}

/// Fixed-capacity rolling mean, allocated once
#[derive(Debug, Clone)]
struct RollingMean {
    samples: Vec<f64>,
    next: usize,
    len: usize,
}

impl RollingMean {
    fn new(window: usize) -> Self {
        Self {
            samples: vec![0.0; window.max(1)],
            next: 0,
            len: 0,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.next] = value;
        self.next = (self.next + 1) % self.samples.len();
        self.len = (self.len + 1).min(self.samples.len());
    }

    fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        // Summed fresh, no running total
        self.samples[..self.len].iter().sum::<f64>() / self.len as f64
    }

    fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
    }
}

pub struct OdometryEstimator {
    geometry: GeometryParams,
    wheel_radius: f64,
    state: OdometryState,
    /// Unwrapped heading, differentiated for the angular velocity estimate
    heading_accum: f64,
    linear_x: RollingMean,
    linear_y: RollingMean,
    angular: RollingMean,
}

impl OdometryEstimator {
    pub fn new(geometry: GeometryParams, velocity_window: usize) -> Self {
        Self {
            wheel_radius: geometry.wheel_radius,
            geometry,
            state: OdometryState::default(),
            heading_accum: 0.0,
            linear_x: RollingMean::new(velocity_window),
            linear_y: RollingMean::new(velocity_window),
            angular: RollingMean::new(velocity_window),
        }
    }

    /// Reset pose and velocity, starting the clock at `now`
    pub fn init(&mut self, now: Instant) {
        self.state = OdometryState {
            last_update_time: Some(now),
            ..OdometryState::default()
        };
        self.heading_accum = 0.0;
        self.linear_x.clear();
        self.linear_y.clear();
        self.angular.clear();
    }

    pub fn set_wheel_radius(&mut self, wheel_radius: f64) {
        self.wheel_radius = wheel_radius;
    }

    pub fn state(&self) -> OdometryState {
        self.state
    }

    /// Integrate four measured modules up to `now`
    pub fn update_at(&mut self, feedback: &[WheelFeedback; 4], now: Instant) -> OdometryState {
        let elapsed = self.elapsed_since_last(now);
        self.state.last_update_time = Some(now);
        let body = kinematics::body_velocity(feedback, &self.geometry, self.wheel_radius);
        self.integrate(body, elapsed)
    }

    /// Integrate four measured modules over `elapsed`
    pub fn update(&mut self, feedback: &[WheelFeedback; 4], elapsed: Duration) -> OdometryState {
        let body = kinematics::body_velocity(feedback, &self.geometry, self.wheel_radius);
        self.advance_clock(elapsed);
        self.integrate(body, elapsed)
    }

    /// Integrate left/right-averaged front and rear modules over `elapsed`
    pub fn update_from_pair(
        &mut self,
        front: &WheelFeedback,
        rear: &WheelFeedback,
        elapsed: Duration,
    ) -> OdometryState {
        let body =
            kinematics::body_velocity_from_pair(front, rear, &self.geometry, self.wheel_radius);
        self.advance_clock(elapsed);
        self.integrate(body, elapsed)
    }

    fn elapsed_since_last(&self, now: Instant) -> Duration {
        match self.state.last_update_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        }
    }

    fn advance_clock(&mut self, elapsed: Duration) {
        if let Some(last) = self.state.last_update_time {
            self.state.last_update_time = Some(last + elapsed);
        }
    }

    /// First-order integration using the heading at the start of the step
    fn integrate(&mut self, body: BodyVelocity, elapsed: Duration) -> OdometryState {
        let dt = elapsed.as_secs_f64();
        if dt <= 0.0 {
            return self.state;
        }

        let (sin_h, cos_h) = self.heading_accum.sin_cos();
        self.state.x += (body.lin_x * cos_h - body.lin_y * sin_h) * dt;
        self.state.y += (body.lin_x * sin_h + body.lin_y * cos_h) * dt;

        let previous_heading = self.heading_accum;
        self.heading_accum += body.ang * dt;
        self.state.heading = normalize_angle(self.heading_accum);

        self.linear_x.push(body.lin_x);
        self.linear_y.push(body.lin_y);
        self.angular.push((self.heading_accum - previous_heading) / dt);
        self.state.linear_x = self.linear_x.mean();
        self.state.linear_y = self.linear_y.mean();
        self.state.angular = self.angular.mean();

        self.state
    }
}
