// Velocity / acceleration / jerk bounds on a scalar command

use crate::config::{Bounds, LimiterConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedLimiter {
    velocity: Option<Bounds>,
    acceleration: Option<Bounds>,
    jerk: Option<Bounds>,
}

impl SpeedLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            velocity: config.velocity,
            acceleration: config.acceleration,
            jerk: config.jerk,
        }
    }

    /// Bound `desired` given the two previous outputs and the cycle period.
    ///
    /// Acceleration is applied last so `|result - last| <= max_accel * dt`
    /// holds whatever the other bounds did. A non-positive `dt` only applies
    /// the velocity bound.
    pub fn limit(&self, desired: f64, last: f64, last2: f64, dt: f64) -> f64 {
        let mut v = self.limit_velocity(desired);
        if dt > 0.0 {
            v = self.limit_jerk(v, last, last2, dt);
            v = self.limit_acceleration(v, last, dt);
        }
        v
    }

    pub fn limit_velocity(&self, v: f64) -> f64 {
        match &self.velocity {
            Some(b) => v.clamp(b.lower(), b.upper()),
            None => v,
        }
    }

    pub fn limit_acceleration(&self, v: f64, last: f64, dt: f64) -> f64 {
        match &self.acceleration {
            Some(b) => last + (v - last).clamp(b.lower() * dt, b.upper() * dt),
            None => v,
        }
    }

    pub fn limit_jerk(&self, v: f64, last: f64, last2: f64, dt: f64) -> f64 {
        match &self.jerk {
            Some(b) => {
                let dv = v - last;
                let dv_prev = last - last2;
                let dt2 = 2.0 * dt * dt;
                let da = (dv - dv_prev).clamp(b.lower() * dt2, b.upper() * dt2);
                last + dv_prev + da
            }
            None => v,
        }
    }
}

/// Two-sample history of a limited channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelHistory {
    pub last: f64,
    pub last2: f64,
}

impl ChannelHistory {
    pub fn push(&mut self, value: f64) {
        self.last2 = self.last;
        self.last = value;
    }
}
