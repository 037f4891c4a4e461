// Simulated joints for testing and running without a motor bus
//
// Wheels track their velocity target immediately. Steering joints move
// towards their position target by at most `steering_step` per write, so a
// finite value reproduces the lag of a real servo.

use std::collections::HashSet;

use tracing::debug;

use crate::controller::hardware::{HardwareError, JointId, RobotHardware};

#[derive(Debug, Clone, Copy, Default)]
struct SimJoint {
    velocity_target: f64,
    position_target: f64,
    velocity: f64,
    position: f64,
}

#[derive(Debug, Clone)]
pub struct SimHardware {
    joints: [SimJoint; 8],
    missing: HashSet<JointId>,
    steering_step: f64,
    writes: u64,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHardware {
    /// Ideal actuators: every target is reached on the next write
    pub fn new() -> Self {
        Self {
            joints: [SimJoint::default(); 8],
            missing: HashSet::new(),
            steering_step: f64::INFINITY,
            writes: 0,
        }
    }

    /// Limit steering travel per write (rad)
    pub fn with_steering_step(mut self, step: f64) -> Self {
        self.steering_step = step;
        self
    }

    /// Drop a joint, as if its actuator were not wired
    pub fn without_joint(mut self, joint: JointId) -> Self {
        self.missing.insert(joint);
        self
    }

    /// Force a measured steering angle, e.g. to start from a given pose
    pub fn set_position(&mut self, joint: JointId, position: f64) {
        let j = &mut self.joints[joint.slot()];
        j.position = position;
        j.position_target = position;
    }

    pub fn velocity_target(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].velocity_target
    }

    pub fn position_target(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].position_target
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl RobotHardware for SimHardware {
    fn has_joint(&self, joint: JointId) -> bool {
        !self.missing.contains(&joint)
    }

    fn read(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn write(&mut self) -> Result<(), HardwareError> {
        let step = self.steering_step;
        for j in &mut self.joints {
            j.velocity = j.velocity_target;
            let error = j.position_target - j.position;
            j.position += error.clamp(-step, step);
        }
        self.writes += 1;
        debug!("Sim write #{}", self.writes);
        Ok(())
    }

    fn set_velocity_target(&mut self, joint: JointId, value: f64) {
        self.joints[joint.slot()].velocity_target = value;
    }

    fn set_position_target(&mut self, joint: JointId, value: f64) {
        self.joints[joint.slot()].position_target = value;
    }

    fn velocity(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].velocity
    }

    fn position(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].position
    }
}
