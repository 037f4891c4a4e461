// Actuator contract between the control loop and a hardware back-end
//
// A back-end exposes eight joints (a drive wheel and a steering joint per
// corner). Each cycle the loop calls `read()` to refresh feedback, sets
// targets per joint, then calls `write()` to flush them.

use std::fmt;

use crate::motor::feetech::FeetechError;

/// Wheel module position on the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Corner {
    /// All corners in array order
    pub const ALL: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::RearLeft,
        Corner::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::FrontLeft => 0,
            Corner::FrontRight => 1,
            Corner::RearLeft => 2,
            Corner::RearRight => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Corner::FrontLeft => "front_left",
            Corner::FrontRight => "front_right",
            Corner::RearLeft => "rear_left",
            Corner::RearRight => "rear_right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    /// Velocity-controlled drive joint (rad/s)
    Wheel,
    /// Position-controlled steering joint (rad)
    Steering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId {
    pub corner: Corner,
    pub kind: JointKind,
}

impl JointId {
    pub const fn wheel(corner: Corner) -> Self {
        Self {
            corner,
            kind: JointKind::Wheel,
        }
    }

    pub const fn steering(corner: Corner) -> Self {
        Self {
            corner,
            kind: JointKind::Steering,
        }
    }

    /// Dense index in [0, 8), wheels first
    pub fn slot(self) -> usize {
        match self.kind {
            JointKind::Wheel => self.corner.index(),
            JointKind::Steering => 4 + self.corner.index(),
        }
    }

    /// Every joint the controller needs, wheels first
    pub fn all() -> [JointId; 8] {
        let mut joints = [JointId::wheel(Corner::FrontLeft); 8];
        for corner in Corner::ALL {
            for joint in [JointId::wheel(corner), JointId::steering(corner)] {
                joints[joint.slot()] = joint;
            }
        }
        joints
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.kind {
            JointKind::Wheel => "wheel",
            JointKind::Steering => "steering",
        };
        write!(f, "{}_{}_joint", self.corner.name(), suffix)
    }
}

/// Error types for hardware back-ends
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Motor bus error: {0}")]
    Feetech(#[from] FeetechError),

    #[error("Joint {0} has no actuator bound")]
    UnboundJoint(JointId),
}

/// Per-joint set/get contract plus bulk read/write of the whole robot
pub trait RobotHardware {
    /// Whether an actuator handle exists for this joint
    fn has_joint(&self, joint: JointId) -> bool;

    /// Refresh cached feedback from the actuators
    fn read(&mut self) -> Result<(), HardwareError>;

    /// Flush the targets set since the last write
    fn write(&mut self) -> Result<(), HardwareError>;

    fn set_velocity_target(&mut self, joint: JointId, value: f64);

    fn set_position_target(&mut self, joint: JointId, value: f64);

    fn velocity(&self, joint: JointId) -> f64;

    fn position(&self, joint: JointId) -> f64;
}

/// Proof that every joint was found when the controller was built.
///
/// Obtained once through [`BoundJoints::bind`]; the loop never re-checks
/// handles per cycle.
#[derive(Debug, Clone, Copy)]
pub struct BoundJoints {
    wheels: [JointId; 4],
    steering: [JointId; 4],
}

impl BoundJoints {
    pub fn bind<H: RobotHardware + ?Sized>(hw: &H) -> Result<Self, JointId> {
        for joint in JointId::all() {
            if !hw.has_joint(joint) {
                return Err(joint);
            }
        }
        Ok(Self {
            wheels: Corner::ALL.map(JointId::wheel),
            steering: Corner::ALL.map(JointId::steering),
        })
    }

    pub fn wheel(&self, corner: Corner) -> JointId {
        self.wheels[corner.index()]
    }

    pub fn steering(&self, corner: Corner) -> JointId {
        self.steering[corner.index()]
    }
}
