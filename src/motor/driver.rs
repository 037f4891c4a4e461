// Feetech-backed swerve hardware
//
// Four drive servos in velocity mode and four steering servos in position
// mode share one serial bus. Targets are buffered per joint and flushed with
// two sync writes per cycle.

use tracing::{debug, info, warn};

use super::feetech::{
    FeetechBus, FeetechError, OperatingMode, angle_to_position, position_to_angle,
    radps_to_steps, steps_to_radps,
};
use crate::config::MotorIds;
use crate::controller::hardware::{HardwareError, JointId, JointKind, RobotHardware};

#[derive(Debug, Clone, Copy, Default)]
struct JointSlot {
    motor_id: Option<u8>,
    target: f64,
    velocity: f64,
    position: f64,
}

/// Swerve base on a Feetech STS bus
pub struct FeetechHardware {
    bus: FeetechBus,
    joints: [JointSlot; 8],
}

impl FeetechHardware {
    /// Open the bus; joints without a configured ID stay unbound
    pub fn open(port: &str, ids: &MotorIds) -> Result<Self, FeetechError> {
        info!("Opening motor bus on {}", port);
        let bus = FeetechBus::open(port)?;
        let mut joints = [JointSlot::default(); 8];
        for joint in JointId::all() {
            joints[joint.slot()].motor_id = ids.get(joint);
        }
        Ok(Self { bus, joints })
    }

    fn bound(&self) -> impl Iterator<Item = (JointId, u8)> + '_ {
        JointId::all()
            .into_iter()
            .filter_map(|joint| self.joints[joint.slot()].motor_id.map(|id| (joint, id)))
    }

    /// Ping every bound motor and put it in the right operating mode.
    ///
    /// Must be called before the control loop starts.
    pub fn initialize(&mut self) -> Result<(), FeetechError> {
        let motors: Vec<(JointId, u8)> = self.bound().collect();
        info!("Initializing {} motors", motors.len());

        for &(joint, id) in &motors {
            match self.bus.ping(id)? {
                true => debug!("Motor {} ({}) responding", id, joint),
                false => {
                    warn!("Motor {} ({}) not responding to ping", id, joint);
                    return Err(FeetechError::Timeout { id });
                }
            }
        }

        // Torque must be off while changing operating mode
        for &(joint, id) in &motors {
            self.bus.disable_torque(id)?;
            let mode = match joint.kind {
                JointKind::Wheel => OperatingMode::Velocity,
                JointKind::Steering => OperatingMode::Position,
            };
            self.bus.set_operating_mode(id, mode)?;
            self.bus.enable_torque(id)?;
        }

        // Hold steering where it is rather than snapping to centre
        self.read_all()?;
        for joint in JointId::all() {
            let s = &mut self.joints[joint.slot()];
            s.target = match joint.kind {
                JointKind::Wheel => 0.0,
                JointKind::Steering => s.position,
            };
        }

        info!("Motors initialized successfully");
        Ok(())
    }

    fn read_all(&mut self) -> Result<(), FeetechError> {
        for slot in &mut self.joints {
            let Some(id) = slot.motor_id else {
                continue;
            };
            let state = self.bus.read_state(id)?;
            slot.velocity = steps_to_radps(state.velocity);
            slot.position = position_to_angle(state.position);
        }
        Ok(())
    }

    /// Stop all drive motors immediately
    pub fn stop(&mut self) -> Result<(), FeetechError> {
        info!("Stopping all drive motors");
        let data: Vec<(u8, i16)> = self
            .bound()
            .filter(|(joint, _)| joint.kind == JointKind::Wheel)
            .map(|(_, id)| (id, 0))
            .collect();
        self.bus.sync_write_velocities(&data)
    }

    /// Disable torque on all motors (allows free movement)
    pub fn disable_torque(&mut self) -> Result<(), FeetechError> {
        info!("Disabling torque on all motors");
        let ids: Vec<u8> = self.bound().map(|(_, id)| id).collect();
        for id in ids {
            self.bus.disable_torque(id)?;
        }
        Ok(())
    }
}

impl RobotHardware for FeetechHardware {
    fn has_joint(&self, joint: JointId) -> bool {
        self.joints[joint.slot()].motor_id.is_some()
    }

    fn read(&mut self) -> Result<(), HardwareError> {
        self.read_all().map_err(HardwareError::from)
    }

    fn write(&mut self) -> Result<(), HardwareError> {
        let mut velocities = [(0u8, 0i16); 4];
        let mut positions = [(0u8, 0u16); 4];
        let (mut nv, mut np) = (0, 0);

        for joint in JointId::all() {
            let s = self.joints[joint.slot()];
            let Some(id) = s.motor_id else {
                return Err(HardwareError::UnboundJoint(joint));
            };
            match joint.kind {
                JointKind::Wheel => {
                    velocities[nv] = (id, radps_to_steps(s.target));
                    nv += 1;
                }
                JointKind::Steering => {
                    positions[np] = (id, angle_to_position(s.target));
                    np += 1;
                }
            }
        }

        self.bus.sync_write_velocities(&velocities[..nv])?;
        self.bus.sync_write_positions(&positions[..np])?;
        Ok(())
    }

    fn set_velocity_target(&mut self, joint: JointId, value: f64) {
        self.joints[joint.slot()].target = value;
    }

    fn set_position_target(&mut self, joint: JointId, value: f64) {
        self.joints[joint.slot()].target = value;
    }

    fn velocity(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].velocity
    }

    fn position(&self, joint: JointId) -> f64 {
        self.joints[joint.slot()].position
    }
}

impl Drop for FeetechHardware {
    fn drop(&mut self) {
        // Try to stop motors when the driver is dropped
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
