// Feetech STS3215 serial protocol
//
// Frames look like Dynamixel Protocol 1.0:
//   [0xFF, 0xFF, ID, Length, Instruction | Error, Params..., Checksum]
// where Length counts everything after itself and the checksum is the
// inverted low byte of the sum from ID onwards.
//
// Outgoing frames are built in a buffer owned by the bus so the per-cycle
// sync writes do not allocate.

use std::f64::consts::TAU;
use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Encoder steps per output revolution
pub const STEPS_PER_REVOLUTION: f64 = 4096.0;

/// Position register value with the steering module pointing straight ahead
pub const CENTER_POSITION: u16 = 2048;

const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Addressed by sync write, no status reply
const BROADCAST_ID: u8 = 0xFE;

/// Largest parameter block we ever read back
const MAX_STATUS_PARAMS: usize = 4;

/// ID + Length + Error + params + Checksum
const MAX_STATUS_BODY: usize = 4 + MAX_STATUS_PARAMS;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// STS3215 control table entries used by the swerve base
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 0=position, 1=velocity
    TorqueEnable = 40,    // 0=off, 1=on
    GoalPosition = 42,    // u16 steps
    GoalVelocity = 46,    // sign-magnitude steps/s
    Lock = 55,            // EEPROM lock
    PresentPosition = 56, // u16 steps, followed by PresentVelocity
    PresentVelocity = 58, // sign-magnitude steps/s
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    /// Steering joints
    Position = 0,
    /// Drive wheels
    Velocity = 1,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Raw feedback of one servo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoState {
    pub position: u16,
    pub velocity: i16,
}

fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Start a frame in `buf`; the length byte is patched by [`finish_frame`]
fn begin_frame(buf: &mut Vec<u8>, id: u8, instruction: Instruction) {
    buf.clear();
    buf.extend_from_slice(&HEADER);
    buf.extend_from_slice(&[id, 0, instruction as u8]);
}

fn finish_frame(buf: &mut Vec<u8>) {
    // params + instruction + checksum
    buf[3] = (buf.len() - 3) as u8;
    let sum = checksum(&buf[2..]);
    buf.push(sum);
}

/// Validate a complete status frame and return its parameters
fn decode_status(expected_id: u8, frame: &[u8]) -> Result<&[u8]> {
    let invalid = |reason: String| FeetechError::InvalidResponse {
        id: expected_id,
        reason,
    };

    if frame.len() < 6 || frame[..2] != HEADER {
        return Err(invalid(format!("Malformed frame: {:02X?}", frame)));
    }
    let id = frame[2];
    if id != expected_id {
        return Err(invalid(format!("ID mismatch: expected {}, got {}", expected_id, id)));
    }
    let length = frame[3] as usize;
    if frame.len() != 4 + length {
        return Err(invalid(format!(
            "Length byte {} does not match {} bytes received",
            length,
            frame.len() - 4
        )));
    }

    let (body, sum) = frame[2..].split_at(frame.len() - 3);
    if checksum(body) != sum[0] {
        return Err(FeetechError::ChecksumMismatch { id });
    }
    if frame[4] != 0 {
        return Err(FeetechError::MotorError {
            id,
            status: frame[4],
        });
    }
    Ok(&frame[5..frame.len() - 1])
}

/// Feetech motor bus - handles serial communication with motors
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
    tx: Vec<u8>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            // Sync write for four motors is the largest frame we send
            tx: Vec::with_capacity(64),
        })
    }

    fn flush_frame(&mut self) -> Result<()> {
        self.port.write_all(&self.tx)?;
        self.port.flush()?;
        Ok(())
    }

    fn request(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<()> {
        begin_frame(&mut self.tx, id, instruction);
        self.tx.extend_from_slice(params);
        finish_frame(&mut self.tx);
        self.flush_frame()
    }

    /// Read one status frame into `frame`, returning its parameters
    fn read_status<'a>(&mut self, id: u8, frame: &'a mut [u8; 4 + MAX_STATUS_BODY]) -> Result<&'a [u8]> {
        self.port.read_exact(&mut frame[..4]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        let length = frame[3] as usize;
        if !(2..=MAX_STATUS_BODY - 2).contains(&length) {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Unexpected length {}", length),
            });
        }
        self.port.read_exact(&mut frame[4..4 + length])?;
        decode_status(id, &frame[..4 + length])
    }

    /// Ping a motor; `false` if it does not answer in time
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.request(id, Instruction::Ping, &[])?;
        let mut frame = [0u8; 4 + MAX_STATUS_BODY];
        match self.read_status(id, &mut frame) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write motor {}: {:?} = {}", id, register, value);
        self.request(id, Instruction::Write, &[register as u8, value])?;
        let mut frame = [0u8; 4 + MAX_STATUS_BODY];
        self.read_status(id, &mut frame)?;
        Ok(())
    }

    /// Position and velocity in one read (the registers are adjacent)
    pub fn read_state(&mut self, id: u8) -> Result<ServoState> {
        self.request(
            id,
            Instruction::Read,
            &[Register::PresentPosition as u8, MAX_STATUS_PARAMS as u8],
        )?;
        let mut frame = [0u8; 4 + MAX_STATUS_BODY];
        let params = self.read_status(id, &mut frame)?;
        let [p0, p1, v0, v1] = params else {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", MAX_STATUS_PARAMS, params.len()),
            });
        };
        Ok(ServoState {
            position: u16::from_le_bytes([*p0, *p1]),
            velocity: decode_sign_magnitude(u16::from_le_bytes([*v0, *v1])),
        })
    }

    /// Write one 16-bit register on several motors in a single frame
    fn sync_write_words(
        &mut self,
        register: Register,
        words: impl ExactSizeIterator<Item = (u8, u16)>,
    ) -> Result<()> {
        if words.len() == 0 {
            return Ok(());
        }
        let count = words.len();
        begin_frame(&mut self.tx, BROADCAST_ID, Instruction::SyncWrite);
        self.tx.extend_from_slice(&[register as u8, 2]);
        for (id, value) in words {
            self.tx.push(id);
            self.tx.extend_from_slice(&value.to_le_bytes());
        }
        finish_frame(&mut self.tx);
        debug!("Sync write {:?} to {} motors", register, count);
        // Broadcast: no status reply
        self.flush_frame()
    }

    pub fn sync_write_positions(&mut self, data: &[(u8, u16)]) -> Result<()> {
        self.sync_write_words(Register::GoalPosition, data.iter().copied())
    }

    pub fn sync_write_velocities(&mut self, data: &[(u8, i16)]) -> Result<()> {
        self.sync_write_words(
            Register::GoalVelocity,
            data.iter().map(|&(id, v)| (id, encode_sign_magnitude(v))),
        )
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    /// Leaves the motor free to turn by hand
    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be off while switching
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (value.unsigned_abs() & 0x7FFF)
    }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Wheel speed (rad/s) to velocity register steps/s, saturating
pub fn radps_to_steps(radps: f64) -> i16 {
    let steps = radps * STEPS_PER_REVOLUTION / TAU;
    steps.round().clamp(-(i16::MAX as f64), i16::MAX as f64) as i16
}

pub fn steps_to_radps(steps: i16) -> f64 {
    steps as f64 * TAU / STEPS_PER_REVOLUTION
}

/// Steering angle (rad, 0 = centre) to position register, saturating
pub fn angle_to_position(angle: f64) -> u16 {
    let steps = CENTER_POSITION as f64 + angle * STEPS_PER_REVOLUTION / TAU;
    steps.round().clamp(0.0, STEPS_PER_REVOLUTION - 1.0) as u16
}

pub fn position_to_angle(position: u16) -> f64 {
    (position as f64 - CENTER_POSITION as f64) * TAU / STEPS_PER_REVOLUTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn frame(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        begin_frame(&mut buf, id, instruction);
        buf.extend_from_slice(params);
        finish_frame(&mut buf);
        buf
    }

    /// Status reply as a motor would send it
    fn status(id: u8, error: u8, params: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xFF, 0xFF, id, (params.len() + 2) as u8, error];
        buf.extend_from_slice(params);
        let sum = checksum(&buf[2..]);
        buf.push(sum);
        buf
    }

    #[test]
    fn test_checksum() {
        // ~(1 + 4 + 3 + 30 + 0 + 2) = ~40
        assert_eq!(checksum(&[1, 4, 0x03, 30, 0, 2]), 215);
        // Sum wraps past one byte
        assert_eq!(checksum(&[0xFE, 0x10, 0x83]), !0x91u8);
    }

    #[test]
    fn test_ping_frame() {
        assert_eq!(frame(1, Instruction::Ping, &[]), [0xFF, 0xFF, 1, 2, 0x01, 0xFB]);
    }

    #[test]
    fn test_read_state_request() {
        let f = frame(7, Instruction::Read, &[Register::PresentPosition as u8, 4]);
        assert_eq!(&f[..7], &[0xFF, 0xFF, 7, 4, 0x02, 56, 4]);
        assert_eq!(f[7], checksum(&f[2..7]));
    }

    #[test]
    fn test_sync_write_frame_layout() {
        let mut buf = Vec::new();
        begin_frame(&mut buf, BROADCAST_ID, Instruction::SyncWrite);
        buf.extend_from_slice(&[Register::GoalPosition as u8, 2]);
        for (id, value) in [(5u8, 0x0800u16), (6, 0x0123)] {
            buf.push(id);
            buf.extend_from_slice(&value.to_le_bytes());
        }
        finish_frame(&mut buf);

        // Length = 2 + 2 * 3 params + instruction + checksum
        assert_eq!(buf[3], 10);
        assert_eq!(&buf[5..13], &[42, 2, 5, 0x00, 0x08, 6, 0x23, 0x01]);
    }

    #[test]
    fn test_decode_status_params() {
        let reply = status(3, 0, &[0x00, 0x08, 0x64, 0x80]);
        let params = decode_status(3, &reply).unwrap();
        assert_eq!(params, &[0x00, 0x08, 0x64, 0x80]);
    }

    #[test]
    fn test_decode_status_rejects_bad_replies() {
        let mut reply = status(3, 0, &[1, 2]);
        assert!(matches!(
            decode_status(4, &reply),
            Err(FeetechError::InvalidResponse { id: 4, .. })
        ));

        let last = reply.len() - 1;
        reply[last] ^= 0xFF;
        assert!(matches!(
            decode_status(3, &reply),
            Err(FeetechError::ChecksumMismatch { id: 3 })
        ));

        let overload = status(3, 0x20, &[]);
        assert!(matches!(
            decode_status(3, &overload),
            Err(FeetechError::MotorError { id: 3, status: 0x20 })
        ));

        assert!(decode_status(3, &[0xFF, 0xFF, 3]).is_err());
    }

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
    }

    #[test]
    fn test_wheel_speed_conversion() {
        // One revolution per second
        assert_eq!(radps_to_steps(2.0 * PI), 4096);
        assert_eq!(radps_to_steps(-2.0 * PI), -4096);
        assert_eq!(radps_to_steps(1e9), i16::MAX);
        assert!((steps_to_radps(1024) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_steering_position_conversion() {
        assert_eq!(angle_to_position(0.0), CENTER_POSITION);
        assert_eq!(angle_to_position(FRAC_PI_2), 3072);
        assert_eq!(angle_to_position(-FRAC_PI_2), 1024);
        assert_eq!(angle_to_position(10.0), 4095);
        assert!((position_to_angle(1024) + FRAC_PI_2).abs() < 1e-12);
    }
}
