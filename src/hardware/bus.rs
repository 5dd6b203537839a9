// Serial bridge to the drivetrain actuator bus.
//
// All drive controllers, steer controllers, absolute azimuth encoders and
// the IMU sit on one half-duplex serial bus behind a USB bridge.
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use crate::config;

pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses shared by the bus devices. Drive and steer
/// controllers expose the full set; encoder and IMU devices only the
/// read-only tail of it.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 3, // 2 bytes, read-only
    Id = 5,          // 1 byte

    // RAM area (volatile)
    ControlMode = 32,      // 1 byte: 0=duty, 1=position
    TorqueEnable = 40,     // 1 byte: 0=off, 1=on
    GoalDuty = 42,         // 2 bytes signed, duty channel, +-DUTY_RANGE
    GoalPosition = 44,     // 4 bytes signed, position channel, ticks
    FeedbackPosition = 48, // 4 bytes signed, cumulative ticks, read-only; writable to seed
    FeedbackVelocity = 52, // 4 bytes signed, ticks/s, read-only

    // Absolute azimuth encoder devices
    AbsolutePosition = 56, // 2 bytes, 0..4095, read-only

    // IMU device
    Yaw = 58,      // 4 bytes signed, centidegrees, continuous
    YawRate = 62,  // 2 bytes signed, decidegrees/s
    YawReset = 64, // 1 byte, write 1 to re-zero
}

/// Control modes for the motor controllers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMode {
    Duty = 0,
    Position = 1,
}

/// Error types for bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from device {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for device {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Device {id} returned error status: 0x{status:02X}")]
    DeviceError { id: u8, status: u8 },

    #[error("Timeout waiting for response from device {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Handle to the serial actuator bus.
pub struct ActuatorBus {
    port: Box<dyn SerialPort>,
}

impl ActuatorBus {
    /// Open a new connection to the bus bridge
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, config::bus::BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Read remaining bytes (error + params + checksum = length bytes)
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        // Verify checksum
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(BusError::ChecksumMismatch { id });
        }

        // Check error status
        let error_status = remaining[0];
        if error_status != 0 {
            return Err(BusError::DeviceError {
                id,
                status: error_status,
            });
        }

        // Return parameters (excluding error byte and checksum)
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a device to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write u8 to device {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let params = [register as u8, (value & 0xFF) as u8, (value >> 8) as u8];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write u16 to device {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write a signed duty value; the duty channel uses sign-magnitude
    /// encoding (bit 15 = direction, bits 0-14 = magnitude)
    pub fn write_duty(&mut self, id: u8, value: i16) -> Result<()> {
        self.write_u16(id, Register::GoalDuty, encode_sign_magnitude(value))
    }

    /// Write four bytes (little-endian two's complement) to a register
    pub fn write_i32(&mut self, id: u8, register: Register, value: i32) -> Result<()> {
        let bytes = value.to_le_bytes();
        let params = [register as u8, bytes[0], bytes[1], bytes[2], bytes[3]];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write i32 to device {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let params = [register as u8, 1]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.is_empty() {
            return Err(BusError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            });
        }
        Ok(response[0])
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let params = [register as u8, 2]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Read a signed two-byte register (two's complement)
    pub fn read_i16(&mut self, id: u8, register: Register) -> Result<i16> {
        Ok(self.read_u16(id, register)? as i16)
    }

    /// Read four bytes (little-endian two's complement) from a register
    pub fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let params = [register as u8, 4]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 4 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Expected 4 bytes, got {}", response.len()),
            });
        }
        Ok(i32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ]))
    }

    /// Sync write: write the same register on multiple devices in one
    /// broadcast packet, data: [(id, value), ...]
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // Sync write format:
        // [start_addr, data_length, id1, data1_lo, data1_hi, ...]
        let data_length: u8 = 2; // 2 bytes per device
        let mut params = vec![register as u8, data_length];

        for &(id, value) in data {
            params.push(id);
            params.push((value & 0xFF) as u8);
            params.push((value >> 8) as u8);
        }

        // Broadcast ID for sync write
        let packet = Self::build_packet(0xFE, Instruction::SyncWrite, &params);
        debug!("Sync write to {} devices: reg={:?}", data.len(), register);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }

    // === High-level convenience methods ===

    /// Enable output on a motor controller
    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)
    }

    /// Disable output on a motor controller (coast)
    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)
    }

    /// Set control mode (must disable torque first)
    pub fn set_control_mode(&mut self, id: u8, mode: ControlMode) -> Result<()> {
        self.write_u8(id, Register::ControlMode, mode as u8)
    }

    /// Seed a controller's cumulative feedback position counter
    pub fn seed_feedback_position(&mut self, id: u8, ticks: i32) -> Result<()> {
        self.write_i32(id, Register::FeedbackPosition, ticks)
    }

    /// Read a controller's cumulative feedback position counter
    pub fn feedback_position(&mut self, id: u8) -> Result<i32> {
        self.read_i32(id, Register::FeedbackPosition)
    }

    /// Read a controller's feedback velocity, ticks/s
    pub fn feedback_velocity(&mut self, id: u8) -> Result<i32> {
        self.read_i32(id, Register::FeedbackVelocity)
    }

    /// Read an absolute azimuth encoder, 0..4095 counts per revolution
    pub fn absolute_position(&mut self, id: u8) -> Result<u16> {
        self.read_u16(id, Register::AbsolutePosition)
    }
}

/// Encode a signed value to sign-magnitude format
/// Bit 15 = sign (1 = negative), Bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-value as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_protocol() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        let checksum = ActuatorBus::checksum(&data);
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum, 215);
    }

    #[test]
    fn sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064); // 0x8000 | 100
        assert_eq!(encode_sign_magnitude(-1), 0x8001);
    }

    #[test]
    fn ping_packet_layout() {
        let packet = ActuatorBus::build_packet(1, Instruction::Ping, &[]);
        // Header (2) + ID (1) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[0], 0xFF);
        assert_eq!(packet[1], 0xFF);
        assert_eq!(packet[2], 1); // ID
        assert_eq!(packet[3], 2); // Length (instruction + checksum)
        assert_eq!(packet[4], 0x01); // PING instruction
    }

    #[test]
    fn i32_write_packet_is_little_endian() {
        let packet = ActuatorBus::build_packet(
            2,
            Instruction::Write,
            &[Register::GoalPosition as u8, 0x78, 0x56, 0x34, 0x12],
        );
        assert_eq!(&packet[5..10], &[Register::GoalPosition as u8, 0x78, 0x56, 0x34, 0x12]);
        let value = i32::from_le_bytes([packet[6], packet[7], packet[8], packet[9]]);
        assert_eq!(value, 0x1234_5678);
    }
}
