// Sensor/actuator capabilities behind the module and heading controllers.
//
// Each capability has a hardware-backed implementation over the serial
// actuator bus and a simulation-integrated one that closes the loop on the
// commanded intent. The backend is picked once at construction; everything
// above these traits is identical in both modes.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::config::conversions;
use crate::geometry::Rotation2d;
use crate::hardware::bus::{ActuatorBus, ControlMode, Register, Result};

/// Sensor and actuator surface of one swerve module.
///
/// Steer angles are continuous (unwrapped) radians so position targets can
/// be expressed as minimal deltas from the current sensor reading.
pub trait ModuleIo {
    /// Bring the actuators into a commandable state. Called once before
    /// the first motion command.
    fn initialize(&mut self) -> Result<()>;

    /// Measured drive speed, m/s
    fn drive_velocity(&mut self) -> Result<f64>;

    /// Cumulative drive distance, meters
    fn drive_distance(&mut self) -> Result<f64>;

    /// Current azimuth from the steer controller's relative encoder,
    /// continuous radians
    fn steer_angle(&mut self) -> Result<f64>;

    /// Command the drive actuator. `duty` in [-1, 1] is what goes on the
    /// wire; `target_mps` is the physical intent, used by simulation
    /// backends to integrate distance.
    fn set_drive_output(&mut self, duty: f64, target_mps: f64) -> Result<()>;

    /// Command the steer actuator to a continuous azimuth target, radians
    fn set_steer_target(&mut self, angle_rad: f64) -> Result<()>;

    /// Re-zero the steer controller's relative encoder from the absolute
    /// azimuth encoder
    fn reseed_steer_encoder(&mut self) -> Result<()>;

    /// Re-zero the cumulative drive distance counter
    fn reset_drive_distance(&mut self) -> Result<()>;

    /// Advance internal simulation state by `dt` seconds. No-op on
    /// hardware backends.
    fn step(&mut self, _dt: f64) {}
}

/// Absolute heading source.
pub trait HeadingSensor {
    /// Current heading, counter-clockwise positive
    fn rotation(&mut self) -> Result<Rotation2d>;

    /// Angular rate, degrees per second
    fn rate_dps(&mut self) -> Result<f64>;

    /// Re-zero the heading
    fn reset(&mut self) -> Result<()>;

    /// Record the commanded angular velocity. Simulation backends
    /// integrate it into the reported heading; hardware ignores it.
    fn integrate_command(&mut self, _omega_rps: f64, _dt: f64) {}
}

/// Shared handle to the single serial bus all devices sit on. All access
/// happens from the control-loop task.
pub type SharedBus = Rc<RefCell<ActuatorBus>>;

/// Hardware-backed module I/O over the actuator bus.
pub struct BusModuleIo {
    bus: SharedBus,
    drive_id: u8,
    steer_id: u8,
    encoder_id: u8,
}

impl BusModuleIo {
    pub fn new(bus: SharedBus, drive_id: u8, steer_id: u8, encoder_id: u8) -> Self {
        Self {
            bus,
            drive_id,
            steer_id,
            encoder_id,
        }
    }
}

impl ModuleIo for BusModuleIo {
    fn initialize(&mut self) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        for id in [self.drive_id, self.steer_id, self.encoder_id] {
            if !bus.ping(id)? {
                return Err(crate::hardware::bus::BusError::Timeout { id });
            }
        }

        // Mode changes require torque off
        bus.disable_torque(self.drive_id)?;
        bus.disable_torque(self.steer_id)?;
        bus.set_control_mode(self.drive_id, ControlMode::Duty)?;
        bus.set_control_mode(self.steer_id, ControlMode::Position)?;
        bus.enable_torque(self.drive_id)?;
        bus.enable_torque(self.steer_id)?;

        info!(
            "Module devices ready: drive={}, steer={}, encoder={}",
            self.drive_id, self.steer_id, self.encoder_id
        );
        Ok(())
    }

    fn drive_velocity(&mut self) -> Result<f64> {
        let ticks_per_s = self.bus.borrow_mut().feedback_velocity(self.drive_id)?;
        Ok(ticks_per_s as f64 / conversions::DRIVE_TICKS_PER_METER)
    }

    fn drive_distance(&mut self) -> Result<f64> {
        let ticks = self.bus.borrow_mut().feedback_position(self.drive_id)?;
        Ok(ticks as f64 / conversions::DRIVE_TICKS_PER_METER)
    }

    fn steer_angle(&mut self) -> Result<f64> {
        let ticks = self.bus.borrow_mut().feedback_position(self.steer_id)?;
        Ok(ticks as f64 / conversions::STEER_TICKS_PER_RAD)
    }

    fn set_drive_output(&mut self, duty: f64, _target_mps: f64) -> Result<()> {
        let raw = (duty * conversions::DUTY_RANGE).round() as i16;
        self.bus.borrow_mut().write_duty(self.drive_id, raw)
    }

    fn set_steer_target(&mut self, angle_rad: f64) -> Result<()> {
        let ticks = (angle_rad * conversions::STEER_TICKS_PER_RAD).round() as i32;
        self.bus
            .borrow_mut()
            .write_i32(self.steer_id, Register::GoalPosition, ticks)
    }

    fn reseed_steer_encoder(&mut self) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        let counts = bus.absolute_position(self.encoder_id)?;
        let angle_rad =
            counts as f64 / conversions::ENCODER_TICKS_PER_REV * std::f64::consts::TAU;
        let ticks = (angle_rad * conversions::STEER_TICKS_PER_RAD).round() as i32;
        bus.seed_feedback_position(self.steer_id, ticks)
    }

    fn reset_drive_distance(&mut self) -> Result<()> {
        self.bus.borrow_mut().seed_feedback_position(self.drive_id, 0)
    }
}

/// Hardware-backed heading sensor, an IMU device on the same bus.
pub struct BusHeadingSensor {
    bus: SharedBus,
    imu_id: u8,
}

impl BusHeadingSensor {
    pub fn new(bus: SharedBus, imu_id: u8) -> Self {
        Self { bus, imu_id }
    }
}

impl HeadingSensor for BusHeadingSensor {
    fn rotation(&mut self) -> Result<Rotation2d> {
        let centideg = self.bus.borrow_mut().read_i32(self.imu_id, Register::Yaw)?;
        Ok(Rotation2d::from_degrees(centideg as f64 / 100.0))
    }

    fn rate_dps(&mut self) -> Result<f64> {
        let decideg = self.bus.borrow_mut().read_i16(self.imu_id, Register::YawRate)?;
        Ok(decideg as f64 / 10.0)
    }

    fn reset(&mut self) -> Result<()> {
        self.bus.borrow_mut().write_u8(self.imu_id, Register::YawReset, 1)
    }
}

/// Simulation module I/O: ideal steering, drive distance integrated from
/// the commanded speed.
#[derive(Debug, Default)]
pub struct SimModuleIo {
    steer_rad: f64,
    duty: f64,
    target_mps: f64,
    velocity_mps: f64,
    distance_m: f64,
}

impl SimModuleIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded drive duty, for diagnostics
    pub fn last_duty(&self) -> f64 {
        self.duty
    }
}

impl ModuleIo for SimModuleIo {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn drive_velocity(&mut self) -> Result<f64> {
        Ok(self.velocity_mps)
    }

    fn drive_distance(&mut self) -> Result<f64> {
        Ok(self.distance_m)
    }

    fn steer_angle(&mut self) -> Result<f64> {
        Ok(self.steer_rad)
    }

    fn set_drive_output(&mut self, duty: f64, target_mps: f64) -> Result<()> {
        self.duty = duty;
        self.target_mps = target_mps;
        Ok(())
    }

    fn set_steer_target(&mut self, angle_rad: f64) -> Result<()> {
        self.steer_rad = angle_rad;
        Ok(())
    }

    fn reseed_steer_encoder(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset_drive_distance(&mut self) -> Result<()> {
        self.distance_m = 0.0;
        Ok(())
    }

    fn step(&mut self, dt: f64) {
        self.velocity_mps = self.target_mps;
        self.distance_m += self.velocity_mps * dt;
    }
}

/// Simulation heading sensor: integrates the commanded angular velocity.
#[derive(Debug, Default)]
pub struct SimHeadingSensor {
    yaw_rad: f64,
    rate_dps: f64,
}

impl SimHeadingSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_yaw(yaw: Rotation2d) -> Self {
        Self {
            yaw_rad: yaw.radians(),
            rate_dps: 0.0,
        }
    }
}

impl HeadingSensor for SimHeadingSensor {
    fn rotation(&mut self) -> Result<Rotation2d> {
        Ok(Rotation2d::new(self.yaw_rad))
    }

    fn rate_dps(&mut self) -> Result<f64> {
        Ok(self.rate_dps)
    }

    fn reset(&mut self) -> Result<()> {
        self.yaw_rad = 0.0;
        self.rate_dps = 0.0;
        Ok(())
    }

    fn integrate_command(&mut self, omega_rps: f64, dt: f64) {
        self.yaw_rad += omega_rps * dt;
        self.rate_dps = omega_rps.to_degrees();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_module_integrates_commanded_speed() {
        let mut io = SimModuleIo::new();
        io.set_drive_output(0.25, 1.5).unwrap();
        for _ in 0..50 {
            io.step(0.02);
        }
        assert!((io.drive_distance().unwrap() - 1.5).abs() < 1e-9);
        assert!((io.drive_velocity().unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn sim_heading_integrates_commanded_omega() {
        let mut imu = SimHeadingSensor::new();
        for _ in 0..50 {
            imu.integrate_command(std::f64::consts::PI, 0.02);
        }
        // One second at pi rad/s is a half turn
        assert!((imu.rotation().unwrap().degrees() - 180.0).abs() < 1e-6);
        imu.reset().unwrap();
        assert_eq!(imu.rotation().unwrap(), Rotation2d::ZERO);
    }
}
