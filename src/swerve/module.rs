// One swerve module: a drive actuator, a steer actuator and an absolute
// azimuth encoder behind a ModuleIo capability.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::{info, warn};

use crate::config;
use crate::geometry::Rotation2d;
use crate::hardware::ModuleIo;
use crate::swerve::kinematics::{SwerveModulePosition, SwerveModuleState};

/// Controller for a single module.
///
/// Sensor reads fall back to the last good value on a bus fault so one bad
/// cycle never propagates past a log line.
pub struct SwerveModule<IO: ModuleIo> {
    label: &'static str,
    io: IO,
    last_steer_rad: f64,
    last_velocity_mps: f64,
    last_distance_m: f64,
}

impl<IO: ModuleIo> SwerveModule<IO> {
    pub fn new(label: &'static str, io: IO) -> Self {
        Self {
            label,
            io,
            last_steer_rad: 0.0,
            last_velocity_mps: 0.0,
            last_distance_m: 0.0,
        }
    }

    /// Bring the actuators up and seed the steer encoder from the absolute
    /// encoder. Must run once before the first motion command.
    pub fn initialize(&mut self) -> Result<(), crate::hardware::BusError> {
        self.io.initialize()?;
        self.io.reseed_steer_encoder()?;
        info!("{}: module initialized", self.label);
        Ok(())
    }

    /// Measured speed and azimuth.
    pub fn state(&mut self) -> SwerveModuleState {
        let speed = match self.io.drive_velocity() {
            Ok(v) => {
                self.last_velocity_mps = v;
                v
            }
            Err(e) => {
                warn!("{}: drive velocity read failed: {}", self.label, e);
                self.last_velocity_mps
            }
        };
        SwerveModuleState::new(speed, Rotation2d::new(self.steer_angle_or_last()))
    }

    /// Cumulative drive distance and current azimuth.
    pub fn position(&mut self) -> SwerveModulePosition {
        let distance = match self.io.drive_distance() {
            Ok(d) => {
                self.last_distance_m = d;
                d
            }
            Err(e) => {
                warn!("{}: drive distance read failed: {}", self.label, e);
                self.last_distance_m
            }
        };
        SwerveModulePosition::new(distance, Rotation2d::new(self.steer_angle_or_last()))
    }

    /// Command the module toward `desired`.
    ///
    /// The steer delta is wrapped to (-180, 180] degrees so the commanded
    /// rotation is always the minimal arc; an exact half turn resolves to
    /// +180 (counter-clockwise). With `optimize`, a delta beyond 90 degrees
    /// is replaced by the antipodal angle with negated speed, capping the
    /// commanded rotation at 90 degrees.
    pub fn set_desired_state(&mut self, desired: SwerveModuleState, optimize: bool) {
        let current_rad = self.steer_angle_or_last();
        let current = Rotation2d::new(current_rad);

        let mut speed = desired.speed_mps;
        let mut delta = (desired.angle - current).radians();
        if optimize && delta.abs() > FRAC_PI_2 {
            speed = -speed;
            delta = Rotation2d::new(delta + PI).radians();
        }
        let steer_target = current_rad + delta;

        let mut duty = (speed / config::drivetrain::MAX_SPEED_MPS).clamp(-1.0, 1.0);
        if speed != 0.0 {
            // Static-friction feed-forward by sign of the commanded speed
            duty = (duty + speed.signum() * config::drivetrain::DRIVE_KS).clamp(-1.0, 1.0);
        }

        if let Err(e) = self.io.set_steer_target(steer_target) {
            warn!("{}: steer command failed: {}", self.label, e);
        }
        if let Err(e) = self.io.set_drive_output(duty, speed) {
            warn!("{}: drive command failed: {}", self.label, e);
        }
    }

    /// Re-zero the steer relative encoder against the absolute encoder
    /// (recovers from power-cycle drift).
    pub fn reset_steer_encoder(&mut self) {
        if let Err(e) = self.io.reseed_steer_encoder() {
            warn!("{}: steer encoder reseed failed: {}", self.label, e);
        }
    }

    /// Re-zero the cumulative drive distance counter (match start).
    pub fn reset_drive_distance(&mut self) {
        self.last_distance_m = 0.0;
        if let Err(e) = self.io.reset_drive_distance() {
            warn!("{}: drive distance reset failed: {}", self.label, e);
        }
    }

    /// Advance simulation backends by one control period.
    pub fn step(&mut self, dt: f64) {
        self.io.step(dt);
    }

    fn steer_angle_or_last(&mut self) -> f64 {
        match self.io.steer_angle() {
            Ok(angle) => {
                self.last_steer_rad = angle;
                angle
            }
            Err(e) => {
                warn!("{}: steer angle read failed: {}", self.label, e);
                self.last_steer_rad
            }
        }
    }
}

impl<IO: ModuleIo> Drop for SwerveModule<IO> {
    fn drop(&mut self) {
        // Leave the drive unpowered when the controller goes away
        if let Err(e) = self.io.set_drive_output(0.0, 0.0) {
            warn!("{}: failed to stop drive on drop: {}", self.label, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimModuleIo;

    const TOL: f64 = 1e-9;

    fn new_module() -> SwerveModule<SimModuleIo> {
        SwerveModule::new("test", SimModuleIo::new())
    }

    fn steer_degrees(module: &mut SwerveModule<SimModuleIo>) -> f64 {
        module.steer_angle_or_last().to_degrees()
    }

    #[test]
    fn short_way_across_the_wrap() {
        let mut module = new_module();
        // Park the wheel at 170 degrees
        module.set_desired_state(
            SwerveModuleState::new(0.0, Rotation2d::from_degrees(170.0)),
            false,
        );
        assert!((steer_degrees(&mut module) - 170.0).abs() < TOL);

        // -170 is 20 degrees away the short way, no flip needed
        module.set_desired_state(
            SwerveModuleState::new(1.0, Rotation2d::from_degrees(-170.0)),
            true,
        );
        let continuous = steer_degrees(&mut module);
        assert!((continuous - 190.0).abs() < 1e-6);
        assert!(module.state().speed_mps >= 0.0);
        assert!((module.state().angle.degrees() + 170.0).abs() < 1e-6);
    }

    #[test]
    fn large_delta_flips_and_negates_speed() {
        let mut module = new_module();
        module.set_desired_state(
            SwerveModuleState::new(2.0, Rotation2d::from_degrees(120.0)),
            true,
        );
        // Flip: rotate -60 instead of +120, drive backward
        assert!((steer_degrees(&mut module) + 60.0).abs() < 1e-6);
        assert!(module.io.last_duty() < 0.0);
    }

    #[test]
    fn optimized_rotation_never_exceeds_quarter_turn() {
        for target_deg in (0..360).step_by(15) {
            let mut module = new_module();
            module.set_desired_state(
                SwerveModuleState::new(1.0, Rotation2d::from_degrees(target_deg as f64)),
                true,
            );
            let rotation = steer_degrees(&mut module).abs();
            assert!(
                rotation <= 90.0 + 1e-6,
                "target {target_deg} commanded {rotation}"
            );
        }
    }

    #[test]
    fn half_turn_tie_breaks_ccw() {
        // Without optimization an exact half turn rotates +180
        let mut module = new_module();
        module.set_desired_state(
            SwerveModuleState::new(1.0, Rotation2d::from_degrees(180.0)),
            false,
        );
        assert!((steer_degrees(&mut module) - 180.0).abs() < 1e-6);

        // With optimization it flips to a zero rotation with negated speed
        let mut module = new_module();
        module.set_desired_state(
            SwerveModuleState::new(1.0, Rotation2d::from_degrees(180.0)),
            true,
        );
        assert!(steer_degrees(&mut module).abs() < 1e-6);
        assert!(module.io.last_duty() < 0.0);
    }

    #[test]
    fn feed_forward_biases_by_sign_and_zero_is_zero() {
        let mut module = new_module();
        module.set_desired_state(SwerveModuleState::new(0.1, Rotation2d::ZERO), true);
        assert!(module.io.last_duty() >= 0.1 / config::drivetrain::MAX_SPEED_MPS);

        module.set_desired_state(SwerveModuleState::new(-0.1, Rotation2d::ZERO), true);
        assert!(module.io.last_duty() <= -0.1 / config::drivetrain::MAX_SPEED_MPS);

        module.set_desired_state(SwerveModuleState::new(0.0, Rotation2d::ZERO), true);
        assert_eq!(module.io.last_duty(), 0.0);
    }

    #[test]
    fn overspeed_clamps_to_full_duty() {
        let mut module = new_module();
        module.set_desired_state(
            SwerveModuleState::new(config::drivetrain::MAX_SPEED_MPS * 2.0, Rotation2d::ZERO),
            true,
        );
        assert_eq!(module.io.last_duty(), 1.0);
    }

    #[test]
    fn position_integrates_in_simulation() {
        let mut module = new_module();
        module.set_desired_state(SwerveModuleState::new(1.0, Rotation2d::ZERO), true);
        for _ in 0..50 {
            module.step(0.02);
        }
        let position = module.position();
        assert!((position.distance_m - 1.0).abs() < 1e-9);
        assert!(position.angle.radians().abs() < TOL);

        module.reset_drive_distance();
        assert_eq!(module.position().distance_m, 0.0);
    }
}
