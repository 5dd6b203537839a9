// Swerve drive kinematics: body-frame velocity <-> per-module states.
//
// Inverse kinematics follows the usual construction, each module's velocity
// vector is the chassis translational velocity plus the angular velocity
// crossed with the module's offset from the rotation center. Forward
// kinematics solves the overdetermined system with a precomputed
// least-squares pseudo-inverse.

use nalgebra::{SMatrix, SVector};

use crate::geometry::{Pose2d, Rotation2d, Translation2d, Twist2d};

/// Body- or field-frame chassis velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_rps: f64,
}

impl ChassisSpeeds {
    pub fn new(vx_mps: f64, vy_mps: f64, omega_rps: f64) -> Self {
        Self {
            vx_mps,
            vy_mps,
            omega_rps,
        }
    }

    /// Re-express a field-relative command in the robot frame by rotating
    /// the translational part by the inverse of the robot heading.
    pub fn from_field_relative(speeds: ChassisSpeeds, heading: Rotation2d) -> Self {
        let rotated = Translation2d::new(speeds.vx_mps, speeds.vy_mps).rotate_by(-heading);
        Self::new(rotated.x, rotated.y, speeds.omega_rps)
    }

    /// Correct a velocity command held constant over `dt` for the lag
    /// between translating and rotating at the same time. The returned
    /// speeds, integrated as a constant-curvature arc over `dt`, land on
    /// the pose the raw command intends.
    pub fn discretize(&self, dt: f64) -> ChassisSpeeds {
        let desired_delta = Pose2d::from_xy_heading(
            self.vx_mps * dt,
            self.vy_mps * dt,
            Rotation2d::new(self.omega_rps * dt),
        );
        let twist = Pose2d::default().log(&desired_delta);
        Self::new(twist.dx / dt, twist.dy / dt, twist.dtheta / dt)
    }
}

/// Commanded or measured state of one module.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModuleState {
    pub speed_mps: f64,
    pub angle: Rotation2d,
}

impl SwerveModuleState {
    pub fn new(speed_mps: f64, angle: Rotation2d) -> Self {
        Self { speed_mps, angle }
    }
}

/// Cumulative drive distance and current azimuth of one module.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModulePosition {
    pub distance_m: f64,
    pub angle: Rotation2d,
}

impl SwerveModulePosition {
    pub fn new(distance_m: f64, angle: Rotation2d) -> Self {
        Self { distance_m, angle }
    }
}

/// Kinematic transform for a four-module swerve base.
///
/// Module ordering is fixed at construction and every `[_; 4]` array passed
/// in or out uses that same ordering.
#[derive(Clone)]
pub struct SwerveKinematics {
    modules: [Translation2d; 4],
    forward: SMatrix<f64, 3, 8>,
    // Last commanded azimuths, held when the chassis command is zero so
    // the wheels do not snap back to 0 degrees
    last_angles: [Rotation2d; 4],
}

impl SwerveKinematics {
    pub fn new(modules: [Translation2d; 4]) -> Self {
        let mut inverse = SMatrix::<f64, 8, 3>::zeros();
        for (i, module) in modules.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -module.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = module.x;
        }
        let forward = inverse
            .pseudo_inverse(1e-9)
            .expect("module offsets are degenerate");

        Self {
            modules,
            forward,
            last_angles: [Rotation2d::ZERO; 4],
        }
    }

    /// Inverse kinematics about the robot center.
    pub fn to_module_states(&mut self, speeds: ChassisSpeeds) -> [SwerveModuleState; 4] {
        self.to_module_states_about(speeds, Translation2d::ZERO)
    }

    /// Inverse kinematics about an arbitrary center of rotation in the
    /// robot frame.
    pub fn to_module_states_about(
        &mut self,
        speeds: ChassisSpeeds,
        center: Translation2d,
    ) -> [SwerveModuleState; 4] {
        let mut states = [SwerveModuleState::default(); 4];

        if speeds.vx_mps == 0.0 && speeds.vy_mps == 0.0 && speeds.omega_rps == 0.0 {
            for (state, angle) in states.iter_mut().zip(self.last_angles) {
                state.angle = angle;
            }
            return states;
        }

        for (i, module) in self.modules.iter().enumerate() {
            let vx = speeds.vx_mps - speeds.omega_rps * (module.y - center.y);
            let vy = speeds.vy_mps + speeds.omega_rps * (module.x - center.x);
            let speed = vx.hypot(vy);
            let angle = if speed > 1e-9 {
                Rotation2d::from_components(vx, vy)
            } else {
                self.last_angles[i]
            };
            states[i] = SwerveModuleState::new(speed, angle);
            self.last_angles[i] = angle;
        }
        states
    }

    /// Forward kinematics, measured module states to chassis velocity.
    pub fn to_chassis_speeds(&self, states: &[SwerveModuleState; 4]) -> ChassisSpeeds {
        let mut components = SVector::<f64, 8>::zeros();
        for (i, state) in states.iter().enumerate() {
            components[2 * i] = state.speed_mps * state.angle.cos();
            components[2 * i + 1] = state.speed_mps * state.angle.sin();
        }
        let chassis = self.forward * components;
        ChassisSpeeds::new(chassis[0], chassis[1], chassis[2])
    }

    /// Forward kinematics over module position deltas, producing the
    /// body-frame twist used by odometry.
    pub fn to_twist(&self, deltas: &[SwerveModulePosition; 4]) -> Twist2d {
        let mut components = SVector::<f64, 8>::zeros();
        for (i, delta) in deltas.iter().enumerate() {
            components[2 * i] = delta.distance_m * delta.angle.cos();
            components[2 * i + 1] = delta.distance_m * delta.angle.sin();
        }
        let chassis = self.forward * components;
        Twist2d::new(chassis[0], chassis[1], chassis[2])
    }

    /// Uniformly scale all module speeds down so none exceeds
    /// `max_speed_mps`, preserving the velocity direction of every module.
    pub fn desaturate(states: &mut [SwerveModuleState; 4], max_speed_mps: f64) {
        let highest = states
            .iter()
            .map(|state| state.speed_mps.abs())
            .fold(0.0, f64::max);
        if highest > max_speed_mps {
            let scale = max_speed_mps / highest;
            for state in states.iter_mut() {
                state.speed_mps *= scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    const TOL: f64 = 1e-9;

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new(config::drivetrain::MODULE_OFFSETS)
    }

    fn assert_speeds_eq(a: ChassisSpeeds, b: ChassisSpeeds, tol: f64) {
        assert!((a.vx_mps - b.vx_mps).abs() < tol, "vx {a:?} vs {b:?}");
        assert!((a.vy_mps - b.vy_mps).abs() < tol, "vy {a:?} vs {b:?}");
        assert!((a.omega_rps - b.omega_rps).abs() < tol, "omega {a:?} vs {b:?}");
    }

    #[test]
    fn straight_line_points_all_modules_forward() {
        let states = kinematics().to_module_states(ChassisSpeeds::new(1.0, 0.0, 0.0));
        for state in states {
            assert!((state.speed_mps - 1.0).abs() < TOL);
            assert!(state.angle.radians().abs() < TOL);
        }
    }

    #[test]
    fn pure_rotation_is_tangential() {
        let mut kinematics = kinematics();
        let states = kinematics.to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        let radius = config::drivetrain::MODULE_OFFSETS[0].norm();
        // Left front sits at (+,+), its tangent for CCW rotation points (-, +)
        assert!((states[0].speed_mps - radius).abs() < TOL);
        assert!((states[0].angle.degrees() - 135.0).abs() < 1e-6);
        for state in states {
            assert!((state.speed_mps - radius).abs() < TOL);
        }
    }

    #[test]
    fn forward_inverts_inverse() {
        let mut kinematics = kinematics();
        let speeds = ChassisSpeeds::new(1.2, -0.4, 0.9);
        let states = kinematics.to_module_states(speeds);
        assert_speeds_eq(kinematics.to_chassis_speeds(&states), speeds, 1e-9);
    }

    #[test]
    fn field_relative_at_quarter_turn_heading() {
        // Facing +90 degrees, a field +x command is a robot-frame -y
        // (rightward) command
        let speeds = ChassisSpeeds::from_field_relative(
            ChassisSpeeds::new(1.0, 0.0, 0.0),
            Rotation2d::from_degrees(90.0),
        );
        assert_speeds_eq(speeds, ChassisSpeeds::new(0.0, -1.0, 0.0), 1e-9);

        let mut a = kinematics();
        let mut b = kinematics();
        let from_field = a.to_module_states(speeds);
        let robot_centric = b.to_module_states(ChassisSpeeds::new(0.0, -1.0, 0.0));
        for (x, y) in from_field.iter().zip(robot_centric.iter()) {
            assert!((x.speed_mps - y.speed_mps).abs() < TOL);
            assert!((x.angle.radians() - y.angle.radians()).abs() < TOL);
        }
    }

    #[test]
    fn zero_command_holds_last_angles() {
        let mut kinematics = kinematics();
        kinematics.to_module_states(ChassisSpeeds::new(0.0, 1.0, 0.0));
        let states = kinematics.to_module_states(ChassisSpeeds::default());
        for state in states {
            assert_eq!(state.speed_mps, 0.0);
            assert!((state.angle.degrees() - 90.0).abs() < 1e-6);
        }
    }

    #[test]
    fn desaturate_scales_proportionally() {
        let mut states = [
            SwerveModuleState::new(10.0, Rotation2d::ZERO),
            SwerveModuleState::new(15.0, Rotation2d::ZERO),
            SwerveModuleState::new(8.0, Rotation2d::ZERO),
            SwerveModuleState::new(12.0, Rotation2d::ZERO),
        ];
        SwerveKinematics::desaturate(&mut states, 10.0);

        let expected = [20.0 / 3.0, 10.0, 16.0 / 3.0, 8.0];
        for (state, expected) in states.iter().zip(expected) {
            assert!((state.speed_mps - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn desaturate_never_increases_and_keeps_ratios() {
        let original = [
            SwerveModuleState::new(3.0, Rotation2d::ZERO),
            SwerveModuleState::new(-6.0, Rotation2d::ZERO),
            SwerveModuleState::new(4.5, Rotation2d::ZERO),
            SwerveModuleState::new(1.5, Rotation2d::ZERO),
        ];
        let mut states = original;
        SwerveKinematics::desaturate(&mut states, 4.0);
        for (after, before) in states.iter().zip(original.iter()) {
            assert!(after.speed_mps.abs() <= before.speed_mps.abs() + TOL);
            // Same ratio against the saturated module
            assert!((after.speed_mps / states[1].speed_mps
                - before.speed_mps / original[1].speed_mps)
                .abs()
                < TOL);
            assert!(after.speed_mps.abs() <= 4.0 + TOL);
        }
    }

    #[test]
    fn desaturate_below_limit_is_noop() {
        let mut states = [SwerveModuleState::new(2.0, Rotation2d::ZERO); 4];
        SwerveKinematics::desaturate(&mut states, 4.5);
        for state in states {
            assert_eq!(state.speed_mps, 2.0);
        }
    }

    #[test]
    fn rotation_about_module_leaves_it_stationary() {
        let mut kinematics = kinematics();
        let states = kinematics.to_module_states_about(
            ChassisSpeeds::new(0.0, 0.0, 2.0),
            config::drivetrain::MODULE_OFFSETS[0],
        );
        assert!(states[0].speed_mps.abs() < TOL);
        assert!(states[1].speed_mps > 0.1);
    }

    #[test]
    fn discretize_lands_on_intended_pose() {
        let dt = 0.02;
        let raw = ChassisSpeeds::new(2.0, 0.5, 3.0);
        let corrected = raw.discretize(dt);

        // Integrating the corrected command as an arc over one period must
        // reproduce the pose delta the raw command names
        let arc = Pose2d::default().exp(&Twist2d::new(
            corrected.vx_mps * dt,
            corrected.vy_mps * dt,
            corrected.omega_rps * dt,
        ));
        assert!((arc.x() - raw.vx_mps * dt).abs() < 1e-9);
        assert!((arc.y() - raw.vy_mps * dt).abs() < 1e-9);
        assert!((arc.rotation.radians() - raw.omega_rps * dt).abs() < 1e-9);
    }

    #[test]
    fn discretize_pure_translation_unchanged() {
        let raw = ChassisSpeeds::new(1.5, -0.5, 0.0);
        assert_speeds_eq(raw.discretize(0.02), raw, 1e-9);
    }
}
