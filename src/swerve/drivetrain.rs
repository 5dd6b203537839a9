// Drivetrain orchestrator: owns the four module controllers, the
// kinematics transform, the pose estimator and the heading sensor.

use tracing::{debug, info, warn};

use crate::config;
use crate::geometry::{Pose2d, Rotation2d, Translation2d};
use crate::hardware::{BusError, HeadingSensor, ModuleIo};
use crate::swerve::estimator::SwervePoseEstimator;
use crate::swerve::kinematics::{
    ChassisSpeeds, SwerveKinematics, SwerveModulePosition, SwerveModuleState,
};
use crate::swerve::module::SwerveModule;

/// Frame a drive command is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveFrame {
    RobotCentric,
    FieldRelative,
}

/// Alliance color, decides whether autonomous paths are mirrored and which
/// wall the match-start pose faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alliance {
    Blue,
    Red,
}

/// A gated vision input for one periodic step.
#[derive(Debug, Clone, Copy)]
pub struct VisionObservation {
    pub pose: Pose2d,
    pub timestamp_s: f64,
    pub std_devs: [f64; 3],
    pub tag_count: u32,
}

/// Capability surface handed to the autonomous path follower.
pub trait AutoDrive {
    fn current_pose(&self) -> Pose2d;
    fn reset_pose(&mut self, pose: Pose2d);
    fn robot_relative_speeds(&mut self) -> ChassisSpeeds;
    fn drive_robot_relative(&mut self, speeds: ChassisSpeeds);
    fn should_mirror_path(&self) -> bool;
}

pub struct Drivetrain<IO: ModuleIo, H: HeadingSensor> {
    modules: [SwerveModule<IO>; 4],
    kinematics: SwerveKinematics,
    estimator: SwervePoseEstimator,
    heading: H,
    alliance: Alliance,
    last_heading: Rotation2d,
}

impl<IO: ModuleIo, H: HeadingSensor> Drivetrain<IO, H> {
    pub fn new(mut modules: [SwerveModule<IO>; 4], mut heading: H, alliance: Alliance) -> Self {
        let kinematics = SwerveKinematics::new(config::drivetrain::MODULE_OFFSETS);
        let rotation = heading.rotation().unwrap_or_else(|e| {
            warn!("heading read failed at construction: {}", e);
            Rotation2d::ZERO
        });
        let positions = modules.each_mut().map(|module| module.position());
        let estimator = SwervePoseEstimator::new(
            kinematics.clone(),
            rotation,
            positions,
            Pose2d::default(),
            config::estimator::STATE_STD_DEVS,
        );

        Self {
            modules,
            kinematics,
            estimator,
            heading,
            alliance,
            last_heading: rotation,
        }
    }

    /// Bring every module up, seed steer encoders, zero drive distances
    /// and the heading. Must run once before the first motion command.
    pub fn initialize(&mut self) -> Result<(), BusError> {
        for module in &mut self.modules {
            module.initialize()?;
            module.reset_drive_distance();
        }
        self.heading.reset()?;
        self.reset_pose(Pose2d::default());
        info!("drivetrain initialized");
        Ok(())
    }

    /// Convert a chassis command into module states and dispatch them.
    pub fn drive(&mut self, speeds: ChassisSpeeds, frame: DriveFrame, center: Translation2d) {
        let robot_relative = match frame {
            DriveFrame::FieldRelative => {
                ChassisSpeeds::from_field_relative(speeds, self.heading_rotation())
            }
            DriveFrame::RobotCentric => speeds,
        };
        let command = robot_relative.discretize(config::runtime::LOOP_PERIOD_S);

        let mut states = self.kinematics.to_module_states_about(command, center);
        SwerveKinematics::desaturate(&mut states, config::drivetrain::MAX_SPEED_MPS);

        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(state, true);
        }
        self.heading
            .integrate_command(command.omega_rps, config::runtime::LOOP_PERIOD_S);
    }

    /// One control cycle: read module positions, advance the estimator,
    /// fuse vision if it passes the gates. Returns the published pose.
    pub fn periodic(&mut self, now_s: f64, vision: Option<VisionObservation>) -> Pose2d {
        for module in &mut self.modules {
            module.step(config::runtime::LOOP_PERIOD_S);
        }

        let positions = self.module_positions();
        let heading = self.heading_rotation();
        let pose = self.estimator.update(heading, positions, now_s);

        if let Some(observation) = vision {
            if self.should_fuse(&observation) {
                self.estimator.add_vision_measurement(
                    observation.pose,
                    observation.timestamp_s,
                    observation.std_devs,
                );
                return self.estimator.pose();
            }
        }
        pose
    }

    /// Current fused pose estimate.
    pub fn pose(&self) -> Pose2d {
        self.estimator.pose()
    }

    /// Re-seed the estimate at `pose`, keeping current sensor readings as
    /// the new odometry baseline.
    pub fn reset_pose(&mut self, pose: Pose2d) {
        let heading = self.heading_rotation();
        let positions = self.module_positions();
        self.estimator.reset_position(heading, positions, pose);
    }

    /// Zero the heading sensor and restate the current position with a
    /// zero heading.
    pub fn zero_heading(&mut self) {
        if let Err(e) = self.heading.reset() {
            warn!("heading reset failed: {}", e);
        }
        let translation = self.pose().translation;
        self.reset_pose(Pose2d::new(translation, Rotation2d::ZERO));
    }

    /// Match-start pose: origin, facing away from the alliance wall. Red
    /// starts rotated a half turn from blue.
    pub fn reset_pose_for_match_start(&mut self) {
        if let Err(e) = self.heading.reset() {
            warn!("heading reset failed: {}", e);
        }
        let rotation = match self.alliance {
            Alliance::Blue => Rotation2d::ZERO,
            Alliance::Red => Rotation2d::from_degrees(180.0),
        };
        self.reset_pose(Pose2d::from_xy_heading(0.0, 0.0, rotation));
    }

    /// Measured chassis velocity from forward kinematics, robot frame.
    pub fn robot_relative_speeds(&mut self) -> ChassisSpeeds {
        let states = self.module_states();
        self.kinematics.to_chassis_speeds(&states)
    }

    /// Measured per-module states.
    pub fn module_states(&mut self) -> [SwerveModuleState; 4] {
        self.modules.each_mut().map(|module| module.state())
    }

    /// Point the wheels along their corner diagonals with zero speed, an
    /// X stance that resists pushing.
    pub fn lock_wheels(&mut self) {
        for (module, offset) in self
            .modules
            .iter_mut()
            .zip(config::drivetrain::MODULE_OFFSETS)
        {
            module.set_desired_state(SwerveModuleState::new(0.0, offset.angle()), false);
        }
    }

    /// Current heading, falling back to the last good reading on a fault.
    pub fn heading(&mut self) -> Rotation2d {
        self.heading_rotation()
    }

    /// Current angular rate in degrees per second, zero on a fault.
    pub fn heading_rate_dps(&mut self) -> f64 {
        self.heading.rate_dps().unwrap_or_else(|e| {
            warn!("heading rate read failed: {}", e);
            0.0
        })
    }

    fn module_positions(&mut self) -> [SwerveModulePosition; 4] {
        self.modules.each_mut().map(|module| module.position())
    }

    fn heading_rotation(&mut self) -> Rotation2d {
        match self.heading.rotation() {
            Ok(rotation) => {
                self.last_heading = rotation;
                rotation
            }
            Err(e) => {
                warn!("heading read failed: {}", e);
                self.last_heading
            }
        }
    }

    fn should_fuse(&mut self, observation: &VisionObservation) -> bool {
        if observation.tag_count == 0 {
            debug!("vision sample with no landmarks, skipped");
            return false;
        }
        let rate = self.heading_rate_dps();
        if rate.abs() > config::vision::MAX_RATE_DPS {
            debug!("rotating at {rate:.0} dps, vision sample skipped");
            return false;
        }
        true
    }
}

impl<IO: ModuleIo, H: HeadingSensor> AutoDrive for Drivetrain<IO, H> {
    fn current_pose(&self) -> Pose2d {
        self.pose()
    }

    fn reset_pose(&mut self, pose: Pose2d) {
        Drivetrain::reset_pose(self, pose);
    }

    fn robot_relative_speeds(&mut self) -> ChassisSpeeds {
        Drivetrain::robot_relative_speeds(self)
    }

    fn drive_robot_relative(&mut self, speeds: ChassisSpeeds) {
        self.drive(speeds, DriveFrame::RobotCentric, Translation2d::ZERO);
    }

    fn should_mirror_path(&self) -> bool {
        self.alliance == Alliance::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{SimHeadingSensor, SimModuleIo};

    fn sim_modules() -> [SwerveModule<SimModuleIo>; 4] {
        config::drivetrain::MODULE_LABELS.map(|label| SwerveModule::new(label, SimModuleIo::new()))
    }

    fn sim_drivetrain() -> Drivetrain<SimModuleIo, SimHeadingSensor> {
        Drivetrain::new(sim_modules(), SimHeadingSensor::new(), Alliance::Blue)
    }

    #[test]
    fn field_relative_command_rotates_into_robot_frame() {
        let mut drivetrain = Drivetrain::new(
            sim_modules(),
            SimHeadingSensor::with_yaw(Rotation2d::from_degrees(90.0)),
            Alliance::Blue,
        );

        // Facing +90, a field +x request drives the robot's -y
        drivetrain.drive(
            ChassisSpeeds::new(1.0, 0.0, 0.0),
            DriveFrame::FieldRelative,
            Translation2d::ZERO,
        );
        drivetrain.periodic(0.02, None);

        for state in drivetrain.module_states() {
            assert!((state.speed_mps - 1.0).abs() < 1e-6);
            assert!((state.angle.degrees() + 90.0).abs() < 1e-6);
        }

        let speeds = drivetrain.robot_relative_speeds();
        assert!(speeds.vx_mps.abs() < 1e-6);
        assert!((speeds.vy_mps + 1.0).abs() < 1e-6);
        assert!(speeds.omega_rps.abs() < 1e-6);
    }

    #[test]
    fn straight_drive_advances_pose() {
        let mut drivetrain = sim_drivetrain();
        for i in 1..=50 {
            drivetrain.drive(
                ChassisSpeeds::new(1.0, 0.0, 0.0),
                DriveFrame::RobotCentric,
                Translation2d::ZERO,
            );
            drivetrain.periodic(i as f64 * 0.02, None);
        }
        let pose = drivetrain.pose();
        assert!((pose.x() - 1.0).abs() < 1e-3);
        assert!(pose.y().abs() < 1e-3);
    }

    #[test]
    fn vision_without_landmarks_is_bit_identical_noop() {
        let mut drivetrain = sim_drivetrain();
        for i in 1..=10 {
            drivetrain.periodic(i as f64 * 0.02, None);
        }
        let before = drivetrain.pose();

        let pose = drivetrain.periodic(
            0.22,
            Some(VisionObservation {
                pose: Pose2d::from_xy_heading(5.0, 5.0, Rotation2d::ZERO),
                timestamp_s: 0.1,
                std_devs: [1e-6, 1e-6, 1e-6],
                tag_count: 0,
            }),
        );
        assert_eq!(pose, before);
        assert_eq!(drivetrain.pose(), before);
    }

    #[test]
    fn vision_rejected_while_spinning_fast() {
        let mut drivetrain = sim_drivetrain();
        for i in 1..=10 {
            // 20 rad/s is about 1150 dps, past the gate
            drivetrain.drive(
                ChassisSpeeds::new(0.0, 0.0, 20.0),
                DriveFrame::RobotCentric,
                Translation2d::ZERO,
            );
            drivetrain.periodic(i as f64 * 0.02, None);
        }

        let pose = drivetrain.periodic(
            0.22,
            Some(VisionObservation {
                pose: Pose2d::from_xy_heading(5.0, 5.0, Rotation2d::ZERO),
                timestamp_s: 0.2,
                std_devs: [1e-6, 1e-6, 1e-6],
                tag_count: 4,
            }),
        );
        // A fully trusted sample at (5, 5) would have yanked the estimate;
        // rejection keeps it near the origin
        assert!(pose.translation.norm() < 0.5);
    }

    #[test]
    fn trusted_vision_is_fused_when_gates_pass() {
        let mut drivetrain = sim_drivetrain();
        for i in 1..=10 {
            drivetrain.periodic(i as f64 * 0.02, None);
        }

        let pose = drivetrain.periodic(
            0.22,
            Some(VisionObservation {
                pose: Pose2d::from_xy_heading(2.0, -1.0, Rotation2d::ZERO),
                timestamp_s: 0.2,
                std_devs: [1e-6, 1e-6, 1e6],
                tag_count: 4,
            }),
        );
        assert!((pose.x() - 2.0).abs() < 1e-3);
        assert!((pose.y() + 1.0).abs() < 1e-3);
    }

    #[test]
    fn lock_wheels_points_corner_diagonals() {
        let mut drivetrain = sim_drivetrain();
        drivetrain.lock_wheels();
        let expected = [45.0, 135.0, -45.0, -135.0];
        for (state, expected) in drivetrain.module_states().iter().zip(expected) {
            assert_eq!(state.speed_mps, 0.0);
            assert!((state.angle.degrees() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn match_start_pose_follows_alliance() {
        let mut blue = sim_drivetrain();
        blue.reset_pose_for_match_start();
        assert!(blue.pose().rotation.radians().abs() < 1e-9);
        assert!(!blue.should_mirror_path());

        let mut red = Drivetrain::new(sim_modules(), SimHeadingSensor::new(), Alliance::Red);
        red.reset_pose_for_match_start();
        assert!((red.pose().rotation.degrees().abs() - 180.0).abs() < 1e-9);
        assert!(red.should_mirror_path());
    }

    #[test]
    fn zero_heading_keeps_translation() {
        let mut drivetrain = sim_drivetrain();
        drivetrain.reset_pose(Pose2d::from_xy_heading(
            1.5,
            0.5,
            Rotation2d::from_degrees(30.0),
        ));
        drivetrain.zero_heading();
        let pose = drivetrain.pose();
        assert!((pose.x() - 1.5).abs() < 1e-9);
        assert!((pose.y() - 0.5).abs() < 1e-9);
        assert!(pose.rotation.radians().abs() < 1e-9);
    }

    #[test]
    fn auto_drive_dispatches_robot_centric() {
        let mut drivetrain = Drivetrain::new(
            sim_modules(),
            // A non-zero heading must not affect a robot-centric command
            SimHeadingSensor::with_yaw(Rotation2d::from_degrees(57.0)),
            Alliance::Blue,
        );
        drivetrain.drive_robot_relative(ChassisSpeeds::new(1.0, 0.0, 0.0));
        drivetrain.periodic(0.02, None);
        let speeds = drivetrain.robot_relative_speeds();
        assert!((speeds.vx_mps - 1.0).abs() < 1e-6);
        assert!(speeds.vy_mps.abs() < 1e-6);
    }

    #[test]
    fn reset_pose_is_reflected_immediately() {
        let mut drivetrain = sim_drivetrain();
        let target = Pose2d::from_xy_heading(3.0, -2.0, Rotation2d::from_degrees(45.0));
        AutoDrive::reset_pose(&mut drivetrain, target);
        assert_eq!(drivetrain.current_pose(), target);
    }
}
