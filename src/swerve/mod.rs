// Swerve drivetrain core
//
// Provides:
// - Kinematics transform (body velocity <-> module states)
// - Per-module control with shortest-path steering
// - Fused pose estimation (odometry + vision)
// - The drivetrain orchestrator tying them together

pub mod drivetrain;
pub mod estimator;
pub mod kinematics;
pub mod module;

pub use drivetrain::{Alliance, AutoDrive, DriveFrame, Drivetrain, VisionObservation};
pub use estimator::SwervePoseEstimator;
pub use kinematics::{ChassisSpeeds, SwerveKinematics, SwerveModulePosition, SwerveModuleState};
pub use module::SwerveModule;
