// Control runtime for a four-module swerve drivetrain
//
// Provides:
// - Swerve kinematics, module control, and fused pose estimation
// - Serial actuator bus plus simulation-backed hardware capabilities
// - Zenoh-connected fixed-rate control loop

pub mod config;
pub mod geometry;
pub mod hardware;
pub mod messages;
pub mod runtime;
pub mod swerve;
