// Wire types carried over zenoh between the runtime and its collaborators

use serde::{Deserialize, Serialize};

use crate::geometry::{Pose2d, Rotation2d};
use crate::swerve::{ChassisSpeeds, DriveFrame, VisionObservation};

/// Frame tag on a drive command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandFrame {
    #[default]
    FieldRelative,
    RobotCentric,
}

impl From<CommandFrame> for DriveFrame {
    fn from(frame: CommandFrame) -> Self {
        match frame {
            CommandFrame::FieldRelative => DriveFrame::FieldRelative,
            CommandFrame::RobotCentric => DriveFrame::RobotCentric,
        }
    }
}

/// Command from teleop or the path follower -> runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCommand {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_dps: f64,
    #[serde(default)]
    pub frame: CommandFrame,
}

impl DriveCommand {
    pub fn speeds(&self) -> ChassisSpeeds {
        ChassisSpeeds::new(self.vx_mps, self.vy_mps, self.omega_dps.to_radians())
    }
}

/// Pose estimate from the vision process. `latency_s` is the age of the
/// capture when the sample was published; `tag_count` is how many
/// landmarks the solve saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionSample {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_deg: f64,
    pub latency_s: f64,
    pub tag_count: u32,
    #[serde(default)]
    pub std_devs: Option<[f64; 3]>,
}

impl VisionSample {
    /// Stamp the sample against the runtime clock and fill in default
    /// trust when the source did not provide its own.
    pub fn observation(&self, now_s: f64) -> VisionObservation {
        VisionObservation {
            pose: Pose2d::from_xy_heading(
                self.x_m,
                self.y_m,
                Rotation2d::from_degrees(self.heading_deg),
            ),
            timestamp_s: now_s - self.latency_s,
            std_devs: self
                .std_devs
                .unwrap_or(crate::config::vision::DEFAULT_STD_DEVS),
            tag_count: self.tag_count,
        }
    }
}

/// Pose re-seed request. Without an explicit pose the runtime applies the
/// alliance-dependent match-start pose.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoseResetRequest {
    #[serde(default)]
    pub pose: Option<PoseUpdate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseUpdate {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_deg: f64,
}

impl PoseUpdate {
    pub fn pose(&self) -> Pose2d {
        Pose2d::from_xy_heading(
            self.x_m,
            self.y_m,
            Rotation2d::from_degrees(self.heading_deg),
        )
    }
}

/// Pose and per-module telemetry published every cycle
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriveTelemetry {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_deg: f64,
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_dps: f64,
    pub module_angles_deg: [f64; 4],
    pub module_speeds_mps: [f64; 4],
}

/// Orientation feed for the vision source, lets it seed its solve with the
/// heading we already trust
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadingFeed {
    pub heading_deg: f64,
    pub rate_dps: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_command_frame_defaults_to_field_relative() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"vx_mps":1.0,"vy_mps":0.0,"omega_dps":90.0}"#).unwrap();
        assert_eq!(cmd.frame, CommandFrame::FieldRelative);
        let speeds = cmd.speeds();
        assert!((speeds.omega_rps - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn vision_sample_is_stamped_into_the_past() {
        let sample = VisionSample {
            x_m: 1.0,
            y_m: 2.0,
            heading_deg: 30.0,
            latency_s: 0.08,
            tag_count: 2,
            std_devs: None,
        };
        let observation = sample.observation(10.0);
        assert!((observation.timestamp_s - 9.92).abs() < 1e-12);
        assert_eq!(observation.std_devs, crate::config::vision::DEFAULT_STD_DEVS);
        assert_eq!(observation.tag_count, 2);
    }
}
