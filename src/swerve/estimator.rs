// Fused pose estimation: high-rate wheel odometry corrected by
// asynchronous, latency-compensated vision measurements.
//
// Odometry advances a pure-odometry pose by the twist recovered from
// module position deltas, with the heading sensor authoritative for
// rotation. Each update is recorded in a time-indexed history; a vision
// measurement is matched against the odometry pose at its capture time,
// blended there with per-axis gains derived from the standard deviations,
// and carried forward as a rigid offset on top of everything odometry has
// accumulated since. That replays the history without recomputing it.

use std::collections::VecDeque;

use tracing::debug;

use crate::config;
use crate::geometry::{Pose2d, Rotation2d, Twist2d};
use crate::swerve::kinematics::{SwerveKinematics, SwerveModulePosition};

struct VisionAnchor {
    // Blended estimate at the measurement's capture time
    corrected: Pose2d,
    // Odometry pose at the same instant
    odometry: Pose2d,
}

impl VisionAnchor {
    // Carry the correction forward: apply to `pose` the rigid transform
    // odometry has accumulated since the anchor
    fn compensate(&self, pose: &Pose2d) -> Pose2d {
        let since = pose.minus(&self.odometry);
        self.corrected.plus(&since)
    }
}

/// Pose estimator for a four-module swerve base.
pub struct SwervePoseEstimator {
    kinematics: SwerveKinematics,
    odometry_pose: Pose2d,
    last_heading: Rotation2d,
    last_positions: [SwerveModulePosition; 4],
    // (seconds, odometry pose), bounded to the replay window
    history: VecDeque<(f64, Pose2d)>,
    anchor: Option<VisionAnchor>,
    // Odometry variance per axis (x, y, heading)
    q: [f64; 3],
}

impl SwervePoseEstimator {
    pub fn new(
        kinematics: SwerveKinematics,
        heading: Rotation2d,
        positions: [SwerveModulePosition; 4],
        initial_pose: Pose2d,
        state_std_devs: [f64; 3],
    ) -> Self {
        Self {
            kinematics,
            odometry_pose: initial_pose,
            last_heading: heading,
            last_positions: positions,
            history: VecDeque::new(),
            anchor: None,
            q: state_std_devs.map(|s| s * s),
        }
    }

    /// Current fused estimate.
    pub fn pose(&self) -> Pose2d {
        match &self.anchor {
            Some(anchor) => anchor.compensate(&self.odometry_pose),
            None => self.odometry_pose,
        }
    }

    /// Integrate one odometry step. Module deltas drive translation, the
    /// heading sensor overrides integrated rotation.
    pub fn update(
        &mut self,
        heading: Rotation2d,
        positions: [SwerveModulePosition; 4],
        now_s: f64,
    ) -> Pose2d {
        let mut deltas = [SwerveModulePosition::default(); 4];
        for (i, (current, last)) in positions.iter().zip(self.last_positions.iter()).enumerate()
        {
            deltas[i] =
                SwerveModulePosition::new(current.distance_m - last.distance_m, current.angle);
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta = (heading - self.last_heading).radians();

        self.odometry_pose = self.odometry_pose.exp(&twist);
        self.last_heading = heading;
        self.last_positions = positions;

        self.history.push_back((now_s, self.odometry_pose));
        let horizon = now_s - config::estimator::HISTORY_SECONDS;
        while self
            .history
            .front()
            .is_some_and(|(stamp, _)| *stamp < horizon)
        {
            self.history.pop_front();
        }

        self.pose()
    }

    /// Fuse a vision pose captured at `timestamp_s`. Lower standard
    /// deviations pull the estimate harder; measurements older than the
    /// odometry history are dropped.
    pub fn add_vision_measurement(
        &mut self,
        vision_pose: Pose2d,
        timestamp_s: f64,
        vision_std_devs: [f64; 3],
    ) {
        let Some(odometry_at_capture) = self.sample_at(timestamp_s) else {
            debug!("vision measurement at {timestamp_s:.3}s outside odometry history, dropped");
            return;
        };

        let estimate_at_capture = match &self.anchor {
            Some(anchor) => anchor.compensate(&odometry_at_capture),
            None => odometry_at_capture,
        };

        // Per-axis Kalman-style gain from odometry vs vision trust
        let mut k = [0.0; 3];
        for i in 0..3 {
            let r = vision_std_devs[i] * vision_std_devs[i];
            if self.q[i] != 0.0 {
                k[i] = self.q[i] / (self.q[i] + (self.q[i] * r).sqrt());
            }
        }

        let innovation = estimate_at_capture.log(&vision_pose);
        let scaled = Twist2d::new(
            k[0] * innovation.dx,
            k[1] * innovation.dy,
            k[2] * innovation.dtheta,
        );

        self.anchor = Some(VisionAnchor {
            corrected: estimate_at_capture.exp(&scaled),
            odometry: odometry_at_capture,
        });
    }

    /// Hard reset of the estimate. Clears the odometry history and any
    /// vision correction so no partial state survives.
    pub fn reset_position(
        &mut self,
        heading: Rotation2d,
        positions: [SwerveModulePosition; 4],
        pose: Pose2d,
    ) {
        self.odometry_pose = pose;
        self.last_heading = heading;
        self.last_positions = positions;
        self.history.clear();
        self.anchor = None;
    }

    // Odometry pose at `timestamp_s`, interpolated between the bracketing
    // history samples. None when the history is empty or does not reach
    // back that far.
    fn sample_at(&self, timestamp_s: f64) -> Option<Pose2d> {
        let (oldest, _) = self.history.front()?;
        if timestamp_s < *oldest {
            return None;
        }
        let (newest, newest_pose) = self.history.back()?;
        if timestamp_s >= *newest {
            return Some(*newest_pose);
        }

        let mut previous = self.history.front()?;
        for sample in self.history.iter().skip(1) {
            if sample.0 >= timestamp_s {
                let (t0, pose0) = previous;
                let (t1, pose1) = sample;
                let span = t1 - t0;
                if span <= f64::EPSILON {
                    return Some(*pose1);
                }
                return Some(pose0.interpolate(pose1, (timestamp_s - t0) / span));
            }
            previous = sample;
        }
        Some(*newest_pose)
    }
}
