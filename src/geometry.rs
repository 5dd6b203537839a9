// Planar geometry used by the swerve kinematics and pose estimation.
//
// Conventions: +x forward, +y left, angles counter-clockwise positive,
// wrapped to (-pi, pi]. An exact half turn is represented as +pi.

use std::f64::consts::{PI, TAU};
use std::ops::{Add, Mul, Neg, Sub};

/// A rotation in the plane, stored as wrapped radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub const ZERO: Rotation2d = Rotation2d { radians: 0.0 };

    pub fn new(radians: f64) -> Self {
        Self {
            radians: wrap_radians(radians),
        }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::new(degrees.to_radians())
    }

    /// Rotation from direction components, `(cos-like, sin-like)`.
    pub fn from_components(x: f64, y: f64) -> Self {
        Self::new(y.atan2(x))
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }

    pub fn sin(&self) -> f64 {
        self.radians.sin()
    }

    pub fn cos(&self) -> f64 {
        self.radians.cos()
    }
}

impl Add for Rotation2d {
    type Output = Rotation2d;

    fn add(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::new(self.radians + rhs.radians)
    }
}

impl Sub for Rotation2d {
    type Output = Rotation2d;

    fn sub(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::new(self.radians - rhs.radians)
    }
}

impl Neg for Rotation2d {
    type Output = Rotation2d;

    fn neg(self) -> Rotation2d {
        Rotation2d::new(-self.radians)
    }
}

// Wrap to (-pi, pi]. Values already in range pass through untouched so a
// zero-delta update leaves a stored rotation bit-identical.
fn wrap_radians(radians: f64) -> f64 {
    if radians > -PI && radians <= PI {
        return radians;
    }
    let wrapped = radians.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// A displacement in the plane, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub const ZERO: Translation2d = Translation2d { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn angle(&self) -> Rotation2d {
        Rotation2d::from_components(self.x, self.y)
    }

    pub fn rotate_by(&self, rotation: Rotation2d) -> Translation2d {
        let (sin, cos) = (rotation.sin(), rotation.cos());
        Translation2d {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

impl Add for Translation2d {
    type Output = Translation2d;

    fn add(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;

    fn sub(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Translation2d {
    type Output = Translation2d;

    fn mul(self, rhs: f64) -> Translation2d {
        Translation2d::new(self.x * rhs, self.y * rhs)
    }
}

/// A position and heading on the field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

impl Pose2d {
    pub fn new(translation: Translation2d, rotation: Rotation2d) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_xy_heading(x: f64, y: f64, rotation: Rotation2d) -> Self {
        Self::new(Translation2d::new(x, y), rotation)
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// The rigid transform that maps `from` onto this pose.
    pub fn minus(&self, from: &Pose2d) -> Transform2d {
        Transform2d {
            translation: (self.translation - from.translation).rotate_by(-from.rotation),
            rotation: self.rotation - from.rotation,
        }
    }

    /// This pose moved by a rigid transform expressed in its own frame.
    pub fn plus(&self, transform: &Transform2d) -> Pose2d {
        Pose2d {
            translation: self.translation + transform.translation.rotate_by(self.rotation),
            rotation: self.rotation + transform.rotation,
        }
    }

    /// Advance the pose along a constant-curvature arc. Inverse of [`log`].
    ///
    /// [`log`]: Pose2d::log
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let dtheta = twist.dtheta;
        let (sin_t, cos_t) = (dtheta.sin(), dtheta.cos());

        // Small-angle series keeps the map well defined as dtheta -> 0
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            (sin_t / dtheta, (1.0 - cos_t) / dtheta)
        };

        let local = Translation2d::new(twist.dx * s - twist.dy * c, twist.dx * c + twist.dy * s);
        Pose2d {
            translation: self.translation + local.rotate_by(self.rotation),
            rotation: self.rotation + Rotation2d::new(dtheta),
        }
    }

    /// The constant-curvature twist that carries this pose onto `end`.
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        let transform = end.minus(self);
        let dtheta = transform.rotation.radians();
        let half_dtheta = dtheta / 2.0;

        let cos_minus_one = transform.rotation.cos() - 1.0;
        let half_theta_by_tan = if cos_minus_one.abs() < 1e-9 {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * transform.rotation.sin()) / cos_minus_one
        };

        let translation = transform
            .translation
            .rotate_by(Rotation2d::from_components(half_theta_by_tan, -half_dtheta))
            * half_theta_by_tan.hypot(half_dtheta);

        Twist2d {
            dx: translation.x,
            dy: translation.y,
            dtheta,
        }
    }

    /// Arc interpolation between two poses, `t` in [0, 1].
    pub fn interpolate(&self, end: &Pose2d, t: f64) -> Pose2d {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *end;
        }
        let twist = self.log(end);
        self.exp(&twist.scaled(t))
    }
}

/// A rigid transform between two poses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

/// A small body-frame displacement, the increment fed to pose integration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    pub fn scaled(&self, factor: f64) -> Twist2d {
        Twist2d::new(self.dx * factor, self.dy * factor, self.dtheta * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn wrap_maps_half_turn_to_positive() {
        assert_eq!(wrap_radians(PI), PI);
        assert!((wrap_radians(-PI) - PI).abs() < TOL);
        assert!((wrap_radians(3.0 * PI) - PI).abs() < TOL);
        assert!((Rotation2d::from_degrees(270.0).degrees() + 90.0).abs() < 1e-9);
    }

    #[test]
    fn wrap_is_identity_in_range() {
        for r in [-3.0, -1.0, 0.0, 0.5, 3.0] {
            assert_eq!(wrap_radians(r), r);
        }
    }

    #[test]
    fn rotate_quarter_turn() {
        let rotated = Translation2d::new(1.0, 3.0).rotate_by(Rotation2d::from_degrees(90.0));
        assert!((rotated.x + 3.0).abs() < TOL);
        assert!((rotated.y - 1.0).abs() < TOL);
    }

    #[test]
    fn exp_log_roundtrip() {
        let start = Pose2d::from_xy_heading(1.0, 2.0, Rotation2d::from_degrees(30.0));
        let twist = Twist2d::new(0.4, -0.1, 0.7);
        let end = start.exp(&twist);
        let recovered = start.log(&end);
        assert!((recovered.dx - twist.dx).abs() < TOL);
        assert!((recovered.dy - twist.dy).abs() < TOL);
        assert!((recovered.dtheta - twist.dtheta).abs() < TOL);
    }

    #[test]
    fn exp_zero_twist_is_identity() {
        let pose = Pose2d::from_xy_heading(0.3, -0.8, Rotation2d::from_degrees(12.0));
        assert_eq!(pose.exp(&Twist2d::default()), pose);
    }

    #[test]
    fn straight_twist_moves_along_heading() {
        let pose = Pose2d::from_xy_heading(0.0, 0.0, Rotation2d::from_degrees(90.0));
        let end = pose.exp(&Twist2d::new(1.0, 0.0, 0.0));
        assert!(end.x().abs() < TOL);
        assert!((end.y() - 1.0).abs() < TOL);
    }

    #[test]
    fn interpolate_midpoint() {
        let a = Pose2d::default();
        let b = Pose2d::from_xy_heading(2.0, 0.0, Rotation2d::ZERO);
        let mid = a.interpolate(&b, 0.5);
        assert!((mid.x() - 1.0).abs() < TOL);
        assert!(mid.y().abs() < TOL);
    }

    #[test]
    fn minus_plus_roundtrip() {
        let a = Pose2d::from_xy_heading(1.0, -1.0, Rotation2d::from_degrees(45.0));
        let b = Pose2d::from_xy_heading(-0.5, 2.0, Rotation2d::from_degrees(-100.0));
        let transform = b.minus(&a);
        let rebuilt = a.plus(&transform);
        assert!((rebuilt.x() - b.x()).abs() < TOL);
        assert!((rebuilt.y() - b.y()).abs() < TOL);
        assert!((rebuilt.rotation.radians() - b.rotation.radians()).abs() < TOL);
    }
}
