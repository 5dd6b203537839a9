// Loop timing, topics, bus addressing, robot geometry, control constants

pub mod runtime {
    use std::time::Duration;

    // Control loop frequency
    pub const LOOP_HZ: u64 = 50;

    // Fixed control period, used for discretization and simulation stepping
    pub const LOOP_PERIOD_S: f64 = 1.0 / LOOP_HZ as f64;

    // Command timeout for watchdog
    pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);
}

pub mod topics {
    pub const CMD_DRIVE: &str = "swerve/cmd/drive"; // teleop / path follower commands
    pub const CMD_POSE_RESET: &str = "swerve/cmd/pose_reset"; // pose re-seed requests
    pub const VISION_POSE: &str = "swerve/vision/pose"; // inbound vision samples
    pub const RT_TELEMETRY: &str = "swerve/rt/telemetry"; // pose + module telemetry
    pub const RT_HEADING: &str = "swerve/rt/heading"; // orientation feed for the vision source
    pub const RT_HEALTH: &str = "swerve/state/health"; // health status
}

pub mod bus {
    // Serial port for the actuator bus bridge
    pub const PORT: &str = "/dev/ttyACM0";
    pub const BAUDRATE: u32 = 1_000_000;
}

// Device ids on the actuator bus, one drive controller, one steer
// controller, and one absolute azimuth encoder per module.
pub mod robotmap {
    pub const LEFT_FRONT_DRIVE: u8 = 1;
    pub const LEFT_FRONT_STEER: u8 = 2;
    pub const LEFT_FRONT_ENCODER: u8 = 3;

    pub const LEFT_REAR_DRIVE: u8 = 4;
    pub const LEFT_REAR_STEER: u8 = 5;
    pub const LEFT_REAR_ENCODER: u8 = 6;

    pub const RIGHT_FRONT_DRIVE: u8 = 7;
    pub const RIGHT_FRONT_STEER: u8 = 8;
    pub const RIGHT_FRONT_ENCODER: u8 = 9;

    pub const RIGHT_REAR_DRIVE: u8 = 10;
    pub const RIGHT_REAR_STEER: u8 = 11;
    pub const RIGHT_REAR_ENCODER: u8 = 12;

    pub const IMU: u8 = 13;
}

pub mod drivetrain {
    use crate::geometry::Translation2d;

    // Highest attainable module speed, used for desaturation and the
    // drive duty mapping
    pub const MAX_SPEED_MPS: f64 = 4.5;

    // Static-friction feed-forward added to the drive duty by sign of the
    // commanded speed
    pub const DRIVE_KS: f64 = 0.015;

    // Module offsets from robot center, meters, +x forward / +y left.
    // Order is [left_front, left_rear, right_front, right_rear] and the
    // same order is used for every module array in the crate.
    pub const MODULE_OFFSETS: [Translation2d; 4] = [
        Translation2d::new(0.264, 0.264),
        Translation2d::new(-0.264, 0.264),
        Translation2d::new(0.264, -0.264),
        Translation2d::new(-0.264, -0.264),
    ];

    pub const MODULE_LABELS: [&str; 4] = ["left_front", "left_rear", "right_front", "right_rear"];
}

// Unit conversions between bus register ticks and physical units
pub mod conversions {
    use std::f64::consts::{PI, TAU};

    pub const TICKS_PER_REV: f64 = 2048.0;

    pub const DRIVE_GEAR_RATIO: f64 = 6.75;
    pub const WHEEL_DIAMETER_M: f64 = 0.1016;
    pub const DRIVE_TICKS_PER_METER: f64 =
        TICKS_PER_REV * DRIVE_GEAR_RATIO / (WHEEL_DIAMETER_M * PI);

    pub const STEER_GEAR_RATIO: f64 = 150.0 / 7.0;
    pub const STEER_TICKS_PER_RAD: f64 = TICKS_PER_REV * STEER_GEAR_RATIO / TAU;

    // Absolute azimuth encoder, 1:1 on the wheel, 4096 counts per rev
    pub const ENCODER_TICKS_PER_REV: f64 = 4096.0;

    // Drive duty register range, maps [-1, 1] commanded output
    pub const DUTY_RANGE: f64 = 1000.0;
}

pub mod vision {
    // Skip fusion while rotating faster than this, the sample is likely
    // stale or blurred
    pub const MAX_RATE_DPS: f64 = 720.0;

    // Trust defaults when a sample does not carry its own, translation in
    // meters, heading in radians. Heading trust is near zero because the
    // heading sensor is authoritative for rotation.
    pub const DEFAULT_STD_DEVS: [f64; 3] = [0.7, 0.7, 9.0e6];
}

pub mod estimator {
    // Wheel odometry trust, translation in meters, heading in radians
    pub const STATE_STD_DEVS: [f64; 3] = [0.1, 0.1, 0.1];

    // How far back vision latency compensation can reach
    pub const HISTORY_SECONDS: f64 = 1.5;
}
