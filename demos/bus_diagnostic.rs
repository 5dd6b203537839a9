// Bus diagnostic: READ-ONLY check of the drivetrain actuator bus
//
// This tool does NOT write anything to the devices - it's completely safe.
// Run it before putting the robot on the ground.
//
// Usage: cargo run --example bus_diagnostic -- [port]

use swerve_zenoh_runtime::config::{conversions, robotmap};
use swerve_zenoh_runtime::hardware::ActuatorBus;
use swerve_zenoh_runtime::hardware::bus::Register;

const MODULE_NAMES: [&str; 4] = ["left_front", "left_rear", "right_front", "right_rear"];
const MODULE_IDS: [(u8, u8, u8); 4] = [
    (
        robotmap::LEFT_FRONT_DRIVE,
        robotmap::LEFT_FRONT_STEER,
        robotmap::LEFT_FRONT_ENCODER,
    ),
    (
        robotmap::LEFT_REAR_DRIVE,
        robotmap::LEFT_REAR_STEER,
        robotmap::LEFT_REAR_ENCODER,
    ),
    (
        robotmap::RIGHT_FRONT_DRIVE,
        robotmap::RIGHT_FRONT_STEER,
        robotmap::RIGHT_FRONT_ENCODER,
    ),
    (
        robotmap::RIGHT_REAR_DRIVE,
        robotmap::RIGHT_REAR_STEER,
        robotmap::RIGHT_REAR_ENCODER,
    ),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| swerve_zenoh_runtime::config::bus::PORT.to_string());

    println!("=== Swerve Bus Diagnostic (READ-ONLY) ===");
    println!("Port: {}\n", port);

    let mut bus = ActuatorBus::open(&port)?;

    for (name, (drive, steer, encoder)) in MODULE_NAMES.iter().zip(MODULE_IDS) {
        println!("--- module {} ---", name);
        for (role, id) in [("drive", drive), ("steer", steer), ("encoder", encoder)] {
            match bus.ping(id) {
                Ok(true) => println!("  {role} (id {id}): responding"),
                Ok(false) => println!("  {role} (id {id}): NO RESPONSE"),
                Err(e) => println!("  {role} (id {id}): error: {e}"),
            }
        }

        if let Ok(ticks) = bus.feedback_position(drive) {
            println!(
                "  drive distance: {:.3} m ({} ticks)",
                ticks as f64 / conversions::DRIVE_TICKS_PER_METER,
                ticks
            );
        }
        if let Ok(ticks) = bus.feedback_position(steer) {
            println!(
                "  steer azimuth: {:.1} deg ({} ticks)",
                (ticks as f64 / conversions::STEER_TICKS_PER_RAD).to_degrees(),
                ticks
            );
        }
        if let Ok(counts) = bus.absolute_position(encoder) {
            println!(
                "  absolute azimuth: {:.1} deg ({} counts)",
                counts as f64 / conversions::ENCODER_TICKS_PER_REV * 360.0,
                counts
            );
        }
        println!();
    }

    println!("--- imu (id {}) ---", robotmap::IMU);
    match bus.ping(robotmap::IMU) {
        Ok(true) => {
            if let Ok(centideg) = bus.read_i32(robotmap::IMU, Register::Yaw) {
                println!("  yaw: {:.2} deg", centideg as f64 / 100.0);
            }
            if let Ok(decideg) = bus.read_i16(robotmap::IMU, Register::YawRate) {
                println!("  rate: {:.1} deg/s", decideg as f64 / 10.0);
            }
        }
        Ok(false) => println!("  NO RESPONSE"),
        Err(e) => println!("  error: {e}"),
    }

    Ok(())
}
