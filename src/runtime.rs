// 50 Hz control loop with a command watchdog.
//
// Inbound drive commands, vision samples and pose-reset requests arrive
// over zenoh and are drained non-blockingly at the top of each cycle, so
// every mutation of drivetrain state happens sequentially inside the loop.
// If teleop or the path follower stops publishing, the watchdog zeroes the
// commanded velocity.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{self, robotmap, topics};
use crate::geometry::Translation2d;
use crate::hardware::{
    ActuatorBus, BusHeadingSensor, BusModuleIo, HeadingSensor, ModuleIo, SharedBus,
    SimHeadingSensor, SimModuleIo,
};
use crate::messages::{
    DriveCommand, DriveTelemetry, HeadingFeed, PoseResetRequest, RuntimeHealth, VisionSample,
};
use crate::swerve::{Alliance, ChassisSpeeds, DriveFrame, Drivetrain, SwerveModule};

/// Runtime options resolved from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    pub sim: bool,
    pub port: String,
    pub alliance: Alliance,
}

/// Keep-latest drive command with staleness tracking.
struct CommandGate {
    latest: Option<DriveCommand>,
    received_at: Instant,
    health: RuntimeHealth,
}

impl CommandGate {
    fn new() -> Self {
        Self {
            latest: None,
            received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    fn on_command(&mut self, cmd: DriveCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest = Some(cmd);
        self.received_at = Instant::now();
    }

    /// The command to dispatch this cycle, zero velocity once the latest
    /// command has gone stale.
    fn desired(&mut self) -> (ChassisSpeeds, DriveFrame) {
        let cmd_age = self.received_at.elapsed();

        if cmd_age > config::runtime::CMD_TIMEOUT {
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            (ChassisSpeeds::default(), DriveFrame::RobotCentric)
        } else if let Some(ref cmd) = self.latest {
            self.health = RuntimeHealth::Ok;
            (cmd.speeds(), cmd.frame.into())
        } else {
            self.health = RuntimeHealth::CmdStale;
            (ChassisSpeeds::default(), DriveFrame::RobotCentric)
        }
    }
}

pub async fn run(options: Options) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if options.sim {
        info!("Starting in simulation mode");
        let modules = config::drivetrain::MODULE_LABELS
            .map(|label| SwerveModule::new(label, SimModuleIo::new()));
        let drivetrain = Drivetrain::new(modules, SimHeadingSensor::new(), options.alliance);
        run_loop(drivetrain).await
    } else {
        info!("Opening actuator bus on {}", options.port);
        let bus: SharedBus = Rc::new(RefCell::new(ActuatorBus::open(&options.port)?));

        let device_ids = [
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
        let mut index = 0;
        let modules = device_ids.map(|(drive, steer, encoder)| {
            let label = config::drivetrain::MODULE_LABELS[index];
            index += 1;
            SwerveModule::new(label, BusModuleIo::new(bus.clone(), drive, steer, encoder))
        });
        let heading = BusHeadingSensor::new(bus.clone(), robotmap::IMU);
        let drivetrain = Drivetrain::new(modules, heading, options.alliance);
        run_loop(drivetrain).await
    }
}

async fn run_loop<IO: ModuleIo, H: HeadingSensor>(
    mut drivetrain: Drivetrain<IO, H>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    drivetrain.initialize()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(topics::CMD_DRIVE).await?;
    let sub_vision = session.declare_subscriber(topics::VISION_POSE).await?;
    let sub_reset = session.declare_subscriber(topics::CMD_POSE_RESET).await?;
    let pub_telemetry = session.declare_publisher(topics::RT_TELEMETRY).await?;
    let pub_heading = session.declare_publisher(topics::RT_HEADING).await?;
    let pub_health = session.declare_publisher(topics::RT_HEALTH).await?;

    let mut gate = CommandGate::new();
    let mut latest_vision: Option<VisionSample> = None;
    let mut tick = interval(Duration::from_millis(1000 / config::runtime::LOOP_HZ));
    let epoch = Instant::now();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        config::runtime::LOOP_HZ,
        config::runtime::CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}",
        topics::CMD_DRIVE,
        topics::VISION_POSE,
        topics::CMD_POSE_RESET
    );
    info!(
        "Publishing to: {}, {}, {}",
        topics::RT_TELEMETRY,
        topics::RT_HEADING,
        topics::RT_HEALTH
    );

    loop {
        tick.tick().await;
        let now_s = epoch.elapsed().as_secs_f64();

        // 1. Drain all pending traffic (non-blocking), keep latest of each
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            match serde_json::from_slice::<DriveCommand>(&sample.payload().to_bytes()) {
                Ok(cmd) => gate.on_command(cmd),
                Err(e) => warn!("Failed to parse drive command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_vision.try_recv() {
            match serde_json::from_slice::<VisionSample>(&sample.payload().to_bytes()) {
                Ok(vision) => latest_vision = Some(vision),
                Err(e) => warn!("Failed to parse vision sample: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_reset.try_recv() {
            match serde_json::from_slice::<PoseResetRequest>(&sample.payload().to_bytes()) {
                Ok(request) => {
                    match request.pose {
                        Some(update) => drivetrain.reset_pose(update.pose()),
                        None => drivetrain.reset_pose_for_match_start(),
                    }
                    info!("Pose re-seeded to {:?}", drivetrain.pose());
                }
                Err(e) => warn!("Failed to parse pose reset request: {}", e),
            }
        }

        // 2. Dispatch the drive command (includes watchdog logic)
        let (speeds, frame) = gate.desired();
        drivetrain.drive(speeds, frame, Translation2d::ZERO);

        // 3. Periodic step: module positions -> estimator -> gated vision.
        // Each vision sample is consumed at most once.
        let observation = latest_vision.take().map(|sample| sample.observation(now_s));
        let pose = drivetrain.periodic(now_s, observation);

        // 4. Publish telemetry, heading feed and health
        let states = drivetrain.module_states();
        let measured = drivetrain.robot_relative_speeds();
        let telemetry = DriveTelemetry {
            x_m: pose.x(),
            y_m: pose.y(),
            heading_deg: pose.rotation.degrees(),
            vx_mps: measured.vx_mps,
            vy_mps: measured.vy_mps,
            omega_dps: measured.omega_rps.to_degrees(),
            module_angles_deg: states.map(|state| state.angle.degrees()),
            module_speeds_mps: states.map(|state| state.speed_mps),
        };
        pub_telemetry.put(serde_json::to_string(&telemetry)?).await?;

        let feed = HeadingFeed {
            heading_deg: drivetrain.heading().degrees(),
            rate_dps: drivetrain.heading_rate_dps(),
        };
        pub_heading.put(serde_json::to_string(&feed)?).await?;

        pub_health.put(serde_json::to_string(&gate.health)?).await?;
    }
}
