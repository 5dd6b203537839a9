use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config;
use swerve_zenoh_runtime::runtime::{self, Options};
use swerve_zenoh_runtime::swerve::Alliance;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AllianceArg {
    Blue,
    Red,
}

#[derive(Parser, Debug)]
#[command(about = "Control runtime for a four-module swerve drivetrain")]
struct Args {
    /// Run against simulated hardware instead of the actuator bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the actuator bus bridge
    #[arg(long, default_value = config::bus::PORT)]
    port: String,

    /// Alliance color, decides path mirroring and the match-start pose
    #[arg(long, value_enum, default_value_t = AllianceArg::Blue)]
    alliance: AllianceArg,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let options = Options {
        sim: args.sim,
        port: args.port,
        alliance: match args.alliance {
            AllianceArg::Blue => Alliance::Blue,
            AllianceArg::Red => Alliance::Red,
        },
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
