// Synthetic vision source: publishes a fixed field pose at 10 Hz so the
// fusion path can be exercised without a camera.
//
// Usage: cargo run --example vision_publisher -- [x_m] [y_m] [heading_deg] [tag_count]

use std::time::Duration;

use serde_json::json;
use tokio::time::interval;
use tracing::info;

const TOPIC_VISION_POSE: &str = "swerve/vision/pose";
const PUBLISH_HZ: u64 = 10;
const LATENCY_S: f64 = 0.05;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let x_m: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(2.0);
    let y_m: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(1.0);
    let heading_deg: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(0.0);
    let tag_count: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(2);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_VISION_POSE).await?;

    info!(
        "Publishing pose ({}, {}, {} deg), {} tags at {} Hz",
        x_m, y_m, heading_deg, tag_count, PUBLISH_HZ
    );
    info!("Set tag_count to 0 to watch the runtime reject the samples");

    let mut tick = interval(Duration::from_millis(1000 / PUBLISH_HZ));
    loop {
        tick.tick().await;
        let sample = json!({
            "x_m": x_m,
            "y_m": y_m,
            "heading_deg": heading_deg,
            "latency_s": LATENCY_S,
            "tag_count": tag_count,
        });
        publisher.put(sample.to_string()).await?;
    }
}
