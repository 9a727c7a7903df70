//! Gatecheck simulator - synthetic detector feed
//!
//! Publishes scripted detection frames and guard presence over MQTT to
//! exercise the engine end-to-end without a real detector.
//!
//! Scenarios:
//! - `single`: one person enters the gate, a guard checks them, they leave
//! - `batch`: three people enter within the coalescing window
//! - `timeout`: a person enters and no guard ever shows up
//!
//! Usage:
//!   cargo run --bin gatecheck-sim -- --scenario single

use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Gatecheck detector/guard simulator
#[derive(Parser, Debug)]
#[command(name = "gatecheck-sim", version, about)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Topic for detection frames
    #[arg(long, default_value = "gatecheck/frames")]
    frames_topic: String,

    /// Topic for guard presence
    #[arg(long, default_value = "gatecheck/guards")]
    guards_topic: String,

    /// Frames per second
    #[arg(long, default_value_t = 10)]
    fps: u64,

    /// Scenario to run: single, batch, timeout
    #[arg(long, default_value = "single")]
    scenario: String,
}

/// Centroid positions relative to the default zone set
const OUTSIDE: (f64, f64) = (0.1, 0.1);
const IN_GATE: (f64, f64) = (0.5, 0.5);

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One scripted person: where they are over time and when they gesture
struct SimTrack {
    track_id: i64,
    /// Seconds after scenario start when the track appears / enters / leaves
    appears_at: f64,
    enters_at: f64,
    leaves_at: f64,
    /// Seconds after which gesture signals are reported (None = never)
    gestures_at: Option<f64>,
}

impl SimTrack {
    fn detection_at(&self, t: f64) -> Option<serde_json::Value> {
        if t < self.appears_at || t > self.leaves_at + 2.0 {
            return None;
        }
        let (x, y) = if t >= self.enters_at && t < self.leaves_at { IN_GATE } else { OUTSIDE };
        // Boxes are centered on the scripted centroid
        let mut det = json!({
            "track_id": self.track_id,
            "class": "person",
            "confidence": 0.93,
            "bbox": {"x": x - 0.05, "y": y - 0.1, "w": 0.1, "h": 0.2},
        });
        if let Some(gestures_at) = self.gestures_at {
            if t >= gestures_at && t < self.leaves_at {
                det["gestures"] =
                    json!({"hand_to_torso": true, "reach": true, "proximity": true});
            }
        }
        Some(det)
    }
}

/// Guard presence transitions: (seconds after start, guard id, active)
type GuardScript = Vec<(f64, &'static str, bool)>;

fn scenario(name: &str) -> (Vec<SimTrack>, GuardScript, f64) {
    match name {
        "batch" => (
            vec![
                SimTrack { track_id: 201, appears_at: 0.0, enters_at: 2.0, leaves_at: 25.0, gestures_at: Some(8.0) },
                SimTrack { track_id: 202, appears_at: 0.0, enters_at: 2.3, leaves_at: 25.0, gestures_at: Some(9.0) },
                SimTrack { track_id: 203, appears_at: 0.5, enters_at: 2.6, leaves_at: 25.0, gestures_at: Some(10.0) },
            ],
            vec![(1.0, "g1", true), (28.0, "g1", false)],
            30.0,
        ),
        "timeout" => (
            vec![SimTrack { track_id: 301, appears_at: 0.0, enters_at: 2.0, leaves_at: 90.0, gestures_at: None }],
            vec![],
            95.0,
        ),
        _ => (
            vec![SimTrack { track_id: 101, appears_at: 0.0, enters_at: 2.0, leaves_at: 20.0, gestures_at: Some(7.0) }],
            vec![(1.0, "g1", true), (24.0, "g1", false)],
            26.0,
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let (tracks, mut guard_script, duration_secs) = scenario(&args.scenario);

    info!(
        scenario = %args.scenario,
        host = %args.host,
        port = %args.port,
        fps = %args.fps,
        "sim_starting"
    );

    let client_id = format!("gatecheck-sim-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, &args.host, args.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

    // Drive the eventloop in the background
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    warn!(error = %e, "sim_mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let frame_period = Duration::from_millis(1000 / args.fps.max(1));
    let mut ticker = tokio::time::interval(frame_period);
    let start = tokio::time::Instant::now();

    loop {
        ticker.tick().await;
        let t = start.elapsed().as_secs_f64();
        if t > duration_secs {
            break;
        }

        // Fire any due guard transitions
        while let Some(&(at, guard_id, active)) = guard_script.first() {
            if t < at {
                break;
            }
            guard_script.remove(0);
            let payload = json!({"guard_id": guard_id, "is_active": active}).to_string();
            info!(guard_id = %guard_id, is_active = %active, "sim_guard_presence");
            client.publish(&args.guards_topic, QoS::AtMostOnce, false, payload).await?;
        }

        let detections: Vec<serde_json::Value> =
            tracks.iter().filter_map(|track| track.detection_at(t)).collect();

        let message = json!({
            "frames": [{
                "time": epoch_ms(),
                "detections": detections,
            }]
        });
        client.publish(&args.frames_topic, QoS::AtMostOnce, false, message.to_string()).await?;
    }

    info!("sim_complete");
    Ok(())
}
