//! MQTT client for receiving detector frames and guard presence

use crate::domain::ticket::epoch_ms;
use crate::domain::types::{
    Detection, DetectionFrame, DetectorMessage, EngineCommand, GestureFlags, GuardId,
    TimestampValue, TrackId, WireFrame, WireGuardPresence,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT client and send engine commands to the channel
///
/// Commands are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped commands are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    cmd_tx: mpsc::Sender<EngineCommand>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions = MqttOptions::new("gatecheck", config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_frames_topic(), QoS::AtMostOnce).await?;
    client.subscribe(config.mqtt_guards_topic(), QoS::AtMostOnce).await?;

    info!(
        frames_topic = %config.mqtt_frames_topic(),
        guards_topic = %config.mqtt_guards_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "MQTT client subscribed"
    );

    let frames_topic = config.mqtt_frames_topic().to_string();
    let guards_topic = config.mqtt_guards_topic().to_string();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();
                        let topic = &publish.topic;

                        let Ok(json_str) = std::str::from_utf8(&publish.payload) else {
                            warn!(topic = %topic, "Invalid UTF-8 in MQTT payload");
                            continue;
                        };

                        let commands: Vec<EngineCommand> = if topic == &frames_topic {
                            parse_detector_message(json_str, received_at)
                                .into_iter()
                                .map(EngineCommand::Frame)
                                .collect()
                        } else if topic == &guards_topic {
                            parse_guard_presence(json_str)
                                .map(|(guard_id, is_active)| EngineCommand::GuardPresence {
                                    guard_id,
                                    is_active,
                                })
                                .into_iter()
                                .collect()
                        } else {
                            Vec::new()
                        };

                        for cmd in commands {
                            metrics.record_command_received();
                            if let Err(e) = cmd_tx.try_send(cmd) {
                                match e {
                                    TrySendError::Full(_) => {
                                        metrics.record_command_dropped();
                                        if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                            warn!("engine_command_dropped: channel full");
                                            last_drop_warn = Instant::now();
                                        }
                                    }
                                    TrySendError::Closed(_) => {
                                        warn!("Engine command channel closed");
                                        return Ok(());
                                    }
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse a detector JSON message into detection frames
pub fn parse_detector_message(json_str: &str, received_at: Instant) -> Vec<DetectionFrame> {
    let message: DetectorMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "Failed to parse detector message");
            return Vec::new();
        }
    };

    message.frames.into_iter().map(|f| parse_wire_frame(f, received_at)).collect()
}

/// Parse a guard presence JSON message
pub fn parse_guard_presence(json_str: &str) -> Option<(GuardId, bool)> {
    let presence: WireGuardPresence = match serde_json::from_str(json_str) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "Failed to parse guard presence");
            return None;
        }
    };
    Some((GuardId(presence.guard_id), presence.is_active))
}

fn parse_wire_frame(frame: WireFrame, received_at: Instant) -> DetectionFrame {
    let frame_ts = match timestamp_to_epoch_ms(&frame.time) {
        0 => epoch_ms(), // feed without timestamps falls back to wall clock
        ts => ts,
    };

    let detections = frame
        .detections
        .into_iter()
        .map(|det| Detection {
            track_id: TrackId(det.track_id),
            centroid: det.bbox.centroid(),
            gestures: det.gestures.map(GestureFlags::from).unwrap_or_default(),
            class_name: det.class_name,
            confidence: det.confidence,
        })
        .collect();

    DetectionFrame { frame_ts, received_at, detections }
}

/// Parse ISO 8601 timestamp to epoch milliseconds
fn parse_iso_time(time_str: &str) -> Option<u64> {
    // Parse "2026-01-05T16:41:30.048+00:00" format (RFC 3339)
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64)
}

/// Extract epoch milliseconds from TimestampValue
fn timestamp_to_epoch_ms(ts: &TimestampValue) -> u64 {
    match ts {
        TimestampValue::EpochMs(ms) => *ms,
        TimestampValue::IsoString(s) => parse_iso_time(s).unwrap_or(0),
        TimestampValue::None => 0,
    }
}
