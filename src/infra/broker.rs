//! Embedded MQTT broker using rumqttd
//!
//! Lets the detector feed, the engine, and the sim talk over one
//! self-contained broker without external infrastructure. Deployments with
//! their own broker disable it by setting the broker port to 0 and pointing
//! the mqtt section at the external one.

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Detection frames with a few dozen boxes serialize to a handful of KiB;
/// 1 MiB leaves generous headroom for snapshot payloads on the same broker.
const MAX_PAYLOAD_BYTES: usize = 1_048_576;

/// Start the embedded MQTT broker; returns false when disabled or unusable
pub fn start_embedded_broker(app_config: &AppConfig) -> bool {
    let port = app_config.broker_port();
    if port == 0 {
        info!("broker_disabled");
        return false;
    }

    let addr_str = format!("{}:{}", app_config.broker_bind_address(), port);
    let listen_addr: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, addr = %addr_str, "broker_invalid_bind_address");
            return false;
        }
    };

    let router = RouterConfig {
        max_segment_size: 16 * 1024 * 1024,
        max_segment_count: 8,
        // Detector, engine ingest, egress publisher, sim, plus dashboards
        max_connections: 256,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let listener = ServerSettings {
        name: "detector".to_string(),
        listen: listen_addr,
        tls: None,
        next_connection_delay_ms: 1,
        connections: ConnectionSettings {
            connection_timeout_ms: 5000,
            max_payload_size: MAX_PAYLOAD_BYTES,
            max_inflight_count: 200,
            auth: None,
            dynamic_filters: false,
            external_auth: None,
        },
    };

    let config = Config {
        id: 0,
        router,
        v4: Some(HashMap::from([("detector".to_string(), listener)])),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    };

    thread::spawn(move || {
        let mut broker = Broker::new(config);
        // start() blocks for the life of the broker
        if let Err(e) = broker.start() {
            warn!(error = %e, "broker_start_failed");
        }
    });

    // Give the listener a moment before clients connect
    thread::sleep(std::time::Duration::from_millis(100));
    info!(addr = %addr_str, "broker_started");
    true
}
