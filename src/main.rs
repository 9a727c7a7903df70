//! Gatecheck - security-checkpoint ticket & queue engine
//!
//! Consumes a per-frame object-detection stream for a monitored gate and
//! turns it into an auditable sequence of security-check tickets: zone
//! crossing counters, ticket lifecycle, guard assignment, body-check
//! scoring, and SLA escalation.
//!
//! Module structure:
//! - `domain/` - Core business types (Ticket, Zone, Track ids, commands)
//! - `io/` - External interfaces (MQTT, control API, audit, Prometheus)
//! - `services/` - Business logic (Engine, stores, queue, scorer)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use gatecheck::domain::types::EngineCommand;
use gatecheck::infra::{Config, Metrics};
use gatecheck::io::{create_egress_channel, MqttPublisher, SnapshotSlot};
use gatecheck::services::Engine;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gatecheck - checkpoint ticket & queue engine
#[derive(Parser, Debug)]
#[command(name = "gatecheck", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("gatecheck starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    // Start embedded MQTT broker with config
    gatecheck::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        frames_topic = %config.mqtt_frames_topic(),
        guards_topic = %config.mqtt_guards_topic(),
        examination_mode = %config.zones().examination_mode.as_str(),
        zones_enabled = %config.zones().enabled,
        coalesce_window_ms = %config.coalesce_window_ms(),
        debounce_frames = %config.debounce_frames(),
        wait_timeout_ms = %config.wait_timeout_ms(),
        control_port = %config.control_port(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components
    let metrics = Arc::new(Metrics::new());
    let snapshot_slot = Arc::new(SnapshotSlot::new());

    // Engine command channel (bounded for backpressure)
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>(1000);

    // Start MQTT ingest (detector frames + guard presence)
    let mqtt_config = config.clone();
    let mqtt_tx = cmd_tx.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            gatecheck::io::mqtt::start_mqtt_client(&mqtt_config, mqtt_tx, mqtt_metrics, mqtt_shutdown)
                .await
        {
            tracing::error!(error = %e, "MQTT client error");
        }
    });

    // Start HTTP control API (if port > 0)
    if config.control_port() > 0 {
        let control_config = config.clone();
        let control_tx = cmd_tx.clone();
        let control_slot = snapshot_slot.clone();
        let control_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = gatecheck::io::control::start_control_server(
                &control_config,
                control_tx,
                control_slot,
                control_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Control server error");
            }
        });
    }

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_slot = snapshot_slot.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = gatecheck::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_slot,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (periodic structured log line)
    let reporter_metrics = metrics.clone();
    let reporter_slot = snapshot_slot.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let snapshot = reporter_slot.load();
            let summary = reporter_metrics
                .report(snapshot.statistics.open_tickets, snapshot.statistics.active_tracks);
            summary.log();
        }
    });

    // Create MQTT egress channel and publisher (if enabled)
    let egress_sender = if config.egress_enabled() {
        let (egress_sender, egress_rx) = create_egress_channel(1000, config.site_id().to_string());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        // Periodic metrics egress (separate from logging)
        let metrics_egress = egress_sender.clone();
        let metrics_for_egress = metrics.clone();
        let slot_for_egress = snapshot_slot.clone();
        let egress_interval = config.egress_metrics_interval_secs();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(egress_interval));
            loop {
                interval.tick().await;
                let snapshot = slot_for_egress.load();
                let summary = metrics_for_egress
                    .report(snapshot.statistics.open_tickets, snapshot.statistics.active_tracks);
                metrics_egress.send_metrics(summary);
            }
        });

        Some(egress_sender)
    } else {
        None
    };

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the engine - consumes commands until the channel closes
    let mut engine = Engine::new(&config, metrics, egress_sender, snapshot_slot);
    info!("engine_started");
    engine.run(cmd_rx).await;

    info!("gatecheck shutdown complete");
    Ok(())
}
