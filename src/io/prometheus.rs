//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Gauges that live in engine state
//! (occupancy, queue depth) are read from the latest snapshot.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::io::egress_channel::SnapshotSlot;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a gauge metric with f64 value
fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.6}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(
    summary: &MetricsSummary,
    snapshot_slot: &SnapshotSlot,
    site: &str,
) -> String {
    let mut output = String::with_capacity(8192);

    write_metric(
        &mut output,
        "gatecheck_frames_total",
        "Total detection frames processed",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    write_gauge_f64(
        &mut output,
        "gatecheck_frames_per_sec",
        "Detection frames processed per second",
        site,
        summary.frames_per_sec,
    );
    write_histogram(
        &mut output,
        "gatecheck_frame_latency_us",
        "Frame processing latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.avg_latency_us,
    );
    write_metric(
        &mut output,
        "gatecheck_commands_received_total",
        "Engine commands received from the ingest boundary",
        MetricType::Counter,
        site,
        summary.commands_received,
    );
    write_metric(
        &mut output,
        "gatecheck_commands_dropped_total",
        "Engine commands dropped because the channel was full",
        MetricType::Counter,
        site,
        summary.commands_dropped,
    );
    write_metric(
        &mut output,
        "gatecheck_crossings_total",
        "Zone crossing events recorded",
        MetricType::Counter,
        site,
        summary.crossings_recorded,
    );
    write_metric(
        &mut output,
        "gatecheck_crossings_clamped_total",
        "Spurious exits dropped by the occupancy clamp",
        MetricType::Counter,
        site,
        summary.crossings_clamped,
    );
    write_metric(
        &mut output,
        "gatecheck_tickets_created_total",
        "Tickets created",
        MetricType::Counter,
        site,
        summary.tickets_created,
    );
    write_metric(
        &mut output,
        "gatecheck_tickets_checked_total",
        "Tickets completed as checked",
        MetricType::Counter,
        site,
        summary.tickets_checked,
    );
    write_metric(
        &mut output,
        "gatecheck_tickets_escalated_total",
        "Tickets escalated on SLA breach",
        MetricType::Counter,
        site,
        summary.tickets_escalated,
    );
    write_metric(
        &mut output,
        "gatecheck_tickets_cancelled_total",
        "Tickets cancelled",
        MetricType::Counter,
        site,
        summary.tickets_cancelled,
    );

    // Engine-state gauges from the latest snapshot
    let snapshot = snapshot_slot.load();
    write_metric(
        &mut output,
        "gatecheck_active_tracks",
        "Currently tracked objects",
        MetricType::Gauge,
        site,
        snapshot.statistics.active_tracks as u64,
    );
    write_metric(
        &mut output,
        "gatecheck_open_tickets",
        "Non-terminal tickets",
        MetricType::Gauge,
        site,
        snapshot.statistics.open_tickets as u64,
    );
    write_metric(
        &mut output,
        "gatecheck_queue_depth",
        "Waiting tickets in assignment order",
        MetricType::Gauge,
        site,
        snapshot.statistics.queue_depth as u64,
    );
    write_metric(
        &mut output,
        "gatecheck_guards_active",
        "Guards currently active",
        MetricType::Gauge,
        site,
        snapshot.statistics.guards_active as u64,
    );
    write_metric(
        &mut output,
        "gatecheck_current_in_gate",
        "Current occupancy of the gate area",
        MetricType::Gauge,
        site,
        snapshot.object_counts.current_in_gate,
    );
    write_metric(
        &mut output,
        "gatecheck_current_in_anchor",
        "Current occupancy of the guard anchor",
        MetricType::Gauge,
        site,
        snapshot.object_counts.current_in_anchor,
    );
    write_metric(
        &mut output,
        "gatecheck_gate_entries_total",
        "Lifetime gate area entries",
        MetricType::Counter,
        site,
        snapshot.object_counts.gate_entries,
    );
    write_metric(
        &mut output,
        "gatecheck_gate_exits_total",
        "Lifetime gate area exits",
        MetricType::Counter,
        site,
        snapshot.object_counts.gate_exits,
    );
    write_metric(
        &mut output,
        "gatecheck_anchor_entries_total",
        "Lifetime guard anchor entries",
        MetricType::Counter,
        site,
        snapshot.object_counts.anchor_entries,
    );
    write_metric(
        &mut output,
        "gatecheck_anchor_exits_total",
        "Lifetime guard anchor exits",
        MetricType::Counter,
        site,
        snapshot.object_counts.anchor_exits,
    );

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    snapshot_slot: Arc<SnapshotSlot>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let snapshot = snapshot_slot.load();
            let summary = metrics
                .report(snapshot.statistics.open_tickets, snapshot.statistics.active_tracks);
            let body = format_prometheus_metrics(&summary, &snapshot_slot, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    snapshot_slot: Arc<SnapshotSlot>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let snapshot_slot = snapshot_slot.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let snapshot_slot = snapshot_slot.clone();
                                let site_id = site_id.clone();
                                async move {
                                    handle_request(req, metrics, snapshot_slot, site_id).await
                                }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
