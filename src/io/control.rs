//! HTTP control API
//!
//! External control operations funnel into the engine's command channel, so
//! they are serialized with frame ingestion and never race it:
//! - `POST /tickets/{id}/cancel` - cancel a ticket (JSON body with reason)
//! - `POST /zones` - atomically replace the zone configuration
//! - `POST /counters/reset` - privileged counter reset (HTTP Basic auth)
//! - `GET /snapshot` - latest engine snapshot
//! - `GET /health` - liveness probe
//!
//! Invalid requests fail with a descriptive 4xx and leave engine state
//! unchanged; they are never fatal.

use crate::domain::types::{EngineCommand, EngineError};
use crate::domain::zone::ZoneSet;
use crate::infra::config::Config;
use crate::io::egress_channel::SnapshotSlot;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct CancelBody {
    reason: String,
}

/// Precomputed expected value of the Authorization header, if auth is on
fn expected_auth_header(username: Option<&str>, password: Option<&str>) -> Option<String> {
    match (username, password) {
        (Some(user), Some(pass)) => {
            let encoded = STANDARD.encode(format!("{}:{}", user, pass).as_bytes());
            Some(format!("Basic {}", encoded))
        }
        _ => None,
    }
}

/// Extract the ticket id from a `/tickets/{id}/cancel` path
fn cancel_ticket_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/tickets/")?;
    let id = rest.strip_suffix("/cancel")?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, serde_json::json!({"ok": false, "error": message}).to_string())
}

/// Map a typed engine error to an HTTP status
fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownTicket(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidZones(_) | EngineError::EmptyReason => StatusCode::BAD_REQUEST,
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    cmd_tx: mpsc::Sender<EngineCommand>,
    snapshot_slot: Arc<SnapshotSlot>,
    auth_header: Arc<Option<String>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/snapshot") => {
            let snapshot = snapshot_slot.load();
            let body = serde_json::to_string(&*snapshot).unwrap_or_else(|_| "{}".to_string());
            Ok(json_response(StatusCode::OK, body))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::POST, "/zones") => {
            let body = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(error_response(StatusCode::BAD_REQUEST, "unreadable body")),
            };
            let zones: ZoneSet = match serde_json::from_slice(&body) {
                Ok(z) => z,
                Err(e) => {
                    return Ok(error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid zone config: {e}"),
                    ))
                }
            };

            let (resp_tx, resp_rx) = oneshot::channel();
            if cmd_tx.send(EngineCommand::UpdateZones { zones, resp: resp_tx }).await.is_err() {
                return Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable"));
            }
            match resp_rx.await {
                Ok(Ok(())) => {
                    Ok(json_response(StatusCode::OK, r#"{"ok":true}"#.to_string()))
                }
                Ok(Err(e)) => Ok(error_response(engine_error_status(&e), &e.to_string())),
                Err(_) => Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable")),
            }
        }
        (&Method::POST, "/counters/reset") => {
            // Privileged operation: require Basic auth when configured
            if let Some(expected) = auth_header.as_ref() {
                let provided = req
                    .headers()
                    .get(hyper::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok());
                if provided != Some(expected.as_str()) {
                    warn!("counter_reset_unauthorized");
                    return Ok(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
                }
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            if cmd_tx.send(EngineCommand::ResetCounters { resp: resp_tx }).await.is_err() {
                return Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable"));
            }
            match resp_rx.await {
                Ok(()) => Ok(json_response(StatusCode::OK, r#"{"ok":true}"#.to_string())),
                Err(_) => Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable")),
            }
        }
        (&Method::POST, _) => {
            let Some(ticket_id) = cancel_ticket_id(&path).map(str::to_string) else {
                return Ok(Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Full::new(Bytes::from("Not Found")))
                    .expect("static response should not fail"));
            };
            let body = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(error_response(StatusCode::BAD_REQUEST, "unreadable body")),
            };
            let cancel: CancelBody = match serde_json::from_slice(&body) {
                Ok(c) => c,
                Err(e) => {
                    return Ok(error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid cancel body: {e}"),
                    ))
                }
            };

            let (resp_tx, resp_rx) = oneshot::channel();
            let cmd = EngineCommand::Cancel {
                ticket_id: ticket_id.clone(),
                reason: cancel.reason,
                resp: resp_tx,
            };
            if cmd_tx.send(cmd).await.is_err() {
                return Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable"));
            }
            match resp_rx.await {
                Ok(Ok(status)) => Ok(json_response(
                    StatusCode::OK,
                    serde_json::json!({"ok": true, "status": status.as_str()}).to_string(),
                )),
                Ok(Err(e)) => Ok(error_response(engine_error_status(&e), &e.to_string())),
                Err(_) => Ok(error_response(StatusCode::SERVICE_UNAVAILABLE, "engine unavailable")),
            }
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the HTTP control server
pub async fn start_control_server(
    config: &Config,
    cmd_tx: mpsc::Sender<EngineCommand>,
    snapshot_slot: Arc<SnapshotSlot>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port = config.control_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let auth_header =
        Arc::new(expected_auth_header(config.control_username(), config.control_password()));

    info!(port = %port, auth = %auth_header.is_some(), "control_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let cmd_tx = cmd_tx.clone();
                        let snapshot_slot = snapshot_slot.clone();
                        let auth_header = auth_header.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let cmd_tx = cmd_tx.clone();
                                let snapshot_slot = snapshot_slot.clone();
                                let auth_header = auth_header.clone();
                                async move {
                                    handle_request(req, cmd_tx, snapshot_slot, auth_header).await
                                }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "control_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "control_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("control_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::zone::ZoneConfigError;

    #[test]
    fn test_cancel_ticket_id_parsing() {
        assert_eq!(cancel_ticket_id("/tickets/abc-123/cancel"), Some("abc-123"));
        assert_eq!(cancel_ticket_id("/tickets//cancel"), None);
        assert_eq!(cancel_ticket_id("/tickets/abc"), None);
        assert_eq!(cancel_ticket_id("/tickets/a/b/cancel"), None);
        assert_eq!(cancel_ticket_id("/zones"), None);
    }

    #[test]
    fn test_expected_auth_header() {
        assert_eq!(expected_auth_header(None, None), None);
        assert_eq!(expected_auth_header(Some("admin"), None), None);

        let header = expected_auth_header(Some("admin"), Some("secret")).unwrap();
        assert!(header.starts_with("Basic "));
        let decoded = STANDARD.decode(header.trim_start_matches("Basic ")).unwrap();
        assert_eq!(decoded, b"admin:secret");
    }

    #[test]
    fn test_engine_error_status_mapping() {
        assert_eq!(
            engine_error_status(&EngineError::UnknownTicket("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(engine_error_status(&EngineError::EmptyReason), StatusCode::BAD_REQUEST);
        assert_eq!(
            engine_error_status(&EngineError::InvalidZones(ZoneConfigError::Degenerate {
                zone: "gate_area"
            })),
            StatusCode::BAD_REQUEST
        );
    }
}
