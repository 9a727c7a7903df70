//! Ticket audit trail - writes terminal tickets and counter resets to file
//!
//! Records are written in JSONL format (one JSON object per line) to the
//! file specified in config. This is the engine's durable audit output;
//! everything else it publishes is best-effort.

use crate::domain::ticket::Ticket;
use crate::services::crossing::ObjectCounts;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Audit writer for tickets and privileged operations
pub struct AuditLog {
    file_path: String,
    site_id: String,
}

impl AuditLog {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        info!(file_path = %file_path, "audit_initialized");
        Self { file_path: file_path.to_string(), site_id: site_id.to_string() }
    }

    /// Write a terminal ticket to the audit file
    /// Returns true if successful, false otherwise
    pub fn write_ticket(&self, ticket: &Ticket) -> bool {
        let json = ticket.to_json_with_site(&self.site_id);

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    ticket_id = %ticket.id,
                    status = %ticket.status.as_str(),
                    events = %ticket.events.len(),
                    "ticket_audited"
                );
                true
            }
            Err(e) => {
                error!(
                    ticket_id = %ticket.id,
                    error = %e,
                    "ticket_audit_failed"
                );
                false
            }
        }
    }

    /// Write a counter-reset audit record with the prior counter values
    pub fn write_counter_reset(&self, prior: &ObjectCounts, ts: u64) -> bool {
        let record = serde_json::json!({
            "t": "counter_reset",
            "site": self.site_id,
            "ts": ts,
            "at": chrono::Utc::now().to_rfc3339(),
            "prior": prior,
        });

        match self.append_line(&record.to_string()) {
            Ok(()) => {
                info!(ts = %ts, "counter_reset_audited");
                true
            }
            Err(e) => {
                error!(error = %e, "counter_reset_audit_failed");
                false
            }
        }
    }

    /// Append a line to the audit file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "audit_written");

        Ok(())
    }
}
