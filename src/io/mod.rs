//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client receiving detector frames and guard presence
//! - `mqtt_egress` - MQTT publisher for snapshots and events
//! - `egress_channel` - Typed channel for egress messages
//! - `audit` - Ticket audit trail (JSONL format)
//! - `control` - HTTP control API (cancel, zones, counter reset, snapshot)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod audit;
pub mod control;
pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;

// Re-export commonly used types
pub use egress_channel::{
    create_egress_channel, CrossingEventPayload, EgressSender, SnapshotPayload, SnapshotSlot,
    TicketEventPayload,
};
pub use mqtt_egress::MqttPublisher;
