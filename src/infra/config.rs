//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every policy constant of the engine (coalescing window, debounce,
//! timeouts, scoring weights, queue priority) lives here; nothing is
//! hard-coded in the services.

use crate::domain::zone::{ExaminationMode, ZoneSet};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_frames_topic")]
    pub frames_topic: String,
    #[serde(default = "default_guards_topic")]
    pub guards_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_frames_topic() -> String {
    "gatecheck/frames".to_string()
}

fn default_guards_topic() -> String {
    "gatecheck/guards".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
    #[serde(default = "default_track_grace_ms")]
    pub track_grace_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_coalesce_window_ms() -> u64 {
    1500
}

fn default_debounce_frames() -> u32 {
    3
}

fn default_track_grace_ms() -> u64 {
    2000
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_history_cap() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            debounce_frames: default_debounce_frames(),
            track_grace_ms: default_track_grace_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            history_cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentConfig {
    #[serde(default = "default_accept_delay_ms")]
    pub accept_delay_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_warning_wait_ms")]
    pub warning_wait_ms: u64,
    #[serde(default = "default_critical_wait_ms")]
    pub critical_wait_ms: u64,
    /// Examination-mode priority classes, highest first; empty = no preference
    #[serde(default)]
    pub mode_priority: Vec<ExaminationMode>,
}

fn default_accept_delay_ms() -> u64 {
    1500
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_warning_wait_ms() -> u64 {
    30_000
}

fn default_critical_wait_ms() -> u64 {
    45_000
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            accept_delay_ms: default_accept_delay_ms(),
            cooldown_ms: default_cooldown_ms(),
            warning_wait_ms: default_warning_wait_ms(),
            critical_wait_ms: default_critical_wait_ms(),
            mode_priority: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_ms: u64,
    #[serde(default = "default_check_timeout_ms")]
    pub check_ms: u64,
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_ms: u64,
    #[serde(default = "default_verify_confirm_ms")]
    pub verify_confirm_ms: u64,
}

fn default_wait_timeout_ms() -> u64 {
    60_000
}

fn default_check_timeout_ms() -> u64 {
    120_000
}

fn default_verify_timeout_ms() -> u64 {
    15_000
}

fn default_verify_confirm_ms() -> u64 {
    5000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_wait_timeout_ms(),
            check_ms: default_check_timeout_ms(),
            verify_ms: default_verify_timeout_ms(),
            verify_confirm_ms: default_verify_confirm_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodyCheckConfig {
    #[serde(default = "default_hand_weight")]
    pub hand_weight: f64,
    #[serde(default = "default_reach_weight")]
    pub reach_weight: f64,
    #[serde(default = "default_proximity_weight")]
    pub proximity_weight: f64,
    #[serde(default = "default_sequential_threshold")]
    pub sequential_threshold: f64,
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: f64,
}

fn default_hand_weight() -> f64 {
    0.4
}

fn default_reach_weight() -> f64 {
    0.4
}

fn default_proximity_weight() -> f64 {
    0.2
}

fn default_sequential_threshold() -> f64 {
    1.0
}

fn default_batch_threshold() -> f64 {
    0.75
}

impl Default for BodyCheckConfig {
    fn default() -> Self {
        Self {
            hand_weight: default_hand_weight(),
            reach_weight: default_reach_weight(),
            proximity_weight: default_proximity_weight(),
            sequential_threshold: default_sequential_threshold(),
            batch_threshold: default_batch_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// File path for the ticket audit trail (JSONL format)
    #[serde(default = "default_audit_file")]
    pub file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { file: default_audit_file() }
    }
}

fn default_audit_file() -> String {
    "tickets.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    #[serde(default = "default_mqtt_egress_enabled")]
    pub enabled: bool,
    /// Topic for per-frame engine snapshots (QoS 0)
    #[serde(default = "default_snapshots_topic")]
    pub snapshots_topic: String,
    /// Topic for ticket lifecycle events (QoS 1)
    #[serde(default = "default_tickets_topic")]
    pub tickets_topic: String,
    /// Topic for zone crossing events (QoS 0)
    #[serde(default = "default_events_topic")]
    pub events_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    #[serde(default = "default_metrics_topic")]
    pub metrics_topic: String,
    #[serde(default = "default_metrics_publish_interval")]
    pub metrics_publish_interval_secs: u64,
}

fn default_mqtt_egress_enabled() -> bool {
    true
}

fn default_snapshots_topic() -> String {
    "gatecheck/snapshots".to_string()
}

fn default_tickets_topic() -> String {
    "gatecheck/tickets".to_string()
}

fn default_events_topic() -> String {
    "gatecheck/events".to_string()
}

fn default_metrics_topic() -> String {
    "gatecheck/metrics".to_string()
}

fn default_metrics_publish_interval() -> u64 {
    5
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_egress_enabled(),
            snapshots_topic: default_snapshots_topic(),
            tickets_topic: default_tickets_topic(),
            events_topic: default_events_topic(),
            metrics_topic: default_metrics_topic(),
            metrics_publish_interval_secs: default_metrics_publish_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// HTTP control API port (0 to disable)
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// Basic-auth credentials for privileged routes (counter reset)
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_control_port() -> u16 {
    8088
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { port: default_control_port(), username: None, password: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "terminal-b")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "gatecheck".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub zones: ZoneSet,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub body_check: BodyCheckConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub egress: MqttEgressConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_frames_topic: String,
    mqtt_guards_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    broker_bind_address: String,
    broker_port: u16,
    zones: ZoneSet,
    coalesce_window_ms: u64,
    debounce_frames: u32,
    track_grace_ms: u64,
    tick_interval_ms: u64,
    history_cap: usize,
    accept_delay_ms: u64,
    cooldown_ms: u64,
    warning_wait_ms: u64,
    critical_wait_ms: u64,
    mode_priority: Vec<ExaminationMode>,
    wait_timeout_ms: u64,
    check_timeout_ms: u64,
    verify_timeout_ms: u64,
    verify_confirm_ms: u64,
    body_hand_weight: f64,
    body_reach_weight: f64,
    body_proximity_weight: f64,
    body_sequential_threshold: f64,
    body_batch_threshold: f64,
    audit_file: String,
    egress_enabled: bool,
    egress_snapshots_topic: String,
    egress_tickets_topic: String,
    egress_events_topic: String,
    egress_metrics_topic: String,
    egress_metrics_interval_secs: u64,
    control_port: u16,
    control_username: Option<String>,
    control_password: Option<String>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(
            TomlConfig {
                site: SiteConfig::default(),
                mqtt: MqttConfig {
                    host: "localhost".to_string(),
                    port: 1883,
                    frames_topic: default_frames_topic(),
                    guards_topic: default_guards_topic(),
                    username: None,
                    password: None,
                },
                broker: BrokerConfig::default(),
                zones: ZoneSet::default(),
                engine: EngineConfig::default(),
                assignment: AssignmentConfig::default(),
                timeouts: TimeoutsConfig::default(),
                body_check: BodyCheckConfig::default(),
                audit: AuditConfig::default(),
                egress: MqttEgressConfig::default(),
                control: ControlConfig::default(),
                metrics: MetricsConfig::default(),
            },
            "default",
        )
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let site_id = if toml_config.site.id.is_empty() {
            default_site_id()
        } else {
            toml_config.site.id
        };
        Self {
            site_id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_frames_topic: toml_config.mqtt.frames_topic,
            mqtt_guards_topic: toml_config.mqtt.guards_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            zones: toml_config.zones,
            coalesce_window_ms: toml_config.engine.coalesce_window_ms,
            debounce_frames: toml_config.engine.debounce_frames,
            track_grace_ms: toml_config.engine.track_grace_ms,
            tick_interval_ms: toml_config.engine.tick_interval_ms,
            history_cap: toml_config.engine.history_cap,
            accept_delay_ms: toml_config.assignment.accept_delay_ms,
            cooldown_ms: toml_config.assignment.cooldown_ms,
            warning_wait_ms: toml_config.assignment.warning_wait_ms,
            critical_wait_ms: toml_config.assignment.critical_wait_ms,
            mode_priority: toml_config.assignment.mode_priority,
            wait_timeout_ms: toml_config.timeouts.wait_ms,
            check_timeout_ms: toml_config.timeouts.check_ms,
            verify_timeout_ms: toml_config.timeouts.verify_ms,
            verify_confirm_ms: toml_config.timeouts.verify_confirm_ms,
            body_hand_weight: toml_config.body_check.hand_weight,
            body_reach_weight: toml_config.body_check.reach_weight,
            body_proximity_weight: toml_config.body_check.proximity_weight,
            body_sequential_threshold: toml_config.body_check.sequential_threshold,
            body_batch_threshold: toml_config.body_check.batch_threshold,
            audit_file: toml_config.audit.file,
            egress_enabled: toml_config.egress.enabled,
            egress_snapshots_topic: toml_config.egress.snapshots_topic,
            egress_tickets_topic: toml_config.egress.tickets_topic,
            egress_events_topic: toml_config.egress.events_topic,
            egress_metrics_topic: toml_config.egress.metrics_topic,
            egress_metrics_interval_secs: toml_config.egress.metrics_publish_interval_secs,
            control_port: toml_config.control.port,
            control_username: toml_config.control.username,
            control_password: toml_config.control.password,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        toml_config
            .zones
            .validate()
            .with_context(|| format!("Invalid zones in config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_frames_topic(&self) -> &str {
        &self.mqtt_frames_topic
    }

    pub fn mqtt_guards_topic(&self) -> &str {
        &self.mqtt_guards_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn coalesce_window_ms(&self) -> u64 {
        self.coalesce_window_ms
    }

    pub fn debounce_frames(&self) -> u32 {
        self.debounce_frames
    }

    pub fn track_grace_ms(&self) -> u64 {
        self.track_grace_ms
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    pub fn accept_delay_ms(&self) -> u64 {
        self.accept_delay_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn warning_wait_ms(&self) -> u64 {
        self.warning_wait_ms
    }

    pub fn critical_wait_ms(&self) -> u64 {
        self.critical_wait_ms
    }

    pub fn mode_priority(&self) -> &[ExaminationMode] {
        &self.mode_priority
    }

    pub fn wait_timeout_ms(&self) -> u64 {
        self.wait_timeout_ms
    }

    pub fn check_timeout_ms(&self) -> u64 {
        self.check_timeout_ms
    }

    pub fn verify_timeout_ms(&self) -> u64 {
        self.verify_timeout_ms
    }

    pub fn verify_confirm_ms(&self) -> u64 {
        self.verify_confirm_ms
    }

    pub fn body_hand_weight(&self) -> f64 {
        self.body_hand_weight
    }

    pub fn body_reach_weight(&self) -> f64 {
        self.body_reach_weight
    }

    pub fn body_proximity_weight(&self) -> f64 {
        self.body_proximity_weight
    }

    pub fn body_sequential_threshold(&self) -> f64 {
        self.body_sequential_threshold
    }

    pub fn body_batch_threshold(&self) -> f64 {
        self.body_batch_threshold
    }

    pub fn audit_file(&self) -> &str {
        &self.audit_file
    }

    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_snapshots_topic(&self) -> &str {
        &self.egress_snapshots_topic
    }

    pub fn egress_tickets_topic(&self) -> &str {
        &self.egress_tickets_topic
    }

    pub fn egress_events_topic(&self) -> &str {
        &self.egress_events_topic
    }

    pub fn egress_metrics_topic(&self) -> &str {
        &self.egress_metrics_topic
    }

    pub fn egress_metrics_interval_secs(&self) -> u64 {
        self.egress_metrics_interval_secs
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn control_username(&self) -> Option<&str> {
        self.control_username.as_deref()
    }

    pub fn control_password(&self) -> Option<&str> {
        self.control_password.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the examination mode
    #[cfg(test)]
    pub fn with_examination_mode(mut self, mode: ExaminationMode) -> Self {
        self.zones.examination_mode = mode;
        self
    }

    /// Builder method for tests to set debounce frames
    #[cfg(test)]
    pub fn with_debounce_frames(mut self, frames: u32) -> Self {
        self.debounce_frames = frames;
        self
    }

    /// Builder method for tests to set queue mode priority
    #[cfg(test)]
    pub fn with_mode_priority(mut self, priority: Vec<ExaminationMode>) -> Self {
        self.mode_priority = priority;
        self
    }

    /// Builder method for tests to override timeouts
    #[cfg(test)]
    pub fn with_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// Builder method for tests to set the audit file path
    #[cfg(test)]
    pub fn with_audit_file(mut self, path: &str) -> Self {
        self.audit_file = path.to_string();
        self
    }

    /// Builder method for tests to set the track grace period
    #[cfg(test)]
    pub fn with_track_grace_ms(mut self, ms: u64) -> Self {
        self.track_grace_ms = ms;
        self
    }

    /// Builder method for tests to set the acceptance delay
    #[cfg(test)]
    pub fn with_accept_delay_ms(mut self, ms: u64) -> Self {
        self.accept_delay_ms = ms;
        self
    }

    /// Builder method for tests to set the verify confirmation delay
    #[cfg(test)]
    pub fn with_verify_confirm_ms(mut self, ms: u64) -> Self {
        self.verify_confirm_ms = ms;
        self
    }

    /// Builder method for tests to set the verify timeout
    #[cfg(test)]
    pub fn with_verify_timeout_ms(mut self, ms: u64) -> Self {
        self.verify_timeout_ms = ms;
        self
    }

    /// Builder method for tests to set the check timeout
    #[cfg(test)]
    pub fn with_check_timeout_ms(mut self, ms: u64) -> Self {
        self.check_timeout_ms = ms;
        self
    }

    /// Builder method for tests to set the coalescing window
    #[cfg(test)]
    pub fn with_coalesce_window_ms(mut self, ms: u64) -> Self {
        self.coalesce_window_ms = ms;
        self
    }

    /// Builder method for tests to replace the zone set
    #[cfg(test)]
    pub fn with_zones(mut self, zones: ZoneSet) -> Self {
        self.zones = zones;
        self
    }
}
