//! Integration tests for configuration loading

use gatecheck::domain::zone::ExaminationMode;
use gatecheck::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "terminal-b"

[mqtt]
host = "test-host"
port = 1884
frames_topic = "site/frames"
guards_topic = "site/guards"

[zones]
enabled = true
examination_mode = "batch"

[zones.gate_area]
x = 0.2
y = 0.2
width = 0.3
height = 0.3

[zones.guard_anchor]
x = 0.6
y = 0.2
width = 0.2
height = 0.3

[engine]
coalesce_window_ms = 2000
debounce_frames = 2
track_grace_ms = 3000

[assignment]
accept_delay_ms = 1000
warning_wait_ms = 20000
critical_wait_ms = 40000
mode_priority = ["batch", "sequential"]

[timeouts]
wait_ms = 45000
check_ms = 90000

[body_check]
batch_threshold = 0.6

[audit]
file = "out/tickets.jsonl"

[control]
port = 9001
username = "ops"
password = "secret"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "terminal-b");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_frames_topic(), "site/frames");
    assert_eq!(config.mqtt_guards_topic(), "site/guards");

    assert_eq!(config.zones().examination_mode, ExaminationMode::Batch);
    assert!((config.zones().gate_area.x - 0.2).abs() < 1e-9);
    assert!((config.zones().guard_anchor.width - 0.2).abs() < 1e-9);

    assert_eq!(config.coalesce_window_ms(), 2000);
    assert_eq!(config.debounce_frames(), 2);
    assert_eq!(config.track_grace_ms(), 3000);
    assert_eq!(config.accept_delay_ms(), 1000);
    assert_eq!(config.warning_wait_ms(), 20000);
    assert_eq!(config.critical_wait_ms(), 40000);
    assert_eq!(
        config.mode_priority(),
        &[ExaminationMode::Batch, ExaminationMode::Sequential]
    );
    assert_eq!(config.wait_timeout_ms(), 45000);
    assert_eq!(config.check_timeout_ms(), 90000);
    // Unset timeout falls back to its default
    assert_eq!(config.verify_timeout_ms(), 15000);
    assert!((config.body_batch_threshold() - 0.6).abs() < 1e-9);
    assert_eq!(config.audit_file(), "out/tickets.jsonl");
    assert_eq!(config.control_port(), 9001);
    assert_eq!(config.control_username(), Some("ops"));
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
}

#[test]
fn test_defaults_fill_missing_sections() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // Only the required mqtt section; everything else defaulted
    let config_content = r#"
[mqtt]
host = "localhost"
port = 1883
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "gatecheck");
    assert_eq!(config.mqtt_frames_topic(), "gatecheck/frames");
    assert_eq!(config.coalesce_window_ms(), 1500);
    assert_eq!(config.debounce_frames(), 3);
    assert_eq!(config.wait_timeout_ms(), 60_000);
    assert_eq!(config.audit_file(), "tickets.jsonl");
    assert!(config.zones().enabled);
    assert!(config.zones().validate().is_ok());
    assert_eq!(config.zones().examination_mode, ExaminationMode::Sequential);
}

#[test]
fn test_invalid_zones_rejected_at_load() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[mqtt]
host = "localhost"
port = 1883

[zones]
enabled = true
examination_mode = "sequential"

[zones.gate_area]
x = 0.9
y = 0.9
width = 0.5
height = 0.5

[zones.guard_anchor]
x = 0.1
y = 0.1
width = 0.2
height = 0.2
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid zones"));
}

#[test]
fn test_load_from_path_falls_back_to_defaults() {
    let config = Config::load_from_path("definitely/not/a/real/path.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.site_id(), "gatecheck");
}
