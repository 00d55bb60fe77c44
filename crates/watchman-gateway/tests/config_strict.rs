#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use watchman_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
presence:
  liveness_window_ms: 60000
  heartbet_interval_ms: 10000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert!(cfg.users.is_empty());

    let policy = cfg.presence.policy();
    assert_eq!(policy.window, Duration::from_secs(60));
    assert_eq!(policy.heartbeat, Duration::from_secs(10));
    assert_eq!(cfg.presence.fallback_label, "Watcher");
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn window_shorter_than_five_heartbeats_is_rejected() {
    let bad = r#"
version: 1
presence:
  liveness_window_ms: 30000
  heartbeat_interval_ms: 10000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("liveness_window_ms"), "{err}");
}

#[test]
fn duplicate_tickets_are_rejected() {
    let bad = r#"
version: 1
users:
  - { id: "u-ana", ticket: "t1" }
  - { id: "u-ben", ticket: "t1" }
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("duplicate ticket"), "{err}");
}

#[test]
fn idle_timeout_must_exceed_ping_interval() {
    let bad = r#"
version: 1
gateway:
  ping_interval_ms: 30000
  idle_timeout_ms: 20000
"#;
    assert!(config::load_from_str(bad).is_err());
}
