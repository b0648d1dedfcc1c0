use std::{env, fs};

use vela_manager::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("vela.toml");

    let toml_content = r#"
[controller]
concurrent_reconciles = 2
resync_interval_secs = 60
max_conflict_retries = 3
pass_timeout_ms = 5000
system_namespace = "platform"

[render]
fetch_timeout_ms = 2500
user_agent = "vela-test"

[logging]
level = "debug"

[manifests]
dirs = ["defs", "apps"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.controller.concurrent_reconciles, 2);
    assert_eq!(cfg.controller.system_namespace, "platform");
    assert_eq!(cfg.render.user_agent, "vela-test");
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.manifests.dirs.len(), 2);
    let controller = cfg.controller_config();
    assert_eq!(controller.max_conflict_retries, 3);
    assert_eq!(controller.pass_timeout.as_millis(), 5000);

    // 2) Env override should win over file
    unsafe {
        env::set_var("VELA__CONTROLLER__CONCURRENT_RECONCILES", "9");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.controller.concurrent_reconciles, 9);
    unsafe {
        env::remove_var("VELA__CONTROLLER__CONCURRENT_RECONCILES");
    }

    // 3) Zero workers is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[controller]
concurrent_reconciles = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("concurrent_reconciles must be > 0"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults should validate");
    assert_eq!(cfg.controller.system_namespace, "vela-system");
    assert_eq!(cfg.render.fetch_timeout_ms, 10_000);
    assert!(cfg.manifests.dirs.is_empty());
}
