use fish_observer_rs::{load_config_from, start};
use log::{log_enabled, Level};

#[test]
fn start_installs_the_configured_logger_once() {
    let config = load_config_from(["fish-observer", "--log-level-filter", "WARN"]).unwrap();

    let config = start(config).unwrap();

    assert!(log_enabled!(target: "observe::provider", Level::Warn));
    assert!(!log_enabled!(target: "observe::provider", Level::Info));
    assert!(start(config).is_err());
}
