//! Environment-variable overrides on top of the serving defaults.
//!
//! Kept to a single test: environment mutation is process-global.

use lightlag::config::ProxyConfig;

#[test]
fn environment_overrides_apply_in_one_pass() {
    // SAFETY: this is the only test in the workspace touching these
    // variables, and integration test binaries run in their own process.
    unsafe {
        std::env::set_var("CELESTIAL_BODY", "Jupiter");
        std::env::set_var("HTTP_ENABLED", "false");
        std::env::set_var("SOCKS_LISTEN", "127.0.0.1:4080");
        std::env::set_var("MIN_LATENCY_SECONDS", "2.5");
    }

    let mut config = ProxyConfig::default();
    config.apply_env().expect("env overrides");

    assert_eq!(config.fallback_body, "jupiter");
    assert_eq!(config.socks.default_body, "jupiter");
    assert!(!config.http.enabled);
    assert_eq!(config.socks.listen.port(), 4080);
    assert_eq!(config.min_latency_seconds, 2.5);

    unsafe {
        std::env::set_var("MIN_LATENCY_SECONDS", "not-a-number");
    }
    assert!(config.apply_env().is_err(), "bad values must be rejected");

    unsafe {
        std::env::remove_var("CELESTIAL_BODY");
        std::env::remove_var("HTTP_ENABLED");
        std::env::remove_var("SOCKS_LISTEN");
        std::env::remove_var("MIN_LATENCY_SECONDS");
    }
}
