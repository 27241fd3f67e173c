//! Facade smoke tests.

use lightlag::catalog::Catalog;
use lightlag::metrics::Metrics;

#[test]
fn version_is_exposed() {
    assert!(!lightlag::version().is_empty());
}

#[test]
fn builtin_catalog_has_the_headline_bodies() {
    let catalog = Catalog::builtin();
    for name in [
        "sun",
        "mercury",
        "venus",
        "earth",
        "mars",
        "jupiter",
        "saturn",
        "uranus",
        "neptune",
        "pluto",
        "moon",
        "titan",
        "voyager-1",
        "iss",
    ] {
        assert!(catalog.contains(name), "missing {name}");
    }
}

#[test]
fn metrics_render_from_a_fresh_registry() {
    let metrics = Metrics::new();
    let text = metrics.render();
    assert!(text.contains("http_requests_total 0"));
    assert!(text.contains("# TYPE request_duration_seconds histogram"));
}
