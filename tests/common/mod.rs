//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lightlag::catalog::{BodyClass, Catalog, CelestialObject, OrbitalElements, builtin_objects};
use lightlag::ephemeris::Ephemeris;
use lightlag::metrics::Metrics;
use lightlag::policy::{Admission, AllowList, PortPolicy, RateLimiter};

pub const SUFFIX: &str = "latency.space";

/// A relay test needs sub-second light-time: `testsat` sits 15,000 km from
/// Earth (~50 ms one-way).
pub const TESTSAT_DISTANCE_KM: f64 = 15_000.0;

pub fn testsat() -> CelestialObject {
    CelestialObject {
        name: "testsat".to_string(),
        class: BodyClass::Spacecraft,
        parent: Some("earth".to_string()),
        radius_km: 0.01,
        mass_kg: 500.0,
        elements: OrbitalElements {
            a: TESTSAT_DISTANCE_KM,
            ..Default::default()
        },
        spacecraft: None,
    }
}

pub fn test_catalog() -> Arc<Catalog> {
    let mut objects = builtin_objects();
    objects.push(testsat());
    Arc::new(Catalog::from_objects(objects).expect("test catalog is valid"))
}

pub fn test_ephemeris() -> Arc<Ephemeris> {
    Arc::new(Ephemeris::new(test_catalog(), Duration::from_secs(3600)))
}

/// Admission over the test catalog. `extra_ports` is for ephemeral origin
/// listeners the HTTP port gate must admit.
pub fn test_admission(min_latency: Duration, extra_ports: Vec<u16>) -> Arc<Admission> {
    let mut ports = vec![80, 443, 8080, 53];
    ports.extend(extra_ports);
    Arc::new(Admission::new(
        AllowList::bundled(),
        PortPolicy::new(ports, true),
        min_latency,
        test_ephemeris(),
    ))
}

pub fn generous_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(10_000.0, 10_000.0))
}

pub fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new())
}

/// One-way light-time of `testsat`, in seconds.
pub fn testsat_latency_seconds() -> f64 {
    TESTSAT_DISTANCE_KM / 299_792.458
}
