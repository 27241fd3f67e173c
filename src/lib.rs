//! Facade crate for the lightlag workspace.
//!
//! Re-exports every member crate under one roof so embedders and the
//! integration tests pull a single dependency. The binary lives in
//! `lightlag_cli`.

pub use lightlag_catalog as catalog;
pub use lightlag_config as config;
pub use lightlag_core as core;
pub use lightlag_ephemeris as ephemeris;
pub use lightlag_http as http;
pub use lightlag_metrics as metrics;
pub use lightlag_policy as policy;
pub use lightlag_routing as routing;
pub use lightlag_socks as socks;

/// Library version, for smoke tests and the health endpoint.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
