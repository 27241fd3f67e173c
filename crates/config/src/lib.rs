//! Configuration models and loaders for the lightlag proxy.
//!
//! A config file (YAML or TOML) is optional; every field has a serving
//! default, and the common knobs can be overridden through environment
//! variables (`CELESTIAL_BODY`, `HTTP_ENABLED`, `SOCKS_ENABLED`, …) or the
//! CLI flags layered on top by the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
}

/// One dedicated SOCKS5 listener pinned to a body (port-per-body model).
#[derive(Debug, Deserialize, Clone)]
pub struct SocksBinding {
    pub body: String,
    pub listen: SocketAddr,
}

/// HTTP front-end settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            enabled: true,
            listen: "0.0.0.0:80".parse().expect("static addr"),
        }
    }
}

/// SOCKS front-end settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SocksConfig {
    pub enabled: bool,
    /// Primary listener; sessions here use `default_body` unless the
    /// destination hostname overrides it through the grammar.
    pub listen: SocketAddr,
    pub default_body: String,
    /// Additional per-body listeners.
    pub bindings: Vec<SocksBinding>,
    /// Admit the session's own target port beyond the static whitelist.
    pub admit_target_port: bool,
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            enabled: true,
            listen: "0.0.0.0:1080".parse().expect("static addr"),
            default_body: "mars".to_string(),
            bindings: Vec::new(),
            admit_target_port: true,
        }
    }
}

/// Metrics endpoint settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            enabled: true,
            listen: "0.0.0.0:9090".parse().expect("static addr"),
        }
    }
}

/// Rate limiter settings (per source IP).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_second: f64,
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            per_second: 0.5,
            burst: 20.0,
        }
    }
}

/// Top-level proxy configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    /// Service suffix the hostname grammar hangs off.
    pub domain_suffix: String,
    /// Body assumed for bare-IP and non-suffix hosts.
    pub fallback_body: String,
    pub http: HttpConfig,
    pub socks: SocksConfig,
    pub metrics: MetricsConfig,
    /// Optional allow-list file (one destination per line).
    pub allow_list_path: Option<PathBuf>,
    /// Optional extra catalog records merged over the built-ins.
    pub catalog_path: Option<PathBuf>,
    /// Minimum one-way latency accepted by admission, in seconds.
    pub min_latency_seconds: f64,
    /// Destination ports accepted in addition to the SOCKS session port.
    pub allowed_ports: Vec<u16>,
    pub rate_limit: RateLimitConfig,
    /// Distance-table refresh interval.
    pub refresh_interval_seconds: u64,
    /// Shutdown grace period before in-flight sessions are cancelled.
    pub shutdown_grace_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            domain_suffix: "latency.space".to_string(),
            fallback_body: "mars".to_string(),
            http: HttpConfig::default(),
            socks: SocksConfig::default(),
            metrics: MetricsConfig::default(),
            allow_list_path: None,
            catalog_path: None,
            min_latency_seconds: 1.0,
            allowed_ports: vec![80, 443, 8080, 53],
            rate_limit: RateLimitConfig::default(),
            refresh_interval_seconds: 3_600,
            shutdown_grace_seconds: 30,
        }
    }
}

impl ProxyConfig {
    /// Load from a YAML or TOML file, by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ProxyConfig, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        if path.extension().map(|ext| ext == "toml").unwrap_or(false) {
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(serde_yaml::from_str(&contents)?)
        }
    }

    /// Apply environment-variable overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = read_env("DOMAIN_SUFFIX") {
            self.domain_suffix = v;
        }
        if let Some(v) = read_env("CELESTIAL_BODY") {
            self.fallback_body = v.to_lowercase();
            self.socks.default_body = self.fallback_body.clone();
        }
        if let Some(v) = read_env("HTTP_ENABLED") {
            self.http.enabled = parse_bool("HTTP_ENABLED", &v)?;
        }
        if let Some(v) = read_env("SOCKS_ENABLED") {
            self.socks.enabled = parse_bool("SOCKS_ENABLED", &v)?;
        }
        if let Some(v) = read_env("HTTP_LISTEN") {
            self.http.listen = parse_addr("HTTP_LISTEN", &v)?;
        }
        if let Some(v) = read_env("SOCKS_LISTEN") {
            self.socks.listen = parse_addr("SOCKS_LISTEN", &v)?;
        }
        if let Some(v) = read_env("METRICS_LISTEN") {
            self.metrics.listen = parse_addr("METRICS_LISTEN", &v)?;
        }
        if let Some(v) = read_env("ALLOWED_DESTINATIONS_FILE") {
            self.allow_list_path = Some(PathBuf::from(v));
        }
        if let Some(v) = read_env("MIN_LATENCY_SECONDS") {
            self.min_latency_seconds =
                v.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "MIN_LATENCY_SECONDS".to_string(),
                    value: v,
                })?;
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_addr(var: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_serving_ready() {
        let config = ProxyConfig::default();
        assert_eq!(config.domain_suffix, "latency.space");
        assert_eq!(config.fallback_body, "mars");
        assert_eq!(config.min_latency_seconds, 1.0);
        assert!(config.http.enabled);
        assert!(config.socks.enabled);
        assert_eq!(config.socks.listen.port(), 1080);
        assert_eq!(config.metrics.listen.port(), 9090);
        assert_eq!(config.allowed_ports, vec![80, 443, 8080, 53]);
    }

    #[test]
    fn yaml_round_trip() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "domain_suffix: example.test\nmin_latency_seconds: 0.25\nsocks:\n  listen: 127.0.0.1:2080\n  default_body: moon\n  bindings:\n    - body: mars\n      listen: 127.0.0.1:1081\n    - body: jupiter\n      listen: 127.0.0.1:1082"
        )
        .unwrap();

        let config = ProxyConfig::from_path(file.path()).unwrap();
        assert_eq!(config.domain_suffix, "example.test");
        assert_eq!(config.min_latency_seconds, 0.25);
        assert_eq!(config.socks.default_body, "moon");
        assert_eq!(config.socks.bindings.len(), 2);
        assert_eq!(config.socks.bindings[1].body, "jupiter");
        // Untouched sections keep their defaults.
        assert!(config.http.enabled);
    }

    #[test]
    fn toml_config_parses() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "fallback_body = \"moon\"\n[http]\nlisten = \"127.0.0.1:8080\"\n[metrics]\nenabled = false"
        )
        .unwrap();

        let config = ProxyConfig::from_path(file.path()).unwrap();
        assert_eq!(config.fallback_body, "moon");
        assert_eq!(config.http.listen.port(), 8080);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn bool_parsing_accepts_common_forms() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
