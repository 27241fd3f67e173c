use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightlag::catalog::Catalog;
use lightlag::config::ProxyConfig;
use lightlag::ephemeris::Ephemeris;
use lightlag::http::HttpContext;
use lightlag::metrics::Metrics;
use lightlag::policy::{Admission, AllowList, PortPolicy, RateLimiter};
use lightlag::socks::{SocksContext, SocksServer};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Interplanetary latency simulation proxy (HTTP + SOCKS5)"
)]
struct Cli {
    /// Config file (YAML or TOML); flags and environment override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Service domain suffix (e.g. latency.space)
    #[arg(long)]
    suffix: Option<String>,

    /// Fallback body for bare-IP and non-suffix hosts
    #[arg(long)]
    body: Option<String>,

    /// HTTP listener address
    #[arg(long)]
    http_listen: Option<SocketAddr>,

    /// Primary SOCKS5 listener address
    #[arg(long)]
    socks_listen: Option<SocketAddr>,

    /// Metrics listener address
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Extra per-body SOCKS5 binding as body=addr (repeatable)
    #[arg(long = "socks-bind", value_parser = parse_binding)]
    socks_bindings: Vec<(String, SocketAddr)>,

    /// Allow-list file, one destination per line
    #[arg(long)]
    allow_list: Option<PathBuf>,

    /// Extra catalog records (YAML file or TOML directory)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Minimum accepted one-way latency in seconds
    #[arg(long)]
    min_latency: Option<f64>,

    /// Disable the HTTP front-end
    #[arg(long)]
    no_http: bool,

    /// Disable the SOCKS5 front-end
    #[arg(long)]
    no_socks: bool,
}

fn parse_binding(raw: &str) -> Result<(String, SocketAddr), String> {
    let (body, addr) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected body=addr, got `{raw}`"))?;
    let addr = addr
        .parse()
        .map_err(|e| format!("invalid listen address `{addr}`: {e}"))?;
    Ok((body.to_lowercase(), addr))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lightlag=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ProxyConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ProxyConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    apply_cli_overrides(&mut config, &cli);

    // ---- Catalog + ephemeris ----
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::builtin_with_overrides(path)
            .with_context(|| format!("loading catalog from {}", path.display()))?,
        None => Catalog::builtin(),
    };
    if !catalog.contains(&config.fallback_body) {
        bail!("fallback body `{}` is not in the catalog", config.fallback_body);
    }
    if !catalog.contains(&config.socks.default_body) {
        bail!(
            "socks default body `{}` is not in the catalog",
            config.socks.default_body
        );
    }
    let catalog = Arc::new(catalog);
    tracing::info!(bodies = catalog.len(), "catalog loaded");

    let ephemeris = Arc::new(Ephemeris::new(
        catalog.clone(),
        Duration::from_secs(config.refresh_interval_seconds),
    ));
    let snapshot = ephemeris
        .snapshot(Utc::now())
        .context("computing initial distance table")?;
    if let Some(entry) = snapshot.entry(&config.fallback_body) {
        tracing::info!(
            body = %entry.name,
            distance_km = entry.distance_km as u64,
            latency_seconds = entry.latency_seconds as u64,
            "initial distance table ready"
        );
    }

    // ---- Policy ----
    let allow_list = match &config.allow_list_path {
        Some(path) => AllowList::from_path(path)
            .with_context(|| format!("loading allow-list from {}", path.display()))?,
        None => AllowList::bundled(),
    };
    tracing::info!(entries = allow_list.len(), "allow-list loaded");

    let admission = Arc::new(Admission::new(
        allow_list,
        PortPolicy::new(config.allowed_ports.clone(), config.socks.admit_target_port),
        Duration::from_secs_f64(config.min_latency_seconds),
        ephemeris.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.per_second,
        config.rate_limit.burst,
    ));
    let metrics = Arc::new(Metrics::new());

    let mut listeners: tokio::task::JoinSet<std::io::Result<()>> = tokio::task::JoinSet::new();

    // ---- HTTP front-end ----
    if config.http.enabled {
        let ctx = Arc::new(HttpContext::new(
            admission.clone(),
            limiter.clone(),
            metrics.clone(),
            config.domain_suffix.clone(),
            config.fallback_body.clone(),
        ));
        let listener = tokio::net::TcpListener::bind(config.http.listen)
            .await
            .with_context(|| format!("binding http listener on {}", config.http.listen))?;
        tracing::info!(addr = %config.http.listen, "http listener ready");
        listeners.spawn(lightlag::http::serve(listener, ctx));
    }

    // ---- SOCKS front-end ----
    if config.socks.enabled {
        let ctx = Arc::new(SocksContext {
            admission: admission.clone(),
            limiter: limiter.clone(),
            metrics: metrics.clone(),
            suffix: config.domain_suffix.clone(),
            default_body: config.socks.default_body.clone(),
        });

        let primary = SocksServer::bind(config.socks.listen, None, ctx.clone())
            .await
            .with_context(|| format!("binding socks listener on {}", config.socks.listen))?;
        listeners.spawn(primary.run());

        for binding in &config.socks.bindings {
            if !catalog.contains(&binding.body) {
                bail!("socks binding body `{}` is not in the catalog", binding.body);
            }
            let server =
                SocksServer::bind(binding.listen, Some(binding.body.clone()), ctx.clone())
                    .await
                    .with_context(|| {
                        format!("binding socks listener for {} on {}", binding.body, binding.listen)
                    })?;
            listeners.spawn(server.run());
        }
    }

    // ---- Metrics ----
    if config.metrics.enabled {
        let listener = tokio::net::TcpListener::bind(config.metrics.listen)
            .await
            .with_context(|| format!("binding metrics listener on {}", config.metrics.listen))?;
        tracing::info!(addr = %config.metrics.listen, "metrics listener ready");
        listeners.spawn(lightlag::http::serve_metrics(listener, metrics.clone()));
    }

    if listeners.is_empty() {
        bail!("all subsystems disabled; nothing to serve");
    }

    // ---- Background distance-table refresh ----
    let refresh = ephemeris.clone();
    let refresh_every = Duration::from_secs(config.refresh_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_every);
        ticker.tick().await; // first tick is immediate; the table is warm
        loop {
            ticker.tick().await;
            if let Err(e) = refresh.snapshot(Utc::now()) {
                tracing::error!(error = %e, "distance table refresh failed");
            }
        }
    });

    // ---- Run until a signal, then bounded shutdown ----
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!(
                grace_seconds = config.shutdown_grace_seconds,
                "shutdown signal received; closing listeners"
            );
        }
        Some(result) = listeners.join_next() => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "listener failed"),
                Err(e) => tracing::error!(error = %e, "listener task panicked"),
                Ok(Ok(())) => {}
            }
        }
    }

    // Stop accepting immediately; give in-flight sessions the grace period,
    // then the process exit cancels any remaining light-time sleeps.
    listeners.shutdown().await;
    tokio::time::sleep(Duration::from_secs(config.shutdown_grace_seconds.min(300))).await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn apply_cli_overrides(config: &mut ProxyConfig, cli: &Cli) {
    if let Some(suffix) = &cli.suffix {
        config.domain_suffix = suffix.clone();
    }
    if let Some(body) = &cli.body {
        config.fallback_body = body.to_lowercase();
        config.socks.default_body = config.fallback_body.clone();
    }
    if let Some(addr) = cli.http_listen {
        config.http.listen = addr;
    }
    if let Some(addr) = cli.socks_listen {
        config.socks.listen = addr;
    }
    if let Some(addr) = cli.metrics_listen {
        config.metrics.listen = addr;
    }
    for (body, listen) in &cli.socks_bindings {
        config.socks.bindings.push(lightlag::config::SocksBinding {
            body: body.clone(),
            listen: *listen,
        });
    }
    if let Some(path) = &cli.allow_list {
        config.allow_list_path = Some(path.clone());
    }
    if let Some(path) = &cli.catalog {
        config.catalog_path = Some(path.clone());
    }
    if let Some(min) = cli.min_latency {
        config.min_latency_seconds = min;
    }
    if cli.no_http {
        config.http.enabled = false;
    }
    if cli.no_socks {
        config.socks.enabled = false;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
