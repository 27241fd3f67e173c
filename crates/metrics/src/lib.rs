//! Metrics sink: atomic counters and fixed-bucket histograms, rendered in
//! Prometheus text exposition format.
//!
//! Everything on the relay hot path is a plain atomic add; label lookup
//! takes a short-lived read lock only when a labeled family is touched.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A counter family with one label dimension.
#[derive(Debug, Default)]
pub struct CounterVec {
    label: &'static str,
    children: RwLock<BTreeMap<String, Counter>>,
}

impl CounterVec {
    pub fn new(label: &'static str) -> CounterVec {
        CounterVec {
            label,
            children: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn inc(&self, value: &str) {
        {
            let children = self.children.read().unwrap();
            if let Some(counter) = children.get(value) {
                counter.inc();
                return;
            }
        }
        let mut children = self.children.write().unwrap();
        children.entry(value.to_string()).or_default().inc();
    }

    pub fn get(&self, value: &str) -> u64 {
        self.children
            .read()
            .unwrap()
            .get(value)
            .map(Counter::get)
            .unwrap_or(0)
    }
}

/// Histogram of seconds with fixed cumulative buckets.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<AtomicU64>,
    /// Sum in microseconds so the hot path stays integer-atomic.
    sum_micros: AtomicU64,
    total: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: Vec<f64>) -> Histogram {
        let counts = (0..bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            bounds,
            counts,
            sum_micros: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Buckets spanning sub-second debug bodies up to Voyager-scale hours.
    pub fn latency_buckets() -> Histogram {
        Histogram::new(vec![
            0.1, 1.0, 10.0, 60.0, 600.0, 3_600.0, 21_600.0, 86_400.0,
        ])
    }

    pub fn observe(&self, seconds: f64) {
        for (bound, count) in self.bounds.iter().zip(&self.counts) {
            if seconds <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_micros
            .fetch_add((seconds.max(0.0) * 1e6) as u64, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// All counters the proxy records.
#[derive(Debug)]
pub struct Metrics {
    pub http_requests_total: Counter,
    pub socks_sessions_total: Counter,
    pub udp_packets_total: Counter,
    pub bytes_relayed_total: Counter,
    pub requests_by_body: CounterVec,
    pub latency_floor_reject: CounterVec,
    pub occlusion_reject: CounterVec,
    pub allowlist_reject: CounterVec,
    pub rate_limit_reject: CounterVec,
    pub other_reject: CounterVec,
    pub request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics {
            http_requests_total: Counter::default(),
            socks_sessions_total: Counter::default(),
            udp_packets_total: Counter::default(),
            bytes_relayed_total: Counter::default(),
            requests_by_body: CounterVec::new("body"),
            latency_floor_reject: CounterVec::new("body"),
            occlusion_reject: CounterVec::new("body"),
            allowlist_reject: CounterVec::new("listener"),
            rate_limit_reject: CounterVec::new("listener"),
            other_reject: CounterVec::new("reason"),
            request_duration_seconds: Histogram::latency_buckets(),
        }
    }

    /// Render the whole registry in Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_counter(&mut out, "http_requests_total", &self.http_requests_total);
        render_counter(&mut out, "socks_sessions_total", &self.socks_sessions_total);
        render_counter(&mut out, "udp_packets_total", &self.udp_packets_total);
        render_counter(&mut out, "bytes_relayed_total", &self.bytes_relayed_total);
        render_counter_vec(&mut out, "requests_by_body_total", &self.requests_by_body);
        render_counter_vec(&mut out, "latency_floor_reject", &self.latency_floor_reject);
        render_counter_vec(&mut out, "occlusion_reject", &self.occlusion_reject);
        render_counter_vec(&mut out, "allowlist_reject", &self.allowlist_reject);
        render_counter_vec(&mut out, "rate_limit_reject", &self.rate_limit_reject);
        render_counter_vec(&mut out, "other_reject", &self.other_reject);
        render_histogram(
            &mut out,
            "request_duration_seconds",
            &self.request_duration_seconds,
        );
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

fn render_counter(out: &mut String, name: &str, counter: &Counter) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {}", counter.get());
}

fn render_counter_vec(out: &mut String, name: &str, vec: &CounterVec) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let children = vec.children.read().unwrap();
    for (value, counter) in children.iter() {
        let _ = writeln!(out, "{name}{{{}=\"{value}\"}} {}", vec.label, counter.get());
    }
}

fn render_histogram(out: &mut String, name: &str, histogram: &Histogram) {
    let _ = writeln!(out, "# TYPE {name} histogram");
    for (bound, count) in histogram.bounds.iter().zip(&histogram.counts) {
        let _ = writeln!(
            out,
            "{name}_bucket{{le=\"{bound}\"}} {}",
            count.load(Ordering::Relaxed)
        );
    }
    let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", histogram.count());
    let _ = writeln!(
        out,
        "{name}_sum {}",
        histogram.sum_micros.load(Ordering::Relaxed) as f64 / 1e6
    );
    let _ = writeln!(out, "{name}_count {}", histogram.count());
}
