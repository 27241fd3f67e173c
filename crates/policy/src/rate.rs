//! Per-IP token-bucket rate limiter for new sessions.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Instant;

/// GC kicks in once the bucket map grows past this.
const GC_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per source IP. Buckets refill continuously at `rate`
/// tokens/second up to `burst`; a new session costs one token.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: f64) -> RateLimiter {
        RateLimiter {
            rate: rate.max(0.0),
            burst: burst.max(1.0),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit one session from `ip`.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now())
    }

    fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap();

        if buckets.len() >= GC_THRESHOLD {
            let idle = self.full_refill_seconds();
            buckets.retain(|_, b| now.duration_since(b.last_refill).as_secs_f64() < idle);
        }

        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds for an empty bucket to fully refill; idle buckets older than
    /// this hold no state worth keeping.
    fn full_refill_seconds(&self) -> f64 {
        if self.rate > 0.0 {
            (self.burst / self.rate).max(60.0)
        } else {
            3600.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([192, 0, 2, last])
    }

    #[test]
    fn burst_is_admitted_then_cut_off() {
        let limiter = RateLimiter::new(0.5, 20.0);
        let now = Instant::now();
        let admitted = (0..50).filter(|_| limiter.allow_at(ip(1), now)).count();
        assert_eq!(admitted, 20);
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(2.0, 4.0);
        let start = Instant::now();
        for _ in 0..4 {
            assert!(limiter.allow_at(ip(2), start));
        }
        assert!(!limiter.allow_at(ip(2), start));
        // Two seconds later: 4 more tokens, capped at burst.
        let later = start + Duration::from_secs(2);
        assert!(limiter.allow_at(ip(2), later));
        assert!(limiter.allow_at(ip(2), later));
        assert!(limiter.allow_at(ip(2), later));
        assert!(limiter.allow_at(ip(2), later));
        assert!(!limiter.allow_at(ip(2), later));
    }

    #[test]
    fn admission_bound_holds_for_any_window() {
        // At most burst + rate·window admissions from one IP.
        let rate = 1.0;
        let burst = 5.0;
        let limiter = RateLimiter::new(rate, burst);
        let start = Instant::now();

        let window = 10.0;
        let mut admitted = 0;
        for i in 0..200 {
            let t = start + Duration::from_secs_f64(window * f64::from(i) / 200.0);
            if limiter.allow_at(ip(3), t) {
                admitted += 1;
            }
        }
        let bound = (burst + rate * window) as usize;
        assert!(admitted <= bound, "admitted {admitted} > bound {bound}");
    }

    #[test]
    fn ips_are_limited_independently() {
        let limiter = RateLimiter::new(0.5, 1.0);
        let now = Instant::now();
        assert!(limiter.allow_at(ip(4), now));
        assert!(!limiter.allow_at(ip(4), now));
        assert!(limiter.allow_at(ip(5), now));
    }
}
