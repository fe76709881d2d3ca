//! Per-key circuit breaker for upstream calls.
//!
//! State machine per key: `Closed → (failures) Open → (cooldown) HalfOpen →
//! (probe success) Closed`. While open, callers short-circuit to cache or an
//! unavailable badge without touching the upstream. Half-open admits exactly
//! one probe; its outcome decides the next state.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Breaker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Keyed breaker over a concurrent map; all transitions happen under the
/// entry's shard lock.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    states: DashMap<String, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Whether a call for `key` may go upstream right now.
    ///
    /// An open breaker whose cooldown has elapsed flips to half-open and
    /// admits this caller as the single probe.
    pub fn allow(&self, key: &str) -> bool {
        let mut entry = self.states.entry(key.to_string()).or_default();
        match entry.state {
            State::Closed => true,
            State::Open => {
                let cooled_down = entry
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    entry.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    /// Records a successful upstream call; closes the breaker.
    pub fn record_success(&self, key: &str) {
        let mut entry = self.states.entry(key.to_string()).or_default();
        entry.state = State::Closed;
        entry.consecutive_failures = 0;
        entry.opened_at = None;
    }

    /// Records a failed upstream call; may trip the breaker.
    pub fn record_failure(&self, key: &str) {
        let mut entry = self.states.entry(key.to_string()).or_default();
        match entry.state {
            State::HalfOpen => {
                entry.state = State::Open;
                entry.opened_at = Some(Instant::now());
            }
            State::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.config.failure_threshold {
                    entry.state = State::Open;
                    entry.opened_at = Some(Instant::now());
                    tracing::warn!(%key, "circuit breaker opened");
                }
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown,
        })
    }

    #[test]
    fn closed_breaker_allows_calls() {
        let breaker = breaker(3, Duration::from_secs(30));
        assert!(breaker.allow("nuget"));
        breaker.record_failure("nuget");
        breaker.record_failure("nuget");
        assert!(breaker.allow("nuget"));
    }

    #[test]
    fn threshold_failures_open_the_breaker() {
        let breaker = breaker(3, Duration::from_secs(30));
        for _ in 0..3 {
            breaker.record_failure("nuget");
        }
        assert!(!breaker.allow("nuget"));
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let breaker = breaker(3, Duration::from_secs(30));
        breaker.record_failure("nuget");
        breaker.record_failure("nuget");
        breaker.record_success("nuget");
        breaker.record_failure("nuget");
        assert!(breaker.allow("nuget"));
    }

    #[test]
    fn cooldown_admits_a_single_probe() {
        let breaker = breaker(1, Duration::from_millis(0));
        breaker.record_failure("nuget");
        // Cooldown of zero has already elapsed: one probe gets through,
        // the next caller is held back.
        assert!(breaker.allow("nuget"));
        assert!(!breaker.allow("nuget"));
    }

    #[test]
    fn probe_success_closes_the_breaker() {
        let breaker = breaker(1, Duration::from_millis(0));
        breaker.record_failure("nuget");
        assert!(breaker.allow("nuget"));
        breaker.record_success("nuget");
        assert!(breaker.allow("nuget"));
        assert!(breaker.allow("nuget"));
    }

    #[test]
    fn probe_failure_reopens_the_breaker() {
        let breaker = breaker(1, Duration::from_millis(100));
        breaker.record_failure("nuget");
        assert!(!breaker.allow("nuget"));
        std::thread::sleep(Duration::from_millis(150));
        // Cooldown elapsed: one probe is admitted and fails.
        assert!(breaker.allow("nuget"));
        breaker.record_failure("nuget");
        // Reopened with a fresh cooldown.
        assert!(!breaker.allow("nuget"));
    }

    #[test]
    fn keys_are_independent() {
        let breaker = breaker(1, Duration::from_secs(60));
        breaker.record_failure("nuget");
        assert!(!breaker.allow("nuget"));
        assert!(breaker.allow("github"));
    }
}
