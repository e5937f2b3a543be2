//! Retry throttling for peripheral (re)initialization.
//!
//! The reconciliation loop asks to reconnect on every tick while the
//! microphone is in use and the peripheral is not active. The default
//! schedule never waits: every such tick is an attempt. A finite
//! `immediate_retries` switches on exponential backoff once that many
//! consecutive failures have been retried.

use std::time::{Duration, Instant};

/// Configuration for reconnection backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Failures retried on the next tick without waiting. `u32::MAX` (the
    /// default) disables backoff.
    pub immediate_retries: u32,
    /// Delay after the first non-immediate failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each further failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            immediate_retries: u32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            current_delay: Duration::ZERO,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReconnectConfig::default())
    }

    /// Whether an attempt is allowed now.
    pub fn should_attempt(&self) -> bool {
        self.should_attempt_at(Instant::now())
    }

    /// Whether an attempt is allowed at `now`.
    pub fn should_attempt_at(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.current_delay,
        }
    }

    /// Record a failed attempt and advance the backoff.
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_attempt = Some(now);

        let past_immediate = self
            .consecutive_failures
            .saturating_sub(self.config.immediate_retries);
        self.current_delay = if past_immediate == 0 {
            Duration::ZERO
        } else {
            let factor = self.config.multiplier.powi(past_immediate as i32 - 1);
            let secs = self.config.initial_delay.as_secs_f64() * factor;
            Duration::from_secs_f64(secs.min(self.config.max_delay.as_secs_f64()))
        };
    }

    /// Record a successful attempt and reset the backoff.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = Duration::ZERO;
        self.last_attempt = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay required after the last failure before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn throttled() -> ReconnectConfig {
        ReconnectConfig {
            immediate_retries: 1,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.immediate_retries, u32::MAX);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn initial_should_attempt_is_true() {
        let state = ReconnectState::with_defaults();
        assert!(state.should_attempt());
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[test]
    fn first_failure_retries_immediately() {
        let mut state = ReconnectState::with_defaults();
        let t0 = Instant::now();
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::ZERO);
        assert!(state.should_attempt_at(t0));
    }

    #[test]
    fn backoff_progresses_after_immediate_retries() {
        let config = ReconnectConfig {
            immediate_retries: 1,
            initial_delay: ms(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        let t0 = Instant::now();

        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::ZERO);
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(100));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(200));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(400));
        assert_eq!(state.consecutive_failures(), 4);
    }

    #[test]
    fn backoff_capped_at_max() {
        let config = ReconnectConfig {
            immediate_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        let t0 = Instant::now();

        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::from_secs(1));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::from_secs(2));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::from_secs(4));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), Duration::from_secs(4));
    }

    #[test]
    fn default_schedule_never_waits() {
        let mut state = ReconnectState::with_defaults();
        let t0 = Instant::now();
        for _ in 0..50 {
            state.record_failure_at(t0);
            assert_eq!(state.current_delay(), Duration::ZERO);
            assert!(state.should_attempt_at(t0));
        }
        assert_eq!(state.consecutive_failures(), 50);
    }

    #[test]
    fn throttled_schedule_reaches_thirty_second_cap() {
        let mut state = ReconnectState::new(throttled());
        let t0 = Instant::now();
        for _ in 0..20 {
            state.record_failure_at(t0);
        }
        assert_eq!(state.current_delay(), Duration::from_secs(30));
    }

    #[test]
    fn should_attempt_respects_delay() {
        let config = ReconnectConfig {
            immediate_retries: 0,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        let t0 = Instant::now();
        state.record_failure_at(t0);
        assert!(!state.should_attempt_at(t0 + Duration::from_secs(59)));
        assert!(state.should_attempt_at(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = ReconnectState::new(throttled());
        state.record_failure();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 3);
        assert_ne!(state.current_delay(), Duration::ZERO);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::ZERO);
        assert!(state.should_attempt());
    }

    #[test]
    fn custom_multiplier() {
        let config = ReconnectConfig {
            immediate_retries: 0,
            initial_delay: ms(100),
            max_delay: Duration::from_secs(10),
            multiplier: 3.0,
        };
        let mut state = ReconnectState::new(config);
        let t0 = Instant::now();
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(100));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(300));
        state.record_failure_at(t0);
        assert_eq!(state.current_delay(), ms(900));
    }
}
