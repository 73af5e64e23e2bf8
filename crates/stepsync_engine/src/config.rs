//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;
use stepsync_protocol::{DocId, SessionId};

/// Configuration for one document session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Document being edited.
    pub doc_id: DocId,
    /// Origin id attached to every pushed step.
    pub session_id: SessionId,
    /// Period of the background sync timer.
    pub sync_interval: Duration,
    /// Quiet period after a local edit before an edit-triggered cycle runs.
    pub debounce: Duration,
    /// Timeout applied to every fetch, push and reset call.
    pub request_timeout: Duration,
    /// Delay policy after failed cycles.
    pub backoff: BackoffConfig,
}

impl SyncConfig {
    /// Creates a configuration for `doc_id` with a fresh session id.
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            session_id: SessionId::generate(),
            sync_interval: Duration::from_millis(2000),
            debounce: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the session id.
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Sets the sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the edit debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Extra delay added before the next timer-driven cycle after failures.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Creates the default backoff policy.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// No extra delay; failed cycles are retried on the next tick.
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after `failures` consecutive failed cycles.
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = base.min(self.max_delay.as_secs_f64());

        if self.jitter && delay > 0.0 {
            let jitter = delay * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay + jitter)
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new()
    }
}
