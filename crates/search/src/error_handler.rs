//! Per-strategy failure tracking: circuit breaker, retry and fallback
//! policy, and the operator-facing trip/reset controls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use memoria_config::CircuitBreakerConfig;
use memoria_core::Error;
use tracing::{debug, info, warn};

use crate::strategy::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Operations flow normally.
    Closed,
    /// Strategy is skipped until the cooldown elapses.
    Open,
    /// One probe is admitted; its outcome decides the next state.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct CircuitEntry {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    last_category: Option<&'static str>,
}

impl Default for CircuitEntry {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            opened_at: None,
            last_category: None,
        }
    }
}

/// Operator-facing snapshot of one strategy's circuit.
#[derive(Debug, Clone)]
pub struct CircuitReport {
    pub strategy: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_category: Option<&'static str>,
}

/// Callback invoked for every tracked error (never during recovery).
pub type ErrorNotification = Arc<dyn Fn(&str, &Error) + Send + Sync>;

pub struct StrategyErrorHandler {
    config: CircuitBreakerConfig,
    entries: Mutex<HashMap<String, CircuitEntry>>,
    notify: Option<ErrorNotification>,
}

impl StrategyErrorHandler {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            notify: None,
        }
    }

    pub fn with_notification(mut self, notify: ErrorNotification) -> Self {
        self.notify = Some(notify);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a dispatch of `strategy` is admitted right now.  An open
    /// circuit whose cooldown has elapsed transitions to half-open and
    /// admits a single probe.
    pub fn allow(&self, strategy: &str) -> bool {
        let mut entries = self.lock();
        let entry = entries.entry(strategy.to_string()).or_default();
        match entry.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooldown = Duration::from_millis(self.config.cooldown_ms);
                let elapsed = entry
                    .opened_at
                    .map(|at| at.elapsed() >= cooldown)
                    .unwrap_or(true);
                if elapsed {
                    entry.state = CircuitState::HalfOpen;
                    info!(strategy, "circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, strategy: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(strategy.to_string()).or_default();
        if entry.state != CircuitState::Closed {
            info!(strategy, "circuit closed after successful probe");
        }
        *entry = CircuitEntry::default();
    }

    /// Track a failure.  Consecutive failures inside the window trip the
    /// circuit; a half-open probe failure reopens it immediately.
    pub fn record_failure(&self, strategy: &str, error: &Error) {
        {
            let mut entries = self.lock();
            let entry = entries.entry(strategy.to_string()).or_default();
            let now = Instant::now();

            let window = Duration::from_millis(self.config.failure_window_ms);
            let within_window = entry
                .last_failure
                .map(|at| at.elapsed() <= window)
                .unwrap_or(false);
            entry.consecutive_failures = if within_window {
                entry.consecutive_failures + 1
            } else {
                1
            };
            entry.last_failure = Some(now);
            entry.last_category = Some(error.category());

            match entry.state {
                CircuitState::HalfOpen => {
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                    warn!(strategy, "probe failed, circuit reopened");
                }
                CircuitState::Closed
                    if entry.consecutive_failures >= self.config.failure_threshold =>
                {
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                    warn!(
                        strategy,
                        failures = entry.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                }
                _ => {
                    debug!(
                        strategy,
                        failures = entry.consecutive_failures,
                        category = error.category(),
                        "strategy failure tracked"
                    );
                }
            }
        }

        if let Some(notify) = &self.notify {
            notify(strategy, error);
        }
    }

    /// Retry is worthwhile only for transient categories.
    pub fn should_retry(&self, error: &Error) -> bool {
        error.is_transient()
    }

    /// Degrading to a cheaper strategy is permitted for the text strategies
    /// unless the caller targeted one strategy explicitly.
    pub fn should_fallback(&self, strategy: &str, strict: bool) -> bool {
        if strict {
            return false;
        }
        matches!(strategy, names::FTS | names::LIKE | names::SEMANTIC)
    }

    pub fn state(&self, strategy: &str) -> CircuitState {
        self.lock()
            .get(strategy)
            .map(|e| e.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Operator control: force a circuit open.
    pub fn trip(&self, strategy: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(strategy.to_string()).or_default();
        entry.state = CircuitState::Open;
        entry.opened_at = Some(Instant::now());
        info!(strategy, "circuit tripped manually");
    }

    /// Operator control: force a circuit closed and clear its counters.
    pub fn reset(&self, strategy: &str) {
        self.lock().insert(strategy.to_string(), CircuitEntry::default());
        info!(strategy, "circuit reset manually");
    }

    pub fn report(&self) -> Vec<CircuitReport> {
        let mut reports: Vec<CircuitReport> = self
            .lock()
            .iter()
            .map(|(name, entry)| CircuitReport {
                strategy: name.clone(),
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                last_category: entry.last_category,
            })
            .collect();
        reports.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        reports
    }
}
