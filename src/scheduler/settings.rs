use std::time::Duration;

const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 1;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

/// How reads are suspended during the quiet half of the duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Keep the port open, discard lines while paused, flush its input on resume
    Drain,
    /// Close the port while paused and open it again on resume
    Reopen,
}

impl ThrottleMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drain" | "pause" => Some(ThrottleMode::Drain),
            "reopen" | "close" => Some(ThrottleMode::Reopen),
            _ => None,
        }
    }
}

/// Retry policy after the line source fails or closes unexpectedly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReopenPolicy {
    pub enabled: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReopenPolicy {
    pub fn enabled() -> Self {
        ReopenPolicy {
            enabled: true,
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }

    pub fn disabled() -> Self {
        ReopenPolicy {
            enabled: false,
            ..Self::enabled()
        }
    }

    pub(crate) fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Length of each reading and each paused window
    pub interval: Duration,
    /// Continuous mode: never pause
    pub debug: bool,
    pub throttle: ThrottleMode,
    pub reopen: ReopenPolicy,
    /// How often the registry is swept for stale devices
    pub sweep_period: Duration,
}

impl ScheduleSettings {
    pub fn new(interval: Duration) -> Self {
        ScheduleSettings {
            interval,
            debug: false,
            throttle: ThrottleMode::Drain,
            reopen: ReopenPolicy::enabled(),
            sweep_period: interval,
        }
    }
}
