// Per-cycle timing configuration
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

// Environment variables for configuration
// RCON_TIMEOUT_MS: Budget for one connect+auth+command cycle (default: 10000)
// RCON_RESPONSE_IDLE_MS: Quiet period that ends a multi-packet reply (default: 250)

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RESPONSE_IDLE_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    /// Deadline for the whole cycle, measured from its start.
    pub timeout: Duration,
    /// How long to wait for another fragment once part of a reply arrived.
    pub response_idle: Duration,
}

impl CycleConfig {
    pub fn new(timeout: Duration) -> Self {
        CycleConfig {
            timeout,
            response_idle: Duration::from_millis(DEFAULT_RESPONSE_IDLE_MS),
        }
    }

    pub fn with_response_idle(mut self, response_idle: Duration) -> Self {
        self.response_idle = response_idle;
        self
    }

    pub fn from_env() -> Self {
        let timeout = env::var("RCON_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let response_idle = env::var("RCON_RESPONSE_IDLE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RESPONSE_IDLE_MS);

        CycleConfig {
            timeout: Duration::from_millis(timeout),
            response_idle: Duration::from_millis(response_idle),
        }
    }

    /// Process-wide defaults, read from the environment on first use.
    pub fn global() -> CycleConfig {
        *DEFAULT_CONFIG
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

static DEFAULT_CONFIG: Lazy<CycleConfig> = Lazy::new(CycleConfig::from_env);
