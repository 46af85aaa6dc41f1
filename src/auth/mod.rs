pub mod totp;

use anyhow::{Context, Result, bail};
use std::time::{SystemTime, UNIX_EPOCH};

pub use totp::{Algorithm, SecretError};

/// Source of "now" in unix seconds. A reading of 0 means the clock is unusable.
pub type Clock = fn() -> u64;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Gate in front of every task: checks a presented one-time code against the
/// code derived from the shared secret for the current time window.
///
/// Only the exact current window is accepted and codes are not remembered, so a
/// code can be replayed until its window closes.
#[derive(Debug, Clone)]
pub struct Authenticator {
    secret: String,
    algorithm: Algorithm,
    clock: Clock,
}

impl Authenticator {
    pub fn new(secret: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            secret: secret.into(),
            algorithm,
            clock: system_clock,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Make sure the secret can produce codes at all. Called once at startup.
    pub fn check(&self) -> Result<()> {
        let now = (self.clock)();
        if now == 0 {
            bail!("system clock is at or before the unix epoch");
        }
        totp::generate(&self.secret, now, self.algorithm)
            .map(|_| ())
            .context("TOTP secret is unusable")
    }

    /// Validate a presented code against the current window.
    pub fn validate(&self, presented: &str) -> bool {
        match (self.clock)() {
            0 => false,
            now => self.validate_at(presented, now),
        }
    }

    /// Validate a presented code against the window containing `unix_seconds`.
    /// Any failure to derive the expected code rejects the caller.
    pub fn validate_at(&self, presented: &str, unix_seconds: u64) -> bool {
        match totp::generate(&self.secret, unix_seconds, self.algorithm) {
            Ok(expected) => presented == expected,
            Err(_) => false,
        }
    }
}
