//! Project-wide constants.

use std::time::Duration;

/// Port the connector has always listened on.
pub const DEFAULT_PORT: u16 = 4042;

/// Length of the one-time code, same as the orchestrator's TOTP node.
pub const TOTP_DIGITS: u32 = 8;

/// TOTP time step.
pub const TOTP_STEP_SECONDS: u64 = 30;

/// Wall-clock budget for a process task when none is configured.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 15;

/// Flags placed before the fpgm name when invoking the fusion executable.
pub const FUSION_ARGS: &[&str] = &["RUN", "ZBSPEC"];

/// Separator placed between captured output chunks.
pub const CHUNK_JOIN: u8 = b' ';

/// Size of a single read from a child's stdout or stderr.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// How long to wait for a killed child to be reaped.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Convert a minute count from configuration into a timeout.
pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_flags_are_fixed() {
        assert_eq!(FUSION_ARGS, ["RUN", "ZBSPEC"]);
    }

    #[test]
    fn minutes_converts_to_seconds() {
        assert_eq!(minutes(0), Duration::ZERO);
        assert_eq!(minutes(15), Duration::from_secs(900));
    }

    #[test]
    fn default_timeout_matches_connector() {
        assert_eq!(minutes(DEFAULT_TIMEOUT_MINUTES), Duration::from_secs(15 * 60));
    }
}
