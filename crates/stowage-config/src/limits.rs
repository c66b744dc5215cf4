//! Byte and time bounds derived from the configuration.

use std::time::Duration;

use crate::Config;

const MIB: u64 = 1024 * 1024;
const SECONDS_PER_HOUR: u64 = 60 * 60;

/// Enforcement limits handed to the broker at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    max_write_bytes: u64,
    quota_bytes: u64,
    lock_max_age: Duration,
    exec_timeout_default: u64,
    exec_timeout_max: u64,
}

impl Limits {
    /// Converts the user-facing units of [`Config`] into enforcement units.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_write_bytes: config.max_file_size_mb.saturating_mul(MIB),
            quota_bytes: config.quota_per_user_mb.saturating_mul(MIB),
            lock_max_age: Duration::from_secs(
                config.lock_max_age_hours.saturating_mul(SECONDS_PER_HOUR),
            ),
            exec_timeout_default: config.exec_timeout_default,
            exec_timeout_max: config.exec_timeout_max.max(1),
        }
    }

    /// Overrides the write limit; mostly useful for tests.
    #[must_use]
    pub const fn with_max_write_bytes(mut self, bytes: u64) -> Self {
        self.max_write_bytes = bytes;
        self
    }

    /// Largest single write accepted, in bytes.
    #[must_use]
    pub const fn max_write_bytes(&self) -> u64 {
        self.max_write_bytes
    }

    /// Informational per-user quota, in bytes.
    #[must_use]
    pub const fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    /// Age after which a lock record is expired.
    #[must_use]
    pub const fn lock_max_age(&self) -> Duration {
        self.lock_max_age
    }

    /// Timeout used when the caller supplies none, already clamped.
    #[must_use]
    pub fn default_timeout_secs(&self) -> u64 {
        self.clamp_timeout(self.exec_timeout_default)
    }

    /// Clamps a caller-supplied timeout into `[1, exec_timeout_max]`.
    #[must_use]
    pub fn clamp_timeout(&self, requested: u64) -> u64 {
        requested.clamp(1, self.exec_timeout_max)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
