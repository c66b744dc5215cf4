use camino::Utf8PathBuf;

/// Default root under which one directory per user identifier is created.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/stowage/users";

/// Default informational quota per user, in MiB.
pub const DEFAULT_QUOTA_PER_USER_MB: u64 = 1000;

/// Default maximum size of a single write, in MiB.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 300;

/// Default age after which an edit lock is considered expired, in hours.
pub const DEFAULT_LOCK_MAX_AGE_HOURS: u64 = 24;

/// Default command timeout, in seconds.
pub const DEFAULT_EXEC_TIMEOUT: u64 = 30;

/// Upper bound applied to every caller-supplied command timeout, in seconds.
pub const DEFAULT_EXEC_TIMEOUT_MAX: u64 = 300;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default storage root as an owned path.
pub fn default_storage_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_STORAGE_ROOT)
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
