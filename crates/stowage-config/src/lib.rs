//! Shared configuration for the stowage broker.
//!
//! Configuration is layered with [`ortho_config`]: built-in defaults, an
//! optional configuration file passed through `--config-path`, environment
//! variables prefixed with `STOWAGE_`, and finally command-line flags. The
//! resolved [`Config`] is read once at start-up and converted into [`Limits`],
//! the byte and time bounds the broker enforces on every operation.

mod defaults;
mod limits;
mod logging;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_EXEC_TIMEOUT, DEFAULT_EXEC_TIMEOUT_MAX, DEFAULT_LOCK_MAX_AGE_HOURS,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_QUOTA_PER_USER_MB,
    DEFAULT_STORAGE_ROOT, default_log_filter, default_log_filter_string, default_log_format,
    default_storage_root,
};
pub use limits::Limits;
pub use logging::LogFormat;

/// Resolved broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "STOWAGE")]
pub struct Config {
    /// Directory holding one user root per user identifier.
    #[ortho_config(default = defaults::default_storage_root())]
    pub storage_root: Utf8PathBuf,
    /// Informational per-user quota in MiB; reported, never enforced.
    #[ortho_config(default = defaults::DEFAULT_QUOTA_PER_USER_MB)]
    pub quota_per_user_mb: u64,
    /// Largest single write accepted, in MiB.
    #[ortho_config(default = defaults::DEFAULT_MAX_FILE_SIZE_MB)]
    pub max_file_size_mb: u64,
    /// Age after which an edit lock counts as expired, in hours.
    #[ortho_config(default = defaults::DEFAULT_LOCK_MAX_AGE_HOURS)]
    pub lock_max_age_hours: u64,
    /// Timeout applied when a caller does not supply one, in seconds.
    #[ortho_config(default = defaults::DEFAULT_EXEC_TIMEOUT)]
    pub exec_timeout_default: u64,
    /// Upper bound for every command timeout, in seconds.
    #[ortho_config(default = defaults::DEFAULT_EXEC_TIMEOUT_MAX)]
    pub exec_timeout_max: u64,
    /// Host directories searched when importing chat uploads.
    #[serde(default)]
    #[ortho_config(merge_strategy = "append")]
    pub upload_search_paths: Vec<Utf8PathBuf>,
    /// Tracing filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the log stream.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            quota_per_user_mb: DEFAULT_QUOTA_PER_USER_MB,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            lock_max_age_hours: DEFAULT_LOCK_MAX_AGE_HOURS,
            exec_timeout_default: DEFAULT_EXEC_TIMEOUT,
            exec_timeout_max: DEFAULT_EXEC_TIMEOUT_MAX,
            upload_search_paths: Vec::new(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads the configuration from the process arguments, environment and
    /// configuration files.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads the configuration from an explicit argument iterator.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Directory holding one user root per user identifier.
    #[must_use]
    pub fn storage_root(&self) -> &Utf8Path {
        self.storage_root.as_path()
    }

    /// Host directories searched when importing chat uploads.
    #[must_use]
    pub fn upload_search_paths(&self) -> &[Utf8PathBuf] {
        &self.upload_search_paths
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format of the log stream.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Byte and time limits derived from this configuration.
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits::from_config(self)
    }
}
