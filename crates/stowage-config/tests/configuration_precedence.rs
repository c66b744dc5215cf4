use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use stowage_config::{
    Config, DEFAULT_EXEC_TIMEOUT_MAX, DEFAULT_MAX_FILE_SIZE_MB, default_log_filter,
    default_log_format, default_storage_root,
};

const MAX_FILE_SIZE_ENV: &str = "STOWAGE_MAX_FILE_SIZE_MB";

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    env_guard: RefCell<Option<MutexGuard<'static, ()>>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("stowaged")]),
            env_overrides: RefCell::new(Vec::new()),
            env_guard: RefCell::new(None),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
        }
    }

    fn write_config(&self, max_file_size_mb: &str) {
        let path = self.temp_dir.path().join("stowage.toml");
        let toml = format!("max_file_size_mb = {max_file_size_mb}\n");

        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn hold_env_lock(&self) {
        if self.env_guard.borrow().is_none() {
            let guard = ENV_MUTEX
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *self.env_guard.borrow_mut() = Some(guard);
        }
    }

    fn set_env(&self, key: &str, value: &str) {
        self.hold_env_lock();
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on newer toolchains; the harness
        // restores every override in `Drop`.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_string(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        self.hold_env_lock();
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => {
                *self.loaded.borrow_mut() = Some(config);
            }
            Err(error) => {
                *self.error.borrow_mut() = Some(error.to_string());
            }
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            if let Some(os_value) = value {
                unsafe { std::env::set_var(&key, os_value) };
            } else {
                unsafe { std::env::remove_var(&key) };
            }
        }
        drop(self.env_guard.borrow_mut().take());
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the maximum file size to \"{size}\"")]
fn given_configuration_file(harness: &Harness, size: String) {
    harness.write_config(&size);
}

#[given("the environment overrides the maximum file size to \"{size}\"")]
fn given_environment_override(harness: &Harness, size: String) {
    harness.set_env(MAX_FILE_SIZE_ENV, &size);
}

#[when("the CLI sets the maximum file size to \"{size}\"")]
fn when_cli_override(harness: &Harness, size: String) {
    harness.push_cli_arg("--max-file-size-mb");
    harness.push_cli_arg(OsString::from(&size));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the maximum file size to \"{size}\"")]
fn then_resolved_size(harness: &Harness, size: String) {
    let config = harness.loaded_config();
    let expected: u64 = match size.parse() {
        Ok(value) => value,
        Err(error) => panic!("invalid expected size '{size}': {error}"),
    };
    assert_eq!(config.max_file_size_mb, expected);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();

    assert_eq!(config.storage_root(), default_storage_root().as_path());
    assert_eq!(config.max_file_size_mb, DEFAULT_MAX_FILE_SIZE_MB);
    assert_eq!(config.exec_timeout_max, DEFAULT_EXEC_TIMEOUT_MAX);
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert!(config.upload_search_paths().is_empty());
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
