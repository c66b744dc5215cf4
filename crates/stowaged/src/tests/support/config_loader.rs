//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use tempfile::TempDir;

use stowage_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that points the storage root at a temporary directory.
pub struct TestConfigLoader {
    storage_dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let storage_dir = TempDir::new().expect("failed to create temporary storage root");
        Self { storage_dir }
    }

    pub fn storage_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.storage_dir.path().join("users"))
            .expect("temporary storage root was not valid UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            storage_root: self.storage_root(),
            ..Config::default()
        })
    }
}

/// Loader whose command line cannot be parsed.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("stowaged"),
            OsString::from("--max-file-size-mb"),
            OsString::from("not-a-number"),
        ];
        Config::load_from_iter(args)
    }
}
