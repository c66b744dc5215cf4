//! Scenario world for bootstrap and the request stream.

use std::io::Cursor;
use std::sync::Arc;

use serde_json::Value;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

/// Loader, reporter and daemon state shared across session steps.
pub struct SessionWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    pub handled: Option<u64>,
    output: Vec<u8>,
}

impl SessionWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            handled: None,
            output: Vec::new(),
        }
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Serves `lines` as one request stream.
    pub fn serve(&mut self, lines: &[&str]) {
        let daemon = self.daemon.as_ref().expect("daemon not bootstrapped");
        let mut input = Cursor::new(lines.join("\n").into_bytes());
        let handled = daemon
            .serve(&mut input, &mut self.output)
            .expect("request stream failed");
        self.handled = Some(handled);
    }

    /// Every reply written so far, parsed.
    pub fn replies(&self) -> Vec<Value> {
        String::from_utf8(self.output.clone())
            .expect("replies were not UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("reply is not JSON"))
            .collect()
    }
}
