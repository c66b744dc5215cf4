//! Test harness utilities shared by the broker suites.

mod config_loader;
mod reporter;
mod session;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use session::SessionWorld;
pub use world::{BrokerWorld, USER};
