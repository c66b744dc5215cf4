//! The stowage broker: a per-user sandboxed filesystem service.
//!
//! The broker sits between a chat host and the disk. Every user owns a root
//! divided into three zones: read-only `Uploads`, free-form `Storage`, and
//! version-controlled `Documents`. Requests arrive as JSON lines on standard
//! input and each receives one JSON envelope on standard output (see
//! [`dispatch`]).
//!
//! The layers, bottom-up:
//!
//! - [`identity`] validates user and conversation identifiers.
//! - [`zones`] maps zones onto directories and implements the
//!   open/save/cancel editing protocol over per-zone lock files.
//! - [`version`] drives the git repository behind Documents.
//! - [`broker`] exposes one method per operation and maps every failure onto
//!   an [`ErrorCode`].
//! - [`dispatch`] parses request lines, routes them and writes envelopes.
//!
//! Command execution, argument validation and path confinement live in the
//! `stowage_sandbox` crate; configuration lives in `stowage_config`.

pub mod bootstrap;
pub mod broker;
pub mod dispatch;
pub mod envelope;
mod health;
pub mod identity;
pub mod telemetry;
pub mod version;
pub mod zones;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use broker::{Broker, BrokerError, Caller, Outcome};
pub use dispatch::{DispatchError, Request, serve};
pub use envelope::{Envelope, ErrorCode};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use zones::Zone;

#[cfg(test)]
mod tests;
