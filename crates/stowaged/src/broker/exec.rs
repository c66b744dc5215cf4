//! Command execution in a zone or in the caller's edit tree.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use stowage_sandbox::{ExecOutput, run, validate};

use super::{BROKER_TARGET, Broker, BrokerError, BrokerResult, Caller, Outcome, guard_repository};
use crate::broker::requests::ExecRequest;
use crate::version::Repository;
use crate::zones::Zone;

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code; `-1` when ended by a signal.
    pub exit_code: i32,
    /// True for a zero exit code.
    pub succeeded: bool,
    /// True when output was cut at the capture limit.
    pub truncated: bool,
}

impl From<ExecOutput> for CommandReport {
    fn from(output: ExecOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            succeeded: output.succeeded,
            truncated: output.truncated,
        }
    }
}

impl Broker {
    /// Runs a whitelisted command with the zone's data tree as working
    /// directory. Uploads runs inside the conversation's uploads directory
    /// with the read-only whitelist.
    ///
    /// A non-zero exit is a successful outcome with `succeeded` false.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when validation fails, the uploads directory
    /// is missing, the repository cannot be prepared, or the command cannot
    /// be run or times out.
    pub fn exec(&self, caller: &Caller, request: &ExecRequest) -> BrokerResult<CommandReport> {
        let user_root = self.user_root(caller);
        let zone = request.zone;
        let root = match zone {
            Zone::Uploads => user_root.uploads(&caller.conversation),
            editable => user_root.zone(editable).data_dir(),
        };
        self.check(zone, &root, request)?;

        if zone.is_editable() {
            let layout = user_root.zone(zone);
            layout.ensure()?;
            if zone.is_versioned() {
                Repository::at(layout.data_dir()).ensure()?;
            }
        } else if !root.is_dir() {
            return Err(BrokerError::NoUploads {
                conversation: caller.conversation.to_string(),
            });
        }
        self.launch(&root, request)
    }

    /// Runs a whitelisted command inside the caller's edit tree for the
    /// zone. Only the edit copies are affected.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads or when nothing is
    /// open, and the same failures as [`Broker::exec`] otherwise.
    pub fn edit_exec(&self, caller: &Caller, request: &ExecRequest) -> BrokerResult<CommandReport> {
        let layout = self.editable(caller, request.zone, "edit_exec")?;
        let root = layout.open_edit_root(&caller.conversation)?;
        self.check(request.zone, &root, request)?;
        self.launch(&root, request)
    }

    fn check(&self, zone: Zone, root: &Path, request: &ExecRequest) -> Result<(), BrokerError> {
        validate(&self.policy, zone.access(), root, &request.cmd, &request.args)?;
        for argument in &request.args {
            guard_repository(zone, argument)?;
        }
        Ok(())
    }

    fn launch(&self, root: &Path, request: &ExecRequest) -> BrokerResult<CommandReport> {
        let requested = request
            .timeout
            .unwrap_or_else(|| self.limits.default_timeout_secs());
        let timeout = self.limits.clamp_timeout(requested);
        debug!(
            target: BROKER_TARGET,
            command = %request.cmd,
            cwd = %root.display(),
            timeout,
            "running command"
        );
        let output = run(&request.cmd, &request.args, root, timeout)?;
        Ok(Outcome::silent(CommandReport::from(output)))
    }
}
