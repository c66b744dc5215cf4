//! Routes parsed requests to broker operations.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::request::{Operation, Request};
use crate::broker::{Broker, BrokerError, Caller, Outcome};
use crate::envelope::{Envelope, ErrorCode};
use crate::telemetry::request_span;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Runs `request` against `broker` and renders the reply. Every failure
/// becomes a failure envelope.
#[must_use]
pub fn route(broker: &Broker, request: &Request) -> Envelope {
    let operation = request.operation.name();
    let span = request_span(operation, &request.user, &request.conversation);
    let _entered = span.enter();
    debug!(target: DISPATCH_TARGET, "dispatching request");
    let result = Caller::parse(&request.user, &request.conversation)
        .and_then(|caller| dispatch(broker, &caller, &request.operation));
    result.unwrap_or_else(|error| {
        info!(
            target: DISPATCH_TARGET,
            operation,
            code = %error.code(),
            %error,
            "operation failed"
        );
        error.to_envelope()
    })
}

fn dispatch(
    broker: &Broker,
    caller: &Caller,
    operation: &Operation,
) -> Result<Envelope, BrokerError> {
    match operation {
        Operation::Exec(request) => broker.exec(caller, request).map(render),
        Operation::Write(request) => broker.write(caller, request).map(render),
        Operation::Delete(request) => broker.delete(caller, request).map(render),
        Operation::Rename(request) => broker.rename(caller, request).map(render),
        Operation::EditOpen(request) => broker.edit_open(caller, request).map(render),
        Operation::EditExec(request) => broker.edit_exec(caller, request).map(render),
        Operation::EditWrite(request) => broker.edit_write(caller, request).map(render),
        Operation::EditSave(request) => broker.edit_save(caller, request).map(render),
        Operation::EditCancel(request) => broker.edit_cancel(caller, request).map(render),
        Operation::Bridge(request) => broker.bridge(caller, request).map(render),
        Operation::Import(request) => broker.import(caller, request).map(render),
        Operation::ForceUnlock(request) => broker.force_unlock(caller, request).map(render),
        Operation::Maintenance => broker.maintenance(caller).map(render),
        Operation::Stats => Ok(render(broker.stats(caller))),
        Operation::AllowedCommands => Ok(render(broker.allowed_commands())),
    }
}

fn render<T: Serialize>(outcome: Outcome<T>) -> Envelope {
    outcome.into_envelope().unwrap_or_else(|error| {
        Envelope::failure(
            ErrorCode::ExecError,
            format!("failed to serialise response: {error}"),
            Value::Null,
            None,
        )
    })
}
