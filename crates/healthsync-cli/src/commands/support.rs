use std::io::{self, Write};

use anyhow::Result;
use healthsync_core::{ErrorPayload, SyncError};
use serde_json::json;

pub(super) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Structured payload for failures that originate in the engine. `None` for
/// CLI-only failures such as bad arguments.
pub(super) fn failure_payload(operation: &str, err: &anyhow::Error) -> Option<ErrorPayload> {
    let source = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())?;
    let mut payload = source.to_payload(operation);
    payload.details = Some(json!({ "context": format!("{err:#}") }));
    Some(payload)
}

pub(crate) fn report_failure(operation: &str, err: &anyhow::Error) {
    let mut stderr = io::stderr().lock();
    let rendered = failure_payload(operation, err)
        .and_then(|payload| serde_json::to_string_pretty(&payload).ok());
    let _ = match rendered {
        Some(json) => writeln!(stderr, "{json}"),
        None => writeln!(stderr, "error: {err:#}"),
    };
}
